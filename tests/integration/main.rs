//! Integration tests for Forum-Loader
//!
//! These tests use wiremock to stand in for image hosts and forum pages.

mod common;
mod crawl_tests;
mod download_tests;
