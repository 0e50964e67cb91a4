//! URL handling module for Forum-Loader
//!
//! Host extraction (used to key per-host concurrency gates and output directories) and
//! normalization used to deduplicate image links within a post.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_host, host_of, DEFAULT_HOST};
pub use normalize::normalize_url;
