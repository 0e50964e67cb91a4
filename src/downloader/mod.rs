//! Download module for fetching image links
//!
//! This module contains the download side of the loader, including:
//! - Per-host concurrency gates
//! - Retry/backoff policy
//! - The resumable download engine
//! - Typed status events reported to the store

mod backoff;
mod engine;
mod limiter;
mod status;

pub use backoff::{RetryDecision, RetryPolicy};
pub use engine::{
    assign_filenames, build_download_client, filename_for, DownloadEngine, Downloaded,
};
pub use limiter::HostLimiter;
pub use status::{DownloadStats, LinkEvent, StatusSink};
