//! State module for tracking download and crawl progress
//!
//! # Components
//!
//! - `LinkStatus`: lifecycle of a single image link (new, queued, downloading, done, failed)
//! - `PageStatus`: lifecycle of a fetched listing page (new, processing, done, failed)

mod link_status;
mod page_status;

// Re-export main types
pub use link_status::LinkStatus;
pub use page_status::PageStatus;
