//! Output module for crawl reports
//!
//! This module handles:
//! - Per-block and per-crawl reports returned by the orchestrator
//! - Store-wide statistics printed at the end of a run

mod report;
pub mod stats;

pub use report::{print_block_reports, print_summary, BlockReport, CrawlSummary};
pub use stats::{load_statistics, print_statistics, LoaderStatistics};
