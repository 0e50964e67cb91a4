//! Storage module for persisting download and crawl state
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Block and link registration (idempotent per block + URL)
//! - Link status transitions reported by the download engine
//! - Page tracking for paginated crawl resumption
//! - Startup recovery of interrupted links and pages
//! - JSONL/manifest export snapshots

mod export;
mod schema;
mod sqlite;
mod traits;

pub use export::{export_block, ExportSummary, Manifest};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{LinkStatus, PageStatus};
use serde::Serialize;

/// A forum post grouped for download
#[derive(Debug, Clone, Serialize)]
pub struct BlockRecord {
    pub id: i64,
    pub title: String,
    /// Numbered slug, `NNNN_slug`
    pub slug: String,
    pub created_at: String,
    /// Links in insertion order; empty unless loaded with the block
    #[serde(skip)]
    pub links: Vec<LinkRecord>,
}

impl BlockRecord {
    /// Counts loaded links in the given status
    pub fn count_status(&self, status: LinkStatus) -> usize {
        self.links.iter().filter(|l| l.status == status).count()
    }

    /// Loaded links still waiting for a download attempt
    pub fn pending_links(&self) -> Vec<LinkRecord> {
        self.links
            .iter()
            .filter(|l| l.status.is_pending())
            .cloned()
            .collect()
    }
}

/// One image download target; serialized as a JSONL export line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRecord {
    pub id: i64,
    pub block_id: i64,
    pub url: String,
    pub referer: Option<String>,
    pub status: LinkStatus,
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub retries: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A link as produced by an extractor, before registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub url: String,
    pub referer: Option<String>,
}

impl NewLink {
    pub fn new(url: impl Into<String>, referer: Option<String>) -> Self {
        Self {
            url: url.into(),
            referer,
        }
    }
}

/// Optional fields applied alongside a link status change
///
/// Fields left as `None` keep their persisted value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkChanges {
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub error: Option<String>,
    pub increment_retries: bool,
}

/// One fetched listing page
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub id: i64,
    pub url: String,
    pub page_number: u32,
    pub status: PageStatus,
    pub blocks_found: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
