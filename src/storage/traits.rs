//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{LinkStatus, PageStatus};
use crate::storage::{BlockRecord, LinkChanges, LinkRecord, NewLink, PageRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Unknown status '{value}' in column {column}")]
    InvalidStatus { column: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every mutating call is committed before it returns; no operation leaves an open
/// transaction behind, so an interruption at any point leaves a recoverable store.
pub trait Storage {
    // ===== Block Management =====

    /// Inserts a new block and returns its ID
    ///
    /// # Arguments
    ///
    /// * `title` - Display title of the post
    /// * `slug` - Numbered slug (`NNNN_slug`), unique across the store
    fn create_block(&mut self, title: &str, slug: &str) -> StorageResult<i64>;

    /// Looks up a block by numbered slug, loading its links in insertion order
    fn get_block_by_slug(&self, slug: &str) -> StorageResult<Option<BlockRecord>>;

    /// Blocks whose numbered slug carries the given base slug, oldest first, with links
    ///
    /// `Holiday` matches `0003_Holiday` but not `0003_Holiday 2`.
    fn find_blocks_by_base_slug(&self, base_slug: &str) -> StorageResult<Vec<BlockRecord>>;

    /// Lists all blocks (without links), oldest first
    fn list_blocks(&self) -> StorageResult<Vec<BlockRecord>>;

    // ===== Link Management =====

    /// Registers links for a block in the given initial status
    ///
    /// A URL already present in the block is skipped, not an error.
    ///
    /// # Returns
    ///
    /// The number of links actually inserted
    fn add_links(
        &mut self,
        block_id: i64,
        links: &[NewLink],
        status: LinkStatus,
    ) -> StorageResult<usize>;

    /// Applies a status transition plus any supplied optional fields
    ///
    /// The retry counter is incremented in the same statement when requested, and
    /// `updated_at` is always refreshed.
    fn update_link_status(
        &mut self,
        link_id: i64,
        status: LinkStatus,
        changes: &LinkChanges,
    ) -> StorageResult<()>;

    /// Gets all links of a block in insertion order
    fn get_links_by_block(&self, block_id: i64) -> StorageResult<Vec<LinkRecord>>;

    /// Gets the links of a block in one status, in insertion order
    fn get_links_by_status(
        &self,
        block_id: i64,
        status: LinkStatus,
    ) -> StorageResult<Vec<LinkRecord>>;

    /// Resets every DOWNLOADING link to QUEUED
    ///
    /// # Returns
    ///
    /// The number of links recovered
    fn recover_downloading_links(&mut self) -> StorageResult<usize>;

    // ===== Page Management =====

    /// Inserts a page in status `new`, or returns the ID of the existing row
    fn create_page(&mut self, url: &str, page_number: u32) -> StorageResult<i64>;

    /// Gets a page by URL
    fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    /// Updates the status of a page
    ///
    /// `blocks_found` is only written when supplied; `error` always overwrites, so a
    /// successful pass clears an earlier failure message.
    fn update_page_status(
        &mut self,
        url: &str,
        status: PageStatus,
        blocks_found: Option<u32>,
        error: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets the done page with the highest page number
    fn get_last_done_page(&self) -> StorageResult<Option<PageRecord>>;

    /// Resets every `processing` page to `new`
    fn recover_processing_pages(&mut self) -> StorageResult<usize>;
}
