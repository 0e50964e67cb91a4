//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait. A single
//! connection in autocommit mode is used; each statement is its own transaction.

use crate::state::{LinkStatus, PageStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{BlockRecord, LinkChanges, LinkRecord, NewLink, PageRecord};
use crate::LoaderError;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const BLOCK_COLUMNS: &str = "id, title, slug, created_at";

const LINK_COLUMNS: &str = "id, block_id, url, referer, status, filename, size, etag, \
     last_modified, retries, error, created_at, updated_at";

const PAGE_COLUMNS: &str =
    "id, url, page_number, status, blocks_found, error, created_at, updated_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; missing parent directories are created
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(LoaderError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, LoaderError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, LoaderError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_links(&self, block: &mut BlockRecord) -> StorageResult<()> {
        block.links = self.get_links_by_block(block.id)?;
        Ok(())
    }

    fn query_block(&self, sql: &str, arg: &str) -> StorageResult<Option<BlockRecord>> {
        let block = self
            .conn
            .query_row(sql, params![arg], block_from_row)
            .optional()?;

        match block {
            Some(mut block) => {
                self.load_links(&mut block)?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<BlockRecord> {
    Ok(BlockRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        created_at: row.get(3)?,
        links: Vec::new(),
    })
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<LinkRecord> {
    let status: String = row.get(4)?;
    let size: Option<i64> = row.get(6)?;

    Ok(LinkRecord {
        id: row.get(0)?,
        block_id: row.get(1)?,
        url: row.get(2)?,
        referer: row.get(3)?,
        status: LinkStatus::from_db_string(&status)
            .ok_or_else(|| invalid_status(4, "links.status", status))?,
        filename: row.get(5)?,
        size: size.map(|s| s.max(0) as u64),
        etag: row.get(7)?,
        last_modified: row.get(8)?,
        retries: row.get(9)?,
        error: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    let status: String = row.get(3)?;

    Ok(PageRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        page_number: row.get(2)?,
        status: PageStatus::from_db_string(&status)
            .ok_or_else(|| invalid_status(3, "pages.status", status))?,
        blocks_found: row.get(4)?,
        error: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn invalid_status(idx: usize, column: &'static str, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(StorageError::InvalidStatus { column, value }),
    )
}

impl Storage for SqliteStorage {
    // ===== Block Management =====

    fn create_block(&mut self, title: &str, slug: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO blocks (title, slug, created_at) VALUES (?1, ?2, ?3)",
            params![title, slug, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_block_by_slug(&self, slug: &str) -> StorageResult<Option<BlockRecord>> {
        let sql = format!("SELECT {} FROM blocks WHERE slug = ?1", BLOCK_COLUMNS);
        self.query_block(&sql, slug)
    }

    fn find_blocks_by_base_slug(&self, base_slug: &str) -> StorageResult<Vec<BlockRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM blocks
             WHERE instr(slug, '_') > 0 AND substr(slug, instr(slug, '_') + 1) = ?1
             ORDER BY id",
            BLOCK_COLUMNS
        ))?;
        let mut blocks = stmt
            .query_map(params![base_slug], block_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for block in &mut blocks {
            self.load_links(block)?;
        }
        Ok(blocks)
    }

    fn list_blocks(&self) -> StorageResult<Vec<BlockRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM blocks ORDER BY id", BLOCK_COLUMNS))?;
        let blocks = stmt
            .query_map([], block_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    // ===== Link Management =====

    fn add_links(
        &mut self,
        block_id: i64,
        links: &[NewLink],
        status: LinkStatus,
    ) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO links (block_id, url, referer, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )?;

        let mut inserted = 0;
        for link in links {
            inserted += stmt.execute(params![
                block_id,
                link.url,
                link.referer,
                status.to_db_string(),
                now
            ])?;
        }
        Ok(inserted)
    }

    fn update_link_status(
        &mut self,
        link_id: i64,
        status: LinkStatus,
        changes: &LinkChanges,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE links SET
                status = ?1,
                filename = COALESCE(?2, filename),
                size = COALESCE(?3, size),
                etag = COALESCE(?4, etag),
                last_modified = COALESCE(?5, last_modified),
                error = COALESCE(?6, error),
                retries = retries + ?7,
                updated_at = ?8
             WHERE id = ?9",
            params![
                status.to_db_string(),
                changes.filename,
                changes.size.map(|s| s as i64),
                changes.etag,
                changes.last_modified,
                changes.error,
                changes.increment_retries as i64,
                now,
                link_id
            ],
        )?;
        Ok(())
    }

    fn get_links_by_block(&self, block_id: i64) -> StorageResult<Vec<LinkRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM links WHERE block_id = ?1 ORDER BY id",
            LINK_COLUMNS
        ))?;
        let links = stmt
            .query_map(params![block_id], link_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn get_links_by_status(
        &self,
        block_id: i64,
        status: LinkStatus,
    ) -> StorageResult<Vec<LinkRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM links WHERE block_id = ?1 AND status = ?2 ORDER BY id",
            LINK_COLUMNS
        ))?;
        let links = stmt
            .query_map(params![block_id, status.to_db_string()], link_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn recover_downloading_links(&mut self) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let count = self.conn.execute(
            "UPDATE links SET status = ?1, updated_at = ?2 WHERE status = ?3",
            params![
                LinkStatus::Queued.to_db_string(),
                now,
                LinkStatus::Downloading.to_db_string()
            ],
        )?;
        Ok(count)
    }

    // ===== Page Management =====

    fn create_page(&mut self, url: &str, page_number: u32) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO pages (url, page_number, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![url, page_number, PageStatus::New.to_db_string(), now],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM pages WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE url = ?1", PAGE_COLUMNS),
                params![url],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn update_page_status(
        &mut self,
        url: &str,
        status: PageStatus,
        blocks_found: Option<u32>,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE pages SET
                status = ?1,
                blocks_found = COALESCE(?2, blocks_found),
                error = ?3,
                updated_at = ?4
             WHERE url = ?5",
            params![status.to_db_string(), blocks_found, error, now, url],
        )?;
        Ok(())
    }

    fn get_last_done_page(&self) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM pages WHERE status = ?1 ORDER BY page_number DESC LIMIT 1",
                    PAGE_COLUMNS
                ),
                params![PageStatus::Done.to_db_string()],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn recover_processing_pages(&mut self) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let count = self.conn.execute(
            "UPDATE pages SET status = ?1, updated_at = ?2 WHERE status = ?3",
            params![
                PageStatus::New.to_db_string(),
                now,
                PageStatus::Processing.to_db_string()
            ],
        )?;
        Ok(count)
    }
}
