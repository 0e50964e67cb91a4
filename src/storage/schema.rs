//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Forum-Loader database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Forum posts grouped for download
CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- One row per image URL within a block
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    block_id INTEGER NOT NULL REFERENCES blocks(id),
    url TEXT NOT NULL,
    referer TEXT,
    status TEXT NOT NULL,
    filename TEXT,
    size INTEGER,
    etag TEXT,
    last_modified TEXT,
    retries INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(block_id, url)
);

CREATE INDEX IF NOT EXISTS idx_links_status ON links(status);
CREATE INDEX IF NOT EXISTS idx_links_block_id ON links(block_id);

-- Listing pages of a paginated crawl
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    page_number INTEGER NOT NULL,
    status TEXT NOT NULL,
    blocks_found INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_status ON pages(status);
CREATE INDEX IF NOT EXISTS idx_pages_page_number ON pages(page_number);
"#;

/// Initializes the database schema
///
/// Every statement is `IF NOT EXISTS`, so this is safe to run on each open.
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
