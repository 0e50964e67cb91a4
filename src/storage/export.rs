//! Per-block export snapshots
//!
//! Writes `all_links.jsonl`, `done_links.jsonl` and `manifest.json` under
//! `<links-root>/<numbered slug>/`. Every call overwrites the previous snapshot.

use crate::fs::{atomic_write_json, atomic_write_jsonl};
use crate::state::LinkStatus;
use crate::storage::{LinkRecord, Storage, StorageError, StorageResult};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const ALL_LINKS_FILE: &str = "all_links.jsonl";
pub const DONE_LINKS_FILE: &str = "done_links.jsonl";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Summary document written next to the JSONL exports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub block_id: i64,
    pub title: String,
    pub slug: String,
    pub created_at: String,
    pub total_links: usize,
    pub done_links: usize,
    pub failed_links: usize,
    pub exported_at: String,
}

/// Where an export landed and what it contained
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub dir: PathBuf,
    pub manifest: Manifest,
}

/// Exports the current persisted state of one block
///
/// # Arguments
///
/// * `storage` - Store to read the block and its links from
/// * `slug` - Numbered slug of the block
/// * `links_root` - Export root; the block gets its own subdirectory
///
/// # Returns
///
/// * `Ok(ExportSummary)` - All three files written
/// * `Err(StorageError::BlockNotFound)` - No block with that slug
pub fn export_block<S: Storage + ?Sized>(
    storage: &S,
    slug: &str,
    links_root: &Path,
) -> StorageResult<ExportSummary> {
    let block = storage
        .get_block_by_slug(slug)?
        .ok_or_else(|| StorageError::BlockNotFound(slug.to_string()))?;

    let dir = links_root.join(&block.slug);
    let done: Vec<&LinkRecord> = block
        .links
        .iter()
        .filter(|l| l.status == LinkStatus::Done)
        .collect();

    atomic_write_jsonl(&dir.join(ALL_LINKS_FILE), &block.links)?;
    atomic_write_jsonl(&dir.join(DONE_LINKS_FILE), &done)?;

    let manifest = Manifest {
        block_id: block.id,
        title: block.title.clone(),
        slug: block.slug.clone(),
        created_at: block.created_at.clone(),
        total_links: block.links.len(),
        done_links: done.len(),
        failed_links: block.count_status(LinkStatus::Failed),
        exported_at: Utc::now().to_rfc3339(),
    };
    atomic_write_json(&dir.join(MANIFEST_FILE), &manifest)?;

    tracing::debug!(
        "Exported {} links ({} done) for {} to {}",
        manifest.total_links,
        manifest.done_links,
        block.slug,
        dir.display()
    );

    Ok(ExportSummary { dir, manifest })
}
