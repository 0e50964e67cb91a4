//! Statistics generation from the loader database
//!
//! This module provides functionality for extracting and displaying
//! link statistics from the storage layer.

use crate::state::LinkStatus;
use crate::storage::{Storage, StorageResult};
use std::collections::HashMap;

/// Store-wide statistics summary
#[derive(Debug, Clone, Default)]
pub struct LoaderStatistics {
    pub total_blocks: usize,
    pub total_links: usize,
    /// Only statuses with at least one link are present
    pub links_by_status: HashMap<LinkStatus, usize>,
    /// Sum of recorded sizes of DONE links
    pub bytes_downloaded: u64,
}

impl LoaderStatistics {
    pub fn count(&self, status: LinkStatus) -> usize {
        self.links_by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
pub fn load_statistics<S: Storage + ?Sized>(storage: &S) -> StorageResult<LoaderStatistics> {
    let blocks = storage.list_blocks()?;
    let mut stats = LoaderStatistics {
        total_blocks: blocks.len(),
        ..LoaderStatistics::default()
    };

    for block in &blocks {
        for link in storage.get_links_by_block(block.id)? {
            stats.total_links += 1;
            *stats.links_by_status.entry(link.status).or_insert(0) += 1;
            if link.status == LinkStatus::Done {
                stats.bytes_downloaded += link.size.unwrap_or(0);
            }
        }
    }

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &LoaderStatistics) {
    println!("=== Loader Statistics ===\n");

    println!("Overview:");
    println!("  Blocks: {}", stats.total_blocks);
    println!("  Links: {}", stats.total_links);
    println!("  Downloaded: {:.1} MiB", stats.bytes_downloaded as f64 / 1_048_576.0);
    println!();

    println!("Links by Status:");
    for status in LinkStatus::all_statuses() {
        let count = stats.count(*status);
        if count == 0 {
            continue;
        }
        let percentage = (count as f64 / stats.total_links as f64) * 100.0;
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
}
