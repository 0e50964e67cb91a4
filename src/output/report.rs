use crate::state::LinkStatus;
use crate::storage::BlockRecord;
use serde::Serialize;

/// Outcome of processing one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockReport {
    pub block_id: i64,
    /// Numbered slug, also the image directory name
    pub slug: String,
    pub title: String,
    pub total_links: usize,
    pub done: usize,
    pub failed: usize,
    /// Links still NEW or QUEUED after the run
    pub queued: usize,
}

impl BlockReport {
    /// Builds a report from a block with its links loaded
    pub fn from_block(block: &BlockRecord) -> Self {
        Self {
            block_id: block.id,
            slug: block.slug.clone(),
            title: block.title.clone(),
            total_links: block.links.len(),
            done: block.count_status(LinkStatus::Done),
            failed: block.count_status(LinkStatus::Failed),
            queued: block.links.iter().filter(|l| l.status.is_pending()).count(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done == self.total_links
    }
}

/// Outcome of a crawl over listing pages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub pages_processed: u32,
    pub pages_failed: u32,
    pub blocks: Vec<BlockReport>,
}

impl CrawlSummary {
    pub fn total_links(&self) -> usize {
        self.blocks.iter().map(|b| b.total_links).sum()
    }

    pub fn done_links(&self) -> usize {
        self.blocks.iter().map(|b| b.done).sum()
    }

    pub fn failed_links(&self) -> usize {
        self.blocks.iter().map(|b| b.failed).sum()
    }
}

/// Prints one line per block to stdout
pub fn print_block_reports(reports: &[BlockReport]) {
    if reports.is_empty() {
        println!("No blocks found.");
        return;
    }

    for report in reports {
        println!(
            "  [{}] {}: {}/{} done, {} failed, {} queued",
            report.block_id,
            report.slug,
            report.done,
            report.total_links,
            report.failed,
            report.queued
        );
    }
}

/// Prints a crawl summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");
    println!("Pages processed: {}", summary.pages_processed);
    println!("Pages failed: {}", summary.pages_failed);
    println!("Blocks: {}", summary.blocks.len());
    println!();

    println!("Blocks:");
    print_block_reports(&summary.blocks);
    println!();

    let total = summary.total_links();
    let done = summary.done_links();
    let rate = if total > 0 {
        (done as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Success Rate: {:.1}% ({} / {} links downloaded, {} failed)",
        rate,
        done,
        total,
        summary.failed_links()
    );
}
