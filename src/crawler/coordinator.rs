//! Crawl orchestration
//!
//! This module ties the pieces together for one session:
//! - Crash recovery and output directories on startup
//! - Registering extracted blocks and links in the store
//! - Handing queued links to the download engine, with status written back to the store
//! - Exporting each block after its downloads settle
//! - Walking listing pages with resume, page-level failures and the forward-progress guard

use crate::config::{Config, ForumConfig, OutputLayout};
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::pagination::{advance, PaginationManager};
use crate::crawler::parser::{ExtractedBlock, Extractor, ForumExtractor};
use crate::downloader::{DownloadEngine, LinkEvent, StatusSink};
use crate::output::{BlockReport, CrawlSummary};
use crate::state::{LinkStatus, PageStatus};
use crate::storage::{
    export_block, BlockRecord, ExportSummary, LinkRecord, NewLink, SqliteStorage, Storage,
};
use crate::{LoaderError, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Writes every link transition straight to the store
struct StoreSink {
    storage: Arc<Mutex<SqliteStorage>>,
}

impl StatusSink for StoreSink {
    fn on_event(&self, link: &LinkRecord, event: &LinkEvent) {
        let mut storage = self.storage.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = storage.update_link_status(link.id, event.status(), &event.changes()) {
            tracing::error!(
                "Failed to record {} for link {}: {}",
                event.status(),
                link.id,
                e
            );
        }
    }
}

/// Coordinates one crawl session against one store
pub struct Orchestrator {
    layout: OutputLayout,
    forum: Option<ForumConfig>,
    storage: Arc<Mutex<SqliteStorage>>,
    engine: DownloadEngine,
    extractor: Box<dyn Extractor>,
}

impl Orchestrator {
    /// Opens the store, runs crash recovery and creates the output directories
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration; output paths are namespaced by forum host
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to process HTML or crawl
    /// * `Err(LoaderError)` - The store or HTTP client could not be initialized
    pub fn new(config: &Config) -> Result<Self> {
        let layout = config.layout();
        std::fs::create_dir_all(&layout.img_dir)?;
        std::fs::create_dir_all(&layout.links_dir)?;

        let mut storage = SqliteStorage::new(&layout.database_path)?;

        let links = storage.recover_downloading_links()?;
        if links > 0 {
            tracing::info!("Recovered {} links from interrupted downloads", links);
        }
        let pages = storage.recover_processing_pages()?;
        if pages > 0 {
            tracing::info!("Recovered {} pages from interrupted processing", pages);
        }

        let engine = DownloadEngine::new(&config.download)?;

        Ok(Self {
            layout,
            forum: config.forum.clone(),
            storage: Arc::new(Mutex::new(storage)),
            engine,
            extractor: Box::new(ForumExtractor::new()),
        })
    }

    /// Replaces the default HTML extractor
    pub fn with_extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Shared handle to the store
    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    fn lock(&self) -> MutexGuard<'_, SqliteStorage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers one block, downloads its queued links and exports it
    ///
    /// A block that already exists under the same base slug and shares at least one link
    /// is reused; only links it does not have yet are inserted. Links without a referer
    /// get `page_url`.
    pub async fn process_block(
        &self,
        block: &ExtractedBlock,
        page_url: Option<&str>,
    ) -> Result<BlockReport> {
        let links: Vec<NewLink> = block
            .links
            .iter()
            .map(|link| NewLink {
                url: link.url.clone(),
                referer: link.referer.clone().or_else(|| page_url.map(str::to_string)),
            })
            .collect();

        let (slug, pending) = {
            let mut storage = self.lock();
            let (block_id, slug) = self.register_block(&mut storage, block, &links)?;

            let inserted = storage.add_links(block_id, &links, LinkStatus::Queued)?;
            tracing::info!(
                "Block {}: {} ({} links, {} new)",
                slug,
                block.title,
                links.len(),
                inserted
            );

            let pending = storage
                .get_block_by_slug(&slug)?
                .map(|registered| registered.pending_links())
                .unwrap_or_default();
            (slug, pending)
        };

        let img_dir = self.layout.img_dir.join(&slug);
        std::fs::create_dir_all(&img_dir)?;

        if pending.is_empty() {
            tracing::info!("No links to download for block {}", slug);
        } else {
            tracing::info!("Downloading {} images for block {}", pending.len(), slug);
            let sink: Arc<dyn StatusSink> = Arc::new(StoreSink {
                storage: Arc::clone(&self.storage),
            });
            let stats = self.engine.download_links(pending, &img_dir, sink).await;
            tracing::info!(
                "Block {} complete: {} done, {} failed, {} pending",
                slug,
                stats.done,
                stats.failed,
                stats.pending
            );
        }

        let storage = self.lock();
        export_block(&*storage, &slug, &self.layout.links_dir)?;
        let block = storage
            .get_block_by_slug(&slug)?
            .ok_or_else(|| crate::storage::StorageError::BlockNotFound(slug.clone()))?;
        Ok(BlockReport::from_block(&block))
    }

    /// Finds the block to reuse or creates a newly numbered one
    fn register_block(
        &self,
        storage: &mut SqliteStorage,
        block: &ExtractedBlock,
        links: &[NewLink],
    ) -> Result<(i64, String)> {
        let incoming: HashSet<&str> = links.iter().map(|l| l.url.as_str()).collect();
        let existing = storage
            .find_blocks_by_base_slug(&block.slug)?
            .into_iter()
            .find(|candidate| shares_link(candidate, &incoming));
        if let Some(existing) = existing {
            tracing::debug!("Reusing block {}", existing.slug);
            return Ok((existing.id, existing.slug));
        }

        let mut number = next_block_number(&self.layout.img_dir)?;
        let mut slug = numbered_slug(number, &block.slug);
        while storage.get_block_by_slug(&slug)?.is_some() {
            number += 1;
            slug = numbered_slug(number, &block.slug);
        }

        let id = storage.create_block(&block.title, &slug)?;
        Ok((id, slug))
    }

    /// Extracts blocks from one document and processes them in order
    pub async fn process_html(
        &self,
        html: &str,
        page_url: Option<&str>,
    ) -> Result<Vec<BlockReport>> {
        let blocks = self.extractor.extract(html, page_url);
        tracing::info!("Extracted {} blocks from HTML", blocks.len());

        let mut reports = Vec::with_capacity(blocks.len());
        for block in &blocks {
            reports.push(self.process_block(block, page_url).await?);
        }
        Ok(reports)
    }

    /// Walks the configured thread page by page
    ///
    /// Starts after the last page recorded as done. A page that fails is marked failed
    /// and the crawl moves to the next page number. Stops when no next page is linked,
    /// when the next page would not move forward, after `max_pages` pages (falling back
    /// to the configured ceiling) or after too many consecutive failures.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Source of listing pages
    /// * `max_pages` - Page ceiling for this session, overriding `[forum] max-pages`
    pub async fn crawl<F: PageFetcher>(
        &self,
        fetcher: &F,
        max_pages: Option<u32>,
    ) -> Result<CrawlSummary> {
        let forum = self
            .forum
            .as_ref()
            .ok_or(LoaderError::MissingConfig("[forum]"))?;
        let pager = PaginationManager::from_config(forum)?;
        let max_pages = max_pages.or(forum.max_pages);

        let mut current = match self.lock().get_last_done_page()? {
            Some(last) => {
                tracing::info!(
                    "Resuming from page {} (last processed: {})",
                    last.page_number + 1,
                    last.page_number
                );
                last.page_number + 1
            }
            None => {
                tracing::info!("Starting from first page");
                0
            }
        };

        let mut summary = CrawlSummary::default();
        let mut attempted = 0u32;
        let mut consecutive_failures = 0u32;

        loop {
            if max_pages.is_some_and(|max| attempted >= max) {
                tracing::info!("Reached max pages limit: {}", attempted);
                break;
            }

            let page_url = pager.page_url(current);
            {
                let mut storage = self.lock();
                if let Some(page) = storage.get_page(&page_url)? {
                    if page.status == PageStatus::Done {
                        tracing::debug!("Page {} already done, skipping", current);
                        current += 1;
                        continue;
                    }
                }
                storage.create_page(&page_url, current)?;
                storage.update_page_status(&page_url, PageStatus::Processing, None, None)?;
            }

            tracing::info!("Processing page {}: {}", current, page_url);
            attempted += 1;

            match self.crawl_page(fetcher, &pager, &page_url).await {
                Ok((reports, next)) => {
                    self.lock().update_page_status(
                        &page_url,
                        PageStatus::Done,
                        Some(reports.len() as u32),
                        None,
                    )?;
                    tracing::info!("Page {} complete: {} blocks", current, reports.len());
                    summary.pages_processed += 1;
                    summary.blocks.extend(reports);
                    consecutive_failures = 0;

                    let Some(next_url) = next else {
                        tracing::info!("No more pages found in pagination");
                        break;
                    };
                    let next_page = pager.page_number(&next_url);
                    match advance(current, next_page) {
                        Some(next_page) => current = next_page,
                        None => {
                            tracing::warn!(
                                "Next page {} does not move past page {}, stopping",
                                next_page,
                                current
                            );
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Error processing page {}: {}", current, e);
                    self.lock().update_page_status(
                        &page_url,
                        PageStatus::Failed,
                        None,
                        Some(&e.to_string()),
                    )?;
                    summary.pages_failed += 1;
                    consecutive_failures += 1;

                    if consecutive_failures >= forum.max_consecutive_failures {
                        tracing::warn!(
                            "{} pages failed in a row, stopping",
                            consecutive_failures
                        );
                        break;
                    }
                    current += 1;
                }
            }
        }

        tracing::info!(
            "Crawl complete: {} pages processed, {} failed, {} blocks",
            summary.pages_processed,
            summary.pages_failed,
            summary.blocks.len()
        );
        Ok(summary)
    }

    async fn crawl_page<F: PageFetcher>(
        &self,
        fetcher: &F,
        pager: &PaginationManager,
        page_url: &str,
    ) -> Result<(Vec<BlockReport>, Option<String>)> {
        let html = fetcher.fetch(page_url).await?;
        let hrefs = fetcher.find_pagination_links(&html);
        if let Some(last) = pager.find_last_page(&hrefs) {
            tracing::info!(
                "Page {} of {}",
                pager.page_number(page_url) + 1,
                last + 1
            );
        }
        let reports = self.process_html(&html, Some(page_url)).await?;
        Ok((reports, pager.find_next_page(page_url, &hrefs)))
    }

    /// Rewrites the export snapshot of every block in the store
    pub fn export_all(&self) -> Result<Vec<ExportSummary>> {
        let storage = self.lock();
        let mut exported = Vec::new();
        for block in storage.list_blocks()? {
            exported.push(export_block(&*storage, &block.slug, &self.layout.links_dir)?);
        }
        tracing::info!("Exported {} blocks", exported.len());
        Ok(exported)
    }
}

fn shares_link(block: &BlockRecord, incoming: &HashSet<&str>) -> bool {
    block.links.iter().any(|l| incoming.contains(l.url.as_str()))
}

fn numbered_slug(number: u32, slug: &str) -> String {
    format!("{:04}_{}", number, slug)
}

/// Next block number: one more than the count of numbered directories under `img_dir`
///
/// A directory counts as numbered when its first four characters are digits.
pub fn next_block_number(img_dir: &Path) -> Result<u32> {
    if !img_dir.exists() {
        return Ok(1);
    }

    let mut count = 0u32;
    for entry in std::fs::read_dir(img_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let numbered = name.chars().take(4).filter(char::is_ascii_digit).count() == 4;
        if numbered {
            count += 1;
        }
    }
    Ok(count + 1)
}
