//! Crawler module for forum threads
//!
//! This module contains the crawl side of the loader, including:
//! - Pagination URL arithmetic
//! - Fetching listing pages
//! - HTML parsing into blocks of image links
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod pagination;
mod parser;

pub use coordinator::{next_block_number, Orchestrator};
pub use fetcher::{build_page_client, HttpPageFetcher, PageFetcher};
pub use pagination::{advance, PaginationManager};
pub use parser::{
    find_pagination_links, is_image_url, is_preview, ExtractedBlock, Extractor, ForumExtractor,
};
