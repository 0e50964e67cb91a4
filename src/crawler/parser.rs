//! HTML parser for forum listing pages
//!
//! This module turns a fetched page into blocks of image links:
//! - One block per post (`div.list-row` holding a `div.postbody`)
//! - A display title per post, with several fallbacks
//! - Full-size image links, skipping thumbnails and non-image hrefs
//!
//! It also reads the pagination bar so the orchestrator can find the next page.

use crate::fs::{slugify, DEFAULT_SLUG_LENGTH};
use crate::storage::NewLink;
use crate::url::normalize_url;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

/// Extensions accepted as image links
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// A post and its image links, as found on one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBlock {
    pub title: String,
    /// Filesystem-safe form of the title, not yet numbered
    pub slug: String,
    pub links: Vec<NewLink>,
}

/// Turns page HTML into blocks
pub trait Extractor: Send + Sync {
    /// Extracts blocks in document order
    ///
    /// # Arguments
    ///
    /// * `html` - The page content
    /// * `page_url` - The page the HTML came from, used as referer when known
    fn extract(&self, html: &str, page_url: Option<&str>) -> Vec<ExtractedBlock>;
}

/// Extractor for phpBB-style thread pages
#[derive(Debug, Clone, Copy, Default)]
pub struct ForumExtractor;

impl ForumExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for ForumExtractor {
    fn extract(&self, html: &str, page_url: Option<&str>) -> Vec<ExtractedBlock> {
        let document = Html::parse_document(html);
        let (Ok(row_selector), Ok(body_selector), Ok(subject_selector)) = (
            Selector::parse("div.list-row"),
            Selector::parse("div.postbody"),
            Selector::parse(".postsubject"),
        ) else {
            return Vec::new();
        };

        let mut blocks = Vec::new();
        for row in document.select(&row_selector) {
            let Some(postbody) = row.select(&body_selector).next() else {
                continue;
            };

            let title = extract_title(postbody)
                .or_else(|| {
                    row.select(&subject_selector).next().and_then(|subject| {
                        let text = stripped_text(subject);
                        let text = text.strip_prefix("Subject:").unwrap_or(&text).trim();
                        (!text.is_empty()).then(|| text.to_string())
                    })
                })
                .unwrap_or_else(|| "Untitled".to_string());

            let links = extract_image_links(postbody, page_url);
            if links.is_empty() {
                continue;
            }

            blocks.push(ExtractedBlock {
                slug: slugify(&title, DEFAULT_SLUG_LENGTH),
                title,
                links,
            });
        }

        tracing::debug!("Extracted {} blocks", blocks.len());
        blocks
    }
}

/// Title from the first bold span, else the bare text before the first `<br>`
fn extract_title(postbody: ElementRef<'_>) -> Option<String> {
    if let Ok(bold) = Selector::parse("span.font-weight-bold") {
        if let Some(span) = postbody.select(&bold).next() {
            let title = stripped_text(span);
            if !title.is_empty() {
                return Some(title);
            }
        }
    }

    let container = Selector::parse("div.col")
        .ok()
        .and_then(|col| postbody.select(&col).next())
        .unwrap_or(postbody);

    let mut pieces = Vec::new();
    for child in container.children() {
        match child.value() {
            Node::Element(element) if element.name() == "br" => break,
            Node::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    pieces.push(text.to_string());
                }
            }
            _ => {}
        }
    }

    let title = pieces.join(" ");
    (!title.is_empty()).then_some(title)
}

/// Concatenated text of an element, each piece trimmed
fn stripped_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect::<String>()
}

fn extract_image_links(postbody: ElementRef<'_>, page_url: Option<&str>) -> Vec<NewLink> {
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in postbody.select(&anchor) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };

        if !(href.starts_with("http://") || href.starts_with("https://")) {
            continue;
        }
        if is_preview(href) || !is_image_url(href) {
            continue;
        }

        let Ok(key) = normalize_url(href) else {
            continue;
        };
        if seen.insert(key) {
            links.push(NewLink::new(href, page_url.map(str::to_string)));
        }
    }

    links
}

/// True for thumbnail URLs (`thumb` in the path, or pixhost `tNN.` hosts)
pub fn is_preview(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    let path = parsed.path().to_lowercase();

    path.contains("thumb") || (host.ends_with(".pixhost.to") && host.starts_with('t'))
}

/// True if the URL path ends in a known image extension
pub fn is_image_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path().to_lowercase();

    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
}

/// Reads the hrefs of the pagination bar, in order, without duplicates
///
/// `#` placeholders are skipped and a leading `./` is removed.
pub fn find_pagination_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("nav[aria-label='Page navigation'] a.page-link") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href == "#" {
            continue;
        }

        let href = href.strip_prefix("./").unwrap_or(href).to_string();
        if seen.insert(href.clone()) {
            links.push(href);
        }
    }

    links
}
