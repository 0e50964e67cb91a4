//! Pagination URL arithmetic
//!
//! Maps page numbers (0 = first page) to listing URLs and back, and picks the next page
//! out of the pagination links found on the current one. Holds no crawl state.

use crate::config::{ForumConfig, PageKind};
use url::form_urlencoded;
use url::Url;

/// Stateless page-number/URL mapper for one thread
#[derive(Debug, Clone)]
pub struct PaginationManager {
    /// Forum root without trailing slash
    domain: String,
    /// Start URL with the pagination parameter removed
    base_url: Url,
    param: String,
    kind: PageKind,
    page_size: u32,
}

impl PaginationManager {
    /// Creates a manager for the thread at `domain` + `start_url`
    ///
    /// # Arguments
    ///
    /// * `domain` - Forum root, e.g. `https://forum.example.com`
    /// * `start_url` - Thread path, e.g. `/viewtopic.php?t=42&start=30`; any pagination
    ///   parameter it carries is stripped
    /// * `param` - Pagination query parameter name
    /// * `kind` - Whether the parameter counts items or pages
    /// * `page_size` - Items per page for offset-style pagination
    pub fn new(
        domain: &str,
        start_url: &str,
        param: &str,
        kind: PageKind,
        page_size: u32,
    ) -> Result<Self, url::ParseError> {
        let domain = domain.trim_end_matches('/').to_string();
        let start = if start_url.starts_with("http://") || start_url.starts_with("https://") {
            Url::parse(start_url)?
        } else if start_url.starts_with('/') {
            Url::parse(&format!("{}{}", domain, start_url))?
        } else {
            Url::parse(&format!("{}/{}", domain, start_url))?
        };

        let mut base_url = start;
        base_url.set_fragment(None);
        let kept: Vec<(String, String)> = base_url
            .query_pairs()
            .filter(|(key, _)| key != param)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            base_url.set_query(None);
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(kept)
                .finish();
            base_url.set_query(Some(&query));
        }

        Ok(Self {
            domain,
            base_url,
            param: param.to_string(),
            kind,
            page_size: page_size.max(1),
        })
    }

    pub fn from_config(forum: &ForumConfig) -> Result<Self, url::ParseError> {
        Self::new(
            &forum.domain,
            &forum.start_url,
            &forum.page_param,
            forum.page_kind(),
            forum.page_size,
        )
    }

    /// URL of page 0, without a pagination parameter
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// URL of the given page
    ///
    /// ```
    /// use forum_loader::config::PageKind;
    /// use forum_loader::crawler::PaginationManager;
    ///
    /// let pager = PaginationManager::new(
    ///     "https://forum.example.com", "/viewtopic.php?t=1", "start", PageKind::Offset, 15,
    /// ).unwrap();
    /// assert_eq!(pager.page_url(0), "https://forum.example.com/viewtopic.php?t=1");
    /// assert_eq!(pager.page_url(2), "https://forum.example.com/viewtopic.php?t=1&start=30");
    /// ```
    pub fn page_url(&self, page: u32) -> String {
        if page == 0 {
            return self.base_url.to_string();
        }

        let value = match self.kind {
            PageKind::Offset => u64::from(page) * u64::from(self.page_size),
            PageKind::Page => u64::from(page) + 1,
        };

        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair(&self.param, &value.to_string());
        url.into()
    }

    /// Page number encoded in a URL (absolute or relative to the forum root)
    ///
    /// A missing or non-numeric parameter means page 0; results never go below 0.
    pub fn page_number(&self, url: &str) -> u32 {
        let Some(url) = self.resolve(url) else {
            return 0;
        };

        let value = url
            .query_pairs()
            .find(|(key, _)| key == self.param.as_str())
            .and_then(|(_, v)| v.trim().parse::<i64>().ok());

        let page = match (value, self.kind) {
            (None, _) => 0,
            (Some(v), PageKind::Offset) => v.div_euclid(i64::from(self.page_size)),
            (Some(v), PageKind::Page) => v - 1,
        };
        page.clamp(0, i64::from(u32::MAX)) as u32
    }

    /// Finds the link to the page right after `current_url`
    ///
    /// Returns the absolute URL of the first href whose page number is exactly one more
    /// than the current page.
    pub fn find_next_page(&self, current_url: &str, hrefs: &[String]) -> Option<String> {
        let target = self.page_number(current_url) + 1;

        hrefs
            .iter()
            .filter(|href| !href.is_empty() && !href.starts_with('#'))
            .filter_map(|href| self.resolve(href))
            .find(|url| self.page_number(url.as_str()) == target)
            .map(String::from)
    }

    /// Highest page number among the pagination links
    ///
    /// `None` when no link points past the first page.
    pub fn find_last_page(&self, hrefs: &[String]) -> Option<u32> {
        hrefs
            .iter()
            .filter(|href| !href.is_empty() && !href.starts_with('#'))
            .map(|href| self.page_number(href))
            .max()
            .filter(|last| *last > 0)
    }

    /// Resolves an href against the forum root
    ///
    /// Absolute http(s) links are kept; `./x`, `/x` and `x` all become `<domain>/x`.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.starts_with("http://") || href.starts_with("https://") {
            return Url::parse(href).ok();
        }

        let path = href.strip_prefix("./").unwrap_or(href);
        let path = path.strip_prefix('/').unwrap_or(path);
        Url::parse(&format!("{}/{}", self.domain, path)).ok()
    }
}

/// Returns the next page number only if it moves the crawl forward
///
/// Malformed or cyclic pagination can point back at the current page or an earlier
/// one; following it would loop forever.
pub fn advance(current: u32, next: u32) -> Option<u32> {
    (next > current).then_some(next)
}
