use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Browser-like User-Agent sent with every request unless overridden
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Main configuration structure for Forum-Loader
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Forum to crawl; required only when crawling by URL
    #[serde(default)]
    pub forum: Option<ForumConfig>,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// How the pagination query parameter encodes position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    /// Parameter carries a running item count (`start=30`)
    Offset,
    /// Parameter carries a 1-based page index (`page=3`)
    Page,
}

/// Forum and pagination configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ForumConfig {
    /// Scheme and host of the forum, e.g. `https://forum.example.com`
    pub domain: String,

    /// Path (and query) of the first thread page
    #[serde(rename = "start-url")]
    pub start_url: String,

    /// Name of the pagination query parameter
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Explicit pagination kind; inferred from the parameter name when absent
    #[serde(rename = "page-kind", default)]
    pub page_kind: Option<PageKind>,

    /// Posts per page for offset-style pagination
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Stop after processing this many pages in one session
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    /// Deadline for fetching one listing page (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Stop the crawl after this many failed pages in a row
    #[serde(rename = "max-consecutive-failures", default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl ForumConfig {
    /// Resolved pagination kind: `start` counts items, anything else counts pages
    pub fn page_kind(&self) -> PageKind {
        self.page_kind.unwrap_or(if self.page_param == "start" {
            PageKind::Offset
        } else {
            PageKind::Page
        })
    }

    /// Host name of the forum, used to namespace output directories
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.domain)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }
}

/// Download engine limits and retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Maximum simultaneous downloads across all hosts
    #[serde(rename = "global-limit", default = "default_global_limit")]
    pub global_limit: usize,

    /// Maximum simultaneous downloads against one host
    #[serde(rename = "per-host-limit", default = "default_per_host_limit")]
    pub per_host_limit: usize,

    /// Attempts per link before it is marked failed
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request deadline (seconds)
    #[serde(rename = "timeout-secs", default = "default_download_timeout")]
    pub timeout_secs: u64,

    /// Write buffer size for streamed bodies (bytes)
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// First backoff step (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Backoff ceiling before jitter (milliseconds)
    #[serde(rename = "backoff-cap-ms", default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,

    /// Upper bound of random jitter added to each backoff (milliseconds)
    #[serde(rename = "jitter-ms", default = "default_jitter")]
    pub jitter_ms: u64,
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            global_limit: default_global_limit(),
            per_host_limit: default_per_host_limit(),
            max_retries: default_max_retries(),
            timeout_secs: default_download_timeout(),
            chunk_size: default_chunk_size(),
            user_agent: default_user_agent(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            jitter_ms: default_jitter(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: PathBuf,

    /// Root directory for downloaded images
    #[serde(rename = "img-dir", default = "default_img_dir")]
    pub img_dir: PathBuf,

    /// Root directory for link exports
    #[serde(rename = "links-dir", default = "default_links_dir")]
    pub links_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            img_dir: default_img_dir(),
            links_dir: default_links_dir(),
        }
    }
}

/// Concrete on-disk locations for one forum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub database_path: PathBuf,
    pub img_dir: PathBuf,
    pub links_dir: PathBuf,
}

impl Config {
    /// Resolves output paths, namespacing them by forum host when one is configured
    ///
    /// `data/loader.db` becomes `data/<host>/loader.db`; `img` becomes `img/<host>`.
    pub fn layout(&self) -> OutputLayout {
        let host = self.forum.as_ref().and_then(ForumConfig::host);
        let out = &self.output;

        match host {
            Some(host) => {
                let db_name = out
                    .database_path
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("loader.db"));
                let db_parent = out
                    .database_path
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_default();
                OutputLayout {
                    database_path: db_parent.join(&host).join(db_name),
                    img_dir: out.img_dir.join(&host),
                    links_dir: out.links_dir.join(&host),
                }
            }
            None => OutputLayout {
                database_path: out.database_path.clone(),
                img_dir: out.img_dir.clone(),
                links_dir: out.links_dir.clone(),
            },
        }
    }
}

fn default_page_param() -> String {
    "start".to_string()
}

fn default_page_size() -> u32 {
    15
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_global_limit() -> usize {
    10
}

fn default_per_host_limit() -> usize {
    3
}

fn default_max_retries() -> u32 {
    5
}

fn default_download_timeout() -> u64 {
    300
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_backoff_base() -> u64 {
    1_000
}

fn default_backoff_cap() -> u64 {
    60_000
}

fn default_jitter() -> u64 {
    1_000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/loader.db")
}

fn default_img_dir() -> PathBuf {
    PathBuf::from("img")
}

fn default_links_dir() -> PathBuf {
    PathBuf::from("links")
}
