//! HTTP fetcher for forum listing pages
//!
//! The orchestrator only needs two things from a page source: the HTML behind a URL and
//! the hrefs of its pagination bar. `PageFetcher` abstracts both so crawls can run
//! against canned pages in tests.

use crate::config::Config;
use crate::crawler::parser;
use crate::LoaderError;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

/// Source of listing pages
pub trait PageFetcher: Send + Sync {
    /// Fetches the HTML at `url`; non-success responses are errors
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, LoaderError>> + Send;

    /// Pagination hrefs found in a page, in document order
    fn find_pagination_links(&self, html: &str) -> Vec<String> {
        parser::find_pagination_links(html)
    }
}

/// Builds the HTTP client used for listing pages
///
/// # Arguments
///
/// * `user_agent` - Browser-like User-Agent string
/// * `timeout` - Whole-request timeout
pub fn build_page_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.to_string())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(30))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `PageFetcher` backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_page_client(user_agent, timeout)?,
        })
    }

    /// Uses the download User-Agent and the forum request timeout
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let timeout_secs = config
            .forum
            .as_ref()
            .map(|forum| forum.request_timeout_secs)
            .unwrap_or(60);
        Self::new(&config.download.user_agent, Duration::from_secs(timeout_secs))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, LoaderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| LoaderError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoaderError::Fetch {
                url: url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        response.text().await.map_err(|source| LoaderError::Http {
            url: url.to_string(),
            source,
        })
    }
}
