//! Image download engine
//!
//! This module handles fetching individual image links, including:
//! - Nested global and per-host concurrency gates
//! - Resuming from `<name>.part` files with byte-range requests
//! - Content-Type validation
//! - Classification of every attempt into success, retryable or permanent
//! - Atomic rename of the finished file

use crate::config::DownloadConfig;
use crate::downloader::backoff::{RetryDecision, RetryPolicy};
use crate::downloader::limiter::HostLimiter;
use crate::downloader::status::{DownloadStats, LinkEvent, StatusSink};
use crate::fs::sanitize_filename;
use crate::state::LinkStatus;
use crate::storage::LinkRecord;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE, ETAG, LAST_MODIFIED, RANGE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// Metadata of a completed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    /// Bytes on disk after completion
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Classified outcome of one HTTP attempt
#[derive(Debug)]
enum Attempt {
    /// The file is complete under its final name
    Success(Downloaded),

    /// Transient: network failure, rate limiting, non-success status
    Retryable {
        reason: String,
        retry_after: Option<Duration>,
    },

    /// Never retried: wrong content type or a local error
    Permanent(String),
}

impl Attempt {
    fn retry(reason: impl Into<String>) -> Self {
        Self::Retryable {
            reason: reason.into(),
            retry_after: None,
        }
    }
}

/// Builds the HTTP client used for image downloads
///
/// Transparent decompression is disabled so byte offsets and Content-Length refer to
/// the bytes written to disk.
pub fn build_download_client(config: &DownloadConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(30))
        .no_gzip()
        .no_brotli()
        .build()
}

/// Concurrent, resumable image downloader
///
/// Cloning is cheap; clones share the HTTP client and both concurrency gates.
#[derive(Clone)]
pub struct DownloadEngine {
    client: Client,
    global: Arc<Semaphore>,
    hosts: Arc<HostLimiter>,
    policy: RetryPolicy,
    chunk_size: usize,
}

impl DownloadEngine {
    /// Creates an engine from the download configuration
    pub fn new(config: &DownloadConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_download_client(config)?, config))
    }

    /// Creates an engine around an existing HTTP client
    pub fn with_client(client: Client, config: &DownloadConfig) -> Self {
        Self {
            client,
            global: Arc::new(Semaphore::new(config.global_limit)),
            hosts: Arc::new(HostLimiter::new(config.per_host_limit)),
            policy: RetryPolicy::from_config(config),
            chunk_size: config.chunk_size,
        }
    }

    /// Downloads every link into `out_dir` and waits for all of them
    ///
    /// Each link runs as its own task; one link failing (or panicking) does not affect
    /// the others. Transitions are reported to `sink` as they happen.
    pub async fn download_links(
        &self,
        links: Vec<LinkRecord>,
        out_dir: &Path,
        sink: Arc<dyn StatusSink>,
    ) -> DownloadStats {
        let mut stats = DownloadStats {
            total: links.len(),
            ..DownloadStats::default()
        };
        if links.is_empty() {
            return stats;
        }

        if let Err(e) = fs::create_dir_all(out_dir).await {
            tracing::error!("Cannot create {}: {}", out_dir.display(), e);
        }

        let filenames = assign_filenames(&links, out_dir);
        let mut tasks = JoinSet::new();
        for (link, filename) in links.into_iter().zip(filenames) {
            let engine = self.clone();
            let dir = out_dir.to_path_buf();
            let sink = Arc::clone(&sink);
            tasks.spawn(async move {
                engine
                    .download_as(&link, filename, &dir, sink.as_ref())
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(LinkStatus::Done) => stats.done += 1,
                Ok(LinkStatus::Failed) => stats.failed += 1,
                Ok(_) => {}
                Err(e) => tracing::error!("Download task ended abnormally: {}", e),
            }
        }

        stats.pending = stats.total - stats.done - stats.failed;
        tracing::info!(
            "Batch finished: {} done, {} failed, {} pending of {}",
            stats.done,
            stats.failed,
            stats.pending,
            stats.total
        );
        stats
    }

    /// Downloads one link under both concurrency gates
    ///
    /// Emits `Downloading` once the gates are held, then exactly one terminal event.
    /// Returns the terminal status. The file keeps the name recorded by an earlier
    /// attempt, if any.
    pub async fn download_link(
        &self,
        link: &LinkRecord,
        out_dir: &Path,
        sink: &dyn StatusSink,
    ) -> LinkStatus {
        let filename = link
            .filename
            .clone()
            .unwrap_or_else(|| filename_for(&link.url));
        self.download_as(link, filename, out_dir, sink).await
    }

    async fn download_as(
        &self,
        link: &LinkRecord,
        filename: String,
        out_dir: &Path,
        sink: &dyn StatusSink,
    ) -> LinkStatus {
        let event = match self.gated_download(link, filename, out_dir, sink).await {
            Ok((filename, done)) => LinkEvent::Done {
                filename,
                size: done.size,
                etag: done.etag,
                last_modified: done.last_modified,
            },
            Err(error) => {
                tracing::error!("Failed {}: {}", link.url, error);
                LinkEvent::Failed {
                    error,
                    increment_retries: true,
                }
            }
        };

        sink.on_event(link, &event);
        event.status()
    }

    async fn gated_download(
        &self,
        link: &LinkRecord,
        filename: String,
        out_dir: &Path,
        sink: &dyn StatusSink,
    ) -> Result<(String, Downloaded), String> {
        let _global = Arc::clone(&self.global)
            .acquire_owned()
            .await
            .map_err(|e| format!("Global limiter closed: {}", e))?;
        let _host = self
            .hosts
            .acquire(&link.url)
            .await
            .map_err(|e| format!("Host limiter closed: {}", e))?;

        sink.on_event(
            link,
            &LinkEvent::Downloading {
                filename: filename.clone(),
            },
        );

        let downloaded = self.fetch(&link.url, &out_dir.join(&filename)).await?;
        tracing::debug!("Saved {} ({} bytes)", filename, downloaded.size);
        Ok((filename, downloaded))
    }

    /// Runs the attempt loop for one URL, writing the result to `dest`
    ///
    /// Returns the error text of the permanent failure on `Err`.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<Downloaded, String> {
        let part = part_path(dest);
        let mut attempts_used = 0;

        loop {
            match self.attempt(url, &part, dest).await {
                Attempt::Success(done) => return Ok(done),
                Attempt::Permanent(error) => return Err(error),
                Attempt::Retryable {
                    reason,
                    retry_after,
                } => {
                    attempts_used += 1;
                    match self.policy.after_failure(attempts_used, &reason, retry_after) {
                        RetryDecision::Retry(delay) => {
                            tracing::warn!(
                                "{} (attempt {}/{}), retrying {} in {:?}",
                                reason,
                                attempts_used,
                                self.policy.max_retries,
                                url,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                        // A rate limit on the last attempt gives up without waiting.
                        RetryDecision::GiveUp(error) => return Err(error),
                    }
                }
            }
        }
    }

    async fn attempt(&self, url: &str, part: &Path, dest: &Path) -> Attempt {
        // Re-read on every attempt; a failed attempt may have appended bytes.
        let offset = match fs::metadata(part).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.client.get(url);
        if offset > 0 {
            tracing::debug!("Resuming {} from byte {}", url, offset);
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return classify_request_error(&e),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Attempt::Retryable {
                reason: format!("Rate limited (HTTP {})", status.as_u16()),
                retry_after: retry_after(response.headers()),
            };
        }

        if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
            if let Err(e) = fs::remove_file(part).await {
                return Attempt::Permanent(format!("Cannot discard {}: {}", part.display(), e));
            }
            return Attempt::retry("Range not satisfiable, restarting from byte 0");
        }

        if !status.is_success() {
            return Attempt::retry(format!("HTTP {}", status));
        }

        let content_type = header_text(response.headers(), CONTENT_TYPE).unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Attempt::Permanent(format!("Invalid content type: {}", content_type));
        }

        let append = offset > 0 && status == StatusCode::PARTIAL_CONTENT;
        if offset > 0 && !append {
            tracing::debug!("Server ignored range for {}, rewriting", url);
        }
        let expected = response
            .content_length()
            .map(|len| if append { offset + len } else { len });
        let etag = header_text(response.headers(), ETAG);
        let last_modified = header_text(response.headers(), LAST_MODIFIED);

        let file = if append {
            OpenOptions::new().append(true).open(part).await
        } else {
            fs::File::create(part).await
        };
        let file = match file {
            Ok(file) => file,
            Err(e) => return Attempt::Permanent(format!("Cannot open {}: {}", part.display(), e)),
        };

        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Keep what reached the disk; the next attempt resumes from it.
                    let _ = writer.flush().await;
                    return classify_request_error(&e);
                }
            };
            if let Err(e) = writer.write_all(&chunk).await {
                return Attempt::Permanent(format!("Write to {} failed: {}", part.display(), e));
            }
        }
        if let Err(e) = writer.flush().await {
            return Attempt::Permanent(format!("Write to {} failed: {}", part.display(), e));
        }
        drop(writer);

        let size = match fs::metadata(part).await {
            Ok(meta) => meta.len(),
            Err(e) => return Attempt::Permanent(format!("Cannot stat {}: {}", part.display(), e)),
        };
        if let Some(expected) = expected {
            if expected != size {
                tracing::warn!(
                    "Size mismatch for {}: expected {} bytes, got {}",
                    url,
                    expected,
                    size
                );
            }
        }

        if let Err(e) = fs::rename(part, dest).await {
            return Attempt::Permanent(format!("Cannot finalize {}: {}", dest.display(), e));
        }

        Attempt::Success(Downloaded {
            size,
            etag,
            last_modified,
        })
    }
}

/// Derives the on-disk filename for an image URL
///
/// The last path segment, sanitized; URLs without one get `image_<hash>.jpg`.
pub fn filename_for(url: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty());

    match segment {
        Some(segment) => sanitize_filename(&segment),
        None => {
            let digest = hex::encode(Sha256::digest(url.as_bytes()));
            format!("image_{}.jpg", &digest[..16])
        }
    }
}

/// Picks one distinct filename per link for a batch written to `out_dir`
///
/// Names recorded by an earlier attempt are kept so partial files resume. A fresh name
/// that is already claimed in the batch, or already on disk, gets a short hash of the
/// URL appended to its stem (`x.jpg` becomes `x_1a2b3c4d.jpg`).
pub fn assign_filenames(links: &[LinkRecord], out_dir: &Path) -> Vec<String> {
    let mut taken: HashSet<String> = links.iter().filter_map(|l| l.filename.clone()).collect();

    links
        .iter()
        .map(|link| {
            if let Some(name) = &link.filename {
                return name.clone();
            }

            let mut name = filename_for(&link.url);
            if taken.contains(&name) || out_dir.join(&name).exists() {
                name = with_url_suffix(&name, &link.url);
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

fn with_url_suffix(name: &str, url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let suffix = &digest[..8];
    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{}_{}{}", &name[..idx], suffix, &name[idx..]),
        _ => format!("{}_{}", name, suffix),
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn classify_request_error(e: &reqwest::Error) -> Attempt {
    if e.is_builder() {
        return Attempt::Permanent(format!("Invalid request: {}", e));
    }

    let kind = if e.is_timeout() {
        "Timeout"
    } else if e.is_connect() {
        "Connection error"
    } else if e.is_body() || e.is_decode() {
        "Body error"
    } else {
        "Network error"
    };
    Attempt::retry(format!("{}: {}", kind, e))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_text(headers, RETRY_AFTER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

fn header_text(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
