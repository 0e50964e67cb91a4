use forum_loader::config::{parse_config, Config, DownloadConfig};
use forum_loader::downloader::{LinkEvent, StatusSink};
use forum_loader::state::LinkStatus;
use forum_loader::storage::LinkRecord;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Download settings with millisecond backoff so retries finish quickly
pub fn fast_download_config() -> DownloadConfig {
    DownloadConfig {
        max_retries: 3,
        timeout_secs: 10,
        backoff_base_ms: 10,
        backoff_cap_ms: 40,
        jitter_ms: 0,
        ..DownloadConfig::default()
    }
}

/// Configuration for a forum served at `domain`, with all output under `dir`
pub fn forum_config(dir: &Path, domain: &str, extra: &str) -> Config {
    let toml = format!(
        r#"
[forum]
domain = "{domain}"
start-url = "/viewtopic.php?t=7"
{extra}

[download]
max-retries = 2
timeout-secs = 10
backoff-base-ms = 10
backoff-cap-ms = 20
jitter-ms = 0

[output]
database-path = "{db}"
img-dir = "{img}"
links-dir = "{links}"
"#,
        domain = domain,
        extra = extra,
        db = dir.join("data/loader.db").display(),
        img = dir.join("img").display(),
        links = dir.join("links").display(),
    );
    parse_config(&toml).expect("test config should parse")
}

pub fn link_record(id: i64, url: &str) -> LinkRecord {
    LinkRecord {
        id,
        block_id: 1,
        url: url.to_string(),
        referer: None,
        status: LinkStatus::Queued,
        filename: None,
        size: None,
        etag: None,
        last_modified: None,
        retries: 0,
        error: None,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

/// Deterministic pseudo-image payload
pub fn image_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Records every event it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(i64, LinkEvent)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(i64, LinkEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses_for(&self, link_id: i64) -> Vec<LinkStatus> {
        self.events()
            .into_iter()
            .filter(|(id, _)| *id == link_id)
            .map(|(_, event)| event.status())
            .collect()
    }
}

impl StatusSink for RecordingSink {
    fn on_event(&self, link: &LinkRecord, event: &LinkEvent) {
        self.events.lock().unwrap().push((link.id, event.clone()));
    }
}
