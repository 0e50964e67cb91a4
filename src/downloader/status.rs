use crate::state::LinkStatus;
use crate::storage::{LinkChanges, LinkRecord};

/// A link status transition reported by the download engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Both concurrency gates are held and the first attempt is about to start
    Downloading { filename: String },

    /// The file is complete under its final name
    Done {
        filename: String,
        size: u64,
        etag: Option<String>,
        last_modified: Option<String>,
    },

    /// Permanent failure
    Failed {
        error: String,
        increment_retries: bool,
    },
}

impl LinkEvent {
    /// Status the link moves to
    pub fn status(&self) -> LinkStatus {
        match self {
            Self::Downloading { .. } => LinkStatus::Downloading,
            Self::Done { .. } => LinkStatus::Done,
            Self::Failed { .. } => LinkStatus::Failed,
        }
    }

    /// Fields to persist alongside the status
    pub fn changes(&self) -> LinkChanges {
        match self {
            Self::Downloading { filename } => LinkChanges {
                filename: Some(filename.clone()),
                ..LinkChanges::default()
            },
            Self::Done {
                filename,
                size,
                etag,
                last_modified,
            } => LinkChanges {
                filename: Some(filename.clone()),
                size: Some(*size),
                etag: etag.clone(),
                last_modified: last_modified.clone(),
                ..LinkChanges::default()
            },
            Self::Failed {
                error,
                increment_retries,
            } => LinkChanges {
                error: Some(error.clone()),
                increment_retries: *increment_retries,
                ..LinkChanges::default()
            },
        }
    }
}

/// Receives every link transition, synchronously, from download tasks
pub trait StatusSink: Send + Sync {
    fn on_event(&self, link: &LinkRecord, event: &LinkEvent);
}

impl<F> StatusSink for F
where
    F: Fn(&LinkRecord, &LinkEvent) + Send + Sync,
{
    fn on_event(&self, link: &LinkRecord, event: &LinkEvent) {
        self(link, event)
    }
}

/// Outcome counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    /// Links whose task ended without a terminal event
    pub pending: usize,
}
