/// Link status definitions for tracking download progress
///
/// A link moves NEW/QUEUED -> DOWNLOADING -> DONE | FAILED. DOWNLOADING never survives a
/// restart: the store resets it to QUEUED during recovery.
use serde::Serialize;
use std::fmt;

/// Represents the download state of a single image link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    // ===== Waiting States =====
    /// Registered but never scheduled
    New,

    /// Eligible for the next download batch
    Queued,

    // ===== In-Flight State =====
    /// A download task currently holds this link
    Downloading,

    // ===== Terminal States =====
    /// Bytes are on disk under the final filename
    Done,

    /// Permanently failed; the error text is retained
    Failed,

    /// Reserved; the engine never produces it
    Skipped,
}

impl LinkStatus {
    /// Returns true if no further download attempt will be made
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }

    /// Returns true if the link should be handed to the download engine
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::New | Self::Queued)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "queued" => Some(Self::Queued),
            "downloading" => Some(Self::Downloading),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_statuses() -> &'static [LinkStatus] {
        &[
            Self::New,
            Self::Queued,
            Self::Downloading,
            Self::Done,
            Self::Failed,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_db_string().to_uppercase())
    }
}
