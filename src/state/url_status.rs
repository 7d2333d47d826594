/// Crawl status definitions for frontier records
///
/// A URL moves `New -> InProgress -> Success | Failed`; a failed URL is claimed
/// again until its attempt counter reaches the retry ceiling.
use std::fmt;

/// Represents the current crawl status of a URL record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlStatus {
    /// Discovered but never attempted
    New,

    /// Handed to a worker; left in this state if the run was interrupted
    InProgress,

    /// Fetched and parsed, content stored
    Success,

    /// Last attempt failed; retryable while attempts stay under the ceiling
    Failed,
}

impl UrlStatus {
    /// Returns true if a record in this status may be claimed again
    /// (subject to the retry ceiling)
    pub fn is_claimable(&self) -> bool {
        !matches!(self, Self::Success)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "in_progress" => Some(Self::InProgress),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all statuses
    pub fn all() -> [Self; 4] {
        [Self::New, Self::InProgress, Self::Success, Self::Failed]
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// How a failed attempt should be recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Counts one attempt; the URL stays claimable under the ceiling
    Retryable,

    /// Attempts exhausted; the URL is never claimed again
    Terminal,
}
