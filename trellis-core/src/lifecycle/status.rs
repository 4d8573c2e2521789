//! Addin status graph and status events

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_addin_api::AddinId;
use uuid::Uuid;

/// Lifecycle status of one addin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddinStatus {
    /// Listed in the activation plan
    Discovered,
    /// Manifest validated, dependencies resolved, builders registered
    Resolved,
    /// Code loaded, start side effects done
    Started,
    /// Teardown in progress, code still loaded
    Stopping,
    Stopped,
    Failed,
}

impl AddinStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Resolved => "resolved",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// `Stopped` and `Failed` are never left again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// The regular successor, `None` for terminal statuses
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Discovered => Some(Self::Resolved),
            Self::Resolved => Some(Self::Started),
            Self::Started => Some(Self::Stopping),
            Self::Stopping => Some(Self::Stopped),
            Self::Stopped | Self::Failed => None,
        }
    }

    pub fn can_transition_to(self, to: Self) -> bool {
        match to {
            Self::Failed => !self.is_terminal(),
            _ => self.next() == Some(to),
        }
    }
}

impl fmt::Display for AddinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an addin ended up `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddinFailure {
    /// Status the addin was in
    pub from: AddinStatus,
    /// Status the offending transition was heading for
    pub attempted: AddinStatus,
    pub message: String,
}

impl fmt::Display for AddinFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.from, self.attempted, self.message)
    }
}

/// One status transition of one addin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub addin: AddinId,
    pub old_status: AddinStatus,
    pub new_status: AddinStatus,
    /// Set when `new_status` is `Failed`
    pub failure: Option<AddinFailure>,
}

impl StatusEvent {
    pub fn new(addin: AddinId, old_status: AddinStatus, new_status: AddinStatus) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            addin,
            old_status,
            new_status,
            failure: None,
        }
    }

    pub fn with_failure(mut self, failure: AddinFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.addin, self.old_status, self.new_status)?;
        if let Some(failure) = &self.failure {
            write!(f, " ({})", failure.message)?;
        }
        Ok(())
    }
}
