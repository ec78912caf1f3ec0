//! Screen-reader announcements
//!
//! The session fires these at fixed points and never waits on them.
//! Wording belongs to whatever renders them.

use crate::types::{Choice, Phase, VoteTally};
use serde::{Deserialize, Serialize};

/// Seconds-remaining values that get a timer announcement
pub const TIMER_ANNOUNCE_THRESHOLDS: &[u32] = &[30, 20, 10, 5];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Announcement {
    PhaseChanged {
        phase: Phase,
    },
    ScenarioChanged {
        index: usize,
        total: usize,
        title: String,
    },
    VoteSubmitted {
        choice: Choice,
        rationale: String,
    },
    Results {
        tally: VoteTally,
        decision: Choice,
    },
    Timer {
        seconds_remaining: u32,
    },
    Moderation,
    Error {
        message: String,
    },
}

impl Announcement {
    /// Errors and moderation interrupt; everything else waits its turn
    pub fn is_assertive(&self) -> bool {
        matches!(self, Announcement::Error { .. } | Announcement::Moderation)
    }
}

pub trait Announcer: Send + Sync {
    fn announce(&self, announcement: Announcement);
}

/// Default announcer that only logs
#[derive(Debug, Default, Clone)]
pub struct TracingAnnouncer;

impl Announcer for TracingAnnouncer {
    fn announce(&self, announcement: Announcement) {
        if announcement.is_assertive() {
            tracing::info!(?announcement, "Announce (assertive)");
        } else {
            tracing::debug!(?announcement, "Announce");
        }
    }
}

/// Keeps every announcement in memory, for tests and replay
#[derive(Debug, Default)]
pub struct RecordingAnnouncer {
    announcements: std::sync::Mutex<Vec<Announcement>>,
}

impl RecordingAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Announcement> {
        match self.announcements.lock() {
            Ok(mut list) => std::mem::take(&mut *list),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce(&self, announcement: Announcement) {
        match self.announcements.lock() {
            Ok(mut list) => list.push(announcement),
            Err(poisoned) => poisoned.into_inner().push(announcement),
        }
    }
}
