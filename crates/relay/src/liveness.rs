//! Executor liveness, derived from its own dequeue polling.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Sighting {
    at: Instant,
    wall_clock: DateTime<Utc>,
}

/// Point-in-time view of executor liveness.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessSnapshot {
    pub connected: bool,
    /// None if the executor has never polled.
    pub since_last_seen: Option<Duration>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct LivenessTracker {
    last_seen: Mutex<Option<Sighting>>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the executor polled just now.
    pub fn touch(&self) {
        let sighting = Sighting {
            at: Instant::now(),
            wall_clock: Utc::now(),
        };
        *self
            .last_seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sighting);
    }

    pub fn snapshot(&self, staleness_threshold: Duration) -> LivenessSnapshot {
        let sighting = *self
            .last_seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match sighting {
            Some(s) => {
                let elapsed = s.at.elapsed();
                LivenessSnapshot {
                    connected: elapsed < staleness_threshold,
                    since_last_seen: Some(elapsed),
                    last_seen_at: Some(s.wall_clock),
                }
            }
            None => LivenessSnapshot {
                connected: false,
                since_last_seen: None,
                last_seen_at: None,
            },
        }
    }
}
