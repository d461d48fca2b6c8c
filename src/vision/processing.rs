//! Per-session "recognition in progress" flags
//!
//! A flag older than the release window counts as released, so a lost guard
//! cannot block a session forever. A request that legitimately runs longer
//! than the window can overlap with the next one for the same session.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::OcrError;

/// Default age after which a flag is ignored
pub const DEFAULT_RELEASE_AFTER: Duration = Duration::from_secs(10);

pub struct ProcessingTracker {
    release_after: Duration,
    active: Mutex<HashMap<String, Instant>>,
}

impl ProcessingTracker {
    pub fn new(release_after: Duration) -> Self {
        Self {
            release_after,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Mark a session busy until the returned guard is dropped
    pub fn begin(&self, session: &str) -> Result<ProcessingGuard<'_>, OcrError> {
        let mut active = self.active.lock();

        if let Some(started) = active.get(session) {
            let age = started.elapsed();
            if age < self.release_after {
                return Err(OcrError::Busy);
            }
            warn!("Releasing stale processing flag for {} after {:?}", session, age);
        }

        let started = Instant::now();
        active.insert(session.to_string(), started);

        Ok(ProcessingGuard {
            tracker: self,
            session: session.to_string(),
            started,
        })
    }

    pub fn is_processing(&self, session: &str) -> bool {
        self.active
            .lock()
            .get(session)
            .is_some_and(|started| started.elapsed() < self.release_after)
    }
}

impl Default for ProcessingTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RELEASE_AFTER)
    }
}

/// Clears the session flag on drop
pub struct ProcessingGuard<'a> {
    tracker: &'a ProcessingTracker,
    session: String,
    started: Instant,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.tracker.active.lock();
        // A newer request may have taken over a stale flag
        if active.get(&self.session) == Some(&self.started) {
            active.remove(&self.session);
        }
    }
}
