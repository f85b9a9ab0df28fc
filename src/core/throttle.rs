//! Per-key throttle for externally triggered health passes.
//!
//! Dashboard page loads may ask for a health pass; a key (usually the viewer's
//! session) gets at most one pass per `min_interval`.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// Keys kept before stale entries are swept.
const SWEEP_THRESHOLD: usize = 1000;

/// Remembers when each key last triggered a pass.
#[derive(Debug)]
pub struct PollThrottle {
    min_interval: Duration,
    last_run: Mutex<HashMap<String, Instant>>,
}

impl PollThrottle {
    /// Creates a throttle allowing one pass per key every `min_interval`.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_run: Mutex::new(HashMap::new()),
        }
    }

    /// Records a run for `key` and returns `true` if enough time has passed since
    /// the previous one. Returns `false` without recording otherwise.
    pub async fn try_acquire(&self, key: &str) -> bool {
        let mut last_run = self.last_run.lock().await;
        let now = Instant::now();

        if last_run.len() > SWEEP_THRESHOLD {
            last_run.retain(|_, at| now.duration_since(*at) < self.min_interval);
        }

        match last_run.get(key) {
            Some(at) if now.duration_since(*at) < self.min_interval => false,
            _ => {
                last_run.insert(key.to_string(), now);
                true
            }
        }
    }
}
