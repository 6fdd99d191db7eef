//! Serialized request gate for one external system.
//!
//! At most one task runs at a time, tasks start in submission order, and
//! consecutive starts are at least `min_spacing` apart. Failures are handed
//! back to the caller untouched; nothing here retries.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};

/// Default spacing between Canvas requests.
pub const CANVAS_MIN_SPACING: Duration = Duration::from_millis(100);

/// Default spacing between Notion requests (the API allows about three per second).
pub const NOTION_MIN_SPACING: Duration = Duration::from_millis(350);

/// Default spacing between OpenAI requests.
pub const OPENAI_MIN_SPACING: Duration = Duration::from_millis(200);

/// Per-system admission gate.
#[derive(Debug)]
pub struct AdmissionScheduler {
    /// System name, for logs.
    name: String,

    min_spacing: Duration,

    /// Start time of the most recent task. The lock is held for the whole
    /// task, and tokio's mutex hands it out in FIFO order.
    last_start: Mutex<Option<Instant>>,
}

impl AdmissionScheduler {
    pub fn new(name: impl Into<String>, min_spacing: Duration) -> Self {
        Self {
            name: name.into(),
            min_spacing,
            last_start: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Run `task` once every earlier submission has finished and the spacing
    /// since the previous start has elapsed.
    pub async fn schedule<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last_start = self.last_start.lock().await;

        if let Some(previous) = *last_start {
            let ready_at = previous + self.min_spacing;
            if ready_at > Instant::now() {
                log::trace!("[{}] waiting {:?} before next request", self.name, ready_at - Instant::now());
                time::sleep_until(ready_at).await;
            }
        }

        *last_start = Some(Instant::now());
        task.await
    }
}
