//! Opaque announcement channel. The engine calls it after a play is
//! recorded but never depends on it for correctness.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish an announcement, returning the remote post id.
    async fn post(&self, text: &str) -> Result<String>;

    /// Take down a previously published announcement.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Stand-in announcer that only logs. Used until a real platform client is
/// wired in, and in tests.
pub struct LogNotifier {
    counter: AtomicU64,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn post(&self, text: &str) -> Result<String> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!("Announcement {}: {}", id, text);
        Ok(id.to_string())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        tracing::info!("Deleted announcement {}", id);
        Ok(())
    }
}
