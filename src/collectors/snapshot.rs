//! Most-recent-scrape cache for scheduled mode.
//!
//! The background loop replaces the whole `Arc` under a short write lock,
//! so a reader observes either the previous or the new snapshot in full,
//! never a mixture. Before the first completed update `read` returns
//! `None` — an explicit unready state instead of blocking the first
//! exposition request.

use crate::collectors::scrape::ScrapeResult;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
pub struct SnapshotCache {
    inner: RwLock<Option<Arc<ScrapeResult>>>,
}

impl SnapshotCache {
    /// Publish a completed scrape, replacing the previous snapshot
    /// atomically.
    pub fn update(&self, result: ScrapeResult) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::new(result));
    }

    /// Current snapshot, or `None` before the first completed update.
    /// Never blocks on an in-flight update beyond the pointer swap.
    pub fn read(&self) -> Option<Arc<ScrapeResult>> {
        let guard = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }
}
