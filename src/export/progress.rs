//! Progress tracking for export operations
//!
//! This module provides a progress bar shared by all export workers, giving
//! users real-time feedback while partitions are being written.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use mongodb::bson::Document;

use crate::client::DocumentPages;
use crate::error::Result;

/// Progress tracker for export operations
///
/// Counts exported documents across workers and displays a progress bar
/// with the export speed.
pub struct ProgressTracker {
    /// Number of documents processed so far
    processed: AtomicU64,
    /// Start time of the operation
    start_time: Instant,
    /// Progress bar (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `total` - Total number of documents if known (None for unknown)
    /// * `enable_bar` - Whether to display a progress bar
    ///
    /// # Returns
    /// * `Self` - New progress tracker instance
    pub fn new(total: Option<u64>, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| match total {
            Some(n) => {
                let bar = ProgressBar::new(n);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                {
                    bar.set_style(style.progress_chars("#>-"));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) =
                    ProgressStyle::default_spinner().template("{spinner:.green} {pos} documents {msg}")
                {
                    bar.set_style(style);
                }
                bar
            }
        });

        Self {
            processed: AtomicU64::new(0),
            start_time: Instant::now(),
            bar,
        }
    }

    /// Record `count` more processed documents
    pub fn advance(&self, count: u64) {
        let processed = self.processed.fetch_add(count, Ordering::Relaxed) + count;

        if let Some(ref bar) = self.bar {
            bar.set_position(processed);

            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                let speed = processed as f64 / elapsed;
                bar.set_message(format!("({:.0} docs/sec)", speed));
            }
        }
    }

    /// Documents processed so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Page sequence that reports every page to a [`ProgressTracker`].
pub struct TrackedPages {
    inner: Box<dyn DocumentPages>,
    tracker: Arc<ProgressTracker>,
}

impl TrackedPages {
    pub fn new(inner: Box<dyn DocumentPages>, tracker: Arc<ProgressTracker>) -> Self {
        Self { inner, tracker }
    }
}

#[async_trait]
impl DocumentPages for TrackedPages {
    async fn next_page(&mut self) -> Result<Option<Vec<Document>>> {
        let page = self.inner.next_page().await?;
        if let Some(ref docs) = page {
            self.tracker.advance(docs.len() as u64);
        }
        Ok(page)
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}
