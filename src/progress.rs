//! Progress reporting for batch assembly.
//!
//! Inject an [`Arc<dyn AssemblyProgressCallback>`] via
//! [`crate::config::AssemblyConfigBuilder::progress_callback`] to receive one
//! [`ProgressEvent`] per processed item, plus batch start/complete hooks.
//!
//! Callbacks are fire-and-continue: the engine never waits on them and never
//! inspects their outcome. For a pull-based consumer see
//! [`crate::stream::progress_channel`].
//!
//! # Example
//!
//! ```rust
//! use unifile::{AssemblyProgressCallback, AssemblyConfig, ProgressEvent};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     seen: Arc<AtomicUsize>,
//! }
//!
//! impl AssemblyProgressCallback for CountingCallback {
//!     fn on_progress(&self, event: &ProgressEvent) {
//!         self.seen.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} {:.0}%", event.item_name, event.percent_complete);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     seen: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = AssemblyConfig::builder()
//!     .progress_callback(counter as Arc<dyn AssemblyProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One event per processed item, emitted after the item's work has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// 0-indexed position in the batch.
    pub item_index: usize,
    pub item_name: String,
    /// `(item_index + 1) / total * 100`.
    pub percent_complete: f32,
    /// Short human-readable phase, e.g. `"merged"` or `"placeholder"`.
    pub phase_label: String,
}

impl ProgressEvent {
    pub fn new(
        item_index: usize,
        total: usize,
        item_name: impl Into<String>,
        phase_label: impl Into<String>,
    ) -> Self {
        let percent_complete = if total == 0 {
            100.0
        } else {
            (item_index + 1) as f32 / total as f32 * 100.0
        };
        Self {
            item_index,
            item_name: item_name.into(),
            percent_complete,
            phase_label: phase_label.into(),
        }
    }
}

/// Called by the assembly engine as it processes each item.
///
/// Implementations must be `Send + Sync`; the engine may call them from the
/// runtime thread that drives `assemble`. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait AssemblyProgressCallback: Send + Sync {
    /// Called once before the first item is processed.
    ///
    /// # Arguments
    /// * `total_items` — number of items in the batch
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called exactly once per item, in batch order, after that item's work
    /// (including any placeholder substitution) has completed.
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = event;
    }

    /// Called when an item fails every applicable strategy.
    ///
    /// # Arguments
    /// * `item_index` — 0-indexed position in the batch
    /// * `name`       — item name
    /// * `error`      — human-readable error description
    fn on_item_error(&self, item_index: usize, name: &str, error: &str) {
        let _ = (item_index, name, error);
    }

    /// Called once after every item has been attempted and the output encoded.
    ///
    /// # Arguments
    /// * `total_items`   — items in the batch
    /// * `success_count` — items that produced output without substitution
    fn on_batch_complete(&self, total_items: usize, success_count: usize) {
        let _ = (total_items, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl AssemblyProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AssemblyConfig`].
pub type ProgressCallback = Arc<dyn AssemblyProgressCallback>;
