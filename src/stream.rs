//! Pull-based progress: receive batch events as a `Stream`.
//!
//! [`progress_channel`] returns a callback to put in the config and a stream
//! that yields every [`AssemblyEvent`] the engine emits, in emission order.
//! Events are buffered in an unbounded channel, so a slow consumer never
//! holds up the engine. The stream ends once the callback (and every config
//! clone holding it) has been dropped.
//!
//! # Example
//! ```rust,no_run
//! use futures::StreamExt;
//! use unifile::{assemble, progress_channel, AssemblyConfig, AssemblyEvent};
//!
//! # async fn run(items: Vec<unifile::SourceItem>) -> Result<(), unifile::AssemblyError> {
//! let (callback, mut events) = progress_channel();
//! let config = AssemblyConfig::builder().progress_callback(callback).build()?;
//!
//! let job = tokio::spawn(async move { assemble(items, &config).await });
//! while let Some(event) = events.next().await {
//!     if let AssemblyEvent::Progress(p) = event {
//!         println!("{:>5.1}% {}", p.percent_complete, p.item_name);
//!     }
//! }
//! let output = job.await.expect("task panicked")?;
//! # let _ = output;
//! # Ok(())
//! # }
//! ```

use crate::progress::{AssemblyProgressCallback, ProgressCallback, ProgressEvent};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Everything an [`AssemblyProgressCallback`] can observe, as one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AssemblyEvent {
    BatchStart {
        total_items: usize,
    },
    Progress(ProgressEvent),
    ItemError {
        item_index: usize,
        name: String,
        error: String,
    },
    BatchComplete {
        total_items: usize,
        success_count: usize,
    },
}

/// A boxed stream of batch events.
pub type EventStream = BoxStream<'static, AssemblyEvent>;

/// Forwards callback invocations into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelProgressCallback {
    tx: mpsc::UnboundedSender<AssemblyEvent>,
}

impl ChannelProgressCallback {
    fn send(&self, event: AssemblyEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl AssemblyProgressCallback for ChannelProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        self.send(AssemblyEvent::BatchStart { total_items });
    }

    fn on_progress(&self, event: &ProgressEvent) {
        self.send(AssemblyEvent::Progress(event.clone()));
    }

    fn on_item_error(&self, item_index: usize, name: &str, error: &str) {
        self.send(AssemblyEvent::ItemError {
            item_index,
            name: name.to_string(),
            error: error.to_string(),
        });
    }

    fn on_batch_complete(&self, total_items: usize, success_count: usize) {
        self.send(AssemblyEvent::BatchComplete {
            total_items,
            success_count,
        });
    }
}

/// Create a callback/stream pair.
pub fn progress_channel() -> (ProgressCallback, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: ProgressCallback = Arc::new(ChannelProgressCallback { tx });
    (callback, UnboundedReceiverStream::new(rx).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order_and_stream_ends() {
        let (callback, events) = progress_channel();
        callback.on_batch_start(2);
        callback.on_progress(&ProgressEvent::new(0, 2, "a.png", "merged"));
        callback.on_item_error(1, "b.pdf", "broken");
        callback.on_progress(&ProgressEvent::new(1, 2, "b.pdf", "placeholder"));
        callback.on_batch_complete(2, 1);
        drop(callback);

        let collected: Vec<AssemblyEvent> = events.collect().await;
        assert_eq!(collected.len(), 5);
        assert_eq!(collected[0], AssemblyEvent::BatchStart { total_items: 2 });
        match &collected[3] {
            AssemblyEvent::Progress(p) => {
                assert_eq!(p.item_name, "b.pdf");
                assert_eq!(p.percent_complete, 100.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            collected[4],
            AssemblyEvent::BatchComplete {
                total_items: 2,
                success_count: 1
            }
        );
    }

    #[test]
    fn send_after_receiver_drop_is_ignored() {
        let (callback, events) = progress_channel();
        drop(events);
        callback.on_batch_start(1);
    }

    #[test]
    fn event_serialises_with_tag() {
        let json = serde_json::to_string(&AssemblyEvent::BatchStart { total_items: 3 }).unwrap();
        assert_eq!(json, r#"{"event":"batch_start","total_items":3}"#);
    }
}
