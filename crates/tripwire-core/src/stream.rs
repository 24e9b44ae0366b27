// ── Snapshot subscriptions ──

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::MetricSnapshot;

/// A subscription to the coordinator's current snapshot.
///
/// Gives point-in-time access plus change notification, either through
/// [`changed`](Self::changed) or as a `Stream`.
pub struct SnapshotStream {
    current: Arc<MetricSnapshot>,
    receiver: watch::Receiver<Arc<MetricSnapshot>>,
}

impl SnapshotStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<MetricSnapshot>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation time or at the last `changed()`.
    pub fn current(&self) -> &Arc<MetricSnapshot> {
        &self.current
    }

    pub fn latest(&self) -> Arc<MetricSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next tick's snapshot. `None` once the coordinator is
    /// dropped.
    pub async fn changed(&mut self) -> Option<Arc<MetricSnapshot>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding every published snapshot.
pub struct SnapshotWatchStream {
    inner: WatchStream<Arc<MetricSnapshot>>,
}

impl Stream for SnapshotWatchStream {
    type Item = Arc<MetricSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
