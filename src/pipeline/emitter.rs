//! Feeders that populate a pipeline's source queue, and the [`Sink`] handle
//! returned to the caller.

use futures_core::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Read side of a pipeline's sink queue.
///
/// Yields transformed values until the last stage has finished, then reports
/// end-of-stream. Also carries the handle that cancels the whole chain.
///
/// Dropping the sink makes the last stage's sends fail, which winds the chain
/// down from the back.
pub struct Sink<T> {
    rx: mpsc::Receiver<T>,
    token: CancellationToken,
}

impl<T> Sink<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>, token: CancellationToken) -> Self {
        Self { rx, token }
    }

    /// Receive the next value, or `None` once the chain has completed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Try to receive a value without waiting.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    /// Wait for the chain to complete and collect every value it produced.
    pub async fn drain(mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.rx.recv().await {
            items.push(item);
        }
        items
    }

    /// Stop every feeder and worker at its next suspension point.
    ///
    /// Values already in the sink queue can still be received.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the chain has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A token that cancels the chain, for use outside the consuming task
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Unwrap into the underlying receiver
    pub fn into_inner(self) -> mpsc::Receiver<T> {
        self.rx
    }
}

impl<T> Stream for Sink<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Push `values` onto the source in order, optionally pausing before each
/// one, then close the source by dropping it.
pub(crate) async fn feed_values<T>(
    source: mpsc::Sender<T>,
    values: Vec<T>,
    delay: Option<Duration>,
    token: CancellationToken,
) {
    let total = values.len();
    let mut sent = 0;

    for value in values {
        if let Some(delay) = delay {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }
        if !send(&source, value, &token).await {
            break;
        }
        sent += 1;
    }

    tracing::debug!(sent, total, "bulk feeder finished, closing source");
}

/// Relay every value of an external stream onto the source, closing the
/// source once the stream is exhausted.
pub(crate) async fn feed_stream<T, S>(source: mpsc::Sender<T>, stream: S, token: CancellationToken)
where
    S: Stream<Item = T>,
{
    tokio::pin!(stream);
    let mut sent = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            next = stream.next() => next,
        };
        let Some(value) = next else {
            break;
        };
        if !send(&source, value, &token).await {
            break;
        }
        sent += 1;
    }

    tracing::debug!(sent, "stream feeder finished, closing source");
}

/// Returns false when cancelled or when the first stage is gone.
async fn send<T>(source: &mpsc::Sender<T>, value: T, token: &CancellationToken) -> bool {
    let sent = tokio::select! {
        biased;
        _ = token.cancelled() => false,
        res = source.send(value) => res.is_ok(),
    };

    #[cfg(feature = "metrics")]
    if sent {
        crate::metrics::record_emitted();
    }

    sent
}
