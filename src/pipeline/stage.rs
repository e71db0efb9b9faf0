//! A single pipeline stage: a pool of workers between two bounded queues.
//!
//! Every worker pulls from the shared inbound queue, applies the stage's
//! transform and pushes the result to the outbound queue. The outbound queue
//! is closed by a completion barrier once all workers have exited, never by
//! a worker itself.

use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::router::ErrorRouter;
use crate::traits::Transform;

/// Inbound queue shared by all workers of a stage
type Inlet<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// The outbound sender of a stage.
///
/// Held in a slot so the pipeline can point a running stage at a new join
/// queue when another stage is appended. That redirect only happens before
/// emission, while no item can be in flight.
struct Outlet<T> {
    slot: StdMutex<Option<mpsc::Sender<T>>>,
}

impl<T> Outlet<T> {
    fn new(sender: mpsc::Sender<T>) -> Self {
        Self {
            slot: StdMutex::new(Some(sender)),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<T>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn redirect(&self, sender: mpsc::Sender<T>) -> Option<mpsc::Sender<T>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(sender)
    }

    /// Drops the stage's sender. The queue closes once no clone is left.
    fn close(&self) {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

/// Handle to a running stage, kept by the pipeline for wiring.
pub(crate) struct Stage<T> {
    name: Arc<str>,
    workers: usize,
    outlet: Arc<Outlet<T>>,
}

impl<T> Stage<T>
where
    T: Send + 'static,
{
    /// Start `workers` tasks reading `inbound` and writing `outbound`, plus
    /// the barrier task that closes `outbound` after the last worker exits.
    pub(crate) fn spawn<X>(
        name: impl Into<Arc<str>>,
        transform: X,
        workers: usize,
        inbound: mpsc::Receiver<T>,
        outbound: mpsc::Sender<T>,
        router: Arc<ErrorRouter>,
        token: CancellationToken,
    ) -> Self
    where
        X: Transform<Item = T>,
    {
        let name: Arc<str> = name.into();
        let transform = Arc::new(transform);
        let inlet: Inlet<T> = Arc::new(Mutex::new(inbound));
        let outlet = Arc::new(Outlet::new(outbound));

        let mut pool = JoinSet::new();
        for id in 0..workers {
            let worker = Worker {
                id,
                stage: name.clone(),
                transform: transform.clone(),
                inlet: inlet.clone(),
                outlet: outlet.clone(),
                router: router.clone(),
                token: token.clone(),
            };
            pool.spawn(worker.run());
        }

        tracing::debug!(stage = %name, workers, "stage started");
        tokio::spawn(close_when_done(name.clone(), pool, outlet.clone()));

        Self {
            name,
            workers,
            outlet,
        }
    }

    /// Point this stage at a new outbound queue, returning the old sender.
    pub(crate) fn redirect(&self, sender: mpsc::Sender<T>) -> Option<mpsc::Sender<T>> {
        self.outlet.redirect(sender)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn workers(&self) -> usize {
        self.workers
    }
}

/// Completion barrier: waits for every worker, then closes the outbound queue.
async fn close_when_done<T>(stage: Arc<str>, mut pool: JoinSet<()>, outlet: Arc<Outlet<T>>) {
    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                tracing::error!(stage = %stage, "stage worker panicked: {}", e);
            }
        }
    }
    outlet.close();
    tracing::debug!(stage = %stage, "all workers done, outbound queue closed");
}

struct Worker<X: Transform> {
    id: usize,
    stage: Arc<str>,
    transform: Arc<X>,
    inlet: Inlet<X::Item>,
    outlet: Arc<Outlet<X::Item>>,
    router: Arc<ErrorRouter>,
    token: CancellationToken,
}

impl<X: Transform> Worker<X> {
    async fn run(self) {
        // Taken from the outlet on the first forward. Redirects only happen
        // before emission, so the sender never changes after that.
        let mut sender: Option<mpsc::Sender<X::Item>> = None;
        loop {
            let item = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                item = recv(&self.inlet) => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let output = match self.transform.apply(item).await {
                Ok(output) => output,
                Err(e) => {
                    self.router.route(Error::transform(&*self.stage, e));
                    continue;
                }
            };

            if sender.is_none() {
                sender = self.outlet.sender();
            }
            let Some(tx) = sender.as_ref() else {
                break;
            };
            let sent = tokio::select! {
                biased;
                _ = self.token.cancelled() => false,
                res = tx.send(output) => res.is_ok(),
            };
            if !sent {
                // cancelled, or everything downstream is gone
                break;
            }

            #[cfg(feature = "metrics")]
            crate::metrics::record_processed(&self.stage);
            tracing::trace!(stage = %self.stage, worker = self.id, "item forwarded");
        }
        tracing::debug!(stage = %self.stage, worker = self.id, "worker exited");
    }
}

async fn recv<T>(inlet: &Inlet<T>) -> Option<T> {
    inlet.lock().await.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::ErrorHandler;
    use crate::traits::from_fn;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn router(token: &CancellationToken) -> Arc<ErrorRouter> {
        let router = ErrorRouter::new(false, token.clone());
        router.install(ErrorHandler::noop());
        Arc::new(router)
    }

    #[tokio::test]
    async fn outbound_closes_after_every_worker_exits() {
        let token = CancellationToken::new();
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);

        let stage = Stage::spawn(
            "double",
            from_fn(|x: u32| Ok::<_, Infallible>(x * 2)),
            4,
            in_rx,
            out_tx,
            router(&token),
            token,
        );
        assert_eq!(stage.name(), "double");
        assert_eq!(stage.workers(), 4);

        for i in 0..10 {
            in_tx.send(i).await.unwrap();
        }
        drop(in_tx);

        let mut seen = Vec::new();
        while let Some(v) = out_rx.recv().await {
            seen.push(v);
        }
        seen.sort();
        assert_eq!(seen, (0..10).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failed_items_are_dropped_and_routed() {
        let token = CancellationToken::new();
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        let router = ErrorRouter::new(false, token.clone());
        router.install(ErrorHandler::new(move |err| {
            assert_eq!(err.stage(), Some("odd-only"));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let _stage = Stage::spawn(
            "odd-only",
            from_fn(|x: u32| if x % 2 == 0 { Err("even") } else { Ok(x) }),
            1,
            in_rx,
            out_tx,
            Arc::new(router),
            token,
        );

        for i in 0..6 {
            in_tx.send(i).await.unwrap();
        }
        drop(in_tx);

        let mut seen = Vec::new();
        while let Some(v) = out_rx.recv().await {
            seen.push(v);
        }
        assert_eq!(seen, vec![1, 3, 5]);
        assert_eq!(failures.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn redirect_moves_output_to_new_queue() {
        let token = CancellationToken::new();
        let (in_tx, in_rx) = mpsc::channel(4);
        let (first_tx, mut first_rx) = mpsc::channel(4);
        let (second_tx, mut second_rx) = mpsc::channel(4);

        let stage = Stage::spawn(
            "relay",
            from_fn(|x: u8| Ok::<_, Infallible>(x)),
            1,
            in_rx,
            first_tx,
            router(&token),
            token,
        );
        let old = stage.redirect(second_tx);
        assert!(old.is_some());
        drop(old);

        in_tx.send(7).await.unwrap();
        drop(in_tx);

        assert_eq!(second_rx.recv().await, Some(7));
        assert_eq!(second_rx.recv().await, None);
        assert_eq!(first_rx.recv().await, None);
    }

    #[tokio::test]
    async fn redirect_reaches_every_worker_of_a_pool() {
        let token = CancellationToken::new();
        let (in_tx, in_rx) = mpsc::channel(4);
        let (first_tx, mut first_rx) = mpsc::channel(4);
        let (second_tx, mut second_rx) = mpsc::channel(4);

        let stage = Stage::spawn(
            "fan",
            from_fn(|x: u32| Ok::<_, Infallible>(x + 1)),
            4,
            in_rx,
            first_tx,
            router(&token),
            token,
        );
        drop(stage.redirect(second_tx));

        let feeder = tokio::spawn(async move {
            for i in 0..200 {
                in_tx.send(i).await.unwrap();
            }
        });

        let mut seen = Vec::new();
        while let Some(v) = second_rx.recv().await {
            seen.push(v);
        }
        feeder.await.unwrap();

        seen.sort_unstable();
        assert_eq!(seen, (1..=200).collect::<Vec<_>>());
        assert_eq!(first_rx.recv().await, None);
    }

    #[tokio::test]
    async fn cancellation_stops_workers_and_closes_outbound() {
        let token = CancellationToken::new();
        let (_in_tx, in_rx) = mpsc::channel::<u8>(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);

        let _stage = Stage::spawn(
            "idle",
            from_fn(|x: u8| Ok::<_, Infallible>(x)),
            3,
            in_rx,
            out_tx,
            router(&token),
            token.clone(),
        );

        token.cancel();
        assert_eq!(out_rx.recv().await, None);
    }
}
