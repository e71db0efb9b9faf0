//! Pipeline orchestration and execution.
//!
//! A [`Pipeline`] is an ordered chain of stages connected by bounded queues:
//!
//! ```text
//! source -> stage 0 -> join -> stage 1 -> ... -> stage n -> sink
//! ```
//!
//! Stages start their workers as soon as they are registered. Values enter
//! the chain through one of the emission methods, which consume the pipeline
//! and hand back the [`Sink`] the results come out of.

pub mod emitter;
pub(crate) mod stage;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, Error, Result};
use crate::router::{ErrorHandler, ErrorRouter};
use crate::traits::{from_async_fn, from_fn, Transform};

pub use emitter::Sink;
use stage::Stage;

/// Default capacity of every queue in a pipeline
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Configuration for pipeline execution
#[derive(Clone)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct PipelineConfig {
    /// Capacity of the source, sink and every join queue
    pub buffer_size: usize,
    /// Cancel the whole chain after the first transformation failure
    pub abort_on_error: bool,
    /// Receives every transformation failure
    #[cfg_attr(feature = "serde", serde(skip))]
    pub error_handler: ErrorHandler,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            abort_on_error: false,
            error_handler: ErrorHandler::default(),
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("buffer_size", &self.buffer_size)
            .field("abort_on_error", &self.abort_on_error)
            .finish_non_exhaustive()
    }
}

impl PipelineConfig {
    /// Set the buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set whether the first failure cancels the pipeline
    pub fn abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }

    /// Set the error handler
    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::InvalidBufferSize);
        }
        Ok(())
    }
}

/// An ordered chain of worker-pool stages.
///
/// # Examples
///
/// ```rust
/// use std::convert::Infallible;
/// use stagewire::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let mut pipeline = Pipeline::new();
///     pipeline
///         .next(|s: String| Ok::<_, Infallible>(s.to_uppercase()), 2)?
///         .next(|s: String| Ok::<_, Infallible>(format!("--{}--", s)), 1)?;
///
///     let results = pipeline.emit(vec!["hello".to_string()]).drain().await;
///     assert_eq!(results, vec!["--HELLO--".to_string()]);
///     Ok(())
/// }
/// ```
pub struct Pipeline<T> {
    config: PipelineConfig,
    stages: Vec<Stage<T>>,
    source: mpsc::Sender<T>,
    sink: mpsc::Receiver<T>,
    // Both ends wait here until the first stage claims them.
    head: Option<mpsc::Receiver<T>>,
    tail: Option<mpsc::Sender<T>>,
    router: Arc<ErrorRouter>,
    token: CancellationToken,
}

impl<T> Pipeline<T>
where
    T: Send + 'static,
{
    /// Create a pipeline with the default configuration
    pub fn new() -> Self {
        Self::build(PipelineConfig::default())
    }

    /// Create a pipeline with the given configuration
    pub fn with_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: PipelineConfig) -> Self {
        let (source, head) = mpsc::channel(config.buffer_size);
        let (tail, sink) = mpsc::channel(config.buffer_size);
        let token = CancellationToken::new();
        let router = Arc::new(ErrorRouter::new(config.abort_on_error, token.clone()));

        Self {
            config,
            stages: Vec::new(),
            source,
            sink,
            head: Some(head),
            tail: Some(tail),
            router,
            token,
        }
    }

    /// Append a stage applying a synchronous function with `workers`
    /// concurrent workers.
    ///
    /// Must be called from within a Tokio runtime: the workers start
    /// immediately.
    pub fn next<F, E>(&mut self, f: F, workers: usize) -> Result<&mut Self>
    where
        F: Fn(T) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError> + 'static,
    {
        self.next_transform(from_fn(f), workers)
    }

    /// Append a stage applying an async function
    pub fn next_async<F, Fut, E>(&mut self, f: F, workers: usize) -> Result<&mut Self>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.next_transform(from_async_fn(f), workers)
    }

    /// Append a stage running any [`Transform`]
    pub fn next_transform<X>(&mut self, transform: X, workers: usize) -> Result<&mut Self>
    where
        X: Transform<Item = T>,
    {
        let name = format!("stage-{}", self.stages.len());
        self.next_named(name, transform, workers)
    }

    /// Append a named stage.
    ///
    /// The first stage reads from the source. Every later stage takes over
    /// the sink from the current last stage, which is redirected to a new
    /// join queue feeding the new stage.
    pub fn next_named<X>(
        &mut self,
        name: impl Into<String>,
        transform: X,
        workers: usize,
    ) -> Result<&mut Self>
    where
        X: Transform<Item = T>,
    {
        let name = name.into();
        if workers == 0 {
            return Err(Error::InvalidWorkerCount { stage: name });
        }

        let (inbound, outbound) = match (self.stages.last(), self.head.take(), self.tail.take()) {
            (None, Some(head), Some(tail)) => (head, tail),
            (Some(last), _, _) => {
                let (join_tx, join_rx) = mpsc::channel(self.config.buffer_size);
                // no item can be in flight yet: emission consumes the pipeline
                let tail = last
                    .redirect(join_tx)
                    .ok_or_else(|| Error::custom("last stage has already closed its output"))?;
                (join_rx, tail)
            }
            (None, _, _) => return Err(Error::custom("pipeline source is no longer available")),
        };

        let stage = Stage::spawn(
            name,
            transform,
            workers,
            inbound,
            outbound,
            self.router.clone(),
            self.token.clone(),
        );
        self.stages.push(stage);
        Ok(self)
    }

    /// Replace the handler that receives transformation failures.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Error) + Send + Sync + 'static,
    {
        self.config.error_handler = ErrorHandler::new(handler);
        self
    }

    /// Emit `values` onto the source in order and return the sink.
    ///
    /// Feeding happens on a separate task; this returns immediately.
    pub fn emit<I>(self, values: I) -> Sink<T>
    where
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        let (source, sink, token) = self.start();
        tokio::spawn(emitter::feed_values(source, values, None, token.clone()));
        Sink::new(sink, token)
    }

    /// Emit `values`, waiting `delay` before each one.
    pub fn emit_with_delay<I>(self, delay: Duration, values: I) -> Sink<T>
    where
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        let (source, sink, token) = self.start();
        tokio::spawn(emitter::feed_values(source, values, Some(delay), token.clone()));
        Sink::new(sink, token)
    }

    /// Relay every value received on `rx` until its senders are dropped.
    pub fn emit_from_channel(self, rx: mpsc::Receiver<T>) -> Sink<T> {
        self.emit_from_stream(ReceiverStream::new(rx))
    }

    /// Relay every value of `stream` until it ends.
    pub fn emit_from_stream<S>(self, stream: S) -> Sink<T>
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let (source, sink, token) = self.start();
        tokio::spawn(emitter::feed_stream(source, stream, token.clone()));
        Sink::new(sink, token)
    }

    /// Number of registered stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether no stage has been registered
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in chain order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Worker count of each stage in chain order
    pub fn stage_workers(&self) -> Vec<usize> {
        self.stages.iter().map(|s| s.workers()).collect()
    }

    /// The pipeline's configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A token that cancels every stage and feeder of this pipeline
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn start(self) -> (mpsc::Sender<T>, mpsc::Receiver<T>, CancellationToken) {
        self.must_have_stages();
        self.router.install(self.config.error_handler.clone());
        tracing::debug!(stages = self.stages.len(), "pipeline emission started");

        let Pipeline {
            source,
            sink,
            token,
            ..
        } = self;
        (source, sink, token)
    }

    /// Emitting into an empty pipeline is a programming error and ends the
    /// process.
    fn must_have_stages(&self) {
        if self.stages.is_empty() {
            tracing::error!("no processing stages in pipeline");
            std::process::exit(1);
        }
    }
}

impl<T> std::fmt::Debug for Pipeline<T>
where
    T: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<(&str, usize)> = self
            .stages
            .iter()
            .map(|s| (s.name(), s.workers()))
            .collect();
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("stages", &stages)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl<T> Default for Pipeline<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
