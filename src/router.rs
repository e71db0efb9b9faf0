//! Routing of transformation failures to the pipeline's error handler.

use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Callback invoked with every transformation failure.
///
/// The handler runs synchronously inside the worker that observed the
/// failure, so it should return quickly.
#[derive(Clone)]
pub struct ErrorHandler(Arc<dyn Fn(Error) + Send + Sync>);

impl ErrorHandler {
    /// Create a handler from a function
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Error) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// A handler that logs the failure through `tracing` and continues
    pub fn log() -> Self {
        Self::new(|err| {
            tracing::warn!(stage = err.stage().unwrap_or("unknown"), error = %err, "transformation failed, dropping item");
        })
    }

    /// A handler that silently discards failures
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Invoke the handler
    pub fn call(&self, err: Error) {
        (self.0)(err)
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::log()
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHandler(..)")
    }
}

/// Shared by every stage of a pipeline.
///
/// The handler is installed once, when emission starts. Failures can only
/// occur after that point, but a router that was never armed falls back to
/// logging.
pub(crate) struct ErrorRouter {
    handler: OnceLock<ErrorHandler>,
    abort_on_error: bool,
    token: CancellationToken,
}

impl ErrorRouter {
    pub(crate) fn new(abort_on_error: bool, token: CancellationToken) -> Self {
        Self {
            handler: OnceLock::new(),
            abort_on_error,
            token,
        }
    }

    /// Fix the handler used for the rest of the pipeline's life.
    pub(crate) fn install(&self, handler: ErrorHandler) {
        if self.handler.set(handler).is_err() {
            tracing::debug!("error handler already installed, keeping the first one");
        }
    }

    pub(crate) fn route(&self, err: Error) {
        #[cfg(feature = "metrics")]
        crate::metrics::record_failed(err.stage().unwrap_or("unknown"));

        match self.handler.get() {
            Some(handler) => handler.call(err),
            None => ErrorHandler::log().call(err),
        }

        if self.abort_on_error && !self.token.is_cancelled() {
            tracing::debug!("abort_on_error set, cancelling pipeline");
            self.token.cancel();
        }
    }
}
