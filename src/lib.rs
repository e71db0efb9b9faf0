//! # Concurrent worker-pool pipelines for Rust
//!
//! This crate wires an ordered chain of transformation stages together with
//! bounded Tokio queues. Each stage runs a configurable pool of workers;
//! values fed into the front of the chain come out of the back transformed
//! by every stage in registration order.
//!
//! ## Core Concepts
//!
//! - **Stage**: a pool of workers applying one [`Transform`](traits::Transform)
//! - **Pipeline**: wires stages source-to-sink through bounded join queues
//! - **Emission**: bulk, delayed, or streamed feeding of the source queue
//! - **Sink**: the read side of the chain, also used to cancel it
//!
//! Full queues suspend their producers, so a slow stage throttles everything
//! upstream of it. A failing transformation drops its item and reports the
//! error to the pipeline's error handler.
//!
//! ## Example
//!
//! ```rust
//! use std::convert::Infallible;
//! use stagewire::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut pipeline = Pipeline::with_config(PipelineConfig::default().buffer_size(16))?;
//!     pipeline
//!         .next(|x: i64| Ok::<_, Infallible>(x * 2), 4)?
//!         .next(|x: i64| if x % 3 == 0 { Err("multiple of three") } else { Ok(x) }, 1)?;
//!     pipeline.on_error(|err| eprintln!("dropped: {}", err));
//!
//!     let mut sink = pipeline.emit(1..=10);
//!     while let Some(value) = sink.recv().await {
//!         println!("{}", value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod pipeline;
pub mod router;
pub mod traits;

// Re-export commonly used items
pub mod prelude {
    pub use crate::error::{BoxError, Error, Result};
    pub use crate::pipeline::{Pipeline, PipelineConfig, Sink, DEFAULT_BUFFER_SIZE};
    pub use crate::router::ErrorHandler;
    pub use crate::traits::{from_async_fn, from_fn, Transform};
}

// Re-export main error type
pub use error::{Error, Result};

// Feature flags for optional dependencies
#[cfg(feature = "metrics")]
pub mod metrics;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
