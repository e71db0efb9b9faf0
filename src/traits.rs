//! Core traits for the stage pipeline.
//!
//! A [`Transform`] is the unit of work a stage applies to every item it
//! receives. Stages run many copies of a transform concurrently, so the trait
//! takes `&self` and implementations must be `Send + Sync`.

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

use crate::error::BoxError;

/// A transformation applied by every worker of a stage.
///
/// Returning `Err` drops the item: it is reported to the pipeline's error
/// handler and never forwarded downstream.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use stagewire::error::BoxError;
/// use stagewire::traits::Transform;
///
/// struct Shout;
///
/// #[async_trait]
/// impl Transform for Shout {
///     type Item = String;
///
///     async fn apply(&self, item: String) -> Result<String, BoxError> {
///         if item.is_empty() {
///             return Err("nothing to shout".into());
///         }
///         Ok(format!("{}!", item.to_uppercase()))
///     }
/// }
/// ```
#[async_trait]
pub trait Transform: Send + Sync + 'static {
    /// The type of items flowing through the stage
    type Item: Send + 'static;

    /// Transform a single item.
    async fn apply(&self, item: Self::Item) -> Result<Self::Item, BoxError>;
}

/// A transform created from a synchronous function
pub struct FnTransform<F, T, E> {
    f: F,
    _phantom: PhantomData<fn(T) -> E>,
}

impl<F, T, E> FnTransform<F, T, E> {
    /// Create a new function transform
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<F, T, E> Transform for FnTransform<F, T, E>
where
    F: Fn(T) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Into<BoxError> + 'static,
{
    type Item = T;

    async fn apply(&self, item: T) -> Result<T, BoxError> {
        (self.f)(item).map_err(Into::into)
    }
}

/// A transform created from an async function
pub struct AsyncFnTransform<F, T, E> {
    f: F,
    _phantom: PhantomData<fn(T) -> E>,
}

impl<F, T, E> AsyncFnTransform<F, T, E> {
    /// Create a new async function transform
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, T, E> Transform for AsyncFnTransform<F, T, E>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send + 'static,
    E: Into<BoxError> + 'static,
{
    type Item = T;

    async fn apply(&self, item: T) -> Result<T, BoxError> {
        (self.f)(item).await.map_err(Into::into)
    }
}

/// Helper function to create a transform from a synchronous function
pub fn from_fn<F, T, E>(f: F) -> FnTransform<F, T, E>
where
    F: Fn(T) -> Result<T, E> + Send + Sync + 'static,
{
    FnTransform::new(f)
}

/// Helper function to create a transform from an async function
pub fn from_async_fn<F, Fut, T, E>(f: F) -> AsyncFnTransform<F, T, E>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send,
{
    AsyncFnTransform::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[tokio::test]
    async fn sync_fn_transform_applies_function() {
        let t = from_fn(|x: i32| Ok::<_, Infallible>(x * 2));
        assert_eq!(t.apply(21).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn sync_fn_transform_boxes_errors() {
        let t = from_fn(|x: i32| if x < 0 { Err("negative") } else { Ok(x) });
        let err = t.apply(-1).await.unwrap_err();
        assert_eq!(err.to_string(), "negative");
    }

    #[tokio::test]
    async fn async_fn_transform_awaits_future() {
        let t = from_async_fn(|s: String| async move {
            tokio::task::yield_now().await;
            Ok::<_, std::io::Error>(s.to_uppercase())
        });
        assert_eq!(t.apply("hello".to_string()).await.unwrap(), "HELLO");
    }
}
