//! Handler type and type erasure.
//!
//! # How async handlers are stored
//!
//! Middleware wraps handlers of *different* concrete types, and an endpoint
//! stores the fully composed result. We hide every concrete type behind one
//! trait object so that wrapping is a plain value-to-value function:
//!
//! ```text
//! async fn show(ctx: Context) -> Result<()> { … }   ← generated code writes this
//!        ↓ Handler::new(show)
//! show.into_handler()                                ← IntoHandler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                          ← heap-allocated wrapper
//!        ↓  stored as Handler(Arc<dyn ErasedHandler>)
//! handler.call(ctx)  at request time                 ← one vtable dispatch
//! ```
//!
//! Cloning a `Handler` is one atomic increment, which is what lets middleware
//! capture `next` inside an `Fn` closure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;

/// A heap-allocated, type-erased future resolving to a handler outcome.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture;
}

/// A unit of request handling: a function of [`Context`] that either writes a
/// response and succeeds, or fails with an [`Error`](crate::Error).
///
/// Terminal business handlers and middleware-wrapped handlers share this type.
#[derive(Clone)]
pub struct Handler(Arc<dyn ErasedHandler + Send + Sync + 'static>);

impl Handler {
    /// Wraps any `Fn(Context) -> impl Future<Output = Result<()>>`.
    ///
    /// ```rust
    /// use http::StatusCode;
    /// use keel::{Context, Handler, Result};
    ///
    /// async fn delete(ctx: Context) -> Result<()> {
    ///     ctx.respond(StatusCode::NO_CONTENT, "")
    /// }
    ///
    /// let handler = Handler::new(delete);
    /// ```
    pub fn new(f: impl IntoHandler) -> Self {
        f.into_handler()
    }

    pub fn call(&self, ctx: Context) -> BoxFuture {
        self.0.call(ctx)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

/// Implemented for every valid handler function.
///
/// Sealed: satisfied only by the blanket impl for
/// `Fn(Context) -> impl Future<Output = Result<()>>`.
pub trait IntoHandler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_handler(self) -> Handler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
}

impl<F, Fut> IntoHandler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn into_handler(self) -> Handler {
        Handler(Arc::new(FnHandler(self)))
    }
}

/// Bridges a concrete handler function to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin((self.0)(ctx))
    }
}
