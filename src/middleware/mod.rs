//! Middleware layer.
//!
//! Middleware is a transformation from [`Handler`] to [`Handler`]: the
//! returned handler may do work before calling the wrapped one, after it,
//! both, or short-circuit by never calling it at all. This is the place for
//! cross-cutting concerns such as structured request logging, request ids,
//! panic recovery, deadlines and header gating.
//!
//! # Ordering
//!
//! The chain is composed by folding from the back:
//!
//! ```text
//! effective = chain[0](chain[1](… chain[n-1](terminal) …))
//! ```
//!
//! The **first** middleware registered is the outermost: it sees the request
//! first and the outcome last. An outer layer that short-circuits prevents
//! every inner layer and the terminal handler from running.
//!
//! Middleware may hold process-wide state but never per-request state outside
//! the [`Context`](crate::Context) it is given.

mod log;
mod recover;
mod request_id;
mod require_header;
mod timeout;

use std::sync::Arc;

use crate::handler::Handler;

pub use log::LogRequest;
pub use recover::Recover;
pub use request_id::{REQUEST_ID_HEADER, RequestId};
pub use require_header::RequireHeader;
pub use timeout::Timeout;

/// A cross-cutting wrapper around a [`Handler`].
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Returns a handler that runs this middleware around `next`.
    fn wrap(&self, next: Handler) -> Handler;
}

/// A type-erased middleware as stored by the application chain.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Middleware built from a closure. See [`from_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

/// Adapts a `Fn(Handler) -> Handler` closure into [`Middleware`].
///
/// ```rust
/// use keel::middleware::{self, Middleware};
/// use keel::{Context, Handler};
///
/// let audit = middleware::from_fn("audit", |next: Handler| {
///     Handler::new(move |ctx: Context| {
///         let next = next.clone();
///         async move {
///             tracing::info!(path = ctx.path(), "audit");
///             next.call(ctx).await
///         }
///     })
/// });
/// assert_eq!(audit.name(), "audit");
/// ```
pub fn from_fn<F>(name: &'static str, func: F) -> FnMiddleware<F>
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    FnMiddleware { name, func }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn wrap(&self, next: Handler) -> Handler {
        (self.func)(next)
    }
}

/// Wraps `terminal` in `chain`, `chain[0]` outermost.
pub fn compose(chain: &[BoxedMiddleware], terminal: Handler) -> Handler {
    chain.iter().rev().fold(terminal, |next, middleware| middleware.wrap(next))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use http::{Method, StatusCode};
    use parking_lot::Mutex;

    use super::*;
    use crate::context::Context;
    use crate::context::tests::context;

    pub(crate) type Trace = Arc<Mutex<Vec<String>>>;

    /// Records `"<label>:before"` and `"<label>:after"` around the wrapped handler.
    pub(crate) fn recorder(label: &'static str, trace: Trace) -> BoxedMiddleware {
        Arc::new(from_fn("recorder", move |next: Handler| {
            let trace = trace.clone();
            Handler::new(move |ctx: Context| {
                let next = next.clone();
                let trace = trace.clone();
                async move {
                    trace.lock().push(format!("{label}:before"));
                    let outcome = next.call(ctx).await;
                    trace.lock().push(format!("{label}:after"));
                    outcome
                }
            })
        }))
    }

    fn terminal(trace: Trace) -> Handler {
        Handler::new(move |ctx: Context| {
            let trace = trace.clone();
            async move {
                trace.lock().push("handler".into());
                ctx.respond(StatusCode::NO_CONTENT, "")
            }
        })
    }

    #[tokio::test]
    async fn order_is_deterministic_for_any_length() {
        const LABELS: [&str; 5] = ["a", "b", "c", "d", "e"];

        for n in 0..=LABELS.len() {
            let trace = Trace::default();
            let chain: Vec<_> = LABELS[..n].iter().map(|&l| recorder(l, trace.clone())).collect();
            let (ctx, _guard) = context(Method::GET, "/");

            compose(&chain, terminal(trace.clone())).call(ctx).await.unwrap();

            let mut expected: Vec<String> =
                LABELS[..n].iter().map(|l| format!("{l}:before")).collect();
            expected.push("handler".into());
            expected.extend(LABELS[..n].iter().rev().map(|l| format!("{l}:after")));
            assert_eq!(*trace.lock(), expected, "chain of length {n}");
        }
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_layers() {
        let trace = Trace::default();
        let gate: BoxedMiddleware = Arc::new(from_fn("gate", |_next: Handler| {
            Handler::new(|ctx: Context| async move { ctx.respond(StatusCode::FORBIDDEN, "") })
        }));
        let chain = vec![recorder("outer", trace.clone()), gate, recorder("inner", trace.clone())];
        let (ctx, _guard) = context(Method::GET, "/");

        compose(&chain, terminal(trace.clone())).call(ctx.clone()).await.unwrap();

        assert_eq!(*trace.lock(), vec!["outer:before", "outer:after"]);
        assert_eq!(ctx.written_status(), Some(StatusCode::FORBIDDEN));
    }
}
