use std::time::Duration;

use tracing::warn;

use super::Middleware;
use crate::context::Context;
use crate::error::Error;
use crate::handler::Handler;

/// Fails the request with [`Error::Timeout`] when the wrapped handler does not
/// finish within `limit`.
///
/// The wrapped future is dropped on expiry. A handler that already wrote its
/// response before the deadline keeps it: the error handler's later write is
/// rejected by the context, so the caller sees exactly one response either way.
/// Work the handler moved onto its own tasks should watch
/// [`Context::signal`](crate::Context::signal).
#[derive(Clone, Copy, Debug)]
pub struct Timeout {
    limit: Duration,
}

impl Timeout {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl Middleware for Timeout {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let limit = self.limit;
        Handler::new(move |ctx: Context| {
            let next = next.clone();
            async move {
                match tokio::time::timeout(limit, next.call(ctx.clone())).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(
                            limit_ms = limit.as_millis() as u64,
                            written = ctx.response_written(),
                            "request timed out"
                        );
                        Err(Error::Timeout(limit))
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};

    use super::*;
    use crate::context::tests::context;
    use crate::error_handler;

    fn sleeper(delay: Duration) -> Handler {
        Handler::new(move |ctx: Context| async move {
            tokio::time::sleep(delay).await;
            ctx.respond(StatusCode::OK, "slow")
        })
    }

    #[tokio::test]
    async fn fast_handler_is_untouched() {
        let handler = Timeout::new(Duration::from_secs(1)).wrap(sleeper(Duration::ZERO));
        let (ctx, _guard) = context(Method::GET, "/");

        handler.call(ctx.clone()).await.unwrap();
        assert_eq!(ctx.written_status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let handler = Timeout::new(Duration::from_millis(10)).wrap(sleeper(Duration::from_secs(5)));
        let (ctx, _guard) = context(Method::GET, "/");

        let err = handler.call(ctx.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(!ctx.response_written());
    }

    #[tokio::test]
    async fn write_before_deadline_wins_over_timeout_error() {
        let slow = Handler::new(|ctx: Context| async move {
            ctx.respond(StatusCode::ACCEPTED, "queued")?;
            tokio::time::sleep(Duration::from_secs(5)).await;
            ctx.respond(StatusCode::OK, "never")
        });
        let handler = Timeout::new(Duration::from_millis(20)).wrap(slow);
        let (ctx, _guard) = context(Method::GET, "/");

        let err = handler.call(ctx.clone()).await.unwrap_err();
        error_handler::verbose(&ctx, &err);

        let res = ctx.take_response().unwrap();
        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        assert_eq!(res.body().as_ref(), b"queued");
    }
}
