use std::time::Instant;

use tracing::{debug, info, warn};

use super::Middleware;
use crate::context::Context;
use crate::handler::Handler;

/// Logs each request on arrival and its outcome on the way out.
///
/// Events are emitted inside the request span, so they carry the
/// `ctrl`/`action`/`req_id` fields of the endpoint being served.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRequest;

impl Middleware for LogRequest {
    fn name(&self) -> &'static str {
        "log_request"
    }

    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(move |ctx: Context| {
            let next = next.clone();
            async move {
                let started = Instant::now();
                info!(method = %ctx.method(), path = ctx.path(), "started");
                if !ctx.params().is_empty() {
                    debug!(params = ?ctx.params(), "path params");
                }
                if !ctx.queries().is_empty() {
                    debug!(query = ?ctx.queries(), "query params");
                }

                let outcome = next.call(ctx.clone()).await;

                let elapsed_ms = started.elapsed().as_millis() as u64;
                match &outcome {
                    Ok(()) => match ctx.written_status() {
                        Some(status) => info!(status = status.as_u16(), elapsed_ms, "completed"),
                        None => warn!(elapsed_ms, "completed without response"),
                    },
                    Err(e) => info!(error = %e, elapsed_ms, "failed"),
                }
                outcome
            }
        })
    }
}
