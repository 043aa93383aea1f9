//! Per-request execution path.
//!
//! An [`Endpoint`] is what [`Application::bind`](crate::Application::bind)
//! hands to the router: the terminal handler for one resource/action, already
//! wrapped in the application's middleware chain, plus the error handler and
//! decoder it was bound with. [`Endpoint::call`] runs one request:
//!
//! 1. collect path and query parameters (repeated query keys keep their order),
//! 2. decode the body, only if there is one,
//! 3. build the [`Context`] and arm its cancellation guard,
//! 4. run the composed chain, or on a decode failure the same chain around a
//!    handler that rejects the request with a 400,
//! 5. hand any failure to the error handler,
//! 6. if still nothing was written, report `unhandled request` through the
//!    error handler, so every request gets exactly one response.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use serde_json::Value;
use tracing::{Instrument, Span, debug, error, info_span, warn};

use crate::cancel;
use crate::context::Context;
use crate::decode::Decoder;
use crate::error::{Error, INVALID_REQUEST};
use crate::error_handler::ErrorHandler;
use crate::handler::{BoxFuture, Handler};
use crate::middleware::{self, BoxedMiddleware};
use crate::response::Response;

/// A bound request entry point for one resource/action.
///
/// Cheap to clone; the router stores one per route.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

struct Inner {
    resource: String,
    action: String,
    chain: Arc<[BoxedMiddleware]>,
    handler: Handler,
    error_handler: ErrorHandler,
    decoder: Arc<dyn Decoder>,
    logger: Span,
}

impl Endpoint {
    pub(crate) fn new(
        resource: String,
        action: String,
        terminal: Handler,
        chain: Arc<[BoxedMiddleware]>,
        error_handler: ErrorHandler,
        decoder: Arc<dyn Decoder>,
        logger: Span,
    ) -> Self {
        // Composed once here; only the decode-failure path composes per request.
        let handler = middleware::compose(&chain, terminal);
        Self {
            inner: Arc::new(Inner {
                resource,
                action,
                chain,
                handler,
                error_handler,
                decoder,
                logger,
            }),
        }
    }

    pub fn resource(&self) -> &str { &self.inner.resource }
    pub fn action(&self) -> &str { &self.inner.action }

    /// Runs one request through the endpoint and returns the response to flush.
    ///
    /// `params` are the path parameters extracted by the router.
    pub async fn call<B>(
        &self,
        req: http::Request<B>,
        params: HashMap<String, String>,
    ) -> http::Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: fmt::Display,
    {
        let span = info_span!(
            parent: &self.inner.logger,
            "request",
            ctrl = %self.inner.resource,
            action = %self.inner.action,
            req_id = tracing::field::Empty,
        );
        self.dispatch(req, params, span.clone()).instrument(span).await
    }

    async fn dispatch<B>(
        &self,
        req: http::Request<B>,
        params: HashMap<String, String>,
        span: Span,
    ) -> http::Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: fmt::Display,
    {
        // Fires when this function is left, however it is left.
        let (_guard, signal) = cancel::pair();

        let (parts, body) = req.into_parts();
        debug!(method = %parts.method, path = parts.uri.path(), "dispatch");
        let query = parse_query(parts.uri.query());

        let (payload, rejection) = match self.decode(body).await {
            Ok(payload) => (payload, None),
            Err(msg) => {
                warn!(error = %msg, "invalid request payload");
                (None, Some(msg))
            }
        };

        let ctx = Context::new(parts, params, query, payload, span, signal);
        let handler = match rejection {
            None => self.inner.handler.clone(),
            Some(msg) => middleware::compose(&self.inner.chain, reject(msg)),
        };

        if let Err(err) = handler.call(ctx.clone()).await {
            (self.inner.error_handler)(&ctx, &err);
        }

        if !ctx.response_written() {
            error!("unhandled request");
            (self.inner.error_handler)(&ctx, &Error::Unhandled);
        }

        match ctx.take_response() {
            Some(res) => res.into_inner(),
            None => {
                error!("error handler wrote no response");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR).into_inner()
            }
        }
    }

    /// Collects the body and decodes it if non-empty. `Err` carries the
    /// message sent back to the caller.
    async fn decode<B>(&self, body: B) -> Result<Option<Value>, String>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: fmt::Display,
    {
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => return Err(format!("failed to read body: {e}")),
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        self.inner.decoder.decode(&bytes).map(Some).map_err(|e| e.to_string())
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("resource", &self.inner.resource)
            .field("action", &self.inner.action)
            .field("middleware", &self.inner.chain.len())
            .finish()
    }
}

/// Terminal handler substituted for the business handler when decoding fails.
fn reject(msg: String) -> Handler {
    Handler::new(move |_ctx: Context| -> BoxFuture {
        let err = Error::bad_request(INVALID_REQUEST, msg.clone());
        Box::pin(async move { Err(err) })
    })
}

fn parse_query(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        out.entry(name.into_owned()).or_default().push(value.into_owned());
    }
    out
}
