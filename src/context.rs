//! Per-request state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::request::Parts;
use http::{HeaderMap, Method, StatusCode, Uri};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Span;

use crate::cancel::CancelSignal;
use crate::error::{Error, INVALID_REQUEST, Result};
use crate::response::Response;

/// Request state shared by every layer handling one request.
///
/// A `Context` is a handle: cloning it is cheap and every clone refers to the
/// same request. That is what lets a timeout middleware race the handler it
/// wraps, or a handler hand the context to a task it spawns. Contexts are
/// never shared between requests.
///
/// At most one response is ever recorded. The first successful
/// [`send`](Context::send) wins and every later attempt returns
/// [`Error::AlreadyWritten`].
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    parts: Parts,
    params: HashMap<String, String>,
    query: HashMap<String, Vec<String>>,
    payload: Option<Value>,
    logger: Span,
    signal: CancelSignal,
    request_id: OnceLock<String>,
    written: AtomicBool,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    headers: HeaderMap,
    response: Option<Response>,
    status: Option<StatusCode>,
}

impl Context {
    pub(crate) fn new(
        parts: Parts,
        params: HashMap<String, String>,
        query: HashMap<String, Vec<String>>,
        payload: Option<Value>,
        logger: Span,
        signal: CancelSignal,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                parts,
                params,
                query,
                payload,
                logger,
                signal,
                request_id: OnceLock::new(),
                written: AtomicBool::new(false),
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    // ── Request ──────────────────────────────────────────────────────────────

    pub fn method(&self) -> &Method { &self.inner.parts.method }
    pub fn uri(&self) -> &Uri { &self.inner.parts.uri }
    pub fn path(&self) -> &str { self.inner.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.inner.parts.headers }

    /// Request header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.parts.headers.get(name)?.to_str().ok()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `ctx.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.inner.params }

    /// First value of a query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_all(name).first().map(String::as_str)
    }

    /// Every value of a query parameter, in the order they appeared.
    pub fn query_all(&self, name: &str) -> &[String] {
        self.inner.query.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn queries(&self) -> &HashMap<String, Vec<String>> { &self.inner.query }

    /// The decoded request payload, `None` when the request had no body.
    pub fn payload(&self) -> Option<&Value> { self.inner.payload.as_ref() }

    /// Deserializes the payload into `T`.
    ///
    /// A payload of the wrong shape is the caller's fault and yields a
    /// client-caused [`Error::BadRequest`].
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.inner
            .payload
            .as_ref()
            .map(|v| T::deserialize(v))
            .transpose()
            .map_err(|e| Error::bad_request(INVALID_REQUEST, format!("invalid payload: {e}")))
    }

    // ── Scope ────────────────────────────────────────────────────────────────

    /// Request span carrying `ctrl`, `action` and `req_id` fields.
    pub fn logger(&self) -> &Span { &self.inner.logger }

    /// A signal that fires once dispatch of this request has finished.
    pub fn signal(&self) -> CancelSignal { self.inner.signal.clone() }

    pub fn is_cancelled(&self) -> bool { self.inner.signal.is_cancelled() }

    pub fn request_id(&self) -> Option<&str> {
        self.inner.request_id.get().map(String::as_str)
    }

    /// Records the request id. Only the first call has any effect.
    pub fn set_request_id(&self, id: String) {
        if self.inner.request_id.set(id).is_ok() {
            if let Some(id) = self.inner.request_id.get() {
                self.inner.logger.record("req_id", id.as_str());
            }
        }
    }

    // ── Response ─────────────────────────────────────────────────────────────

    /// Queues a header for whichever response ends up being written.
    ///
    /// Headers set explicitly on that response take precedence.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.inner.slot.lock().headers.insert(name, value);
    }

    /// Writes a response with the given status and raw body.
    pub fn respond(&self, status: StatusCode, body: impl Into<Bytes>) -> Result<()> {
        self.send(Response { status, headers: HeaderMap::new(), body: body.into() })
    }

    /// Writes `value` as a JSON response.
    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value).map_err(Error::internal)?;
        self.send(Response::builder().status(status).json(body))
    }

    /// Records `response` as this request's response.
    ///
    /// Check and store happen under one lock, so when writers race (a handler
    /// and a timeout, say) exactly one of them succeeds.
    pub fn send(&self, mut response: Response) -> Result<()> {
        let mut slot = self.inner.slot.lock();
        if self.inner.written.load(Ordering::Acquire) {
            return Err(Error::AlreadyWritten);
        }
        response.merge_headers(std::mem::take(&mut slot.headers));
        slot.status = Some(response.status);
        slot.response = Some(response);
        self.inner.written.store(true, Ordering::Release);
        Ok(())
    }

    /// True once a response has been written. Never reset.
    pub fn response_written(&self) -> bool {
        self.inner.written.load(Ordering::Acquire)
    }

    /// Status of the written response, if any.
    pub fn written_status(&self) -> Option<StatusCode> {
        self.inner.slot.lock().status
    }

    /// Removes the written response for flushing. The written flag stays set.
    pub(crate) fn take_response(&self) -> Option<Response> {
        self.inner.slot.lock().response.take()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.method())
            .field("path", &self.path())
            .field("params", &self.inner.params)
            .field("response_written", &self.response_written())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use http::header::CONTENT_TYPE;

    use super::*;
    use crate::cancel::{self, CancelGuard};

    /// Bare context for unit tests. Keep the guard alive to keep the signal unfired.
    pub(crate) fn context(method: Method, uri: &str) -> (Context, CancelGuard) {
        let (parts, ()) = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        let (guard, signal) = cancel::pair();
        let ctx = Context::new(parts, HashMap::new(), HashMap::new(), None, Span::none(), signal);
        (ctx, guard)
    }

    #[test]
    fn first_write_wins() {
        let (ctx, _guard) = context(Method::GET, "/");
        assert!(!ctx.response_written());

        ctx.respond(StatusCode::OK, "first").unwrap();
        assert!(ctx.response_written());

        let err = ctx.respond(StatusCode::INTERNAL_SERVER_ERROR, "second").unwrap_err();
        assert!(matches!(err, Error::AlreadyWritten));
        assert_eq!(ctx.written_status(), Some(StatusCode::OK));
        assert_eq!(ctx.take_response().unwrap().body(), &Bytes::from_static(b"first"));
    }

    #[test]
    fn flag_survives_take() {
        let (ctx, _guard) = context(Method::GET, "/");
        ctx.respond(StatusCode::ACCEPTED, "").unwrap();
        assert!(ctx.take_response().is_some());
        assert!(ctx.response_written());
        assert!(ctx.respond(StatusCode::OK, "").is_err());
        assert!(ctx.take_response().is_none());
    }

    #[test]
    fn pending_headers_join_response() {
        let (ctx, _guard) = context(Method::GET, "/");
        ctx.set_header(HeaderName::from_static("x-request-id"), HeaderValue::from_static("r-1"));
        ctx.json(StatusCode::CREATED, &serde_json::json!({ "id": 1 })).unwrap();

        let res = ctx.take_response().unwrap();
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.headers()["x-request-id"], "r-1");
        assert_eq!(res.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn clones_share_one_slot() {
        let (ctx, _guard) = context(Method::GET, "/");
        let other = ctx.clone();
        other.respond(StatusCode::OK, "").unwrap();
        assert!(ctx.response_written());
        assert!(ctx.respond(StatusCode::OK, "").is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn racing_writers_record_exactly_one_response() {
        let (ctx, _guard) = context(Method::GET, "/");
        let writers: Vec<_> = (0..64u16)
            .map(|i| {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let status = StatusCode::from_u16(200 + i % 8).unwrap();
                    (status, ctx.respond(status, format!("writer {i}")))
                })
            })
            .collect();

        let mut winners = Vec::new();
        for writer in writers {
            match writer.await.unwrap() {
                (status, Ok(())) => winners.push(status),
                (_, Err(err)) => assert!(matches!(err, Error::AlreadyWritten), "{err}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(ctx.written_status(), Some(winners[0]));
        assert_eq!(ctx.take_response().unwrap().status_code(), winners[0]);
    }

    /// Collects every `req_id` value recorded on any span.
    #[derive(Clone, Default)]
    struct RecordedIds(Arc<Mutex<Vec<String>>>);

    struct ReqIdVisitor<'a>(&'a mut Vec<String>);

    impl tracing::field::Visit for ReqIdVisitor<'_> {
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            if field.name() == "req_id" {
                self.0.push(value.to_owned());
            }
        }

        fn record_debug(&mut self, _: &tracing::field::Field, _: &dyn std::fmt::Debug) {}
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for RecordedIds {
        fn on_record(
            &self,
            _id: &tracing::span::Id,
            values: &tracing::span::Record<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            values.record(&mut ReqIdVisitor(&mut self.0.lock()));
        }
    }

    #[test]
    fn request_id_is_set_and_recorded_once() {
        use tracing_subscriber::layer::SubscriberExt;

        let recorded = RecordedIds::default();
        let subscriber = tracing_subscriber::registry().with(recorded.clone());
        let ctx = tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("request", req_id = tracing::field::Empty);
            let (parts, ()) = http::Request::get("/").body(()).unwrap().into_parts();
            let (_guard, signal) = cancel::pair();
            let ctx = Context::new(parts, HashMap::new(), HashMap::new(), None, span, signal);
            ctx.set_request_id("first".to_owned());
            ctx.set_request_id("second".to_owned());
            ctx
        });

        assert_eq!(ctx.request_id(), Some("first"));
        assert_eq!(*recorded.0.lock(), ["first"]);
    }

    #[test]
    fn payload_as_maps_shape_errors_to_bad_request() {
        let (parts, ()) = http::Request::post("/").body(()).unwrap().into_parts();
        let (_guard, signal) = cancel::pair();
        let ctx = Context::new(
            parts,
            HashMap::new(),
            HashMap::new(),
            Some(serde_json::json!({ "name": 7 })),
            Span::none(),
            signal,
        );

        #[derive(serde::Deserialize)]
        struct Named {
            #[allow(dead_code)]
            name: String,
        }

        let err = ctx.payload_as::<Named>().err().unwrap();
        assert!(err.is_client_error());
        assert!(ctx.payload_as::<Value>().unwrap().is_some());
    }

    #[test]
    fn request_id_is_set_once() {
        let (ctx, _guard) = context(Method::GET, "/");
        ctx.set_request_id("a".into());
        ctx.set_request_id("b".into());
        assert_eq!(ctx.request_id(), Some("a"));
    }
}
