//! The process-wide application.

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tracing::{Instrument, Span, error, info, info_span};

use crate::config::{Config, ErrorPolicy};
use crate::context::Context;
use crate::decode::{Decoder, JsonDecoder};
use crate::dispatch::Endpoint;
use crate::error::{Error, Result};
use crate::error_handler::{self, ErrorHandler};
use crate::handler::{Handler, IntoHandler};
use crate::middleware::{BoxedMiddleware, LogRequest, Middleware, Recover, RequestId, Timeout};
use crate::router::Router;
use crate::server::Server;

/// Owns the middleware chain, error handler, payload decoder, root logger and
/// route table shared by every endpoint.
///
/// Configure everything first, then bind endpoints, then serve:
///
/// ```rust,no_run
/// use http::{Method, StatusCode};
/// use keel::{Application, Context, Result, error_handler, middleware};
///
/// async fn show(ctx: Context) -> Result<()> {
///     ctx.json(StatusCode::OK, &serde_json::json!({ "id": ctx.param("id") }))
/// }
///
/// #[tokio::main]
/// async fn main() {
///     Application::new("accounts")
///         .register(middleware::RequestId)
///         .register(middleware::LogRequest)
///         .set_error_handler(error_handler::terse)
///         .mount(Method::GET, "/accounts/{id}", "accounts", "show", show)
///         .serve("0.0.0.0:8080")
///         .await;
/// }
/// ```
///
/// [`bind`](Application::bind) snapshots the chain, error handler and decoder.
/// Endpoints bound earlier are unaffected by later registrations, so the chain
/// an endpoint serves with can never change under a running request.
pub struct Application {
    name: String,
    logger: Span,
    middleware: Vec<BoxedMiddleware>,
    error_handler: ErrorHandler,
    decoder: Arc<dyn Decoder>,
    router: Router,
}

impl Application {
    /// Creates an application with the verbose error handler, the JSON
    /// decoder and an empty middleware chain.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            logger: info_span!("app", app = %name),
            name,
            middleware: Vec::new(),
            error_handler: error_handler::default_handler(),
            decoder: Arc::new(JsonDecoder),
            router: Router::new(),
        }
    }

    /// Creates an application from file configuration.
    ///
    /// Installed middleware, outermost first: request ids, request logging,
    /// the request timeout, panic recovery. A zero timeout installs none.
    pub fn from_config(config: &Config) -> Self {
        let mut app = Self::new(config.name.clone()).register(RequestId);
        if config.log_requests {
            app = app.register(LogRequest);
        }
        if let Some(ms) = config.request_timeout_ms.filter(|&ms| ms > 0) {
            app = app.register(Timeout::new(Duration::from_millis(ms)));
        }
        if config.recover_panics {
            app = app.register(Recover);
        }
        match config.error_policy {
            ErrorPolicy::Verbose => app.set_error_handler(error_handler::verbose),
            ErrorPolicy::Terse => app.set_error_handler(error_handler::terse),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    /// Root span every request span derives from.
    pub fn logger(&self) -> &Span { &self.logger }

    /// Appends `middleware` to the chain. The first registered is outermost.
    pub fn register(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Replaces the error handler. Last call wins.
    pub fn set_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Context, &Error) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Replaces the payload decoder.
    pub fn set_decoder(mut self, decoder: impl Decoder) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Produces the request entry point for `resource`/`action`.
    pub fn bind(&self, resource: &str, action: &str, handler: impl IntoHandler) -> Endpoint {
        Endpoint::new(
            resource.to_owned(),
            action.to_owned(),
            Handler::new(handler),
            self.middleware.iter().cloned().collect(),
            self.error_handler.clone(),
            self.decoder.clone(),
            self.logger.clone(),
        )
    }

    /// Adds `endpoint` to the route table.
    pub fn route(mut self, method: Method, path: &str, endpoint: Endpoint) -> Self {
        self.router = self.router.on(method, path, endpoint);
        self
    }

    /// [`bind`](Application::bind) followed by [`route`](Application::route).
    pub fn mount(
        self,
        method: Method,
        path: &str,
        resource: &str,
        action: &str,
        handler: impl IntoHandler,
    ) -> Self {
        let endpoint = self.bind(resource, action, handler);
        self.route(method, path, endpoint)
    }

    pub fn router(&self) -> &Router { &self.router }

    /// Binds `addr` and serves until SIGINT/SIGTERM.
    ///
    /// A startup failure (bad address, port in use) is fatal: it is logged and
    /// the process exits with status 1. Nothing after startup exits the process.
    pub async fn serve(self, addr: &str) {
        let logger = self.logger.clone();
        if let Err(e) = self.try_serve(addr).await {
            logger.in_scope(|| error!(addr, error = %e, "startup failed"));
            std::process::exit(1);
        }
    }

    /// Like [`serve`](Application::serve) but returns startup errors.
    pub async fn try_serve(self, addr: &str) -> Result<()> {
        let logger = self.logger.clone();
        async move {
            let server = Server::bind(addr).await?;
            info!(addr = %server.local_addr(), "listen");
            server.serve(self.router).await
        }
        .instrument(logger)
        .await
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("middleware", &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
