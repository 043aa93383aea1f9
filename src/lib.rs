//! # keel
//!
//! The runtime core between an HTTP request and the handler that serves it.
//! keel turns each request into a typed, cancellable [`Context`], runs it
//! through an ordered chain of [`middleware`], invokes exactly one terminal
//! [`Handler`], and guarantees exactly one response, even when the handler
//! or a middleware fails.
//!
//! ## The contract
//!
//! - **One response per request.** The first write wins. If the chain fails,
//!   the [`ErrorHandler`] writes; if nothing wrote at all, the dispatcher
//!   reports `unhandled request` through the error handler.
//! - **Deterministic ordering.** The first middleware registered is the
//!   outermost wrapper. An outer layer that short-circuits stops everything
//!   inside it.
//! - **Bad payloads still see the chain.** A body that fails to decode never
//!   reaches the business handler, but every middleware still observes the
//!   request and its 400.
//! - **Cancellation on every exit.** [`Context::signal`] fires when dispatch
//!   ends, however it ends.
//! - **Fatal only at startup.** [`Application::serve`] exits the process when
//!   it cannot bind; nothing during request handling ever does.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::{Method, StatusCode};
//! use keel::{Application, Context, Error, Result, middleware};
//!
//! #[derive(serde::Deserialize)]
//! struct NewUser { name: String }
//!
//! #[tokio::main]
//! async fn main() {
//!     Application::new("users")
//!         .register(middleware::RequestId)
//!         .register(middleware::LogRequest)
//!         .register(middleware::Recover)
//!         .mount(Method::GET,  "/users/{id}", "users", "show",   show)
//!         .mount(Method::POST, "/users",      "users", "create", create)
//!         .serve("0.0.0.0:3000")
//!         .await;
//! }
//!
//! async fn show(ctx: Context) -> Result<()> {
//!     let id = ctx.param("id").unwrap_or("unknown");
//!     ctx.json(StatusCode::OK, &serde_json::json!({ "id": id }))
//! }
//!
//! async fn create(ctx: Context) -> Result<()> {
//!     let user: NewUser = ctx
//!         .payload_as()?
//!         .ok_or_else(|| Error::bad_request("validation", "missing body"))?;
//!     if user.name.is_empty() {
//!         return Err(Error::bad_request("validation", "name is required"));
//!     }
//!     ctx.respond(StatusCode::CREATED, "")
//! }
//! ```

mod app;
mod cancel;
mod context;
mod dispatch;
mod error;
mod handler;
mod response;
mod router;
mod server;

pub mod config;
pub mod decode;
pub mod error_handler;
pub mod middleware;

pub use app::Application;
pub use cancel::CancelSignal;
pub use config::{Config, ErrorPolicy};
pub use context::Context;
pub use dispatch::Endpoint;
pub use error::{Error, INVALID_REQUEST, Result};
pub use error_handler::ErrorHandler;
pub use handler::{BoxFuture, Handler, IntoHandler};
pub use middleware::Middleware;
pub use response::{Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
