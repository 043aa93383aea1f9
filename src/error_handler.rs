//! Translation of unhandled failures into responses.
//!
//! An error handler runs when the middleware chain returns an error, and once
//! more if the chain finished without anything writing a response. It must
//! write a response. If that write itself fails the failure is logged and
//! goes no further; the request is already lost at that point.
//!
//! | Failure | [`verbose`] | [`terse`] |
//! |---|---|---|
//! | client-caused ([`Error::BadRequest`]) | 400, JSON body | 400, JSON body |
//! | anything else | 500, JSON body | 500, empty body |
//!
//! The JSON body is `{"kind": …, "msg": …}`.

use std::sync::Arc;

use tracing::error;

use crate::context::Context;
use crate::error::Error;
use crate::response::Response;

/// Application-wide error handler.
pub type ErrorHandler = Arc<dyn Fn(&Context, &Error) + Send + Sync + 'static>;

/// Writes the error document for every failure. The default.
pub fn verbose(ctx: &Context, err: &Error) {
    let res = Response::builder().status(err.status()).json(err.to_body());
    if let Err(e) = ctx.send(res) {
        error!(error = %e, cause = %err, "failed to send verbose error response");
    }
}

/// Like [`verbose`], but withholds the body of non-client-caused failures so
/// internal detail never reaches the caller.
pub fn terse(ctx: &Context, err: &Error) {
    let res = if err.is_client_error() {
        Response::builder().status(err.status()).json(err.to_body())
    } else {
        Response::status(err.status())
    };
    if let Err(e) = ctx.send(res) {
        error!(error = %e, cause = %err, "failed to send terse error response");
    }
}

pub(crate) fn default_handler() -> ErrorHandler {
    Arc::new(verbose)
}
