use http::HeaderValue;
use http::header::HeaderName;
use uuid::Uuid;

use super::Middleware;
use crate::context::Context;
use crate::handler::Handler;

/// Header read and written by [`RequestId`].
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Gives every request an id.
///
/// An incoming `X-Request-Id` is reused, otherwise a UUID v4 is generated.
/// The id is stored on the context, recorded on the request span and echoed
/// on the response.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestId;

impl Middleware for RequestId {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(move |ctx: Context| {
            let next = next.clone();
            async move {
                let id = match ctx.header(REQUEST_ID_HEADER.as_str()) {
                    Some(id) if !id.is_empty() => id.to_owned(),
                    _ => Uuid::new_v4().to_string(),
                };
                if let Ok(value) = HeaderValue::from_str(&id) {
                    ctx.set_header(REQUEST_ID_HEADER, value);
                }
                ctx.set_request_id(id);
                next.call(ctx).await
            }
        })
    }
}
