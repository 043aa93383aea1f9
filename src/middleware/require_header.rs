use http::StatusCode;
use regex::Regex;
use tracing::info;

use super::Middleware;
use crate::context::Context;
use crate::handler::Handler;

/// Rejects requests whose header does not match a pattern.
///
/// A missing header, or one whose value does not match `value`, is answered
/// with `fail_status` and an empty body; nothing inside this layer runs.
/// [`for_paths`](RequireHeader::for_paths) limits the check to matching paths.
///
/// ```rust
/// use http::StatusCode;
/// use keel::middleware::RequireHeader;
/// use regex::Regex;
///
/// let key = Regex::new("^[0-9a-f]{32}$").unwrap();
/// let api_key = RequireHeader::new("x-api-key", key, StatusCode::UNAUTHORIZED)
///     .for_paths(Regex::new("^/admin").unwrap());
/// ```
#[derive(Clone, Debug)]
pub struct RequireHeader {
    header: String,
    value: Regex,
    fail_status: StatusCode,
    paths: Option<Regex>,
}

impl RequireHeader {
    pub fn new(header: impl Into<String>, value: Regex, fail_status: StatusCode) -> Self {
        Self { header: header.into(), value, fail_status, paths: None }
    }

    pub fn for_paths(mut self, paths: Regex) -> Self {
        self.paths = Some(paths);
        self
    }

    fn admits(&self, ctx: &Context) -> bool {
        if self.paths.as_ref().is_some_and(|p| !p.is_match(ctx.path())) {
            return true;
        }
        ctx.header(&self.header).is_some_and(|v| self.value.is_match(v))
    }
}

impl Middleware for RequireHeader {
    fn name(&self) -> &'static str {
        "require_header"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let rule = self.clone();
        Handler::new(move |ctx: Context| {
            let next = next.clone();
            let rule = rule.clone();
            async move {
                if rule.admits(&ctx) {
                    return next.call(ctx).await;
                }
                info!(
                    header = %rule.header,
                    status = rule.fail_status.as_u16(),
                    "required header missing or invalid"
                );
                ctx.respond(rule.fail_status, "")
            }
        })
    }
}
