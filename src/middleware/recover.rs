use std::any::Any;

use tokio::task::JoinHandle;
use tracing::{Instrument, error};

use super::Middleware;
use crate::context::Context;
use crate::error::Error;
use crate::handler::Handler;

/// Turns a panic in the wrapped handler into [`Error::Panic`].
///
/// The wrapped handler runs in its own task so that the panic stays inside
/// that task. If the outer future is dropped (a timeout fired, the client
/// went away) the task is aborted with it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recover;

impl Middleware for Recover {
    fn name(&self) -> &'static str {
        "recover"
    }

    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(move |ctx: Context| {
            let next = next.clone();
            async move {
                let span = ctx.logger().clone();
                let mut task = AbortOnDrop(tokio::spawn(next.call(ctx).instrument(span)));
                match (&mut task.0).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_panic() => {
                        let msg = panic_message(e.into_panic());
                        error!(panic = %msg, "handler panicked");
                        Err(Error::Panic(msg))
                    }
                    Err(e) => Err(Error::internal(e)),
                }
            }
        })
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast_ref::<&'static str>() {
            Some(msg) => (*msg).to_owned(),
            None => "unknown panic".to_owned(),
        },
    }
}
