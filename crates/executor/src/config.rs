use std::any::Any;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::response::ServerError;

/// Converts a recovered panic payload into a user facing error.
pub type RecoverFn = Arc<dyn Fn(&Context, Box<dyn Any + Send>) -> Error + Send + Sync>;

/// Converts a resolver error into the error reported in the response.
pub type ErrorPresenterFn = Arc<dyn Fn(&Context, Error) -> ServerError + Send + Sync>;

#[derive(Clone)]
pub struct ExecutorConfig {
    /// Maximum number of list elements or entity representations resolved at
    /// once per dispatch. `None` means unbounded.
    pub worker_limit: Option<usize>,
    pub recover: RecoverFn,
    pub error_presenter: ErrorPresenterFn,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_limit: None,
            recover: Arc::new(default_recover),
            error_presenter: Arc::new(default_error_presenter),
        }
    }
}

pub fn default_recover(ctx: &Context, payload: Box<dyn Any + Send>) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    tracing::error!(path = ?ctx.path(), panic = %message, "resolver panicked");
    Error::new("internal system error")
}

pub fn default_error_presenter(ctx: &Context, err: Error) -> ServerError {
    ServerError {
        message: err.message,
        path: err.path.unwrap_or_else(|| ctx.path()),
        locations: ctx.field_pos().into_iter().collect(),
        extensions: err.extensions,
    }
}
