use std::collections::HashMap;

use spin::Mutex;
use value::ConstValue;

use crate::response::{PathSegment, ServerError};

/// The error sink and extension map of one response.
///
/// Shared by every resolver working on the response.
#[derive(Default)]
pub struct ResponseContext {
    errors: Mutex<Vec<ServerError>>,
    extensions: Mutex<HashMap<String, ConstValue>>,
}

impl ResponseContext {
    pub fn push_error(&self, err: ServerError) {
        self.errors.lock().push(err);
    }

    /// A snapshot of the errors reported so far, in reporting order.
    pub fn errors(&self) -> Vec<ServerError> {
        self.errors.lock().clone()
    }

    pub fn has_error_at(&self, path: &[PathSegment]) -> bool {
        self.errors.lock().iter().any(|err| err.path == path)
    }

    /// Errors reported at `path` or anywhere below it.
    pub fn errors_below(&self, path: &[PathSegment]) -> Vec<ServerError> {
        self.errors
            .lock()
            .iter()
            .filter(|err| err.path.starts_with(path))
            .cloned()
            .collect()
    }

    pub fn set_extension(&self, name: impl Into<String>, value: ConstValue) {
        self.extensions.lock().insert(name.into(), value);
    }

    pub fn extension(&self, name: &str) -> Option<ConstValue> {
        self.extensions.lock().get(name).cloned()
    }

    pub fn take_parts(&self) -> (Vec<ServerError>, HashMap<String, ConstValue>) {
        (
            std::mem::take(&mut *self.errors.lock()),
            std::mem::take(&mut *self.extensions.lock()),
        )
    }
}
