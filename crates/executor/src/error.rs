use std::collections::HashMap;
use std::fmt::Display;

use thiserror::Error;
use value::{ConstValue, Name};

use crate::response::PathSegment;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error returned by a resolver.
///
/// Any `Display` value converts into it, so resolvers can use `?` freely.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub message: String,
    /// An explicit response path; when `None` the path of the reporting field is used.
    pub path: Option<Vec<PathSegment>>,
    pub extensions: HashMap<String, ConstValue>,
}

impl Error {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: Default::default(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new("operation cancelled")
    }

    pub fn with_path(self, path: Vec<PathSegment>) -> Self {
        Self {
            path: Some(path),
            ..self
        }
    }

    pub fn extend_with(mut self, name: impl Into<String>, value: ConstValue) -> Self {
        self.extensions.insert(name.into(), value);
        self
    }
}

impl<T: Display + Send + Sync + 'static> From<T> for Error {
    fn from(err: T) -> Self {
        Error::new(err.to_string())
    }
}

/// Per-item errors of a batch resolver, one slot per parent, `None` for successes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchErrorList(pub Vec<Option<Error>>);

impl BatchErrorList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Error> {
        self.0.get(index).and_then(Option::as_ref)
    }

    /// Iterate over the errors that are actually set.
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.0.iter().flatten()
    }
}

impl FromIterator<Option<Error>> for BatchErrorList {
    fn from_iter<I: IntoIterator<Item = Option<Error>>>(iter: I) -> Self {
        BatchErrorList(iter.into_iter().collect())
    }
}

/// Errors raised before execution starts.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{0}")]
    Parse(#[from] parser::Error),

    #[error("Unknown operation named \"{0}\".")]
    UnknownOperation(String),

    #[error("Operation name required in request.")]
    MissingOperationName,

    #[error("Unknown fragment \"{0}\".")]
    UnknownFragment(Name),

    #[error("Schema is not configured for {0} operations.")]
    UnsupportedOperation(&'static str),

    #[error("Subscription operations must be executed as a stream.")]
    SubscriptionNotStreamed,

    #[error("Subscription must select exactly one root field.")]
    InvalidSubscriptionRoot,

    #[error("Cannot query field \"{field}\" on type \"{object}\".")]
    UnknownField { object: String, field: Name },
}

/// Errors raised while resolving entity representations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EntityError {
    #[error("__typename must be an existing string")]
    MissingTypename,

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("finding resolver for Entity \"{0}\": type not found for {0}")]
    TypeNotFound(String),

    #[error("resolving Entity \"{type_name}\": {}", .error.message)]
    Resolve { type_name: String, error: Error },

    #[error("resolving Entity \"{type_name}\": returned {results} results for {representations} representations")]
    ResultCount {
        type_name: String,
        results: usize,
        representations: usize,
    },
}

impl EntityError {
    /// `true` when the representation named no usable type, as opposed to
    /// naming a type whose key fields matched no resolver.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, EntityError::MissingTypename | EntityError::UnknownType(_))
    }
}
