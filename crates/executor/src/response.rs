use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use parser::Pos;
use serde::{Deserialize, Serialize};
use value::{ConstValue, Name, Variables};

/// One segment of a response path.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(Name),
    Index(usize),
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::Index(idx) => write!(f, "{}", idx),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(Name::new(name))
    }
}

impl From<usize> for PathSegment {
    fn from(idx: usize) -> Self {
        PathSegment::Index(idx)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub path: Vec<PathSegment>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub locations: Vec<Pos>,

    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub extensions: HashMap<String, ConstValue>,
}

impl ServerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Default::default(),
            locations: Default::default(),
            extensions: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub data: ConstValue,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<ServerError>,

    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub extensions: HashMap<String, ConstValue>,

    /// Set on incremental responses: where the deferred data belongs.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<Vec<PathSegment>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,

    /// Present once an operation has deferred work.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub has_next: Option<bool>,
}

impl Response {
    pub fn from_errors(errors: Vec<ServerError>) -> Self {
        Self {
            data: ConstValue::Null,
            errors,
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The outcome of one deferred group, delivered after the primary response.
#[derive(Debug, Clone)]
pub struct DeferredResult {
    pub path: Vec<PathSegment>,
    pub label: Option<String>,
    pub data: ConstValue,
    pub errors: Vec<ServerError>,
}

impl DeferredResult {
    pub fn into_response(self, has_next: bool) -> Response {
        Response {
            data: self.data,
            errors: self.errors,
            extensions: Default::default(),
            path: Some(self.path),
            label: self.label,
            has_next: Some(has_next),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub query: String,
    #[serde(rename = "operationName")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "variables_is_empty", default)]
    pub variables: Variables,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation: None,
            variables: Default::default(),
        }
    }

    pub fn operation(self, operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..self
        }
    }

    pub fn variables(self, variables: Variables) -> Self {
        Self { variables, ..self }
    }

    pub fn extend_variables(mut self, variables: Variables) -> Self {
        if let ConstValue::Object(obj) = variables.into_value() {
            self.variables.extend(obj);
        }
        self
    }
}

#[inline]
fn variables_is_empty(variables: &Variables) -> bool {
    variables.is_empty()
}
