use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parser::Pos;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use value::{ConstValue, Variables};

use crate::batch::BatchParentGroup;
use crate::collector::{self, CollectedField, CollectorCache};
use crate::config::ExecutorConfig;
use crate::deferred::DeferredSender;
use crate::document::{resolve_value, Document, SelectionSet};
use crate::error::{Error, Result};
use crate::path::{FieldInfo, PathNode, Segment};
use crate::response::{PathSegment, ServerError};
use crate::response_context::ResponseContext;

/// State shared by everything executed for one operation.
pub(crate) struct OperationContext {
    pub(crate) document: Arc<Document>,
    pub(crate) variables: Variables,
    pub(crate) collector: CollectorCache,
    pub(crate) config: Arc<ExecutorConfig>,
    pub(crate) token: CancellationToken,
    pub(crate) deferred: DeferredSender,
}

/// Execution context handed to resolvers.
///
/// Cloning is cheap; every field and list element gets its own context whose
/// path node links back to its parent.
#[derive(Clone)]
pub struct Context {
    operation: Arc<OperationContext>,
    response: Arc<ResponseContext>,
    path: Option<Arc<PathNode>>,
    batch: Option<Arc<HashMap<String, Arc<BatchParentGroup>>>>,
}

impl Context {
    pub(crate) fn new(operation: OperationContext) -> Self {
        Self {
            operation: Arc::new(operation),
            response: Default::default(),
            path: None,
            batch: None,
        }
    }

    pub fn path(&self) -> Vec<PathSegment> {
        match &self.path {
            Some(node) => node.path(),
            None => Vec::new(),
        }
    }

    pub fn path_node(&self) -> Option<&Arc<PathNode>> {
        self.path.as_ref()
    }

    /// The field currently being resolved, or the list field an element belongs to.
    pub fn field(&self) -> Option<&FieldInfo> {
        self.path.as_ref().and_then(|node| node.field_info())
    }

    pub(crate) fn field_pos(&self) -> Option<Pos> {
        self.field().map(|field| field.pos)
    }

    pub fn variables(&self) -> &Variables {
        &self.operation.variables
    }

    /// Deserialize an argument of the current field. Missing arguments
    /// deserialize from `null`.
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .field()
            .and_then(|field| field.arguments.get(name))
            .cloned()
            .unwrap_or_default();
        Ok(value::from_value(value)?)
    }

    pub fn with_field(
        &self,
        object: &'static str,
        field: &CollectedField,
        is_resolver: bool,
    ) -> Self {
        let variables = &self.operation.variables;
        let arguments = field
            .node
            .arguments
            .iter()
            .map(|(name, value)| (name.clone(), resolve_value(value, variables)))
            .collect();
        let info = FieldInfo {
            alias: field.alias.clone(),
            name: field.name.clone(),
            object,
            is_resolver,
            arguments,
            pos: field.node.pos,
        };
        Self {
            path: Some(PathNode::field(self.path.clone(), info)),
            ..self.clone()
        }
    }

    pub fn with_index(&self, idx: usize) -> Self {
        Self {
            path: Some(PathNode::index(self.path.clone(), idx)),
            ..self.clone()
        }
    }

    /// The same position in the tree reporting into a new, empty error sink.
    pub(crate) fn with_fresh_response(&self) -> Self {
        Self {
            response: Default::default(),
            ..self.clone()
        }
    }

    /// Report an error at the current field.
    ///
    /// The error presenter runs before the error list is locked, so it may
    /// inspect the context freely.
    pub fn add_error(&self, err: impl Into<Error>) {
        let err = (self.operation.config.error_presenter)(self, err.into());
        self.response.push_error(err);
    }

    /// Report an error for parent `index` of the current batch.
    ///
    /// Errors without an explicit path are reported at the current path with
    /// the parent's list index replaced by `index`.
    pub fn add_batch_error(&self, index: usize, err: impl Into<Error>) {
        let mut err = err.into();
        if err.path.is_none() {
            err.path = Some(self.batch_path_with_index(index));
        }
        self.add_error(err);
    }

    pub fn errors(&self) -> Vec<ServerError> {
        self.response.errors()
    }

    /// Whether an error was already reported at exactly the current path.
    pub fn has_field_error(&self) -> bool {
        self.response.has_error_at(&self.path())
    }

    /// Errors reported at the current path or below it.
    pub fn field_errors(&self) -> Vec<ServerError> {
        self.response.errors_below(&self.path())
    }

    pub fn set_extension(&self, name: impl Into<String>, value: ConstValue) {
        self.response.set_extension(name, value);
    }

    pub fn extension(&self, name: &str) -> Option<ConstValue> {
        self.response.extension(name)
    }

    pub fn is_cancelled(&self) -> bool {
        self.operation.token.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.operation.token
    }

    pub fn worker_limit(&self) -> Option<usize> {
        self.operation.config.worker_limit
    }

    pub(crate) fn recover(&self, payload: Box<dyn Any + Send>) -> Error {
        (self.operation.config.recover)(self, payload)
    }

    pub(crate) fn response(&self) -> &Arc<ResponseContext> {
        &self.response
    }

    pub(crate) fn deferred(&self) -> &DeferredSender {
        &self.operation.deferred
    }

    /// Collect the fields of `selection_set` that apply to an object
    /// satisfying `satisfies`. An empty `satisfies` accepts every fragment.
    pub fn collect_fields(
        &self,
        selection_set: &SelectionSet,
        satisfies: &[&str],
    ) -> Arc<[CollectedField]> {
        let operation = &*self.operation;
        operation.collector.get_or_collect(selection_set, satisfies, || {
            collector::collect_fields(
                &operation.document,
                &operation.variables,
                selection_set,
                satisfies,
            )
        })
    }

    /// Make `group` the batch of parents for objects of `type_name` below this
    /// context. Groups attached further up stay visible.
    pub fn with_batch_parents(&self, type_name: &str, group: BatchParentGroup) -> Self {
        let mut groups = self.batch.as_deref().cloned().unwrap_or_default();
        groups.insert(type_name.to_string(), Arc::new(group));
        Self {
            batch: Some(Arc::new(groups)),
            ..self.clone()
        }
    }

    pub fn batch_parent_group(&self, type_name: &str) -> Option<Arc<BatchParentGroup>> {
        self.batch
            .as_ref()
            .and_then(|groups| groups.get(type_name))
            .cloned()
    }

    /// The list index of the parent object of the current field.
    pub fn batch_parent_index(&self) -> Option<usize> {
        let parent = self.path.as_ref()?.parent()?;
        match parent.segment() {
            Segment::Index(idx) => Some(*idx),
            Segment::Field(_) => None,
        }
    }

    /// The current path with the parent's list index replaced by `index`.
    pub fn batch_path_with_index(&self, index: usize) -> Vec<PathSegment> {
        let mut path = self.path();
        if self.batch_parent_index().is_some() {
            let len = path.len();
            path[len - 2] = PathSegment::Index(index);
        }
        path
    }
}

#[cfg(test)]
impl Context {
    pub(crate) fn for_test(query: &str, config: ExecutorConfig, token: CancellationToken) -> Self {
        let document = match Document::parse(query) {
            Ok(document) => Arc::new(document),
            Err(err) => panic!("invalid test query: {}", err),
        };
        let (deferred, _) = crate::deferred::channel();
        Self::new(OperationContext {
            document,
            variables: Default::default(),
            collector: Default::default(),
            config: Arc::new(config),
            token,
            deferred,
        })
    }
}
