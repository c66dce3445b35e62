use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use spin::Mutex;
use tokio::sync::OnceCell;

use crate::context::Context;
use crate::error::{BatchErrorList, Error, Result};

type Memo = Arc<OnceCell<Result<Arc<dyn Any + Send + Sync>>>>;

/// A group of parent objects whose fields are resolved together.
///
/// Each field key is computed at most once per group; concurrent callers for
/// the same key wait for the first computation and share its result. A
/// computation that panics is memoized as the recovered error.
pub struct BatchParentGroup {
    parents: Box<dyn Any + Send + Sync>,
    len: usize,
    fields: Mutex<HashMap<String, Memo>>,
}

impl BatchParentGroup {
    pub fn new<P: Send + Sync + 'static>(parents: Vec<P>) -> Self {
        Self {
            len: parents.len(),
            parents: Box::new(parents),
            fields: Default::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The parents of this group, if they are of type `P`.
    pub fn parents<P: 'static>(&self) -> Option<&[P]> {
        self.parents
            .downcast_ref::<Vec<P>>()
            .map(|parents| parents.as_slice())
    }

    /// Return the memoized result for `key`, running `resolve` if no caller
    /// has computed it yet.
    pub async fn field_result<T, F, Fut>(
        &self,
        ctx: &Context,
        key: &str,
        resolve: F,
    ) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let memo = self
            .fields
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone();
        let result = memo
            .get_or_init(|| async move {
                tracing::debug!(key, parents = self.len, "resolve batch field");
                match AssertUnwindSafe(async move { resolve().await })
                    .catch_unwind()
                    .await
                {
                    Ok(value) => Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>),
                    Err(payload) => Err(ctx.recover(payload)),
                }
            })
            .await
            .clone();
        result?
            .downcast::<T>()
            .map_err(|_| Error::new(format!("batch field {} was resolved with another type", key)))
    }
}

/// The values a batch resolver produced for its parents.
#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    pub values: Vec<T>,
    /// Per-parent errors; must have one slot per parent when present.
    pub errors: Option<BatchErrorList>,
}

impl<T> BatchResult<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self {
            values,
            errors: None,
        }
    }

    pub fn with_errors(values: Vec<T>, errors: BatchErrorList) -> Self {
        Self {
            values,
            errors: Some(errors),
        }
    }
}

/// Pick the value for the current parent out of a batch result.
///
/// Failures are reported at the current field with the parent's index and
/// yield `None`.
pub fn resolve_batch_group_result<T: Clone>(
    ctx: &Context,
    resolver: &str,
    parents: usize,
    result: &Result<BatchResult<T>>,
) -> Option<T> {
    let index = match ctx.batch_parent_index() {
        Some(index) if index < parents => index,
        Some(index) => {
            ctx.add_error(format!(
                "batch resolver {} could not resolve parent index {}",
                resolver, index
            ));
            return None;
        }
        None => {
            ctx.add_error(format!(
                "batch resolver {} could not resolve parent index",
                resolver
            ));
            return None;
        }
    };

    let result = match result {
        Ok(result) => result,
        Err(err) => {
            ctx.add_batch_error(index, err.clone());
            return None;
        }
    };

    if let Some(errors) = &result.errors {
        if errors.len() != parents {
            ctx.add_batch_error(
                index,
                format!(
                    "batch resolver {} returned {} errors for {} parents (index {})",
                    resolver,
                    errors.len(),
                    parents,
                    index
                ),
            );
            return None;
        }
        if let Some(err) = errors.get(index) {
            ctx.add_batch_error(index, err.clone());
            return None;
        }
    }

    if result.values.len() != parents {
        ctx.add_batch_error(
            index,
            format!(
                "index {}: batch resolver {} returned {} results for {} parents",
                index,
                resolver,
                result.values.len(),
                parents
            ),
        );
        return None;
    }
    Some(result.values[index].clone())
}
