use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use value::ConstValue;

use crate::collector::CollectedField;
use crate::context::Context;
use crate::field_set::FieldSet;
use crate::response::{DeferredResult, PathSegment, ServerError};

pub(crate) type PopulateFn = Box<dyn FnOnce(&Context, &mut FieldSet) + Send>;

/// Fields of one object that are delivered after the primary response.
pub(crate) struct DeferredGroup {
    pub(crate) label: Option<String>,
    pub(crate) path: Vec<PathSegment>,
    pub(crate) fields: Arc<[CollectedField]>,
    pub(crate) populate: PopulateFn,
    pub(crate) context: Context,
}

#[derive(Clone)]
pub(crate) struct DeferredSender {
    tx: mpsc::UnboundedSender<DeferredResult>,
    pending: Arc<AtomicUsize>,
}

/// Results of the deferred groups of one operation, in completion order.
pub struct DeferredResults {
    rx: mpsc::UnboundedReceiver<DeferredResult>,
    pending: Arc<AtomicUsize>,
}

pub(crate) fn channel() -> (DeferredSender, DeferredResults) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        DeferredSender {
            tx,
            pending: pending.clone(),
        },
        DeferredResults { rx, pending },
    )
}

impl DeferredResults {
    /// The number of groups launched whose result was not received yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait for the next deferred result; `None` once every launched group
    /// has been received.
    pub async fn next(&mut self) -> Option<DeferredResult> {
        if self.pending() == 0 {
            return None;
        }
        let result = self.rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(result)
    }
}

/// Launch a deferred group without waiting for it.
///
/// The group reports into its own error sink and publishes exactly one
/// result. Error paths are made relative to the group's path.
pub(crate) fn process_deferred_group(group: DeferredGroup) {
    let sender = group.context.deferred().clone();
    sender.pending.fetch_add(1, Ordering::SeqCst);
    tracing::debug!(label = ?group.label, path = ?group.path, "launch deferred group");

    tokio::spawn(async move {
        let DeferredGroup {
            label,
            path,
            fields,
            populate,
            context,
        } = group;
        let ctx = context.with_fresh_response();

        let mut field_set = FieldSet::new(fields);
        let resolved = AssertUnwindSafe(async {
            populate(&ctx, &mut field_set);
            field_set.dispatch().await;
            field_set.marshal()
        })
        .catch_unwind()
        .await;
        let data = match resolved {
            Ok(data) => data,
            Err(payload) => {
                ctx.add_error(ctx.recover(payload));
                ConstValue::Null
            }
        };

        let errors = ctx
            .errors()
            .into_iter()
            .map(|err| relative_to(err, &path))
            .collect();
        tracing::debug!(label = ?label, path = ?path, "publish deferred group");
        if sender
            .tx
            .send(DeferredResult {
                path,
                label,
                data,
                errors,
            })
            .is_err()
        {
            sender.pending.fetch_sub(1, Ordering::SeqCst);
        }
    });
}

fn relative_to(mut err: ServerError, root: &[PathSegment]) -> ServerError {
    if err.path.starts_with(root) {
        err.path.drain(..root.len());
    }
    err
}
