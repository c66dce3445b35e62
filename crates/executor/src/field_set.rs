use std::sync::Arc;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use value::ConstValue;

use crate::collector::CollectedField;
use crate::context::Context;
use crate::scheduler::Scheduler;

pub(crate) type FieldFn = Box<dyn FnOnce(Context) -> BoxFuture<'static, ConstValue> + Send>;

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Unset,
    Value(ConstValue),
    /// Delivered later by a deferred group.
    Deferred,
}

struct Pending {
    index: usize,
    non_null: bool,
    ctx: Context,
    f: FieldFn,
}

/// The fields of one object selection and their results, in selection order.
///
/// Every slot has a single writer: inline values are set while collecting,
/// concurrent fields are written back by `dispatch` once their units finish.
pub struct FieldSet {
    fields: Arc<[CollectedField]>,
    values: Vec<Slot>,
    invalids: usize,
    pending: Vec<Pending>,
}

impl FieldSet {
    pub fn new(fields: Arc<[CollectedField]>) -> Self {
        let values = vec![Slot::Unset; fields.len()];
        Self {
            fields,
            values,
            invalids: 0,
            pending: Vec::new(),
        }
    }

    pub fn fields(&self) -> &Arc<[CollectedField]> {
        &self.fields
    }

    /// Store a value computed inline.
    pub fn set(&mut self, index: usize, value: ConstValue, non_null: bool) {
        if non_null && value == ConstValue::Null {
            self.invalids += 1;
        }
        self.values[index] = Slot::Value(value);
    }

    /// Register a field that is resolved by `dispatch`.
    pub(crate) fn concurrently(&mut self, index: usize, non_null: bool, ctx: Context, f: FieldFn) {
        self.pending.push(Pending {
            index,
            non_null,
            ctx,
            f,
        });
    }

    pub fn mark_deferred(&mut self, index: usize) {
        self.values[index] = Slot::Deferred;
    }

    pub fn is_deferred(&self, index: usize) -> bool {
        self.values[index] == Slot::Deferred
    }

    /// Resolve every registered field and wait for all of them.
    pub async fn dispatch(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let (targets, units): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .map(|pending| ((pending.index, pending.non_null), (pending.ctx, pending.f)))
            .unzip();
        let outcomes = Scheduler::unbounded().run(units).await;
        self.store(targets, outcomes.into_iter().map(|outcome| outcome.into_option()));
    }

    /// Resolve every registered field one after another in selection order.
    pub async fn dispatch_serial(&mut self) {
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|pending| pending.index);
        let (targets, units): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .map(|pending| ((pending.index, pending.non_null), (pending.ctx, pending.f)))
            .unzip();
        let outcomes = Scheduler::unbounded().run_serial(units).await;
        self.store(targets, outcomes.into_iter().map(|outcome| outcome.into_option()));
    }

    fn store(
        &mut self,
        targets: Vec<(usize, bool)>,
        values: impl Iterator<Item = Option<ConstValue>>,
    ) {
        for ((index, non_null), value) in targets.into_iter().zip(values) {
            self.set(index, value.unwrap_or_default(), non_null);
        }
    }

    /// `true` when a non-null field failed, so the whole object is null.
    pub fn is_invalid(&self) -> bool {
        self.invalids > 0
    }

    pub fn marshal(self) -> ConstValue {
        if self.is_invalid() {
            return ConstValue::Null;
        }

        let mut object = IndexMap::with_capacity(self.fields.len());
        for (field, value) in self.fields.iter().zip(self.values) {
            match value {
                Slot::Value(value) => {
                    object.insert(field.alias.clone(), value);
                }
                Slot::Unset => {
                    object.insert(field.alias.clone(), ConstValue::Null);
                }
                Slot::Deferred => {}
            }
        }
        ConstValue::Object(object)
    }
}
