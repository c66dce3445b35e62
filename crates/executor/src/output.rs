use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use indexmap::IndexMap;
use value::{ConstValue, Name, Number};

use crate::collector::CollectedField;
use crate::context::Context;
use crate::deferred::{process_deferred_group, DeferredGroup};
use crate::document::SelectionSet;
use crate::error::{Error, ExecutorError, Result};
use crate::field_set::{FieldFn, FieldSet};
use crate::scheduler::{Outcome, Scheduler};

/// A value a resolver can return.
pub trait OutputType: Send + 'static {
    /// Whether the field's type allows `null`.
    const NULLABLE: bool = false;

    /// Leaves are marshaled without spawning work for list elements.
    const IS_LEAF: bool = false;

    fn is_null(&self) -> bool {
        false
    }

    fn marshal(self, ctx: &Context, field: &CollectedField) -> BoxFuture<'static, ConstValue>;
}

/// An output value that marshals without any further resolution.
pub trait LeafType: OutputType {
    fn to_value(self) -> ConstValue;
}

macro_rules! leaf_type {
    ($($ty:ty => |$value:ident| $to_value:expr),* $(,)?) => {
        $(
            impl OutputType for $ty {
                const IS_LEAF: bool = true;

                fn marshal(self, _ctx: &Context, _field: &CollectedField) -> BoxFuture<'static, ConstValue> {
                    Box::pin(future::ready(self.to_value()))
                }
            }

            impl LeafType for $ty {
                fn to_value(self) -> ConstValue {
                    let $value = self;
                    $to_value
                }
            }
        )*
    };
}

leaf_type! {
    String => |value| ConstValue::String(value),
    &'static str => |value| ConstValue::String(value.to_string()),
    Name => |value| ConstValue::Enum(value),
    bool => |value| ConstValue::Boolean(value),
    i32 => |value| ConstValue::Number(value.into()),
    i64 => |value| ConstValue::Number(value.into()),
    u32 => |value| ConstValue::Number(value.into()),
    u64 => |value| ConstValue::Number(value.into()),
    usize => |value| ConstValue::Number((value as u64).into()),
    f64 => |value| Number::from_f64(value).map(ConstValue::Number).unwrap_or_default(),
}

impl OutputType for ConstValue {
    const NULLABLE: bool = true;
    const IS_LEAF: bool = true;

    fn is_null(&self) -> bool {
        matches!(self, ConstValue::Null)
    }

    fn marshal(self, _ctx: &Context, _field: &CollectedField) -> BoxFuture<'static, ConstValue> {
        Box::pin(future::ready(self))
    }
}

impl LeafType for ConstValue {
    fn to_value(self) -> ConstValue {
        self
    }
}

impl<T: OutputType> OutputType for Option<T> {
    const NULLABLE: bool = true;
    const IS_LEAF: bool = T::IS_LEAF;

    fn is_null(&self) -> bool {
        self.is_none()
    }

    fn marshal(self, ctx: &Context, field: &CollectedField) -> BoxFuture<'static, ConstValue> {
        match self {
            Some(value) => value.marshal(ctx, field),
            None => Box::pin(future::ready(ConstValue::Null)),
        }
    }
}

impl<T: LeafType> LeafType for Option<T> {
    fn to_value(self) -> ConstValue {
        self.map(LeafType::to_value).unwrap_or_default()
    }
}

impl<T: OutputType> OutputType for Vec<T> {
    fn marshal(self, ctx: &Context, field: &CollectedField) -> BoxFuture<'static, ConstValue> {
        let ctx = ctx.clone();
        let field = field.clone();
        Box::pin(async move { marshal_slice(&ctx, &field, self).await })
    }
}

impl<O: ObjectType + ?Sized> OutputType for Arc<O> {
    fn marshal(self, ctx: &Context, field: &CollectedField) -> BoxFuture<'static, ConstValue> {
        let ctx = ctx.clone();
        let selection_set = field.selection_set.clone();
        Box::pin(async move { marshal_object(&ctx, &selection_set, self).await })
    }
}

/// A list of objects whose fields may be resolved for all of them at once.
///
/// While the list is marshaled, its elements are available to their field
/// resolvers through [`Context::batch_parent_group`] under `type_name`.
pub struct Batched<O: ?Sized> {
    type_name: &'static str,
    parents: Vec<Arc<O>>,
}

impl<O: ObjectType + ?Sized> Batched<O> {
    pub fn new(type_name: &'static str, parents: Vec<Arc<O>>) -> Self {
        Self { type_name, parents }
    }
}

impl<O: ObjectType + ?Sized> OutputType for Batched<O> {
    fn marshal(self, ctx: &Context, field: &CollectedField) -> BoxFuture<'static, ConstValue> {
        let group = crate::batch::BatchParentGroup::new(self.parents.clone());
        let ctx = ctx.with_batch_parents(self.type_name, group);
        self.parents.marshal(&ctx, field)
    }
}

/// An object type: resolves its own fields by name.
pub trait ObjectType: Send + Sync + 'static {
    fn type_name(&self) -> &'static str;

    /// Interfaces and unions this object belongs to, used to match fragment
    /// type conditions.
    fn implements(&self) -> &'static [&'static str] {
        &[]
    }

    fn resolve_field(self: Arc<Self>, ctx: &Context, field: &CollectedField) -> Resolution;
}

/// How a field gets its value.
pub struct Resolution(ResolutionKind);

enum ResolutionKind {
    Ready {
        value: Result<ConstValue>,
        non_null: bool,
    },
    Resolve {
        non_null: bool,
        f: Box<dyn FnOnce(Context, CollectedField) -> BoxFuture<'static, ConstValue> + Send>,
    },
    Unknown,
}

impl Resolution {
    /// A value that is already known; written without scheduling any work.
    pub fn value<T: LeafType>(value: T) -> Self {
        Self::try_value(Ok(value))
    }

    pub fn try_value<T: LeafType>(value: Result<T>) -> Self {
        Resolution(ResolutionKind::Ready {
            value: value.map(LeafType::to_value),
            non_null: !T::NULLABLE,
        })
    }

    /// A value produced by a resolver; the field is resolved concurrently
    /// with its siblings.
    pub fn resolve<T, F, Fut>(f: F) -> Self
    where
        T: OutputType,
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Resolution(ResolutionKind::Resolve {
            non_null: !T::NULLABLE,
            f: Box::new(
                move |ctx: Context, field: CollectedField| -> BoxFuture<'static, ConstValue> {
                    Box::pin(resolve_field(ctx, field, f))
                },
            ),
        })
    }

    /// The object has no such field.
    pub fn unknown() -> Self {
        Resolution(ResolutionKind::Unknown)
    }
}

/// Run a field resolver and marshal its result at the field's context.
///
/// A `null` result for a non-null field is reported unless an error was
/// already reported at this path. A non-null value that marshals to `null`
/// is reported unless an error was reported at or below this path.
pub async fn resolve_field<T, F, Fut>(ctx: Context, field: CollectedField, f: F) -> ConstValue
where
    T: OutputType,
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f(ctx.clone()).await {
        Ok(value) if value.is_null() => {
            if !T::NULLABLE && !ctx.has_field_error() {
                ctx.add_error(Error::new("must not be null"));
            }
            ConstValue::Null
        }
        Ok(value) => {
            let value = value.marshal(&ctx, &field).await;
            if !T::NULLABLE && value == ConstValue::Null && ctx.field_errors().is_empty() {
                ctx.add_error(Error::new("must not be null"));
            }
            value
        }
        Err(err) => {
            ctx.add_error(err);
            ConstValue::Null
        }
    }
}

/// Marshal list elements, each at its own index.
///
/// Leaf elements are written in place. Other elements are scheduled
/// concurrently, at most `worker_limit` at a time. The whole list is `null`
/// when an element panicked, or when a non-null element is `null`.
pub async fn marshal_slice<T: OutputType>(
    ctx: &Context,
    field: &CollectedField,
    items: Vec<T>,
) -> ConstValue {
    if T::IS_LEAF {
        let mut values = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            let item_ctx = ctx.with_index(idx);
            let value = item.marshal(&item_ctx, field).await;
            if !T::NULLABLE && value == ConstValue::Null {
                if !item_ctx.has_field_error() {
                    item_ctx.add_error(Error::new("must not be null"));
                }
                return ConstValue::Null;
            }
            values.push(value);
        }
        return ConstValue::List(values);
    }

    let units = items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let field = field.clone();
            (ctx.with_index(idx), move |ctx: Context| async move {
                item.marshal(&ctx, &field).await
            })
        })
        .collect();
    let outcomes = Scheduler::new(ctx.worker_limit()).run(units).await;

    let mut values = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let value = match outcome {
            Outcome::Done(value) => value,
            Outcome::Cancelled => ConstValue::Null,
            Outcome::Panicked => return ConstValue::Null,
        };
        if !T::NULLABLE && value == ConstValue::Null {
            return ConstValue::Null;
        }
        values.push(value);
    }
    ConstValue::List(values)
}

fn satisfies<O: ObjectType + ?Sized>(object: &O) -> Vec<&'static str> {
    let mut satisfies = Vec::with_capacity(object.implements().len() + 1);
    satisfies.push(object.type_name());
    satisfies.extend_from_slice(object.implements());
    satisfies
}

/// Resolve the selection of `object` and marshal it.
///
/// Fields resolved inline are written immediately, the rest are dispatched
/// together. Fields inside `@defer` fragments are grouped by label and
/// delivered later.
pub async fn marshal_object<O: ObjectType + ?Sized>(
    ctx: &Context,
    selection_set: &SelectionSet,
    object: Arc<O>,
) -> ConstValue {
    execute_object(ctx, selection_set, object, false).await
}

pub(crate) async fn execute_object<O: ObjectType + ?Sized>(
    ctx: &Context,
    selection_set: &SelectionSet,
    object: Arc<O>,
    serial: bool,
) -> ConstValue {
    let fields = ctx.collect_fields(selection_set, &satisfies(&*object));
    let mut field_set = FieldSet::new(fields.clone());
    let mut deferred: IndexMap<Option<String>, Vec<CollectedField>> = IndexMap::new();

    for (index, field) in fields.iter().enumerate() {
        if let Some(defer) = &field.defer {
            field_set.mark_deferred(index);
            deferred
                .entry(defer.label.clone())
                .or_default()
                .push(field.clone());
        }
    }
    populate(ctx, &object, &mut field_set);

    if serial {
        field_set.dispatch_serial().await;
    } else {
        field_set.dispatch().await;
    }

    for (label, fields) in deferred {
        let object = object.clone();
        process_deferred_group(DeferredGroup {
            label,
            path: ctx.path(),
            fields: fields.into(),
            populate: Box::new(move |ctx: &Context, field_set: &mut FieldSet| {
                populate(ctx, &object, field_set)
            }),
            context: ctx.clone(),
        });
    }

    field_set.marshal()
}

/// Resolve every field of `field_set` that is not deferred: inline values
/// are stored, everything else is registered for dispatch.
pub(crate) fn populate<O: ObjectType + ?Sized>(
    ctx: &Context,
    object: &Arc<O>,
    field_set: &mut FieldSet,
) {
    let type_name = object.type_name();
    let fields = field_set.fields().clone();

    for (index, field) in fields.iter().enumerate() {
        if field_set.is_deferred(index) {
            continue;
        }
        if field.name.as_str() == "__typename" {
            field_set.set(index, ConstValue::String(type_name.to_string()), true);
            continue;
        }

        let field_ctx = ctx.with_field(type_name, field, true);
        let resolution =
            panic::catch_unwind(AssertUnwindSafe(|| object.clone().resolve_field(&field_ctx, field)));
        let resolution = match resolution {
            Ok(resolution) => resolution,
            Err(payload) => {
                field_ctx.add_error(field_ctx.recover(payload));
                field_set.set(index, ConstValue::Null, false);
                continue;
            }
        };
        match resolution.0 {
            ResolutionKind::Ready { value, non_null } => {
                let value = match value {
                    Ok(ConstValue::Null) => {
                        if non_null && !field_ctx.has_field_error() {
                            field_ctx.add_error(Error::new("must not be null"));
                        }
                        ConstValue::Null
                    }
                    Ok(value) => value,
                    Err(err) => {
                        field_ctx.add_error(err);
                        ConstValue::Null
                    }
                };
                field_set.set(index, value, non_null);
            }
            ResolutionKind::Resolve { non_null, f } => {
                let field = field.clone();
                let f: FieldFn = Box::new(move |ctx: Context| f(ctx, field));
                field_set.concurrently(index, non_null, field_ctx, f);
            }
            ResolutionKind::Unknown => {
                field_ctx.add_error(ExecutorError::UnknownField {
                    object: type_name.to_string(),
                    field: field.name.clone(),
                });
                field_set.set(index, ConstValue::Null, false);
            }
        }
    }
}
