#![forbid(unsafe_code)]

mod batch;
mod collector;
mod config;
mod context;
mod deferred;
mod document;
mod entity;
mod error;
mod executor;
mod field_set;
mod output;
mod path;
mod response;
mod response_context;
mod scheduler;

pub use batch::{resolve_batch_group_result, BatchParentGroup, BatchResult};
pub use collector::{collect_fields, CollectedField, CollectorCache, Defer};
pub use config::{default_error_presenter, default_recover, ErrorPresenterFn, ExecutorConfig, RecoverFn};
pub use context::Context;
pub use deferred::DeferredResults;
pub use document::Document;
pub use entity::{Entity, EntityFinder, EntityResolver, EntityResolverBuilder};
pub use error::{BatchErrorList, EntityError, Error, ExecutorError, Result};
pub use executor::{Execution, Executor, ExecutorBuilder, FieldStream, SubscriptionType};
pub use field_set::FieldSet;
pub use output::{
    marshal_object, marshal_slice, resolve_field, Batched, LeafType, ObjectType, OutputType,
    Resolution,
};
pub use path::{FieldInfo, PathNode, Segment};
pub use response::{DeferredResult, PathSegment, Request, Response, ServerError};
pub use scheduler::{Outcome, Scheduler};

pub use tokio_util::sync::CancellationToken;
pub use value::{ConstValue, Name, Variables};
