use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, Stream};
use futures_util::{FutureExt, StreamExt};
use indexmap::IndexMap;
use parser::types::OperationType;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use value::ConstValue;

use crate::collector::CollectedField;
use crate::config::ExecutorConfig;
use crate::context::{Context, OperationContext};
use crate::deferred::{self, DeferredResults, DeferredSender};
use crate::document::{Document, SelectionSet};
use crate::entity::{EntityResolver, FederatedQuery};
use crate::error::{Error, ExecutorError, Result};
use crate::output::{execute_object, resolve_field, ObjectType, OutputType};
use crate::response::{Request, Response, ServerError};

type EventFn = Box<dyn FnOnce(Context, CollectedField) -> BoxFuture<'static, ConstValue> + Send>;

/// The events of one subscription field.
pub struct FieldStream {
    events: BoxStream<'static, EventFn>,
    non_null: bool,
}

impl FieldStream {
    pub fn new<T, S>(stream: S) -> Self
    where
        T: OutputType,
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        let events = stream
            .map(|item| -> EventFn {
                Box::new(move |ctx: Context, field: CollectedField| {
                    Box::pin(resolve_field(ctx, field, move |_| async move { item }))
                })
            })
            .boxed();
        FieldStream {
            events,
            non_null: !T::NULLABLE,
        }
    }
}

/// The root subscription type.
pub trait SubscriptionType: Send + Sync + 'static {
    fn type_name(&self) -> &'static str {
        "Subscription"
    }

    fn subscribe(&self, ctx: &Context, field: &CollectedField) -> Result<FieldStream>;
}

/// The primary response of an operation and the receiver of its deferred
/// results.
pub struct Execution {
    pub response: Response,
    pub deferred: DeferredResults,
}

struct Prepared {
    ctx: Context,
    ty: OperationType,
    selection_set: SelectionSet,
}

/// Query plan executor
#[derive(Clone)]
pub struct Executor {
    query: Arc<dyn ObjectType>,
    mutation: Option<Arc<dyn ObjectType>>,
    subscription: Option<Arc<dyn SubscriptionType>>,
    config: Arc<ExecutorConfig>,
}

pub struct ExecutorBuilder {
    query: Arc<dyn ObjectType>,
    mutation: Option<Arc<dyn ObjectType>>,
    subscription: Option<Arc<dyn SubscriptionType>>,
    entities: Option<EntityResolver>,
    config: ExecutorConfig,
}

impl ExecutorBuilder {
    pub fn mutation(self, mutation: impl ObjectType) -> Self {
        Self {
            mutation: Some(Arc::new(mutation)),
            ..self
        }
    }

    pub fn subscription(self, subscription: impl SubscriptionType) -> Self {
        Self {
            subscription: Some(Arc::new(subscription)),
            ..self
        }
    }

    /// Serve `_entities` and `_service` on the query root.
    pub fn entities(self, entities: EntityResolver) -> Self {
        Self {
            entities: Some(entities),
            ..self
        }
    }

    pub fn worker_limit(mut self, limit: usize) -> Self {
        self.config.worker_limit = Some(limit);
        self
    }

    pub fn recover(
        mut self,
        recover: impl Fn(&Context, Box<dyn Any + Send>) -> Error + Send + Sync + 'static,
    ) -> Self {
        self.config.recover = Arc::new(recover);
        self
    }

    pub fn error_presenter(
        mut self,
        presenter: impl Fn(&Context, Error) -> ServerError + Send + Sync + 'static,
    ) -> Self {
        self.config.error_presenter = Arc::new(presenter);
        self
    }

    pub fn finish(self) -> Executor {
        let query = match self.entities {
            Some(entities) => Arc::new(FederatedQuery {
                query: self.query,
                entities,
            }) as Arc<dyn ObjectType>,
            None => self.query,
        };
        Executor {
            query,
            mutation: self.mutation,
            subscription: self.subscription,
            config: Arc::new(self.config),
        }
    }
}

impl Executor {
    pub fn build(query: impl ObjectType) -> ExecutorBuilder {
        ExecutorBuilder {
            query: Arc::new(query),
            mutation: None,
            subscription: None,
            entities: None,
            config: Default::default(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a query or mutation and return the results.
    pub async fn execute(&self, request: Request) -> Execution {
        self.execute_with(request, CancellationToken::new()).await
    }

    /// Like [`Executor::execute`]; no new work is started once `token` is
    /// cancelled.
    pub async fn execute_with(&self, request: Request, token: CancellationToken) -> Execution {
        let (sender, deferred) = deferred::channel();
        let span = tracing::info_span!("execute", operation = ?request.operation);

        let response = async move {
            match self.prepare(request, token, sender) {
                Ok(prepared) => self.execute_prepared(prepared).await,
                Err(err) => executor_error(err),
            }
        }
        .instrument(span)
        .await;

        let response = match deferred.pending() {
            0 => response,
            _ => Response {
                has_next: Some(true),
                ..response
            },
        };
        Execution { response, deferred }
    }

    /// Execute any operation as a stream of responses.
    ///
    /// Queries and mutations yield the primary response followed by one
    /// incremental response per deferred group. Subscriptions yield one
    /// response per event until the source ends or `token` is cancelled.
    pub fn execute_stream(
        &self,
        request: Request,
        token: CancellationToken,
    ) -> BoxStream<'static, Response> {
        let executor = self.clone();
        let span = tracing::info_span!("execute", operation = ?request.operation);

        Box::pin(async_stream::stream! {
            let (sender, mut deferred) = deferred::channel();
            match executor.prepare(request, token.clone(), sender) {
                Err(err) => {
                    yield executor_error(err);
                }
                Ok(prepared) if prepared.ty == OperationType::Subscription => {
                    tracing::debug!(parent: &span, "subscribe");
                    let mut events = executor.subscribe(prepared, token);
                    while let Some(response) = events.next().await {
                        yield response;
                    }
                }
                Ok(prepared) => {
                    let response = executor.execute_prepared(prepared).instrument(span).await;
                    let has_next = deferred.pending() > 0;
                    yield Response {
                        has_next: has_next.then_some(true),
                        ..response
                    };
                    while let Some(result) = deferred.next().await {
                        let has_next = deferred.pending() > 0;
                        yield result.into_response(has_next);
                    }
                }
            }
        })
    }

    fn prepare(
        &self,
        request: Request,
        token: CancellationToken,
        sender: DeferredSender,
    ) -> Result<Prepared, ExecutorError> {
        let document = Arc::new(Document::parse(&request.query)?);
        let operation = document.operation(request.operation.as_deref())?;
        let ty = operation.ty;
        let selection_set = operation.selection_set.clone();
        let variables = operation.variables(request.variables);

        let ctx = Context::new(OperationContext {
            document: document.clone(),
            variables,
            collector: Default::default(),
            config: self.config.clone(),
            token,
            deferred: sender,
        });
        Ok(Prepared {
            ctx,
            ty,
            selection_set,
        })
    }

    async fn execute_prepared(&self, prepared: Prepared) -> Response {
        let Prepared {
            ctx,
            ty,
            selection_set,
        } = prepared;

        let data = match ty {
            OperationType::Query => {
                execute_object(&ctx, &selection_set, self.query.clone(), false).await
            }
            OperationType::Mutation => match &self.mutation {
                Some(mutation) => {
                    execute_object(&ctx, &selection_set, mutation.clone(), true).await
                }
                None => return executor_error(ExecutorError::UnsupportedOperation("mutation")),
            },
            OperationType::Subscription => {
                return executor_error(ExecutorError::SubscriptionNotStreamed)
            }
        };

        let (errors, extensions) = ctx.response().take_parts();
        Response {
            data,
            errors,
            extensions,
            ..Default::default()
        }
    }

    fn subscribe(&self, prepared: Prepared, token: CancellationToken) -> BoxStream<'static, Response> {
        let subscription = match &self.subscription {
            Some(subscription) => subscription.clone(),
            None => {
                let response = executor_error(ExecutorError::UnsupportedOperation("subscription"));
                return futures_util::stream::once(async move { response }).boxed();
            }
        };
        let Prepared {
            ctx, selection_set, ..
        } = prepared;

        let type_name = subscription.type_name();
        let fields = ctx.collect_fields(&selection_set, &[type_name]);
        let field = match &*fields {
            [field] => field.clone(),
            _ => {
                let response = executor_error(ExecutorError::InvalidSubscriptionRoot);
                return futures_util::stream::once(async move { response }).boxed();
            }
        };
        let field_ctx = ctx.with_field(type_name, &field, true);

        let FieldStream {
            mut events,
            non_null,
        } = match subscription.subscribe(&field_ctx, &field) {
            Ok(stream) => stream,
            Err(err) => {
                field_ctx.add_error(err);
                let (errors, extensions) = ctx.response().take_parts();
                let response = Response {
                    errors,
                    extensions,
                    ..Default::default()
                };
                return futures_util::stream::once(async move { response }).boxed();
            }
        };

        Box::pin(async_stream::stream! {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    event = events.next() => event,
                };
                let event = match event {
                    Some(event) => event,
                    None => break,
                };

                let event_ctx = field_ctx.with_fresh_response();
                let value = match AssertUnwindSafe(event(event_ctx.clone(), field.clone()))
                    .catch_unwind()
                    .await
                {
                    Ok(value) => value,
                    Err(payload) => {
                        event_ctx.add_error(event_ctx.recover(payload));
                        ConstValue::Null
                    }
                };

                let data = if non_null && value == ConstValue::Null {
                    ConstValue::Null
                } else {
                    let mut data = IndexMap::new();
                    data.insert(field.alias.clone(), value);
                    ConstValue::Object(data)
                };
                let (errors, extensions) = event_ctx.response().take_parts();
                yield Response {
                    data,
                    errors,
                    extensions,
                    ..Default::default()
                };
            }
        })
    }
}

fn executor_error(err: ExecutorError) -> Response {
    Response::from_errors(vec![ServerError::new(err.to_string())])
}
