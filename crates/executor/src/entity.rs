use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use graphweave_schema::{KeyFields, SchemaError, ValueExt};
use indexmap::IndexMap;
use value::{ConstValue, Name};

use crate::batch::BatchParentGroup;
use crate::collector::CollectedField;
use crate::context::Context;
use crate::error::{EntityError, Error, Result};
use crate::output::{ObjectType, Resolution};
use crate::scheduler::Scheduler;

pub type Entity = Arc<dyn ObjectType>;

type FindOne =
    Arc<dyn Fn(Context, ConstValue) -> BoxFuture<'static, Result<Entity>> + Send + Sync>;
type FindMany =
    Arc<dyn Fn(Context, Vec<ConstValue>) -> BoxFuture<'static, Result<Vec<Entity>>> + Send + Sync>;

#[derive(Clone)]
enum Finder {
    One(FindOne),
    Many(FindMany),
}

/// A way to look up an entity from the key fields of its representation.
#[derive(Clone)]
pub struct EntityFinder {
    name: String,
    key_fields: KeyFields,
    paths: Vec<Vec<Name>>,
    finder: Finder,
}

impl EntityFinder {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_fields(&self) -> &KeyFields {
        &self.key_fields
    }

    /// Every key field is present, and not all of them are `null`.
    fn matches(&self, representation: &ConstValue) -> bool {
        let mut all_null = true;
        for path in &self.paths {
            match representation.get_path(path) {
                Some(ConstValue::Null) => {}
                Some(_) => all_null = false,
                None => return false,
            }
        }
        !all_null
    }
}

struct Inner {
    types: IndexMap<String, Vec<EntityFinder>>,
    sdl: Option<String>,
}

/// Resolves federation entity representations, grouped by type.
#[derive(Clone)]
pub struct EntityResolver {
    inner: Arc<Inner>,
}

pub struct EntityResolverBuilder {
    types: IndexMap<String, Vec<EntityFinder>>,
    sdl: Option<String>,
}

impl EntityResolver {
    pub fn build() -> EntityResolverBuilder {
        EntityResolverBuilder {
            types: Default::default(),
            sdl: None,
        }
    }

    pub fn sdl(&self) -> Option<&str> {
        self.inner.sdl.as_deref()
    }

    /// The first finder of `type_name`, in declaration order, whose keys are
    /// satisfied by `representation`.
    pub fn find_finder(
        &self,
        type_name: &str,
        representation: &ConstValue,
    ) -> Result<&EntityFinder, EntityError> {
        let finders = self
            .inner
            .types
            .get(type_name)
            .ok_or_else(|| EntityError::UnknownType(type_name.to_string()))?;
        finders
            .iter()
            .find(|finder| finder.matches(representation))
            .ok_or_else(|| EntityError::TypeNotFound(type_name.to_string()))
    }

    /// Resolve `representations` into entities, in input order.
    ///
    /// Representations are grouped by `__typename` and the groups resolved in
    /// parallel. Errors are reported at the representation's index; its slot
    /// is `None`.
    pub async fn resolve_entities(
        &self,
        ctx: &Context,
        representations: Vec<ConstValue>,
    ) -> Vec<Option<Entity>> {
        let len = representations.len();
        let mut groups: IndexMap<String, Vec<(usize, ConstValue)>> = IndexMap::new();
        for (idx, representation) in representations.into_iter().enumerate() {
            match representation.typename().map(str::to_string) {
                Some(type_name) => groups
                    .entry(type_name)
                    .or_default()
                    .push((idx, representation)),
                None => ctx.with_index(idx).add_error(EntityError::MissingTypename),
            }
        }
        tracing::debug!(representations = len, groups = groups.len(), "resolve entities");

        let units = groups
            .into_iter()
            .map(|(type_name, group)| {
                let resolver = self.clone();
                (ctx.clone(), move |ctx: Context| async move {
                    resolver.resolve_group(&ctx, &type_name, group).await
                })
            })
            .collect();

        let mut entities: Vec<Option<Entity>> = (0..len).map(|_| None).collect();
        for outcome in Scheduler::unbounded().run(units).await {
            for (idx, entity) in outcome.into_option().into_iter().flatten() {
                entities[idx] = entity;
            }
        }
        entities
    }

    async fn resolve_group(
        &self,
        ctx: &Context,
        type_name: &str,
        group: Vec<(usize, ConstValue)>,
    ) -> Vec<(usize, Option<Entity>)> {
        let selected: Vec<Result<EntityFinder, EntityError>> = group
            .iter()
            .map(|(_, representation)| self.find_finder(type_name, representation).cloned())
            .collect();
        let representations: Vec<ConstValue> = group
            .iter()
            .map(|(_, representation)| representation.clone())
            .collect();
        let batch = Arc::new(BatchParentGroup::new(representations));
        let mut members: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, finder) in selected.iter().enumerate() {
            if let Ok(finder) = finder {
                members.entry(finder.name.clone()).or_default().push(position);
            }
        }
        let members = Arc::new(members);
        let selected = Arc::new(selected);

        let units = group
            .iter()
            .enumerate()
            .map(|(position, (idx, representation))| {
                let type_name = type_name.to_string();
                let representation = representation.clone();
                let batch = batch.clone();
                let selected = selected.clone();
                let members = members.clone();
                let group_ctx = ctx.clone();
                (ctx.with_index(*idx), move |ctx: Context| async move {
                    let result = match &selected[position] {
                        Ok(finder) => match &finder.finder {
                            Finder::One(find) => find(ctx.clone(), representation)
                                .await
                                .map_err(|error| EntityError::Resolve {
                                    type_name: type_name.clone(),
                                    error,
                                }),
                            Finder::Many(find) => {
                                let members = members
                                    .get(&finder.name)
                                    .map(Vec::as_slice)
                                    .unwrap_or_default();
                                let many = ManyFinder {
                                    ctx: &group_ctx,
                                    type_name: &type_name,
                                    finder,
                                    find,
                                    batch: &batch,
                                    members,
                                };
                                many.resolve(position).await
                            }
                        },
                        Err(err) => Err(err.clone()),
                    };
                    match result {
                        Ok(entity) => Some(entity),
                        Err(err) => {
                            ctx.add_error(err);
                            None
                        }
                    }
                })
            })
            .collect();

        let outcomes = Scheduler::new(ctx.worker_limit()).run(units).await;
        group
            .into_iter()
            .zip(outcomes)
            .map(|((idx, _), outcome)| (idx, outcome.into_option().flatten()))
            .collect()
    }
}

/// A finder that loads every representation of a group selecting it with a
/// single call, made with the `_entities` field context.
struct ManyFinder<'a> {
    ctx: &'a Context,
    type_name: &'a str,
    finder: &'a EntityFinder,
    find: &'a FindMany,
    batch: &'a BatchParentGroup,
    /// Positions in the group of the representations selecting this finder.
    members: &'a [usize],
}

impl ManyFinder<'_> {
    async fn resolve(&self, position: usize) -> Result<Entity, EntityError> {
        let resolve_err = |error: Error| EntityError::Resolve {
            type_name: self.type_name.to_string(),
            error,
        };

        let loaded = self
            .batch
            .field_result(self.ctx, &self.finder.name, || {
                let representations: Vec<ConstValue> = self
                    .batch
                    .parents::<ConstValue>()
                    .map(|parents| {
                        self.members
                            .iter()
                            .map(|position| parents[*position].clone())
                            .collect()
                    })
                    .unwrap_or_default();
                (self.find)(self.ctx.clone(), representations)
            })
            .await
            .map_err(resolve_err)?;

        let entities = match &*loaded {
            Ok(entities) => entities,
            Err(err) => return Err(resolve_err(err.clone())),
        };
        if entities.len() != self.members.len() {
            return Err(EntityError::ResultCount {
                type_name: self.type_name.to_string(),
                results: entities.len(),
                representations: self.members.len(),
            });
        }
        let offset = self
            .members
            .iter()
            .position(|member| *member == position)
            .ok_or_else(|| EntityError::TypeNotFound(self.type_name.to_string()))?;
        Ok(entities[offset].clone())
    }
}

impl EntityResolverBuilder {
    /// Register a finder for `type_name` that resolves one representation at
    /// a time. Finders are tried in registration order.
    pub fn finder<O, F, Fut>(
        self,
        type_name: &str,
        name: &str,
        key_fields: &str,
        f: F,
    ) -> Result<Self, SchemaError>
    where
        O: ObjectType,
        F: Fn(Context, ConstValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<O>>> + Send + 'static,
    {
        let f = Arc::new(f);
        let find: FindOne = Arc::new(move |ctx: Context, representation: ConstValue| {
            let f = f.clone();
            Box::pin(async move {
                let entity: Entity = f(ctx, representation).await?;
                Ok::<_, Error>(entity)
            })
        });
        self.add(type_name, name, key_fields, Finder::One(find))
    }

    /// Register a finder that resolves every representation selecting it
    /// with one call, returning entities in the same order.
    pub fn many_finder<O, F, Fut>(
        self,
        type_name: &str,
        name: &str,
        key_fields: &str,
        f: F,
    ) -> Result<Self, SchemaError>
    where
        O: ObjectType,
        F: Fn(Context, Vec<ConstValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Arc<O>>>> + Send + 'static,
    {
        let f = Arc::new(f);
        let find: FindMany = Arc::new(move |ctx: Context, representations: Vec<ConstValue>| {
            let f = f.clone();
            Box::pin(async move {
                let entities = f(ctx, representations).await?;
                Ok::<_, Error>(entities.into_iter().map(|entity| entity as Entity).collect())
            })
        });
        self.add(type_name, name, key_fields, Finder::Many(find))
    }

    pub fn sdl(self, sdl: impl Into<String>) -> Self {
        Self {
            sdl: Some(sdl.into()),
            ..self
        }
    }

    pub fn finish(self) -> EntityResolver {
        EntityResolver {
            inner: Arc::new(Inner {
                types: self.types,
                sdl: self.sdl,
            }),
        }
    }

    fn add(
        mut self,
        type_name: &str,
        name: &str,
        key_fields: &str,
        finder: Finder,
    ) -> Result<Self, SchemaError> {
        let key_fields = KeyFields::parse(key_fields)?;
        let paths = key_fields.paths();
        self.types
            .entry(type_name.to_string())
            .or_default()
            .push(EntityFinder {
                name: name.to_string(),
                key_fields,
                paths,
                finder,
            });
        Ok(self)
    }
}

/// The query root extended with the federation fields `_entities` and
/// `_service`.
pub(crate) struct FederatedQuery {
    pub(crate) query: Arc<dyn ObjectType>,
    pub(crate) entities: EntityResolver,
}

impl ObjectType for FederatedQuery {
    fn type_name(&self) -> &'static str {
        self.query.type_name()
    }

    fn implements(&self) -> &'static [&'static str] {
        self.query.implements()
    }

    fn resolve_field(self: Arc<Self>, ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "_entities" => {
                let entities = self.entities.clone();
                Resolution::resolve(move |ctx: Context| async move {
                    let representations: Vec<ConstValue> = ctx.arg("representations")?;
                    Ok::<_, Error>(entities.resolve_entities(&ctx, representations).await)
                })
            }
            "_service" => {
                let service = Arc::new(Service {
                    sdl: self.entities.sdl().unwrap_or_default().to_string(),
                });
                Resolution::resolve(move |_| async move { Ok(service) })
            }
            _ => self.query.clone().resolve_field(ctx, field),
        }
    }
}

struct Service {
    sdl: String,
}

impl ObjectType for Service {
    fn type_name(&self) -> &'static str {
        "_Service"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "sdl" => Resolution::value(self.sdl.clone()),
            _ => Resolution::unknown(),
        }
    }
}
