use std::sync::Arc;
use std::time::Duration;

use futures_util::stream;
use graphweave_executor::{
    resolve_batch_group_result, BatchResult, Batched, CollectedField, ConstValue, Context,
    EntityResolver, Error, Executor, FieldStream, ObjectType, Resolution, Result,
    SubscriptionType,
};
use tokio::sync::RwLock;

use crate::config::Config;

const SDL: &str = r#"
type Query {
  products(first: Int): [Product!]!
  product(upc: String!): Product
}

type Mutation {
  setPrice(upc: String!, price: Int!): Product
}

type Subscription {
  priceChanges(count: Int!): Int!
}

type Product @key(fields: "manufacturer { id } id") @key(fields: "upc") {
  id: ID!
  upc: String!
  name: String!
  price: Int!
  manufacturer: Manufacturer!
}

type Manufacturer @key(fields: "id") {
  id: ID!
  name: String!
}
"#;

#[derive(Debug, Clone)]
struct ProductData {
    id: String,
    upc: String,
    name: String,
    manufacturer: String,
}

/// The demo product catalogue served by the command line driver.
pub struct Catalogue {
    products: Vec<ProductData>,
    prices: RwLock<Vec<i64>>,
}

impl Catalogue {
    pub fn new(size: usize) -> Self {
        let products = (0..size)
            .map(|idx| ProductData {
                id: format!("p{}", idx),
                upc: format!("top-{}", idx),
                name: format!("Product {}", idx),
                manufacturer: format!("m{}", idx % 3),
            })
            .collect();
        let prices = (0..size).map(|idx| 100 + (idx as i64 * 37) % 900).collect();
        Self {
            products,
            prices: RwLock::new(prices),
        }
    }

    fn find(&self, predicate: impl Fn(&ProductData) -> bool) -> Option<usize> {
        self.products.iter().position(predicate)
    }

    fn product(self: &Arc<Self>, idx: usize) -> Arc<Product> {
        Arc::new(Product {
            catalogue: self.clone(),
            idx,
        })
    }
}

pub fn executor(config: &Config) -> Result<Executor, anyhow::Error> {
    let catalogue = Arc::new(Catalogue::new(config.catalogue_size));

    let by_key = catalogue.clone();
    let by_upc = catalogue.clone();
    let entities = EntityResolver::build()
        .finder(
            "Product",
            "findProductByManufacturerIDAndID",
            "manufacturer { id } id",
            move |_ctx: Context, representation: ConstValue| {
                let catalogue = by_key.clone();
                async move {
                    let id = string_at(&representation, &["id"]);
                    let manufacturer = string_at(&representation, &["manufacturer", "id"]);
                    let idx = catalogue
                        .find(|product| product.id == id && product.manufacturer == manufacturer)
                        .ok_or_else(|| format!("product {} not found", id))?;
                    Ok::<_, Error>(catalogue.product(idx))
                }
            },
        )?
        .finder(
            "Product",
            "findProductByUpc",
            "upc",
            move |_ctx: Context, representation: ConstValue| {
                let catalogue = by_upc.clone();
                async move {
                    let upc = string_at(&representation, &["upc"]);
                    let idx = catalogue
                        .find(|product| product.upc == upc)
                        .ok_or_else(|| format!("product {} not found", upc))?;
                    Ok::<_, Error>(catalogue.product(idx))
                }
            },
        )?
        .many_finder(
            "Manufacturer",
            "findManyManufacturerByIDs",
            "id",
            |_ctx: Context, representations: Vec<ConstValue>| async move {
                Ok::<_, Error>(
                    representations
                        .iter()
                        .map(|representation| {
                            Arc::new(Manufacturer {
                                id: string_at(representation, &["id"]),
                            })
                        })
                        .collect::<Vec<_>>(),
                )
            },
        )?
        .sdl(SDL.trim())
        .finish();

    let mut builder = Executor::build(Query {
        catalogue: catalogue.clone(),
    })
    .mutation(Mutation {
        catalogue: catalogue.clone(),
    })
    .subscription(Subscription { catalogue })
    .entities(entities);
    if let Some(limit) = config.worker_limit {
        builder = builder.worker_limit(limit);
    }
    Ok(builder.finish())
}

fn string_at(value: &ConstValue, path: &[&str]) -> String {
    let mut current = value;
    for name in path {
        match current {
            ConstValue::Object(object) => match object.get(*name) {
                Some(value) => current = value,
                None => return String::new(),
            },
            _ => return String::new(),
        }
    }
    match current {
        ConstValue::String(value) => value.clone(),
        _ => String::new(),
    }
}

struct Query {
    catalogue: Arc<Catalogue>,
}

impl ObjectType for Query {
    fn type_name(&self) -> &'static str {
        "Query"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "products" => Resolution::resolve(move |ctx: Context| async move {
                let first: Option<usize> = ctx.arg("first")?;
                let len = self.catalogue.products.len();
                let products = (0..first.unwrap_or(len).min(len))
                    .map(|idx| self.catalogue.product(idx))
                    .collect();
                Ok::<_, Error>(Batched::new("Product", products))
            }),
            "product" => Resolution::resolve(move |ctx: Context| async move {
                let upc: String = ctx.arg("upc")?;
                let product = self
                    .catalogue
                    .find(|product| product.upc == upc)
                    .map(|idx| self.catalogue.product(idx));
                Ok::<_, Error>(product)
            }),
            _ => Resolution::unknown(),
        }
    }
}

struct Mutation {
    catalogue: Arc<Catalogue>,
}

impl ObjectType for Mutation {
    fn type_name(&self) -> &'static str {
        "Mutation"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "setPrice" => Resolution::resolve(move |ctx: Context| async move {
                let upc: String = ctx.arg("upc")?;
                let price: i64 = ctx.arg("price")?;
                let product = match self.catalogue.find(|product| product.upc == upc) {
                    Some(idx) => {
                        self.catalogue.prices.write().await[idx] = price;
                        tracing::info!(upc = %upc, price, "price updated");
                        Some(self.catalogue.product(idx))
                    }
                    None => None,
                };
                Ok::<_, Error>(product)
            }),
            _ => Resolution::unknown(),
        }
    }
}

struct Subscription {
    catalogue: Arc<Catalogue>,
}

impl SubscriptionType for Subscription {
    fn subscribe(&self, ctx: &Context, field: &CollectedField) -> Result<FieldStream> {
        match field.name.as_str() {
            "priceChanges" => {
                let count: usize = ctx.arg("count")?;
                let catalogue = self.catalogue.clone();
                let events = stream::unfold(0, move |idx| {
                    let catalogue = catalogue.clone();
                    async move {
                        if idx >= count || catalogue.products.is_empty() {
                            return None;
                        }
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        let product = idx % catalogue.products.len();
                        let price = catalogue.prices.read().await[product];
                        Some((Ok::<_, Error>(price), idx + 1))
                    }
                });
                Ok(FieldStream::new(events))
            }
            _ => Err(Error::new(format!(
                "Cannot query field \"{}\" on type \"Subscription\".",
                field.name
            ))),
        }
    }
}

struct Product {
    catalogue: Arc<Catalogue>,
    idx: usize,
}

impl Product {
    fn data(&self) -> &ProductData {
        &self.catalogue.products[self.idx]
    }
}

impl ObjectType for Product {
    fn type_name(&self) -> &'static str {
        "Product"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "id" => Resolution::value(self.data().id.clone()),
            "upc" => Resolution::value(self.data().upc.clone()),
            "name" => Resolution::value(self.data().name.clone()),
            "price" => Resolution::resolve(move |_| async move {
                Ok::<_, Error>(self.catalogue.prices.read().await[self.idx])
            }),
            "manufacturer" => Resolution::resolve(move |ctx: Context| async move {
                let manufacturer = match ctx.batch_parent_group("Product") {
                    Some(group) => {
                        let result = group
                            .field_result(&ctx, "manufacturer", || async {
                                let ids: Vec<String> = group
                                    .parents::<Arc<Product>>()
                                    .unwrap_or_default()
                                    .iter()
                                    .map(|product| product.data().manufacturer.clone())
                                    .collect();
                                tracing::debug!(parents = group.len(), "load manufacturers");
                                Ok::<_, Error>(BatchResult::new(ids))
                            })
                            .await?;
                        resolve_batch_group_result(&ctx, "manufacturer", group.len(), &result)
                    }
                    None => Some(self.data().manufacturer.clone()),
                };
                Ok::<_, Error>(manufacturer.map(|id| Arc::new(Manufacturer { id })))
            }),
            _ => Resolution::unknown(),
        }
    }
}

struct Manufacturer {
    id: String,
}

impl ObjectType for Manufacturer {
    fn type_name(&self) -> &'static str {
        "Manufacturer"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "id" => Resolution::value(self.id.clone()),
            "name" => Resolution::value(format!("Manufacturer {}", self.id)),
            _ => Resolution::unknown(),
        }
    }
}
