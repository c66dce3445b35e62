#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use graphweave_executor::{
    resolve_batch_group_result, BatchResult, Batched, CollectedField, ConstValue, Context, Error,
    ObjectType, OutputType, Resolution,
};

#[derive(Default)]
pub struct Query {
    pub batch_calls: Arc<AtomicUsize>,
}

impl ObjectType for Query {
    fn type_name(&self) -> &'static str {
        "Query"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "version" => Resolution::value("1.0"),
            "slow" => Resolution::resolve(|ctx: Context| async move {
                let ms: u64 = ctx.arg("ms")?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, Error>(ms)
            }),
            "numbers" => Resolution::resolve(|_| async move {
                Ok((0..100).collect::<Vec<i32>>())
            }),
            "items" => Resolution::resolve(|ctx: Context| async move {
                let count: usize = ctx.arg("count")?;
                Ok::<_, Error>((0..count).map(|id| Arc::new(Item { id })).collect::<Vec<_>>())
            }),
            "parent" => Resolution::resolve(|_| async move { Ok(Some(Arc::new(Parent))) }),
            "requiredParent" => Resolution::resolve(|_| async move { Ok(Arc::new(Parent)) }),
            "failing" => Resolution::resolve(|_| async move {
                Err::<Option<i32>, _>(Error::new("deferred failure"))
            }),
            "products" => {
                let calls = self.batch_calls.clone();
                Resolution::resolve(move |_| async move {
                    let products = (0..50)
                        .map(|id| {
                            Arc::new(Product {
                                id,
                                calls: calls.clone(),
                            })
                        })
                        .collect();
                    Ok(Batched::new("Product", products))
                })
            }
            "panic" => Resolution::resolve(|_| async move {
                if true {
                    panic!("resolver exploded");
                }
                Ok(Some(0))
            }),
            "boom" => panic!("lookup table is empty"),
            "nan" => Resolution::resolve(|_| async move { Ok(f64::NAN) }),
            "nans" => Resolution::resolve(|_| async move { Ok(vec![1.0, f64::NAN]) }),
            "flaky" => Resolution::resolve(|_| async move {
                Ok(Some((0..4).map(Flaky).collect::<Vec<_>>()))
            }),
            _ => Resolution::unknown(),
        }
    }
}

pub struct Item {
    pub id: usize,
}

impl ObjectType for Item {
    fn type_name(&self) -> &'static str {
        "Item"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "id" => Resolution::value(self.id),
            "name" => Resolution::resolve(move |_| async move {
                tokio::time::sleep(Duration::from_millis(fastrand::u64(0..5))).await;
                Ok(format!("item-{}", self.id))
            }),
            "stop" => Resolution::resolve(move |ctx: Context| async move {
                if self.id == 1 {
                    ctx.cancellation_token().cancel();
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Some(self.id))
            }),
            _ => Resolution::unknown(),
        }
    }
}

pub struct Parent;

impl ObjectType for Parent {
    fn type_name(&self) -> &'static str {
        "Parent"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "name" => Resolution::value("parent"),
            "child" => Resolution::resolve(|_| async move {
                Err::<String, _>(Error::new("child failed"))
            }),
            "boom" => panic!("parent lookup failed"),
            _ => Resolution::unknown(),
        }
    }
}

/// A list element whose marshaling panics for id 2.
pub struct Flaky(pub usize);

impl OutputType for Flaky {
    fn marshal(self, _ctx: &Context, _field: &CollectedField) -> BoxFuture<'static, ConstValue> {
        Box::pin(async move {
            if self.0 == 2 {
                panic!("element {} exploded", self.0);
            }
            ConstValue::Number((self.0 as u64).into())
        })
    }
}

pub struct Product {
    pub id: usize,
    pub calls: Arc<AtomicUsize>,
}

impl ObjectType for Product {
    fn type_name(&self) -> &'static str {
        "Product"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "id" => Resolution::value(self.id),
            "price" => Resolution::resolve(move |ctx: Context| async move {
                let group = ctx
                    .batch_parent_group("Product")
                    .ok_or("products are not batched")?;
                let result = group
                    .field_result(&ctx, "price", || async {
                        self.calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        let values: Vec<usize> = group
                            .parents::<Arc<Product>>()
                            .unwrap_or_default()
                            .iter()
                            .map(|product| product.id * 10)
                            .collect();
                        Ok::<_, Error>(BatchResult::new(values))
                    })
                    .await?;
                Ok::<_, Error>(resolve_batch_group_result(&ctx, "price", group.len(), &result))
            }),
            _ => Resolution::unknown(),
        }
    }
}

pub fn object_keys(value: &ConstValue) -> Vec<String> {
    match value {
        ConstValue::Object(object) => object.keys().map(|key| key.to_string()).collect(),
        _ => Vec::new(),
    }
}
