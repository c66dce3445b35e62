mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::Query;
use graphweave_executor::{
    CollectedField, ConstValue, Context, EntityError, EntityResolver, Error, Executor, Name,
    ObjectType, PathSegment, Request, Resolution, Variables,
};
use serde_json::json;

struct Product {
    upc: String,
    finder: &'static str,
}

impl ObjectType for Product {
    fn type_name(&self) -> &'static str {
        "Product"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "upc" => Resolution::value(self.upc.clone()),
            "finder" => Resolution::value(self.finder),
            _ => Resolution::unknown(),
        }
    }
}

fn string_field(representation: &ConstValue, name: &str) -> String {
    match representation {
        ConstValue::Object(object) => match object.get(name) {
            Some(ConstValue::String(value)) => value.clone(),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

fn entity_resolver(many_calls: Arc<AtomicUsize>) -> EntityResolver {
    EntityResolver::build()
        .finder(
            "Product",
            "findProductByManufacturerIDAndID",
            "manufacturer { id } id",
            |_ctx: Context, representation: ConstValue| async move {
                Ok::<_, Error>(Arc::new(Product {
                    upc: string_field(&representation, "id"),
                    finder: "manufacturer",
                }))
            },
        )
        .unwrap()
        .finder(
            "Product",
            "findProductByUpc",
            "upc",
            |_ctx: Context, representation: ConstValue| async move {
                let upc = string_field(&representation, "upc");
                if upc == "missing" {
                    return Err(Error::new("no such product"));
                }
                Ok(Arc::new(Product {
                    upc,
                    finder: "upc",
                }))
            },
        )
        .unwrap()
        .many_finder(
            "Review",
            "findManyReviewByIDs",
            "id",
            move |_ctx: Context, representations: Vec<ConstValue>| {
                let many_calls = many_calls.clone();
                async move {
                    many_calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(representations
                        .iter()
                        .map(|representation| {
                            Arc::new(Product {
                                upc: string_field(representation, "id"),
                                finder: "reviews",
                            })
                        })
                        .collect::<Vec<_>>())
                }
            },
        )
        .unwrap()
        .sdl("type Product @key(fields: \"upc\") { upc: String! }")
        .finish()
}

async fn resolve(
    representations: serde_json::Value,
) -> (serde_json::Value, Vec<(String, Vec<PathSegment>)>) {
    let executor = Executor::build(Query::default())
        .entities(entity_resolver(Default::default()))
        .finish();
    let request = Request::new(
        "query($representations: [_Any!]!) { _entities(representations: $representations) { ... on Product { upc finder } } }",
    )
    .variables(Variables::from_json(json!({ "representations": representations })));
    let response = executor.execute(request).await.response;
    let errors = response
        .errors
        .into_iter()
        .map(|err| (err.message, err.path))
        .collect();
    (response.data.into_json().unwrap(), errors)
}

#[test]
fn test_finder_selection() {
    let resolver = entity_resolver(Default::default());
    let representation = ConstValue::from_json(json!({ "__typename": "Product", "upc": "top-1" })).unwrap();
    assert_eq!(
        resolver.find_finder("Product", &representation).unwrap().name(),
        "findProductByUpc"
    );

    let representation = ConstValue::from_json(json!({
        "__typename": "Product",
        "manufacturer": { "id": "m1" },
        "id": "p1",
    }))
    .unwrap();
    assert_eq!(
        resolver.find_finder("Product", &representation).unwrap().name(),
        "findProductByManufacturerIDAndID"
    );

    let representation = ConstValue::from_json(json!({ "__typename": "Product", "id": null })).unwrap();
    assert_eq!(
        resolver.find_finder("Product", &representation).err(),
        Some(EntityError::TypeNotFound("Product".to_string()))
    );
    assert_eq!(
        resolver.find_finder("Review2", &representation).err(),
        Some(EntityError::UnknownType("Review2".to_string()))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_entities() {
    let (data, errors) = resolve(json!([
        { "__typename": "Product", "upc": "top-1" },
        { "__typename": "Product", "manufacturer": { "id": "m1" }, "id": "p1" },
        { "__typename": "Product", "manufacturer": { "id": null }, "id": null },
        { "id": 1 },
        { "__typename": "Shipping", "id": 1 },
        { "__typename": "Product", "upc": "missing" },
    ]))
    .await;

    assert_eq!(
        data,
        json!({
            "_entities": [
                { "upc": "top-1", "finder": "upc" },
                { "upc": "p1", "finder": "manufacturer" },
                null,
                null,
                null,
                null,
            ]
        })
    );

    let error_at = |idx: usize| -> String {
        let path = vec![PathSegment::Field(Name::new("_entities")), PathSegment::Index(idx)];
        errors
            .iter()
            .find(|(_, err_path)| *err_path == path)
            .map(|(message, _)| message.clone())
            .unwrap_or_default()
    };
    assert_eq!(errors.len(), 4);
    assert_eq!(
        error_at(2),
        "finding resolver for Entity \"Product\": type not found for Product"
    );
    assert_eq!(error_at(3), "__typename must be an existing string");
    assert_eq!(error_at(4), "unknown type: Shipping");
    assert_eq!(
        error_at(5),
        "resolving Entity \"Product\": no such product"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_many_finder_called_once_per_group() {
    let calls = Arc::new(AtomicUsize::new(0));
    let executor = Executor::build(Query::default())
        .entities(entity_resolver(calls.clone()))
        .worker_limit(2)
        .finish();
    let representations: Vec<_> = (0..10)
        .map(|idx| json!({ "__typename": "Review", "id": format!("r{}", idx) }))
        .collect();
    let request = Request::new(
        "query($representations: [_Any!]!) { _entities(representations: $representations) { ... on Product { upc finder } } }",
    )
    .variables(Variables::from_json(json!({ "representations": representations })));

    let response = executor.execute(request).await.response;
    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let data = response.data.into_json().unwrap();
    let entities = data["_entities"].as_array().unwrap();
    assert_eq!(entities.len(), 10);
    for (idx, entity) in entities.iter().enumerate() {
        assert_eq!(entity, &json!({ "upc": format!("r{}", idx), "finder": "reviews" }));
    }
}

#[tokio::test]
async fn test_service_sdl() {
    let executor = Executor::build(Query::default())
        .entities(entity_resolver(Default::default()))
        .finish();
    let response = executor
        .execute(Request::new("{ _service { sdl } version }"))
        .await
        .response;

    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({
            "_service": { "sdl": "type Product @key(fields: \"upc\") { upc: String! }" },
            "version": "1.0",
        })
    );
}

fn vendor_resolver(
    calls: Arc<AtomicUsize>,
    paths: Arc<spin::Mutex<Vec<Vec<PathSegment>>>>,
    fail: bool,
) -> EntityResolver {
    EntityResolver::build()
        .many_finder(
            "Vendor",
            "findManyVendorByIDs",
            "id",
            move |ctx: Context, representations: Vec<ConstValue>| {
                let calls = calls.clone();
                let paths = paths.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    paths.lock().push(ctx.path());
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    if fail {
                        panic!("vendor service unavailable");
                    }
                    Ok::<_, Error>(representations
                        .iter()
                        .map(|representation| {
                            Arc::new(Product {
                                upc: string_field(representation, "id"),
                                finder: "vendors",
                            })
                        })
                        .collect::<Vec<_>>())
                }
            },
        )
        .unwrap()
        .finish()
}

fn vendor_request(count: usize) -> Request {
    let representations: Vec<_> = (0..count)
        .map(|idx| json!({ "__typename": "Vendor", "id": format!("v{}", idx) }))
        .collect();
    Request::new(
        "query($representations: [_Any!]!) { _entities(representations: $representations) { ... on Product { upc } } }",
    )
    .variables(Variables::from_json(json!({ "representations": representations })))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_many_finder_uses_entities_context() {
    let calls = Arc::new(AtomicUsize::new(0));
    let paths = Arc::new(spin::Mutex::new(Vec::new()));
    let executor = Executor::build(Query::default())
        .entities(vendor_resolver(calls.clone(), paths.clone(), false))
        .worker_limit(3)
        .finish();

    let response = executor.execute(vendor_request(6)).await.response;
    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*paths.lock(), vec![vec![PathSegment::from("_entities")]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_many_finder_panic_is_shared() {
    let calls = Arc::new(AtomicUsize::new(0));
    let executor = Executor::build(Query::default())
        .entities(vendor_resolver(calls.clone(), Default::default(), true))
        .finish();

    let response = executor.execute(vendor_request(8)).await.response;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.errors.len(), 8);
    assert!(response
        .errors
        .iter()
        .all(|err| err.message == "resolving Entity \"Vendor\": internal system error"));
    let mut paths: Vec<_> = response.errors.into_iter().map(|err| err.path).collect();
    paths.sort_by_key(|path| match path.last() {
        Some(PathSegment::Index(idx)) => *idx,
        _ => usize::MAX,
    });
    let expected: Vec<_> = (0..8)
        .map(|idx| vec![PathSegment::from("_entities"), PathSegment::Index(idx)])
        .collect();
    assert_eq!(paths, expected);
}
