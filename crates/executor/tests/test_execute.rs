mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{object_keys, Query};
use graphweave_executor::{
    CancellationToken, CollectedField, ConstValue, Context, Error, Executor, ObjectType,
    PathSegment, Request, Resolution, ServerError,
};
use serde_json::json;

fn executor() -> Executor {
    Executor::build(Query::default()).finish()
}

fn path(segments: &[PathSegment]) -> Vec<PathSegment> {
    segments.to_vec()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fields_keep_selection_order() {
    let execution = executor()
        .execute(Request::new(
            "{ a: slow(ms: 10) b: slow(ms: 5) c: slow(ms: 60) d: slow(ms: 1) e: slow(ms: 20) }",
        ))
        .await;
    let response = execution.response;

    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(object_keys(&response.data), vec!["a", "b", "c", "d", "e"]);
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "a": 10, "b": 5, "c": 60, "d": 1, "e": 20 })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_lists() {
    let execution = executor()
        .execute(Request::new("{ numbers items(count: 100) { id name } }"))
        .await;
    let response = execution.response;
    assert!(response.is_ok(), "{:?}", response.errors);

    let data = response.data.into_json().unwrap();
    let numbers: Vec<i64> = (0..100).collect();
    assert_eq!(data["numbers"], json!(numbers));
    let items = data["items"].as_array().unwrap();
    assert_eq!(items.len(), 100);
    for (idx, item) in items.iter().enumerate() {
        assert_eq!(item, &json!({ "id": idx, "name": format!("item-{}", idx) }));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_with_worker_limit() {
    let executor = Executor::build(Query::default()).worker_limit(2).finish();
    let token = CancellationToken::new();
    let execution = tokio::time::timeout(
        Duration::from_secs(5),
        executor.execute_with(Request::new("{ items(count: 10) { stop } }"), token.clone()),
    )
    .await
    .expect("execution hung after cancellation");

    assert!(token.is_cancelled());
    let errors = execution.response.errors;
    for idx in 2..10 {
        let expected = path(&["items".into(), PathSegment::Index(idx)]);
        assert!(
            errors
                .iter()
                .any(|err| err.message == "operation cancelled" && err.path == expected),
            "missing cancellation error for item {}: {:?}",
            idx,
            errors
        );
    }
}

#[tokio::test]
async fn test_null_bubbles_to_nullable_parent() {
    let response = executor()
        .execute(Request::new("{ version parent { name child } }"))
        .await
        .response;

    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "version": "1.0", "parent": null })
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "child failed");
    assert_eq!(response.errors[0].path, path(&["parent".into(), "child".into()]));
}

#[tokio::test]
async fn test_null_bubbles_to_root() {
    let response = executor()
        .execute(Request::new("{ version requiredParent { child } }"))
        .await
        .response;

    assert_eq!(response.data, ConstValue::Null);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].path,
        path(&["requiredParent".into(), "child".into()])
    );
}

#[tokio::test]
async fn test_unknown_field() {
    let response = executor().execute(Request::new("{ version nope }")).await.response;

    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "version": "1.0", "nope": null })
    );
    assert_eq!(
        response.errors[0].message,
        "Cannot query field \"nope\" on type \"Query\"."
    );
}

#[tokio::test]
async fn test_operation_selection() {
    let query = "query A { version } query B { numbers }";
    let response = executor().execute(Request::new(query)).await.response;
    assert_eq!(response.data, ConstValue::Null);
    assert_eq!(response.errors[0].message, "Operation name required in request.");

    let response = executor()
        .execute(Request::new(query).operation("A"))
        .await
        .response;
    assert_eq!(response.data.into_json().unwrap(), json!({ "version": "1.0" }));

    let response = executor()
        .execute(Request::new(query).operation("C"))
        .await
        .response;
    assert_eq!(response.errors[0].message, "Unknown operation named \"C\".");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_field_resolved_once() {
    let query = Query::default();
    let calls = query.batch_calls.clone();
    let executor = Executor::build(query).worker_limit(8).finish();

    let response = executor
        .execute(Request::new("{ products { id price } }"))
        .await
        .response;
    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let data = response.data.into_json().unwrap();
    let products = data["products"].as_array().unwrap();
    assert_eq!(products.len(), 50);
    for (idx, product) in products.iter().enumerate() {
        assert_eq!(product, &json!({ "id": idx, "price": idx * 10 }));
    }
}

#[tokio::test]
async fn test_deferred_errors_are_isolated() {
    let mut execution = executor()
        .execute(Request::new(
            r#"{ version ... @defer(label: "extra") { failing } }"#,
        ))
        .await;

    let response = execution.response;
    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(response.has_next, Some(true));
    assert_eq!(response.data.into_json().unwrap(), json!({ "version": "1.0" }));

    let deferred = execution.deferred.next().await.unwrap();
    assert_eq!(deferred.label.as_deref(), Some("extra"));
    assert!(deferred.path.is_empty());
    assert_eq!(deferred.data.into_json().unwrap(), json!({ "failing": null }));
    assert_eq!(deferred.errors.len(), 1);
    assert_eq!(deferred.errors[0].message, "deferred failure");
    assert_eq!(deferred.errors[0].path, path(&["failing".into()]));

    assert!(execution.deferred.next().await.is_none());
}

#[tokio::test]
async fn test_defer_disabled() {
    let execution = executor()
        .execute(Request::new(
            "{ version ... @defer(if: false) { numbers } }",
        ))
        .await;

    assert_eq!(execution.response.has_next, None);
    assert_eq!(execution.deferred.pending(), 0);
    assert_eq!(
        object_keys(&execution.response.data),
        vec!["version", "numbers"]
    );
}

#[tokio::test]
async fn test_presenter_reads_errors() {
    let executor = Executor::build(Query::default())
        .error_presenter(|ctx: &Context, err: Error| ServerError {
            message: format!("{} (after {})", err.message, ctx.errors().len()),
            path: ctx.path(),
            locations: Vec::new(),
            extensions: Default::default(),
        })
        .finish();

    let response = tokio::time::timeout(
        Duration::from_secs(5),
        executor.execute(Request::new("{ parent { child } requiredParent { child } }")),
    )
    .await
    .expect("error presenter deadlocked")
    .response;

    let mut messages: Vec<_> = response.errors.into_iter().map(|err| err.message).collect();
    messages.sort();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|message| message.starts_with("child failed (after ")));
}

#[tokio::test]
async fn test_panic_recovery() {
    let response = executor()
        .execute(Request::new("{ version panic }"))
        .await
        .response;

    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "version": "1.0", "panic": null })
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "internal system error");
    assert_eq!(response.errors[0].path, path(&["panic".into()]));

    let executor = Executor::build(Query::default())
        .recover(|_ctx: &Context, _payload| Error::new("recovered"))
        .finish();
    let response = executor
        .execute(Request::new("{ panic }"))
        .await
        .response;
    assert_eq!(response.errors[0].message, "recovered");
}

struct Mutation {
    log: Arc<spin::Mutex<Vec<u64>>>,
}

impl ObjectType for Mutation {
    fn type_name(&self) -> &'static str {
        "Mutation"
    }

    fn resolve_field(self: Arc<Self>, _ctx: &Context, field: &CollectedField) -> Resolution {
        match field.name.as_str() {
            "push" => Resolution::resolve(move |ctx: Context| async move {
                let value: u64 = ctx.arg("value")?;
                tokio::time::sleep(Duration::from_millis(30 - value * 10)).await;
                self.log.lock().push(value);
                Ok::<_, Error>(self.log.lock().len())
            }),
            _ => Resolution::unknown(),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mutation_fields_run_serially() {
    let log = Arc::new(spin::Mutex::new(Vec::new()));
    let executor = Executor::build(Query::default())
        .mutation(Mutation { log: log.clone() })
        .finish();

    let response = executor
        .execute(Request::new(
            "mutation { a: push(value: 0) b: push(value: 1) c: push(value: 2) }",
        ))
        .await
        .response;

    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(*log.lock(), vec![0, 1, 2]);
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "a": 1, "b": 2, "c": 3 })
    );
}

#[tokio::test]
async fn test_mutation_not_configured() {
    let response = executor()
        .execute(Request::new("mutation { push(value: 1) }"))
        .await
        .response;
    assert_eq!(
        response.errors[0].message,
        "Schema is not configured for mutation operations."
    );
}

#[tokio::test]
async fn test_sync_resolver_panic_is_recovered() {
    let response = executor()
        .execute(Request::new("{ version boom }"))
        .await
        .response;

    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "version": "1.0", "boom": null })
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "internal system error");
    assert_eq!(response.errors[0].path, path(&["boom".into()]));

    let response = executor()
        .execute(Request::new("{ parent { name boom } }"))
        .await
        .response;

    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "parent": { "name": "parent", "boom": null } })
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].path, path(&["parent".into(), "boom".into()]));
}

#[tokio::test]
async fn test_unrepresentable_value_is_reported() {
    let response = executor()
        .execute(Request::new("{ version nan }"))
        .await
        .response;
    assert_eq!(response.data, ConstValue::Null);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "must not be null");
    assert_eq!(response.errors[0].path, path(&["nan".into()]));

    let response = executor()
        .execute(Request::new("{ version nans }"))
        .await
        .response;
    assert_eq!(response.data, ConstValue::Null);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "must not be null");
    assert_eq!(
        response.errors[0].path,
        path(&["nans".into(), PathSegment::Index(1)])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_element_panic_nulls_list() {
    let response = executor()
        .execute(Request::new("{ version flaky }"))
        .await
        .response;

    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "version": "1.0", "flaky": null })
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "internal system error");
    assert_eq!(
        response.errors[0].path,
        path(&["flaky".into(), PathSegment::Index(2)])
    );
}

#[tokio::test]
async fn test_deferred_non_null_failure_nulls_group() {
    let mut execution = executor()
        .execute(Request::new(
            "{ version ... @defer { requiredParent { child } } }",
        ))
        .await;

    let response = execution.response;
    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(response.data.into_json().unwrap(), json!({ "version": "1.0" }));

    let deferred = execution.deferred.next().await.unwrap();
    assert_eq!(deferred.label, None);
    assert_eq!(deferred.data, ConstValue::Null);
    assert_eq!(deferred.errors.len(), 1);
    assert_eq!(deferred.errors[0].message, "child failed");
    assert_eq!(
        deferred.errors[0].path,
        path(&["requiredParent".into(), "child".into()])
    );
    assert!(execution.deferred.next().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_defer_inside_list_elements() {
    let mut execution = executor()
        .execute(Request::new(
            r#"{ items(count: 3) { id ... @defer(label: "names") { name } } }"#,
        ))
        .await;

    let response = execution.response;
    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(response.has_next, Some(true));
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "items": [{ "id": 0 }, { "id": 1 }, { "id": 2 }] })
    );

    let mut results = Vec::new();
    while let Some(deferred) = execution.deferred.next().await {
        results.push(deferred);
    }
    results.sort_by_key(|deferred| match deferred.path.last() {
        Some(PathSegment::Index(idx)) => *idx,
        _ => usize::MAX,
    });

    assert_eq!(results.len(), 3);
    for (idx, deferred) in results.into_iter().enumerate() {
        assert_eq!(deferred.label.as_deref(), Some("names"));
        assert_eq!(deferred.path, path(&["items".into(), PathSegment::Index(idx)]));
        assert!(deferred.errors.is_empty());
        assert_eq!(
            deferred.data.into_json().unwrap(),
            json!({ "name": format!("item-{}", idx) })
        );
    }
}
