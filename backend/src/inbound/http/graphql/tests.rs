//! Tests for the GraphQL handler.

use super::*;
use crate::domain::graph::{Executor, Schema};
use crate::domain::ports::{EntityStore, EntityStoreError};
use crate::test_support::{InMemoryEntityStore, StoreMethod};
use actix_web::http::StatusCode;
use actix_web::{App, test as actix_test, web};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use std::sync::Arc;

#[fixture]
fn store() -> Arc<InMemoryEntityStore> {
    let store = InMemoryEntityStore::new();
    let ada = store.seed_user("ada");
    store.seed_post("first", "hello", ada.id());
    store.clear_calls();
    Arc::new(store)
}

fn test_app(
    store: Arc<InMemoryEntityStore>,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let schema = Arc::new(Schema::build().expect("schema builds"));
    let executor = Executor::new(schema, store as Arc<dyn EntityStore>);
    App::new()
        .app_data(web::Data::new(HttpState::new(Arc::new(executor))))
        .service(graphql)
}

async fn post_query(store: &Arc<InMemoryEntityStore>, body: Value) -> (StatusCode, Value) {
    let app = actix_test::init_service(test_app(Arc::clone(store))).await;
    let request = actix_test::TestRequest::post()
        .uri("/graphql")
        .set_json(&body)
        .to_request();
    let response = actix_test::call_service(&app, request).await;
    let status = response.status();
    let bytes = actix_test::read_body(response).await;
    let value: Value = serde_json::from_slice(&bytes).expect("json body");
    (status, value)
}

#[rstest]
#[actix_web::test]
async fn nested_queries_return_data(store: Arc<InMemoryEntityStore>) {
    let (status, body) = post_query(
        &store,
        json!({"query": "{ users { id name posts { title author { name } } } }"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"data": {"users": [{
            "id": "1",
            "name": "ada",
            "posts": [{"title": "first", "author": {"name": "ada"}}]
        }]}})
    );
    assert_eq!(store.count(StoreMethod::SelectPostsByUserIds), 1);
    assert_eq!(store.count(StoreMethod::SelectUsersByIds), 1);
}

#[rstest]
#[actix_web::test]
async fn variables_and_operation_names_are_honoured(store: Arc<InMemoryEntityStore>) {
    let (status, body) = post_query(
        &store,
        json!({
            "query": "query Users { users { id } } \
                      query One($id: Int!) { user(id: $id) { name } }",
            "operationName": "One",
            "variables": {"id": 1}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"data": {"user": {"name": "ada"}}}));
}

#[rstest]
#[case::syntax("{ users { id ", "failed to parse query")]
#[case::unknown_field("{ users { email } }", "email")]
#[case::missing_argument("{ user { id } }", "id")]
#[actix_web::test]
async fn invalid_documents_are_rejected_before_execution(
    store: Arc<InMemoryEntityStore>,
    #[case] query: &str,
    #[case] mentions: &str,
) {
    let (status, body) = post_query(&store, json!({ "query": query })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("invalid_request"));
    let message = body["message"].as_str().expect("message");
    assert!(message.contains(mentions), "`{message}` should mention `{mentions}`");
    assert!(store.calls().is_empty());
}

#[rstest]
#[actix_web::test]
async fn write_failures_are_reported_as_field_errors(store: Arc<InMemoryEntityStore>) {
    let (status, body) = post_query(
        &store,
        json!({"query": "mutation { createUser(name: \"ada\") { id } }"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"createUser": null}));
    assert_eq!(body["errors"][0]["path"], json!(["createUser"]));
    assert_eq!(
        body["errors"][0]["extensions"]["code"],
        json!("constraint_violation")
    );
}

#[rstest]
#[actix_web::test]
async fn batch_failures_null_only_the_affected_fields(store: Arc<InMemoryEntityStore>) {
    store.fail_on(
        StoreMethod::SelectPostsByUserIds,
        EntityStoreError::connection("database is locked"),
    );
    let (status, body) =
        post_query(&store, json!({"query": "{ users { name posts { id } } }"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"users": [{"name": "ada", "posts": null}]}));
    assert_eq!(body["errors"][0]["path"], json!(["users", 0, "posts"]));
}

#[rstest]
#[actix_web::test]
async fn missing_query_bodies_are_client_errors(store: Arc<InMemoryEntityStore>) {
    let app = actix_test::init_service(test_app(Arc::clone(&store))).await;
    let request = actix_test::TestRequest::post()
        .uri("/graphql")
        .set_json(json!({"variables": {}}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert!(response.status().is_client_error());
}
