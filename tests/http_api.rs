//! End-to-end HTTP behaviour over in-memory stores.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use goms::config::{
    ActionConfig, ActionFieldConfig, EventConfig, InitConfig, RelationConfig, SiteConfig, StateMachineConfig,
    TableConfig,
};
use goms::schema::{ColumnType, RelationKind};
use goms::{app_routes, boot, Backends, PerformerSet, TenantRouter};
use serde_json::{json, Value};
use tower::ServiceExt;

fn table(name: &str, columns: Value, relations: Vec<RelationConfig>) -> TableConfig {
    TableConfig {
        name: name.into(),
        columns: serde_json::from_value(columns).unwrap(),
        relations,
        unique: vec![],
    }
}

fn config() -> InitConfig {
    InitConfig {
        tables: vec![
            table(
                "customer",
                json!([{ "name": "email", "type": "email", "nullable": false }]),
                vec![],
            ),
            table(
                "order",
                json!([{ "name": "total", "type": "measurement" }]),
                vec![RelationConfig {
                    kind: RelationKind::ManyToOne,
                    target: "customer".into(),
                }],
            ),
        ],
        state_machines: vec![StateMachineConfig {
            name: "order_flow".into(),
            label: None,
            entity_type: "order".into(),
            initial_state: "new".into(),
            states: vec!["new".into(), "paid".into(), "cancelled".into()],
            events: vec![
                EventConfig {
                    name: "pay".into(),
                    label: None,
                    src: vec!["new".into()],
                    dst: "paid".into(),
                },
                EventConfig {
                    name: "cancel".into(),
                    label: None,
                    src: vec!["new".into()],
                    dst: "cancelled".into(),
                },
            ],
        }],
        actions: vec![
            ActionConfig {
                entity_type: "order".into(),
                name: "export".into(),
                label: Some("Export".into()),
                input_fields: vec![],
                performer: "__data_export".into(),
            },
            ActionConfig {
                entity_type: "customer".into(),
                name: "register".into(),
                label: None,
                input_fields: vec![ActionFieldConfig {
                    name: "email".into(),
                    type_: ColumnType::Email,
                    required: true,
                }],
                performer: "__row_create".into(),
            },
        ],
        sites: vec![SiteConfig {
            name: "shop".into(),
            hostname: "shop.example.com".into(),
        }],
        imports: vec![],
    }
}

async fn app() -> Router {
    let cfg = config();
    let booted = boot(&cfg, "public", Backends::memory(), &PerformerSet::with_builtins())
        .await
        .unwrap();
    TenantRouter::new(&cfg.sites).into_service(app_routes(booted.state))
}

async fn send(app: &Router, method: Method, uri: &str, host: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri).header(header::HOST, host);
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

const HOST: &str = "localhost";

#[tokio::test]
async fn ping_and_health() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/ping", HOST, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("pong"));
    let (status, body) = send(&app, Method::GET, "/ready", HOST, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn crud_flow_with_includes() {
    let app = app().await;
    let (status, created) = send(&app, Method::POST, "/api/customer", HOST, Some(json!({"email": "ada@example.com"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let customer_id = created["data"]["id"].clone();
    assert_eq!(customer_id, json!(1));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/order",
        HOST,
        Some(json!({"total": "12.50", "customer_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, list) = send(&app, Method::GET, "/api/order?include=customer", HOST, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["meta"]["count"], 1);
    assert_eq!(list["data"][0]["customer"]["email"], "ada@example.com");

    let (status, customers) = send(&app, Method::GET, "/api/customer/1", HOST, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(customers["data"]["email"], "ada@example.com");

    let (status, updated) = send(&app, Method::PATCH, "/api/order/1", HOST, Some(json!({"total": "13"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["total"], "13");

    let (status, _) = send(&app, Method::DELETE, "/api/order/1", HOST, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, err) = send(&app, Method::GET, "/api/order/1", HOST, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"]["code"], "not_found");
}

#[tokio::test]
async fn bad_requests_are_classified() {
    let app = app().await;
    let (status, _) = send(&app, Method::GET, "/api/ghost", HOST, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::POST, "/api/customer", HOST, Some(json!({"email": "nope"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = send(&app, Method::POST, "/api/customer", HOST, Some(json!({"phone": "1"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = send(&app, Method::GET, "/api/order/abc", HOST, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::GET, "/api/order?limit=many", HOST, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, err) = send(&app, Method::GET, "/api/order?total=abc", HOST, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["code"], "bad_request");
}

#[tokio::test]
async fn tracking_lifecycle() {
    let app = app().await;
    send(&app, Method::POST, "/api/customer", HOST, Some(json!({"email": "ada@example.com"}))).await;
    send(&app, Method::POST, "/api/order", HOST, Some(json!({"customer_id": 1}))).await;

    let (status, _) = send(&app, Method::POST, "/track/start/order_flow", HOST, Some(json!({"referenceId": 42}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, started) = send(&app, Method::POST, "/track/start/order_flow", HOST, Some(json!({"referenceId": 1}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started["data"]["current_state"], "new");
    let id = started["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::POST, "/track/start/order_flow", HOST, Some(json!({"referenceId": "1"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, paid) = send(&app, Method::POST, &format!("/track/event/order/{id}/pay"), HOST, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["data"]["current_state"], "paid");

    let (status, err) = send(&app, Method::POST, &format!("/track/event/order/{id}/cancel"), HOST, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["code"], "invalid_transition");

    let (status, _) = send(&app, Method::POST, &format!("/track/event/customer/{id}/pay"), HOST, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::POST, "/track/event/order/not-a-uuid/pay", HOST, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, current) = send(&app, Method::GET, &format!("/track/state/{id}"), HOST, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["data"]["history"].as_array().unwrap().len(), 1);
    assert_eq!(current["data"]["history"][0]["event"], "pay");
}

#[tokio::test]
async fn one_tracking_record_per_row_whatever_the_key_spelling() {
    let app = app().await;
    send(&app, Method::POST, "/api/customer", HOST, Some(json!({"email": "ada@example.com"}))).await;
    send(&app, Method::POST, "/api/order", HOST, Some(json!({"customer_id": 1}))).await;

    let (status, started) = send(&app, Method::POST, "/track/start/order_flow", HOST, Some(json!({"referenceId": "1"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started["data"]["entity_id"], "1");
    for spelling in [json!("01"), json!(1), json!("+1")] {
        let (status, _) = send(&app, Method::POST, "/track/start/order_flow", HOST, Some(json!({"referenceId": spelling}))).await;
        assert_eq!(status, StatusCode::CONFLICT, "referenceId {spelling}");
    }
}

#[tokio::test]
async fn actions_dispatch_by_type_and_name() {
    let app = app().await;
    let (status, _) = send(&app, Method::GET, "/action/order/missing", HOST, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/action/customer/register", HOST, Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let broken = Request::builder()
        .method(Method::POST)
        .uri("/action/customer/register")
        .header(header::HOST, HOST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"email": "#))
        .unwrap();
    let res = app.clone().oneshot(broken).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        Method::POST,
        "/action/customer/register",
        HOST,
        Some(json!({"email": "grace@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    send(&app, Method::POST, "/api/order", HOST, Some(json!({"total": 3}))).await;
    let (status, export) = send(&app, Method::GET, "/action/order/export", HOST, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(export["data"]["count"], 1);

    let (status, listed) = send(&app, Method::GET, "/actions", HOST, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["meta"]["count"], 2);
}

#[tokio::test]
async fn schema_exposure() {
    let app = app().await;
    let (status, model) = send(&app, Method::GET, "/jsmodel/order", HOST, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(model["data"]["state_machine"]["name"], "order_flow");
    assert_eq!(model["data"]["actions"][0]["name"], "export");
    assert!(model["data"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f["name"] == "customer_id"));

    let (status, doc) = send(&app, Method::GET, "/apiblueprint.json", HOST, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["openapi"].as_str().unwrap().starts_with("3."));
    assert!(doc["paths"]["/api/customer/{id}"].is_object());
}

#[tokio::test]
async fn site_content_is_keyed_by_host() {
    let app = app().await;
    let (status, saved) = send(
        &app,
        Method::POST,
        "/site/content",
        "shop.example.com:6336",
        Some(json!({"path": "/home", "content": "<h1>shop</h1>"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["data"]["site"], "shop");

    let (status, read) = send(&app, Method::GET, "/site/content?path=/home", "SHOP.example.com", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["data"]["content"], "<h1>shop</h1>");

    let (status, _) = send(&app, Method::GET, "/site/content?path=/home", "other.example.org", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
