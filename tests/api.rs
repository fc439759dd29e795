mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use cachepoint::application::admin::Caller;
use cachepoint::infra::http::{ApiState, build_api_router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{Harness, THEME_ROOT, harness, theme_url};

const TOKEN: &str = "test-admin-token";

fn router(h: &Harness) -> Router {
    build_api_router(ApiState {
        admin: h.services.admin.clone(),
        admin_token: Some(Arc::from(TOKEN)),
    })
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request should build")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let h = harness();
    let app = router(&h);

    let (status, body) = send(
        &app,
        request(Method::GET, "/api/v1/cache-points", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn wrong_token_is_forbidden() {
    let h = harness();
    let app = router(&h);

    let (status, body) = send(
        &app,
        request(Method::POST, "/api/v1/purge", Some("nope"), Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");
}

#[tokio::test]
async fn responses_carry_the_resolved_caller() {
    let h = harness();
    let app = router(&h);

    let rejected = app
        .clone()
        .oneshot(request(Method::POST, "/api/v1/purge", Some("nope"), Some(json!({}))))
        .await
        .expect("router should respond");
    assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        rejected.extensions().get::<Caller>(),
        Some(&Caller::anonymous())
    );

    let listed = app
        .clone()
        .oneshot(request(Method::GET, "/api/v1/cache-points", Some(TOKEN), None))
        .await
        .expect("router should respond");
    assert_eq!(listed.status(), StatusCode::OK);
    assert_eq!(
        listed.extensions().get::<Caller>(),
        Some(&Caller::privileged())
    );

    let anonymous = app
        .oneshot(request(Method::GET, "/api/v1/cache-points", None, None))
        .await
        .expect("router should respond");
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert!(anonymous.extensions().get::<Caller>().is_none());
}

#[tokio::test]
async fn register_then_list_cache_points() {
    let h = harness();
    let app = router(&h);
    let payload = json!({ "root_url": THEME_ROOT, "source_path": "themes/demo" });

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/cache-points",
            Some(TOKEN),
            Some(payload.clone()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], true);
    let id = body["cache_point"]["id"].as_i64().expect("id");

    let (status, body) = send(
        &app,
        request(Method::POST, "/api/v1/cache-points", Some(TOKEN), Some(payload)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], false);
    assert_eq!(body["cache_point"]["id"].as_i64(), Some(id));

    let (status, body) = send(
        &app,
        request(Method::GET, "/api/v1/cache-points", Some(TOKEN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let points = body.as_array().expect("array");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["root_url"], THEME_ROOT);
    assert_eq!(points[0]["status"], "active");
}

#[tokio::test]
async fn asset_listing_and_bulk_state_change() {
    let h = harness();
    let theme = h.theme_point().await;
    let urls = vec![theme_url("a.css"), theme_url("b.css"), theme_url("c.css")];
    h.services.assets.resolve_many(&urls).await.expect("seed");
    let app = router(&h);

    let (status, body) = send(
        &app,
        request(
            Method::GET,
            &format!("/api/v1/cache-points/{theme}/assets?page=1"),
            Some(TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["listing"], "results");
    let first_id = body["items"][0]["id"].as_i64().expect("entry id");
    assert_eq!(body["items"][0]["state"], "pending_upload");

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/assets/state",
            Some(TOKEN),
            Some(json!({ "ids": [first_id], "state": "disable" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], json!([first_id]));

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/assets/state",
            Some(TOKEN),
            Some(json!({ "ids": [first_id], "state": "archived" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = send(
        &app,
        request(
            Method::GET,
            "/api/v1/cache-points/999/assets",
            Some(TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn purge_runs_and_progress_goes_idle() {
    let h = harness();
    let theme = h.theme_point().await;
    let urls = vec![theme_url("a.css"), theme_url("b.css")];
    h.services.assets.resolve_many(&urls).await.expect("seed");
    let app = router(&h);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/purge",
            Some(TOKEN),
            Some(json!({ "cache_point_id": theme })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["pending"], 0);
    assert_eq!(body["percent"], 100.0);

    let (status, body) = send(
        &app,
        request(
            Method::GET,
            &format!("/api/v1/purge/progress?cache_point_id={theme}"),
            Some(TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert_eq!(body["pending"], 0);
}

#[tokio::test]
async fn background_purge_is_accepted() {
    let h = harness();
    let theme = h.theme_point().await;
    h.services
        .assets
        .resolve_many(&[theme_url("a.css")])
        .await
        .expect("seed");
    let app = router(&h);

    let (status, body) = send(
        &app,
        request(Method::POST, "/api/v1/purge-all", Some(TOKEN), Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["total"], 1);
}
