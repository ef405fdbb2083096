//! HTTP transport and server tests against a local fake RPC upstream.

mod common;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use common::posts_json;
use route_preload::config::Config;
use route_preload::error::FetchError;
use route_preload::query::client::{QueryClient, QueryOptions};
use route_preload::routes::app_routes;
use route_preload::rpc::transport::{HttpTransport, RpcTransport};
use route_preload::rpc::utils::ApiUtils;
use route_preload::server::api::{build_router, AppState};

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Fake RPC upstream; returns its address and a posts hit counter.
async fn upstream() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));

    async fn posts(State(hits): State<Arc<AtomicUsize>>) -> Json<Value> {
        hits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        Json(json!({ "result": { "data": posts_json() } }))
    }

    async fn echo(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        let input: Value = serde_json::from_str(params.get("input").map(String::as_str).unwrap_or("null"))
            .unwrap_or(Value::Null);
        Json(json!({ "result": { "data": input } }))
    }

    async fn broken() -> impl IntoResponse {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "message": "boom" } })),
        )
    }

    let app = Router::new()
        .route("/trpc/posts", get(posts))
        .route("/trpc/echo", get(echo))
        .route("/trpc/broken", get(broken))
        .with_state(hits.clone());

    (serve(app).await, hits)
}

fn transport(addr: SocketAddr) -> HttpTransport {
    HttpTransport::new(format!("http://{addr}/trpc"), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_transport_unwraps_envelope() {
    let (addr, hits) = upstream().await;
    let value = transport(addr).query("posts", None).await.unwrap();

    assert_eq!(value, posts_json());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transport_sends_input() {
    let (addr, _) = upstream().await;
    let input = json!({"id": "7"});
    let value = transport(addr).query("echo", Some(&input)).await.unwrap();

    assert_eq!(value, input);
}

#[tokio::test]
async fn test_transport_maps_server_errors() {
    let (addr, _) = upstream().await;
    let err = transport(addr).query("broken", None).await.unwrap_err();

    assert_eq!(
        err,
        FetchError::Server {
            status: 500,
            message: "boom".into()
        }
    );
}

#[tokio::test]
async fn test_transport_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = transport(addr).query("posts", None).await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
}

async fn app_server(upstream_addr: SocketAddr) -> SocketAddr {
    app_server_with(upstream_addr, Config::default()).await
}

async fn app_server_with(upstream_addr: SocketAddr, config: Config) -> SocketAddr {
    let client = QueryClient::new(QueryOptions::from(&config.cache)).unwrap();
    let api = ApiUtils::new(client, Arc::new(transport(upstream_addr)));
    let routes = app_routes(&api);
    let state = Arc::new(AppState {
        api,
        routes,
        config: Arc::new(config),
        start_time: Instant::now(),
    });
    serve(build_router(state)).await
}

#[tokio::test]
async fn test_server_route_preloads_once() {
    let (up, hits) = upstream().await;
    let addr = app_server(up).await;
    let http = reqwest::Client::new();
    let url = format!("http://{addr}/routes/posts");

    let (a, b) = tokio::join!(http.get(&url).send(), http.get(&url).send());
    let a: Value = a.unwrap().json().await.unwrap();
    let b: Value = b.unwrap().json().await.unwrap();

    assert_eq!(a, b);
    assert_eq!(a["loaderData"]["postsData"], posts_json());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let stats: Value = http
        .get(format!("http://{addr}/cache/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_entries"], 1);
    assert_eq!(stats["entries"][0]["key"], "posts");
}

#[tokio::test]
async fn test_server_invalidate_causes_refetch() {
    let (up, hits) = upstream().await;
    let addr = app_server(up).await;
    let http = reqwest::Client::new();
    let url = format!("http://{addr}/routes/posts");

    http.get(&url).send().await.unwrap();
    let resp: Value = http
        .post(format!("http://{addr}/cache/invalidate"))
        .json(&json!({"path": "posts"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["invalidated"], 1);

    http.get(&url).send().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_server_status_codes() {
    let (up, _) = upstream().await;
    let addr = app_server(up).await;
    let http = reqwest::Client::new();

    let missing = http
        .get(format!("http://{addr}/routes/nowhere"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let health: Value = http
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let routes: Value = http
        .get(format!("http://{addr}/routes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(routes["routes"], json!(["/posts"]));
}

#[tokio::test]
async fn test_server_upstream_failure_is_bad_gateway() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let addr = app_server(dead).await;
    let resp = reqwest::get(format!("http://{addr}/routes/posts")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);

    let metrics = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("query_fetch_failures_total{path=\"posts\"} 1"));
}

#[tokio::test]
async fn test_server_request_timeout() {
    async fn slow_posts() -> Json<Value> {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Json(json!({ "result": { "data": posts_json() } }))
    }
    let up = serve(Router::new().route("/trpc/posts", get(slow_posts))).await;

    let mut config = Config::default();
    config.server.request_timeout_secs = 1;
    let addr = app_server_with(up, config).await;

    let started = Instant::now();
    let resp = reqwest::get(format!("http://{addr}/routes/posts")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::REQUEST_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(3));

    // The fetch outlives the timed-out request and stays registered.
    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["in_flight"], 1);
}
