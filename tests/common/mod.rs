//! Shared test fixtures.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use route_preload::error::{FetchError, FetchResult};
use route_preload::query::client::{QueryClient, QueryOptions};
use route_preload::rpc::transport::RpcTransport;
use route_preload::rpc::utils::ApiUtils;

/// In-memory transport that counts calls and answers after a delay.
///
/// The response is read when the request starts, like a server snapshotting
/// its state, so changing it mid-flight only affects later calls.
pub struct MockTransport {
    calls: AtomicUsize,
    delay: Duration,
    response: Mutex<FetchResult<Value>>,
}

impl MockTransport {
    pub fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            response: Mutex::new(Ok(response)),
        })
    }

    pub fn failing(error: FetchError) -> Arc<Self> {
        let t = Self::new(Value::Null);
        t.set_response(Err(error));
        t
    }

    pub fn set_response(&self, response: FetchResult<Value>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn query(&self, _path: &str, _input: Option<&Value>) -> FetchResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.response.lock().unwrap().clone();
        tokio::time::sleep(self.delay).await;
        response
    }
}

pub fn posts_json() -> Value {
    json!([
        {"id": "1", "title": "sunt aut facere"},
        {"id": "2", "title": "qui est esse"},
    ])
}

pub fn api_with(transport: Arc<MockTransport>, options: QueryOptions) -> ApiUtils {
    let client = QueryClient::new(options).unwrap();
    ApiUtils::new(client, transport)
}

pub fn api(transport: Arc<MockTransport>) -> ApiUtils {
    api_with(transport, QueryOptions::default())
}
