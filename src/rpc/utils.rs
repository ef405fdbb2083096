//! Typed procedure helpers over the query cache.
//!
//! [`ApiUtils`] pairs a [`QueryClient`] with an [`RpcTransport`]; each
//! [`Procedure`] it hands out knows its path and output type, so callers write
//! `api.posts().ensure_data()` and get an `Arc<Vec<Post>>` back.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{FetchError, FetchResult};
use crate::query::client::{EnsureOptions, QueryClient};
use crate::query::entry::CachedValue;
use crate::query::key::QueryKey;
use crate::rpc::transport::RpcTransport;
use crate::rpc::types::Post;

/// Path of the posts listing procedure.
pub const POSTS_PATH: &str = "posts";

/// Entry point for typed, cache-backed procedure calls.
#[derive(Clone)]
pub struct ApiUtils {
    client: QueryClient,
    transport: Arc<dyn RpcTransport>,
}

impl ApiUtils {
    pub fn new(client: QueryClient, transport: Arc<dyn RpcTransport>) -> Self {
        Self { client, transport }
    }

    /// The query cache these helpers read and write.
    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    /// Helpers for the query procedure at `path` producing `T`.
    pub fn procedure<T>(&self, path: impl Into<String>) -> Procedure<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Procedure {
            api: self.clone(),
            path: path.into(),
            _output: PhantomData,
        }
    }

    /// The posts listing.
    pub fn posts(&self) -> Procedure<Vec<Post>> {
        self.procedure(POSTS_PATH)
    }
}

/// Cache helpers for a single query procedure.
pub struct Procedure<T> {
    api: ApiUtils,
    path: String,
    _output: PhantomData<fn() -> T>,
}

impl<T> Procedure<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Cache key of this procedure called without input.
    pub fn key(&self) -> QueryKey {
        QueryKey::new(self.path.clone())
    }

    /// Cached data if fresh, otherwise one deduplicated fetch.
    pub async fn ensure_data(&self) -> FetchResult<Arc<T>> {
        let value = self
            .api
            .client
            .ensure_data(&self.key(), self.fetcher(None))
            .await?;
        self.downcast(&self.key(), value)
    }

    /// [`ensure_data`](Self::ensure_data) for a call with `input`.
    pub async fn ensure_data_with_input(&self, input: Value) -> FetchResult<Arc<T>> {
        let key = QueryKey::with_input(self.path.clone(), &input);
        let value = self
            .api
            .client
            .ensure_data(&key, self.fetcher(Some(input)))
            .await?;
        self.downcast(&key, value)
    }

    /// Like `ensure_data`, but stale data is always refetched before returning.
    pub async fn fetch(&self) -> FetchResult<Arc<T>> {
        let key = self.key();
        let value = self
            .api
            .client
            .ensure_data_with(&key, self.fetcher(None), EnsureOptions::default())
            .await?;
        self.downcast(&key, value)
    }

    /// Warm the cache; errors are logged by the client.
    pub async fn prefetch(&self) {
        self.api
            .client
            .prefetch_query(&self.key(), self.fetcher(None))
            .await;
    }

    /// Cached data without fetching.
    pub async fn get_data(&self) -> FetchResult<Option<Arc<T>>> {
        let key = self.key();
        match self.api.client.get_query_data(&key).await {
            Some(value) => self.downcast(&key, value).map(Some),
            None => Ok(None),
        }
    }

    /// Seed the cache with `data`.
    pub async fn set_data(&self, data: T) {
        self.api
            .client
            .set_query_data(&self.key(), Arc::new(data))
            .await;
    }

    /// Mark every cached call of this procedure stale, whatever its input.
    pub async fn invalidate(&self) -> usize {
        self.api.client.invalidate_prefix(&self.path).await
    }

    fn fetcher(
        &self,
        input: Option<Value>,
    ) -> impl FnOnce() -> BoxFuture<'static, FetchResult<CachedValue>> + Send + 'static {
        let transport = Arc::clone(&self.api.transport);
        let path = self.path.clone();
        move || {
            async move {
                let raw = transport.query(&path, input.as_ref()).await?;
                let data: T = serde_json::from_value(raw)?;
                Ok(Arc::new(data) as CachedValue)
            }
            .boxed()
        }
    }

    fn downcast(&self, key: &QueryKey, value: CachedValue) -> FetchResult<Arc<T>> {
        value.downcast::<T>().map_err(|_| FetchError::TypeMismatch {
            key: key.to_string(),
        })
    }
}

impl<T> Clone for Procedure<T> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            path: self.path.clone(),
            _output: PhantomData,
        }
    }
}
