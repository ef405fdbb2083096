//! Route loaders.
//!
//! A loader runs before its route is shown and produces the data the page is
//! preloaded with. Loaders do not retry or fall back: a failed fetch reaches
//! the caller unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::FetchResult;
use crate::rpc::types::Post;
use crate::rpc::utils::ApiUtils;

/// Produces preload data for a route.
#[async_trait]
pub trait RouteLoader: Send + Sync {
    /// Data handed to the route's renderer.
    type Data: Serialize + Send + Sync + 'static;

    async fn load(&self) -> FetchResult<Self::Data>;
}

/// Preload data of the `/posts` route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostsLoaderData {
    /// Shared with the query cache; never mutated after creation.
    pub posts_data: Arc<Vec<Post>>,
}

/// Loader for `/posts`: ensures the posts listing is cached and returns it.
#[derive(Clone)]
pub struct PostsRoute {
    api: ApiUtils,
}

impl PostsRoute {
    pub const PATH: &'static str = "/posts";

    pub fn new(api: ApiUtils) -> Self {
        Self { api }
    }
}

#[async_trait]
impl RouteLoader for PostsRoute {
    type Data = PostsLoaderData;

    async fn load(&self) -> FetchResult<PostsLoaderData> {
        let posts_data = self.api.posts().ensure_data().await?;
        debug!(route = Self::PATH, posts = posts_data.len(), "Loader resolved");
        Ok(PostsLoaderData { posts_data })
    }
}
