//! Route table: path → loader registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::RouteError;
use crate::routes::loader::RouteLoader;

/// Object-safe view of a loader whose data is rendered as JSON.
#[async_trait]
trait JsonLoader: Send + Sync {
    async fn load_json(&self) -> Result<Value, RouteError>;
}

#[async_trait]
impl<L: RouteLoader> JsonLoader for L {
    async fn load_json(&self) -> Result<Value, RouteError> {
        let data = self.load().await?;
        serde_json::to_value(&data).map_err(|e| RouteError::Serialize(e.to_string()))
    }
}

/// Result of navigating to a route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    pub path: String,
    pub loader_data: Value,
}

/// Registered routes.
#[derive(Default, Clone)]
pub struct RouteTable {
    routes: HashMap<String, Arc<dyn JsonLoader>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `loader` for `path`, replacing any previous registration.
    pub fn register<L: RouteLoader + 'static>(&mut self, path: &str, loader: L) -> &mut Self {
        self.routes.insert(normalize(path), Arc::new(loader));
        self
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Run the loader registered for `path`.
    pub async fn navigate(&self, path: &str) -> Result<Navigation, RouteError> {
        let path = normalize(path);
        let loader = self
            .routes
            .get(&path)
            .ok_or_else(|| RouteError::NotFound(path.clone()))?;

        info!(path = %path, "Navigating");
        let loader_data = loader.load_json().await?;
        Ok(Navigation { path, loader_data })
    }
}

/// `posts/` and `/posts` both become `/posts`; the root stays `/`.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}
