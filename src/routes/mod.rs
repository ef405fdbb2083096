//! Client routes and their loaders.
//!
//! - [`loader`]: RouteLoader trait and the `/posts` loader
//! - [`table`]: RouteTable, path → loader registry

pub mod loader;
pub mod table;

use crate::rpc::utils::ApiUtils;
use loader::PostsRoute;
use table::RouteTable;

/// The application's route table.
pub fn app_routes(api: &ApiUtils) -> RouteTable {
    let mut table = RouteTable::new();
    table.register(PostsRoute::PATH, PostsRoute::new(api.clone()));
    table
}
