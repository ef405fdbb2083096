//! HTTP server exposing routes and cache introspection.
//!
//! - [`api`]: response types and route handlers

pub mod api;
