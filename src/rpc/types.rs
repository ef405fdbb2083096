//! Procedure output types.

use serde::{Deserialize, Serialize};

/// A post as returned by the `posts` procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
}
