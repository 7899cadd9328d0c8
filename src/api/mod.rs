mod error;
mod rest;

pub use error::{ApiError, ApiResult};
pub use rest::RestApi;

use crate::simulation::SimNode;
use axum::Router;

/// Router serving one simulated node's API.
pub fn create_api_server(node: SimNode, token: Option<String>) -> Router {
    RestApi::new(node, token).router()
}
