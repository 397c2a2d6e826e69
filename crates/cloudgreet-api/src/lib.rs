//! CloudGreet API - Admin REST API
//!
//! This crate exposes the outreach, prospecting, AI and integration
//! settings endpoints behind tenant-scoped API keys.

#![recursion_limit = "256"]
pub mod auth;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;

pub use auth::AppState;
pub use error::{ApiError, ApiResult};
pub use openapi::create_openapi_routes;
pub use routes::create_router;
