//! Request gateway library
//!
//! An axum middleware pipeline that every request crosses before reaching a
//! handler: origin policy, fixed-window rate limiting, payload size guard,
//! security headers and identity resolution.

// Public modules
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod server;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use error::GatewayError;
pub use server::App;
