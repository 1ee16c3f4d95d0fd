//! Error types
//!
//! Every pipeline stage reports failures through [`GatewayError`]; the
//! response rendering picks the status code from the variant.

pub mod types;

pub use types::{AuthFailure, ErrorBody, GatewayError};
