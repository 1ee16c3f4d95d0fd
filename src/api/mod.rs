//! API endpoint handlers module
//!
//! Health probes and the identity-aware endpoints behind the gateway.

pub mod health;
pub mod identity;
