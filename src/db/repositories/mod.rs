//! Repository pattern implementations
//!
//! Data access objects for the principals table.

pub mod principal;

pub use principal::{InMemoryPrincipalStore, PrincipalRepository, PrincipalStore, PrincipalStoreError};
