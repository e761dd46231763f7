//! Core engines of the Authrim authorization server
//!
//! This crate contains the security-critical business logic (code
//! lifecycle, token engine, introspection, revocation, client registry)
//! independent of HTTP and database concerns.

pub mod actors;
pub mod deadline;
pub mod error;
pub mod models;
pub mod services;
pub mod stores;

pub use error::CoreError;
