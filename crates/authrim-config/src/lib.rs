//! Configuration management for the Authrim provider
//!
//! Settings come from an optional `authrim.toml` file layered under
//! `AUTHRIM_*` environment variables, with validated defaults.

pub mod config;
pub mod loader;

pub use config::*;
pub use loader::*;
