//! Relational persistence layer
//!
//! sqlx repositories implementing the store traits from `authrim-core`.
//! Long-lived records (clients, users, roles, memberships) live here;
//! ephemeral TTL state belongs to `authrim-kv`.

pub mod connection;
pub mod repositories;

pub use connection::{connect, DbError};
pub use repositories::{ClientRepository, RoleRepository, UserRepository};

/// Schema applied on first connection.
pub const SCHEMA_SQL: &str = include_str!("schema.sql");
