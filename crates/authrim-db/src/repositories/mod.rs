//! Store-trait implementations backed by sqlx

pub mod client_repository;
pub mod role_repository;
pub mod user_repository;

pub use client_repository::ClientRepository;
pub use role_repository::RoleRepository;
pub use user_repository::UserRepository;

use authrim_core::error::CoreError;

/// Shared sqlx -> core error mapping; unique violations become conflicts.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return CoreError::Conflict {
                message: db_err.message().to_string(),
            };
        }
    }
    CoreError::StorageUnavailable(err.to_string())
}
