//! HTTP surface of the Authrim provider
//!
//! Thin axum handlers over the core services: parse, authenticate,
//! dispatch, map errors to the right envelope. No business logic here.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use auth::{AuthenticatedSession, HeaderSessionAuthenticator, SessionAuthenticator};
pub use error::{ApiError, ScimApiError};
pub use router::api_router;
pub use state::{build_state, AppState, StateStores};
