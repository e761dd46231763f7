//! Authorization-server services

pub mod authorization;
pub mod claims_policy;
pub mod client_registry;
pub mod device;
pub mod grants;
pub mod introspection;
pub mod par;
pub mod revocation;
pub mod token_engine;

pub use authorization::{AuthorizeError, AuthorizeRequest, AuthorizeService};
pub use client_registry::ClientRegistry;
pub use device::DeviceAuthorizationService;
pub use grants::{TokenGrantService, TokenResponse};
pub use introspection::{IntrospectionResponse, IntrospectionService, TokenTypeHint};
pub use par::ParService;
pub use revocation::RevocationService;
pub use token_engine::{AccessTokenClaims, DpopRequestContext, TokenEngine, TokenEngineConfig};
