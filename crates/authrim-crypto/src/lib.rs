//! Cryptographic primitives for the Authrim provider
//!
//! Signing-key lifecycle management, RS256 JWT operations, PKCE challenge
//! verification, DPoP proof validation, and secret hashing.

pub mod dpop;
pub mod hashing;
pub mod jwt;
pub mod keys;
pub mod pkce;

pub use dpop::{DpopError, DpopProof};
pub use hashing::{timing_safe_eq, SecretHasher};
pub use jwt::{JwtError, TokenSigner};
pub use keys::{JwksCacheHandle, KeyError, KeyStatus, PublicJwk, SigningKeyManager};
pub use pkce::CodeChallengeMethod;
