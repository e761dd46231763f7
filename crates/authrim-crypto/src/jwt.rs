//! RS256 JWT signing and verification against the key manager

use crate::keys::{KeyError, SigningKeyManager};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingError(jsonwebtoken::errors::Error),
    #[error("Token validation failed: {reason}")]
    ValidationError { reason: String },
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid token format")]
    InvalidFormat,
    #[error(transparent)]
    KeyError(#[from] KeyError),
}

/// Signs and verifies compact JWS tokens using whichever key is currently
/// active in the [`SigningKeyManager`]. Verification resolves the token's
/// `kid` header, so overlap keys keep verifying after a rotation while
/// revoked keys fail.
#[derive(Clone)]
pub struct TokenSigner {
    key_manager: Arc<SigningKeyManager>,
}

impl TokenSigner {
    pub fn new(key_manager: Arc<SigningKeyManager>) -> Self {
        Self { key_manager }
    }

    pub fn key_manager(&self) -> &Arc<SigningKeyManager> {
        &self.key_manager
    }

    /// Sign claims with the active key; header carries `{alg, typ, kid}`.
    pub async fn sign<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let (kid, encoding_key) = self.key_manager.signing_key().await;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid);
        encode(&header, claims, &encoding_key).map_err(JwtError::EncodingError)
    }

    /// Verify signature, issuer, expiry, and (when given) audience, then
    /// deserialize the payload.
    pub async fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: Option<&str>,
    ) -> Result<T, JwtError> {
        let header = decode_header(token).map_err(|_| JwtError::InvalidFormat)?;
        let kid = header.kid.ok_or(JwtError::InvalidFormat)?;
        let decoding_key = self.key_manager.verification_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[expected_issuer]);
        validation.validate_nbf = true;
        match expected_audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let data = decode::<T>(token, &decoding_key, &validation).map_err(map_decode_error)?;
        Ok(data.claims)
    }

    /// Decode the payload without any verification. Used by introspection to
    /// recover the `jti`/`exp` of tokens that may already fail verification;
    /// never a substitute for [`verify`](Self::verify).
    pub fn decode_unverified<T: DeserializeOwned>(&self, token: &str) -> Result<T, JwtError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.insecure_disable_signature_validation();

        let dummy_key = DecodingKey::from_secret(b"unverified");
        let data = decode::<T>(token, &dummy_key, &validation).map_err(|_| JwtError::InvalidFormat)?;
        Ok(data.claims)
    }
}

fn map_decode_error(e: jsonwebtoken::errors::Error) -> JwtError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        _ => JwtError::ValidationError {
            reason: e.to_string(),
        },
    }
}
