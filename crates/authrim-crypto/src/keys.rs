//! Signing-key lifecycle management
//!
//! Keys move through `active -> overlap -> revoked`. Exactly one key is
//! active at a time; overlap keys still verify old tokens until their window
//! elapses; revoked keys neither sign nor verify. Emergency rotation skips
//! the overlap window entirely.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

const RSA_KEY_BITS: usize = 2048;
const MIN_EMERGENCY_REASON_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Key generation failed: {0}")]
    GenerationError(String),
    #[error("Unknown signing key: {kid}")]
    UnknownKey { kid: String },
    #[error("Signing key revoked: {kid}")]
    KeyRevoked { kid: String },
    #[error("Emergency rotation requires a reason of at least {MIN_EMERGENCY_REASON_LEN} characters")]
    InvalidReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Overlap,
    Revoked,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Overlap => write!(f, "overlap"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// Public half of a signing key as published in the JWKS document.
/// Private material never passes through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicJwk {
    pub kty: String,
    pub n: String,
    pub e: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JwksDocument {
    pub keys: Vec<PublicJwk>,
}

/// Admin-facing view of one key's lifecycle state.
#[derive(Debug, Clone, Serialize)]
pub struct KeyStatusEntry {
    pub kid: String,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub old_kid: String,
    pub new_kid: String,
    pub warning: String,
}

/// Best-effort JWKS response cache. Invalidation failures are logged and
/// never block a rotation.
pub trait JwksCacheHandle: Send + Sync {
    fn invalidate(&self) -> anyhow::Result<()>;
}

struct KeyEntry {
    kid: String,
    status: KeyStatus,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_jwk: PublicJwk,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_reason: Option<String>,
}

struct KeyTable {
    active_kid: String,
    keys: HashMap<String, KeyEntry>,
}

pub struct SigningKeyManager {
    state: RwLock<KeyTable>,
    // Serializes rotations so writers observe monotonic transitions.
    rotation_lock: Mutex<()>,
    overlap_ttl: Duration,
    jwks_cache: OnceLock<Arc<dyn JwksCacheHandle>>,
}

impl SigningKeyManager {
    /// Initialize with a freshly generated active key.
    pub async fn new(overlap_ttl: Duration) -> Result<Self, KeyError> {
        let entry = generate_key_entry().await?;
        let active_kid = entry.kid.clone();
        let mut keys = HashMap::new();
        keys.insert(active_kid.clone(), entry);

        tracing::info!(kid = %active_kid, "Initialized signing key manager");

        Ok(Self {
            state: RwLock::new(KeyTable { active_kid, keys }),
            rotation_lock: Mutex::new(()),
            overlap_ttl,
            jwks_cache: OnceLock::new(),
        })
    }

    /// Attach the JWKS response cache. May only be set once, during wiring.
    pub fn set_jwks_cache(&self, handle: Arc<dyn JwksCacheHandle>) {
        let _ = self.jwks_cache.set(handle);
    }

    pub async fn active_kid(&self) -> String {
        self.state.read().await.active_kid.clone()
    }

    /// The active key's encoding half, for minting new tokens.
    pub async fn signing_key(&self) -> (String, EncodingKey) {
        let table = self.state.read().await;
        let entry = table
            .keys
            .get(&table.active_kid)
            .expect("active kid always present in key table");
        (entry.kid.clone(), entry.encoding_key.clone())
    }

    /// Resolve a kid for verification. Overlap keys verify; revoked or
    /// unknown kids fail.
    pub async fn verification_key(&self, kid: &str) -> Result<DecodingKey, KeyError> {
        self.expire_stale_overlap().await;
        let table = self.state.read().await;
        let entry = table.keys.get(kid).ok_or_else(|| KeyError::UnknownKey {
            kid: kid.to_string(),
        })?;
        match entry.status {
            KeyStatus::Active | KeyStatus::Overlap => Ok(entry.decoding_key.clone()),
            KeyStatus::Revoked => Err(KeyError::KeyRevoked {
                kid: kid.to_string(),
            }),
        }
    }

    /// Standard rotation: the current key keeps verifying through the overlap
    /// window, then expires to revoked.
    pub async fn rotate(&self) -> Result<RotationOutcome, KeyError> {
        let _guard = self.rotation_lock.lock().await;
        let new_entry = generate_key_entry().await?;
        let new_kid = new_entry.kid.clone();
        let overlap_until = Utc::now() + self.overlap_ttl;

        let old_kid = {
            let mut table = self.state.write().await;
            let old_kid = table.active_kid.clone();
            if let Some(old) = table.keys.get_mut(&old_kid) {
                old.status = KeyStatus::Overlap;
                old.expires_at = Some(overlap_until);
            }
            table.keys.insert(new_kid.clone(), new_entry);
            table.active_kid = new_kid.clone();
            old_kid
        };

        self.invalidate_jwks_cache();
        tracing::info!(old_kid = %old_kid, new_kid = %new_kid, "Rotated signing key");

        Ok(RotationOutcome {
            warning: format!(
                "Key {} remains valid for verification until {}",
                old_kid,
                overlap_until.to_rfc3339()
            ),
            old_kid,
            new_kid,
        })
    }

    /// Emergency rotation: the current key is revoked immediately, with no
    /// overlap window. Requires a substantive reason.
    pub async fn emergency_rotate(&self, reason: &str) -> Result<RotationOutcome, KeyError> {
        if reason.trim().len() < MIN_EMERGENCY_REASON_LEN {
            return Err(KeyError::InvalidReason);
        }

        let _guard = self.rotation_lock.lock().await;
        let new_entry = generate_key_entry().await?;
        let new_kid = new_entry.kid.clone();

        let old_kid = {
            let mut table = self.state.write().await;
            let old_kid = table.active_kid.clone();
            if let Some(old) = table.keys.get_mut(&old_kid) {
                old.status = KeyStatus::Revoked;
                old.revoked_at = Some(Utc::now());
                old.revoked_reason = Some(reason.to_string());
            }
            table.keys.insert(new_kid.clone(), new_entry);
            table.active_kid = new_kid.clone();
            old_kid
        };

        self.invalidate_jwks_cache();
        tracing::warn!(old_kid = %old_kid, new_kid = %new_kid, reason = %reason, "Emergency key rotation");

        Ok(RotationOutcome {
            warning: format!(
                "Key {} revoked immediately; tokens signed by it will no longer verify",
                old_kid
            ),
            old_kid,
            new_kid,
        })
    }

    /// JWKS document: public halves of active and unexpired overlap keys.
    pub async fn jwks(&self) -> JwksDocument {
        self.expire_stale_overlap().await;
        let table = self.state.read().await;
        let mut keys: Vec<PublicJwk> = table
            .keys
            .values()
            .filter(|k| matches!(k.status, KeyStatus::Active | KeyStatus::Overlap))
            .map(|k| k.public_jwk.clone())
            .collect();
        // Active key first, then overlap keys by age.
        keys.sort_by_key(|k| {
            if k.kid == table.active_kid {
                (0, k.kid.clone())
            } else {
                (1, k.kid.clone())
            }
        });
        JwksDocument { keys }
    }

    pub async fn status(&self) -> Vec<KeyStatusEntry> {
        self.expire_stale_overlap().await;
        let table = self.state.read().await;
        let mut entries: Vec<KeyStatusEntry> = table
            .keys
            .values()
            .map(|k| KeyStatusEntry {
                kid: k.kid.clone(),
                status: k.status,
                created_at: k.created_at,
                expires_at: k.expires_at,
                revoked_at: k.revoked_at,
                revoked_reason: k.revoked_reason.clone(),
            })
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    /// Overlap keys past their window transition to revoked.
    async fn expire_stale_overlap(&self) {
        let now = Utc::now();
        let needs_sweep = {
            let table = self.state.read().await;
            table.keys.values().any(|k| {
                k.status == KeyStatus::Overlap && k.expires_at.map(|t| t <= now).unwrap_or(false)
            })
        };
        if !needs_sweep {
            return;
        }

        let mut table = self.state.write().await;
        let mut expired = Vec::new();
        for entry in table.keys.values_mut() {
            if entry.status == KeyStatus::Overlap
                && entry.expires_at.map(|t| t <= now).unwrap_or(false)
            {
                entry.status = KeyStatus::Revoked;
                entry.revoked_at = Some(now);
                entry.revoked_reason = Some("overlap window elapsed".to_string());
                expired.push(entry.kid.clone());
            }
        }
        drop(table);

        if !expired.is_empty() {
            tracing::info!(kids = ?expired, "Expired overlap keys");
            self.invalidate_jwks_cache();
        }
    }

    fn invalidate_jwks_cache(&self) {
        if let Some(cache) = self.jwks_cache.get() {
            if let Err(e) = cache.invalidate() {
                tracing::warn!(error = %e, "JWKS cache invalidation failed; continuing");
            }
        }
    }
}

async fn generate_key_entry() -> Result<KeyEntry, KeyError> {
    let private_key = tokio::task::spawn_blocking(|| {
        let mut rng = rand::rngs::OsRng;
        RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
    })
    .await
    .map_err(|e| KeyError::GenerationError(e.to_string()))?
    .map_err(|e| KeyError::GenerationError(e.to_string()))?;

    let kid = Uuid::new_v4().to_string();

    let pem = private_key
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .map_err(|e| KeyError::GenerationError(e.to_string()))?;
    let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|e| KeyError::GenerationError(e.to_string()))?;

    let n = URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be());
    let decoding_key = DecodingKey::from_rsa_components(&n, &e)
        .map_err(|e| KeyError::GenerationError(e.to_string()))?;

    let public_jwk = PublicJwk {
        kty: "RSA".to_string(),
        n,
        e,
        kid: kid.clone(),
        use_: "sig".to_string(),
        alg: "RS256".to_string(),
    };

    Ok(KeyEntry {
        kid,
        status: KeyStatus::Active,
        encoding_key,
        decoding_key,
        public_jwk,
        created_at: Utc::now(),
        expires_at: None,
        revoked_at: None,
        revoked_reason: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exactly_one_active_key_after_rotations() {
        let manager = SigningKeyManager::new(Duration::hours(24)).await.unwrap();
        manager.rotate().await.unwrap();
        manager.rotate().await.unwrap();

        let statuses = manager.status().await;
        let active: Vec<_> = statuses
            .iter()
            .filter(|e| e.status == KeyStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kid, manager.active_kid().await);
    }

    #[tokio::test]
    async fn rotation_keeps_old_key_verifiable() {
        let manager = SigningKeyManager::new(Duration::hours(24)).await.unwrap();
        let old_kid = manager.active_kid().await;
        let outcome = manager.rotate().await.unwrap();

        assert_eq!(outcome.old_kid, old_kid);
        assert_ne!(outcome.new_kid, old_kid);
        assert!(manager.verification_key(&old_kid).await.is_ok());

        let jwks = manager.jwks().await;
        let kids: Vec<_> = jwks.keys.iter().map(|k| k.kid.as_str()).collect();
        assert!(kids.contains(&old_kid.as_str()));
        assert!(kids.contains(&outcome.new_kid.as_str()));
    }

    #[tokio::test]
    async fn emergency_rotation_revokes_immediately() {
        let manager = SigningKeyManager::new(Duration::hours(24)).await.unwrap();
        let old_kid = manager.active_kid().await;

        let outcome = manager
            .emergency_rotate("key exposed in repo")
            .await
            .unwrap();
        assert_eq!(outcome.old_kid, old_kid);

        let err = manager.verification_key(&old_kid).await.unwrap_err();
        assert!(matches!(err, KeyError::KeyRevoked { .. }));

        let jwks = manager.jwks().await;
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, outcome.new_kid);
    }

    #[tokio::test]
    async fn emergency_rotation_requires_substantive_reason() {
        let manager = SigningKeyManager::new(Duration::hours(24)).await.unwrap();
        let err = manager.emergency_rotate("short").await.unwrap_err();
        assert!(matches!(err, KeyError::InvalidReason));
    }

    #[tokio::test]
    async fn overlap_expiry_revokes_key() {
        let manager = SigningKeyManager::new(Duration::seconds(0)).await.unwrap();
        let old_kid = manager.active_kid().await;
        manager.rotate().await.unwrap();

        // Overlap window of zero: the old key is already past its expiry.
        let err = manager.verification_key(&old_kid).await.unwrap_err();
        assert!(matches!(err, KeyError::KeyRevoked { .. }));

        let jwks = manager.jwks().await;
        assert_eq!(jwks.keys.len(), 1);
    }

    #[tokio::test]
    async fn jwks_never_contains_private_material() {
        let manager = SigningKeyManager::new(Duration::hours(24)).await.unwrap();
        let jwks = manager.jwks().await;
        let rendered = serde_json::to_string(&jwks).unwrap();
        assert!(!rendered.contains("\"d\""));
        assert!(!rendered.contains("PRIVATE KEY"));
        for key in &jwks.keys {
            assert_eq!(key.kty, "RSA");
            assert_eq!(key.use_, "sig");
            assert_eq!(key.alg, "RS256");
        }
    }
}
