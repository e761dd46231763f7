//! Device authorization grant (RFC 8628)

use crate::error::CoreError;
use crate::models::device::{normalize_user_code, DeviceCodeRecord, DeviceCodeStatus};
use crate::models::Client;
use authrim_kv::TtlStore;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::{Rng, RngCore};
use serde::Serialize;
use std::sync::Arc;

// No vowels, so generated codes never spell anything.
const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";
const USER_CODE_LEN: usize = 8;
const POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    /// Display form, e.g. `BCDF-GHJK`.
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: i64,
    pub interval: u64,
}

pub struct DeviceAuthorizationService {
    kv: Arc<dyn TtlStore>,
    verification_uri: String,
    code_ttl: Duration,
}

impl DeviceAuthorizationService {
    pub fn new(kv: Arc<dyn TtlStore>, issuer_url: &str, code_ttl: Duration) -> Self {
        Self {
            kv,
            verification_uri: format!("{}/device", issuer_url.trim_end_matches('/')),
            code_ttl,
        }
    }

    /// Start a device flow: mint device_code + user_code pair.
    pub async fn begin(
        &self,
        client: &Client,
        scope: &str,
    ) -> Result<DeviceAuthorizationResponse, CoreError> {
        if !scope.is_empty() && !client.allows_scope(scope) {
            return Err(CoreError::invalid_scope(
                "requested scope exceeds the client whitelist",
            ));
        }

        let device_code = generate_device_code();
        let display_code = generate_user_code();
        let normalized = normalize_user_code(&display_code);
        let now = Utc::now();

        let record = DeviceCodeRecord {
            device_code: device_code.clone(),
            user_code: normalized.clone(),
            client_id: client.client_id.clone(),
            scope: scope.to_string(),
            status: DeviceCodeStatus::Pending,
            interval: POLL_INTERVAL_SECS,
            created_at: now,
            expires_at: now + self.code_ttl,
        };

        let ttl = self.code_ttl.to_std().unwrap_or_default();
        self.kv
            .put(&device_key(&device_code), serde_json::to_string(&record)?, ttl)
            .await?;
        self.kv
            .put(&user_code_key(&normalized), device_code.clone(), ttl)
            .await?;

        Ok(DeviceAuthorizationResponse {
            device_code,
            user_code: display_code,
            verification_uri: self.verification_uri.clone(),
            expires_in: self.code_ttl.num_seconds(),
            interval: POLL_INTERVAL_SECS,
        })
    }

    /// Approve a pending device by its user code (any input formatting).
    pub async fn approve(&self, user_code: &str, user_id: &str) -> Result<(), CoreError> {
        self.resolve_and_update(user_code, DeviceCodeStatus::Approved {
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn deny(&self, user_code: &str) -> Result<(), CoreError> {
        self.resolve_and_update(user_code, DeviceCodeStatus::Denied)
            .await
    }

    async fn resolve_and_update(
        &self,
        user_code: &str,
        status: DeviceCodeStatus,
    ) -> Result<(), CoreError> {
        let normalized = normalize_user_code(user_code);
        let device_code = self
            .kv
            .get(&user_code_key(&normalized))
            .await?
            .ok_or_else(|| CoreError::NotFound {
                resource: "device authorization".to_string(),
            })?;

        let mut record = self.load(&device_code).await?.ok_or_else(|| CoreError::NotFound {
            resource: "device authorization".to_string(),
        })?;

        if record.is_expired(Utc::now()) {
            return Err(CoreError::ExpiredToken);
        }
        if record.status != DeviceCodeStatus::Pending {
            return Err(CoreError::invalid_grant("device authorization already decided"));
        }

        record.status = status;
        let ttl = (record.expires_at - Utc::now()).to_std().unwrap_or_default();
        self.kv
            .put(&device_key(&device_code), serde_json::to_string(&record)?, ttl)
            .await?;
        Ok(())
    }

    /// Poll from the token endpoint. Approved records are consumed.
    pub async fn exchange(
        &self,
        client: &Client,
        device_code: &str,
    ) -> Result<DeviceCodeRecord, CoreError> {
        let record = self
            .load(device_code)
            .await?
            .ok_or_else(|| CoreError::ExpiredToken)?;

        if record.client_id != client.client_id {
            return Err(CoreError::invalid_grant(
                "device code was not issued to this client",
            ));
        }
        if record.is_expired(Utc::now()) {
            return Err(CoreError::ExpiredToken);
        }

        match record.status {
            DeviceCodeStatus::Pending => Err(CoreError::AuthorizationPending),
            DeviceCodeStatus::Denied => Err(CoreError::AccessDenied),
            DeviceCodeStatus::Approved { .. } => {
                self.kv.delete(&device_key(device_code)).await?;
                self.kv.delete(&user_code_key(&record.user_code)).await?;
                Ok(record)
            }
        }
    }

    async fn load(&self, device_code: &str) -> Result<Option<DeviceCodeRecord>, CoreError> {
        match self.kv.get(&device_key(device_code)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

fn device_key(device_code: &str) -> String {
    format!("device_code:{}", device_code)
}

fn user_code_key(normalized: &str) -> String {
    format!("device_user_code:{}", normalized)
}

fn generate_device_code() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn generate_user_code() -> String {
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = (0..USER_CODE_LEN)
        .map(|_| USER_CODE_ALPHABET[rng.gen_range(0..USER_CODE_ALPHABET.len())] as char)
        .collect();
    format!(
        "{}-{}",
        chars[..USER_CODE_LEN / 2].iter().collect::<String>(),
        chars[USER_CODE_LEN / 2..].iter().collect::<String>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GrantType;
    use authrim_kv::MemoryTtlStore;

    fn client() -> Client {
        Client {
            client_id: "tv-app".to_string(),
            secret_hash: None,
            redirect_uris: Vec::new(),
            grant_types: vec![GrantType::DeviceCode],
            response_types: Vec::new(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            allow_claims_without_scope: false,
            dpop_bound_access_tokens: false,
            pkce_required: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service() -> DeviceAuthorizationService {
        DeviceAuthorizationService::new(
            Arc::new(MemoryTtlStore::new()),
            "https://op.example",
            Duration::minutes(10),
        )
    }

    #[tokio::test]
    async fn pending_then_approved_flow() {
        let service = service();
        let c = client();
        let begin = service.begin(&c, "openid").await.unwrap();

        let pending = service.exchange(&c, &begin.device_code).await;
        assert!(matches!(pending, Err(CoreError::AuthorizationPending)));

        // User types the code with different formatting than displayed.
        let sloppy = begin.user_code.to_lowercase().replace('-', " ");
        service.approve(&sloppy, "u1").await.unwrap();

        let record = service.exchange(&c, &begin.device_code).await.unwrap();
        assert_eq!(
            record.status,
            DeviceCodeStatus::Approved {
                user_id: "u1".to_string()
            }
        );

        // Consumed: a second poll fails.
        let again = service.exchange(&c, &begin.device_code).await;
        assert!(matches!(again, Err(CoreError::ExpiredToken)));
    }

    #[tokio::test]
    async fn denied_device_gets_access_denied() {
        let service = service();
        let c = client();
        let begin = service.begin(&c, "openid").await.unwrap();
        service.deny(&begin.user_code).await.unwrap();

        let result = service.exchange(&c, &begin.device_code).await;
        assert!(matches!(result, Err(CoreError::AccessDenied)));
    }

    #[tokio::test]
    async fn foreign_client_cannot_poll() {
        let service = service();
        let c = client();
        let begin = service.begin(&c, "openid").await.unwrap();

        let mut other = client();
        other.client_id = "other".to_string();
        let result = service.exchange(&other, &begin.device_code).await;
        assert!(matches!(result, Err(CoreError::InvalidGrant { .. })));
    }

    #[test]
    fn display_code_has_dash_format() {
        let code = generate_user_code();
        assert_eq!(code.len(), USER_CODE_LEN + 1);
        assert_eq!(code.chars().nth(USER_CODE_LEN / 2), Some('-'));
    }
}
