//! Client registry: lookup, credential verification, request validation

use crate::error::CoreError;
use crate::models::{Client, GrantType};
use crate::stores::ClientStore;
use authrim_crypto::{CodeChallengeMethod, SecretHasher};
use chrono::Utc;
use std::sync::Arc;

pub struct ClientRegistry {
    store: Arc<dyn ClientStore>,
    hasher: SecretHasher,
}

impl ClientRegistry {
    pub fn new(store: Arc<dyn ClientStore>) -> Self {
        Self {
            store,
            hasher: SecretHasher::new(),
        }
    }

    /// client_id syntax check, applied before any lookup.
    pub fn valid_client_id_format(client_id: &str) -> bool {
        !client_id.is_empty()
            && client_id.len() <= 128
            && client_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    pub async fn get(&self, client_id: &str) -> Result<Option<Client>, CoreError> {
        if !Self::valid_client_id_format(client_id) {
            return Ok(None);
        }
        self.store.get(client_id).await
    }

    /// Authenticate a client from its credentials. Every failure collapses
    /// to `invalid_client` so callers cannot probe registration state.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<Client, CoreError> {
        if !Self::valid_client_id_format(client_id) {
            return Err(CoreError::InvalidClient);
        }
        let client = self
            .store
            .get(client_id)
            .await?
            .ok_or(CoreError::InvalidClient)?;

        match (&client.secret_hash, client_secret) {
            (Some(hash), Some(secret)) => {
                let verified = self
                    .hasher
                    .verify_secret(secret, hash)
                    .map_err(|_| CoreError::InvalidClient)?;
                if !verified {
                    return Err(CoreError::InvalidClient);
                }
            }
            (Some(_), None) => return Err(CoreError::InvalidClient),
            // Public client: no secret registered, none expected.
            (None, _) => {}
        }
        Ok(client)
    }

    /// Register a client, hashing any plaintext secret at rest.
    pub async fn register(
        &self,
        mut client: Client,
        plaintext_secret: Option<&str>,
    ) -> Result<Client, CoreError> {
        if let Some(secret) = plaintext_secret {
            let hash = self
                .hasher
                .hash_secret(secret)
                .map_err(|e| CoreError::Internal(e.to_string()))?;
            client.secret_hash = Some(hash);
        }
        client.created_at = Utc::now();
        client.updated_at = client.created_at;
        self.store.insert(client.clone()).await?;
        Ok(client)
    }

    pub async fn update(&self, mut client: Client) -> Result<Client, CoreError> {
        client.updated_at = Utc::now();
        self.store.update(client.clone()).await?;
        Ok(client)
    }

    pub async fn delete(&self, client_id: &str) -> Result<(), CoreError> {
        self.store.delete(client_id).await
    }

    pub async fn all(&self) -> Result<Vec<Client>, CoreError> {
        self.store.all().await
    }

    /// PKCE requirements for an authorization request against this client.
    /// When the client mandates PKCE, the challenge must be present and the
    /// method must be S256 (plain is rejected).
    pub fn check_pkce(
        client: &Client,
        code_challenge: Option<&str>,
        method: Option<CodeChallengeMethod>,
    ) -> Result<(), CoreError> {
        if client.pkce_required {
            if code_challenge.is_none() {
                return Err(CoreError::invalid_request(
                    "code_challenge is required for this client",
                ));
            }
            if method != Some(CodeChallengeMethod::S256) {
                return Err(CoreError::invalid_request(
                    "code_challenge_method must be S256",
                ));
            }
        }
        Ok(())
    }

    pub fn check_grant(client: &Client, grant: GrantType) -> Result<(), CoreError> {
        if !client.allows_grant(grant) {
            return Err(CoreError::UnsupportedGrantType);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryClientStore;

    fn base_client(client_id: &str) -> Client {
        Client {
            client_id: client_id.to_string(),
            secret_hash: None,
            redirect_uris: vec!["https://app.example/cb".to_string()],
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            response_types: vec!["code".to_string()],
            scopes: vec!["openid".to_string(), "profile".to_string(), "email".to_string()],
            allow_claims_without_scope: false,
            dpop_bound_access_tokens: false,
            pkce_required: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn registry_with(client: Client, secret: Option<&str>) -> ClientRegistry {
        let registry = ClientRegistry::new(Arc::new(InMemoryClientStore::new()));
        registry.register(client, secret).await.unwrap();
        registry
    }

    #[tokio::test]
    async fn confidential_client_requires_correct_secret() {
        let registry = registry_with(base_client("c1"), Some("top-secret")).await;

        assert!(registry.authenticate("c1", Some("top-secret")).await.is_ok());
        assert!(matches!(
            registry.authenticate("c1", Some("wrong")).await,
            Err(CoreError::InvalidClient)
        ));
        assert!(matches!(
            registry.authenticate("c1", None).await,
            Err(CoreError::InvalidClient)
        ));
    }

    #[tokio::test]
    async fn unknown_and_malformed_client_ids_collapse_to_invalid_client() {
        let registry = registry_with(base_client("c1"), None).await;
        assert!(matches!(
            registry.authenticate("nope", None).await,
            Err(CoreError::InvalidClient)
        ));
        assert!(matches!(
            registry.authenticate("bad id!", None).await,
            Err(CoreError::InvalidClient)
        ));
    }

    #[test]
    fn pkce_required_rejects_plain() {
        let mut client = base_client("c1");
        client.pkce_required = true;

        assert!(ClientRegistry::check_pkce(&client, None, None).is_err());
        assert!(ClientRegistry::check_pkce(
            &client,
            Some("challenge"),
            Some(CodeChallengeMethod::Plain)
        )
        .is_err());
        assert!(ClientRegistry::check_pkce(
            &client,
            Some("challenge"),
            Some(CodeChallengeMethod::S256)
        )
        .is_ok());
    }
}
