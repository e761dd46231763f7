//! Pushed Authorization Requests (RFC 9126)

use crate::error::CoreError;
use crate::services::authorization::AuthorizeRequest;
use authrim_kv::TtlStore;
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

pub const REQUEST_URI_PREFIX: &str = "urn:ietf:params:oauth:request_uri:";

#[derive(Debug, Clone, Serialize)]
pub struct ParResponse {
    pub request_uri: String,
    pub expires_in: i64,
}

pub struct ParService {
    kv: Arc<dyn TtlStore>,
    request_ttl: Duration,
}

impl ParService {
    pub fn new(kv: Arc<dyn TtlStore>, request_ttl: Duration) -> Self {
        Self { kv, request_ttl }
    }

    /// Stash the pushed parameters; the client references them at
    /// /authorize via `request_uri`.
    pub async fn push(
        &self,
        client_id: &str,
        mut request: AuthorizeRequest,
    ) -> Result<ParResponse, CoreError> {
        // The stored request is bound to the pushing client.
        request.client_id = Some(client_id.to_string());
        request.request_uri = None;

        let id = Uuid::new_v4().to_string();
        self.kv
            .put(
                &par_key(&id),
                serde_json::to_string(&request)?,
                self.request_ttl.to_std().unwrap_or_default(),
            )
            .await?;

        Ok(ParResponse {
            request_uri: format!("{}{}", REQUEST_URI_PREFIX, id),
            expires_in: self.request_ttl.num_seconds(),
        })
    }

    /// Resolve and consume a request_uri. Single-use.
    pub async fn consume(
        &self,
        request_uri: &str,
        client_id: &str,
    ) -> Result<AuthorizeRequest, CoreError> {
        let id = request_uri
            .strip_prefix(REQUEST_URI_PREFIX)
            .ok_or_else(|| CoreError::invalid_request("malformed request_uri"))?;

        let key = par_key(id);
        let raw = self
            .kv
            .get(&key)
            .await?
            .ok_or_else(|| CoreError::invalid_request("unknown or expired request_uri"))?;
        self.kv.delete(&key).await?;

        let request: AuthorizeRequest = serde_json::from_str(&raw)?;
        if request.client_id.as_deref() != Some(client_id) {
            return Err(CoreError::invalid_request(
                "request_uri was pushed by a different client",
            ));
        }
        Ok(request)
    }
}

fn par_key(id: &str) -> String {
    format!("par:{}", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use authrim_kv::MemoryTtlStore;

    fn service() -> ParService {
        ParService::new(Arc::new(MemoryTtlStore::new()), Duration::seconds(90))
    }

    fn request() -> AuthorizeRequest {
        AuthorizeRequest {
            response_type: Some("code".to_string()),
            redirect_uri: Some("https://app.example/cb".to_string()),
            scope: Some("openid".to_string()),
            state: Some("s-1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn push_then_consume_roundtrip() {
        let service = service();
        let pushed = service.push("c1", request()).await.unwrap();
        assert!(pushed.request_uri.starts_with(REQUEST_URI_PREFIX));
        assert_eq!(pushed.expires_in, 90);

        let resolved = service.consume(&pushed.request_uri, "c1").await.unwrap();
        assert_eq!(resolved.client_id.as_deref(), Some("c1"));
        assert_eq!(resolved.state.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn request_uri_is_single_use() {
        let service = service();
        let pushed = service.push("c1", request()).await.unwrap();
        service.consume(&pushed.request_uri, "c1").await.unwrap();

        let replay = service.consume(&pushed.request_uri, "c1").await;
        assert!(matches!(replay, Err(CoreError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn foreign_client_cannot_consume() {
        let service = service();
        let pushed = service.push("c1", request()).await.unwrap();
        let result = service.consume(&pushed.request_uri, "c2").await;
        assert!(matches!(result, Err(CoreError::InvalidRequest { .. })));
    }
}
