//! Store contracts for long-lived state, with in-memory implementations
//!
//! The relational repositories in `authrim-db` implement these same traits
//! for production; the in-memory versions back tests and single-node runs.

use crate::error::CoreError;
use crate::models::{Client, Role, User};
use async_trait::async_trait;
use authrim_kv::TtlStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get(&self, client_id: &str) -> Result<Option<Client>, CoreError>;
    async fn insert(&self, client: Client) -> Result<(), CoreError>;
    async fn update(&self, client: Client) -> Result<(), CoreError>;
    async fn delete(&self, client_id: &str) -> Result<(), CoreError>;
    async fn all(&self) -> Result<Vec<Client>, CoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<User>, CoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, CoreError>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, CoreError>;
    /// Enforces email / preferred_username uniqueness.
    async fn insert(&self, user: User) -> Result<(), CoreError>;
    async fn update(&self, user: User) -> Result<(), CoreError>;
    async fn delete(&self, id: &str) -> Result<(), CoreError>;
    async fn all(&self) -> Result<Vec<User>, CoreError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Role>, CoreError>;
    async fn get_by_display_name(&self, name: &str) -> Result<Option<Role>, CoreError>;
    async fn insert(&self, role: Role) -> Result<(), CoreError>;
    async fn update(&self, role: Role) -> Result<(), CoreError>;
    async fn delete(&self, id: &str) -> Result<(), CoreError>;
    async fn all(&self) -> Result<Vec<Role>, CoreError>;
}

#[derive(Default)]
pub struct InMemoryClientStore {
    clients: RwLock<HashMap<String, Client>>,
}

impl InMemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn get(&self, client_id: &str) -> Result<Option<Client>, CoreError> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    async fn insert(&self, client: Client) -> Result<(), CoreError> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.client_id) {
            return Err(CoreError::Conflict {
                message: format!("client {} already registered", client.client_id),
            });
        }
        clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    async fn update(&self, client: Client) -> Result<(), CoreError> {
        let mut clients = self.clients.write().await;
        if !clients.contains_key(&client.client_id) {
            return Err(CoreError::NotFound {
                resource: format!("client {}", client.client_id),
            });
        }
        clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    async fn delete(&self, client_id: &str) -> Result<(), CoreError> {
        self.clients.write().await.remove(client_id);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Client>, CoreError> {
        Ok(self.clients.read().await.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn uniqueness_violation(users: &HashMap<String, User>, candidate: &User) -> Option<String> {
        for existing in users.values() {
            if existing.id == candidate.id {
                continue;
            }
            if let (Some(a), Some(b)) = (&existing.email, &candidate.email) {
                if a.eq_ignore_ascii_case(b) {
                    return Some(format!("email {} already in use", b));
                }
            }
            if let (Some(a), Some(b)) =
                (&existing.preferred_username, &candidate.preferred_username)
            {
                if a == b {
                    return Some(format!("userName {} already in use", b));
                }
            }
        }
        None
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get(&self, id: &str) -> Result<Option<User>, CoreError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.preferred_username.as_deref() == Some(username))
            .cloned())
    }

    async fn insert(&self, user: User) -> Result<(), CoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(CoreError::Conflict {
                message: format!("user {} already exists", user.id),
            });
        }
        if let Some(message) = Self::uniqueness_violation(&users, &user) {
            return Err(CoreError::Conflict { message });
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn update(&self, user: User) -> Result<(), CoreError> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(CoreError::NotFound {
                resource: format!("user {}", user.id),
            });
        }
        if let Some(message) = Self::uniqueness_violation(&users, &user) {
            return Err(CoreError::Conflict { message });
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.users.write().await.remove(id);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<User>, CoreError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }
}

#[derive(Default)]
pub struct InMemoryRoleStore {
    roles: RwLock<HashMap<String, Role>>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get(&self, id: &str) -> Result<Option<Role>, CoreError> {
        Ok(self.roles.read().await.get(id).cloned())
    }

    async fn get_by_display_name(&self, name: &str) -> Result<Option<Role>, CoreError> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .find(|r| r.display_name == name)
            .cloned())
    }

    async fn insert(&self, role: Role) -> Result<(), CoreError> {
        let mut roles = self.roles.write().await;
        if roles.contains_key(&role.id) {
            return Err(CoreError::Conflict {
                message: format!("role {} already exists", role.id),
            });
        }
        if roles.values().any(|r| r.display_name == role.display_name) {
            return Err(CoreError::Conflict {
                message: format!("displayName {} already in use", role.display_name),
            });
        }
        roles.insert(role.id.clone(), role);
        Ok(())
    }

    async fn update(&self, role: Role) -> Result<(), CoreError> {
        let mut roles = self.roles.write().await;
        if !roles.contains_key(&role.id) {
            return Err(CoreError::NotFound {
                resource: format!("role {}", role.id),
            });
        }
        if roles
            .values()
            .any(|r| r.id != role.id && r.display_name == role.display_name)
        {
            return Err(CoreError::Conflict {
                message: format!("displayName {} already in use", role.display_name),
            });
        }
        roles.insert(role.id.clone(), role);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.roles.write().await.remove(id);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Role>, CoreError> {
        let mut roles: Vec<Role> = self.roles.read().await.values().cloned().collect();
        roles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(roles)
    }
}

/// Revoked-token list: jtis with TTL equal to the token's remaining life.
/// Lookup answers "revoked" until the original expiry passes.
#[derive(Clone)]
pub struct RevocationList {
    kv: Arc<dyn TtlStore>,
}

impl RevocationList {
    pub fn new(kv: Arc<dyn TtlStore>) -> Self {
        Self { kv }
    }

    fn key(jti: &str) -> String {
        format!("revoked:{}", jti)
    }

    pub async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), CoreError> {
        let now = Utc::now();
        if expires_at <= now {
            return Ok(());
        }
        let ttl = (expires_at - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        self.kv
            .put(&Self::key(jti), expires_at.to_rfc3339(), ttl)
            .await?;
        Ok(())
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool, CoreError> {
        Ok(self.kv.get(&Self::key(jti)).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authrim_kv::MemoryTtlStore;

    #[tokio::test]
    async fn user_email_uniqueness_enforced() {
        let store = InMemoryUserStore::new();
        let mut u1 = User::new("u1");
        u1.email = Some("jdoe@example.com".to_string());
        store.insert(u1).await.unwrap();

        let mut u2 = User::new("u2");
        u2.email = Some("JDOE@example.com".to_string());
        let err = store.insert(u2).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn revocation_list_honors_expiry() {
        let list = RevocationList::new(Arc::new(MemoryTtlStore::new()));
        list.revoke("jti-1", Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert!(list.is_revoked("jti-1").await.unwrap());
        assert!(!list.is_revoked("jti-2").await.unwrap());

        // Already-expired tokens need no marker.
        list.revoke("jti-3", Utc::now() - chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert!(!list.is_revoked("jti-3").await.unwrap());
    }
}
