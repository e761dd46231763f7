//! Search backends for the list endpoints
//!
//! The relational implementations in `authrim-db` compile the filter AST to
//! parameterized SQL through [`sql::compile`]; the in-memory implementations
//! evaluate the same AST against the SCIM projection. Both sit behind these
//! traits so the list services stay storage-agnostic. Attribute allow-list
//! validation happens in the service before a backend ever sees the AST.
//!
//! [`sql::compile`]: crate::sql::compile

use crate::error::ScimError;
use crate::filter::{self, FilterNode};
use crate::resources;
use async_trait::async_trait;
use authrim_core::models::{Role, User};
use authrim_core::stores::{RoleStore, UserStore};
use std::sync::Arc;

#[async_trait]
pub trait UserSearchBackend: Send + Sync {
    async fn search(&self, filter: Option<&FilterNode>) -> Result<Vec<User>, ScimError>;
}

#[async_trait]
pub trait GroupSearchBackend: Send + Sync {
    async fn search(&self, filter: Option<&FilterNode>) -> Result<Vec<Role>, ScimError>;
}

/// Evaluates filters against the SCIM projection of each user.
pub struct InMemoryUserSearch {
    users: Arc<dyn UserStore>,
}

impl InMemoryUserSearch {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl UserSearchBackend for InMemoryUserSearch {
    async fn search(&self, filter: Option<&FilterNode>) -> Result<Vec<User>, ScimError> {
        let mut users = self.users.all().await?;
        if let Some(node) = filter {
            users.retain(|user| filter::matches(node, &resources::to_scim_user(user)));
        }
        Ok(users)
    }
}

/// Evaluates filters against the SCIM projection of each group.
pub struct InMemoryGroupSearch {
    roles: Arc<dyn RoleStore>,
}

impl InMemoryGroupSearch {
    pub fn new(roles: Arc<dyn RoleStore>) -> Self {
        Self { roles }
    }
}

#[async_trait]
impl GroupSearchBackend for InMemoryGroupSearch {
    async fn search(&self, filter: Option<&FilterNode>) -> Result<Vec<Role>, ScimError> {
        let mut roles = self.roles.all().await?;
        if let Some(node) = filter {
            roles.retain(|role| filter::matches(node, &resources::to_scim_group(role)));
        }
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse;
    use authrim_core::stores::InMemoryUserStore;

    #[tokio::test]
    async fn in_memory_search_filters_on_scim_attributes() {
        let store: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        for (id, username) in [("u1", "jdoe"), ("u2", "asmith")] {
            let mut user = User::new(id);
            user.preferred_username = Some(username.to_string());
            store.insert(user).await.unwrap();
        }

        let search = InMemoryUserSearch::new(store);
        let ast = parse(r#"userName sw "j""#).unwrap();
        let hits = search.search(Some(&ast)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "u1");

        let all = search.search(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
