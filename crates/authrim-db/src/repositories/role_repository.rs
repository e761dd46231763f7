//! Role repository (SCIM Groups)
//!
//! Membership lives in `user_roles`; every mutation updates the role row
//! and its membership rows inside one transaction. [`search`] compiles
//! SCIM filters to parameterized SQL, same as the user repository.
//!
//! [`search`]: RoleRepository::search

use super::map_sqlx_error;
use async_trait::async_trait;
use authrim_core::error::CoreError;
use authrim_core::models::Role;
use authrim_core::stores::RoleStore;
use authrim_scim::search::GroupSearchBackend;
use authrim_scim::sql::{compile, ResourceTable, SqlParam};
use authrim_scim::{FilterNode, ScimError};
use sqlx::{MySql, Pool, Row};

pub struct RoleRepository {
    pool: Pool<MySql>,
}

impl RoleRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// List groups matching a SCIM filter, compiled to parameterized SQL.
    pub async fn search(&self, filter: Option<&FilterNode>) -> Result<Vec<Role>, ScimError> {
        let (clause, params) = match filter {
            Some(node) => {
                let compiled = compile(node, ResourceTable::Groups)?;
                (format!("WHERE {}", compiled.clause), compiled.params)
            }
            None => (String::new(), Vec::new()),
        };

        let sql = format!("SELECT * FROM roles {} ORDER BY created_at, id", clause);
        let mut query = sqlx::query(&sql);
        for param in params {
            query = match param {
                SqlParam::Text(s) => query.bind(s),
                SqlParam::Real(n) => query.bind(n),
                SqlParam::Bool(b) => query.bind(b),
                SqlParam::Null => query.bind(Option::<String>::None),
            };
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ScimError::from(map_sqlx_error(e)))?;
        let mut roles = Vec::with_capacity(rows.len());
        for row in rows {
            roles.push(self.row_to_role(row).await.map_err(ScimError::from)?);
        }
        Ok(roles)
    }

    async fn load_members(&self, role_id: &str) -> Result<Vec<String>, CoreError> {
        let rows = sqlx::query("SELECT user_id FROM user_roles WHERE role_id = ? ORDER BY user_id")
            .bind(role_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(|row| row.try_get("user_id").map_err(map_sqlx_error))
            .collect()
    }

    async fn row_to_role(&self, row: sqlx::mysql::MySqlRow) -> Result<Role, CoreError> {
        let id: String = row.try_get("id").map_err(map_sqlx_error)?;
        let members = self.load_members(&id).await?;
        Ok(Role {
            id,
            display_name: row.try_get("display_name").map_err(map_sqlx_error)?,
            description: row.try_get("description").map_err(map_sqlx_error)?,
            members,
            created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
            updated_at: row.try_get("updated_at").map_err(map_sqlx_error)?,
        })
    }

    /// Replace the membership rows for a role inside the caller's
    /// transaction.
    async fn write_members(
        tx: &mut sqlx::Transaction<'_, MySql>,
        role: &Role,
    ) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM user_roles WHERE role_id = ?")
            .bind(&role.id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        for user_id in &role.members {
            sqlx::query("INSERT INTO user_roles (role_id, user_id) VALUES (?, ?)")
                .bind(&role.id)
                .bind(user_id)
                .execute(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl GroupSearchBackend for RoleRepository {
    async fn search(&self, filter: Option<&FilterNode>) -> Result<Vec<Role>, ScimError> {
        RoleRepository::search(self, filter).await
    }
}

#[async_trait]
impl RoleStore for RoleRepository {
    async fn get(&self, id: &str) -> Result<Option<Role>, CoreError> {
        let row = sqlx::query("SELECT * FROM roles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        match row {
            Some(row) => Ok(Some(self.row_to_role(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_by_display_name(&self, name: &str) -> Result<Option<Role>, CoreError> {
        let row = sqlx::query("SELECT * FROM roles WHERE display_name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        match row {
            Some(row) => Ok(Some(self.row_to_role(row).await?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, role: Role) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query(
            "INSERT INTO roles (id, display_name, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&role.id)
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Self::write_members(&mut tx, &role).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update(&self, role: Role) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let result = sqlx::query(
            "UPDATE roles SET display_name = ?, description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(role.updated_at)
        .bind(&role.id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                resource: format!("role {}", role.id),
            });
        }

        Self::write_members(&mut tx, &role).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("DELETE FROM user_roles WHERE role_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Role>, CoreError> {
        let rows = sqlx::query("SELECT * FROM roles ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let mut roles = Vec::with_capacity(rows.len());
        for row in rows {
            roles.push(self.row_to_role(row).await?);
        }
        Ok(roles)
    }
}
