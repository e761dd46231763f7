//! Client repository

use super::map_sqlx_error;
use async_trait::async_trait;
use authrim_core::error::CoreError;
use authrim_core::models::{Client, GrantType};
use authrim_core::stores::ClientStore;
use sqlx::{MySql, Pool, Row};

pub struct ClientRepository {
    pool: Pool<MySql>,
}

impl ClientRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    fn row_to_client(row: sqlx::mysql::MySqlRow) -> Result<Client, CoreError> {
        let redirect_uris: String = row.try_get("redirect_uris").map_err(map_sqlx_error)?;
        let grant_types: String = row.try_get("grant_types").map_err(map_sqlx_error)?;
        let response_types: String = row.try_get("response_types").map_err(map_sqlx_error)?;
        let scopes: String = row.try_get("scopes").map_err(map_sqlx_error)?;

        let grant_types: Vec<String> = serde_json::from_str(&grant_types)?;
        let grant_types: Vec<GrantType> = grant_types
            .iter()
            .filter_map(|g| g.parse().ok())
            .collect();

        Ok(Client {
            client_id: row.try_get("client_id").map_err(map_sqlx_error)?,
            secret_hash: row.try_get("secret_hash").map_err(map_sqlx_error)?,
            redirect_uris: serde_json::from_str(&redirect_uris)?,
            grant_types,
            response_types: serde_json::from_str(&response_types)?,
            scopes: serde_json::from_str(&scopes)?,
            allow_claims_without_scope: row
                .try_get("allow_claims_without_scope")
                .map_err(map_sqlx_error)?,
            dpop_bound_access_tokens: row
                .try_get("dpop_bound_access_tokens")
                .map_err(map_sqlx_error)?,
            pkce_required: row.try_get("pkce_required").map_err(map_sqlx_error)?,
            created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
            updated_at: row.try_get("updated_at").map_err(map_sqlx_error)?,
        })
    }

    fn bind_fields<'q>(
        query: sqlx::query::Query<'q, MySql, sqlx::mysql::MySqlArguments>,
        client: &'q Client,
    ) -> Result<sqlx::query::Query<'q, MySql, sqlx::mysql::MySqlArguments>, CoreError> {
        let grant_types: Vec<String> = client.grant_types.iter().map(|g| g.to_string()).collect();
        Ok(query
            .bind(&client.secret_hash)
            .bind(serde_json::to_string(&client.redirect_uris)?)
            .bind(serde_json::to_string(&grant_types)?)
            .bind(serde_json::to_string(&client.response_types)?)
            .bind(serde_json::to_string(&client.scopes)?)
            .bind(client.allow_claims_without_scope)
            .bind(client.dpop_bound_access_tokens)
            .bind(client.pkce_required)
            .bind(client.created_at)
            .bind(client.updated_at))
    }
}

#[async_trait]
impl ClientStore for ClientRepository {
    async fn get(&self, client_id: &str) -> Result<Option<Client>, CoreError> {
        let row = sqlx::query("SELECT * FROM clients WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(Self::row_to_client).transpose()
    }

    async fn insert(&self, client: Client) -> Result<(), CoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO clients (
                client_id, secret_hash, redirect_uris, grant_types, response_types,
                scopes, allow_claims_without_scope, dpop_bound_access_tokens,
                pkce_required, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&client.client_id);
        Self::bind_fields(query, &client)?
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update(&self, client: Client) -> Result<(), CoreError> {
        let query = sqlx::query(
            r#"
            UPDATE clients SET
                secret_hash = ?, redirect_uris = ?, grant_types = ?,
                response_types = ?, scopes = ?, allow_claims_without_scope = ?,
                dpop_bound_access_tokens = ?, pkce_required = ?,
                created_at = ?, updated_at = ?
            WHERE client_id = ?
            "#,
        );
        let result = Self::bind_fields(query, &client)?
            .bind(&client.client_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                resource: format!("client {}", client.client_id),
            });
        }
        Ok(())
    }

    async fn delete(&self, client_id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM clients WHERE client_id = ?")
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Client>, CoreError> {
        let rows = sqlx::query("SELECT * FROM clients ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(Self::row_to_client).collect()
    }
}
