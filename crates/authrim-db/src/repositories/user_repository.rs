//! User repository
//!
//! Besides the plain store contract, exposes [`search`] which compiles a
//! SCIM filter AST into a parameterized WHERE clause; filter text never
//! reaches the SQL string.
//!
//! [`search`]: UserRepository::search

use super::map_sqlx_error;
use async_trait::async_trait;
use authrim_core::error::CoreError;
use authrim_core::models::User;
use authrim_core::stores::UserStore;
use authrim_scim::search::UserSearchBackend;
use authrim_scim::sql::{compile, ResourceTable, SqlParam};
use authrim_scim::{FilterNode, ScimError};
use sqlx::{MySql, Pool, Row};

const USER_COLUMNS: &str = "id, external_id, active, password_hash, name, given_name, \
     family_name, middle_name, nickname, preferred_username, profile, picture, website, \
     gender, birthdate, zoneinfo, locale, email, email_verified, phone_number, \
     phone_number_verified, address, custom_attributes, created_at, updated_at";

pub struct UserRepository {
    pool: Pool<MySql>,
}

impl UserRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// List users matching a SCIM filter, compiled to parameterized SQL.
    pub async fn search(&self, filter: Option<&FilterNode>) -> Result<Vec<User>, ScimError> {
        let (clause, params) = match filter {
            Some(node) => {
                let compiled = compile(node, ResourceTable::Users)?;
                (format!("WHERE {}", compiled.clause), compiled.params)
            }
            None => (String::new(), Vec::new()),
        };

        let sql = format!(
            "SELECT {} FROM users {} ORDER BY created_at, id",
            USER_COLUMNS, clause
        );
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
        rows.into_iter()
            .map(|row| Self::row_to_user(row).map_err(ScimError::from))
            .collect()
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<User>, CoreError> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(Self::row_to_user).transpose()
    }

    fn row_to_user(row: sqlx::mysql::MySqlRow) -> Result<User, CoreError> {
        let address: Option<String> = row.try_get("address").map_err(map_sqlx_error)?;
        let custom_attributes: String =
            row.try_get("custom_attributes").map_err(map_sqlx_error)?;

        Ok(User {
            id: row.try_get("id").map_err(map_sqlx_error)?,
            external_id: row.try_get("external_id").map_err(map_sqlx_error)?,
            active: row.try_get("active").map_err(map_sqlx_error)?,
            password_hash: row.try_get("password_hash").map_err(map_sqlx_error)?,
            name: row.try_get("name").map_err(map_sqlx_error)?,
            given_name: row.try_get("given_name").map_err(map_sqlx_error)?,
            family_name: row.try_get("family_name").map_err(map_sqlx_error)?,
            middle_name: row.try_get("middle_name").map_err(map_sqlx_error)?,
            nickname: row.try_get("nickname").map_err(map_sqlx_error)?,
            preferred_username: row.try_get("preferred_username").map_err(map_sqlx_error)?,
            profile: row.try_get("profile").map_err(map_sqlx_error)?,
            picture: row.try_get("picture").map_err(map_sqlx_error)?,
            website: row.try_get("website").map_err(map_sqlx_error)?,
            gender: row.try_get("gender").map_err(map_sqlx_error)?,
            birthdate: row.try_get("birthdate").map_err(map_sqlx_error)?,
            zoneinfo: row.try_get("zoneinfo").map_err(map_sqlx_error)?,
            locale: row.try_get("locale").map_err(map_sqlx_error)?,
            email: row.try_get("email").map_err(map_sqlx_error)?,
            email_verified: row.try_get("email_verified").map_err(map_sqlx_error)?,
            phone_number: row.try_get("phone_number").map_err(map_sqlx_error)?,
            phone_number_verified: row
                .try_get("phone_number_verified")
                .map_err(map_sqlx_error)?,
            address: address.as_deref().map(serde_json::from_str).transpose()?,
            custom_attributes: serde_json::from_str(&custom_attributes)?,
            created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
            updated_at: row.try_get("updated_at").map_err(map_sqlx_error)?,
        })
    }

    fn bind_fields<'q>(
        query: sqlx::query::Query<'q, MySql, sqlx::mysql::MySqlArguments>,
        user: &'q User,
    ) -> Result<sqlx::query::Query<'q, MySql, sqlx::mysql::MySqlArguments>, CoreError> {
        let address = user
            .address
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        Ok(query
            .bind(&user.external_id)
            .bind(user.active)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(&user.given_name)
            .bind(&user.family_name)
            .bind(&user.middle_name)
            .bind(&user.nickname)
            .bind(&user.preferred_username)
            .bind(&user.profile)
            .bind(&user.picture)
            .bind(&user.website)
            .bind(&user.gender)
            .bind(&user.birthdate)
            .bind(&user.zoneinfo)
            .bind(&user.locale)
            .bind(&user.email)
            .bind(user.email_verified)
            .bind(&user.phone_number)
            .bind(user.phone_number_verified)
            .bind(address)
            .bind(serde_json::to_string(&user.custom_attributes)?)
            .bind(user.created_at)
            .bind(user.updated_at))
    }
}

#[async_trait]
impl UserSearchBackend for UserRepository {
    async fn search(&self, filter: Option<&FilterNode>) -> Result<Vec<User>, ScimError> {
        UserRepository::search(self, filter).await
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn get(&self, id: &str) -> Result<Option<User>, CoreError> {
        self.fetch_one_by("id", id).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        self.fetch_one_by("email", email).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        self.fetch_one_by("preferred_username", username).await
    }

    async fn insert(&self, user: User) -> Result<(), CoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO users (
                id, external_id, active, password_hash, name, given_name,
                family_name, middle_name, nickname, preferred_username, profile,
                picture, website, gender, birthdate, zoneinfo, locale, email,
                email_verified, phone_number, phone_number_verified, address,
                custom_attributes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id);
        Self::bind_fields(query, &user)?
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update(&self, user: User) -> Result<(), CoreError> {
        let query = sqlx::query(
            r#"
            UPDATE users SET
                external_id = ?, active = ?, password_hash = ?, name = ?,
                given_name = ?, family_name = ?, middle_name = ?, nickname = ?,
                preferred_username = ?, profile = ?, picture = ?, website = ?,
                gender = ?, birthdate = ?, zoneinfo = ?, locale = ?, email = ?,
                email_verified = ?, phone_number = ?, phone_number_verified = ?,
                address = ?, custom_attributes = ?, created_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        );
        let result = Self::bind_fields(query, &user)?
            .bind(&user.id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                resource: format!("user {}", user.id),
            });
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<User>, CoreError> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at, id", USER_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(Self::row_to_user).collect()
    }
}
