//! User account model
//!
//! Split logically into a non-PII core (identifiers, flags) and PII profile
//! attributes (contact, address, name). Email is unique within a tenant
//! when set; the stores enforce that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Opaque stable identifier; becomes the `sub` claim.
    pub id: String,
    pub external_id: Option<String>,
    pub active: bool,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,

    // Profile
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub middle_name: Option<String>,
    pub nickname: Option<String>,
    pub preferred_username: Option<String>,
    pub profile: Option<String>,
    pub picture: Option<String>,
    pub website: Option<String>,
    pub gender: Option<String>,
    pub birthdate: Option<String>,
    pub zoneinfo: Option<String>,
    pub locale: Option<String>,

    // Contact
    pub email: Option<String>,
    pub email_verified: bool,
    pub phone_number: Option<String>,
    pub phone_number_verified: bool,
    /// OIDC structured address claim.
    pub address: Option<serde_json::Value>,

    pub custom_attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            external_id: None,
            active: true,
            password_hash: None,
            name: None,
            given_name: None,
            family_name: None,
            middle_name: None,
            nickname: None,
            preferred_username: None,
            profile: None,
            picture: None,
            website: None,
            gender: None,
            birthdate: None,
            zoneinfo: None,
            locale: None,
            email: None,
            email_verified: false,
            phone_number: None,
            phone_number_verified: false,
            address: None,
            custom_attributes: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }
}
