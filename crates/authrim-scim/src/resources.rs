//! SCIM resource representations and mapping to domain models

use crate::error::ScimError;
use authrim_core::models::{Role, User};
use serde_json::{json, Map, Value};
use uuid::Uuid;

pub const SCHEMA_USER: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const SCHEMA_GROUP: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
pub const SCHEMA_LIST: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";
pub const SCHEMA_PATCH: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";
pub const SCHEMA_ERROR: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

/// SCIM projection of a user.
pub fn to_scim_user(user: &User) -> Value {
    let mut doc = Map::new();
    doc.insert("schemas".into(), json!([SCHEMA_USER]));
    doc.insert("id".into(), json!(user.id));
    if let Some(external_id) = &user.external_id {
        doc.insert("externalId".into(), json!(external_id));
    }
    if let Some(user_name) = &user.preferred_username {
        doc.insert("userName".into(), json!(user_name));
    }
    doc.insert("active".into(), json!(user.active));

    let mut name = Map::new();
    if let Some(v) = &user.name {
        name.insert("formatted".into(), json!(v));
    }
    if let Some(v) = &user.given_name {
        name.insert("givenName".into(), json!(v));
    }
    if let Some(v) = &user.family_name {
        name.insert("familyName".into(), json!(v));
    }
    if let Some(v) = &user.middle_name {
        name.insert("middleName".into(), json!(v));
    }
    if !name.is_empty() {
        doc.insert("name".into(), Value::Object(name));
    }

    if let Some(v) = &user.nickname {
        doc.insert("nickName".into(), json!(v));
    }
    if let Some(v) = &user.profile {
        doc.insert("profileUrl".into(), json!(v));
    }
    if let Some(v) = &user.locale {
        doc.insert("locale".into(), json!(v));
    }
    if let Some(v) = &user.zoneinfo {
        doc.insert("timezone".into(), json!(v));
    }
    if let Some(email) = &user.email {
        doc.insert(
            "emails".into(),
            json!([{ "value": email, "primary": true }]),
        );
    }
    if let Some(phone) = &user.phone_number {
        doc.insert("phoneNumbers".into(), json!([{ "value": phone }]));
    }
    if let Some(address) = &user.address {
        doc.insert("addresses".into(), json!([address]));
    }

    doc.insert(
        "meta".into(),
        json!({
            "resourceType": "User",
            "created": user.created_at.to_rfc3339(),
            "lastModified": user.updated_at.to_rfc3339(),
        }),
    );
    Value::Object(doc)
}

/// Build/update a domain user from a SCIM document. `existing` carries
/// identity and timestamps on replace; create paths pass `None`.
pub fn from_scim_user(payload: &Value, existing: Option<&User>) -> Result<User, ScimError> {
    let doc = payload
        .as_object()
        .ok_or_else(|| ScimError::invalid_syntax("user document must be a JSON object"))?;

    let user_name = doc
        .get("userName")
        .and_then(Value::as_str)
        .map(str::to_string);
    if user_name.is_none() {
        return Err(ScimError::invalid_value("userName is required"));
    }

    let mut user = match existing {
        Some(existing) => existing.clone(),
        None => User::new(Uuid::new_v4().to_string()),
    };

    user.preferred_username = user_name;
    user.external_id = doc
        .get("externalId")
        .and_then(Value::as_str)
        .map(str::to_string);
    user.active = doc.get("active").and_then(Value::as_bool).unwrap_or(true);

    let name = doc.get("name").and_then(Value::as_object);
    let name_str = |key: &str| {
        name.and_then(|n| n.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    user.name = name_str("formatted");
    user.given_name = name_str("givenName");
    user.family_name = name_str("familyName");
    user.middle_name = name_str("middleName");

    let top_str = |key: &str| doc.get(key).and_then(Value::as_str).map(str::to_string);
    user.nickname = top_str("nickName");
    user.profile = top_str("profileUrl");
    user.locale = top_str("locale");
    user.zoneinfo = top_str("timezone");

    user.email = doc
        .get("emails")
        .and_then(Value::as_array)
        .and_then(|emails| {
            emails
                .iter()
                .find(|e| e.get("primary").and_then(Value::as_bool).unwrap_or(false))
                .or_else(|| emails.first())
        })
        .and_then(|e| e.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string);

    user.phone_number = doc
        .get("phoneNumbers")
        .and_then(Value::as_array)
        .and_then(|phones| phones.first())
        .and_then(|p| p.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string);

    user.address = doc
        .get("addresses")
        .and_then(Value::as_array)
        .and_then(|addresses| addresses.first())
        .cloned();

    user.updated_at = chrono::Utc::now();
    Ok(user)
}

/// SCIM projection of a role as a Group.
pub fn to_scim_group(role: &Role) -> Value {
    let members: Vec<Value> = role
        .members
        .iter()
        .map(|user_id| json!({ "value": user_id }))
        .collect();

    let mut doc = Map::new();
    doc.insert("schemas".into(), json!([SCHEMA_GROUP]));
    doc.insert("id".into(), json!(role.id));
    doc.insert("displayName".into(), json!(role.display_name));
    if let Some(description) = &role.description {
        doc.insert("description".into(), json!(description));
    }
    doc.insert("members".into(), Value::Array(members));
    doc.insert(
        "meta".into(),
        json!({
            "resourceType": "Group",
            "created": role.created_at.to_rfc3339(),
            "lastModified": role.updated_at.to_rfc3339(),
        }),
    );
    Value::Object(doc)
}

pub fn from_scim_group(payload: &Value, existing: Option<&Role>) -> Result<Role, ScimError> {
    let doc = payload
        .as_object()
        .ok_or_else(|| ScimError::invalid_syntax("group document must be a JSON object"))?;

    let display_name = doc
        .get("displayName")
        .and_then(Value::as_str)
        .ok_or_else(|| ScimError::invalid_value("displayName is required"))?;

    let mut role = match existing {
        Some(existing) => existing.clone(),
        None => Role::new(Uuid::new_v4().to_string(), display_name),
    };
    role.display_name = display_name.to_string();
    role.description = doc
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    // PUT semantics: the member set is replaced wholesale, deduplicated.
    if let Some(members) = doc.get("members").and_then(Value::as_array) {
        let mut seen = Vec::new();
        for member in members {
            let value = member
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| ScimError::invalid_value("group members need a value"))?;
            if !seen.iter().any(|m: &String| m == value) {
                seen.push(value.to_string());
            }
        }
        role.members = seen;
    }

    role.updated_at = chrono::Utc::now();
    Ok(role)
}

/// RFC 7644 list response envelope.
pub fn list_response(total_results: usize, start_index: usize, resources: Vec<Value>) -> Value {
    json!({
        "schemas": [SCHEMA_LIST],
        "totalResults": total_results,
        "startIndex": start_index,
        "itemsPerPage": resources.len(),
        "Resources": resources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_mapping_roundtrip() {
        let payload = json!({
            "schemas": [SCHEMA_USER],
            "userName": "jdoe",
            "name": {"givenName": "Jane", "familyName": "Doe", "formatted": "Jane Doe"},
            "emails": [{"value": "jane@example.com", "primary": true}],
            "active": true
        });
        let user = from_scim_user(&payload, None).unwrap();
        assert_eq!(user.preferred_username.as_deref(), Some("jdoe"));
        assert_eq!(user.email.as_deref(), Some("jane@example.com"));

        let doc = to_scim_user(&user);
        assert_eq!(doc["userName"], "jdoe");
        assert_eq!(doc["name"]["givenName"], "Jane");
        assert_eq!(doc["emails"][0]["value"], "jane@example.com");
        assert_eq!(doc["meta"]["resourceType"], "User");
    }

    #[test]
    fn user_without_username_rejected() {
        let err = from_scim_user(&json!({"active": true}), None).unwrap_err();
        assert_eq!(err.scim_type, Some("invalidValue"));
    }

    #[test]
    fn group_member_set_is_deduplicated() {
        let payload = json!({
            "displayName": "engineering",
            "members": [{"value": "u1"}, {"value": "u2"}, {"value": "u1"}]
        });
        let role = from_scim_group(&payload, None).unwrap();
        assert_eq!(role.members, vec!["u1".to_string(), "u2".to_string()]);
    }
}
