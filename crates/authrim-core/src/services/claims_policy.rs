//! Claim-release policy
//!
//! An attribute is released into UserInfo / the ID token iff a granted scope
//! covers it, or the `claims` request parameter asked for it and the client
//! is flagged `allow_claims_without_scope`.

use crate::models::{ClaimRequirement, User};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

static SCOPE_CLAIMS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    m.insert(
        "profile",
        &[
            "name",
            "family_name",
            "given_name",
            "middle_name",
            "nickname",
            "preferred_username",
            "profile",
            "picture",
            "website",
            "gender",
            "birthdate",
            "zoneinfo",
            "locale",
            "updated_at",
        ][..],
    );
    m.insert("email", &["email", "email_verified"][..]);
    m.insert("address", &["address"][..]);
    m.insert("phone", &["phone_number", "phone_number_verified"][..]);
    m
});

/// The set of claim names releasable for this request.
pub fn released_claims(
    granted_scope: &str,
    requested: Option<&BTreeMap<String, ClaimRequirement>>,
    allow_claims_without_scope: bool,
) -> BTreeSet<String> {
    let mut released = BTreeSet::new();

    for scope in granted_scope.split_whitespace() {
        if let Some(claims) = SCOPE_CLAIMS.get(scope) {
            released.extend(claims.iter().map(|c| c.to_string()));
        }
    }

    if allow_claims_without_scope {
        if let Some(requested) = requested {
            released.extend(requested.keys().cloned());
        }
    }

    released
}

/// Resolve a released claim name against the user record.
pub fn claim_value(user: &User, claim: &str) -> Option<Value> {
    let string = |v: &Option<String>| v.as_ref().map(|s| Value::String(s.clone()));
    match claim {
        "name" => string(&user.name),
        "family_name" => string(&user.family_name),
        "given_name" => string(&user.given_name),
        "middle_name" => string(&user.middle_name),
        "nickname" => string(&user.nickname),
        "preferred_username" => string(&user.preferred_username),
        "profile" => string(&user.profile),
        "picture" => string(&user.picture),
        "website" => string(&user.website),
        "gender" => string(&user.gender),
        "birthdate" => string(&user.birthdate),
        "zoneinfo" => string(&user.zoneinfo),
        "locale" => string(&user.locale),
        "updated_at" => Some(Value::from(user.updated_at.timestamp())),
        "email" => string(&user.email),
        "email_verified" => user.email.as_ref().map(|_| Value::Bool(user.email_verified)),
        "phone_number" => string(&user.phone_number),
        "phone_number_verified" => user
            .phone_number
            .as_ref()
            .map(|_| Value::Bool(user.phone_number_verified)),
        "address" => user.address.clone(),
        _ => None,
    }
}

/// Build the claim map for a response, skipping attributes the user record
/// does not carry.
pub fn build_claims(user: &User, released: &BTreeSet<String>) -> Map<String, Value> {
    let mut claims = Map::new();
    for name in released {
        if let Some(value) = claim_value(user, name) {
            claims.insert(name.clone(), value);
        }
    }
    claims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClaimsRequest;
    use serde_json::json;

    fn user() -> User {
        let mut u = User::new("u1");
        u.name = Some("Jane Doe".to_string());
        u.given_name = Some("Jane".to_string());
        u.family_name = Some("Doe".to_string());
        u.email = Some("jane@example.com".to_string());
        u.email_verified = true;
        u.phone_number = Some("+15555550100".to_string());
        u
    }

    #[test]
    fn profile_scope_releases_profile_claims_only() {
        let released = released_claims("openid profile", None, false);
        assert!(released.contains("name"));
        assert!(released.contains("updated_at"));
        assert!(!released.contains("email"));
        assert!(!released.contains("phone_number"));
    }

    #[test]
    fn claims_param_without_flag_releases_nothing_extra() {
        let request = ClaimsRequest::parse(&json!({
            "userinfo": {"name": {"essential": true}}
        }))
        .unwrap();

        let without_flag = released_claims("openid", Some(&request.userinfo), false);
        assert!(without_flag.is_empty());

        let with_flag = released_claims("openid", Some(&request.userinfo), true);
        assert_eq!(with_flag.len(), 1);
        assert!(with_flag.contains("name"));
    }

    #[test]
    fn built_claims_skip_absent_attributes() {
        let released = released_claims("openid profile email", None, false);
        let claims = build_claims(&user(), &released);

        assert_eq!(claims.get("name"), Some(&json!("Jane Doe")));
        assert_eq!(claims.get("email_verified"), Some(&json!(true)));
        // No picture on the record, none in the response.
        assert!(!claims.contains_key("picture"));
        // Phone scope not granted.
        assert!(!claims.contains_key("phone_number"));
    }
}
