//! The `claims` authorization request parameter (OIDC core §5.5)
//!
//! Parsed into a validated AST before anything is stored. Top-level keys
//! must be a subset of `{userinfo, id_token}`; anything else fails the
//! authorization request with `invalid_request`.

use crate::error::CoreError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-claim request options.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimRequirement {
    /// `"claim": null`: requested with no constraints.
    Null,
    Essential(bool),
    Value(Value),
    Values(Vec<Value>),
}

impl ClaimRequirement {
    fn parse(value: &Value) -> Result<Self, CoreError> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Object(map) => {
                if let Some(v) = map.get("value") {
                    return Ok(Self::Value(v.clone()));
                }
                if let Some(vs) = map.get("values") {
                    let arr = vs.as_array().ok_or_else(|| {
                        CoreError::invalid_request("claims: \"values\" must be an array")
                    })?;
                    return Ok(Self::Values(arr.clone()));
                }
                if let Some(e) = map.get("essential") {
                    let essential = e.as_bool().ok_or_else(|| {
                        CoreError::invalid_request("claims: \"essential\" must be a boolean")
                    })?;
                    return Ok(Self::Essential(essential));
                }
                Ok(Self::Null)
            }
            _ => Err(CoreError::invalid_request(
                "claims: each claim entry must be null or an object",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimsRequest {
    pub userinfo: BTreeMap<String, ClaimRequirement>,
    pub id_token: BTreeMap<String, ClaimRequirement>,
}

impl ClaimsRequest {
    /// Parse and validate the raw `claims` parameter value.
    pub fn parse(raw: &Value) -> Result<Self, CoreError> {
        let top = raw.as_object().ok_or_else(|| {
            CoreError::invalid_request("claims parameter must be a JSON object")
        })?;

        for key in top.keys() {
            if key != "userinfo" && key != "id_token" {
                return Err(CoreError::invalid_request(format!(
                    "claims parameter contains unknown top-level key \"{}\"",
                    key
                )));
            }
        }

        let mut request = Self::default();
        if let Some(section) = top.get("userinfo") {
            request.userinfo = Self::parse_section(section)?;
        }
        if let Some(section) = top.get("id_token") {
            request.id_token = Self::parse_section(section)?;
        }
        Ok(request)
    }

    /// Parse from the URL-encoded string form of the parameter.
    pub fn parse_str(raw: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|_| CoreError::invalid_request("claims parameter is not valid JSON"))?;
        Self::parse(&value)
    }

    fn parse_section(section: &Value) -> Result<BTreeMap<String, ClaimRequirement>, CoreError> {
        let obj = section.as_object().ok_or_else(|| {
            CoreError::invalid_request("claims sections must be JSON objects")
        })?;
        obj.iter()
            .map(|(name, v)| Ok((name.clone(), ClaimRequirement::parse(v)?)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.userinfo.is_empty() && self.id_token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_essential_and_null_claims() {
        let request = ClaimsRequest::parse(&json!({
            "userinfo": {
                "name": {"essential": true},
                "picture": null
            },
            "id_token": {
                "acr": {"values": ["urn:mace:incommon:iap:silver"]}
            }
        }))
        .unwrap();

        assert_eq!(
            request.userinfo.get("name"),
            Some(&ClaimRequirement::Essential(true))
        );
        assert_eq!(request.userinfo.get("picture"), Some(&ClaimRequirement::Null));
        assert!(matches!(
            request.id_token.get("acr"),
            Some(ClaimRequirement::Values(_))
        ));
    }

    #[test]
    fn unknown_top_level_key_rejected() {
        let result = ClaimsRequest::parse(&json!({"access_token": {"name": null}}));
        assert!(matches!(result, Err(CoreError::InvalidRequest { .. })));
    }

    #[test]
    fn non_object_parameter_rejected() {
        assert!(ClaimsRequest::parse(&json!(["userinfo"])).is_err());
        assert!(ClaimsRequest::parse_str("not-json").is_err());
    }

    #[test]
    fn scalar_claim_entry_rejected() {
        let result = ClaimsRequest::parse(&json!({"userinfo": {"name": "please"}}));
        assert!(matches!(result, Err(CoreError::InvalidRequest { .. })));
    }
}
