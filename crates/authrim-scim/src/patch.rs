//! SCIM PATCH (RFC 7644 §3.5.2)
//!
//! Operations apply in order to an in-memory copy of the resource; the
//! caller re-validates and persists atomically. Paths support dotted
//! attributes (`name.givenName`) and a value selector on multi-valued
//! attributes (`members[value eq "u1"]`) for remove/replace.

use crate::error::ScimError;
use crate::filter;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchRequest {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<PatchOperation>,
}

/// Apply all operations in order, mutating `resource`.
pub fn apply(resource: &mut Value, operations: &[PatchOperation]) -> Result<(), ScimError> {
    for operation in operations {
        match operation.op.to_ascii_lowercase().as_str() {
            "add" => apply_add(resource, operation)?,
            "replace" => apply_replace(resource, operation)?,
            "remove" => apply_remove(resource, operation)?,
            other => {
                return Err(ScimError::invalid_syntax(format!(
                    "unknown PATCH op \"{}\"",
                    other
                )))
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
struct ParsedPath {
    segments: Vec<String>,
    /// Selector filter on the final segment, e.g. `value eq "u1"`.
    selector: Option<filter::FilterNode>,
}

fn parse_path(raw: &str) -> Result<ParsedPath, ScimError> {
    let (path_part, selector) = match raw.find('[') {
        Some(open) => {
            let close = raw
                .rfind(']')
                .ok_or_else(|| ScimError::invalid_syntax("unterminated path selector"))?;
            let inner = &raw[open + 1..close];
            let node = filter::parse(inner)
                .map_err(|e| ScimError::invalid_syntax(format!("bad path selector: {}", e.detail)))?;
            let mut base = raw[..open].to_string();
            // Sub-attribute after the selector, e.g. `emails[...].value`.
            let tail = raw[close + 1..].trim_start_matches('.');
            if !tail.is_empty() {
                base.push('.');
                base.push_str(tail);
            }
            (base, Some(node))
        }
        None => (raw.to_string(), None),
    };

    let segments: Vec<String> = path_part.split('.').map(str::to_string).collect();
    if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(ScimError::invalid_syntax(format!("malformed path \"{}\"", raw)));
    }
    Ok(ParsedPath { segments, selector })
}

fn apply_add(resource: &mut Value, operation: &PatchOperation) -> Result<(), ScimError> {
    let value = operation
        .value
        .clone()
        .ok_or_else(|| ScimError::invalid_value("add requires a value"))?;

    match &operation.path {
        None => merge_object(resource, value),
        Some(path) => {
            let parsed = parse_path(path)?;
            if parsed.selector.is_some() {
                return Err(ScimError::invalid_syntax(
                    "add does not accept a path selector",
                ));
            }
            let target = navigate_mut(resource, &parsed.segments[..parsed.segments.len() - 1])?;
            let leaf = parsed.segments.last().expect("non-empty path");
            let object = target
                .as_object_mut()
                .ok_or_else(|| ScimError::no_target("path does not address an object"))?;
            match object.get_mut(leaf) {
                // Adding to a multi-valued attribute appends.
                Some(Value::Array(existing)) => match value {
                    Value::Array(new_items) => existing.extend(new_items),
                    single => existing.push(single),
                },
                _ => {
                    object.insert(leaf.clone(), value);
                }
            }
            Ok(())
        }
    }
}

fn apply_replace(resource: &mut Value, operation: &PatchOperation) -> Result<(), ScimError> {
    let value = operation
        .value
        .clone()
        .ok_or_else(|| ScimError::invalid_value("replace requires a value"))?;

    match &operation.path {
        None => merge_object(resource, value),
        Some(path) => {
            let parsed = parse_path(path)?;
            match &parsed.selector {
                None => {
                    let target =
                        navigate_mut(resource, &parsed.segments[..parsed.segments.len() - 1])?;
                    let leaf = parsed.segments.last().expect("non-empty path");
                    let object = target
                        .as_object_mut()
                        .ok_or_else(|| ScimError::no_target("path does not address an object"))?;
                    object.insert(leaf.clone(), value);
                    Ok(())
                }
                Some(selector) => {
                    let array = selected_array_mut(resource, &parsed)?;
                    let mut replaced = false;
                    for item in array.iter_mut() {
                        if filter::matches(selector, item) {
                            *item = value.clone();
                            replaced = true;
                        }
                    }
                    if !replaced {
                        return Err(ScimError::no_target("selector matched no values"));
                    }
                    Ok(())
                }
            }
        }
    }
}

fn apply_remove(resource: &mut Value, operation: &PatchOperation) -> Result<(), ScimError> {
    let path = operation
        .path
        .as_deref()
        .ok_or_else(|| ScimError::no_target("remove requires a path"))?;
    let parsed = parse_path(path)?;

    match &parsed.selector {
        None => {
            let target = navigate_mut(resource, &parsed.segments[..parsed.segments.len() - 1])?;
            let leaf = parsed.segments.last().expect("non-empty path");
            if let Some(object) = target.as_object_mut() {
                object.remove(leaf);
            }
            Ok(())
        }
        Some(selector) => {
            let array = selected_array_mut(resource, &parsed)?;
            array.retain(|item| !filter::matches(selector, item));
            Ok(())
        }
    }
}

/// Mutable reference to the array a selector path addresses.
fn selected_array_mut<'a>(
    resource: &'a mut Value,
    parsed: &ParsedPath,
) -> Result<&'a mut Vec<Value>, ScimError> {
    let target = navigate_mut(resource, &parsed.segments[..parsed.segments.len() - 1])?;
    let leaf = parsed.segments.last().expect("non-empty path");
    target
        .as_object_mut()
        .and_then(|o| o.get_mut(leaf))
        .and_then(|v| v.as_array_mut())
        .ok_or_else(|| ScimError::no_target("selector path does not address a multi-valued attribute"))
}

fn navigate_mut<'a>(resource: &'a mut Value, segments: &[String]) -> Result<&'a mut Value, ScimError> {
    let mut current = resource;
    for segment in segments {
        let object = current
            .as_object_mut()
            .ok_or_else(|| ScimError::no_target("path traverses a non-object"))?;
        current = object
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(current)
}

fn merge_object(resource: &mut Value, value: Value) -> Result<(), ScimError> {
    let incoming = match value {
        Value::Object(map) => map,
        _ => return Err(ScimError::invalid_value("pathless op requires an object value")),
    };
    let object = resource
        .as_object_mut()
        .ok_or_else(|| ScimError::internal("resource is not an object"))?;
    for (k, v) in incoming {
        object.insert(k, v);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(op: &str, path: Option<&str>, value: Option<Value>) -> PatchOperation {
        PatchOperation {
            op: op.to_string(),
            path: path.map(str::to_string),
            value,
        }
    }

    #[test]
    fn replace_with_dotted_path() {
        let mut user = json!({"name": {"givenName": "Jane"}});
        apply(
            &mut user,
            &[op("replace", Some("name.givenName"), Some(json!("Janet")))],
        )
        .unwrap();
        assert_eq!(user["name"]["givenName"], "Janet");
    }

    #[test]
    fn replace_is_idempotent() {
        let mut a = json!({"displayName": "Old", "active": true});
        let ops = [op("replace", Some("displayName"), Some(json!("New")))];
        apply(&mut a, &ops).unwrap();
        let snapshot = a.clone();
        apply(&mut a, &ops).unwrap();
        assert_eq!(a, snapshot);
    }

    #[test]
    fn add_appends_to_multivalued() {
        let mut group = json!({"members": [{"value": "u1"}]});
        apply(
            &mut group,
            &[op("add", Some("members"), Some(json!([{"value": "u2"}])))],
        )
        .unwrap();
        assert_eq!(group["members"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn remove_with_selector_filters_matching_values() {
        let mut group = json!({"members": [{"value": "u1"}, {"value": "u2"}, {"value": "u3"}]});
        apply(
            &mut group,
            &[op("remove", Some(r#"members[value eq "u2"]"#), None)],
        )
        .unwrap();
        let members = group["members"].as_array().unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|m| m["value"] != "u2"));
    }

    #[test]
    fn pathless_add_merges_attributes() {
        let mut user = json!({"userName": "jdoe"});
        apply(
            &mut user,
            &[op("add", None, Some(json!({"nickName": "jd", "active": true})))],
        )
        .unwrap();
        assert_eq!(user["nickName"], "jd");
        assert_eq!(user["active"], true);
        assert_eq!(user["userName"], "jdoe");
    }

    #[test]
    fn remove_without_path_is_rejected() {
        let mut user = json!({"userName": "jdoe"});
        let err = apply(&mut user, &[op("remove", None, None)]).unwrap_err();
        assert_eq!(err.scim_type, Some("noTarget"));
    }

    #[test]
    fn unknown_op_is_invalid_syntax() {
        let mut user = json!({});
        let err = apply(&mut user, &[op("move", Some("a"), Some(json!(1)))]).unwrap_err();
        assert_eq!(err.scim_type, Some("invalidSyntax"));
    }
}
