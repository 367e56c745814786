//! Common types used throughout bibliofabric
//!
//! This module contains shared type definitions, type aliases,
//! and utility functions used across multiple modules.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// Query parameters.
///
/// Keys are kept sorted so that serialization is canonical regardless of
/// insertion order. Values may be scalars or arrays of scalars.
pub type Params = BTreeMap<String, JsonValue>;

// ============================================================================
// Parameter Helpers
// ============================================================================

/// Convert any serializable filter object into query parameters.
///
/// The value must serialize to a JSON object. `null` fields are dropped,
/// so `Option` fields that are `None` never reach the wire.
pub fn params_from<F: Serialize + ?Sized>(filters: &F) -> Result<Params> {
    match serde_json::to_value(filters)? {
        JsonValue::Object(map) => Ok(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        JsonValue::Null => Ok(Params::new()),
        other => Err(Error::validation(format!(
            "filters must serialize to an object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Render a scalar parameter value the way it appears in a query string
pub fn param_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Flatten parameters into query pairs. Arrays become repeated keys.
pub fn query_pairs(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            JsonValue::Array(items) => {
                for item in items {
                    if let Some(v) = param_to_string(item) {
                        pairs.push((key.clone(), v));
                    }
                }
            }
            other => {
                if let Some(v) = param_to_string(other) {
                    pairs.push((key.clone(), v));
                }
            }
        }
    }
    pairs
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Filters {
        #[serde(rename = "fromPublicationDate")]
        from_date: Option<String>,
        country: Option<String>,
        #[serde(rename = "type")]
        kind: Vec<String>,
    }

    #[test]
    fn test_params_from_struct_drops_nulls() {
        let filters = Filters {
            from_date: Some("2020-01-01".to_string()),
            country: None,
            kind: vec!["publication".to_string()],
        };

        let params = params_from(&filters).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params["fromPublicationDate"], json!("2020-01-01"));
        assert!(!params.contains_key("country"));
    }

    #[test]
    fn test_params_from_rejects_scalars() {
        let err = params_from(&42).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_query_pairs_repeats_arrays() {
        let mut params = Params::new();
        params.insert("page".to_string(), json!(2));
        params.insert("type".to_string(), json!(["a", "b"]));
        params.insert("skip".to_string(), JsonValue::Null);
        params.insert("open".to_string(), json!(true));

        let pairs = query_pairs(&params);
        assert_eq!(
            pairs,
            vec![
                ("open".to_string(), "true".to_string()),
                ("page".to_string(), "2".to_string()),
                ("type".to_string(), "a".to_string()),
                ("type".to_string(), "b".to_string()),
            ]
        );
    }
}
