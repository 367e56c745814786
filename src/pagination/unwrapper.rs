//! Response envelope unwrapping
//!
//! Each API family wraps its results differently. A [`ResponseUnwrapper`]
//! translates one envelope format into result lists, single items, cursors
//! and totals.

use crate::error::{Error, Result};
use crate::types::{json_type_name, JsonValue};

/// Extracts results and pagination data from a decoded response body
pub trait ResponseUnwrapper: Send + Sync {
    /// List of result items. A missing list is empty, not an error.
    fn unwrap_results(&self, response: &JsonValue) -> Result<Vec<JsonValue>>;

    /// Single item of a by-id response
    fn unwrap_single_item(&self, response: &JsonValue) -> Result<JsonValue>;

    /// Cursor for the next page, if there is one
    fn get_next_page_token(&self, response: &JsonValue) -> Option<String>;

    /// Total number of matching results, if reported
    fn get_total_results(&self, response: &JsonValue) -> Option<u64>;
}

/// Unwrapper driven by dotted paths into the response (`header.nextCursor`).
///
/// The defaults match the OpenAIRE Graph API envelope:
///
/// ```json
/// {"header": {"numFound": 2, "nextCursor": "abc"}, "results": [{}, {}]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathUnwrapper {
    /// Path to the results array
    pub results_path: String,
    /// Path to a single item; `None` means the whole body is the item
    pub item_path: Option<String>,
    /// Path to the next-page cursor
    pub next_cursor_path: String,
    /// Path to the total count
    pub total_path: String,
}

impl Default for PathUnwrapper {
    fn default() -> Self {
        Self {
            results_path: "results".to_string(),
            item_path: None,
            next_cursor_path: "header.nextCursor".to_string(),
            total_path: "header.numFound".to_string(),
        }
    }
}

impl PathUnwrapper {
    /// Create an unwrapper with the default paths
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the results path
    #[must_use]
    pub fn results_path(mut self, path: impl Into<String>) -> Self {
        self.results_path = path.into();
        self
    }

    /// Set the single item path
    #[must_use]
    pub fn item_path(mut self, path: impl Into<String>) -> Self {
        self.item_path = Some(path.into());
        self
    }

    /// Set the next cursor path
    #[must_use]
    pub fn next_cursor_path(mut self, path: impl Into<String>) -> Self {
        self.next_cursor_path = path.into();
        self
    }

    /// Set the total count path
    #[must_use]
    pub fn total_path(mut self, path: impl Into<String>) -> Self {
        self.total_path = path.into();
        self
    }
}

/// Follow a dotted path. Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

impl ResponseUnwrapper for PathUnwrapper {
    fn unwrap_results(&self, response: &JsonValue) -> Result<Vec<JsonValue>> {
        match lookup(response, &self.results_path) {
            None | Some(JsonValue::Null) => Ok(Vec::new()),
            Some(JsonValue::Array(items)) => Ok(items.clone()),
            Some(other) => Err(Error::decode(format!(
                "Expected an array at '{}', found {}",
                self.results_path,
                json_type_name(other)
            ))),
        }
    }

    fn unwrap_single_item(&self, response: &JsonValue) -> Result<JsonValue> {
        let item = match &self.item_path {
            Some(path) => lookup(response, path)
                .ok_or_else(|| Error::decode(format!("No item found at '{path}'")))?,
            None => response,
        };
        match item {
            JsonValue::Object(_) => Ok(item.clone()),
            other => Err(Error::decode(format!(
                "Expected an object item, found {}",
                json_type_name(other)
            ))),
        }
    }

    fn get_next_page_token(&self, response: &JsonValue) -> Option<String> {
        match lookup(response, &self.next_cursor_path)? {
            JsonValue::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn get_total_results(&self, response: &JsonValue) -> Option<u64> {
        match lookup(response, &self.total_path)? {
            JsonValue::Number(n) => n.as_u64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
