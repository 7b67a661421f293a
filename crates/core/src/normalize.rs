//! Turning heterogeneous upstream payloads into typed entities.
//!
//! Upstream list endpoints answer with a bare array, a `{data: [...]}` or
//! `{items: [...]}` envelope, or occasionally a single object. The lenient
//! [`parse_list`] accepts all of them and drops elements that do not match
//! the entity shape. [`parse_strict`] is used where a malformed element
//! should fail the whole call.

use crate::error::{HarvestResult, ToolError};
use crate::types::Entity;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::debug;

/// Locate the candidate elements of a list payload.
fn extract_array(payload: &Value) -> Option<&Vec<Value>> {
    if let Value::Array(items) = payload {
        return Some(items);
    }

    let object = payload.as_object()?;
    ["data", "items"]
        .into_iter()
        .find_map(|key| object.get(key).and_then(Value::as_array))
}

/// Parse a list payload, keeping only the elements that validate.
pub fn parse_list<T: DeserializeOwned>(payload: &Value, context: &str) -> Vec<T> {
    let Some(candidates) = extract_array(payload) else {
        // Not a list envelope; try the payload as one entity
        return match serde_json::from_value::<T>(payload.clone()) {
            Ok(item) => vec![item],
            Err(e) => {
                debug!(context, error = %e, "Payload is neither a list nor a single entity");
                Vec::new()
            }
        };
    };

    let mut items = Vec::with_capacity(candidates.len());
    let mut dropped = 0usize;

    for candidate in candidates {
        if !candidate.is_object() {
            dropped += 1;
            continue;
        }
        match serde_json::from_value::<T>(candidate.clone()) {
            Ok(item) => items.push(item),
            Err(_) => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(context, dropped, kept = items.len(), "Dropped malformed list elements");
    }

    items
}

/// Parse a payload that must match `T` exactly.
pub fn parse_strict<T: DeserializeOwned>(payload: &Value, context: &str) -> HarvestResult<T> {
    serde_json::from_value::<T>(payload.clone()).map_err(|e| {
        ToolError::upstream(format!("Unexpected response format from {}", context)).with_details(
            json!({
                "context": context,
                "error": e.to_string(),
                "line": e.line(),
                "column": e.column(),
            }),
        )
    })
}

/// Remove entities whose identity was already seen; the first occurrence wins.
///
/// Entities without an identity are always kept.
pub fn dedupe_by_id<T: Entity>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| match item.identity() {
            Some(id) => seen.insert(id.to_string()),
            None => true,
        })
        .collect()
}
