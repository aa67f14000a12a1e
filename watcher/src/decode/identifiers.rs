//! Nested identifier-list decoding
//!
//! The backend reports which instance identifier belongs to which unit
//! role as an untagged, arbitrarily nested association structure (a cons
//! list encoded as optional tuples). A node is a leaf when its first
//! element is not itself an array; otherwise it is a branch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::decode::variant::tag_of;
use crate::models::deployment::{IdentifierTree, UnitRole};

/// Flatten an identifier tree into `(role, identifier)` pairs in
/// encounter order.
pub fn flatten_identifiers(tree: &IdentifierTree) -> Vec<(UnitRole, String)> {
    let mut out = Vec::new();
    collect(tree, &mut out);
    out
}

fn collect(node: &Value, out: &mut Vec<(UnitRole, String)>) {
    let Some(items) = node.as_array() else {
        if !node.is_null() {
            warn!("Ignoring identifier node that is not a list: {}", node);
        }
        return;
    };

    let Some(first) = items.first() else {
        return;
    };

    if first.is_array() {
        for child in items {
            collect(child, out);
        }
        return;
    }

    match decode_leaf(items) {
        Some(pair) => out.push(pair),
        None => warn!("Ignoring malformed identifier leaf: {}", node),
    }
}

fn decode_leaf(items: &[Value]) -> Option<(UnitRole, String)> {
    let role_value = items.first()?;
    let role_tag = tag_of(role_value).or_else(|| role_value.as_str())?;
    let role = UnitRole::from_tag(role_tag)?;
    let identifier = identifier_text(items.get(1)?)?;
    Some((role, identifier.to_string()))
}

/// Principals arrive either as text or as `{"__principal__": "<text>"}`
fn identifier_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("__principal__").and_then(Value::as_str),
        _ => None,
    }
}

/// Well-known identifiers substituted when a required role is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackIdentifiers {
    /// Substitute for a missing `backend` identifier
    #[serde(default = "default_backend_fallback")]
    pub backend: String,

    /// Substitute for a missing `swap` identifier
    #[serde(default = "default_swap_fallback")]
    pub swap: String,
}

fn default_backend_fallback() -> String {
    "rno2w-sqaaa-aaaaa-aaacq-cai".to_string()
}

fn default_swap_fallback() -> String {
    "rdmx6-jaaaa-aaaaa-aaadq-cai".to_string()
}

impl Default for FallbackIdentifiers {
    fn default() -> Self {
        Self {
            backend: default_backend_fallback(),
            swap: default_swap_fallback(),
        }
    }
}

impl FallbackIdentifiers {
    /// Roles that must always resolve to an identifier
    pub const REQUIRED: [UnitRole; 2] = [UnitRole::Backend, UnitRole::Swap];

    fn for_role(&self, role: UnitRole) -> Option<&str> {
        match role {
            UnitRole::Backend => Some(&self.backend),
            UnitRole::Swap => Some(&self.swap),
            UnitRole::Ledger => None,
        }
    }
}

/// Degraded-mode notice raised while resolving identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentifierWarning {
    /// No identifier was reported for `role`; `identifier` was substituted
    FallbackUsed { role: UnitRole, identifier: String },
}

/// Identifiers keyed by role, plus any fallbacks that were applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedIdentifiers {
    pub identifiers: BTreeMap<UnitRole, String>,
    pub warnings: Vec<IdentifierWarning>,
}

impl ResolvedIdentifiers {
    pub fn get(&self, role: UnitRole) -> Option<&str> {
        self.identifiers.get(&role).map(String::as_str)
    }

    /// True when every identifier came from the backend
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Build the role map, substituting fallbacks for missing required roles.
///
/// Later pairs for the same role replace earlier ones.
pub fn resolve_identifiers(
    pairs: impl IntoIterator<Item = (UnitRole, String)>,
    fallbacks: &FallbackIdentifiers,
) -> ResolvedIdentifiers {
    let mut resolved = ResolvedIdentifiers {
        identifiers: pairs.into_iter().collect(),
        warnings: Vec::new(),
    };

    for role in FallbackIdentifiers::REQUIRED {
        if resolved.identifiers.contains_key(&role) {
            continue;
        }
        let Some(identifier) = fallbacks.for_role(role) else {
            continue;
        };
        warn!(
            "No {} identifier reported by the backend, falling back to {}",
            role, identifier
        );
        resolved.identifiers.insert(role, identifier.to_string());
        resolved.warnings.push(IdentifierWarning::FallbackUsed {
            role,
            identifier: identifier.to_string(),
        });
    }

    resolved
}
