//! Tagged-union helpers for one-key variant records
//!
//! The backend encodes every sum type as a JSON object with exactly one
//! key: the variant tag. The key's value is the variant payload, which is
//! `null` for marker variants such as `{"backend": null}`.

use std::collections::HashMap;

use serde_json::Value;

use crate::errors::DecodeError;

type Handler<'a, R> = Box<dyn Fn(&Value) -> R + 'a>;

/// Map from variant tag to payload handler
pub struct Handlers<'a, R> {
    handlers: HashMap<&'a str, Handler<'a, R>>,
}

impl<'a, R> Handlers<'a, R> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `tag`, replacing any previous one
    pub fn on(mut self, tag: &'a str, handler: impl Fn(&Value) -> R + 'a) -> Self {
        self.handlers.insert(tag, Box::new(handler));
        self
    }

    fn get(&self, tag: &str) -> Option<&Handler<'a, R>> {
        self.handlers.get(tag)
    }
}

impl<R> Default for Handlers<'_, R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sole key and payload of a one-key record
fn split(value: &Value) -> Option<(&str, &Value)> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.iter().next().map(|(k, v)| (k.as_str(), v))
}

/// True iff `value` is a one-key record whose key is `tag`
pub fn is_tag(value: &Value, tag: &str) -> bool {
    matches!(split(value), Some((key, _)) if key == tag)
}

/// The sole key of a one-key record.
///
/// Used for marker variants whose payload carries nothing, such as the
/// unit role inside a phase step.
pub fn tag_of(value: &Value) -> Option<&str> {
    split(value).map(|(key, _)| key)
}

/// Invoke the handler registered for the record's tag.
///
/// # Panics
///
/// Panics if `value` is not a one-key record or if its tag has no
/// handler. Callers must pass an exhaustive handler map; data from the
/// network goes through [`try_dispatch`] instead.
pub fn dispatch<R>(value: &Value, handlers: &Handlers<'_, R>) -> R {
    let Some((tag, payload)) = split(value) else {
        panic!("dispatch called on a value that is not a variant record: {value}");
    };
    match handlers.get(tag) {
        Some(handler) => handler(payload),
        None => panic!("no handler for variant tag `{tag}`"),
    }
}

/// Fallible form of [`dispatch`] for untrusted input
pub fn try_dispatch<R>(value: &Value, handlers: &Handlers<'_, R>) -> Result<R, DecodeError> {
    let (tag, payload) = split(value).ok_or_else(|| DecodeError::NotAVariant(value.to_string()))?;
    let handler = handlers
        .get(tag)
        .ok_or_else(|| DecodeError::UnhandledTag(tag.to_string()))?;
    Ok(handler(payload))
}
