//! Scope property bags and the producer-side merge rules.
//!
//! A [`Scope`] is an ordered key/value bag attached to one logical
//! operation (typically one request). Scopes nest; the active stack is
//! carried explicitly in a [`LogContext`] (or read from the `tracing` span
//! stack by [`crate::layer::ShipperLayer`]) and folded into an entry by
//! [`merge_scopes`].

use crate::record::LogEntry;
use serde_json::Value;
use std::sync::Arc;

pub const USER_ID_KEY: &str = "UserId";
pub const TRACE_ID_KEY: &str = "TraceId";
pub const METHOD_KEY: &str = "Method";
pub const PATH_KEY: &str = "Path";
pub const STATUS_CODE_KEY: &str = "StatusCode";
pub const REQUEST_BODY_KEY: &str = "RequestBody";
pub const RESPONSE_BODY_KEY: &str = "ResponseBody";
pub const ELAPSED_KEY: &str = "Elapsed";

/// Ordered key/value bag. Later inserts of the same key replace the value
/// in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    properties: Vec<(String, Value)>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Scope {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut scope = Scope::new();
        for (k, v) in iter {
            scope.insert(k, v);
        }
        scope
    }
}

/// Recognized fields collected from a scope stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeFields {
    pub trace_id: Option<String>,
    pub user_id: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<i32>,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
    pub elapsed_milliseconds: Option<f64>,
}

/// Fold a scope stack, outermost first, into the recognized fields.
///
/// `TraceId`: the first non-empty value found wins. Every other recognized
/// key: the last value found wins, so inner scopes refine outer ones.
/// Unrecognized keys and values of the wrong shape are ignored.
pub fn merge_scopes<'a, I>(scopes: I) -> ScopeFields
where
    I: IntoIterator<Item = &'a Scope>,
{
    let mut fields = ScopeFields::default();

    for scope in scopes {
        for (key, value) in scope.iter() {
            match key {
                TRACE_ID_KEY => {
                    if fields.trace_id.is_none() {
                        fields.trace_id = value_as_string(value).filter(|s| !s.is_empty());
                    }
                }
                USER_ID_KEY => overwrite(&mut fields.user_id, value_as_string(value)),
                METHOD_KEY => overwrite(&mut fields.method, value_as_string(value)),
                PATH_KEY => overwrite(&mut fields.path, value_as_string(value)),
                STATUS_CODE_KEY => overwrite(&mut fields.status_code, value_as_i32(value)),
                REQUEST_BODY_KEY => overwrite(&mut fields.request_body, value_as_string(value)),
                RESPONSE_BODY_KEY => overwrite(&mut fields.response_body, value_as_string(value)),
                ELAPSED_KEY => overwrite(&mut fields.elapsed_milliseconds, value_as_f64(value)),
                _ => {}
            }
        }
    }

    fields
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn value_as_i32(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Explicit producer context: the ambient distributed-trace id (if any)
/// and the active scope stack, outermost first.
///
/// Contexts are cheap to clone and immutable; [`LogContext::with_scope`]
/// returns a child that shares the parent's stack.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    trace_id: Option<Arc<str>>,
    scopes: Vec<Arc<Scope>>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Child context with an ambient distributed-trace id. It takes
    /// precedence over any `TraceId` scope property.
    pub fn with_trace_id(&self, trace_id: impl Into<String>) -> Self {
        let trace_id: String = trace_id.into();
        Self {
            trace_id: (!trace_id.is_empty()).then(|| Arc::from(trace_id)),
            scopes: self.scopes.clone(),
        }
    }

    /// Child context with `scope` pushed as the innermost scope.
    pub fn with_scope(&self, scope: Scope) -> Self {
        let mut scopes = self.scopes.clone();
        scopes.push(Arc::new(scope));
        Self {
            trace_id: self.trace_id.clone(),
            scopes,
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter().map(|s| s.as_ref())
    }

    /// Producer-side enrichment of `entry` from this context.
    pub fn enrich(&self, entry: &mut LogEntry) {
        apply_scope_fields(entry, self.trace_id(), merge_scopes(self.scopes()));
    }
}

/// Copy merged scope fields onto `entry` and resolve its trace id.
///
/// Trace id precedence: ambient trace id, then the scope `TraceId`, then a
/// freshly generated id. The entry never leaves with an empty trace id.
pub fn apply_scope_fields(entry: &mut LogEntry, ambient_trace_id: Option<&str>, fields: ScopeFields) {
    entry.trace_id = ambient_trace_id
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or(fields.trace_id)
        .unwrap_or_else(new_trace_id);

    entry.user_id = fields.user_id;
    entry.method = fields.method;
    entry.path = fields.path;
    entry.status_code = fields.status_code;
    entry.request_body = fields.request_body;
    entry.response_body = fields.response_body;
    entry.elapsed_milliseconds = fields.elapsed_milliseconds;
}

/// 32 lowercase hex characters, no dashes.
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Severity;

    #[test]
    fn first_trace_id_wins_other_keys_last_wins() {
        let outer = Scope::new()
            .with(TRACE_ID_KEY, "outer-trace")
            .with(USER_ID_KEY, "outer-user")
            .with(METHOD_KEY, "GET");
        let inner = Scope::new()
            .with(TRACE_ID_KEY, "inner-trace")
            .with(USER_ID_KEY, "inner-user")
            .with(STATUS_CODE_KEY, 404);

        let fields = merge_scopes([&outer, &inner]);
        assert_eq!(fields.trace_id.as_deref(), Some("outer-trace"));
        assert_eq!(fields.user_id.as_deref(), Some("inner-user"));
        assert_eq!(fields.method.as_deref(), Some("GET"));
        assert_eq!(fields.status_code, Some(404));
    }

    #[test]
    fn empty_trace_id_does_not_shadow_later_scope() {
        let outer = Scope::new().with(TRACE_ID_KEY, "");
        let inner = Scope::new().with(TRACE_ID_KEY, "t-inner");
        assert_eq!(merge_scopes([&outer, &inner]).trace_id.as_deref(), Some("t-inner"));
    }

    #[test]
    fn unrecognized_and_malformed_values_are_ignored() {
        let scope = Scope::new()
            .with("TenantId", "acme")
            .with(STATUS_CODE_KEY, "not-a-number")
            .with(ELAPSED_KEY, "12.5");

        let fields = merge_scopes([&scope]);
        assert_eq!(fields.status_code, None);
        assert_eq!(fields.elapsed_milliseconds, Some(12.5));
        assert_eq!(fields.user_id, None);
    }

    #[test]
    fn ambient_trace_id_beats_scope_trace_id() {
        let ctx = LogContext::new()
            .with_scope(Scope::new().with(TRACE_ID_KEY, "from-scope"))
            .with_trace_id("from-activity");

        let mut entry = LogEntry::new(Severity::Information, "m");
        ctx.enrich(&mut entry);
        assert_eq!(entry.trace_id, "from-activity");
    }

    #[test]
    fn generates_trace_id_when_none_available() {
        let mut entry = LogEntry::new(Severity::Warning, "m");
        LogContext::new().enrich(&mut entry);

        assert_eq!(entry.trace_id.len(), 32);
        assert!(entry.trace_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn child_context_does_not_mutate_parent() {
        let parent = LogContext::new().with_scope(Scope::new().with(USER_ID_KEY, "u1"));
        let child = parent.with_scope(Scope::new().with(USER_ID_KEY, "u2"));

        assert_eq!(merge_scopes(parent.scopes()).user_id.as_deref(), Some("u1"));
        assert_eq!(merge_scopes(child.scopes()).user_id.as_deref(), Some("u2"));
    }
}
