//! Schema-driven sanitization of untrusted configuration trees.
//!
//! Configuration files are hand-edited. A single malformed field must not
//! take the whole application down, so [`Validator::validate_and_sanitize`]
//! never fails: it walks the declared [`Schema`], keeps every field whose
//! value type-checks, and drops the rest. Dropped fields are recorded in the
//! validator's audit log and the typed struct's own defaults fill the gaps
//! when the sanitized map is deserialized (see [`sanitize_into`]).
//!
//! # Coercion rules
//!
//! | Declared     | Accepted input                                         |
//! |--------------|--------------------------------------------------------|
//! | `Bool`       | booleans, `0`/`1`, `true/false/yes/no/on/off` strings  |
//! | `Int`        | integral numbers and integer strings within `i64`      |
//! | `Float`      | any finite number, numeric strings                     |
//! | `String`     | strings only                                           |
//! | `List(T)`    | arrays whose every element coerces to `T`              |
//! | `Map`        | objects                                                |
//! | `Optional(T)`| `null`, or anything `T` accepts                        |
//! | `Nested(S)`  | objects, sanitized recursively against `S`             |
//! | `Any`        | anything                                               |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

// ── Schema description ──────────────────────────────────────────────────

/// Declared type of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Any,
    Bool,
    Int,
    Float,
    String,
    List(Box<FieldType>),
    Map,
    Optional(Box<FieldType>),
    Nested(Schema),
}

impl FieldType {
    pub fn list(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    /// The nested schema to recurse into, looking through `Optional`.
    fn nested_schema(&self) -> Option<&Schema> {
        match self {
            FieldType::Nested(schema) => Some(schema),
            FieldType::Optional(inner) => inner.nested_schema(),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => write!(f, "any"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::String => write!(f, "string"),
            FieldType::List(inner) => write!(f, "list[{}]", inner),
            FieldType::Map => write!(f, "map"),
            FieldType::Optional(inner) => write!(f, "optional[{}]", inner),
            FieldType::Nested(schema) => write!(f, "{}", schema.name()),
        }
    }
}

/// A single declared field with optional numeric bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    /// Inclusive lower bound for numeric values.
    pub min: Option<f64>,
    /// Exclusive lower bound for numeric values.
    pub gt: Option<f64>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            min: None,
            gt: None,
        }
    }

    /// Require numeric values `>= min`.
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Require numeric values `> bound`.
    pub fn gt(mut self, bound: f64) -> Self {
        self.gt = Some(bound);
        self
    }
}

/// An ordered set of declared fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add an unbounded field.
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.with(FieldSpec::new(name, ty))
    }

    /// Add a fully specified field.
    pub fn with(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A typed configuration that can describe its own schema.
///
/// Implementors must deserialize with `#[serde(default)]` at the container
/// level so that keys dropped by the validator fall back to `Default`.
pub trait ConfigSchema: DeserializeOwned + Default {
    fn schema() -> Schema;
}

// ── Audit log ───────────────────────────────────────────────────────────

/// Outcome recorded for one examined field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Accepted,
    Rejected,
    Nested,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Accepted => write!(f, "accepted"),
            AuditOutcome::Rejected => write!(f, "rejected"),
            AuditOutcome::Nested => write!(f, "nested"),
        }
    }
}

/// Why a value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// The value's JSON type cannot be coerced to the declared type.
    TypeMismatch { expected: String, found: String },
    /// A list element failed validation.
    InvalidElement { index: usize, detail: String },
    /// The value type-checked but violates a numeric bound.
    Constraint { detail: String },
    /// An object was expected where something else was supplied.
    NotAMapping { found: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TypeMismatch { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            RejectReason::InvalidElement { index, detail } => {
                write!(f, "element {}: {}", index, detail)
            }
            RejectReason::Constraint { detail } => write!(f, "constraint: {}", detail),
            RejectReason::NotAMapping { found } => write!(f, "expected mapping, found {}", found),
        }
    }
}

/// One validator decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub outcome: AuditOutcome,
    /// Dotted field path; empty for the root mapping itself.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

impl AuditEntry {
    fn accepted(path: &str) -> Self {
        Self {
            outcome: AuditOutcome::Accepted,
            path: path.to_string(),
            value: None,
            reason: None,
        }
    }

    fn nested(path: &str) -> Self {
        Self {
            outcome: AuditOutcome::Nested,
            path: path.to_string(),
            value: None,
            reason: None,
        }
    }

    fn rejected(path: &str, value: &Value, reason: RejectReason) -> Self {
        Self {
            outcome: AuditOutcome::Rejected,
            path: path.to_string(),
            value: Some(value.clone()),
            reason: Some(reason),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.outcome == AuditOutcome::Rejected
    }
}

// ── Validator ───────────────────────────────────────────────────────────

/// Sanitizes input trees against a schema and keeps an audit log.
#[derive(Debug, Default)]
pub struct Validator {
    audit: Vec<AuditEntry>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce `input` to the fields that validate against `schema`.
    ///
    /// Absent keys are skipped silently. Invalid values are omitted and
    /// recorded as `rejected`. Nested objects are sanitized with a scoped
    /// audit log whose entries are appended to this one; their result is
    /// kept even when empty. A non-mapping `input` yields one rejected entry
    /// at `path_prefix` and an empty map.
    pub fn validate_and_sanitize(
        &mut self,
        schema: &Schema,
        input: &Value,
        path_prefix: &str,
    ) -> Map<String, Value> {
        let mut sanitized = Map::new();

        let Some(object) = input.as_object() else {
            self.record(AuditEntry::rejected(
                path_prefix,
                input,
                RejectReason::NotAMapping {
                    found: value_kind(input).to_string(),
                },
            ));
            return sanitized;
        };

        for spec in schema.fields() {
            let Some(raw) = object.get(&spec.name) else {
                continue;
            };
            let path = join_path(path_prefix, &spec.name);

            if let (Some(child), Value::Object(_)) = (spec.ty.nested_schema(), raw) {
                let mut scoped = Validator::new();
                let child_map = scoped.validate_and_sanitize(child, raw, &path);
                self.record(AuditEntry::nested(&path));
                self.audit.append(&mut scoped.audit);
                sanitized.insert(spec.name.clone(), Value::Object(child_map));
                continue;
            }

            match coerce(&spec.ty, raw).and_then(|value| check_bounds(spec, value)) {
                Ok(value) => {
                    self.record(AuditEntry::accepted(&path));
                    sanitized.insert(spec.name.clone(), value);
                }
                Err(reason) => {
                    self.record(AuditEntry::rejected(&path, raw, reason));
                }
            }
        }

        sanitized
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit
    }

    /// Drain the audit log.
    pub fn take_audit_log(&mut self) -> Vec<AuditEntry> {
        std::mem::take(&mut self.audit)
    }

    /// Rejected entries only.
    pub fn rejected(&self) -> impl Iterator<Item = &AuditEntry> {
        self.audit.iter().filter(|e| e.is_rejected())
    }

    fn record(&mut self, entry: AuditEntry) {
        match &entry.reason {
            Some(reason) => debug!(
                outcome = %entry.outcome,
                path = %entry.path,
                reason = %reason,
                "config field examined"
            ),
            None => debug!(outcome = %entry.outcome, path = %entry.path, "config field examined"),
        }
        self.audit.push(entry);
    }
}

/// Sanitize `input` against `T`'s schema and build `T`, with defaults for
/// every dropped key.
pub fn sanitize_into<T: ConfigSchema>(input: &Value) -> (T, Vec<AuditEntry>) {
    let schema = T::schema();
    let mut validator = Validator::new();
    let sanitized = validator.validate_and_sanitize(&schema, input, "");

    let config = match serde_json::from_value::<T>(Value::Object(sanitized)) {
        Ok(config) => config,
        Err(e) => {
            warn!(
                schema = schema.name(),
                error = %e,
                "sanitized config did not deserialize, using defaults"
            );
            T::default()
        }
    };

    (config, validator.take_audit_log())
}

// ── Coercion ────────────────────────────────────────────────────────────

fn coerce(ty: &FieldType, value: &Value) -> Result<Value, RejectReason> {
    let mismatch = || RejectReason::TypeMismatch {
        expected: ty.to_string(),
        found: value_kind(value).to_string(),
    };

    match ty {
        FieldType::Any => Ok(value.clone()),
        FieldType::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => match n.as_u64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(mismatch()),
            },
            Value::String(s) => parse_bool(s).map(Value::Bool).ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        FieldType::Int => match value {
            Value::Number(n) if n.is_i64() => Ok(value.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Ok(Value::from(f as i64))
                }
                _ => Err(mismatch()),
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        FieldType::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::from(f)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        FieldType::String => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        FieldType::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    coerce(inner, item).map_err(|reason| RejectReason::InvalidElement {
                        index,
                        detail: reason.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err(mismatch()),
        },
        FieldType::Map => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        FieldType::Optional(inner) => match value {
            Value::Null => Ok(Value::Null),
            _ => coerce(inner, value),
        },
        FieldType::Nested(schema) => match value {
            // Reached only for list elements; direct fields recurse with an
            // audited validator instead.
            Value::Object(_) => {
                let mut scratch = Validator::new();
                Ok(Value::Object(scratch.validate_and_sanitize(
                    schema, value, "",
                )))
            }
            _ => Err(mismatch()),
        },
    }
}

fn check_bounds(spec: &FieldSpec, value: Value) -> Result<Value, RejectReason> {
    let Some(n) = value.as_f64() else {
        return Ok(value);
    };
    if let Some(min) = spec.min {
        if n < min {
            return Err(RejectReason::Constraint {
                detail: format!("must be >= {}, got {}", min, n),
            });
        }
    }
    if let Some(bound) = spec.gt {
        if n <= bound {
            return Err(RejectReason::Constraint {
                detail: format!("must be > {}, got {}", bound, n),
            });
        }
    }
    Ok(value)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Limits {
        max_items: i64,
        ratio: f64,
    }

    impl Default for Limits {
        fn default() -> Self {
            Self {
                max_items: 100,
                ratio: 0.5,
            }
        }
    }

    impl ConfigSchema for Limits {
        fn schema() -> Schema {
            Schema::new("Limits")
                .with(FieldSpec::new("max_items", FieldType::Int).min(0.0))
                .field("ratio", FieldType::Float)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Settings {
        log_level: String,
        verbose: bool,
        tags: Vec<String>,
        note: Option<String>,
        limits: Limits,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                log_level: "INFO".to_string(),
                verbose: false,
                tags: Vec::new(),
                note: None,
                limits: Limits::default(),
            }
        }
    }

    impl ConfigSchema for Settings {
        fn schema() -> Schema {
            Schema::new("Settings")
                .field("log_level", FieldType::String)
                .field("verbose", FieldType::Bool)
                .field("tags", FieldType::list(FieldType::String))
                .field("note", FieldType::optional(FieldType::String))
                .field("limits", FieldType::Nested(Limits::schema()))
        }
    }

    #[test]
    fn valid_input_is_returned_unchanged() {
        let input = json!({
            "log_level": "DEBUG",
            "verbose": true,
            "tags": ["a", "b"],
            "note": null,
            "limits": {"max_items": 5, "ratio": 0.25}
        });
        let mut validator = Validator::new();
        let out = validator.validate_and_sanitize(&Settings::schema(), &input, "");
        assert_eq!(Value::Object(out), input);
        assert_eq!(validator.rejected().count(), 0);
    }

    #[test]
    fn wrong_type_log_level_falls_back_to_default() {
        let (settings, audit) = sanitize_into::<Settings>(&json!({"log_level": 123}));
        assert_eq!(settings.log_level, "INFO");

        let rejected: Vec<_> = audit.iter().filter(|e| e.is_rejected()).collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].path, "log_level");
        assert_eq!(rejected[0].value, Some(json!(123)));
        assert_eq!(
            rejected[0].reason,
            Some(RejectReason::TypeMismatch {
                expected: "string".to_string(),
                found: "int".to_string(),
            })
        );
    }

    #[test]
    fn absent_fields_produce_no_entries() {
        let mut validator = Validator::new();
        let out = validator.validate_and_sanitize(&Settings::schema(), &json!({}), "");
        assert!(out.is_empty());
        assert!(validator.audit_log().is_empty());
    }

    #[test]
    fn partially_invalid_nested_object_keeps_valid_fields() {
        let input = json!({"limits": {"max_items": "lots", "ratio": 0.9}});
        let (settings, audit) = sanitize_into::<Settings>(&input);

        assert_eq!(settings.limits.ratio, 0.9);
        assert_eq!(settings.limits.max_items, 100);

        assert!(audit
            .iter()
            .any(|e| e.outcome == AuditOutcome::Nested && e.path == "limits"));
        let rejected: Vec<_> = audit.iter().filter(|e| e.is_rejected()).collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].path, "limits.max_items");
    }

    #[test]
    fn fully_invalid_nested_object_is_kept_empty() {
        let input = json!({"limits": {"max_items": [], "ratio": "x"}});
        let mut validator = Validator::new();
        let out = validator.validate_and_sanitize(&Settings::schema(), &input, "");
        assert_eq!(out.get("limits"), Some(&json!({})));
    }

    #[test]
    fn nested_field_with_scalar_is_rejected() {
        let (settings, audit) = sanitize_into::<Settings>(&json!({"limits": 7}));
        assert_eq!(settings.limits, Limits::default());
        assert!(audit.iter().any(|e| e.is_rejected() && e.path == "limits"));
    }

    #[test]
    fn non_mapping_input_yields_single_entry() {
        for input in [json!(null), json!(42), json!(["a"])] {
            let mut validator = Validator::new();
            let out = validator.validate_and_sanitize(&Settings::schema(), &input, "app");
            assert!(out.is_empty());
            assert_eq!(validator.audit_log().len(), 1);
            let entry = &validator.audit_log()[0];
            assert_eq!(entry.path, "app");
            assert!(matches!(entry.reason, Some(RejectReason::NotAMapping { .. })));
        }
    }

    #[test]
    fn lax_scalar_coercions() {
        let input = json!({"verbose": "yes", "limits": {"max_items": "12", "ratio": "0.75"}});
        let (settings, _) = sanitize_into::<Settings>(&input);
        assert!(settings.verbose);
        assert_eq!(settings.limits.max_items, 12);
        assert_eq!(settings.limits.ratio, 0.75);
    }

    #[test]
    fn integral_float_accepted_for_int() {
        let (limits, audit) = sanitize_into::<Limits>(&json!({"max_items": 3.0}));
        assert_eq!(limits.max_items, 3);
        assert!(audit.iter().all(|e| !e.is_rejected()));

        let (limits, _) = sanitize_into::<Limits>(&json!({"max_items": 3.5}));
        assert_eq!(limits.max_items, 100);
    }

    #[test]
    fn int_beyond_i64_is_rejected_without_losing_siblings() {
        let input = json!({"max_items": u64::MAX, "ratio": 0.25});
        let (limits, audit) = sanitize_into::<Limits>(&input);
        assert_eq!(limits.max_items, 100);
        assert_eq!(limits.ratio, 0.25);

        let rejected: Vec<_> = audit.iter().filter(|e| e.is_rejected()).collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].path, "max_items");
        assert!(matches!(
            rejected[0].reason,
            Some(RejectReason::TypeMismatch { .. })
        ));

        let (limits, _) = sanitize_into::<Limits>(&json!({"max_items": i64::MAX}));
        assert_eq!(limits.max_items, i64::MAX);
    }

    #[test]
    fn list_with_bad_element_is_dropped_whole() {
        let (settings, audit) = sanitize_into::<Settings>(&json!({"tags": ["ok", 5]}));
        assert!(settings.tags.is_empty());
        let entry = audit.iter().find(|e| e.path == "tags").unwrap();
        assert!(matches!(
            entry.reason,
            Some(RejectReason::InvalidElement { index: 1, .. })
        ));
    }

    #[test]
    fn bound_violation_rejected_as_constraint() {
        let (limits, audit) = sanitize_into::<Limits>(&json!({"max_items": -4}));
        assert_eq!(limits.max_items, 100);
        assert!(matches!(
            audit[0].reason,
            Some(RejectReason::Constraint { .. })
        ));
    }

    #[test]
    fn exclusive_bound() {
        let schema = Schema::new("S").with(FieldSpec::new("size", FieldType::Float).gt(0.0));
        let mut validator = Validator::new();
        assert!(validator
            .validate_and_sanitize(&schema, &json!({"size": 0}), "")
            .is_empty());
        assert_eq!(
            validator
                .validate_and_sanitize(&schema, &json!({"size": 0.001}), "")
                .len(),
            1
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut validator = Validator::new();
        let out =
            validator.validate_and_sanitize(&Limits::schema(), &json!({"extra": 1, "ratio": 1}), "");
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("ratio"));
    }

    #[test]
    fn audit_entries_serialize_with_snake_case_outcome() {
        let (_, audit) = sanitize_into::<Settings>(&json!({"verbose": "maybe"}));
        let encoded = serde_json::to_value(&audit[0]).unwrap();
        assert_eq!(encoded["outcome"], "rejected");
        assert_eq!(encoded["reason"]["kind"], "type_mismatch");
    }

    proptest! {
        #[test]
        fn sanitize_is_identity_on_valid_input(
            level in "[A-Z]{1,8}",
            verbose in any::<bool>(),
            tags in proptest::collection::vec("[a-z]{0,6}", 0..4),
            max_items in 0i64..1_000_000,
            ratio in -1.0e6f64..1.0e6,
        ) {
            let input = json!({
                "log_level": level,
                "verbose": verbose,
                "tags": tags,
                "limits": {"max_items": max_items, "ratio": ratio},
            });
            let mut validator = Validator::new();
            let out = validator.validate_and_sanitize(&Settings::schema(), &input, "");
            prop_assert_eq!(Value::Object(out), input);
        }
    }
}
