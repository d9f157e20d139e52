//! Lacunas: information gaps recorded while translating between versions
//!
//! A lacuna never stops a translation. It is the record that a translated
//! value is not a perfect rendition of its source, e.g. a field was dropped
//! because the destination version does not know it, or a value was invented
//! from a schema default.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How much a caller should care about a lacuna
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// No source information was lost (e.g. a default was filled in)
    Info,
    /// Source information was lost or altered
    Warning,
}

/// Kind of gap a lacuna describes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LacunaCode {
    /// A field absent from the source was filled with the destination default
    DefaultApplied,
    /// A source field has no counterpart in the destination and was removed
    FieldDropped,
    /// A value was rewritten to fit the destination
    ValueChanged,
    /// A value was converted to a different JSON type
    TypeCoerced,
    /// Lineage-specific gap reported by a hand-written migration
    Custom(String),
}

impl LacunaCode {
    pub fn as_str(&self) -> &str {
        match self {
            LacunaCode::DefaultApplied => "default_applied",
            LacunaCode::FieldDropped => "field_dropped",
            LacunaCode::ValueChanged => "value_changed",
            LacunaCode::TypeCoerced => "type_coerced",
            LacunaCode::Custom(code) => code,
        }
    }
}

/// A single recorded gap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lacuna {
    pub code: LacunaCode,
    /// Location of the affected field, e.g. `items[2].title`
    pub path: String,
    pub message: String,
    pub severity: Severity,
}

impl Lacuna {
    pub fn new(
        code: LacunaCode,
        path: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
            severity,
        }
    }

    pub fn info(code: LacunaCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, path, message, Severity::Info)
    }

    pub fn warning(code: LacunaCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, path, message, Severity::Warning)
    }

    /// Field was filled from a default value
    pub fn default_applied(path: impl Into<String>, default: &serde_json::Value) -> Self {
        Self::info(
            LacunaCode::DefaultApplied,
            path,
            format!("field absent in source, default {} applied", default),
        )
    }

    /// Field was removed because the destination does not declare it
    pub fn field_dropped(path: impl Into<String>, value: &serde_json::Value) -> Self {
        Self::warning(
            LacunaCode::FieldDropped,
            path,
            format!("field not present in destination schema, value {} dropped", value),
        )
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Lacuna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
        };
        write!(f, "[{}] {} at '{}': {}", level, self.code.as_str(), self.path, self.message)
    }
}

/// Whether any lacuna in the sequence signals information loss
pub fn has_warnings(lacunas: &[Lacuna]) -> bool {
    lacunas.iter().any(Lacuna::is_warning)
}

/// Join a parent path and a field name (`items[0]` + `title`)
pub(crate) fn join_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", parent, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_applied_is_info() {
        let lacuna = Lacuna::default_applied("interval", &json!("5m"));
        assert_eq!(lacuna.severity, Severity::Info);
        assert_eq!(lacuna.code, LacunaCode::DefaultApplied);
        assert!(lacuna.message.contains("\"5m\""));
    }

    #[test]
    fn test_has_warnings() {
        let info = Lacuna::default_applied("a", &json!(1));
        let warn = Lacuna::field_dropped("b", &json!(2));
        assert!(!has_warnings(&[info.clone()]));
        assert!(has_warnings(&[info, warn]));
    }

    #[test]
    fn test_display() {
        let lacuna = Lacuna::field_dropped("items[0].title", &json!("x"));
        let text = lacuna.to_string();
        assert!(text.starts_with("[warning] field_dropped at 'items[0].title'"));
    }

    #[test]
    fn test_serialized_shape() {
        let lacuna = Lacuna::info(LacunaCode::Custom("unit_converted".into()), "interval", "s to m");
        let value = serde_json::to_value(&lacuna).unwrap();
        assert_eq!(value["severity"], json!("info"));
        assert_eq!(value["code"], json!({ "custom": "unit_converted" }));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "name"), "name");
        assert_eq!(join_path("items[1]", "value"), "items[1].value");
    }
}
