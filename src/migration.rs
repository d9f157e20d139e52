//! Migrations between adjacent schema versions
//!
//! Every adjacent pair in a lineage is connected by exactly one [`Migration`]
//! carrying both directions. A direction is a pure function from a payload
//! valid at one end to a payload for the other end plus the lacunas incurred.
//!
//! Most pairs only add optional fields or drop obsolete ones; for those
//! [`Migration::structural`] derives both directions from the two field sets.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::lacuna::{join_path, Lacuna};
use crate::schema::{json_kind, FieldType, Fields, Schema};
use crate::version::SyntacticVersion;

/// Output of one migration direction
pub type Migrated = (Value, Vec<Lacuna>);

/// One direction of a migration
pub type MigrationFn = Arc<dyn Fn(Value) -> Result<Migrated, MigrationFailure> + Send + Sync>;

/// Why a single migration direction could not produce a value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("at '{path}': {reason}")]
pub struct MigrationFailure {
    pub path: String,
    pub reason: String,
}

impl MigrationFailure {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Walk direction along a lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards higher versions
    Forward,
    /// Towards lower versions
    Backward,
}

/// Bidirectional migration between two adjacent versions
#[derive(Clone)]
pub struct Migration {
    from: SyntacticVersion,
    to: SyntacticVersion,
    forward: MigrationFn,
    backward: MigrationFn,
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl Migration {
    /// Hand-written migration from `from` up to `to`
    pub fn new<F, B>(
        from: impl Into<SyntacticVersion>,
        to: impl Into<SyntacticVersion>,
        forward: F,
        backward: B,
    ) -> Self
    where
        F: Fn(Value) -> Result<Migrated, MigrationFailure> + Send + Sync + 'static,
        B: Fn(Value) -> Result<Migrated, MigrationFailure> + Send + Sync + 'static,
    {
        Self {
            from: from.into(),
            to: to.into(),
            forward: Arc::new(forward),
            backward: Arc::new(backward),
        }
    }

    /// Derive both directions from the field sets of two schemas
    ///
    /// Fields unknown to the destination are dropped with a warning lacuna,
    /// absent destination fields are filled from their default with an info
    /// lacuna. A mandatory destination field without default cannot be
    /// produced and fails the step.
    pub fn structural(from: &Schema, to: &Schema) -> Self {
        let down = Arc::new((from.fields().clone(), from.is_open()));
        let up = Arc::new((to.fields().clone(), to.is_open()));

        Self::new(
            from.version(),
            to.version(),
            move |data| reshape(&up.0, up.1, data),
            move |data| reshape(&down.0, down.1, data),
        )
    }

    pub fn from_version(&self) -> SyntacticVersion {
        self.from
    }

    pub fn to_version(&self) -> SyntacticVersion {
        self.to
    }

    /// Versions `(source, destination)` of one direction
    pub fn endpoints(&self, direction: Direction) -> (SyntacticVersion, SyntacticVersion) {
        match direction {
            Direction::Forward => (self.from, self.to),
            Direction::Backward => (self.to, self.from),
        }
    }

    pub fn apply(&self, direction: Direction, data: Value) -> Result<Migrated, MigrationFailure> {
        match direction {
            Direction::Forward => (self.forward)(data),
            Direction::Backward => (self.backward)(data),
        }
    }
}

// =============================================================================
// Structural reshaping
// =============================================================================

/// Reshape `data` to fit `fields`
pub fn reshape(fields: &Fields, open: bool, data: Value) -> Result<Migrated, MigrationFailure> {
    let mut obj = match data {
        Value::Object(obj) => obj,
        other => {
            return Err(MigrationFailure::new("", format!("expected an object, found {}", json_kind(&other))))
        }
    };
    let mut lacunas = Vec::new();
    reshape_object(fields, open, &mut obj, "", &mut lacunas)?;
    Ok((Value::Object(obj), lacunas))
}

fn reshape_object(
    fields: &Fields,
    open: bool,
    obj: &mut Map<String, Value>,
    path: &str,
    lacunas: &mut Vec<Lacuna>,
) -> Result<(), MigrationFailure> {
    if !open {
        let unknown: Vec<String> = obj.keys().filter(|k| !fields.contains_key(*k)).cloned().collect();
        for name in unknown {
            if let Some(value) = obj.remove(&name) {
                if !value.is_null() {
                    lacunas.push(Lacuna::field_dropped(join_path(path, &name), &value));
                }
            }
        }
    }

    for (name, def) in fields {
        let field_path = join_path(path, name);
        if matches!(obj.get(name), None | Some(Value::Null)) {
            if let Some(default) = &def.default {
                obj.insert(name.clone(), default.clone());
                lacunas.push(Lacuna::default_applied(field_path, default));
            } else if def.is_mandatory() {
                return Err(MigrationFailure::new(
                    field_path,
                    "required field has no source value and no default",
                ));
            }
        } else if let Some(value) = obj.get_mut(name) {
            reshape_value(&def.field_type, open, value, &field_path, lacunas)?;
        }
    }
    Ok(())
}

fn reshape_value(
    field_type: &FieldType,
    open: bool,
    value: &mut Value,
    path: &str,
    lacunas: &mut Vec<Lacuna>,
) -> Result<(), MigrationFailure> {
    if !field_type.accepts_kind(value) {
        return Err(MigrationFailure::new(
            path,
            format!(
                "{} cannot become {} without an explicit migration",
                json_kind(value),
                field_type.name()
            ),
        ));
    }
    match (field_type, value) {
        (FieldType::Struct(nested), Value::Object(obj)) => reshape_object(nested, open, obj, path, lacunas)?,
        (FieldType::Array(items), Value::Array(values)) => {
            for (i, item) in values.iter_mut().enumerate() {
                reshape_value(items, open, item, &format!("{}[{}]", path, i), lacunas)?;
            }
        }
        (FieldType::Map(inner), Value::Object(obj)) => {
            for (key, item) in obj.iter_mut() {
                reshape_value(inner, open, item, &join_path(path, key), lacunas)?;
            }
        }
        _ => {}
    }
    Ok(())
}

// =============================================================================
// Helpers for hand-written migrations
// =============================================================================

/// Move a top-level field to a new name; renaming loses nothing
pub fn rename_field(data: &mut Value, from: &str, to: &str) {
    if let Value::Object(obj) = data {
        if let Some(value) = obj.remove(from) {
            obj.insert(to.to_string(), value);
        }
    }
}

/// Remove a top-level field, recording a warning if it carried a value
pub fn drop_field(data: &mut Value, name: &str, lacunas: &mut Vec<Lacuna>) {
    if let Value::Object(obj) = data {
        if let Some(value) = obj.remove(name) {
            if !value.is_null() {
                lacunas.push(Lacuna::field_dropped(name, &value));
            }
        }
    }
}

/// Set a top-level field to `default` if absent, recording an info lacuna
pub fn fill_default(data: &mut Value, name: &str, default: Value, lacunas: &mut Vec<Lacuna>) {
    if let Value::Object(obj) = data {
        if matches!(obj.get(name), None | Some(Value::Null)) {
            lacunas.push(Lacuna::default_applied(name, &default));
            obj.insert(name.to_string(), default);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lacuna::{LacunaCode, Severity};
    use crate::schema::FieldDef;
    use serde_json::json;

    fn v1() -> Schema {
        Schema::builder((1, 0))
            .field("name", FieldDef::string().required())
            .build()
            .unwrap()
    }

    fn v2() -> Schema {
        Schema::builder((2, 0))
            .field("name", FieldDef::string().required())
            .field("interval", FieldDef::string().with_default("5m"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_structural_forward_fills_default() {
        let m = Migration::structural(&v1(), &v2());
        let (value, lacunas) = m.apply(Direction::Forward, json!({ "name": "foo" })).unwrap();
        assert_eq!(value, json!({ "name": "foo", "interval": "5m" }));
        assert_eq!(lacunas.len(), 1);
        assert_eq!(lacunas[0].severity, Severity::Info);
        assert_eq!(lacunas[0].path, "interval");
    }

    #[test]
    fn test_structural_backward_drops_field() {
        let m = Migration::structural(&v1(), &v2());
        let (value, lacunas) = m
            .apply(Direction::Backward, json!({ "name": "foo", "interval": "10m" }))
            .unwrap();
        assert_eq!(value, json!({ "name": "foo" }));
        assert_eq!(lacunas.len(), 1);
        assert_eq!(lacunas[0].code, LacunaCode::FieldDropped);
        assert_eq!(lacunas[0].severity, Severity::Warning);
    }

    #[test]
    fn test_structural_missing_required_fails() {
        let from = Schema::builder((1, 0))
            .field("name", FieldDef::string().required())
            .build()
            .unwrap();
        let to = Schema::builder((2, 0))
            .field("name", FieldDef::string().required())
            .field("owner", FieldDef::string().required())
            .build()
            .unwrap();
        let m = Migration::structural(&from, &to);
        let err = m.apply(Direction::Forward, json!({ "name": "foo" })).unwrap_err();
        assert_eq!(err.path, "owner");
    }

    #[test]
    fn test_structural_nested_items() {
        let mut old_item = Fields::new();
        old_item.insert("value".into(), FieldDef::string().required());
        old_item.insert("title".into(), FieldDef::string());
        let mut new_item = Fields::new();
        new_item.insert("value".into(), FieldDef::string().required());

        let from = Schema::builder((0, 0))
            .field("items", FieldDef::array(FieldType::Struct(old_item)))
            .build()
            .unwrap();
        let to = Schema::builder((0, 1))
            .field("items", FieldDef::array(FieldType::Struct(new_item)))
            .build()
            .unwrap();

        let m = Migration::structural(&from, &to);
        let (value, lacunas) = m
            .apply(
                Direction::Forward,
                json!({ "items": [{ "value": "a", "title": "A" }, { "value": "b" }] }),
            )
            .unwrap();
        assert_eq!(value, json!({ "items": [{ "value": "a" }, { "value": "b" }] }));
        assert_eq!(lacunas.len(), 1);
        assert_eq!(lacunas[0].path, "items[0].title");
    }

    #[test]
    fn test_type_change_needs_explicit_migration() {
        let from = Schema::builder((1, 0))
            .field("interval", FieldDef::integer())
            .build()
            .unwrap();
        let to = Schema::builder((1, 1))
            .field("interval", FieldDef::string())
            .build()
            .unwrap();
        let m = Migration::structural(&from, &to);
        let err = m.apply(Direction::Forward, json!({ "interval": 300 })).unwrap_err();
        assert!(err.reason.contains("integer cannot become string"));
    }

    #[test]
    fn test_hand_written_migration() {
        let m = Migration::new(
            (1, 0),
            (1, 1),
            |mut data| {
                let mut lacunas = Vec::new();
                rename_field(&mut data, "title", "name");
                fill_default(&mut data, "interval", json!("5m"), &mut lacunas);
                Ok((data, lacunas))
            },
            |mut data| {
                let mut lacunas = Vec::new();
                rename_field(&mut data, "name", "title");
                drop_field(&mut data, "interval", &mut lacunas);
                Ok((data, lacunas))
            },
        );
        let (up, up_lacunas) = m.apply(Direction::Forward, json!({ "title": "x" })).unwrap();
        assert_eq!(up, json!({ "name": "x", "interval": "5m" }));
        assert_eq!(up_lacunas.len(), 1);

        let (down, down_lacunas) = m.apply(Direction::Backward, up).unwrap();
        assert_eq!(down, json!({ "title": "x" }));
        assert_eq!(down_lacunas[0].code, LacunaCode::FieldDropped);
        assert_eq!(m.endpoints(Direction::Backward), ((1, 1).into(), (1, 0).into()));
    }
}
