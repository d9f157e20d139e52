//! Binding native types to schema versions
//!
//! [`bind`] checks once, at start-up, that a native type can carry every
//! payload one schema version accepts. The resulting [`ConvergentSchema`]
//! decodes validated payloads straight into that type and encodes values of
//! it back into payloads at the same version.
//!
//! The check needs no reflection. The serialized form of a caller-supplied
//! zero value is compared against the schema first. Then a sample payload
//! carrying every declared field, with one element in each array and map, is
//! decoded into the type, which covers optional fields and element types the
//! zero value leaves empty.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{LineageError, Result};
use crate::lacuna::join_path;
use crate::lineage::Lineage;
use crate::schema::{json_kind, Constraint, FieldDef, FieldType, Fields, Schema};
use crate::version::SyntacticVersion;

/// A schema version bound to the native type `T`
pub struct ConvergentSchema<T> {
    lineage: Arc<Lineage>,
    schema: Schema,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for ConvergentSchema<T> {
    fn clone(&self) -> Self {
        Self {
            lineage: Arc::clone(&self.lineage),
            schema: self.schema.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ConvergentSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvergentSchema")
            .field("lineage", &self.lineage.name())
            .field("version", &self.schema.version())
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

/// Bind `T` to the schema at `version`
pub fn bind<T>(lineage: Arc<Lineage>, version: SyntacticVersion, zero: &T) -> Result<ConvergentSchema<T>>
where
    T: Serialize + DeserializeOwned,
{
    let schema = lineage.schema(version)?.clone();
    let bind_error = |path: &str, reason: String| LineageError::Bind {
        version,
        path: path.to_string(),
        reason,
    };

    let zero_value = serde_json::to_value(zero).map_err(|e| bind_error("", format!("zero value does not serialize: {}", e)))?;
    let Value::Object(obj) = &zero_value else {
        return Err(bind_error("", format!("type serializes to {}, not an object", json_kind(&zero_value))));
    };
    check_fields(schema.fields(), obj, "", schema.is_open()).map_err(|(path, reason)| bind_error(&path, reason))?;

    let sampled = sample_fields(schema.fields());
    let mut sample = obj.clone();
    sample.extend(sampled.clone());
    if let Err(e) = serde_json::from_value::<T>(Value::Object(sample)) {
        let path = failing_field::<T>(obj, &sampled);
        return Err(bind_error(&path, format!("payloads at this version do not decode: {}", e)));
    }

    debug!(
        lineage = lineage.name(),
        %version,
        native = std::any::type_name::<T>(),
        "type bound to schema"
    );
    Ok(ConvergentSchema {
        lineage,
        schema,
        _type: PhantomData,
    })
}

/// Bind `T` to the latest schema of the lineage
pub fn bind_latest<T>(lineage: Arc<Lineage>, zero: &T) -> Result<ConvergentSchema<T>>
where
    T: Serialize + DeserializeOwned,
{
    let latest = lineage.latest_version();
    bind(lineage, latest, zero)
}

impl<T> ConvergentSchema<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn version(&self) -> SyntacticVersion {
        self.schema.version()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn lineage(&self) -> &Arc<Lineage> {
        &self.lineage
    }

    /// Decode a payload at the bound version into `T`
    ///
    /// Absent defaulted fields are filled before decoding.
    pub fn decode(&self, mut data: Value) -> Result<T> {
        self.schema.validate(&data)?;
        self.schema.apply_defaults(&mut data);
        serde_json::from_value(data).map_err(|e| LineageError::Validation {
            version: self.version(),
            path: String::new(),
            reason: format!("cannot decode into {}: {}", std::any::type_name::<T>(), e),
        })
    }

    /// Encode `value` into a payload valid at the bound version
    pub fn encode(&self, value: &T) -> Result<Value> {
        let mut data = serde_json::to_value(value).map_err(|e| LineageError::Serialize {
            input: std::any::type_name::<T>().to_string(),
            reason: e.to_string(),
        })?;
        if let Value::Object(obj) = &mut data {
            strip_absent(self.schema.fields(), obj);
        }
        self.schema.validate(&data)?;
        Ok(data)
    }
}

type Mismatch = (String, String);

fn check_fields(fields: &Fields, obj: &Map<String, Value>, path: &str, open: bool) -> std::result::Result<(), Mismatch> {
    for (name, def) in fields {
        let field_path = join_path(path, name);
        match obj.get(name) {
            None if def.is_mandatory() => {
                return Err((field_path, "required field is missing from the type".to_string()));
            }
            Some(Value::Null) if def.is_mandatory() => {
                return Err((field_path, "required field is optional in the type".to_string()));
            }
            None | Some(Value::Null) => {}
            Some(value) => check_type(&def.field_type, value, &field_path, open)?,
        }
    }

    if !open {
        if let Some(extra) = obj.keys().find(|k| !fields.contains_key(*k)) {
            return Err((
                join_path(path, extra),
                "type carries a field the schema does not declare".to_string(),
            ));
        }
    }
    Ok(())
}

fn check_type(field_type: &FieldType, value: &Value, path: &str, open: bool) -> std::result::Result<(), Mismatch> {
    if !field_type.accepts_kind(value) {
        return Err((
            path.to_string(),
            format!("schema declares {}, type has {}", field_type.name(), json_kind(value)),
        ));
    }
    match (field_type, value) {
        (FieldType::Struct(nested), Value::Object(obj)) => check_fields(nested, obj, path, open),
        (FieldType::Array(items), Value::Array(values)) => values
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_type(items, item, &format!("{}[{}]", path, i), open)),
        (FieldType::Map(inner), Value::Object(obj)) => obj
            .iter()
            .try_for_each(|(key, item)| check_type(inner, item, &join_path(path, key), open)),
        _ => Ok(()),
    }
}

/// First declared field whose sample alone breaks decoding of `T`
fn failing_field<T: DeserializeOwned>(zero: &Map<String, Value>, sampled: &Map<String, Value>) -> String {
    sampled
        .iter()
        .find(|(name, value)| {
            let mut candidate = zero.clone();
            candidate.insert((*name).clone(), (*value).clone());
            serde_json::from_value::<T>(Value::Object(candidate)).is_err()
        })
        .map(|(name, _)| name.clone())
        .unwrap_or_default()
}

/// A value for every declared field
fn sample_fields(fields: &Fields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, def)| (name.clone(), sample_value(def)))
        .collect()
}

fn sample_value(def: &FieldDef) -> Value {
    let allowed = def.constraints.iter().find_map(|c| match c {
        Constraint::OneOf(values) => values.first().cloned(),
        _ => None,
    });
    if let Some(value) = allowed {
        return value;
    }
    match (&def.field_type, &def.default) {
        (FieldType::Array(_) | FieldType::Map(_) | FieldType::Struct(_), _) | (_, None) => sample_type(&def.field_type),
        (_, Some(default)) => default.clone(),
    }
}

/// Collections get one element so their element type is exercised
fn sample_type(field_type: &FieldType) -> Value {
    match field_type {
        FieldType::String => Value::String(String::new()),
        FieldType::Integer => Value::from(0),
        FieldType::Number => Value::from(0.0),
        FieldType::Bool => Value::Bool(false),
        FieldType::Any => Value::Null,
        FieldType::Array(items) => Value::Array(vec![sample_type(items)]),
        FieldType::Map(inner) => {
            let mut entries = Map::new();
            entries.insert("key".to_string(), sample_type(inner));
            Value::Object(entries)
        }
        FieldType::Struct(fields) => Value::Object(sample_fields(fields)),
    }
}

/// Drop `null`s that stand for absent optional fields
fn strip_absent(fields: &Fields, obj: &mut Map<String, Value>) {
    obj.retain(|name, value| {
        !(value.is_null() && fields.get(name).map_or(false, |def| !def.is_mandatory()))
    });
    for (name, def) in fields {
        let Some(value) = obj.get_mut(name) else { continue };
        strip_nested(&def.field_type, value);
    }
}

fn strip_nested(field_type: &FieldType, value: &mut Value) {
    match (field_type, value) {
        (FieldType::Struct(nested), Value::Object(obj)) => strip_absent(nested, obj),
        (FieldType::Array(items), Value::Array(values)) => {
            for item in values.iter_mut() {
                strip_nested(items, item);
            }
        }
        (FieldType::Map(inner), Value::Object(obj)) => {
            for item in obj.values_mut() {
                strip_nested(inner, item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Item {
        value: String,
        #[serde(default)]
        title: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Doc {
        name: String,
        interval: String,
        items: Vec<Item>,
    }

    fn lineage() -> Arc<Lineage> {
        let mut item = Fields::new();
        item.insert("value".into(), FieldDef::string().required());
        item.insert("title".into(), FieldDef::string());
        let schema = Schema::builder((1, 0))
            .field("name", FieldDef::string().required())
            .field("interval", FieldDef::string().with_default("5m"))
            .field("items", FieldDef::array(FieldType::Struct(item)).with_default(json!([])))
            .build()
            .unwrap();
        Arc::new(Lineage::builder("doc").schema(schema).build().unwrap())
    }

    #[test]
    fn test_bind_compatible_type() {
        let bound = bind_latest(lineage(), &Doc::default()).unwrap();
        assert_eq!(bound.version(), SyntacticVersion::new(1, 0));
    }

    #[test]
    fn test_bind_missing_required_field() {
        #[derive(Default, Serialize, Deserialize)]
        struct NoName {
            interval: String,
        }
        let err = bind_latest(lineage(), &NoName::default()).unwrap_err();
        match err {
            LineageError::Bind { path, .. } => assert_eq!(path, "name"),
            other => panic!("Expected Bind error, got {:?}", other),
        }
    }

    #[test]
    fn test_bind_type_mismatch() {
        #[derive(Default, Serialize, Deserialize)]
        struct WrongType {
            name: u32,
        }
        let err = bind_latest(lineage(), &WrongType::default()).unwrap_err();
        assert!(err.to_string().contains("schema declares string, type has integer"));
    }

    #[test]
    fn test_bind_extra_field() {
        #[derive(Default, Serialize, Deserialize)]
        struct Extra {
            name: String,
            color: String,
        }
        let err = bind_latest(lineage(), &Extra::default()).unwrap_err();
        assert!(matches!(err, LineageError::Bind { ref path, .. } if path == "color"));
    }

    #[test]
    fn test_bind_non_object() {
        let err = bind_latest(lineage(), &42u32).unwrap_err();
        assert!(err.is_startup());
    }

    #[test]
    fn test_bind_optional_field_of_wrong_type() {
        #[derive(Default, Serialize, Deserialize)]
        struct LooseInterval {
            name: String,
            interval: Option<u32>,
            items: Vec<Item>,
        }
        let err = bind_latest(lineage(), &LooseInterval::default()).unwrap_err();
        match err {
            LineageError::Bind { path, reason, .. } => {
                assert_eq!(path, "interval");
                assert!(reason.contains("expected u32"));
            }
            other => panic!("Expected Bind error, got {:?}", other),
        }
    }

    #[test]
    fn test_bind_wrong_element_type() {
        #[derive(Default, Serialize, Deserialize)]
        struct BadItem {
            value: u32,
        }
        #[derive(Default, Serialize, Deserialize)]
        struct BadDoc {
            name: String,
            interval: String,
            items: Vec<BadItem>,
        }
        let err = bind_latest(lineage(), &BadDoc::default()).unwrap_err();
        assert!(matches!(err, LineageError::Bind { ref path, .. } if path == "items"));
        assert!(err.is_startup());
    }

    #[test]
    fn test_map_of_structs_decodes_and_encodes() {
        #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
        struct Panel {
            title: String,
            width: u32,
            #[serde(default)]
            note: Option<String>,
        }
        #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
        struct Board {
            panels: BTreeMap<String, Panel>,
        }

        let mut panel = Fields::new();
        panel.insert("title".into(), FieldDef::string().required());
        panel.insert("width".into(), FieldDef::integer().with_default(12));
        panel.insert("note".into(), FieldDef::string());
        let schema = Schema::builder((1, 0))
            .field("panels", FieldDef::map(FieldType::Struct(panel)).required())
            .build()
            .unwrap();
        let lineage = Arc::new(Lineage::builder("board").schema(schema).build().unwrap());
        let bound = bind_latest(lineage, &Board::default()).unwrap();

        let board = bound.decode(json!({ "panels": { "a": { "title": "x" } } })).unwrap();
        assert_eq!(board.panels["a"].width, 12);

        let encoded = bound.encode(&board).unwrap();
        assert_eq!(encoded, json!({ "panels": { "a": { "title": "x", "width": 12 } } }));
    }

    #[test]
    fn test_decode_fills_defaults() {
        let bound = bind_latest(lineage(), &Doc::default()).unwrap();
        let doc = bound.decode(json!({ "name": "a" })).unwrap();
        assert_eq!(doc.interval, "5m");
        assert!(doc.items.is_empty());
    }

    #[test]
    fn test_encode_strips_absent_optionals() {
        let bound = bind_latest(lineage(), &Doc::default()).unwrap();
        let doc = Doc {
            name: "a".into(),
            interval: "1m".into(),
            items: vec![Item { value: "x".into(), title: None }],
        };
        let encoded = bound.encode(&doc).unwrap();
        assert_eq!(encoded, json!({ "name": "a", "interval": "1m", "items": [{ "value": "x" }] }));
        assert_eq!(bound.decode(encoded).unwrap(), doc);
    }

    #[test]
    fn test_decode_rejects_invalid() {
        let bound = bind_latest(lineage(), &Doc::default()).unwrap();
        assert!(bound.decode(json!({ "interval": "1m" })).is_err());
    }
}
