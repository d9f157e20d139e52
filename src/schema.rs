//! Schema types and structures
//!
//! A [`Schema`] is one immutable node of a lineage: a version plus the set of
//! fields a payload at that version may carry. Validation is structural
//! (field presence, JSON types, constraints) and can be tightened with an
//! attached JSON Schema document.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use jsonschema::JSONSchema;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{LineageError, Result};
use crate::lacuna::join_path;
use crate::version::SyntacticVersion;

/// Field set of a schema or of a nested struct
pub type Fields = BTreeMap<String, FieldDef>;

/// JSON-level type of a field
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Bool,
    /// Any JSON value, unchecked
    Any,
    Array(Box<FieldType>),
    /// Object with arbitrary keys and uniform values
    Map(Box<FieldType>),
    /// Object with declared fields
    Struct(Fields),
}

impl FieldType {
    /// Name used in declarations and error messages
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::Any => "any",
            FieldType::Array(_) => "array",
            FieldType::Map(_) => "map",
            FieldType::Struct(_) => "struct",
        }
    }

    /// Shallow JSON type check, ignoring element types and nested fields
    pub fn accepts_kind(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Any => true,
            FieldType::Array(_) => value.is_array(),
            FieldType::Map(_) | FieldType::Struct(_) => value.is_object(),
        }
    }
}

/// Value constraint on a field
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Value must equal one of the listed values
    OneOf(Vec<Value>),
    /// String value must match the pattern
    Pattern(Regex),
    /// Inclusive bounds on a number, or on the length of a string or array
    Range { min: Option<f64>, max: Option<f64> },
}

impl Constraint {
    fn check(&self, value: &Value) -> std::result::Result<(), String> {
        match self {
            Constraint::OneOf(allowed) => {
                if allowed.contains(value) {
                    Ok(())
                } else {
                    Err(format!("value {} is not one of {}", value, Value::Array(allowed.clone())))
                }
            }
            Constraint::Pattern(re) => match value.as_str() {
                Some(s) if re.is_match(s) => Ok(()),
                Some(s) => Err(format!("'{}' does not match pattern '{}'", s, re.as_str())),
                None => Err("pattern constraint applies to strings only".to_string()),
            },
            Constraint::Range { min, max } => {
                let measured = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => Some(s.chars().count() as f64),
                    Value::Array(items) => Some(items.len() as f64),
                    _ => None,
                };
                let Some(measured) = measured else {
                    return Err(format!("range constraint does not apply to {}", value));
                };
                if min.map_or(false, |m| measured < m) || max.map_or(false, |m| measured > m) {
                    Err(format!(
                        "{} is outside range [{}, {}]",
                        measured,
                        min.map_or("-inf".to_string(), |m| m.to_string()),
                        max.map_or("inf".to_string(), |m| m.to_string()),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Declaration of a single field
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub field_type: FieldType,
    /// Must be present on input (fields with a default never are)
    pub required: bool,
    pub default: Option<Value>,
    pub constraints: Vec<Constraint>,
}

impl FieldDef {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            constraints: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn bool() -> Self {
        Self::new(FieldType::Bool)
    }

    pub fn any() -> Self {
        Self::new(FieldType::Any)
    }

    pub fn array(items: FieldType) -> Self {
        Self::new(FieldType::Array(Box::new(items)))
    }

    pub fn map(values: FieldType) -> Self {
        Self::new(FieldType::Map(Box::new(values)))
    }

    pub fn structure(fields: Fields) -> Self {
        Self::new(FieldType::Struct(fields))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default; a defaulted field is not required on input
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self.required = false;
        self
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.constraints
            .push(Constraint::OneOf(values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn pattern(mut self, re: Regex) -> Self {
        self.constraints.push(Constraint::Pattern(re));
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraints.push(Constraint::Range { min, max });
        self
    }

    /// Whether input must carry this field
    pub fn is_mandatory(&self) -> bool {
        self.required && self.default.is_none()
    }
}

/// A JSON Schema document attached to a schema version
struct JsonSchemaCheck {
    raw: Value,
    compiled: JSONSchema,
}

impl fmt::Debug for JsonSchemaCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaCheck").field("raw", &self.raw).finish()
    }
}

/// A structural violation found during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Violation {
    pub path: String,
    pub reason: String,
}

impl Violation {
    fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

type Checked = std::result::Result<(), Violation>;

/// A single schema version of a lineage
#[derive(Debug, Clone)]
pub struct Schema {
    version: SyntacticVersion,
    fields: Fields,
    open: bool,
    json_schema: Option<Arc<JsonSchemaCheck>>,
}

impl Schema {
    /// Start declaring a schema at `version`
    pub fn builder(version: impl Into<SyntacticVersion>) -> SchemaBuilder {
        SchemaBuilder {
            version: version.into(),
            fields: Fields::new(),
            open: false,
            json_schema: None,
        }
    }

    pub fn version(&self) -> SyntacticVersion {
        self.version
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Whether fields not declared here are tolerated
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Validate a payload against this schema
    pub fn validate(&self, data: &Value) -> Result<()> {
        self.check(data).map_err(|v| LineageError::Validation {
            version: self.version,
            path: v.path,
            reason: v.reason,
        })
    }

    pub fn is_valid(&self, data: &Value) -> bool {
        self.check(data).is_ok()
    }

    pub(crate) fn check(&self, data: &Value) -> Checked {
        let Value::Object(obj) = data else {
            return Err(Violation::new("", format!("expected an object, found {}", json_kind(data))));
        };
        check_fields(&self.fields, obj, "", self.open)?;

        if let Some(js) = &self.json_schema {
            if let Err(mut errors) = js.compiled.validate(data) {
                if let Some(first) = errors.next() {
                    let path = first.instance_path.to_string();
                    return Err(Violation::new(
                        path.trim_start_matches('/').replace('/', "."),
                        first.to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Fill absent defaulted fields in place, recursing into structs
    ///
    /// Returns the paths that were filled.
    pub fn apply_defaults(&self, data: &mut Value) -> Vec<String> {
        let mut filled = Vec::new();
        if let Value::Object(obj) = data {
            fill_defaults(&self.fields, obj, "", &mut filled);
        }
        filled
    }

    /// Canonical JSON declaration of this schema
    ///
    /// The inverse of [`Schema::from_declaration`].
    pub fn declaration(&self) -> Value {
        let mut decl = Map::new();
        decl.insert("version".to_string(), self.version.to_json());
        decl.insert("open".to_string(), Value::Bool(self.open));
        decl.insert("fields".to_string(), fields_declaration(&self.fields));
        if let Some(js) = &self.json_schema {
            decl.insert("jsonSchema".to_string(), js.raw.clone());
        }
        Value::Object(decl)
    }

    /// Read a schema from a JSON declaration document
    ///
    /// ```json
    /// { "version": "1.0",
    ///   "fields": { "name": { "type": "string", "required": true },
    ///               "interval": { "type": "string", "default": "5m" } } }
    /// ```
    pub fn from_declaration(decl: &Value) -> Result<Self> {
        let version = decl
            .get("version")
            .ok_or_else(|| LineageError::InvalidVersion("declaration has no version".to_string()))
            .and_then(SyntacticVersion::from_json)?;

        let invalid = |reason: String| LineageError::InvalidSchema { version, reason };

        let fields_decl = decl
            .get("fields")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid("'fields' must be an object".to_string()))?;

        let mut builder = Schema::builder(version);
        for (name, field_decl) in fields_decl {
            let def = parse_field(field_decl).map_err(|e| invalid(format!("field '{}': {}", name, e)))?;
            builder = builder.field(name.clone(), def);
        }
        if decl.get("open").and_then(Value::as_bool).unwrap_or(false) {
            builder = builder.open();
        }
        if let Some(js) = decl.get("jsonSchema") {
            builder = builder.json_schema(js.clone());
        }
        builder.build()
    }
}

/// Builder for [`Schema`]
pub struct SchemaBuilder {
    version: SyntacticVersion,
    fields: Fields,
    open: bool,
    json_schema: Option<Value>,
}

impl SchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Tolerate undeclared fields
    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    /// Additionally require payloads to satisfy a JSON Schema document
    pub fn json_schema(mut self, schema: Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    /// Finish the schema, checking every default against its own field
    pub fn build(self) -> Result<Schema> {
        let version = self.version;
        check_defaults(&self.fields, "", self.open).map_err(|v| LineageError::InvalidSchema {
            version,
            reason: format!("default of '{}' is invalid: {}", v.path, v.reason),
        })?;

        let json_schema = match self.json_schema {
            Some(raw) => {
                let compiled = JSONSchema::compile(&raw).map_err(|e| LineageError::InvalidSchema {
                    version,
                    reason: format!("JSON Schema does not compile: {}", e),
                })?;
                Some(Arc::new(JsonSchemaCheck { raw, compiled }))
            }
            None => None,
        };

        Ok(Schema {
            version,
            fields: self.fields,
            open: self.open,
            json_schema,
        })
    }
}

// =============================================================================
// Validation
// =============================================================================

fn check_fields(fields: &Fields, obj: &Map<String, Value>, path: &str, open: bool) -> Checked {
    for (name, def) in fields {
        let field_path = join_path(path, name);
        match obj.get(name) {
            None | Some(Value::Null) => {
                if def.is_mandatory() {
                    return Err(Violation::new(field_path, "required field is missing"));
                }
            }
            Some(value) => check_value(def, value, &field_path, open)?,
        }
    }

    if !open {
        if let Some(unknown) = obj.keys().find(|k| !fields.contains_key(*k)) {
            return Err(Violation::new(join_path(path, unknown), "field is not declared"));
        }
    }
    Ok(())
}

fn check_value(def: &FieldDef, value: &Value, path: &str, open: bool) -> Checked {
    check_type(&def.field_type, value, path, open)?;
    for constraint in &def.constraints {
        constraint.check(value).map_err(|reason| Violation::new(path, reason))?;
    }
    Ok(())
}

fn check_type(field_type: &FieldType, value: &Value, path: &str, open: bool) -> Checked {
    if !field_type.accepts_kind(value) {
        return Err(Violation::new(
            path,
            format!("expected {}, found {}", field_type.name(), json_kind(value)),
        ));
    }
    match (field_type, value) {
        (FieldType::Array(items), Value::Array(values)) => {
            for (i, item) in values.iter().enumerate() {
                check_type(items, item, &format!("{}[{}]", path, i), open)?;
            }
        }
        (FieldType::Map(values), Value::Object(obj)) => {
            for (key, item) in obj {
                check_type(values, item, &join_path(path, key), open)?;
            }
        }
        (FieldType::Struct(fields), Value::Object(obj)) => check_fields(fields, obj, path, open)?,
        _ => {}
    }
    Ok(())
}

fn check_defaults(fields: &Fields, path: &str, open: bool) -> Checked {
    for (name, def) in fields {
        let field_path = join_path(path, name);
        if let Some(default) = &def.default {
            check_value(def, default, &field_path, open)?;
        }
        if let FieldType::Struct(nested) = &def.field_type {
            check_defaults(nested, &field_path, open)?;
        }
    }
    Ok(())
}

fn fill_defaults(fields: &Fields, obj: &mut Map<String, Value>, path: &str, filled: &mut Vec<String>) {
    for (name, def) in fields {
        let field_path = join_path(path, name);
        let absent = matches!(obj.get(name), None | Some(Value::Null));
        if absent {
            if let Some(default) = &def.default {
                obj.insert(name.clone(), default.clone());
                filled.push(field_path.clone());
            }
        }
        if let Some(value) = obj.get_mut(name) {
            fill_nested(&def.field_type, value, &field_path, filled);
        }
    }
}

fn fill_nested(field_type: &FieldType, value: &mut Value, path: &str, filled: &mut Vec<String>) {
    match (field_type, value) {
        (FieldType::Struct(fields), Value::Object(obj)) => fill_defaults(fields, obj, path, filled),
        (FieldType::Array(items), Value::Array(values)) => {
            for (i, item) in values.iter_mut().enumerate() {
                fill_nested(items, item, &format!("{}[{}]", path, i), filled);
            }
        }
        (FieldType::Map(inner), Value::Object(obj)) => {
            for (key, item) in obj.iter_mut() {
                fill_nested(inner, item, &join_path(path, key), filled);
            }
        }
        _ => {}
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Declarations
// =============================================================================

fn fields_declaration(fields: &Fields) -> Value {
    let decl = fields
        .iter()
        .map(|(name, def)| (name.clone(), field_declaration(def)))
        .collect::<Map<_, _>>();
    Value::Object(decl)
}

fn field_declaration(def: &FieldDef) -> Value {
    let mut decl = type_declaration(&def.field_type);
    if def.required {
        decl.insert("required".to_string(), Value::Bool(true));
    }
    if let Some(default) = &def.default {
        decl.insert("default".to_string(), default.clone());
    }
    for constraint in &def.constraints {
        match constraint {
            Constraint::OneOf(values) => {
                decl.insert("oneOf".to_string(), Value::Array(values.clone()));
            }
            Constraint::Pattern(re) => {
                decl.insert("pattern".to_string(), Value::String(re.as_str().to_string()));
            }
            Constraint::Range { min, max } => {
                if let Some(min) = min {
                    decl.insert("min".to_string(), Value::from(*min));
                }
                if let Some(max) = max {
                    decl.insert("max".to_string(), Value::from(*max));
                }
            }
        }
    }
    Value::Object(decl)
}

fn type_declaration(field_type: &FieldType) -> Map<String, Value> {
    let mut decl = Map::new();
    decl.insert("type".to_string(), Value::String(field_type.name().to_string()));
    match field_type {
        FieldType::Array(inner) => {
            decl.insert("items".to_string(), Value::Object(type_declaration(inner)));
        }
        FieldType::Map(inner) => {
            decl.insert("values".to_string(), Value::Object(type_declaration(inner)));
        }
        FieldType::Struct(fields) => {
            decl.insert("fields".to_string(), fields_declaration(fields));
        }
        _ => {}
    }
    decl
}

fn parse_field(decl: &Value) -> std::result::Result<FieldDef, String> {
    let mut def = FieldDef::new(parse_type(decl)?);
    if decl.get("required").and_then(Value::as_bool).unwrap_or(false) {
        def = def.required();
    }
    if let Some(default) = decl.get("default") {
        def = def.with_default(default.clone());
    }
    if let Some(values) = decl.get("oneOf") {
        let values = values.as_array().ok_or("'oneOf' must be an array")?;
        def = def.one_of(values.iter().cloned());
    }
    if let Some(pattern) = decl.get("pattern") {
        let pattern = pattern.as_str().ok_or("'pattern' must be a string")?;
        let re = Regex::new(pattern).map_err(|e| format!("bad pattern: {}", e))?;
        def = def.pattern(re);
    }
    let min = decl.get("min").and_then(Value::as_f64);
    let max = decl.get("max").and_then(Value::as_f64);
    if min.is_some() || max.is_some() {
        def = def.range(min, max);
    }
    Ok(def)
}

fn parse_type(decl: &Value) -> std::result::Result<FieldType, String> {
    let type_name = decl
        .get("type")
        .and_then(Value::as_str)
        .ok_or("missing 'type'")?;

    let field_type = match type_name {
        "string" => FieldType::String,
        "integer" => FieldType::Integer,
        "number" => FieldType::Number,
        "bool" => FieldType::Bool,
        "any" => FieldType::Any,
        "array" => FieldType::Array(Box::new(parse_type(decl.get("items").ok_or("array without 'items'")?)?)),
        "map" => FieldType::Map(Box::new(parse_type(decl.get("values").ok_or("map without 'values'")?)?)),
        "struct" => {
            let nested = decl
                .get("fields")
                .and_then(Value::as_object)
                .ok_or("struct without 'fields'")?;
            let mut fields = Fields::new();
            for (name, field_decl) in nested {
                fields.insert(name.clone(), parse_field(field_decl)?);
            }
            FieldType::Struct(fields)
        }
        other => return Err(format!("unknown type '{}'", other)),
    };
    Ok(field_type)
}
