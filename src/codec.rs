//! Wire codecs
//!
//! A codec turns payload bytes into the generic `serde_json::Value` lineages
//! operate on, and back. Codecs also know where a payload keeps its version
//! tag, if it has one.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{LineageError, Result};

/// Dotted location of a field inside a payload, e.g. `metadata.schemaVersion`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(LineageError::Parse {
                input: "field path".to_string(),
                reason: format!("'{}' has an empty segment", path),
            });
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn get<'v>(&self, data: &'v Value) -> Option<&'v Value> {
        self.0.iter().try_fold(data, |current, segment| current.get(segment))
    }

    /// Remove the field, pruning parents it leaves empty
    pub fn remove(&self, data: &mut Value) -> Option<Value> {
        remove_at(data, &self.0)
    }

    /// Set the field, creating intermediate objects as needed
    ///
    /// Fails if an intermediate segment holds something other than an object.
    pub fn insert(&self, data: &mut Value, value: Value) -> Result<()> {
        let Some((last, parents)) = self.0.split_last() else {
            return Ok(());
        };
        let mut current = data;
        for segment in parents {
            let obj = current.as_object_mut().ok_or_else(|| self.not_an_object())?;
            current = obj
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let obj = current.as_object_mut().ok_or_else(|| self.not_an_object())?;
        obj.insert(last.clone(), value);
        Ok(())
    }

    fn not_an_object(&self) -> LineageError {
        LineageError::Serialize {
            input: "version tag".to_string(),
            reason: format!("cannot write '{}' into a non-object value", self),
        }
    }
}

fn remove_at(data: &mut Value, segments: &[String]) -> Option<Value> {
    let obj = data.as_object_mut()?;
    match segments {
        [] => None,
        [last] => obj.remove(last),
        [first, rest @ ..] => {
            let child = obj.get_mut(first)?;
            let removed = remove_at(child, rest);
            if removed.is_some() && child.as_object().map_or(false, Map::is_empty) {
                obj.remove(first);
            }
            removed
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Converts payload bytes to and from generic structured data
pub trait Codec: Send + Sync {
    /// Name used to identify the input in errors (e.g. `playlist.json`)
    fn name(&self) -> &str;

    /// Where payloads carry their version tag, if anywhere
    fn version_field(&self) -> Option<&FieldPath>;

    fn to_structured(&self, bytes: &[u8]) -> Result<Value>;

    fn from_structured(&self, data: &Value) -> Result<Vec<u8>>;
}

/// JSON codec
#[derive(Debug, Clone)]
pub struct JsonCodec {
    name: String,
    version_field: Option<FieldPath>,
    pretty: bool,
}

impl JsonCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_field: None,
            pretty: false,
        }
    }

    pub fn with_version_field(mut self, path: FieldPath) -> Self {
        self.version_field = Some(path);
        self
    }

    /// Emit indented JSON
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn version_field(&self) -> Option<&FieldPath> {
        self.version_field.as_ref()
    }

    fn to_structured(&self, bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| LineageError::Parse {
            input: self.name.clone(),
            reason: e.to_string(),
        })
    }

    fn from_structured(&self, data: &Value) -> Result<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(data)
        } else {
            serde_json::to_vec(data)
        };
        encoded.map_err(|e| LineageError::Serialize {
            input: self.name.clone(),
            reason: e.to_string(),
        })
    }
}
