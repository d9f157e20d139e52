//! Version multiplexing
//!
//! A [`ValueMux`] accepts payload bytes written at any version of a lineage
//! and produces a value of the bound native type:
//!
//! ```text
//! bytes ─ Codec ─> Value ─ VersionDetector ─> source version
//!                    └──── Translator (source -> bound) ─> Value ─ ConvergentSchema ─> T
//! ```
//!
//! Encoding runs the other way and never translates: output is always at the
//! bound version.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::binder::ConvergentSchema;
use crate::codec::Codec;
use crate::detect::{TieBreak, VersionDetector};
use crate::error::LineageError;
use crate::lacuna::{has_warnings, Lacuna};
use crate::translate::Translator;
use crate::version::SyntacticVersion;

/// A decoded value and the gaps introduced translating it
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationResult<T> {
    pub value: T,
    pub lacunas: Vec<Lacuna>,
    /// Version the payload was written against
    pub source_version: SyntacticVersion,
}

/// Decode pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Detect,
    Translate,
    Bind,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::Detect => "version detection",
            Stage::Translate => "translation",
            Stage::Bind => "decode",
        };
        f.pad(name)
    }
}

/// Decoding failed at one stage of the pipeline
#[derive(Error, Debug)]
#[error("{input}: {stage} failed: {source}")]
pub struct DecodeError {
    pub input: String,
    pub stage: Stage,
    #[source]
    pub source: LineageError,
}

/// Encoding failed
#[derive(Error, Debug)]
#[error("{input}: encode failed: {source}")]
pub struct EncodeError {
    pub input: String,
    #[source]
    pub source: LineageError,
}

/// Routes payloads of any version of a lineage to one native type
pub struct ValueMux<T> {
    schema: ConvergentSchema<T>,
    codec: Arc<dyn Codec>,
    tie_break: TieBreak,
}

impl<T> Clone for ValueMux<T> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            codec: Arc::clone(&self.codec),
            tie_break: self.tie_break,
        }
    }
}

impl<T> fmt::Debug for ValueMux<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueMux")
            .field("schema", &self.schema)
            .field("codec", &self.codec.name())
            .field("tie_break", &self.tie_break)
            .finish()
    }
}

impl<T> ValueMux<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(schema: ConvergentSchema<T>, codec: Arc<dyn Codec>) -> Self {
        Self {
            schema,
            codec,
            tie_break: TieBreak::default(),
        }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn convergent_schema(&self) -> &ConvergentSchema<T> {
        &self.schema
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    /// Decode payload bytes written at any version of the lineage
    pub fn decode(&self, bytes: &[u8]) -> Result<TranslationResult<T>, DecodeError> {
        let data = self
            .codec
            .to_structured(bytes)
            .map_err(|e| self.decode_error(Stage::Parse, e))?;
        self.decode_value(data)
    }

    /// Decode already-parsed structured data
    pub fn decode_value(&self, mut data: Value) -> Result<TranslationResult<T>, DecodeError> {
        let lineage = self.schema.lineage();
        let version_field = self.codec.version_field();

        let source_version = VersionDetector::new(lineage, version_field, self.tie_break)
            .detect(&data)
            .map_err(|e| self.decode_error(Stage::Detect, e))?;

        if let Some(path) = version_field {
            path.remove(&mut data);
        }

        let translation = Translator::new(lineage)
            .translate(data, source_version, self.schema.version())
            .map_err(|e| self.decode_error(Stage::Translate, e))?;

        let value = self
            .schema
            .decode(translation.value)
            .map_err(|e| self.decode_error(Stage::Bind, e))?;

        if has_warnings(&translation.lacunas) {
            warn!(
                input = self.codec.name(),
                from = %source_version,
                to = %self.schema.version(),
                lacunas = translation.lacunas.len(),
                "payload translated with information loss"
            );
        } else {
            debug!(input = self.codec.name(), from = %source_version, "payload decoded");
        }

        Ok(TranslationResult {
            value,
            lacunas: translation.lacunas,
            source_version,
        })
    }

    /// Encode a value as payload bytes at the bound version
    pub fn encode(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        let encode_error = |source: LineageError| EncodeError {
            input: self.codec.name().to_string(),
            source,
        };

        let mut data = self.schema.encode(value).map_err(encode_error)?;
        if let Some(path) = self.codec.version_field() {
            path.insert(&mut data, self.schema.version().to_json())
                .map_err(encode_error)?;
        }
        self.codec.from_structured(&data).map_err(encode_error)
    }

    fn decode_error(&self, stage: Stage, source: LineageError) -> DecodeError {
        DecodeError {
            input: self.codec.name().to_string(),
            stage,
            source,
        }
    }
}
