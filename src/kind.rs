//! Kinds and the kind registry
//!
//! A kind is a named lineage plus plain metadata. The registry maps kind
//! names to kinds; it is filled once at start-up and only read afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::binder::{bind, ConvergentSchema};
use crate::checksum::Checksum;
use crate::codec::Codec;
use crate::error::{LineageError, Result};
use crate::lineage::Lineage;
use crate::version::SyntacticVersion;
use crate::vmux::{DecodeError, EncodeError, TranslationResult, ValueMux};

/// How settled a kind's schema is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    Merged,
    Experimental,
    Stable,
    Mature,
}

impl fmt::Display for Maturity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Maturity::Merged => "merged",
            Maturity::Experimental => "experimental",
            Maturity::Stable => "stable",
            Maturity::Mature => "mature",
        };
        f.pad(name)
    }
}

/// Descriptive metadata of a kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindMeta {
    pub name: String,
    pub plural_name: String,
    pub maturity: Maturity,
    /// Version native code is bound to
    pub current_version: SyntacticVersion,
}

/// A named lineage with metadata
#[derive(Debug, Clone)]
pub struct Kind {
    meta: KindMeta,
    lineage: Arc<Lineage>,
}

impl Kind {
    /// Fails if the current version is not part of the lineage
    pub fn new(meta: KindMeta, lineage: Arc<Lineage>) -> Result<Self> {
        lineage.schema(meta.current_version)?;
        Ok(Self { meta, lineage })
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta(&self) -> &KindMeta {
        &self.meta
    }

    pub fn maturity(&self) -> Maturity {
        self.meta.maturity
    }

    pub fn lineage(&self) -> &Arc<Lineage> {
        &self.lineage
    }

    pub fn fingerprint(&self) -> &Checksum {
        self.lineage.fingerprint()
    }
}

/// A kind whose current version is bound to the native type `T`
#[derive(Debug, Clone)]
pub struct TypedKind<T> {
    kind: Kind,
    mux: ValueMux<T>,
}

impl<T> TypedKind<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Bind `T` to the kind's current version and wire up a value mux
    pub fn new(kind: Kind, zero: &T, codec: Arc<dyn Codec>) -> Result<Self> {
        let schema = bind(Arc::clone(kind.lineage()), kind.meta().current_version, zero)?;
        let mux = ValueMux::new(schema, codec);
        Ok(Self { kind, mux })
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn meta(&self) -> &KindMeta {
        self.kind.meta()
    }

    pub fn maturity(&self) -> Maturity {
        self.kind.maturity()
    }

    pub fn lineage(&self) -> &Arc<Lineage> {
        self.kind.lineage()
    }

    pub fn convergent_schema(&self) -> &ConvergentSchema<T> {
        self.mux.convergent_schema()
    }

    pub fn value_mux(&self) -> &ValueMux<T> {
        &self.mux
    }

    /// Decode JSON written at any version of the kind into `T`
    pub fn json_value_mux(&self, bytes: &[u8]) -> std::result::Result<TranslationResult<T>, DecodeError> {
        self.mux.decode(bytes)
    }

    pub fn encode(&self, value: &T) -> std::result::Result<Vec<u8>, EncodeError> {
        self.mux.encode(value)
    }
}

/// Kinds by exact name
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: BTreeMap<String, Kind>,
}

impl KindRegistry {
    pub fn builder() -> KindRegistryBuilder {
        KindRegistryBuilder { kinds: Vec::new() }
    }

    pub fn get(&self, name: &str) -> Result<&Kind> {
        self.kinds
            .get(name)
            .ok_or_else(|| LineageError::KindNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Builder for [`KindRegistry`]
pub struct KindRegistryBuilder {
    kinds: Vec<Kind>,
}

impl KindRegistryBuilder {
    pub fn register(mut self, kind: Kind) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Fails on the first duplicate kind name; nothing is registered then
    pub fn build(self) -> Result<KindRegistry> {
        let mut kinds = BTreeMap::new();
        for kind in self.kinds {
            let name = kind.name().to_string();
            if kinds.contains_key(&name) {
                return Err(LineageError::KindAlreadyExists(name));
            }
            kinds.insert(name, kind);
        }
        info!(kinds = kinds.len(), "kind registry built");
        Ok(KindRegistry { kinds })
    }
}
