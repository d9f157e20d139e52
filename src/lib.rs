//! Schema Lineage
//!
//! Versioned schema lineages for structured data kinds, and translation of
//! payloads written at any historical version into one current native type.
//!
//! ## Features
//!
//! - **Lineages**: Gap-free chains of schema versions, validated once at start-up
//! - **Migrations**: Forward and backward functions between every adjacent pair
//! - **Lacunas**: Every information gap a translation introduces is recorded
//! - **Version Detection**: Explicit version tags, or inference from structure
//! - **Type Binding**: Native types checked against a schema version without reflection
//! - **Version Multiplexing**: Bytes at any version in, one native type out
//!
//! ## Architecture
//!
//! ```text
//! KindRegistry
//! └── Kind (name, maturity, current version)
//!     └── Lineage
//!         ├── Schema v0.0 ──Migration──> Schema v0.1 ──Migration──> Schema v1.0
//!         └── ConvergentSchema<T> (bound to the current version)
//!             └── ValueMux<T>: Codec -> VersionDetector -> Translator -> T
//! ```

pub mod binder;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod detect;
pub mod error;
pub mod kind;
pub mod kinds;
pub mod lacuna;
pub mod lineage;
pub mod migration;
pub mod schema;
pub mod translate;
pub mod version;
pub mod vmux;

pub use binder::{bind, bind_latest, ConvergentSchema};
pub use checksum::Checksum;
pub use codec::{Codec, FieldPath, JsonCodec};
pub use config::LineageConfig;
pub use detect::{TieBreak, VersionDetector};
pub use error::{LineageError, Result};
pub use kind::{Kind, KindMeta, KindRegistry, Maturity, TypedKind};
pub use lacuna::{Lacuna, LacunaCode, Severity};
pub use lineage::{Lineage, LineageBuilder, MigrationPath};
pub use migration::{Direction, Migration, MigrationFailure};
pub use schema::{Constraint, FieldDef, FieldType, Fields, Schema};
pub use translate::{Translation, Translator};
pub use version::SyntacticVersion;
pub use vmux::{DecodeError, EncodeError, Stage, TranslationResult, ValueMux};
