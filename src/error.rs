//! Error types for lineages and translation

use thiserror::Error;

use crate::version::SyntacticVersion;

/// Result type for lineage operations
pub type Result<T> = std::result::Result<T, LineageError>;

/// Lineage errors
///
/// `LineageIntegrity`, `InvalidSchema`, `Bind` and `KindAlreadyExists` are
/// start-up errors: the lineage, binding or registry being built is never
/// handed out. Everything else is raised per payload and leaves shared state
/// untouched.
#[derive(Error, Debug)]
pub enum LineageError {
    #[error("Lineage '{lineage}' is malformed: {reason}")]
    LineageIntegrity { lineage: String, reason: String },

    #[error("Schema v{version} is invalid: {reason}")]
    InvalidSchema {
        version: SyntacticVersion,
        reason: String,
    },

    #[error("Cannot bind type to schema v{version} at '{path}': {reason}")]
    Bind {
        version: SyntacticVersion,
        path: String,
        reason: String,
    },

    #[error("Version {version} is not declared in lineage '{lineage}'")]
    VersionUnknown {
        lineage: String,
        version: SyntacticVersion,
    },

    #[error("Payload does not match any schema version in lineage '{lineage}'")]
    Unrecognized { lineage: String },

    #[error("Untagged payload matches several schema versions: {}", join_versions(.candidates))]
    AmbiguousVersion { candidates: Vec<SyntacticVersion> },

    #[error("Migration v{from} -> v{to} failed: {reason}")]
    Migration {
        from: SyntacticVersion,
        to: SyntacticVersion,
        reason: String,
    },

    #[error("Payload is not valid against schema v{version} at '{path}': {reason}")]
    Validation {
        version: SyntacticVersion,
        path: String,
        reason: String,
    },

    #[error("Cannot parse {input}: {reason}")]
    Parse { input: String, reason: String },

    #[error("Cannot serialize {input}: {reason}")]
    Serialize { input: String, reason: String },

    #[error("Kind not found: {0}")]
    KindNotFound(String),

    #[error("Kind already registered: {0}")]
    KindAlreadyExists(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),
}

impl LineageError {
    /// Whether this error can only happen while building lineages and bindings
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            LineageError::LineageIntegrity { .. }
                | LineageError::InvalidSchema { .. }
                | LineageError::Bind { .. }
                | LineageError::KindAlreadyExists(_)
        )
    }

    pub(crate) fn integrity(lineage: &str, reason: impl Into<String>) -> Self {
        LineageError::LineageIntegrity {
            lineage: lineage.to_string(),
            reason: reason.into(),
        }
    }
}

fn join_versions(versions: &[SyntacticVersion]) -> String {
    versions
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
