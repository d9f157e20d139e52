//! Version detection
//!
//! Determines which schema version a raw payload was written against. An
//! explicit version tag wins; without one, every version is tried from the
//! latest down and the first schema that accepts the payload is taken.
//!
//! Lineages are expected to evolve additively, so an untagged payload
//! matching several versions is rare. [`TieBreak`] decides what happens when
//! it does.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::codec::FieldPath;
use crate::error::{LineageError, Result};
use crate::lineage::Lineage;
use crate::version::SyntacticVersion;

/// Policy for untagged payloads that validate against several versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Take the latest accepting version
    #[default]
    PreferLatest,
    /// Reject the payload as ambiguous
    Strict,
}

/// Detects the version of payloads for one lineage
#[derive(Debug, Clone)]
pub struct VersionDetector<'a> {
    lineage: &'a Lineage,
    version_field: Option<&'a FieldPath>,
    tie_break: TieBreak,
}

impl<'a> VersionDetector<'a> {
    pub fn new(lineage: &'a Lineage, version_field: Option<&'a FieldPath>, tie_break: TieBreak) -> Self {
        Self {
            lineage,
            version_field,
            tie_break,
        }
    }

    /// Determine the version `data` was authored against
    pub fn detect(&self, data: &Value) -> Result<SyntacticVersion> {
        let (tag, body) = self.split_tag(data);

        if let Some(tag) = tag {
            let version = SyntacticVersion::from_json(&tag)?;
            let schema = self.lineage.schema(version)?;
            schema.validate(&body)?;
            debug!(lineage = self.lineage.name(), %version, "version taken from tag");
            return Ok(version);
        }

        let mut accepted = self
            .lineage
            .schemas()
            .iter()
            .rev()
            .filter(|schema| schema.is_valid(&body))
            .map(|schema| schema.version());

        let Some(latest_match) = accepted.next() else {
            return Err(LineageError::Unrecognized {
                lineage: self.lineage.name().to_string(),
            });
        };

        if self.tie_break == TieBreak::Strict {
            let others: Vec<SyntacticVersion> = accepted.collect();
            if !others.is_empty() {
                let mut candidates = vec![latest_match];
                candidates.extend(others);
                return Err(LineageError::AmbiguousVersion { candidates });
            }
        }

        debug!(lineage = self.lineage.name(), version = %latest_match, "version inferred from structure");
        Ok(latest_match)
    }

    /// Separate the version tag from the rest of the payload
    fn split_tag(&self, data: &Value) -> (Option<Value>, Value) {
        let mut body = data.clone();
        let tag = self.version_field.and_then(|path| path.remove(&mut body));
        (tag, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, Schema};
    use serde_json::json;

    fn lineage() -> Lineage {
        Lineage::builder("detect")
            .schema(
                Schema::builder((1, 0))
                    .field("name", FieldDef::string().required())
                    .field("legacy", FieldDef::bool())
                    .build()
                    .unwrap(),
            )
            .schema(
                Schema::builder((2, 0))
                    .field("name", FieldDef::string().required())
                    .field("interval", FieldDef::string().with_default("5m"))
                    .build()
                    .unwrap(),
            )
            .structural_migrations()
            .build()
            .unwrap()
    }

    fn tag() -> FieldPath {
        FieldPath::parse("schemaVersion").unwrap()
    }

    #[test]
    fn test_untagged_valid_only_against_older() {
        let lineage = lineage();
        let detector = VersionDetector::new(&lineage, None, TieBreak::PreferLatest);
        let version = detector.detect(&json!({ "name": "foo", "legacy": true })).unwrap();
        assert_eq!(version, SyntacticVersion::new(1, 0));
    }

    #[test]
    fn test_untagged_prefers_latest() {
        let lineage = lineage();
        let detector = VersionDetector::new(&lineage, None, TieBreak::PreferLatest);
        let version = detector.detect(&json!({ "name": "foo" })).unwrap();
        assert_eq!(version, SyntacticVersion::new(2, 0));
    }

    #[test]
    fn test_strict_reports_ambiguity() {
        let lineage = lineage();
        let detector = VersionDetector::new(&lineage, None, TieBreak::Strict);
        match detector.detect(&json!({ "name": "foo" })) {
            Err(LineageError::AmbiguousVersion { candidates }) => {
                assert_eq!(candidates, vec![SyntacticVersion::new(2, 0), SyntacticVersion::new(1, 0)]);
            }
            other => panic!("Expected AmbiguousVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_tag_takes_precedence() {
        let lineage = lineage();
        let path = tag();
        let detector = VersionDetector::new(&lineage, Some(&path), TieBreak::PreferLatest);
        let version = detector
            .detect(&json!({ "name": "foo", "schemaVersion": "1.0" }))
            .unwrap();
        assert_eq!(version, SyntacticVersion::new(1, 0));
    }

    #[test]
    fn test_tag_must_match_payload() {
        let lineage = lineage();
        let path = tag();
        let detector = VersionDetector::new(&lineage, Some(&path), TieBreak::PreferLatest);
        let err = detector
            .detect(&json!({ "name": "foo", "interval": "1m", "schemaVersion": "1.0" }))
            .unwrap_err();
        assert!(matches!(err, LineageError::Validation { .. }));
    }

    #[test]
    fn test_unknown_tag() {
        let lineage = lineage();
        let path = tag();
        let detector = VersionDetector::new(&lineage, Some(&path), TieBreak::PreferLatest);
        let err = detector
            .detect(&json!({ "name": "foo", "schemaVersion": [9, 0] }))
            .unwrap_err();
        assert!(matches!(err, LineageError::VersionUnknown { .. }));
    }

    #[test]
    fn test_unrecognized() {
        let lineage = lineage();
        let detector = VersionDetector::new(&lineage, None, TieBreak::PreferLatest);
        let err = detector.detect(&json!({ "title": "foo" })).unwrap_err();
        assert!(matches!(err, LineageError::Unrecognized { .. }));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let lineage = lineage();
        let detector = VersionDetector::new(&lineage, None, TieBreak::PreferLatest);
        let data = json!({ "name": "foo" });
        assert_eq!(detector.detect(&data).unwrap(), detector.detect(&data).unwrap());
    }
}
