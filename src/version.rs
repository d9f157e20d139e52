//! Schema versioning utilities
//!
//! Lineage versions are a `(major, minor)` pair. A minor bump is a change that
//! old readers can absorb, a major bump is anything else. Within a lineage the
//! successor of `M.m` is always `M.(m+1)` or `(M+1).0`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::LineageError;

/// Version of a single schema in a lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyntacticVersion {
    pub major: u32,
    pub minor: u32,
}

impl SyntacticVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse from a string such as `"1.0"` or `"v1.0"`
    pub fn parse(version_str: &str) -> Result<Self, LineageError> {
        let trimmed = version_str.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let (major, minor) = trimmed
            .split_once('.')
            .ok_or_else(|| LineageError::InvalidVersion(version_str.to_string()))?;

        let parse_part = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| LineageError::InvalidVersion(version_str.to_string()))
        };

        Ok(Self::new(parse_part(major)?, parse_part(minor)?))
    }

    /// Read a version out of a JSON tag value
    ///
    /// Accepts `"1.0"` as well as the `[1, 0]` array form.
    pub fn from_json(value: &Value) -> Result<Self, LineageError> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Array(parts) if parts.len() == 2 => {
                let part = |v: &Value| {
                    v.as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| LineageError::InvalidVersion(value.to_string()))
                };
                Ok(Self::new(part(&parts[0])?, part(&parts[1])?))
            }
            other => Err(LineageError::InvalidVersion(other.to_string())),
        }
    }

    /// JSON tag form written by encoders (`"1.0"`)
    pub fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }

    /// Whether `next` may directly follow this version in a lineage
    pub fn is_successor(&self, next: &SyntacticVersion) -> bool {
        let minor_bump = next.major == self.major && Some(next.minor) == self.minor.checked_add(1);
        let major_bump = Some(next.major) == self.major.checked_add(1) && next.minor == 0;
        minor_bump || major_bump
    }
}

impl fmt::Display for SyntacticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for SyntacticVersion {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<(u32, u32)> for SyntacticVersion {
    fn from((major, minor): (u32, u32)) -> Self {
        Self::new(major, minor)
    }
}

impl Serialize for SyntacticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SyntacticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v = SyntacticVersion::parse("1.2").unwrap();
        assert_eq!(v, SyntacticVersion::new(1, 2));
        assert_eq!(v.to_string(), "1.2");
    }

    #[test]
    fn test_version_with_v_prefix() {
        let v = SyntacticVersion::parse("v2.0").unwrap();
        assert_eq!(v, SyntacticVersion::new(2, 0));
    }

    #[test]
    fn test_invalid_versions() {
        assert!(SyntacticVersion::parse("1").is_err());
        assert!(SyntacticVersion::parse("1.x").is_err());
        assert!(SyntacticVersion::parse("1.2.3").is_err());
        assert!(SyntacticVersion::from_json(&serde_json::json!(3)).is_err());
    }

    #[test]
    fn test_json_tag_forms() {
        let from_str = SyntacticVersion::from_json(&serde_json::json!("0.1")).unwrap();
        let from_arr = SyntacticVersion::from_json(&serde_json::json!([0, 1])).unwrap();
        assert_eq!(from_str, from_arr);
        assert_eq!(from_str.to_json(), serde_json::json!("0.1"));
    }

    #[test]
    fn test_successor_rule() {
        let v = SyntacticVersion::new(1, 0);
        assert!(v.is_successor(&SyntacticVersion::new(1, 1)));
        assert!(v.is_successor(&SyntacticVersion::new(2, 0)));
        assert!(!v.is_successor(&SyntacticVersion::new(1, 2)));
        assert!(!v.is_successor(&SyntacticVersion::new(2, 1)));
        assert!(!v.is_successor(&SyntacticVersion::new(3, 0)));
    }

    #[test]
    fn test_successor_at_u32_max() {
        let v = SyntacticVersion::new(u32::MAX, u32::MAX);
        assert!(!v.is_successor(&SyntacticVersion::new(u32::MAX, 0)));
        assert!(!v.is_successor(&SyntacticVersion::new(0, 0)));
        assert!(SyntacticVersion::new(1, u32::MAX - 1).is_successor(&SyntacticVersion::new(1, u32::MAX)));
    }

    #[test]
    fn test_ordering() {
        let mut versions = vec![
            SyntacticVersion::new(2, 0),
            SyntacticVersion::new(0, 3),
            SyntacticVersion::new(1, 1),
        ];
        versions.sort();
        assert_eq!(versions[0], SyntacticVersion::new(0, 3));
        assert_eq!(versions[2], SyntacticVersion::new(2, 0));
    }
}
