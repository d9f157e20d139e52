//! Translation of payloads along a lineage
//!
//! The translator walks the migration path between two versions, feeding the
//! output of each step into the next. Lacunas are concatenated in path order.
//! A failing step aborts the whole walk: partially translated data is never
//! handed back.

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{LineageError, Result};
use crate::lacuna::Lacuna;
use crate::lineage::Lineage;
use crate::version::SyntacticVersion;

/// A translated payload and the gaps introduced on the way
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub value: Value,
    pub lacunas: Vec<Lacuna>,
    pub from: SyntacticVersion,
    pub to: SyntacticVersion,
}

/// Translates payloads between the versions of one lineage
#[derive(Debug, Clone, Copy)]
pub struct Translator<'a> {
    lineage: &'a Lineage,
}

impl<'a> Translator<'a> {
    pub fn new(lineage: &'a Lineage) -> Self {
        Self { lineage }
    }

    /// Translate `data`, valid at `from`, to version `to`
    pub fn translate(&self, data: Value, from: SyntacticVersion, to: SyntacticVersion) -> Result<Translation> {
        let path = self.lineage.migration_path(from, to)?;
        self.lineage.schema(from)?.validate(&data)?;

        if path.is_identity() {
            return Ok(Translation {
                value: data,
                lacunas: Vec::new(),
                from,
                to,
            });
        }

        debug!(
            lineage = self.lineage.name(),
            %from,
            %to,
            steps = path.len(),
            "translating payload"
        );

        let mut value = data;
        let mut lacunas = Vec::new();
        for migration in &path.steps {
            let (step_from, step_to) = migration.endpoints(path.direction);
            let (next, step_lacunas) = migration.apply(path.direction, value).map_err(|failure| {
                LineageError::Migration {
                    from: step_from,
                    to: step_to,
                    reason: failure.to_string(),
                }
            })?;

            self.lineage.schema(step_to)?.validate(&next).map_err(|e| LineageError::Migration {
                from: step_from,
                to: step_to,
                reason: format!("step produced an invalid payload: {}", e),
            })?;

            trace!(from = %step_from, to = %step_to, lacunas = step_lacunas.len(), "migration step applied");
            lacunas.extend(step_lacunas);
            value = next;
        }

        Ok(Translation { value, lacunas, from, to })
    }
}
