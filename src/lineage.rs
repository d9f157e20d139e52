//! Schema lineages
//!
//! A lineage is the full history of one kind's schema: an ordered, gap-free
//! chain of versions with a migration between every adjacent pair. It is
//! built once at start-up and shared read-only afterwards.

use serde_json::Value;
use tracing::{debug, info};

use crate::checksum::Checksum;
use crate::error::{LineageError, Result};
use crate::migration::{Direction, Migration};
use crate::schema::Schema;
use crate::version::SyntacticVersion;

/// An immutable, validated chain of schema versions
#[derive(Debug)]
pub struct Lineage {
    name: String,
    schemas: Vec<Schema>,
    /// `migrations[i]` connects `schemas[i]` and `schemas[i + 1]`
    migrations: Vec<Migration>,
    fingerprint: Checksum,
}

/// The migrations to walk between two versions, in order
#[derive(Debug, Clone)]
pub struct MigrationPath<'a> {
    pub from: SyntacticVersion,
    pub to: SyntacticVersion,
    pub direction: Direction,
    pub steps: Vec<&'a Migration>,
}

impl MigrationPath<'_> {
    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Lineage {
    pub fn builder(name: impl Into<String>) -> LineageBuilder {
        LineageBuilder {
            name: name.into(),
            schemas: Vec::new(),
            migrations: Vec::new(),
            structural: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the schema declared at `version`
    pub fn schema(&self, version: SyntacticVersion) -> Result<&Schema> {
        self.index_of(version).map(|i| &self.schemas[i])
    }

    /// All schemas, oldest first
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    /// All versions, oldest first
    pub fn versions(&self) -> impl DoubleEndedIterator<Item = SyntacticVersion> + '_ {
        self.schemas.iter().map(Schema::version)
    }

    pub fn contains(&self, version: SyntacticVersion) -> bool {
        self.index_of(version).is_ok()
    }

    pub fn first_version(&self) -> SyntacticVersion {
        self.schemas[0].version()
    }

    pub fn latest_version(&self) -> SyntacticVersion {
        self.latest().version()
    }

    pub fn latest(&self) -> &Schema {
        &self.schemas[self.schemas.len() - 1]
    }

    /// SHA256 over the canonical declaration of every schema
    pub fn fingerprint(&self) -> &Checksum {
        &self.fingerprint
    }

    /// The unique chain of migrations leading from `from` to `to`
    pub fn migration_path(&self, from: SyntacticVersion, to: SyntacticVersion) -> Result<MigrationPath<'_>> {
        let start = self.index_of(from)?;
        let end = self.index_of(to)?;

        let (direction, steps) = if start <= end {
            (Direction::Forward, self.migrations[start..end].iter().collect())
        } else {
            (Direction::Backward, self.migrations[end..start].iter().rev().collect())
        };

        Ok(MigrationPath {
            from,
            to,
            direction,
            steps,
        })
    }

    fn index_of(&self, version: SyntacticVersion) -> Result<usize> {
        self.schemas
            .binary_search_by(|s| s.version().cmp(&version))
            .map_err(|_| LineageError::VersionUnknown {
                lineage: self.name.clone(),
                version,
            })
    }
}

/// Builder for [`Lineage`]
pub struct LineageBuilder {
    name: String,
    schemas: Vec<Schema>,
    migrations: Vec<Migration>,
    structural: bool,
}

impl LineageBuilder {
    /// Declare the next schema version
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Declare the migration between two adjacent versions
    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.push(migration);
        self
    }

    /// Derive a structural migration for every adjacent pair left undeclared
    pub fn structural_migrations(mut self) -> Self {
        self.structural = true;
        self
    }

    /// Check every lineage invariant and freeze the lineage
    pub fn build(self) -> Result<Lineage> {
        let name = self.name;
        if self.schemas.is_empty() {
            return Err(LineageError::integrity(&name, "no schema versions declared"));
        }

        for pair in self.schemas.windows(2) {
            let (prev, next) = (pair[0].version(), pair[1].version());
            if prev == next {
                return Err(LineageError::integrity(&name, format!("version {} declared twice", next)));
            }
            if next < prev {
                return Err(LineageError::integrity(
                    &name,
                    format!("version {} declared after {}; versions must increase", next, prev),
                ));
            }
            if !prev.is_successor(&next) {
                return Err(LineageError::integrity(
                    &name,
                    format!("gap between {} and {}; {} cannot follow {}", prev, next, next, prev),
                ));
            }
        }

        let mut slots: Vec<Option<Migration>> = vec![None; self.schemas.len() - 1];
        for migration in self.migrations {
            let (from, to) = (migration.from_version(), migration.to_version());
            let slot = self
                .schemas
                .windows(2)
                .position(|pair| pair[0].version() == from && pair[1].version() == to)
                .ok_or_else(|| {
                    LineageError::integrity(
                        &name,
                        format!("migration {} -> {} does not connect adjacent declared versions", from, to),
                    )
                })?;
            if slots[slot].is_some() {
                return Err(LineageError::integrity(
                    &name,
                    format!("more than one migration declared for {} -> {}", from, to),
                ));
            }
            slots[slot] = Some(migration);
        }

        let mut migrations = Vec::with_capacity(slots.len());
        for (i, slot) in slots.into_iter().enumerate() {
            let (from, to) = (&self.schemas[i], &self.schemas[i + 1]);
            let migration = match slot {
                Some(m) => m,
                None if self.structural => {
                    debug!(lineage = %name, from = %from.version(), to = %to.version(), "deriving structural migration");
                    Migration::structural(from, to)
                }
                None => {
                    return Err(LineageError::integrity(
                        &name,
                        format!("no migration declared between {} and {}", from.version(), to.version()),
                    ))
                }
            };
            migrations.push(migration);
        }

        let declarations: Vec<Value> = self.schemas.iter().map(Schema::declaration).collect();
        let fingerprint = Checksum::from_json(&Value::Array(declarations));

        let lineage = Lineage {
            name,
            schemas: self.schemas,
            migrations,
            fingerprint,
        };
        info!(
            lineage = %lineage.name,
            versions = lineage.schemas.len(),
            latest = %lineage.latest_version(),
            fingerprint = lineage.fingerprint.short(),
            "lineage built"
        );
        Ok(lineage)
    }
}
