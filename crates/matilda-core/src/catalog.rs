//! Schema catalog with per-column sample statistics.
//!
//! Loaded once at startup and read-only afterwards. Besides names and
//! declared domains, every column carries a bounded sample of distinct value
//! hashes; the constraint graph intersects these samples to estimate which
//! column pairs can participate in an equi-join.

use crate::engine::{QueryEngine, SqliteEngine};
use crate::error::{DiscoveryError, Result};

/// Bound on the per-column value sample used for overlap estimation.
pub const SAMPLE_LIMIT: usize = 1024;

/// Declared column domain, reduced to SQLite's type affinities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainTag {
    Text,
    Integer,
    Real,
    Blob,
}

impl DomainTag {
    /// SQLite affinity rules (https://www.sqlite.org/datatype3.html §3.1),
    /// with NUMERIC folded into `Real`.
    pub fn from_declared(declared: &str) -> DomainTag {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            DomainTag::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            DomainTag::Text
        } else if upper.is_empty() || upper.contains("BLOB") {
            DomainTag::Blob
        } else {
            DomainTag::Real
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub domain: DomainTag,
    pub distinct_count: u64,
    /// Sorted, deduplicated FNV-1a hashes of up to [`SAMPLE_LIMIT`] distinct
    /// values, in the engine's deterministic sample order.
    pub sample_hashes: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct Relation {
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: u64,
}

impl Relation {
    pub fn arity(&self) -> usize {
        self.columns.len()
    }
}

/// Immutable snapshot of the database schema plus sample statistics.
/// Relations are kept sorted by name; enumeration order depends on it.
#[derive(Debug, Clone)]
pub struct Catalog {
    relations: Vec<Relation>,
}

impl Catalog {
    /// Introspect all base tables and collect their statistics.
    pub fn load(engine: &SqliteEngine) -> Result<Catalog> {
        let tables = engine
            .list_tables()
            .map_err(|e| DiscoveryError::Schema(e.to_string()))?;

        let mut relations = Vec::with_capacity(tables.len());
        for table in tables {
            let columns = engine
                .table_columns(&table)
                .map_err(|e| DiscoveryError::Schema(e.to_string()))?;
            if columns.is_empty() {
                return Err(DiscoveryError::Schema(format!(
                    "table `{table}` has no columns"
                )));
            }

            let row_count = engine
                .count(
                    &format!("SELECT COUNT(*) FROM {}", crate::engine::quote_ident(&table)),
                    &[],
                )
                .map_err(|e| DiscoveryError::Schema(e.to_string()))?;

            let mut loaded = Vec::with_capacity(columns.len());
            for (name, declared) in columns {
                let distinct_count = engine
                    .count_distinct(
                        &[crate::engine::quote_ident(&name)],
                        &format!(
                            "FROM {} WHERE {} IS NOT NULL",
                            crate::engine::quote_ident(&table),
                            crate::engine::quote_ident(&name)
                        ),
                        &[],
                    )
                    .map_err(|e| DiscoveryError::Schema(e.to_string()))?;

                let mut sample_hashes = engine
                    .sample_values(&table, &name, SAMPLE_LIMIT)
                    .map_err(|e| DiscoveryError::Schema(e.to_string()))?;
                sample_hashes.sort_unstable();
                sample_hashes.dedup();

                loaded.push(Column {
                    name,
                    domain: DomainTag::from_declared(&declared),
                    distinct_count,
                    sample_hashes,
                });
            }

            relations.push(Relation {
                name: table,
                columns: loaded,
                row_count,
            });
        }

        tracing::info!(
            relations = relations.len(),
            "catalog loaded"
        );
        Ok(Catalog { relations })
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, idx: usize) -> &Relation {
        &self.relations[idx]
    }

    pub fn relation_by_name(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn from_relations(mut relations: Vec<Relation>) -> Catalog {
        relations.sort_by(|a, b| a.name.cmp(&b.name));
        Catalog { relations }
    }
}
