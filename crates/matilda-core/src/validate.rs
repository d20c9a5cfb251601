//! Candidate validation: SQL compilation, support and confidence.
//!
//! A candidate's body compiles to a join over one alias per body atom; the
//! head becomes a single correlated `EXISTS` subquery covering all head
//! atoms (so variables shared between head atoms stay linked). Counting is
//! `SELECT COUNT(*) FROM (SELECT DISTINCT …)` over every body column —
//! anonymous positions are display sugar, not projection erasure, which is
//! what makes a single-atom body count its rows rather than its join keys.
//!
//! Counts are memoized in a bounded LRU keyed by the canonical SQL text.
//! The cache can only change cost, never results, so it cannot perturb
//! rule ordering.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::catalog::Catalog;
use crate::engine::{quote_ident, QueryEngine};
use crate::error::{DiscoveryError, Result};
use crate::rule::{Rule, Term, VarId};

/// Tolerance for confidence comparisons.
pub const CONFIDENCE_EPS: f64 = 1e-9;

/// Entries in the SQL-count memo.
const CACHE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub valid: bool,
    pub support: u64,
    pub confidence: f64,
}

pub struct TgdValidator<'a, E: QueryEngine> {
    engine: &'a E,
    catalog: &'a Catalog,
    /// Effective support floor: `max(nb_occurrence, 1)`.
    floor: u64,
    confidence_threshold: f64,
    cache: RefCell<LruCache<String, u64>>,
}

impl<'a, E: QueryEngine> TgdValidator<'a, E> {
    pub fn new(
        engine: &'a E,
        catalog: &'a Catalog,
        nb_occurrence: u32,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            engine,
            catalog,
            floor: u64::from(nb_occurrence).max(1),
            confidence_threshold,
            cache: RefCell::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("cache capacity is non-zero"),
            )),
        }
    }

    /// Measure a candidate. The body count is cheaper and bounds the
    /// witness count from above, so it runs first and short-circuits
    /// hopeless candidates before the `EXISTS` query is issued.
    pub fn validate(&self, rule: &Rule) -> Result<Verdict> {
        let body_sql = self.body_count_sql(rule)?;
        let body = self.cached_count(&body_sql)?;
        if body < self.floor {
            return Ok(Verdict {
                valid: false,
                support: 0,
                confidence: 0.0,
            });
        }

        let witness_sql = self.witness_count_sql(rule)?;
        let witness = self.cached_count(&witness_sql)?;
        if witness > body {
            return Err(DiscoveryError::InternalInvariant(format!(
                "witness count {witness} exceeds body count {body} for `{}`",
                rule.tgd_string()
            )));
        }

        let confidence = witness as f64 / body as f64;
        let valid =
            witness >= self.floor && confidence + CONFIDENCE_EPS >= self.confidence_threshold;
        Ok(Verdict {
            valid,
            support: witness,
            confidence,
        })
    }

    fn cached_count(&self, sql: &str) -> Result<u64> {
        if let Some(count) = self.cache.borrow_mut().get(sql) {
            return Ok(*count);
        }
        let count = self.engine.count(sql, &[])?;
        self.cache.borrow_mut().put(sql.to_string(), count);
        Ok(count)
    }

    // ------------------------------------------------------------------
    // SQL compilation
    // ------------------------------------------------------------------

    pub fn body_count_sql(&self, rule: &Rule) -> Result<String> {
        let parts = self.compile_body(rule)?;
        Ok(parts.render(None))
    }

    pub fn witness_count_sql(&self, rule: &Rule) -> Result<String> {
        let parts = self.compile_body(rule)?;
        let exists = self.compile_head_exists(rule)?;
        Ok(parts.render(Some(&exists)))
    }

    fn compile_body(&self, rule: &Rule) -> Result<BodyParts> {
        if rule.body.is_empty() {
            return Err(DiscoveryError::InternalInvariant(
                "candidate has an empty body".to_string(),
            ));
        }

        let mut from = Vec::new();
        let mut select = Vec::new();
        let mut joins = Vec::new();
        let mut first_occurrence: BTreeMap<VarId, (usize, usize)> = BTreeMap::new();

        for (i, atom) in rule.body.iter().enumerate() {
            let relation = self.catalog.relation_by_name(&atom.relation).ok_or_else(|| {
                DiscoveryError::InternalInvariant(format!(
                    "candidate references unknown relation `{}`",
                    atom.relation
                ))
            })?;
            if atom.arity() != relation.arity() {
                return Err(DiscoveryError::InternalInvariant(format!(
                    "atom arity {} does not match `{}` arity {}",
                    atom.arity(),
                    relation.name,
                    relation.arity()
                )));
            }

            from.push(format!("{} AS t{i}", quote_ident(&relation.name)));
            for (j, column) in relation.columns.iter().enumerate() {
                select.push(format!("t{i}.{} AS c{i}_{j}", quote_ident(&column.name)));
                if let Term::Var(v) = atom.terms[j] {
                    match first_occurrence.get(&v) {
                        None => {
                            first_occurrence.insert(v, (i, j));
                        }
                        Some(&(fi, fj)) => {
                            let anchor_col = &self
                                .catalog
                                .relation_by_name(&rule.body[fi].relation)
                                .expect("anchor relation resolved above")
                                .columns[fj]
                                .name;
                            joins.push(format!(
                                "t{i}.{} = t{fi}.{}",
                                quote_ident(&column.name),
                                quote_ident(anchor_col)
                            ));
                        }
                    }
                }
            }
        }

        Ok(BodyParts {
            select,
            from,
            joins,
            first_occurrence,
        })
    }

    /// One `EXISTS` covering every head atom, correlated on the head
    /// variables that occur in the body. Head-only variables shared between
    /// head positions become equalities inside the subquery; unshared ones
    /// contribute nothing.
    fn compile_head_exists(&self, rule: &Rule) -> Result<String> {
        if rule.head.is_empty() {
            return Err(DiscoveryError::InternalInvariant(
                "candidate has an empty head".to_string(),
            ));
        }

        let body = self.compile_body(rule)?;
        let mut from = Vec::new();
        let mut conditions = Vec::new();
        let mut head_first: BTreeMap<VarId, (usize, usize)> = BTreeMap::new();

        for (k, atom) in rule.head.iter().enumerate() {
            let relation = self.catalog.relation_by_name(&atom.relation).ok_or_else(|| {
                DiscoveryError::InternalInvariant(format!(
                    "candidate references unknown relation `{}`",
                    atom.relation
                ))
            })?;
            if atom.arity() != relation.arity() {
                return Err(DiscoveryError::InternalInvariant(format!(
                    "atom arity {} does not match `{}` arity {}",
                    atom.arity(),
                    relation.name,
                    relation.arity()
                )));
            }

            from.push(format!("{} AS h{k}", quote_ident(&relation.name)));
            for (j, column) in relation.columns.iter().enumerate() {
                let Term::Var(v) = atom.terms[j] else {
                    continue;
                };
                if let Some(&(bi, bj)) = body.first_occurrence.get(&v) {
                    let body_col = &self
                        .catalog
                        .relation_by_name(&rule.body[bi].relation)
                        .expect("body relation resolved above")
                        .columns[bj]
                        .name;
                    conditions.push(format!(
                        "h{k}.{} = t{bi}.{}",
                        quote_ident(&column.name),
                        quote_ident(body_col)
                    ));
                } else {
                    match head_first.get(&v) {
                        None => {
                            head_first.insert(v, (k, j));
                        }
                        Some(&(fk, fj)) => {
                            let peer_col = &self
                                .catalog
                                .relation_by_name(&rule.head[fk].relation)
                                .expect("head relation resolved above")
                                .columns[fj]
                                .name;
                            conditions.push(format!(
                                "h{k}.{} = h{fk}.{}",
                                quote_ident(&column.name),
                                quote_ident(peer_col)
                            ));
                        }
                    }
                }
            }
        }

        let mut exists = format!("EXISTS (SELECT 1 FROM {}", from.join(", "));
        if !conditions.is_empty() {
            exists.push_str(" WHERE ");
            exists.push_str(&conditions.join(" AND "));
        }
        exists.push(')');
        Ok(exists)
    }
}

struct BodyParts {
    select: Vec<String>,
    from: Vec<String>,
    joins: Vec<String>,
    first_occurrence: BTreeMap<VarId, (usize, usize)>,
}

impl BodyParts {
    fn render(&self, exists: Option<&str>) -> String {
        let mut conditions = self.joins.clone();
        if let Some(exists) = exists {
            conditions.push(exists.to_string());
        }
        let mut sql = format!(
            "SELECT COUNT(*) FROM (SELECT DISTINCT {} FROM {}",
            self.select.join(", "),
            self.from.join(", ")
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push(')');
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::engine::{SqlValue, SqliteEngine};
    use crate::error::QueryError;
    use crate::rule::Atom;
    use rusqlite::Connection;
    use std::cell::Cell;
    use std::path::Path;

    fn v(n: u32) -> Term {
        Term::Var(VarId(n))
    }

    /// parent(1..3); child rows (10,1) (11,1) (12,2) (13,9) — one orphan.
    fn fixture(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("validate.db");
        let conn = Connection::open(&path).expect("create fixture");
        conn.execute_batch(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER);
             INSERT INTO parent VALUES (1), (2), (3);
             INSERT INTO child VALUES (10, 1), (11, 1), (12, 2), (13, 9);",
        )
        .expect("seed fixture");
        path
    }

    fn fk_rule() -> Rule {
        // child(_, x) → parent(x)
        let mut rule = Rule::new(
            vec![Atom::new("child", vec![v(9), v(0)])],
            vec![Atom::new("parent", vec![v(0)])],
        );
        rule.rewrite_singletons();
        rule
    }

    struct CountingEngine<'a> {
        inner: &'a SqliteEngine,
        calls: Cell<u32>,
    }

    impl QueryEngine for CountingEngine<'_> {
        fn count(&self, sql: &str, params: &[SqlValue]) -> std::result::Result<u64, QueryError> {
            self.calls.set(self.calls.get() + 1);
            self.inner.count(sql, params)
        }

        fn count_distinct(
            &self,
            exprs: &[String],
            from_where: &str,
            params: &[SqlValue],
        ) -> std::result::Result<u64, QueryError> {
            self.inner.count_distinct(exprs, from_where, params)
        }

        fn sample_values(
            &self,
            relation: &str,
            column: &str,
            limit: usize,
        ) -> std::result::Result<Vec<u64>, QueryError> {
            self.inner.sample_values(relation, column, limit)
        }
    }

    #[test]
    fn fk_rule_counts_match_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = SqliteEngine::open(&fixture(dir.path())).expect("open");
        let catalog = Catalog::load(&engine).expect("catalog");
        let validator = TgdValidator::new(&engine, &catalog, 1, 0.5);

        let verdict = validator.validate(&fk_rule()).expect("validate");
        assert!(verdict.valid);
        assert_eq!(verdict.support, 3);
        assert!((verdict.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn exact_threshold_rejects_approximate_rule() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = SqliteEngine::open(&fixture(dir.path())).expect("open");
        let catalog = Catalog::load(&engine).expect("catalog");
        let validator = TgdValidator::new(&engine, &catalog, 1, 1.0);

        let verdict = validator.validate(&fk_rule()).expect("validate");
        assert!(!verdict.valid);
        assert_eq!(verdict.support, 3);
    }

    #[test]
    fn support_floor_short_circuits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = SqliteEngine::open(&fixture(dir.path())).expect("open");
        let catalog = Catalog::load(&engine).expect("catalog");
        let counting = CountingEngine {
            inner: &engine,
            calls: Cell::new(0),
        };
        let validator = TgdValidator::new(&counting, &catalog, 100, 0.5);

        let verdict = validator.validate(&fk_rule()).expect("validate");
        assert!(!verdict.valid);
        // Only the body query ran; the witness query was skipped.
        assert_eq!(counting.calls.get(), 1);
    }

    #[test]
    fn cache_answers_repeat_queries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = SqliteEngine::open(&fixture(dir.path())).expect("open");
        let catalog = Catalog::load(&engine).expect("catalog");
        let counting = CountingEngine {
            inner: &engine,
            calls: Cell::new(0),
        };
        let validator = TgdValidator::new(&counting, &catalog, 1, 0.5);

        let first = validator.validate(&fk_rule()).expect("validate");
        let after_first = counting.calls.get();
        let second = validator.validate(&fk_rule()).expect("validate");
        assert_eq!(counting.calls.get(), after_first);
        assert_eq!(first, second);
    }

    #[test]
    fn body_sql_counts_distinct_full_tuples() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = SqliteEngine::open(&fixture(dir.path())).expect("open");
        let catalog = Catalog::load(&engine).expect("catalog");
        let validator = TgdValidator::new(&engine, &catalog, 1, 1.0);

        let sql = validator.body_count_sql(&fk_rule()).expect("sql");
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM (SELECT DISTINCT t0.\"id\" AS c0_0, \
             t0.\"parent_id\" AS c0_1 FROM \"child\" AS t0)"
        );
        assert_eq!(engine.count(&sql, &[]).unwrap(), 4);
    }

    #[test]
    fn witness_sql_correlates_the_head() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = SqliteEngine::open(&fixture(dir.path())).expect("open");
        let catalog = Catalog::load(&engine).expect("catalog");
        let validator = TgdValidator::new(&engine, &catalog, 1, 1.0);

        let sql = validator.witness_count_sql(&fk_rule()).expect("sql");
        assert!(sql.contains("EXISTS (SELECT 1 FROM \"parent\" AS h0 WHERE h0.\"id\" = t0.\"parent_id\")"));
        assert_eq!(engine.count(&sql, &[]).unwrap(), 3);
    }

    #[test]
    fn two_atom_body_joins_on_shared_variable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = SqliteEngine::open(&fixture(dir.path())).expect("open");
        let catalog = Catalog::load(&engine).expect("catalog");
        let validator = TgdValidator::new(&engine, &catalog, 1, 0.1);

        // child(_, x) ∧ parent(x) → ∃y. child(y, x)
        let mut rule = Rule::new(
            vec![
                Atom::new("child", vec![v(9), v(0)]),
                Atom::new("parent", vec![v(0)]),
            ],
            vec![Atom::new("child", vec![v(1), v(0)])],
        );
        rule.rewrite_singletons();
        let body_sql = validator.body_count_sql(&rule).expect("sql");
        assert!(body_sql.contains("t1.\"id\" = t0.\"parent_id\""));
        // 3 child rows join an existing parent.
        assert_eq!(engine.count(&body_sql, &[]).unwrap(), 3);
    }

    #[test]
    fn uncorrelated_head_is_confidence_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = SqliteEngine::open(&fixture(dir.path())).expect("open");
        let catalog = Catalog::load(&engine).expect("catalog");
        let validator = TgdValidator::new(&engine, &catalog, 1, 1.0);

        // parent(x) → ∃y, z. child(y, z): head shares nothing with the body.
        let rule = Rule::new(
            vec![Atom::new("parent", vec![v(0)])],
            vec![Atom::new("child", vec![v(1), v(2)])],
        );
        let verdict = validator.validate(&rule).expect("validate");
        assert!(verdict.valid);
        assert!((verdict.confidence - 1.0).abs() < 1e-9);
    }
}
