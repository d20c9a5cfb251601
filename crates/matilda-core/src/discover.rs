//! Discovery orchestration.
//!
//! Wires the pipeline together: catalog → constraint graph → enumerator →
//! pruner → validator → ranked sink. Control flow is single-threaded and
//! cooperative; the monitor is polled at every candidate boundary, so a
//! cancellation between candidate N and N+1 finalizes with exactly the
//! first N accepted rules.
//!
//! Run states:
//!
//! ```text
//! INIT → LOADING_CATALOG → BUILDING_GRAPH → ENUMERATING
//!         │                                  ├─► candidate ─► VALIDATING ─► ENUMERATING
//!         │                                  └─► empty ─► FINALIZING → DONE
//!         └── any state ──► CANCELLED ──► FINALIZING → DONE (partial)
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::engine::{SqliteEngine, DEFAULT_STATEMENT_TIMEOUT};
use crate::enumerate::{CandidateEnumerator, EnumerationLimits};
use crate::error::{CancelReason, DiscoveryError, QueryErrorKind, Result};
use crate::graph::ConstraintGraph;
use crate::monitor::ResourceMonitor;
use crate::prune::RulePruner;
use crate::validate::TgdValidator;

/// Consecutive statement timeouts tolerated before the run escalates to a
/// clean cancellation.
const TIMEOUT_ESCALATION_LIMIT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Partial,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
        }
    }
}

/// An accepted rule in its reportable form.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiscoveredRule {
    pub body: Vec<String>,
    pub head: Vec<String>,
    pub support: u64,
    pub confidence: f64,
    pub tgd_string: String,
}

impl DiscoveredRule {
    fn atom_count(&self) -> usize {
        self.body.len() + self.head.len()
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub rules: Vec<DiscoveredRule>,
    pub status: RunStatus,
    pub cancel_reason: Option<CancelReason>,
    pub candidates_enumerated: u64,
    pub candidates_validated: u64,
}

/// Run discovery against a SQLite database file.
pub fn discover(db_path: &Path, config: &Config) -> Result<DiscoveryOutcome> {
    config.validate()?;

    let monitor = ResourceMonitor::new(
        config.monitor.memory_threshold,
        Duration::from_secs_f64(config.monitor.timeout),
    );
    let engine = SqliteEngine::open_with(
        db_path,
        monitor.cancel_flag(),
        DEFAULT_STATEMENT_TIMEOUT,
    )?;

    tracing::info!(database = %db_path.display(), "loading catalog");
    let catalog = Catalog::load(&engine)?;
    let _ = monitor.check();

    tracing::info!("building constraint graph");
    let graph = ConstraintGraph::build(&catalog);
    let _ = monitor.check();

    let limits = EnumerationLimits {
        max_table: config.algorithm.max_table as usize,
        max_vars: config.algorithm.max_vars as usize,
    };
    let enumerator = CandidateEnumerator::new(&catalog, &graph, limits);
    let validator = TgdValidator::new(
        &engine,
        &catalog,
        config.algorithm.nb_occurrence,
        config.algorithm.confidence_threshold,
    );
    let mut pruner = RulePruner::new(limits.max_vars);

    let mut candidates_enumerated = 0u64;
    let mut candidates_validated = 0u64;
    let mut consecutive_timeouts = 0u32;

    tracing::info!("enumerating candidates");
    if monitor.check().is_none() {
        for candidate in enumerator {
            if monitor.check().is_some() {
                break;
            }
            candidates_enumerated += 1;

            if !pruner.pre_validate(&candidate) {
                continue;
            }

            candidates_validated += 1;
            match validator.validate(&candidate) {
                Ok(verdict) => {
                    consecutive_timeouts = 0;
                    if verdict.valid {
                        tracing::info!(
                            rule = %candidate.tgd_string(),
                            support = verdict.support,
                            confidence = verdict.confidence,
                            "rule accepted"
                        );
                        pruner.accept(candidate, verdict.support, verdict.confidence);
                    }
                }
                Err(DiscoveryError::Query(q)) if q.kind == QueryErrorKind::Timeout => {
                    // The candidate is rejected; the run survives unless
                    // timeouts keep coming or the monitor itself tripped.
                    consecutive_timeouts += 1;
                    tracing::warn!(
                        rule = %candidate.tgd_string(),
                        strikes = consecutive_timeouts,
                        "statement timed out; candidate rejected"
                    );
                    if monitor.is_cancelled() {
                        break;
                    }
                    if consecutive_timeouts >= TIMEOUT_ESCALATION_LIMIT {
                        monitor.trip(CancelReason::Timeout);
                        break;
                    }
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    tracing::info!(
        enumerated = candidates_enumerated,
        validated = candidates_validated,
        accepted = pruner.accepted_count(),
        "finalizing"
    );

    let mut rules: Vec<DiscoveredRule> = pruner
        .into_accepted()
        .into_iter()
        .map(|a| DiscoveredRule {
            body: a.rule.body_strings(),
            head: a.rule.head_strings(),
            support: a.support,
            confidence: a.confidence,
            tgd_string: a.rule.tgd_string(),
        })
        .collect();

    // Ranked sink order: confidence desc, support desc, size asc, then the
    // TGD string as a total tie-break so the output is byte-stable.
    rules.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.support.cmp(&a.support))
            .then_with(|| a.atom_count().cmp(&b.atom_count()))
            .then_with(|| a.tgd_string.cmp(&b.tgd_string))
    });
    if config.results.top_k > 0 {
        rules.truncate(config.results.top_k);
    }

    let cancel_reason = monitor.reason();
    let status = if monitor.is_cancelled() {
        RunStatus::Partial
    } else {
        RunStatus::Success
    };

    Ok(DiscoveryOutcome {
        rules,
        status,
        cancel_reason,
        candidates_enumerated,
        candidates_validated,
    })
}
