//! MATILDA: mining approximate tuple-generating dependencies.
//!
//! Given a relational database, MATILDA discovers implication rules of the
//! shape `R₁(x̄₁) ∧ … ∧ Rₖ(x̄ₖ) → ∃ȳ. S(z̄)` that hold on the concrete
//! instance with sufficient support and confidence. The pipeline:
//!
//! ```text
//! Catalog → ConstraintGraph → CandidateEnumerator → (Pruner)
//!         → TGDValidator → (Pruner) → ranked rule sink
//! ```
//!
//! Everything is deterministic by contract: for a fixed database and
//! configuration, two runs produce byte-identical rule output.

pub mod catalog;
pub mod config;
pub mod discover;
pub mod engine;
pub mod enumerate;
pub mod error;
pub mod graph;
pub mod monitor;
pub mod prune;
pub mod report;
pub mod rule;
pub mod validate;

pub use catalog::{Catalog, Column, DomainTag, Relation};
pub use config::Config;
pub use discover::{discover, DiscoveredRule, DiscoveryOutcome, RunStatus};
pub use engine::{QueryEngine, SqliteEngine};
pub use error::{CancelReason, DiscoveryError, QueryError, QueryErrorKind};
pub use graph::ConstraintGraph;
pub use monitor::ResourceMonitor;
pub use rule::{Atom, Fingerprint, Rule, Term, VarId};
pub use validate::{TgdValidator, Verdict};
