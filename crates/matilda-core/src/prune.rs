//! Candidate pruning and accepted-rule deduplication.
//!
//! Two stages. Pre-validation is purely syntactic and runs before any SQL:
//! structural sanity, the `max_vars` bound, and a fingerprint `seen` set
//! that collapses isomorphic candidates. Post-validation enforces the
//! subsumption contract over the accepted set: a candidate subsumed by an
//! accepted rule is dropped, and accepted rules subsumed by a newcomer are
//! evicted, so the output never contains a subsumed pair.

use std::collections::{BTreeMap, BTreeSet};

use crate::rule::{Atom, Fingerprint, Rule, Term, VarId};

#[derive(Debug, Clone)]
pub struct AcceptedRule {
    pub rule: Rule,
    pub support: u64,
    pub confidence: f64,
}

pub struct RulePruner {
    max_vars: usize,
    seen: BTreeSet<Fingerprint>,
    accepted: BTreeMap<Fingerprint, AcceptedRule>,
}

impl RulePruner {
    pub fn new(max_vars: usize) -> Self {
        Self {
            max_vars,
            seen: BTreeSet::new(),
            accepted: BTreeMap::new(),
        }
    }

    /// Syntactic filters; `false` means skip the candidate without querying.
    pub fn pre_validate(&mut self, rule: &Rule) -> bool {
        if rule.body.is_empty() || rule.head.is_empty() {
            return false;
        }
        if rule.distinct_var_count() > self.max_vars {
            return false;
        }
        self.seen.insert(rule.fingerprint())
    }

    /// Admit a validated rule, enforcing the no-subsumption contract.
    /// Returns `false` when an already-accepted rule subsumes the newcomer.
    pub fn accept(&mut self, rule: Rule, support: u64, confidence: f64) -> bool {
        if self.accepted.values().any(|a| subsumes(&a.rule, &rule)) {
            return false;
        }

        let evicted: Vec<Fingerprint> = self
            .accepted
            .iter()
            .filter(|(_, a)| subsumes(&rule, &a.rule))
            .map(|(fp, _)| fp.clone())
            .collect();
        for fp in evicted {
            tracing::debug!(evicted = %fp, "accepted rule subsumed by newcomer");
            self.accepted.remove(&fp);
        }

        let fingerprint = rule.fingerprint();
        self.accepted.insert(
            fingerprint,
            AcceptedRule {
                rule,
                support,
                confidence,
            },
        );
        true
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn into_accepted(self) -> Vec<AcceptedRule> {
        self.accepted.into_values().collect()
    }
}

/// Does `general` subsume `specific`? True when some injective variable
/// renaming maps `general`'s head onto `specific`'s head exactly and every
/// `general` body atom onto a distinct `specific` body atom (anonymous
/// positions in `general` match anything).
pub fn subsumes(general: &Rule, specific: &Rule) -> bool {
    if general.head.len() != specific.head.len() {
        return false;
    }
    if general.body.len() > specific.body.len() {
        return false;
    }

    let mut mapping: Vec<(VarId, VarId)> = Vec::new();
    let mut used_head = vec![false; specific.head.len()];
    let mut used_body = vec![false; specific.body.len()];
    match_heads(general, specific, 0, &mut used_head, &mut used_body, &mut mapping)
}

fn match_heads(
    general: &Rule,
    specific: &Rule,
    idx: usize,
    used_head: &mut [bool],
    used_body: &mut [bool],
    mapping: &mut Vec<(VarId, VarId)>,
) -> bool {
    if idx == general.head.len() {
        return match_bodies(general, specific, 0, used_body, mapping);
    }
    let atom = &general.head[idx];
    for (t, target) in specific.head.iter().enumerate() {
        if used_head[t] {
            continue;
        }
        let checkpoint = mapping.len();
        if match_atom(atom, target, true, mapping) {
            used_head[t] = true;
            if match_heads(general, specific, idx + 1, used_head, used_body, mapping) {
                return true;
            }
            used_head[t] = false;
        }
        mapping.truncate(checkpoint);
    }
    false
}

fn match_bodies(
    general: &Rule,
    specific: &Rule,
    idx: usize,
    used_body: &mut [bool],
    mapping: &mut Vec<(VarId, VarId)>,
) -> bool {
    if idx == general.body.len() {
        return true;
    }
    let atom = &general.body[idx];
    for (t, target) in specific.body.iter().enumerate() {
        if used_body[t] {
            continue;
        }
        let checkpoint = mapping.len();
        if match_atom(atom, target, false, mapping) {
            used_body[t] = true;
            if match_bodies(general, specific, idx + 1, used_body, mapping) {
                return true;
            }
            used_body[t] = false;
        }
        mapping.truncate(checkpoint);
    }
    false
}

/// Try to extend `mapping` so that `general` matches `target` position by
/// position. In strict mode (heads) anonymous terms must align exactly; in
/// body mode a `general` anonymous position matches anything.
fn match_atom(
    general: &Atom,
    target: &Atom,
    strict: bool,
    mapping: &mut Vec<(VarId, VarId)>,
) -> bool {
    if general.relation != target.relation || general.arity() != target.arity() {
        return false;
    }
    let checkpoint = mapping.len();
    for (g, t) in general.terms.iter().zip(&target.terms) {
        let ok = match (g, t) {
            (Term::Anon, Term::Anon) => true,
            (Term::Anon, Term::Var(_)) => !strict,
            (Term::Var(_), Term::Anon) => false,
            (Term::Var(gv), Term::Var(tv)) => bind(mapping, *gv, *tv),
        };
        if !ok {
            mapping.truncate(checkpoint);
            return false;
        }
    }
    true
}

/// Record `from → to`, refusing conflicts and non-injective images.
fn bind(mapping: &mut Vec<(VarId, VarId)>, from: VarId, to: VarId) -> bool {
    for (f, t) in mapping.iter() {
        if *f == from {
            return *t == to;
        }
        if *t == to {
            // `to` is already the image of a different variable.
            return false;
        }
    }
    mapping.push((from, to));
    true
}
