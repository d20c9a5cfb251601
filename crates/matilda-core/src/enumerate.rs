//! Candidate rule enumeration.
//!
//! A lazy, bounded depth-first walk over the constraint graph. Each chain
//! starts as a single seed atom with fresh variables; extensions pick an
//! already-bound position and follow one of its join edges, appending an
//! atom of the neighbor relation that shares exactly that variable. Every
//! chain of length ≥ 2 closes into one candidate: the most recently
//! appended atom becomes the head, the rest the body.
//!
//! Enumeration order is fully determined by catalog order, neighbor order,
//! and the DFS stack: same inputs, same candidate stream.

use std::collections::BTreeSet;

use crate::catalog::Catalog;
use crate::graph::ConstraintGraph;
use crate::rule::{Atom, Fingerprint, Rule, Term, VarId};

#[derive(Debug, Clone, Copy)]
pub struct EnumerationLimits {
    /// Maximum atoms per rule (body plus head), which bounds chain length.
    pub max_table: usize,
    /// Maximum distinct variables per finished rule.
    pub max_vars: usize,
}

#[derive(Debug, Clone)]
struct ChainAtom {
    relation: u32,
    terms: Vec<VarId>,
}

#[derive(Debug, Clone)]
struct Chain {
    atoms: Vec<ChainAtom>,
    next_var: u32,
}

pub struct CandidateEnumerator<'a> {
    catalog: &'a Catalog,
    graph: &'a ConstraintGraph,
    limits: EnumerationLimits,
    stack: Vec<Chain>,
    seen_prefixes: BTreeSet<Fingerprint>,
}

impl<'a> CandidateEnumerator<'a> {
    pub fn new(
        catalog: &'a Catalog,
        graph: &'a ConstraintGraph,
        limits: EnumerationLimits,
    ) -> Self {
        // Seeds pop in catalog order: push them reversed.
        let mut stack = Vec::new();
        for (r, relation) in catalog.relations().iter().enumerate().rev() {
            let arity = relation.arity() as u32;
            stack.push(Chain {
                atoms: vec![ChainAtom {
                    relation: r as u32,
                    terms: (0..arity).map(VarId).collect(),
                }],
                next_var: arity,
            });
        }
        Self {
            catalog,
            graph,
            limits,
            stack,
            seen_prefixes: BTreeSet::new(),
        }
    }

    fn chain_fingerprint(&self, chain: &Chain) -> Fingerprint {
        let atoms = chain
            .atoms
            .iter()
            .map(|a| self.named_atom(a))
            .collect::<Vec<_>>();
        Rule::new(atoms, Vec::new()).fingerprint()
    }

    fn named_atom(&self, atom: &ChainAtom) -> Atom {
        Atom::new(
            self.catalog.relation(atom.relation as usize).name.clone(),
            atom.terms.iter().map(|v| Term::Var(*v)).collect(),
        )
    }

    /// Variables bound at two or more positions. Extensions only ever add
    /// occurrences, so exceeding `max_vars` here prunes the whole subtree.
    fn shared_var_count(&self, chain: &Chain) -> usize {
        let mut counts: std::collections::BTreeMap<VarId, u32> = std::collections::BTreeMap::new();
        for atom in &chain.atoms {
            for v in &atom.terms {
                *counts.entry(*v).or_insert(0) += 1;
            }
        }
        counts.values().filter(|&&c| c >= 2).count()
    }

    fn push_extensions(&mut self, chain: &Chain) {
        let mut extensions = Vec::new();
        for atom in &chain.atoms {
            for (pos, var) in atom.terms.iter().enumerate() {
                let node = self.graph.node(atom.relation, pos as u32);
                for (neighbor, _weight) in self.graph.neighbors(node) {
                    let target = self.graph.node_ref(neighbor);
                    let arity = self.catalog.relation(target.relation as usize).arity() as u32;
                    let mut next_var = chain.next_var;
                    let terms = (0..arity)
                        .map(|c| {
                            if c == target.column {
                                *var
                            } else {
                                let fresh = VarId(next_var);
                                next_var += 1;
                                fresh
                            }
                        })
                        .collect();

                    let mut atoms = chain.atoms.clone();
                    atoms.push(ChainAtom {
                        relation: target.relation,
                        terms,
                    });
                    extensions.push(Chain { atoms, next_var });
                }
            }
        }
        // Reversed so the first extension is popped first.
        for ext in extensions.into_iter().rev() {
            self.stack.push(ext);
        }
    }

    /// Close a chain into a candidate: last atom is the head.
    fn close_head(&self, chain: &Chain) -> Option<Rule> {
        let (head_chain, body_chain) = chain.atoms.split_last()?;
        if body_chain.is_empty() {
            return None;
        }

        let body = body_chain.iter().map(|a| self.named_atom(a)).collect();
        let head = vec![self.named_atom(head_chain)];
        let mut rule = Rule::new(body, head);
        rule.rewrite_singletons();

        if rule.distinct_var_count() > self.limits.max_vars {
            return None;
        }
        if self.head_is_tautological(&rule) {
            return None;
        }
        Some(rule)
    }

    /// A head adds no constraint when some body atom already instantiates
    /// its pattern: same relation, and every non-existential head position
    /// carries the same variable. `EXISTS` would be trivially true.
    fn head_is_tautological(&self, rule: &Rule) -> bool {
        let existentials: BTreeSet<VarId> = rule.existentials().into_iter().collect();
        rule.head.iter().all(|head| {
            rule.body.iter().any(|body| {
                body.relation == head.relation
                    && head.terms.iter().zip(&body.terms).all(|(h, b)| match h {
                        Term::Var(v) if existentials.contains(v) => true,
                        other => other == b,
                    })
            })
        })
    }
}

impl Iterator for CandidateEnumerator<'_> {
    type Item = Rule;

    fn next(&mut self) -> Option<Rule> {
        while let Some(chain) = self.stack.pop() {
            let fingerprint = self.chain_fingerprint(&chain);
            if !self.seen_prefixes.insert(fingerprint) {
                continue;
            }
            if self.shared_var_count(&chain) > self.limits.max_vars {
                continue;
            }
            if chain.atoms.len() < self.limits.max_table {
                self.push_extensions(&chain);
            }
            if chain.atoms.len() >= 2 {
                if let Some(rule) = self.close_head(&chain) {
                    return Some(rule);
                }
            }
        }
        None
    }
}
