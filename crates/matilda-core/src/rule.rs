//! Rule intermediate representation.
//!
//! A candidate TGD is a multiset of body atoms and a multiset of head atoms
//! over a shared variable space. Terms are a closed sum: a variable or the
//! anonymous `_`. Head variables that never occur in the body are the rule's
//! existentials; they are derived, not stored.
//!
//! The canonical fingerprint makes two rules that differ only by variable
//! renaming or atom order compare equal. It is the key for every `seen` set
//! and for the accepted-rule map.

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Var(VarId),
    Anon,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Atom {
    pub relation: String,
    pub terms: Vec<Term>,
}

impl Atom {
    pub fn new(relation: impl Into<String>, terms: Vec<Term>) -> Atom {
        Atom {
            relation: relation.into(),
            terms,
        }
    }

    pub fn arity(&self) -> usize {
        self.terms.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub body: Vec<Atom>,
    pub head: Vec<Atom>,
}

/// Canonical, renaming-invariant key of a rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Rule {
    pub fn new(body: Vec<Atom>, head: Vec<Atom>) -> Rule {
        Rule { body, head }
    }

    pub fn atom_count(&self) -> usize {
        self.body.len() + self.head.len()
    }

    fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.body.iter().chain(self.head.iter())
    }

    /// Variables in first-occurrence order, body first.
    pub fn variables(&self) -> Vec<VarId> {
        let mut seen = Vec::new();
        for atom in self.atoms() {
            for term in &atom.terms {
                if let Term::Var(v) = term {
                    if !seen.contains(v) {
                        seen.push(*v);
                    }
                }
            }
        }
        seen
    }

    pub fn distinct_var_count(&self) -> usize {
        self.variables().len()
    }

    pub fn body_variables(&self) -> BTreeSet<VarId> {
        let mut vars = BTreeSet::new();
        for atom in &self.body {
            for term in &atom.terms {
                if let Term::Var(v) = term {
                    vars.insert(*v);
                }
            }
        }
        vars
    }

    /// Head variables with no body occurrence, in head first-occurrence order.
    pub fn existentials(&self) -> Vec<VarId> {
        let body_vars = self.body_variables();
        let mut out = Vec::new();
        for atom in &self.head {
            for term in &atom.terms {
                if let Term::Var(v) = term {
                    if !body_vars.contains(v) && !out.contains(v) {
                        out.push(*v);
                    }
                }
            }
        }
        out
    }

    /// Rewrite body variables that occur exactly once in the whole rule to
    /// `_`. Head terms are never rewritten: a head-only singleton is an
    /// existential and stays named.
    pub fn rewrite_singletons(&mut self) {
        let mut counts: std::collections::BTreeMap<VarId, u32> = std::collections::BTreeMap::new();
        for atom in self.atoms() {
            for term in &atom.terms {
                if let Term::Var(v) = term {
                    *counts.entry(*v).or_insert(0) += 1;
                }
            }
        }
        for atom in &mut self.body {
            for term in &mut atom.terms {
                if let Term::Var(v) = term {
                    if counts.get(v).copied() == Some(1) {
                        *term = Term::Anon;
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Canonical form
    // ------------------------------------------------------------------

    /// Canonicalize: among all atom orderings (body and head permuted
    /// independently), pick the one whose first-occurrence variable
    /// renaming renders lexicographically smallest. Exact minimization is
    /// affordable because rules never exceed `max_table` atoms; a greedy
    /// sort-then-rename scheme can get stuck when several atoms of the same
    /// relation share a local shape but differ in join linkage.
    pub fn canonicalize(&self) -> Rule {
        let mut best: Option<(String, Rule)> = None;
        for body_perm in permutations(self.body.len()) {
            for head_perm in permutations(self.head.len()) {
                let candidate = Rule {
                    body: body_perm.iter().map(|&i| self.body[i].clone()).collect(),
                    head: head_perm.iter().map(|&i| self.head[i].clone()).collect(),
                };
                let renamed = rename_first_occurrence(&candidate);
                let rendered = render_rule_raw(&renamed);
                if best.as_ref().map_or(true, |(b, _)| rendered < *b) {
                    best = Some((rendered, renamed));
                }
            }
        }
        match best {
            Some((_, rule)) => rule,
            // Both sides empty; nothing to order.
            None => rename_first_occurrence(self),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(render_rule_raw(&self.canonicalize()))
    }

    // ------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------

    /// `R1(x, y) ∧ R2(y, _, z) → ∃w. R3(z, w)`
    pub fn tgd_string(&self) -> String {
        let names = self.display_names();
        let body = self
            .body
            .iter()
            .map(|a| render_atom_named(a, &names))
            .collect::<Vec<_>>()
            .join(" ∧ ");
        let head = self
            .head
            .iter()
            .map(|a| render_atom_named(a, &names))
            .collect::<Vec<_>>()
            .join(" ∧ ");

        let existentials = self.existentials();
        if existentials.is_empty() {
            format!("{body} → {head}")
        } else {
            let bound = existentials
                .iter()
                .map(|v| names.name(*v))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{body} → ∃{bound}. {head}")
        }
    }

    pub fn body_strings(&self) -> Vec<String> {
        let names = self.display_names();
        self.body
            .iter()
            .map(|a| render_atom_named(a, &names))
            .collect()
    }

    pub fn head_strings(&self) -> Vec<String> {
        let names = self.display_names();
        self.head
            .iter()
            .map(|a| render_atom_named(a, &names))
            .collect()
    }

    fn display_names(&self) -> DisplayNames {
        DisplayNames::for_vars(self.variables())
    }
}

/// All permutations of `0..n` in lexicographic order. Rules are bounded by
/// `max_table`, so `n` stays tiny; above a safety cap only the identity
/// ordering is considered.
fn permutations(n: usize) -> Vec<Vec<usize>> {
    if n > 6 {
        return vec![(0..n).collect()];
    }
    let mut out = Vec::new();
    let mut current: Vec<usize> = Vec::with_capacity(n);
    let mut used = vec![false; n];
    fn recurse(n: usize, current: &mut Vec<usize>, used: &mut [bool], out: &mut Vec<Vec<usize>>) {
        if current.len() == n {
            out.push(current.clone());
            return;
        }
        for i in 0..n {
            if !used[i] {
                used[i] = true;
                current.push(i);
                recurse(n, current, used, out);
                current.pop();
                used[i] = false;
            }
        }
    }
    recurse(n, &mut current, &mut used, &mut out);
    out
}

fn render_rule_raw(rule: &Rule) -> String {
    let mut out = String::new();
    for (i, atom) in rule.body.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        render_atom_raw(atom, &mut out);
    }
    out.push_str("=>");
    for (i, atom) in rule.head.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        render_atom_raw(atom, &mut out);
    }
    out
}

/// Renumber variables by first occurrence (body atoms before head atoms,
/// positions left to right).
fn rename_first_occurrence(rule: &Rule) -> Rule {
    let mut mapping: Vec<(VarId, VarId)> = Vec::new();
    let mut rename = |term: &Term| match term {
        Term::Anon => Term::Anon,
        Term::Var(v) => {
            if let Some((_, to)) = mapping.iter().find(|(from, _)| from == v) {
                Term::Var(*to)
            } else {
                let next = VarId(mapping.len() as u32);
                mapping.push((*v, next));
                Term::Var(next)
            }
        }
    };

    let map_atoms = |atoms: &[Atom], rename: &mut dyn FnMut(&Term) -> Term| {
        atoms
            .iter()
            .map(|a| Atom {
                relation: a.relation.clone(),
                terms: a.terms.iter().map(&mut *rename).collect(),
            })
            .collect::<Vec<_>>()
    };

    let body = map_atoms(&rule.body, &mut rename);
    let head = map_atoms(&rule.head, &mut rename);
    Rule { body, head }
}

fn render_atom_raw(atom: &Atom, out: &mut String) {
    out.push_str(&atom.relation);
    out.push('(');
    for (i, term) in atom.terms.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match term {
            Term::Anon => out.push('_'),
            Term::Var(v) => {
                out.push('v');
                out.push_str(&v.0.to_string());
            }
        }
    }
    out.push(')');
}

const DISPLAY_ALPHABET: &[&str] = &["x", "y", "z", "u", "v", "w", "s", "t"];

struct DisplayNames {
    ordered: Vec<VarId>,
}

impl DisplayNames {
    fn for_vars(ordered: Vec<VarId>) -> DisplayNames {
        DisplayNames { ordered }
    }

    fn name(&self, var: VarId) -> String {
        let idx = self
            .ordered
            .iter()
            .position(|v| *v == var)
            .unwrap_or(self.ordered.len());
        match DISPLAY_ALPHABET.get(idx) {
            Some(letter) => (*letter).to_string(),
            None => format!("x{}", idx - DISPLAY_ALPHABET.len() + 1),
        }
    }
}

fn render_atom_named(atom: &Atom, names: &DisplayNames) -> String {
    let terms = atom
        .terms
        .iter()
        .map(|t| match t {
            Term::Anon => "_".to_string(),
            Term::Var(v) => names.name(*v),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}({})", atom.relation, terms)
}
