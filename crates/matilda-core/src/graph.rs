//! Constraint graph: join compatibility between columns.
//!
//! Nodes are `(relation, column)` pairs held in an arena and addressed by
//! integer id, so the cyclic undirected structure never owns itself. An edge
//! links two distinct nodes whose columns share a domain tag and whose value
//! samples overlap; the weight is the estimated number of shared distinct
//! values. Neighbor order is part of the reproducibility contract.

use std::collections::BTreeSet;

use crate::catalog::Catalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

/// `(relation index, column index)` into the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef {
    pub relation: u32,
    pub column: u32,
}

#[derive(Debug)]
pub struct ConstraintGraph {
    nodes: Vec<NodeRef>,
    /// Start of each relation's node range; nodes of relation `r` are
    /// `offsets[r] .. offsets[r] + arity(r)`.
    offsets: Vec<u32>,
    /// Per node: `(neighbor, weight)` sorted by weight descending, then by
    /// the neighbor's `(relation, column)` names ascending.
    adjacency: Vec<Vec<(NodeId, u64)>>,
    /// Every cataloged relation, including ones whose nodes ended up with
    /// no edges.
    relations: BTreeSet<String>,
    edge_count: usize,
}

impl ConstraintGraph {
    pub fn build(catalog: &Catalog) -> ConstraintGraph {
        let mut nodes = Vec::new();
        let mut offsets = Vec::with_capacity(catalog.relations().len());
        let mut relations = BTreeSet::new();
        for (r, relation) in catalog.relations().iter().enumerate() {
            offsets.push(nodes.len() as u32);
            relations.insert(relation.name.clone());
            for c in 0..relation.arity() {
                nodes.push(NodeRef {
                    relation: r as u32,
                    column: c as u32,
                });
            }
        }

        let mut adjacency: Vec<Vec<(NodeId, u64)>> = vec![Vec::new(); nodes.len()];
        let mut edge_count = 0usize;

        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let a = nodes[i];
                let b = nodes[j];
                let col_a = &catalog.relation(a.relation as usize).columns[a.column as usize];
                let col_b = &catalog.relation(b.relation as usize).columns[b.column as usize];
                if col_a.domain != col_b.domain {
                    continue;
                }
                let weight = sorted_intersection_len(&col_a.sample_hashes, &col_b.sample_hashes);
                if weight == 0 {
                    continue;
                }
                adjacency[i].push((NodeId(j as u32), weight));
                adjacency[j].push((NodeId(i as u32), weight));
                edge_count += 1;
            }
        }

        for list in &mut adjacency {
            list.sort_by(|(n1, w1), (n2, w2)| {
                w2.cmp(w1).then_with(|| {
                    let a = nodes[n1.0 as usize];
                    let b = nodes[n2.0 as usize];
                    let name_a = (
                        &catalog.relation(a.relation as usize).name,
                        &catalog.relation(a.relation as usize).columns[a.column as usize].name,
                    );
                    let name_b = (
                        &catalog.relation(b.relation as usize).name,
                        &catalog.relation(b.relation as usize).columns[b.column as usize].name,
                    );
                    name_a.cmp(&name_b)
                })
            });
        }

        tracing::info!(
            nodes = nodes.len(),
            edges = edge_count,
            "constraint graph built"
        );

        ConstraintGraph {
            nodes,
            offsets,
            adjacency,
            relations,
            edge_count,
        }
    }

    pub fn node(&self, relation: u32, column: u32) -> NodeId {
        NodeId(self.offsets[relation as usize] + column)
    }

    pub fn node_ref(&self, id: NodeId) -> NodeRef {
        self.nodes[id.0 as usize]
    }

    /// Neighbors in descending-weight order with a deterministic tie-break.
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = (NodeId, u64)> + '_ {
        self.adjacency[id.0 as usize].iter().copied()
    }

    /// Whether the graph holds nodes for `relation`. Isolated relations
    /// count: every cataloged relation gets its column nodes at build time,
    /// edges or not.
    pub fn contains(&self, relation: &str) -> bool {
        self.relations.contains(relation)
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}

fn sorted_intersection_len(a: &[u64], b: &[u64]) -> u64 {
    let (mut i, mut j, mut n) = (0usize, 0usize, 0u64);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                n += 1;
                i += 1;
                j += 1;
            }
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DomainTag, Relation};

    fn column(name: &str, domain: DomainTag, hashes: &[u64]) -> Column {
        let mut sample_hashes = hashes.to_vec();
        sample_hashes.sort_unstable();
        sample_hashes.dedup();
        Column {
            name: name.to_string(),
            domain,
            distinct_count: sample_hashes.len() as u64,
            sample_hashes,
        }
    }

    fn test_catalog() -> Catalog {
        Catalog::from_relations(vec![
            Relation {
                name: "child".to_string(),
                columns: vec![
                    column("id", DomainTag::Integer, &[10, 11, 12]),
                    column("parent_id", DomainTag::Integer, &[1, 2]),
                    column("note", DomainTag::Text, &[100]),
                ],
                row_count: 3,
            },
            Relation {
                name: "parent".to_string(),
                columns: vec![
                    column("id", DomainTag::Integer, &[1, 2, 3]),
                    column("label", DomainTag::Text, &[200]),
                ],
                row_count: 3,
            },
        ])
    }

    #[test]
    fn edges_require_matching_domain_and_overlap() {
        let catalog = test_catalog();
        let graph = ConstraintGraph::build(&catalog);

        // child.parent_id ↔ parent.id overlap {1, 2}.
        let fk = graph.node(0, 1);
        let neighbors: Vec<_> = graph.neighbors(fk).collect();
        assert_eq!(neighbors.len(), 1);
        let (peer, weight) = neighbors[0];
        assert_eq!(graph.node_ref(peer), NodeRef { relation: 1, column: 0 });
        assert_eq!(weight, 2);

        // Text columns with disjoint samples stay unconnected.
        let note = graph.node(0, 2);
        assert_eq!(graph.neighbors(note).count(), 0);
    }

    #[test]
    fn adjacency_is_symmetric() {
        let catalog = test_catalog();
        let graph = ConstraintGraph::build(&catalog);
        let fk = graph.node(0, 1);
        let pk = graph.node(1, 0);
        assert!(graph.neighbors(fk).any(|(n, _)| n == pk));
        assert!(graph.neighbors(pk).any(|(n, _)| n == fk));
    }

    #[test]
    fn contains_covers_isolated_relations() {
        let catalog = Catalog::from_relations(vec![
            Relation {
                name: "child".to_string(),
                columns: vec![
                    column("id", DomainTag::Integer, &[10, 11]),
                    column("parent_id", DomainTag::Integer, &[1, 2]),
                ],
                row_count: 2,
            },
            Relation {
                name: "parent".to_string(),
                columns: vec![column("id", DomainTag::Integer, &[1, 2, 3])],
                row_count: 3,
            },
            // No sample overlap with anything: nodes exist, edges do not.
            Relation {
                name: "island".to_string(),
                columns: vec![column("tag", DomainTag::Text, &[7000])],
                row_count: 1,
            },
        ]);
        let graph = ConstraintGraph::build(&catalog);

        assert!(graph.contains("child"));
        assert!(graph.contains("parent"));
        assert!(graph.contains("island"));
        assert_eq!(graph.neighbors(graph.node(1, 0)).count(), 0);
        assert!(!graph.contains("missing"));
    }

    #[test]
    fn neighbor_order_is_weight_then_name() {
        // parent.id overlaps both child.id (weight 0 — disjoint) and
        // child.parent_id (weight 2); give child.id a partial overlap to
        // force an ordering decision.
        let catalog = Catalog::from_relations(vec![
            Relation {
                name: "child".to_string(),
                columns: vec![
                    column("id", DomainTag::Integer, &[1, 50]),
                    column("parent_id", DomainTag::Integer, &[1, 2]),
                ],
                row_count: 2,
            },
            Relation {
                name: "parent".to_string(),
                columns: vec![column("id", DomainTag::Integer, &[1, 2, 3])],
                row_count: 3,
            },
        ]);
        let graph = ConstraintGraph::build(&catalog);
        let pk = graph.node(1, 0);
        let order: Vec<_> = graph
            .neighbors(pk)
            .map(|(n, w)| (graph.node_ref(n), w))
            .collect();
        assert_eq!(order[0], (NodeRef { relation: 0, column: 1 }, 2));
        assert_eq!(order[1], (NodeRef { relation: 0, column: 0 }, 1));
    }
}
