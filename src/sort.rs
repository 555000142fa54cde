//! Deterministic dependency ordering via Kahn's algorithm.
//!
//! Pure and synchronous: given atom names and dependency edges, produce an
//! order in which every atom appears after everything it depends on, or
//! report the atoms stuck in a cycle.

use std::collections::{HashMap, VecDeque};

use crate::types::{AtomName, DependencyEdge};

/// The dependency graph contains at least one cycle.
///
/// `remaining` holds every node left unsorted once no zero-in-degree node
/// remains; it is a superset of the minimal cycle and is reported whole.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Cycle detected in dependency graph. Involved atoms: {}", remaining_list(.remaining))]
pub struct CycleError {
    /// Atoms that could not be ordered, in input order.
    pub remaining: Vec<AtomName>,
}

fn remaining_list(remaining: &[AtomName]) -> String {
    let names: Vec<&str> = remaining.iter().map(AtomName::as_str).collect();
    names.join(", ")
}

/// Order `nodes` so that every dependency precedes its dependents.
///
/// Tie-break policy: nodes are processed first-seen-first-processed (seeded
/// in input order, discovered in edge order), so the result is deterministic
/// for a fixed input ordering, not alphabetical.
///
/// Edges whose `depends_on` target is absent from `nodes` are dropped, and
/// self-edges carry no ordering constraint; neither blocks sorting.
pub fn sort_atoms(
    nodes: &[AtomName],
    edges: &[DependencyEdge],
) -> Result<Vec<AtomName>, CycleError> {
    let index: HashMap<&AtomName, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, name)| (name, i))
        .collect();

    // dependents[i] lists nodes that must wait for node i, in edge order.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];

    for edge in edges {
        if edge.is_self_edge() {
            continue;
        }
        let (Some(&dep), Some(&target)) = (
            index.get(&edge.dependent),
            index.get(&edge.depends_on),
        ) else {
            // Target (or dependent) not among the nodes: drop the edge.
            continue;
        };
        dependents[target].push(dep);
        in_degree[dep] += 1;
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted: Vec<usize> = Vec::with_capacity(nodes.len());

    while let Some(current) = queue.pop_front() {
        sorted.push(current);
        for &dep in &dependents[current] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                queue.push_back(dep);
            }
        }
    }

    if sorted.len() != nodes.len() {
        let placed: Vec<bool> = {
            let mut placed = vec![false; nodes.len()];
            for &i in &sorted {
                placed[i] = true;
            }
            placed
        };
        let remaining = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| !placed[*i])
            .map(|(_, name)| name.clone())
            .collect();
        return Err(CycleError { remaining });
    }

    Ok(sorted.into_iter().map(|i| nodes[i].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(list: &[&str]) -> Vec<AtomName> {
        list.iter().map(|s| AtomName::raw(s)).collect()
    }

    fn edge(dependent: &str, depends_on: &str) -> DependencyEdge {
        DependencyEdge::new(AtomName::raw(dependent), AtomName::raw(depends_on))
    }

    #[test]
    fn test_linear_chain() {
        let nodes = names(&["c", "b", "a"]);
        let edges = vec![edge("c", "b"), edge("b", "a")];
        let order = sort_atoms(&nodes, &edges).unwrap();
        assert_eq!(order, names(&["a", "b", "c"]));
    }

    #[test]
    fn test_concrete_scenario() {
        // math_clamp (util, no deps), player_jump (feature, depends on it)
        let nodes = names(&["math_clamp", "player_jump"]);
        let edges = vec![edge("player_jump", "math_clamp")];
        let order = sort_atoms(&nodes, &edges).unwrap();
        assert_eq!(order, names(&["math_clamp", "player_jump"]));
    }

    #[test]
    fn test_tie_break_is_input_order_not_alphabetical() {
        // All independent: output must preserve input order.
        let nodes = names(&["zeta", "alpha", "mid"]);
        let order = sort_atoms(&nodes, &[]).unwrap();
        assert_eq!(order, names(&["zeta", "alpha", "mid"]));
    }

    #[test]
    fn test_missing_target_edge_is_dropped() {
        let nodes = names(&["a", "b"]);
        let edges = vec![edge("a", "missing"), edge("a", "b")];
        let order = sort_atoms(&nodes, &edges).unwrap();
        assert_eq!(order, names(&["b", "a"]));
    }

    #[test]
    fn test_self_edge_is_inert() {
        let nodes = names(&["a", "b"]);
        let edges = vec![edge("a", "a"), edge("b", "a")];
        let order = sort_atoms(&nodes, &edges).unwrap();
        assert_eq!(order, names(&["a", "b"]));
    }

    #[test]
    fn test_two_node_cycle_reports_both() {
        let nodes = names(&["loop_a", "loop_b"]);
        let edges = vec![edge("loop_a", "loop_b"), edge("loop_b", "loop_a")];
        let err = sort_atoms(&nodes, &edges).unwrap_err();
        assert_eq!(err.remaining, names(&["loop_a", "loop_b"]));
        let message = err.to_string();
        assert!(message.contains("loop_a"));
        assert!(message.contains("loop_b"));
    }

    #[test]
    fn test_cycle_report_excludes_sortable_prefix() {
        // "base" sorts fine; the cycle holds only x and y.
        let nodes = names(&["base", "x", "y"]);
        let edges = vec![edge("x", "base"), edge("x", "y"), edge("y", "x")];
        let err = sort_atoms(&nodes, &edges).unwrap_err();
        assert_eq!(err.remaining, names(&["x", "y"]));
    }

    #[test]
    fn test_idempotent() {
        let nodes = names(&["d", "c", "b", "a"]);
        let edges = vec![edge("d", "b"), edge("c", "a"), edge("b", "a")];
        let first = sort_atoms(&nodes, &edges).unwrap();
        let second = sort_atoms(&nodes, &edges).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_diamond() {
        let nodes = names(&["top", "left", "right", "bottom"]);
        let edges = vec![
            edge("top", "left"),
            edge("top", "right"),
            edge("left", "bottom"),
            edge("right", "bottom"),
        ];
        let order = sort_atoms(&nodes, &edges).unwrap();
        assert_eq!(order, names(&["bottom", "left", "right", "top"]));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Property tests
    // ─────────────────────────────────────────────────────────────────────

    /// Random DAG: edges only point from higher to lower indices, so the
    /// graph is acyclic by construction.
    fn arb_dag() -> impl Strategy<Value = (Vec<AtomName>, Vec<DependencyEdge>)> {
        (2usize..12).prop_flat_map(|n| {
            let nodes: Vec<AtomName> = (0..n)
                .map(|i| AtomName::raw(&format!("atom_{i}")))
                .collect();
            let edges = proptest::collection::vec((1..n, 0..n), 0..2 * n).prop_map(
                move |pairs| {
                    pairs
                        .into_iter()
                        .filter(|(hi, lo)| lo < hi)
                        .map(|(hi, lo)| {
                            DependencyEdge::new(
                                AtomName::raw(&format!("atom_{hi}")),
                                AtomName::raw(&format!("atom_{lo}")),
                            )
                        })
                        .collect::<Vec<_>>()
                },
            );
            (Just(nodes), edges)
        })
    }

    proptest! {
        #[test]
        fn prop_dag_sorts_to_valid_permutation((nodes, edges) in arb_dag()) {
            let order = sort_atoms(&nodes, &edges).unwrap();

            // Permutation of the input.
            let mut sorted_names = order.clone();
            sorted_names.sort();
            let mut input_names = nodes.clone();
            input_names.sort();
            prop_assert_eq!(sorted_names, input_names);

            // Every in-set edge respected: depends_on before dependent.
            let position: std::collections::HashMap<&AtomName, usize> =
                order.iter().enumerate().map(|(i, n)| (n, i)).collect();
            for e in &edges {
                prop_assert!(position[&e.depends_on] < position[&e.dependent]);
            }
        }

        #[test]
        fn prop_sort_is_deterministic((nodes, edges) in arb_dag()) {
            prop_assert_eq!(
                sort_atoms(&nodes, &edges).unwrap(),
                sort_atoms(&nodes, &edges).unwrap()
            );
        }
    }
}
