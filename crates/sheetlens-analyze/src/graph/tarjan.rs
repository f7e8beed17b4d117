//! Strongly-connected components, cycle extraction and condensation depth.
//!
//! Tarjan's algorithm, iterative so deep dependency chains cannot overflow
//! the thread stack. Components are emitted in reverse topological order:
//! a component is completed only after everything reachable from it, so a
//! node's dependencies always land at smaller component ids.

use crate::cancel::{CancelToken, POLL_INTERVAL};
use crate::cells::{CellTable, NodeId};
use crate::error::EngineError;

/// Component assignment for every node, plus member lists per component.
#[derive(Debug)]
pub struct SccResult {
    pub comp_of: Vec<u32>,
    pub comps: Vec<Vec<NodeId>>,
}

struct NodeState {
    index: u32,
    lowlink: u32,
    on_stack: bool,
}

const UNVISITED: u32 = u32::MAX;

/// Iterative Tarjan over the out-adjacency lists.
pub fn strongly_connected_components(
    out_adj: &[Vec<NodeId>],
    cancel: &CancelToken,
) -> Result<SccResult, EngineError> {
    let n = out_adj.len();
    let mut state: Vec<NodeState> = (0..n)
        .map(|_| NodeState { index: UNVISITED, lowlink: 0, on_stack: false })
        .collect();
    let mut comp_of = vec![u32::MAX; n];
    let mut comps: Vec<Vec<NodeId>> = Vec::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut next_index: u32 = 0;
    let mut iterations: usize = 0;

    // Work items: (node, next-neighbour position).
    let mut work: Vec<(NodeId, usize)> = Vec::new();

    for root in 0..n as NodeId {
        if state[root as usize].index != UNVISITED {
            continue;
        }
        work.push((root, 0));
        while let Some(&mut (v, ref mut ni)) = work.last_mut() {
            iterations += 1;
            if iterations % POLL_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let vi = v as usize;
            if *ni == 0 {
                state[vi].index = next_index;
                state[vi].lowlink = next_index;
                next_index += 1;
                state[vi].on_stack = true;
                stack.push(v);
            }
            if let Some(&w) = out_adj[vi].get(*ni) {
                *ni += 1;
                let wi = w as usize;
                if state[wi].index == UNVISITED {
                    work.push((w, 0));
                } else if state[wi].on_stack {
                    state[vi].lowlink = state[vi].lowlink.min(state[wi].index);
                }
                continue;
            }
            // All neighbours done: maybe emit a component, then propagate
            // the lowlink to the parent.
            if state[vi].lowlink == state[vi].index {
                let comp_id = comps.len() as u32;
                let mut members = Vec::new();
                loop {
                    let w = stack.pop().expect("tarjan stack underflow");
                    state[w as usize].on_stack = false;
                    comp_of[w as usize] = comp_id;
                    members.push(w);
                    if w == v {
                        break;
                    }
                }
                comps.push(members);
            }
            work.pop();
            if let Some(&(parent, _)) = work.last() {
                let pi = parent as usize;
                state[pi].lowlink = state[pi].lowlink.min(state[vi].lowlink);
            }
        }
    }

    Ok(SccResult { comp_of, comps })
}

/// Cycles are components of size ≥ 2 plus single nodes with a self-loop.
/// Members are listed in traversal order starting from the
/// lexicographically smallest address, so equal inputs produce identical
/// cycle reports.
pub fn extract_cycles(
    scc: &SccResult,
    out_adj: &[Vec<NodeId>],
    cells: &CellTable,
) -> Vec<Vec<NodeId>> {
    let mut cycles = Vec::new();
    for members in &scc.comps {
        let is_cycle = members.len() >= 2
            || (members.len() == 1 && out_adj[members[0] as usize].contains(&members[0]));
        if !is_cycle {
            continue;
        }
        cycles.push(order_cycle(members, out_adj, cells));
    }
    cycles.sort_by(|a, b| cells.get(a[0]).address.cmp(&cells.get(b[0]).address));
    cycles
}

/// Walk the component edge by edge from its smallest member, always taking
/// the smallest-addressed unvisited in-component neighbour, falling back to
/// the smallest unvisited member when a branch dead-ends.
fn order_cycle(members: &[NodeId], out_adj: &[Vec<NodeId>], cells: &CellTable) -> Vec<NodeId> {
    let comp: rustc_hash::FxHashSet<NodeId> = members.iter().copied().collect();
    let smallest = *members
        .iter()
        .min_by(|a, b| cells.get(**a).address.cmp(&cells.get(**b).address))
        .expect("components are never empty");

    let mut ordered = Vec::with_capacity(members.len());
    let mut visited: rustc_hash::FxHashSet<NodeId> = Default::default();
    let mut current = smallest;
    loop {
        ordered.push(current);
        visited.insert(current);
        if ordered.len() == members.len() {
            break;
        }
        let next = out_adj[current as usize]
            .iter()
            .filter(|w| comp.contains(w) && !visited.contains(w))
            .min_by(|a, b| cells.get(**a).address.cmp(&cells.get(**b).address))
            .copied()
            .or_else(|| {
                members
                    .iter()
                    .filter(|w| !visited.contains(w))
                    .min_by(|a, b| cells.get(**a).address.cmp(&cells.get(**b).address))
                    .copied()
            });
        current = next.expect("unvisited member must exist");
    }
    ordered
}

/// Longest dependency chain through the condensation, where each component
/// weighs its member count. Reported as the path weight minus one, so a
/// single cell has depth 0 and a two-cell cycle depth 1.
pub fn condensation_depth(scc: &SccResult, out_adj: &[Vec<NodeId>]) -> u32 {
    let m = scc.comps.len();
    if m == 0 {
        return 0;
    }
    let mut best = vec![0u64; m];
    // Component ids are already reverse-topological: every successor
    // (dependency) of a component has a smaller id, so one ascending pass
    // suffices.
    for (c, members) in scc.comps.iter().enumerate() {
        let weight = members.len() as u64;
        let mut deepest_dep = 0u64;
        for &v in members {
            for &w in &out_adj[v as usize] {
                let d = scc.comp_of[w as usize] as usize;
                if d != c {
                    deepest_dep = deepest_dep.max(best[d]);
                }
            }
        }
        best[c] = weight + deepest_dep;
    }
    (best.iter().copied().max().unwrap_or(1) - 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetlens_common::CellAddress;

    fn table(n: usize) -> CellTable {
        let mut cells = CellTable::new();
        for i in 0..n {
            let addr = CellAddress::parse_a1(&format!("S!A{}", i + 1)).unwrap();
            cells.insert_populated(addr, None, Some(format!("=B{}", i + 1)));
        }
        cells
    }

    fn scc(adj: &[Vec<NodeId>]) -> SccResult {
        strongly_connected_components(adj, &CancelToken::new()).unwrap()
    }

    #[test]
    fn acyclic_chain_has_singleton_components() {
        // 0 -> 1 -> 2
        let adj = vec![vec![1], vec![2], vec![]];
        let result = scc(&adj);
        assert_eq!(result.comps.len(), 3);
        assert!(result.comps.iter().all(|c| c.len() == 1));
        // Dependencies land at smaller component ids.
        assert!(result.comp_of[2] < result.comp_of[1]);
        assert!(result.comp_of[1] < result.comp_of[0]);
        assert_eq!(condensation_depth(&result, &adj), 2);
    }

    #[test]
    fn two_node_cycle() {
        let adj = vec![vec![1], vec![0]];
        let result = scc(&adj);
        assert_eq!(result.comps.len(), 1);
        let cells = table(2);
        let cycles = extract_cycles(&result, &adj, &cells);
        assert_eq!(cycles, vec![vec![0, 1]]);
        assert_eq!(condensation_depth(&result, &adj), 1);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let adj = vec![vec![0]];
        let result = scc(&adj);
        let cells = table(1);
        let cycles = extract_cycles(&result, &adj, &cells);
        assert_eq!(cycles, vec![vec![0]]);
        assert_eq!(condensation_depth(&result, &adj), 0);
    }

    #[test]
    fn cycle_with_tail() {
        // 3 -> 0 <-> 1, 2 isolated
        let adj = vec![vec![1], vec![0], vec![], vec![0]];
        let result = scc(&adj);
        let cells = table(4);
        let cycles = extract_cycles(&result, &adj, &cells);
        assert_eq!(cycles, vec![vec![0, 1]]);
        // Path 3 -> {0,1}: weight 1 + 2 = 3, depth 2.
        assert_eq!(condensation_depth(&result, &adj), 2);
    }

    #[test]
    fn cancellation_aborts() {
        let token = CancelToken::new();
        token.cancel();
        // Needs enough nodes to hit a poll boundary.
        let adj: Vec<Vec<NodeId>> = (0..2048).map(|i| if i + 1 < 2048 { vec![i + 1] } else { vec![] }).collect();
        let result = strongly_connected_components(&adj, &token);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
