//! Dependency graph assembly.
//!
//! Two-phase construction over the frozen cell table: the node set comes
//! from the reader (phase 1, in [`crate::cells`]); edges are added here by a
//! single writer draining the per-cell resolved references in deterministic
//! order. Multi-edges between the same pair coalesce to the strongest kind.

pub mod tarjan;

use rustc_hash::FxHashMap;
use serde::Serialize;

use sheetlens_common::{CellAddress, CellRange, Coord};
use sheetlens_parse::{ExtractedRef, RefTarget};

use crate::cancel::CancelToken;
use crate::cells::{CellFlags, CellTable, NodeId};
use crate::error::EngineError;
use crate::named::{NamedRangeTable, NamedTarget};

/// Edge classification, strongest first. Coalescing keeps the strongest
/// kind for a `(source, target)` pair: `direct > dynamic > range_member >
/// named`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Direct,
    Dynamic,
    RangeMember,
    Named,
}

impl EdgeKind {
    pub fn strength(self) -> u8 {
        match self {
            EdgeKind::Direct => 3,
            EdgeKind::Dynamic => 2,
            EdgeKind::RangeMember => 1,
            EdgeKind::Named => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Direct => "direct",
            EdgeKind::Dynamic => "dynamic",
            EdgeKind::RangeMember => "range_member",
            EdgeKind::Named => "named",
        }
    }
}

/// A dependency: `source` is the formula's home, `target` a cell it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

/// A range whose expansion was capped; kept so callers and the anomaly pass
/// still see the full extent.
#[derive(Debug, Clone)]
pub struct LargeRange {
    pub source: NodeId,
    pub range: CellRange,
    pub cell_count: u64,
}

/// A reference after dynamic resolution, ready for edge construction.
/// Sheets are already bound to the formula's home sheet where they were
/// omitted.
#[derive(Debug, Clone)]
pub enum ResolvedRef {
    Cell { address: CellAddress, kind: EdgeKind },
    Range { range: CellRange, kind: EdgeKind },
    Named(String),
}

impl ResolvedRef {
    /// Bind an extracted static reference to its home sheet. Static cells
    /// become `direct` references; static ranges expand as `range_member`
    /// later.
    pub fn from_static(r: &ExtractedRef, home_sheet: &str) -> Self {
        match &r.target {
            RefTarget::Cell { sheet, coord } => ResolvedRef::Cell {
                address: CellAddress::new(
                    sheet.clone().unwrap_or_else(|| home_sheet.to_string()),
                    *coord,
                ),
                kind: EdgeKind::Direct,
            },
            RefTarget::Range { sheet, start, end } => ResolvedRef::Range {
                range: CellRange {
                    sheet: sheet.clone().unwrap_or_else(|| home_sheet.to_string()),
                    start: *start,
                    end: *end,
                },
                kind: EdgeKind::RangeMember,
            },
            RefTarget::Named(name) => ResolvedRef::Named(name.clone()),
        }
    }

    /// Key used to order references deterministically before the single
    /// writer consumes them.
    pub fn sort_key(&self) -> (u8, String, u8) {
        match self {
            ResolvedRef::Cell { address, kind } => (0, address.to_a1(), 3 - kind.strength()),
            ResolvedRef::Range { range, kind } => (1, range.to_string(), 3 - kind.strength()),
            ResolvedRef::Named(name) => (2, name.to_lowercase(), 3),
        }
    }
}

/// Problems discovered while chasing named references; turned into
/// anomalies by the detector.
#[derive(Debug, Clone, PartialEq)]
pub enum NamedIssue {
    /// The name does not exist in the workbook.
    Unknown { source: NodeId, name: String },
    /// Name definitions refer back to themselves; the cycle is broken at
    /// the point of detection.
    Cycle { source: NodeId, path: Vec<String> },
    /// Nesting exceeded the resolution depth bound.
    TooDeep { source: NodeId, name: String },
}

/// The finalized graph. Everything is immutable after [`GraphBuilder::finish`].
#[derive(Debug)]
pub struct DependencyGraph {
    pub edges: Vec<Edge>,
    pub large_ranges: Vec<LargeRange>,
    pub named_issues: Vec<NamedIssue>,
    /// Cycles: every SCC of size ≥ 2 plus every self-loop, members in
    /// traversal order from the lexicographically smallest address.
    pub cycles: Vec<Vec<NodeId>>,
    pub max_depth: u32,
    /// Component decomposition, kept for the cost-driver pass.
    pub scc: tarjan::SccResult,
    out_adj: Vec<Vec<NodeId>>,
    in_degree: Vec<u32>,
    out_degree: Vec<u32>,
}

impl DependencyGraph {
    pub fn node_count(&self, cells: &CellTable) -> usize {
        cells.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Targets read by `source`, deduplicated, in edge order.
    pub fn targets_of(&self, source: NodeId) -> &[NodeId] {
        &self.out_adj[source as usize]
    }

    /// Number of distinct cells `node` reads.
    pub fn out_degree(&self, node: NodeId) -> u32 {
        self.out_degree[node as usize]
    }

    /// Number of distinct cells that read `node`.
    pub fn in_degree(&self, node: NodeId) -> u32 {
        self.in_degree[node as usize]
    }
}

/// Single-writer edge assembly. The dedup map is private to the builder;
/// nothing here is shared across threads.
pub struct GraphBuilder<'a> {
    cells: &'a mut CellTable,
    named: &'a NamedRangeTable,
    fan_out_cap: u64,
    named_depth_limit: usize,
    dedup: FxHashMap<(NodeId, NodeId), EdgeKind>,
    edge_order: Vec<(NodeId, NodeId)>,
    large_ranges: Vec<LargeRange>,
    named_issues: Vec<NamedIssue>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        cells: &'a mut CellTable,
        named: &'a NamedRangeTable,
        fan_out_cap: u64,
        named_depth_limit: usize,
    ) -> Self {
        GraphBuilder {
            cells,
            named,
            fan_out_cap,
            named_depth_limit,
            dedup: FxHashMap::default(),
            edge_order: Vec::new(),
            large_ranges: Vec::new(),
            named_issues: Vec::new(),
        }
    }

    /// Add every edge implied by one resolved reference of `source`.
    pub fn add_reference(&mut self, source: NodeId, reference: &ResolvedRef) {
        match reference {
            ResolvedRef::Cell { address, kind } => self.add_cell_edge(source, address, *kind),
            ResolvedRef::Range { range, kind } => self.add_range_edges(source, range, *kind),
            ResolvedRef::Named(name) => {
                let mut path = Vec::new();
                self.add_named_edges(source, name, 0, &mut path);
            }
        }
    }

    fn add_cell_edge(&mut self, source: NodeId, target: &CellAddress, kind: EdgeKind) {
        let target_id = self.cells.intern(target);
        self.insert_edge(source, target_id, kind);
    }

    fn add_range_edges(&mut self, source: NodeId, range: &CellRange, kind: EdgeKind) {
        if range.len() > self.fan_out_cap {
            // One summary edge to the top-left corner caps the fan-out; the
            // full extent stays visible through `large_ranges`.
            self.large_ranges.push(LargeRange {
                source,
                range: range.clone(),
                cell_count: range.len(),
            });
            self.add_cell_edge(source, &range.top_left(), kind);
            return;
        }
        for address in range.expand() {
            self.add_cell_edge(source, &address, kind);
        }
    }

    /// Chase a named reference. All edges emitted below a name are `named`,
    /// regardless of the target shape.
    fn add_named_edges(
        &mut self,
        source: NodeId,
        name: &str,
        depth: usize,
        path: &mut Vec<String>,
    ) {
        if depth >= self.named_depth_limit {
            self.named_issues.push(NamedIssue::TooDeep {
                source,
                name: name.to_string(),
            });
            return;
        }
        let key = name.to_lowercase();
        if path.iter().any(|p| p == &key) {
            let mut cycle_path = path.clone();
            cycle_path.push(key);
            self.named_issues.push(NamedIssue::Cycle { source, path: cycle_path });
            return;
        }
        let named = self.named;
        let Some(entry) = named.lookup(name) else {
            self.named_issues.push(NamedIssue::Unknown {
                source,
                name: name.to_string(),
            });
            return;
        };
        path.push(key);
        match &entry.target {
            NamedTarget::Cell(address) => self.add_cell_edge(source, address, EdgeKind::Named),
            NamedTarget::Range(range) => self.add_range_edges(source, range, EdgeKind::Named),
            NamedTarget::Formula(extraction) => {
                for r in &extraction.refs {
                    match &r.target {
                        RefTarget::Cell { sheet: Some(sheet), coord } => {
                            let address = CellAddress::new(sheet.clone(), *coord);
                            self.add_cell_edge(source, &address, EdgeKind::Named);
                        }
                        RefTarget::Range { sheet: Some(sheet), start, end } => {
                            let range =
                                CellRange { sheet: sheet.clone(), start: *start, end: *end };
                            self.add_range_edges(source, &range, EdgeKind::Named);
                        }
                        // A workbook-scoped name has no home sheet; bare
                        // references in its definition cannot be bound.
                        RefTarget::Cell { sheet: None, .. }
                        | RefTarget::Range { sheet: None, .. } => {
                            self.named_issues.push(NamedIssue::Unknown {
                                source,
                                name: entry.name.clone(),
                            });
                        }
                        RefTarget::Named(inner) => {
                            self.add_named_edges(source, inner, depth + 1, path);
                        }
                    }
                }
            }
        }
        path.pop();
    }

    fn insert_edge(&mut self, source: NodeId, target: NodeId, kind: EdgeKind) {
        use std::collections::hash_map::Entry;
        match self.dedup.entry((source, target)) {
            Entry::Vacant(slot) => {
                slot.insert(kind);
                self.edge_order.push((source, target));
            }
            Entry::Occupied(mut slot) => {
                if kind.strength() > slot.get().strength() {
                    slot.insert(kind);
                }
            }
        }
    }

    /// Freeze the edge set: sort deterministically, assign `IS_OUTPUT`,
    /// detect cycles and compute depth metrics.
    pub fn finish(self, cancel: &CancelToken) -> Result<DependencyGraph, EngineError> {
        let GraphBuilder { cells, dedup, mut edge_order, large_ranges, named_issues, .. } = self;

        // Deterministic edge order: (source address, target address).
        edge_order.sort_by(|a, b| {
            let ka = (&cells.get(a.0).address, &cells.get(a.1).address);
            let kb = (&cells.get(b.0).address, &cells.get(b.1).address);
            ka.cmp(&kb)
        });
        let edges: Vec<Edge> = edge_order
            .iter()
            .map(|&(source, target)| Edge { source, target, kind: dedup[&(source, target)] })
            .collect();

        let n = cells.len();
        let mut out_adj: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        let mut in_degree = vec![0u32; n];
        let mut out_degree = vec![0u32; n];
        for edge in &edges {
            out_adj[edge.source as usize].push(edge.target);
            out_degree[edge.source as usize] += 1;
            in_degree[edge.target as usize] += 1;
        }

        // A formula no other cell reads is an output.
        for id in 0..n as NodeId {
            let is_output = cells.get(id).flags.contains(CellFlags::HAS_FORMULA)
                && in_degree[id as usize] == 0;
            cells.set_flag(id, CellFlags::IS_OUTPUT, is_output);
        }

        let scc = tarjan::strongly_connected_components(&out_adj, cancel)?;
        let cycles = tarjan::extract_cycles(&scc, &out_adj, cells);
        let max_depth = tarjan::condensation_depth(&scc, &out_adj);

        Ok(DependencyGraph {
            edges,
            large_ranges,
            named_issues,
            cycles,
            max_depth,
            scc,
            out_adj,
            in_degree,
            out_degree,
        })
    }
}

/// Convenience accessor pairing a coordinate with its sheet, used by tests.
pub fn address(sheet: &str, row: u32, col: u32) -> CellAddress {
    CellAddress::new(sheet, Coord::new(row, col))
}
