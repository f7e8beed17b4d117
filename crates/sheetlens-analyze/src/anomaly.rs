//! Structural anomaly detection over the frozen graph.
//!
//! Purely read-only: running the detector twice over the same graph yields
//! the same list, in the same order. Output is sorted by severity
//! (descending), then type, then cell address.

use serde::Serialize;
use serde_json::{Map, Value, json};

use rustc_hash::FxHashMap;

use sheetlens_common::CellAddress;

use crate::cells::{CellTable, NodeId};
use crate::graph::{DependencyGraph, NamedIssue};
use crate::options::AnalyzeOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    fn rank(self) -> u8 {
        match self {
            Severity::High => 0,
            Severity::Medium => 1,
            Severity::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    BrokenReference,
    CircularReference,
    DynamicUnresolved,
    HardCodedOverwrite,
    HighComplexity,
    MissingDependency,
    UnusedFormula,
}

impl AnomalyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyKind::BrokenReference => "broken_reference",
            AnomalyKind::CircularReference => "circular_reference",
            AnomalyKind::DynamicUnresolved => "dynamic_unresolved",
            AnomalyKind::HardCodedOverwrite => "hard_coded_overwrite",
            AnomalyKind::HighComplexity => "high_complexity",
            AnomalyKind::MissingDependency => "missing_dependency",
            AnomalyKind::UnusedFormula => "unused_formula",
        }
    }

    fn severity(self) -> Severity {
        match self {
            AnomalyKind::CircularReference
            | AnomalyKind::BrokenReference
            | AnomalyKind::MissingDependency => Severity::High,
            AnomalyKind::HardCodedOverwrite | AnomalyKind::HighComplexity => Severity::Medium,
            AnomalyKind::UnusedFormula | AnomalyKind::DynamicUnresolved => Severity::Low,
        }
    }
}

/// One detected defect.
#[derive(Debug, Clone)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub address: CellAddress,
    pub severity: Severity,
    pub description: String,
    pub suggestion: Option<String>,
    pub metadata: Map<String, Value>,
}

impl Anomaly {
    fn new(kind: AnomalyKind, address: CellAddress, description: String) -> Self {
        Anomaly {
            kind,
            address,
            severity: kind.severity(),
            description,
            suggestion: None,
            metadata: Map::new(),
        }
    }

    fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Per-formula facts carried over from tokenizing, extraction and dynamic
/// resolution.
#[derive(Debug, Clone)]
pub struct FormulaNotes {
    pub node: NodeId,
    /// Tokenizer recovery fired, or a reference had out-of-bounds
    /// coordinates.
    pub parse_flagged: bool,
    /// The formula text embeds `#REF!` or `#NAME?`.
    pub ref_error_literal: bool,
    /// A dynamic call could not be reduced.
    pub dynamic_unresolved: bool,
    /// Canonical operator count.
    pub complexity: usize,
}

/// Run every detector over the frozen graph.
pub fn detect_anomalies(
    graph: &DependencyGraph,
    cells: &CellTable,
    notes: &[FormulaNotes],
    options: &AnalyzeOptions,
) -> Vec<Anomaly> {
    let mut out = Vec::new();
    circular_references(graph, cells, &mut out);
    reference_health(graph, cells, notes, &mut out);
    named_issues(graph, cells, &mut out);
    hard_coded_overwrites(cells, options, &mut out);
    formula_hygiene(graph, cells, notes, options, &mut out);

    out.sort_by(|a, b| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
            .then_with(|| a.address.cmp(&b.address))
    });
    out
}

fn circular_references(graph: &DependencyGraph, cells: &CellTable, out: &mut Vec<Anomaly>) {
    for cycle in &graph.cycles {
        let addresses: Vec<String> =
            cycle.iter().map(|&id| cells.get(id).address.to_a1()).collect();
        let anchor = cells.get(cycle[0]).address.clone();
        out.push(
            Anomaly::new(
                AnomalyKind::CircularReference,
                anchor,
                format!("Circular reference through {} cell(s)", cycle.len()),
            )
            .suggest("Rewrite one of the cells in the cycle so it no longer refers back to itself")
            .with_meta("cycle", json!(addresses)),
        );
    }
}

/// Broken references and missing dependencies share the implicit-node scan;
/// the source cell's own error marker decides which one fires.
fn reference_health(
    graph: &DependencyGraph,
    cells: &CellTable,
    notes: &[FormulaNotes],
    out: &mut Vec<Anomaly>,
) {
    for note in notes {
        let info = cells.get(note.node);
        if note.parse_flagged || note.ref_error_literal {
            let reason = if note.parse_flagged {
                "formula could not be fully tokenized"
            } else {
                "formula contains a reference error literal"
            };
            out.push(
                Anomaly::new(
                    AnomalyKind::BrokenReference,
                    info.address.clone(),
                    format!("Broken reference: {reason}"),
                )
                .suggest("Repair the formula so every reference resolves"),
            );
        }
    }

    for edge in &graph.edges {
        if !cells.is_implicit(edge.target) {
            continue;
        }
        let source = cells.get(edge.source);
        let target = cells.get(edge.target);
        if source.has_error() {
            out.push(
                Anomaly::new(
                    AnomalyKind::BrokenReference,
                    source.address.clone(),
                    format!(
                        "Reference to {} which was never populated, and the cell carries an error value",
                        target.address.to_a1()
                    ),
                )
                .suggest("Repair the formula so every reference resolves")
                .with_meta("target", json!(target.address.to_a1())),
            );
        } else {
            out.push(
                Anomaly::new(
                    AnomalyKind::MissingDependency,
                    source.address.clone(),
                    format!("Depends on {} which was never populated", target.address.to_a1()),
                )
                .suggest("Populate the referenced cell or remove the reference")
                .with_meta("target", json!(target.address.to_a1())),
            );
        }
    }
}

fn named_issues(graph: &DependencyGraph, cells: &CellTable, out: &mut Vec<Anomaly>) {
    for issue in &graph.named_issues {
        match issue {
            NamedIssue::Unknown { source, name } => {
                let address = cells.get(*source).address.clone();
                out.push(
                    Anomaly::new(
                        AnomalyKind::MissingDependency,
                        address,
                        format!("Named range '{name}' is not defined in this workbook"),
                    )
                    .suggest("Define the name or correct its spelling")
                    .with_meta("name", json!(name)),
                );
            }
            NamedIssue::TooDeep { source, name } => {
                let address = cells.get(*source).address.clone();
                out.push(
                    Anomaly::new(
                        AnomalyKind::MissingDependency,
                        address,
                        format!("Named range '{name}' nests deeper than the resolution bound"),
                    )
                    .with_meta("name", json!(name)),
                );
            }
            NamedIssue::Cycle { source, path } => {
                let address = cells.get(*source).address.clone();
                out.push(
                    Anomaly::new(
                        AnomalyKind::CircularReference,
                        address,
                        "Named range definitions form a cycle".to_string(),
                    )
                    .suggest("Break the cycle between the named range definitions")
                    .with_meta("named_ranges", json!(path)),
                );
            }
        }
    }
}

/// A literal sitting in a neighbourhood that is otherwise formulas usually
/// means someone pasted a value over a computed cell.
fn hard_coded_overwrites(cells: &CellTable, options: &AnalyzeOptions, out: &mut Vec<Anomaly>) {
    // (sheet, row, col) -> has_formula, populated cells only.
    let mut by_pos: FxHashMap<(&str, u32, u32), bool> = FxHashMap::default();
    for (_, info) in cells.iter() {
        if info.is_input() || info.has_formula() {
            by_pos.insert(
                (info.address.sheet.as_str(), info.address.row(), info.address.col()),
                info.has_formula(),
            );
        }
    }

    let window = options.hardcode_window;
    for (_, info) in cells.iter() {
        if !info.is_input() {
            continue;
        }
        let sheet = info.address.sheet.as_str();
        let (row, col) = (info.address.row(), info.address.col());

        let mut row_peers = 0usize;
        let mut row_formulas = 0usize;
        let mut col_peers = 0usize;
        let mut col_formulas = 0usize;
        for delta in 1..=window {
            for c in [col.checked_sub(delta), col.checked_add(delta)] {
                let Some(c) = c.filter(|&c| c >= 1) else { continue };
                if let Some(&is_formula) = by_pos.get(&(sheet, row, c)) {
                    row_peers += 1;
                    row_formulas += usize::from(is_formula);
                }
            }
            for r in [row.checked_sub(delta), row.checked_add(delta)] {
                let Some(r) = r.filter(|&r| r >= 1) else { continue };
                if let Some(&is_formula) = by_pos.get(&(sheet, r, col)) {
                    col_peers += 1;
                    col_formulas += usize::from(is_formula);
                }
            }
        }

        if row_peers < options.hardcode_min_peers || col_peers < options.hardcode_min_peers {
            continue;
        }
        let row_ratio = row_formulas as f64 / row_peers as f64;
        let col_ratio = col_formulas as f64 / col_peers as f64;
        if row_ratio >= options.hardcode_ratio && col_ratio >= options.hardcode_ratio {
            out.push(
                Anomaly::new(
                    AnomalyKind::HardCodedOverwrite,
                    info.address.clone(),
                    "Literal value surrounded by formulas; likely overwrites a computed cell"
                        .to_string(),
                )
                .suggest("Restore the formula or move the constant to an input area")
                .with_meta("row_formula_ratio", json!(row_ratio))
                .with_meta("col_formula_ratio", json!(col_ratio)),
            );
        }
    }
}

fn formula_hygiene(
    graph: &DependencyGraph,
    cells: &CellTable,
    notes: &[FormulaNotes],
    options: &AnalyzeOptions,
    out: &mut Vec<Anomaly>,
) {
    for note in notes {
        let info = cells.get(note.node);
        if graph.in_degree(note.node) == 0 && graph.out_degree(note.node) == 0 {
            out.push(
                Anomaly::new(
                    AnomalyKind::UnusedFormula,
                    info.address.clone(),
                    "Formula has no dependents and no dependencies".to_string(),
                )
                .suggest("Delete the cell or wire its result into the model"),
            );
        }
        if note.complexity > options.complexity_threshold {
            out.push(
                Anomaly::new(
                    AnomalyKind::HighComplexity,
                    info.address.clone(),
                    format!("Formula uses {} operators", note.complexity),
                )
                .suggest("Split the computation across intermediate cells")
                .with_meta("operator_count", json!(note.complexity)),
            );
        }
        if note.dynamic_unresolved {
            out.push(Anomaly::new(
                AnomalyKind::DynamicUnresolved,
                info.address.clone(),
                "INDIRECT/OFFSET/INDEX argument could not be resolved statically".to_string(),
            ));
        }
    }
}
