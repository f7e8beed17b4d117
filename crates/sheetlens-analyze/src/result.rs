//! The analysis result document.
//!
//! Array ordering is part of the contract: nodes sort by address, edges by
//! `(source, target)`, anomalies by `(severity, type, address)`, drivers by
//! the ranking key. Equal inputs therefore serialize byte-identically.

use serde::Serialize;
use serde_json::{Map, Value};

use sheetlens_common::LiteralValue;

use crate::anomaly::{Anomaly, AnomalyKind, Severity};
use crate::cells::{CellTable, NodeId};
use crate::drivers::CostDriver;
use crate::graph::{DependencyGraph, EdgeKind};

#[derive(Debug, Serialize)]
pub struct AnalysisResult {
    pub job_id: String,
    pub graph: GraphDoc,
    pub anomalies: AnomalyReport,
    pub cost_drivers: DriverReport,
    pub metrics: WorkbookMetrics,
}

#[derive(Debug, Serialize)]
pub struct GraphDoc {
    pub nodes: Vec<NodeDoc>,
    pub edges: Vec<EdgeDoc>,
    pub metrics: GraphMetrics,
}

#[derive(Debug, Serialize)]
pub struct NodeDoc {
    /// Canonical A1 form, `Sheet!A1`.
    pub id: String,
    pub sheet: String,
    pub row: u32,
    pub col: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<LiteralValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    pub has_formula: bool,
    pub is_input: bool,
    pub is_output: bool,
    pub has_error: bool,
}

#[derive(Debug, Serialize)]
pub struct EdgeDoc {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

#[derive(Debug, Serialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub max_depth: u32,
}

#[derive(Debug, Serialize)]
pub struct AnomalyReport {
    pub total_count: usize,
    pub anomalies: Vec<AnomalyDoc>,
}

#[derive(Debug, Serialize)]
pub struct AnomalyDoc {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub cell_address: String,
    pub sheet: String,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct DriverReport {
    pub total_drivers: usize,
    pub top_drivers: Vec<DriverDoc>,
}

#[derive(Debug, Serialize)]
pub struct DriverDoc {
    pub cell_address: String,
    pub centrality_score: f64,
    pub impact_score: f64,
    pub dependent_count: u64,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct WorkbookMetrics {
    pub sheet_count: usize,
    pub formula_count: usize,
    pub input_count: usize,
    pub avg_complexity: f64,
}

impl AnalysisResult {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub(crate) fn assemble(
    job_id: String,
    cells: &CellTable,
    graph: &DependencyGraph,
    anomalies: Vec<Anomaly>,
    drivers: Vec<CostDriver>,
    metrics: WorkbookMetrics,
    include_values: bool,
) -> AnalysisResult {
    let mut ids: Vec<NodeId> = (0..cells.len() as NodeId).collect();
    ids.sort_by(|a, b| cells.get(*a).address.cmp(&cells.get(*b).address));

    let nodes = ids
        .iter()
        .map(|&id| {
            let info = cells.get(id);
            NodeDoc {
                id: info.address.to_a1(),
                sheet: info.address.sheet.clone(),
                row: info.address.row(),
                col: info.address.col(),
                value: if include_values { info.value.clone() } else { None },
                formula: info.formula.clone(),
                has_formula: info.has_formula(),
                is_input: info.is_input(),
                is_output: info.is_output(),
                has_error: info.has_error(),
            }
        })
        .collect();

    let edges = graph
        .edges
        .iter()
        .map(|edge| EdgeDoc {
            source: cells.get(edge.source).address.to_a1(),
            target: cells.get(edge.target).address.to_a1(),
            kind: edge.kind,
        })
        .collect();

    let anomaly_docs: Vec<AnomalyDoc> = anomalies
        .into_iter()
        .map(|a| AnomalyDoc {
            kind: a.kind,
            cell_address: a.address.to_a1(),
            sheet: a.address.sheet,
            severity: a.severity,
            description: a.description,
            suggestion: a.suggestion,
            metadata: a.metadata,
        })
        .collect();

    let driver_docs: Vec<DriverDoc> = drivers
        .into_iter()
        .map(|d| DriverDoc {
            cell_address: d.address.to_a1(),
            centrality_score: d.centrality_score,
            impact_score: d.impact_score,
            dependent_count: d.dependent_count,
            description: d.description,
        })
        .collect();

    AnalysisResult {
        job_id,
        graph: GraphDoc {
            metrics: GraphMetrics {
                node_count: cells.len(),
                edge_count: graph.edge_count(),
                max_depth: graph.max_depth,
            },
            nodes,
            edges,
        },
        anomalies: AnomalyReport { total_count: anomaly_docs.len(), anomalies: anomaly_docs },
        cost_drivers: DriverReport {
            total_drivers: driver_docs.len(),
            top_drivers: driver_docs,
        },
        metrics,
    }
}
