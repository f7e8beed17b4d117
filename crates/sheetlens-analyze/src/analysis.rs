//! End-to-end orchestration: reader → tables → tokenize/extract → named
//! table → dynamic resolve → graph → anomaly + cost-driver passes → result.
//!
//! Data flows strictly one way. The parallel phases are pure per-cell maps
//! whose outputs are re-sorted before the single-writer graph build, so the
//! result document is byte-identical for equal inputs.

use rayon::prelude::*;
use rustc_hash::FxHashSet;

use sheetlens_common::CellAddress;
use sheetlens_io::WorkbookReader;
use sheetlens_parse::{Extraction, TokenStream, extract_references, operator_complexity};

use crate::anomaly::{FormulaNotes, detect_anomalies};
use crate::cancel::CancelToken;
use crate::cells::{CellFlags, CellTable, NodeId};
use crate::drivers::rank_cost_drivers;
use crate::error::EngineError;
use crate::graph::{GraphBuilder, ResolvedRef};
use crate::named::NamedRangeTable;
use crate::options::AnalyzeOptions;
use crate::resolver::{Resolution, resolve_cell};
use crate::result::{AnalysisResult, WorkbookMetrics, assemble};

struct FormulaCell {
    node: NodeId,
    home_sheet: String,
    formula: String,
}

/// Analyze a workbook with default cancellation (none).
pub fn analyze<R: WorkbookReader>(
    reader: &mut R,
    options: &AnalyzeOptions,
) -> Result<AnalysisResult, EngineError> {
    analyze_with_cancel(reader, options, &CancelToken::new())
}

/// Analyze a workbook, polling `cancel` at phase boundaries and inside the
/// long-running graph algorithms.
pub fn analyze_with_cancel<R: WorkbookReader>(
    reader: &mut R,
    options: &AnalyzeOptions,
    cancel: &CancelToken,
) -> Result<AnalysisResult, EngineError> {
    let checkpoint = |phase: &str| -> Result<(), EngineError> {
        let _ = phase;
        #[cfg(feature = "tracing")]
        tracing::debug!(phase, "analysis phase complete");
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    };

    // Drain the reader. Any failure here aborts the run unchanged.
    let sheet_names = reader.sheet_names().map_err(EngineError::reader)?;
    let named_defs = reader.named_ranges().map_err(EngineError::reader)?;

    let mut cells = CellTable::new();
    let mut formulas: Vec<FormulaCell> = Vec::new();
    for sheet in &sheet_names {
        let sheet_cells = reader.read_sheet(sheet).map_err(EngineError::reader)?;
        for ((row, col), data) in sheet_cells {
            let address = CellAddress::from_indices(sheet.clone(), row, col)
                .map_err(EngineError::reader)?;
            let formula = data.formula.filter(|f| !f.is_empty());
            let node = cells.insert_populated(address, data.value, formula.clone());
            if let Some(formula) = formula {
                formulas.push(FormulaCell { node, home_sheet: sheet.clone(), formula });
            }
        }
    }
    checkpoint("ingest")?;

    // Tokenize + extract: embarrassingly parallel, pure per cell.
    let extractions: Vec<(Extraction, bool, usize)> = formulas
        .par_iter()
        .map(|cell| {
            let stream = TokenStream::tokenize(&cell.formula);
            let extraction = extract_references(&stream);
            let parse_flagged = stream.has_invalid() || extraction.bad_refs > 0;
            let complexity = operator_complexity(&cell.formula);
            (extraction, parse_flagged, complexity)
        })
        .collect();
    checkpoint("extract")?;

    let named = NamedRangeTable::build(&named_defs);
    let sheet_set: FxHashSet<String> = sheet_names.iter().cloned().collect();

    // Dynamic resolution reads only frozen tables.
    let resolutions: Vec<Resolution> = formulas
        .par_iter()
        .zip(&extractions)
        .map(|(cell, (extraction, _, _))| {
            resolve_cell(
                extraction,
                &cell.home_sheet,
                &cells,
                &sheet_set,
                options.fold_string_concat,
            )
        })
        .collect();
    checkpoint("resolve")?;

    // Re-establish a deterministic order before the single writer consumes
    // the parallel output: (source address, target, kind).
    let mut flat: Vec<(NodeId, &ResolvedRef)> = Vec::new();
    for (cell, resolution) in formulas.iter().zip(&resolutions) {
        for r in &resolution.refs {
            flat.push((cell.node, r));
        }
    }
    flat.sort_by(|a, b| {
        cells
            .get(a.0)
            .address
            .cmp(&cells.get(b.0).address)
            .then_with(|| a.1.sort_key().cmp(&b.1.sort_key()))
    });

    let mut builder = GraphBuilder::new(
        &mut cells,
        &named,
        options.fan_out_cap,
        options.named_depth_limit,
    );
    for (source, reference) in &flat {
        builder.add_reference(*source, reference);
    }
    let graph = builder.finish(cancel)?;
    if let Some(edge) = graph
        .edges
        .iter()
        .find(|e| e.source as usize >= cells.len() || e.target as usize >= cells.len())
    {
        return Err(EngineError::invariant(format!(
            "edge ({}, {}) has an endpoint outside the node set",
            edge.source, edge.target
        )));
    }
    checkpoint("graph")?;

    let notes: Vec<FormulaNotes> = formulas
        .iter()
        .zip(&extractions)
        .zip(&resolutions)
        .map(|((cell, (extraction, parse_flagged, complexity)), resolution)| FormulaNotes {
            node: cell.node,
            parse_flagged: *parse_flagged,
            ref_error_literal: extraction.has_reference_error_literal(),
            dynamic_unresolved: resolution.unresolved,
            complexity: *complexity,
        })
        .collect();

    let metrics = WorkbookMetrics {
        sheet_count: sheet_names.len(),
        formula_count: formulas.len(),
        input_count: cells
            .iter()
            .filter(|(_, info)| info.flags.contains(CellFlags::IS_INPUT))
            .count(),
        avg_complexity: if notes.is_empty() {
            0.0
        } else {
            notes.iter().map(|n| n.complexity as f64).sum::<f64>() / notes.len() as f64
        },
    };

    // Both passes are read-only over the frozen graph.
    let (anomalies, drivers) = rayon::join(
        || {
            if options.detect_anomalies {
                detect_anomalies(&graph, &cells, &notes, options)
            } else {
                Vec::new()
            }
        },
        || {
            if options.identify_cost_drivers {
                rank_cost_drivers(&graph, &cells, options, cancel)
            } else {
                Ok(Vec::new())
            }
        },
    );
    let drivers = drivers?;
    checkpoint("passes")?;

    Ok(assemble(
        options.job_id.clone(),
        &cells,
        &graph,
        anomalies,
        drivers,
        metrics,
        options.include_values,
    ))
}
