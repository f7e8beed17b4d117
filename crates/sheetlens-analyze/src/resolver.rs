//! Best-effort resolution of `INDIRECT`, `OFFSET` and `INDEX`.
//!
//! Single pass, never iterated to a fixed point. A call resolves only when
//! its relevant arguments are literals or references to cells already known
//! to hold constants. On success the call's address-only base reference is
//! replaced by the computed target (kind `dynamic`); on failure every
//! extracted reference is preserved as-is and the cell is tagged
//! `dynamic_unresolved` for the anomaly pass.

use rustc_hash::FxHashSet;

use sheetlens_common::{CellAddress, CellRange, Coord, parse_cell_coord};
use sheetlens_parse::{CallArg, CallSite, Extraction, RefTarget};

use crate::cells::CellTable;
use crate::graph::{EdgeKind, ResolvedRef};

/// Per-cell resolver output.
#[derive(Debug, Default)]
pub struct Resolution {
    pub refs: Vec<ResolvedRef>,
    /// At least one dynamic call could not be reduced.
    pub unresolved: bool,
}

/// Resolve one cell's extraction. `home_sheet` binds sheetless references;
/// `sheets` is the workbook's sheet set (a dynamic target naming an unknown
/// sheet is a resolution failure, not an implicit node).
pub fn resolve_cell(
    extraction: &Extraction,
    home_sheet: &str,
    cells: &CellTable,
    sheets: &FxHashSet<String>,
    fold_string_concat: bool,
) -> Resolution {
    let mut replaced: Vec<bool> = vec![false; extraction.refs.len()];
    let mut dynamic_refs: Vec<ResolvedRef> = Vec::new();
    let mut unresolved = false;

    for call in &extraction.calls {
        let outcome = resolve_call(
            call,
            extraction,
            home_sheet,
            cells,
            sheets,
            fold_string_concat,
        );
        match outcome {
            Some((resolved, consumed_base)) => {
                if let Some(base_idx) = consumed_base {
                    replaced[base_idx] = true;
                }
                dynamic_refs.push(resolved);
            }
            None => unresolved = true,
        }
    }

    let mut refs: Vec<ResolvedRef> = Vec::with_capacity(extraction.refs.len() + dynamic_refs.len());
    for (idx, r) in extraction.refs.iter().enumerate() {
        if replaced[idx] {
            continue;
        }
        refs.push(ResolvedRef::from_static(r, home_sheet));
    }
    refs.extend(dynamic_refs);

    Resolution { refs, unresolved }
}

/// Resolve one call. Returns the dynamic reference plus the index of the
/// base reference it replaces, or `None` on failure.
fn resolve_call(
    call: &CallSite,
    extraction: &Extraction,
    home_sheet: &str,
    cells: &CellTable,
    sheets: &FxHashSet<String>,
    fold_string_concat: bool,
) -> Option<(ResolvedRef, Option<usize>)> {
    match call.func.as_str() {
        "INDIRECT" => {
            let text = arg_text(call.args.first()?, extraction, home_sheet, cells, fold_string_concat)?;
            let target = parse_ref_text(&text, home_sheet)?;
            if !sheets.contains(target_sheet(&target)) {
                return None;
            }
            // INDIRECT reads its argument cell for the *value*; that
            // reference stays a genuine dependency, so nothing is replaced.
            Some((target, None))
        }
        "OFFSET" => {
            if call.args.len() < 3 {
                return None;
            }
            let (base_idx, base) = arg_base(&call.args[0], extraction)?;
            let rows = arg_int(&call.args[1], extraction, home_sheet, cells)?;
            let cols = arg_int(&call.args[2], extraction, home_sheet, cells)?;
            let height = match call.args.get(3) {
                Some(arg) => Some(arg_int(arg, extraction, home_sheet, cells)?),
                None => None,
            };
            let width = match call.args.get(4) {
                Some(arg) => Some(arg_int(arg, extraction, home_sheet, cells)?),
                None => None,
            };

            let (sheet, start, end) = base_bounds(base, home_sheet);
            let start = start.offset(rows, cols).ok()?;
            let end = end.offset(rows, cols).ok()?;
            let height = height.unwrap_or((end.row() - start.row() + 1) as i64);
            let width = width.unwrap_or((end.col() - start.col() + 1) as i64);
            if height < 1 || width < 1 {
                return None;
            }
            let end = start.offset(height - 1, width - 1).ok()?;

            let resolved = if start == end {
                ResolvedRef::Cell {
                    address: CellAddress::new(sheet, start),
                    kind: EdgeKind::Dynamic,
                }
            } else {
                ResolvedRef::Range {
                    range: CellRange::from_parts(sheet, start, end).ok()?,
                    kind: EdgeKind::Dynamic,
                }
            };
            Some((resolved, Some(base_idx)))
        }
        "INDEX" => {
            if call.args.len() != 3 {
                return None;
            }
            let (base_idx, base) = arg_base(&call.args[0], extraction)?;
            let row = arg_int(&call.args[1], extraction, home_sheet, cells)?;
            let col = arg_int(&call.args[2], extraction, home_sheet, cells)?;
            if row < 1 || col < 1 {
                return None;
            }
            let (sheet, start, end) = base_bounds(base, home_sheet);
            let picked = start.offset(row - 1, col - 1).ok()?;
            if picked.row() > end.row() || picked.col() > end.col() {
                return None;
            }
            let resolved = ResolvedRef::Cell {
                address: CellAddress::new(sheet, picked),
                kind: EdgeKind::Dynamic,
            };
            Some((resolved, Some(base_idx)))
        }
        _ => None,
    }
}

/// The base argument of `OFFSET`/`INDEX`: a cell or range reference.
fn arg_base<'a>(arg: &CallArg, extraction: &'a Extraction) -> Option<(usize, &'a RefTarget)> {
    match arg {
        CallArg::Ref(idx) => match &extraction.refs[*idx].target {
            t @ (RefTarget::Cell { .. } | RefTarget::Range { .. }) => Some((*idx, t)),
            RefTarget::Named(_) => None,
        },
        _ => None,
    }
}

fn base_bounds(target: &RefTarget, home_sheet: &str) -> (String, Coord, Coord) {
    match target {
        RefTarget::Cell { sheet, coord } => (
            sheet.clone().unwrap_or_else(|| home_sheet.to_string()),
            *coord,
            *coord,
        ),
        RefTarget::Range { sheet, start, end } => (
            sheet.clone().unwrap_or_else(|| home_sheet.to_string()),
            *start,
            *end,
        ),
        RefTarget::Named(_) => unreachable!("filtered by arg_base"),
    }
}

/// Integer view of an argument: a numeric literal, or a reference to a cell
/// holding a constant whole number.
fn arg_int(
    arg: &CallArg,
    extraction: &Extraction,
    home_sheet: &str,
    cells: &CellTable,
) -> Option<i64> {
    match arg {
        CallArg::Number(n) if n.fract() == 0.0 => Some(*n as i64),
        CallArg::Ref(idx) => constant_of(*idx, extraction, home_sheet, cells)?.as_int(),
        _ => None,
    }
}

/// Text view of an argument: a string literal, a foldable concat chain, or
/// a reference to a cell holding constant text.
fn arg_text(
    arg: &CallArg,
    extraction: &Extraction,
    home_sheet: &str,
    cells: &CellTable,
    fold_string_concat: bool,
) -> Option<String> {
    match arg {
        CallArg::Text(s) => Some(s.clone()),
        CallArg::TextConcat(parts) if fold_string_concat => Some(parts.concat()),
        CallArg::Ref(idx) => constant_of(*idx, extraction, home_sheet, cells)?
            .as_text()
            .map(str::to_string),
        _ => None,
    }
}

fn constant_of<'a>(
    idx: usize,
    extraction: &Extraction,
    home_sheet: &str,
    cells: &'a CellTable,
) -> Option<&'a sheetlens_common::LiteralValue> {
    match &extraction.refs[idx].target {
        RefTarget::Cell { sheet, coord } => {
            let address = CellAddress::new(
                sheet.clone().unwrap_or_else(|| home_sheet.to_string()),
                *coord,
            );
            cells.constant_value(&address)
        }
        _ => None,
    }
}

/// Parse an `INDIRECT` target string: `A1`, `A1:B2`, `Sheet!A1`,
/// `'Sheet Name'!A1:B2`.
fn parse_ref_text(text: &str, home_sheet: &str) -> Option<ResolvedRef> {
    let (sheet, rest) = match CellRange::parse_range(text) {
        Ok(range) => {
            return Some(if range.len() == 1 {
                ResolvedRef::Cell {
                    address: CellAddress::new(range.sheet, range.start),
                    kind: EdgeKind::Dynamic,
                }
            } else {
                ResolvedRef::Range { range, kind: EdgeKind::Dynamic }
            });
        }
        Err(_) => (home_sheet.to_string(), text),
    };
    // No sheet qualifier: bind to the home sheet.
    if let Some((lhs, rhs)) = rest.split_once(':') {
        let start = parse_cell_coord(lhs).ok()?;
        let end = parse_cell_coord(rhs).ok()?;
        let range = CellRange::from_parts(sheet, start, end).ok()?;
        return Some(if range.len() == 1 {
            ResolvedRef::Cell {
                address: CellAddress::new(range.sheet, range.start),
                kind: EdgeKind::Dynamic,
            }
        } else {
            ResolvedRef::Range { range, kind: EdgeKind::Dynamic }
        });
    }
    let coord = parse_cell_coord(rest).ok()?;
    Some(ResolvedRef::Cell {
        address: CellAddress::new(sheet, coord),
        kind: EdgeKind::Dynamic,
    })
}

fn target_sheet(r: &ResolvedRef) -> &str {
    match r {
        ResolvedRef::Cell { address, .. } => &address.sheet,
        ResolvedRef::Range { range, .. } => &range.sheet,
        ResolvedRef::Named(_) => "",
    }
}
