//! The reader boundary the analysis engine consumes.

use std::collections::BTreeMap;

use sheetlens_common::LiteralValue;

/// One populated cell as reported by a backend. Cells may carry a cached
/// value, a formula, or both; fully empty records are dropped by backends.
#[derive(Clone, Debug, PartialEq)]
pub struct CellData {
    pub value: Option<LiteralValue>,
    pub formula: Option<String>,
}

impl CellData {
    pub fn from_value<V: Into<LiteralValue>>(value: V) -> Self {
        Self { value: Some(value.into()), formula: None }
    }

    pub fn from_formula(formula: impl Into<String>) -> Self {
        Self { value: None, formula: Some(formula.into()) }
    }

    pub fn with_value<V: Into<LiteralValue>>(mut self, value: V) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A workbook-scoped named range as its raw definition string; the analyzer
/// parses it into a range, a cell, or a formula.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedRangeDef {
    pub name: String,
    pub definition: String,
}

/// Sheet contents keyed by 1-based `(row, col)`. `BTreeMap` keeps iteration
/// deterministic without an extra sort.
pub type SheetCells = BTreeMap<(u32, u32), CellData>;

/// A finite, restartable source of workbook records. Reads may be repeated;
/// any error is fatal to the analysis run.
pub trait WorkbookReader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Result<Vec<String>, Self::Error>;

    /// Workbook-scoped named ranges.
    fn named_ranges(&self) -> Result<Vec<NamedRangeDef>, Self::Error>;

    /// All populated cells of one sheet.
    fn read_sheet(&mut self, sheet: &str) -> Result<SheetCells, Self::Error>;
}
