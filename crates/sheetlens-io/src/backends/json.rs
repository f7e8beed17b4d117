//! JSON workbook backend.
//!
//! Document shape:
//!
//! ```json
//! {
//!   "sheets": [
//!     { "name": "Data",
//!       "cells": [ { "row": 1, "col": 2, "value": 42, "formula": "=A1*2" } ] }
//!   ],
//!   "named_ranges": [ { "name": "TaxRate", "definition": "Rates!B2" } ]
//! }
//! ```
//!
//! `value` accepts JSON numbers, strings, booleans and null; strings that
//! spell a worksheet error literal (`"#REF!"`) are typed as errors.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use sheetlens_common::LiteralValue;

use crate::error::IoError;
use crate::traits::{CellData, NamedRangeDef, SheetCells, WorkbookReader};

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    sheets: Vec<SheetDoc>,
    #[serde(default)]
    named_ranges: Vec<NamedRangeDoc>,
}

#[derive(Debug, Deserialize)]
struct SheetDoc {
    name: String,
    #[serde(default)]
    cells: Vec<CellDoc>,
}

#[derive(Debug, Deserialize)]
struct CellDoc {
    row: u32,
    col: u32,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    formula: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedRangeDoc {
    name: String,
    definition: String,
}

/// A workbook loaded from a JSON document, fully materialised up front.
#[derive(Debug, Clone)]
pub struct JsonWorkbook {
    sheet_order: Vec<String>,
    sheets: BTreeMap<String, SheetCells>,
    named: Vec<NamedRangeDef>,
}

impl JsonWorkbook {
    pub fn from_str(text: &str) -> Result<Self, IoError> {
        let doc: Document = serde_json::from_str(text)?;
        Self::from_document(doc)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, IoError> {
        let doc: Document = serde_json::from_slice(data)?;
        Self::from_document(doc)
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    fn from_document(doc: Document) -> Result<Self, IoError> {
        let mut sheet_order = Vec::with_capacity(doc.sheets.len());
        let mut sheets = BTreeMap::new();
        for sheet in doc.sheets {
            if sheets.contains_key(&sheet.name) {
                return Err(IoError::InvalidDocument(format!(
                    "duplicate sheet '{}'",
                    sheet.name
                )));
            }
            let mut cells = SheetCells::new();
            for cell in sheet.cells {
                if cell.row == 0 || cell.col == 0 {
                    return Err(IoError::InvalidDocument(format!(
                        "cell indices are 1-based (sheet '{}', row {}, col {})",
                        sheet.name, cell.row, cell.col
                    )));
                }
                let value = convert_value(cell.value);
                if value.is_none() && cell.formula.is_none() {
                    continue;
                }
                cells.insert((cell.row, cell.col), CellData { value, formula: cell.formula });
            }
            sheet_order.push(sheet.name.clone());
            sheets.insert(sheet.name, cells);
        }
        let named = doc
            .named_ranges
            .into_iter()
            .map(|n| NamedRangeDef { name: n.name, definition: n.definition })
            .collect();
        Ok(JsonWorkbook { sheet_order, sheets, named })
    }
}

fn convert_value(value: serde_json::Value) -> Option<LiteralValue> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(LiteralValue::Boolean(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(LiteralValue::Int(i))
            } else {
                Some(LiteralValue::Number(n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        serde_json::Value::String(s) => Some(LiteralValue::from_raw_text(&s)),
        other => Some(LiteralValue::Text(other.to_string())),
    }
}

impl WorkbookReader for JsonWorkbook {
    type Error = IoError;

    fn sheet_names(&self) -> Result<Vec<String>, Self::Error> {
        Ok(self.sheet_order.clone())
    }

    fn named_ranges(&self) -> Result<Vec<NamedRangeDef>, Self::Error> {
        Ok(self.named.clone())
    }

    fn read_sheet(&mut self, sheet: &str) -> Result<SheetCells, Self::Error> {
        self.sheets
            .get(sheet)
            .cloned()
            .ok_or_else(|| IoError::UnknownSheet(sheet.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetlens_common::ErrorLiteral;
    use std::io::Write;

    const DOC: &str = r##"{
        "sheets": [
            { "name": "S", "cells": [
                { "row": 1, "col": 1, "value": 1 },
                { "row": 2, "col": 1, "value": "#REF!" },
                { "row": 3, "col": 1, "formula": "=A1+A2" },
                { "row": 4, "col": 1, "value": null }
            ] }
        ],
        "named_ranges": [ { "name": "Rate", "definition": "S!A1" } ]
    }"##;

    #[test]
    fn parses_document() {
        let mut wb = JsonWorkbook::from_str(DOC).unwrap();
        assert_eq!(wb.sheet_names().unwrap(), ["S"]);
        let cells = wb.read_sheet("S").unwrap();
        assert_eq!(cells[&(1, 1)].value, Some(LiteralValue::Int(1)));
        assert_eq!(
            cells[&(2, 1)].value,
            Some(LiteralValue::Error(ErrorLiteral::Ref))
        );
        assert_eq!(cells[&(3, 1)].formula.as_deref(), Some("=A1+A2"));
        // Fully empty records are dropped.
        assert!(!cells.contains_key(&(4, 1)));
        assert_eq!(wb.named_ranges().unwrap().len(), 1);
    }

    #[test]
    fn rejects_zero_indices_and_duplicate_sheets() {
        let bad = r#"{ "sheets": [ { "name": "S", "cells": [ { "row": 0, "col": 1 } ] } ] }"#;
        assert!(matches!(
            JsonWorkbook::from_str(bad),
            Err(IoError::InvalidDocument(_))
        ));

        let dup = r#"{ "sheets": [ { "name": "S" }, { "name": "S" } ] }"#;
        assert!(matches!(
            JsonWorkbook::from_str(dup),
            Err(IoError::InvalidDocument(_))
        ));
    }

    #[test]
    fn opens_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();
        let wb = JsonWorkbook::open_path(file.path()).unwrap();
        assert_eq!(wb.sheet_order, ["S"]);
    }
}
