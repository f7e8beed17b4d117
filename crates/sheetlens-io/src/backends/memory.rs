//! In-memory workbook, used by tests and embedders that already hold cell
//! data.

use std::collections::BTreeMap;

use sheetlens_common::LiteralValue;

use crate::error::IoError;
use crate::traits::{CellData, NamedRangeDef, SheetCells, WorkbookReader};

/// A workbook assembled cell by cell. Sheet order is first-touch order.
#[derive(Debug, Default, Clone)]
pub struct MemoryWorkbook {
    sheet_order: Vec<String>,
    sheets: BTreeMap<String, SheetCells>,
    named: Vec<NamedRangeDef>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sheet (possibly empty) and fix its position in the order.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.sheets.contains_key(&name) {
            self.sheet_order.push(name.clone());
            self.sheets.insert(name, SheetCells::new());
        }
        self
    }

    pub fn set_cell(&mut self, sheet: &str, row: u32, col: u32, cell: CellData) -> &mut Self {
        self.add_sheet(sheet);
        self.sheets
            .get_mut(sheet)
            .expect("sheet registered above")
            .insert((row, col), cell);
        self
    }

    pub fn set_value(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
        value: impl Into<LiteralValue>,
    ) -> &mut Self {
        self.set_cell(sheet, row, col, CellData::from_value(value))
    }

    pub fn set_formula(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
        formula: impl Into<String>,
    ) -> &mut Self {
        self.set_cell(sheet, row, col, CellData::from_formula(formula))
    }

    pub fn define_name(
        &mut self,
        name: impl Into<String>,
        definition: impl Into<String>,
    ) -> &mut Self {
        self.named.push(NamedRangeDef { name: name.into(), definition: definition.into() });
        self
    }
}

impl WorkbookReader for MemoryWorkbook {
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

    #[test]
    fn builder_roundtrip() {
        let mut wb = MemoryWorkbook::new();
        wb.set_value("S", 1, 1, 1.0)
            .set_formula("S", 3, 1, "=A1+A2")
            .set_value("S", 2, 1, 2i64)
            .define_name("TaxRate", "S!A1");

        assert_eq!(wb.sheet_names().unwrap(), ["S"]);
        let cells = wb.read_sheet("S").unwrap();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[&(3, 1)].formula.as_deref(), Some("=A1+A2"));
        assert!(matches!(wb.read_sheet("T"), Err(IoError::UnknownSheet(_))));
    }

    #[test]
    fn sheet_order_is_first_touch() {
        let mut wb = MemoryWorkbook::new();
        wb.set_value("Zeta", 1, 1, 1i64).set_value("Alpha", 1, 1, 2i64);
        assert_eq!(wb.sheet_names().unwrap(), ["Zeta", "Alpha"]);
    }
}
