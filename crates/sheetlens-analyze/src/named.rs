//! Workbook-scoped named ranges.
//!
//! Names are case-insensitive but keep their original casing for output.
//! A definition is a range, a single cell, or a formula; formulas keep
//! their extraction so the graph builder can chase nested names with its
//! own depth bound and cycle detection.

use rustc_hash::FxHashMap;

use sheetlens_common::{CellAddress, CellRange};
use sheetlens_io::NamedRangeDef;
use sheetlens_parse::{Extraction, TokenStream, extract_references};

#[derive(Debug, Clone)]
pub enum NamedTarget {
    Cell(CellAddress),
    Range(CellRange),
    Formula(Extraction),
}

#[derive(Debug, Clone)]
pub struct NamedRange {
    pub name: String,
    pub target: NamedTarget,
}

#[derive(Debug, Default)]
pub struct NamedRangeTable {
    entries: Vec<NamedRange>,
    index: FxHashMap<String, usize>,
}

impl NamedRangeTable {
    /// Build from raw reader definitions. Later duplicates (case-insensitive)
    /// are ignored, matching workbook semantics where the first definition
    /// wins.
    pub fn build(defs: &[NamedRangeDef]) -> Self {
        let mut table = NamedRangeTable::default();
        for def in defs {
            let key = def.name.to_lowercase();
            if table.index.contains_key(&key) {
                continue;
            }
            let target = parse_definition(&def.definition);
            table.index.insert(key, table.entries.len());
            table.entries.push(NamedRange { name: def.name.clone(), target });
        }
        table
    }

    pub fn lookup(&self, name: &str) -> Option<&NamedRange> {
        self.index.get(&name.to_lowercase()).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_definition(definition: &str) -> NamedTarget {
    let trimmed = definition.trim();
    let body = trimmed.strip_prefix('=').unwrap_or(trimmed);
    if body.contains(':') {
        if let Ok(range) = CellRange::parse_range(body) {
            return NamedTarget::Range(range);
        }
    } else if let Ok(addr) = CellAddress::parse_a1(body) {
        return NamedTarget::Cell(addr);
    }
    NamedTarget::Formula(extract_references(&TokenStream::tokenize(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetlens_parse::RefTarget;

    fn def(name: &str, definition: &str) -> NamedRangeDef {
        NamedRangeDef { name: name.to_string(), definition: definition.to_string() }
    }

    #[test]
    fn parses_cell_range_and_formula_targets() {
        let table = NamedRangeTable::build(&[
            def("Rate", "Rates!B2"),
            def("Inputs", "Data!A1:A9"),
            def("Derived", "=SUM(Data!A1:A9)*Rate"),
        ]);
        assert_eq!(table.len(), 3);
        assert!(matches!(table.lookup("rate").unwrap().target, NamedTarget::Cell(_)));
        assert!(matches!(table.lookup("INPUTS").unwrap().target, NamedTarget::Range(_)));
        match &table.lookup("derived").unwrap().target {
            NamedTarget::Formula(ex) => {
                assert!(ex.refs.iter().any(|r| matches!(&r.target, RefTarget::Named(n) if n == "Rate")));
            }
            other => panic!("expected formula target, got {other:?}"),
        }
    }

    #[test]
    fn case_insensitive_with_original_casing() {
        let table = NamedRangeTable::build(&[def("TaxRate", "S!A1"), def("taxrate", "S!B1")]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("TAXRATE").unwrap().name, "TaxRate");
    }
}
