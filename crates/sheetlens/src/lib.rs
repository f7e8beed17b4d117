//! Facade crate re-exporting the sheetlens stack.
//!
//! Most embedders want [`analyze`] plus a [`WorkbookReader`] backend:
//!
//! ```
//! use sheetlens::{AnalyzeOptions, MemoryWorkbook, analyze};
//!
//! let mut wb = MemoryWorkbook::new();
//! wb.set_value("S", 1, 1, 1i64)
//!     .set_value("S", 2, 1, 2i64)
//!     .set_formula("S", 3, 1, "=A1+A2");
//!
//! let result = analyze(&mut wb, &AnalyzeOptions::default()).unwrap();
//! assert_eq!(result.graph.metrics.node_count, 3);
//! assert_eq!(result.graph.metrics.edge_count, 2);
//! ```

#[cfg(feature = "common")]
pub use sheetlens_common as common;

#[cfg(feature = "parse")]
pub use sheetlens_parse as parse;

#[cfg(feature = "io")]
pub use sheetlens_io as io;

#[cfg(feature = "analyze")]
pub use sheetlens_analyze as engine;

#[cfg(feature = "common")]
pub use sheetlens_common::{CellAddress, CellRange, Coord, ErrorLiteral, LiteralValue};

#[cfg(feature = "parse")]
pub use sheetlens_parse::{TokenKind, TokenStream, extract_references, operator_complexity};

#[cfg(feature = "io")]
pub use sheetlens_io::{CellData, MemoryWorkbook, NamedRangeDef, WorkbookReader};

#[cfg(feature = "json")]
pub use sheetlens_io::JsonWorkbook;

#[cfg(feature = "analyze")]
pub use sheetlens_analyze::{
    AnalysisResult, AnalyzeOptions, CancelToken, CostDriver, EngineError, analyze,
    analyze_with_cancel,
};
