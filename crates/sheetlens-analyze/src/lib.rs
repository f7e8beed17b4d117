pub mod analysis;
pub mod anomaly;
pub mod cancel;
pub mod cells;
pub mod drivers;
pub mod error;
pub mod graph;
pub mod named;
pub mod options;
pub mod resolver;
pub mod result;

pub use analysis::{analyze, analyze_with_cancel};
pub use anomaly::{Anomaly, AnomalyKind, Severity};
pub use cancel::CancelToken;
pub use cells::{CellFlags, CellInfo, CellTable, NodeId};
pub use drivers::CostDriver;
pub use error::EngineError;
pub use graph::{DependencyGraph, Edge, EdgeKind, LargeRange};
pub use options::AnalyzeOptions;
pub use result::AnalysisResult;

// Re-export the reader boundary so embedders need only this crate.
pub use sheetlens_io::{CellData, MemoryWorkbook, NamedRangeDef, WorkbookReader};
