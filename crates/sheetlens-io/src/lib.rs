pub mod backends;
pub mod error;
pub mod traits;

#[cfg(feature = "json")]
pub use backends::JsonWorkbook;
pub use backends::MemoryWorkbook;
pub use error::IoError;
pub use traits::{CellData, NamedRangeDef, SheetCells, WorkbookReader};
