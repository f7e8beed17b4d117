pub mod address;
pub mod coord;
pub mod error;
pub mod value;

pub use address::{AddressError, CellAddress, CellRange, RangeIter, parse_cell_coord, sheet_name_is_plain};
pub use coord::{Coord, CoordError, MAX_COL, MAX_ROW, column_to_letters, letters_to_column};
pub use error::{ERROR_LITERALS, ErrorLiteral};
pub use value::LiteralValue;
