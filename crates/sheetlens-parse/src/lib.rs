pub mod extract;
pub mod tokenizer;

pub use extract::{
    CallArg, CallSite, DYNAMIC_FUNCS, ExtractedRef, Extraction, RefTarget, extract_references,
    is_dynamic_func,
};
pub use tokenizer::{Token, TokenKind, TokenStream, operator_complexity};

// Re-export common types
pub use sheetlens_common::{AddressError, CellAddress, CellRange, Coord, ErrorLiteral, LiteralValue};
