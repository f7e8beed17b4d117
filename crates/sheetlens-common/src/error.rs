//! The closed set of worksheet error literals the analyzer recognises.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

/// All recognised error codes, in the order the tokenizer tries them.
///
/// Names are CamelCase; `Display` renders them exactly as a workbook shows
/// them (`#DIV/0!`, …).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorLiteral {
    Ref,
    Name,
    Div,
    Value,
    Na,
    Null,
    Num,
}

/// Tokenizer match table. No code is a prefix of another, so order only
/// affects which comparison runs first.
pub const ERROR_LITERALS: &[ErrorLiteral] = &[
    ErrorLiteral::Ref,
    ErrorLiteral::Name,
    ErrorLiteral::Div,
    ErrorLiteral::Value,
    ErrorLiteral::Na,
    ErrorLiteral::Null,
    ErrorLiteral::Num,
];

impl ErrorLiteral {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ref => "#REF!",
            Self::Name => "#NAME?",
            Self::Div => "#DIV/0!",
            Self::Value => "#VALUE!",
            Self::Na => "#N/A",
            Self::Null => "#NULL!",
            Self::Num => "#NUM!",
        }
    }

    /// Exact, case-sensitive parse. Returns `None` for anything outside the
    /// closed set; callers probe arbitrary cell text with this.
    pub fn parse(s: &str) -> Option<Self> {
        ERROR_LITERALS.iter().copied().find(|e| e.as_str() == s)
    }

    /// True for the codes that indicate a dangling reference rather than a
    /// computation failure.
    pub fn is_reference_error(self) -> bool {
        matches!(self, Self::Ref | Self::Name)
    }
}

impl fmt::Display for ErrorLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl Serialize for ErrorLiteral {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_parse() {
        for &lit in ERROR_LITERALS {
            assert_eq!(ErrorLiteral::parse(lit.as_str()), Some(lit));
        }
        assert_eq!(ErrorLiteral::parse("#GETTING_DATA"), None);
        assert_eq!(ErrorLiteral::parse("#ref!"), None);
        assert_eq!(ErrorLiteral::parse(""), None);
    }

    #[test]
    fn reference_errors() {
        assert!(ErrorLiteral::Ref.is_reference_error());
        assert!(ErrorLiteral::Name.is_reference_error());
        assert!(!ErrorLiteral::Div.is_reference_error());
    }
}
