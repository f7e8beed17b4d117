//! Reference extraction over a token stream.
//!
//! Walks the tokens tracking parenthesis depth and the nearest enclosing
//! function name, collecting every static reference (cell, range, named,
//! cross-sheet). Ranges are not flattened here; range membership stays a
//! distinct edge kind in the graph builder. Calls to the dynamically
//! resolvable functions (`INDIRECT`, `OFFSET`, `INDEX`) additionally record
//! their top-level argument shapes for the resolver.

use smallvec::SmallVec;

use sheetlens_common::{AddressError, Coord, ErrorLiteral, parse_cell_coord};

use crate::tokenizer::{TokenKind, TokenStream};

/// Function names the dynamic resolver understands.
pub const DYNAMIC_FUNCS: &[&str] = &["INDIRECT", "OFFSET", "INDEX"];

pub fn is_dynamic_func(name: &str) -> bool {
    DYNAMIC_FUNCS.contains(&name)
}

/// What a reference points at. `sheet = None` defaults to the formula's
/// home sheet when edges are built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefTarget {
    Cell { sheet: Option<String>, coord: Coord },
    Range { sheet: Option<String>, start: Coord, end: Coord },
    Named(String),
}

/// One extracted reference plus the name of the function call it sits in,
/// if any. The resolver keys off `enclosing_func`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtractedRef {
    pub target: RefTarget,
    pub enclosing_func: Option<String>,
}

/// Simplified top-level argument of a dynamic-function call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    /// A single string literal.
    Text(String),
    /// A chain of string literals joined by `&`; folded only when the
    /// orchestrator enables constant folding.
    TextConcat(Vec<String>),
    /// A numeric literal (unary sign applied).
    Number(f64),
    /// Index into [`Extraction::refs`].
    Ref(usize),
    /// Anything the resolver cannot reduce statically.
    Opaque,
}

/// A recorded `INDIRECT`/`OFFSET`/`INDEX` call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub func: String,
    pub args: Vec<CallArg>,
}

/// Everything pulled out of one formula.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub refs: Vec<ExtractedRef>,
    pub calls: Vec<CallSite>,
    /// Reference-shaped tokens whose coordinates were out of bounds.
    pub bad_refs: usize,
    /// Error literals appearing in the formula text.
    pub error_literals: SmallVec<[ErrorLiteral; 2]>,
}

impl Extraction {
    /// True when the formula embeds `#REF!` or `#NAME?` directly.
    pub fn has_reference_error_literal(&self) -> bool {
        self.error_literals.iter().any(|e| e.is_reference_error())
    }
}

/// Accumulator deciding the shape of one top-level call argument.
enum ArgAcc {
    Empty,
    Num(f64),
    PendingSign(f64),
    Strs { parts: Vec<String>, expect_op: bool },
    Ref(usize),
    Complex,
}

impl ArgAcc {
    fn on_str(&mut self, s: &str) {
        *self = match std::mem::replace(self, ArgAcc::Complex) {
            ArgAcc::Empty => ArgAcc::Strs { parts: vec![s.to_string()], expect_op: true },
            ArgAcc::Strs { mut parts, expect_op: false } => {
                parts.push(s.to_string());
                ArgAcc::Strs { parts, expect_op: true }
            }
            _ => ArgAcc::Complex,
        };
    }

    fn on_number(&mut self, text: &str) {
        let parsed = text.parse::<f64>();
        *self = match (std::mem::replace(self, ArgAcc::Complex), parsed) {
            (ArgAcc::Empty, Ok(n)) => ArgAcc::Num(n),
            (ArgAcc::PendingSign(sign), Ok(n)) => ArgAcc::Num(sign * n),
            _ => ArgAcc::Complex,
        };
    }

    fn on_op(&mut self, op: &str) {
        *self = match (std::mem::replace(self, ArgAcc::Complex), op) {
            (ArgAcc::Empty, "-") => ArgAcc::PendingSign(-1.0),
            (ArgAcc::Empty, "+") => ArgAcc::PendingSign(1.0),
            (ArgAcc::Strs { parts, expect_op: true }, "&") => {
                ArgAcc::Strs { parts, expect_op: false }
            }
            _ => ArgAcc::Complex,
        };
    }

    fn on_ref(&mut self, idx: usize) {
        *self = match std::mem::replace(self, ArgAcc::Complex) {
            ArgAcc::Empty => ArgAcc::Ref(idx),
            _ => ArgAcc::Complex,
        };
    }

    fn on_other(&mut self) {
        *self = ArgAcc::Complex;
    }

    fn finish(self) -> CallArg {
        match self {
            ArgAcc::Num(n) => CallArg::Number(n),
            ArgAcc::Strs { mut parts, expect_op: true } => {
                if parts.len() == 1 {
                    CallArg::Text(parts.remove(0))
                } else {
                    CallArg::TextConcat(parts)
                }
            }
            ArgAcc::Ref(idx) => CallArg::Ref(idx),
            ArgAcc::Empty | ArgAcc::PendingSign(_) | ArgAcc::Strs { .. } | ArgAcc::Complex => {
                CallArg::Opaque
            }
        }
    }
}

struct FuncFrame {
    name: String,
    open_depth: usize,
    /// Index into `builders` when this frame is a dynamic call.
    builder: Option<usize>,
}

struct CallBuilder {
    func: String,
    open_depth: usize,
    args: Vec<CallArg>,
    acc: ArgAcc,
}

/// Walk the token stream and collect references and dynamic call sites.
pub fn extract_references(stream: &TokenStream) -> Extraction {
    let mut out = Extraction::default();
    let mut depth: usize = 0;
    let mut frames: Vec<FuncFrame> = Vec::new();
    let mut builders: Vec<CallBuilder> = Vec::new();
    let mut pending_func: Option<String> = None;
    let mut pending_sheet: Option<String> = None;

    for token in stream.significant() {
        // A sheet qualifier binds only the immediately following reference.
        if token.kind != TokenKind::CellRef && token.kind != TokenKind::RangeRef {
            pending_sheet = None;
        }
        // Tokens below the innermost dynamic call's top level make the
        // current argument opaque; the structural cases below override.
        let feed = builders
            .last()
            .map(|b| depth == b.open_depth)
            .unwrap_or(false);

        match token.kind {
            TokenKind::SheetRef => {
                pending_sheet = Some(token.text.clone());
            }
            TokenKind::CellRef => match parse_cell_coord(&token.text) {
                Ok(coord) => {
                    let idx = push_ref(
                        &mut out,
                        RefTarget::Cell { sheet: pending_sheet.take(), coord },
                        &frames,
                    );
                    touch(&mut builders, feed, |acc| acc.on_ref(idx));
                }
                Err(_) => {
                    out.bad_refs += 1;
                    pending_sheet = None;
                    touch(&mut builders, feed, ArgAcc::on_other);
                }
            },
            TokenKind::RangeRef => match parse_range_text(&token.text) {
                Ok((start, end)) => {
                    let idx = push_ref(
                        &mut out,
                        RefTarget::Range { sheet: pending_sheet.take(), start, end },
                        &frames,
                    );
                    touch(&mut builders, feed, |acc| acc.on_ref(idx));
                }
                Err(_) => {
                    out.bad_refs += 1;
                    pending_sheet = None;
                    touch(&mut builders, feed, ArgAcc::on_other);
                }
            },
            TokenKind::Name => {
                let idx = push_ref(&mut out, RefTarget::Named(token.text.clone()), &frames);
                touch(&mut builders, feed, |acc| acc.on_ref(idx));
            }
            TokenKind::Func => {
                pending_func = Some(token.text.clone());
            }
            TokenKind::LParen => {
                depth += 1;
                if let Some(name) = pending_func.take() {
                    let builder = if is_dynamic_func(&name) {
                        // A nested dynamic call is itself opaque to the call
                        // it appears inside of.
                        touch(&mut builders, feed, ArgAcc::on_other);
                        builders.push(CallBuilder {
                            func: name.clone(),
                            open_depth: depth,
                            args: Vec::new(),
                            acc: ArgAcc::Empty,
                        });
                        Some(builders.len() - 1)
                    } else {
                        // A nested plain call still makes the enclosing
                        // dynamic argument opaque.
                        touch(&mut builders, feed, ArgAcc::on_other);
                        None
                    };
                    frames.push(FuncFrame { name, open_depth: depth, builder });
                } else {
                    touch(&mut builders, feed, ArgAcc::on_other);
                }
            }
            TokenKind::RParen => {
                if let Some(frame) = frames.last() {
                    if frame.open_depth == depth {
                        let frame = frames.pop().expect("frame checked above");
                        if let Some(builder_idx) = frame.builder {
                            let mut builder = builders.remove(builder_idx);
                            let acc = std::mem::replace(&mut builder.acc, ArgAcc::Empty);
                            builder.args.push(acc.finish());
                            out.calls.push(CallSite { func: builder.func, args: builder.args });
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            TokenKind::Comma => {
                if feed {
                    let builder = builders.last_mut().expect("feed implies a builder");
                    let acc = std::mem::replace(&mut builder.acc, ArgAcc::Empty);
                    builder.args.push(acc.finish());
                }
            }
            TokenKind::Number => touch(&mut builders, feed, |acc| acc.on_number(&token.text)),
            TokenKind::Str => touch(&mut builders, feed, |acc| acc.on_str(&token.text)),
            TokenKind::Op => touch(&mut builders, feed, |acc| acc.on_op(&token.text)),
            TokenKind::Error => {
                if let Some(lit) = ErrorLiteral::parse(&token.text) {
                    out.error_literals.push(lit);
                }
                touch(&mut builders, feed, ArgAcc::on_other);
            }
            TokenKind::Bool
            | TokenKind::Semicolon
            | TokenKind::LBrace
            | TokenKind::RBrace
            | TokenKind::Invalid => touch(&mut builders, feed, ArgAcc::on_other),
            TokenKind::Whitespace => unreachable!("significant() filters whitespace"),
        }
    }

    out
}

fn push_ref(out: &mut Extraction, target: RefTarget, frames: &[FuncFrame]) -> usize {
    out.refs.push(ExtractedRef {
        target,
        enclosing_func: frames.last().map(|f| f.name.clone()),
    });
    out.refs.len() - 1
}

/// Apply `f` to the innermost builder's accumulator. Tokens nested below the
/// call's top level (`feed == false`) are not structural for it, but they do
/// mean the current argument is not a plain literal.
fn touch(builders: &mut [CallBuilder], feed: bool, f: impl FnOnce(&mut ArgAcc)) {
    if let Some(builder) = builders.last_mut() {
        if feed {
            f(&mut builder.acc);
        } else {
            builder.acc.on_other();
        }
    }
}

/// Split `A1:B2` (anchors allowed) into ordered corner coordinates. Corners
/// are normalised so the top-left comes first, as a workbook would.
fn parse_range_text(text: &str) -> Result<(Coord, Coord), AddressError> {
    let (lhs, rhs) = text
        .split_once(':')
        .ok_or_else(|| AddressError::InvalidRange(text.to_string()))?;
    let a = parse_cell_coord(lhs)?;
    let b = parse_cell_coord(rhs)?;
    let start = Coord::new(a.row().min(b.row()), a.col().min(b.col()));
    let end = Coord::new(a.row().max(b.row()), a.col().max(b.col()));
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::TokenStream;

    fn extract(formula: &str) -> Extraction {
        extract_references(&TokenStream::tokenize(formula))
    }

    fn cell(sheet: Option<&str>, row: u32, col: u32) -> RefTarget {
        RefTarget::Cell { sheet: sheet.map(String::from), coord: Coord::new(row, col) }
    }

    #[test]
    fn direct_refs_with_home_sheet_default() {
        let ex = extract("=A1+B2");
        assert_eq!(ex.refs.len(), 2);
        assert_eq!(ex.refs[0].target, cell(None, 1, 1));
        assert_eq!(ex.refs[1].target, cell(None, 2, 2));
        assert_eq!(ex.refs[0].enclosing_func, None);
    }

    #[test]
    fn sheet_binding_applies_to_next_ref_only() {
        let ex = extract("=Data!B2+C3");
        assert_eq!(ex.refs[0].target, cell(Some("Data"), 2, 2));
        assert_eq!(ex.refs[1].target, cell(None, 3, 3));
    }

    #[test]
    fn range_not_flattened_and_enclosing_func_recorded() {
        let ex = extract("=SUM(Data!B2:B4)");
        assert_eq!(ex.refs.len(), 1);
        assert_eq!(
            ex.refs[0].target,
            RefTarget::Range {
                sheet: Some("Data".into()),
                start: Coord::new(2, 2),
                end: Coord::new(4, 2),
            }
        );
        assert_eq!(ex.refs[0].enclosing_func.as_deref(), Some("SUM"));
    }

    #[test]
    fn inverted_range_corners_normalise() {
        let ex = extract("=SUM(B4:A2)");
        assert_eq!(
            ex.refs[0].target,
            RefTarget::Range { sheet: None, start: Coord::new(2, 1), end: Coord::new(4, 2) }
        );
    }

    #[test]
    fn named_candidates() {
        let ex = extract("=TaxRate*A1");
        assert_eq!(ex.refs[0].target, RefTarget::Named("TaxRate".into()));
        assert_eq!(ex.refs[1].target, cell(None, 1, 1));
    }

    #[test]
    fn indirect_literal_argument() {
        let ex = extract("=INDIRECT(\"S!A1\")");
        assert!(ex.refs.is_empty());
        assert_eq!(ex.calls.len(), 1);
        assert_eq!(ex.calls[0].func, "INDIRECT");
        assert_eq!(ex.calls[0].args, vec![CallArg::Text("S!A1".into())]);
    }

    #[test]
    fn indirect_concat_stays_unfolded_here() {
        let ex = extract("=INDIRECT(\"S!B\"&\"2\")");
        assert_eq!(
            ex.calls[0].args,
            vec![CallArg::TextConcat(vec!["S!B".into(), "2".into()])]
        );
    }

    #[test]
    fn offset_with_literal_shifts() {
        let ex = extract("=OFFSET(B2,1,-1)");
        assert_eq!(ex.refs.len(), 1);
        assert_eq!(ex.refs[0].enclosing_func.as_deref(), Some("OFFSET"));
        assert_eq!(
            ex.calls[0].args,
            vec![CallArg::Ref(0), CallArg::Number(1.0), CallArg::Number(-1.0)]
        );
    }

    #[test]
    fn nested_call_argument_is_opaque_but_refs_survive() {
        let ex = extract("=INDIRECT(CONCAT(A1,\"x\"))");
        assert_eq!(ex.calls.len(), 1);
        assert_eq!(ex.calls[0].args, vec![CallArg::Opaque]);
        // The inner A1 is still a real value read.
        assert_eq!(ex.refs.len(), 1);
        assert_eq!(ex.refs[0].enclosing_func.as_deref(), Some("CONCAT"));
    }

    #[test]
    fn nested_dynamic_calls_both_recorded() {
        let ex = extract("=OFFSET(INDEX(A1:C3,2,2),1,0)");
        let funcs: Vec<_> = ex.calls.iter().map(|c| c.func.as_str()).collect();
        assert_eq!(funcs, ["INDEX", "OFFSET"]);
        assert_eq!(ex.calls[0].args[1], CallArg::Number(2.0));
        assert_eq!(ex.calls[1].args[0], CallArg::Opaque);
    }

    #[test]
    fn out_of_bounds_reference_counts_as_bad() {
        let ex = extract("=A1048577+B1");
        assert_eq!(ex.bad_refs, 1);
        assert_eq!(ex.refs.len(), 1);
    }

    #[test]
    fn error_literals_recorded() {
        let ex = extract("=#REF!+A1");
        assert!(ex.has_reference_error_literal());
        let ex = extract("=#DIV/0!");
        assert!(!ex.has_reference_error_literal());
    }

    #[test]
    fn refs_survive_recovery_gap() {
        let ex = extract("=SUM(@junk,B1)+C2");
        let cells: Vec<_> = ex
            .refs
            .iter()
            .filter_map(|r| match &r.target {
                RefTarget::Cell { coord, .. } => Some(coord.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(cells, ["B1", "C2"]);
    }
}
