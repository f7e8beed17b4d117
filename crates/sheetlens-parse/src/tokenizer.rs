//! Best-effort worksheet formula tokenizer.
//!
//! Produces a flat token stream from a formula body (leading `=` stripped if
//! present). Tokenizing never fails: an unrecognised character becomes a
//! single [`TokenKind::Invalid`] token, the stream is flagged, and scanning
//! resumes at the next top-level `,` or `)` so partial references can still
//! be extracted downstream.

use std::fmt::{self, Display};

use sheetlens_common::error::ERROR_LITERALS;

/// The closed set of token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Number,
    Str,
    Bool,
    /// A worksheet error literal (`#REF!`, `#DIV/0!`, …).
    Error,
    /// A function name; the following token is always `LParen`.
    Func,
    CellRef,
    RangeRef,
    /// Sheet qualifier binding the next `CellRef`/`RangeRef`.
    SheetRef,
    /// A named-range candidate.
    Name,
    Op,
    LParen,
    RParen,
    Comma,
    Semicolon,
    LBrace,
    RBrace,
    Whitespace,
    /// Unrecognised input skipped by error recovery.
    Invalid,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One token. `text` is the cooked form (strings unescaped and unquoted,
/// sheet qualifiers unquoted, function names uppercased); `start..end` is
/// the byte span in the formula body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, start: usize, end: usize) -> Self {
        Token { kind, text: text.into(), start, end }
    }

    pub fn is_significant(&self) -> bool {
        self.kind != TokenKind::Whitespace
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {:?}>", self.kind, self.text)
    }
}

/// The tokenized formula.
#[derive(Debug, Clone)]
pub struct TokenStream {
    pub tokens: Vec<Token>,
    invalid_count: usize,
    whitespace_count: usize,
}

impl TokenStream {
    /// Tokenize a formula, stripping one leading `=` if present.
    pub fn tokenize(formula: &str) -> Self {
        let body = formula.strip_prefix('=').unwrap_or(formula);
        Lexer::new(body).run()
    }

    /// True when error recovery fired at least once; such formulas are
    /// surfaced as broken references by the anomaly pass.
    pub fn has_invalid(&self) -> bool {
        self.invalid_count > 0
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid_count
    }

    /// Whitespace runs seen while scanning; kept for provenance only.
    pub fn whitespace_count(&self) -> usize {
        self.whitespace_count
    }

    /// Significant (non-whitespace) tokens in source order.
    pub fn significant(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| t.is_significant())
    }
}

/// Operator count used both for the `high_complexity` anomaly and the
/// `avg_complexity` metric. One definition, counted over the formula body:
/// occurrences of `+ - * / ^ ( ) , :`.
pub fn operator_complexity(formula: &str) -> usize {
    let body = formula.strip_prefix('=').unwrap_or(formula);
    body.bytes()
        .filter(|b| matches!(b, b'+' | b'-' | b'*' | b'/' | b'^' | b'(' | b')' | b',' | b':'))
        .count()
}

struct Lexer<'a> {
    body: &'a str,
    bytes: &'a [u8],
    offset: usize,
    tokens: Vec<Token>,
    invalid_count: usize,
    whitespace_count: usize,
}

impl<'a> Lexer<'a> {
    fn new(body: &'a str) -> Self {
        Lexer {
            body,
            bytes: body.as_bytes(),
            offset: 0,
            tokens: Vec::with_capacity(body.len() / 2),
            invalid_count: 0,
            whitespace_count: 0,
        }
    }

    fn run(mut self) -> TokenStream {
        while self.offset < self.bytes.len() {
            let b = self.bytes[self.offset];
            match b {
                b'"' => self.scan_string(),
                b'#' => self.scan_error(),
                b'0'..=b'9' => self.scan_number(),
                b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.scan_number(),
                b'\'' => self.scan_quoted_sheet(),
                b'$' | b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.scan_word(),
                b'<' | b'>' | b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b'%' => {
                    self.scan_operator()
                }
                b'(' => self.push_single(TokenKind::LParen),
                b')' => self.push_single(TokenKind::RParen),
                b',' => self.push_single(TokenKind::Comma),
                b';' => self.push_single(TokenKind::Semicolon),
                b'{' => self.push_single(TokenKind::LBrace),
                b'}' => self.push_single(TokenKind::RBrace),
                b' ' | b'\t' | b'\n' | b'\r' => self.scan_whitespace(),
                _ => self.recover(self.offset),
            }
        }
        TokenStream {
            tokens: self.tokens,
            invalid_count: self.invalid_count,
            whitespace_count: self.whitespace_count,
        }
    }

    #[inline]
    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.offset + ahead).copied()
    }

    fn push_single(&mut self, kind: TokenKind) {
        let start = self.offset;
        self.offset += 1;
        self.tokens
            .push(Token::new(kind, &self.body[start..self.offset], start, self.offset));
    }

    /// `"…"` with `""` as an embedded quote. An unterminated string consumes
    /// the rest of the body as `Invalid`.
    fn scan_string(&mut self) {
        let start = self.offset;
        let mut text = String::new();
        let mut i = self.offset + 1;
        while i < self.bytes.len() {
            if self.bytes[i] == b'"' {
                if self.bytes.get(i + 1) == Some(&b'"') {
                    text.push('"');
                    i += 2;
                    continue;
                }
                self.offset = i + 1;
                self.tokens.push(Token::new(TokenKind::Str, text, start, self.offset));
                return;
            }
            let ch = self.body[i..].chars().next().expect("in-bounds char");
            text.push(ch);
            i += ch.len_utf8();
        }
        self.offset = self.bytes.len();
        self.tokens
            .push(Token::new(TokenKind::Invalid, &self.body[start..], start, self.offset));
        self.invalid_count += 1;
    }

    /// Exact match against the error-literal table; anything else starting
    /// with `#` is unrecognised input.
    fn scan_error(&mut self) {
        let rest = &self.body[self.offset..];
        for lit in ERROR_LITERALS {
            let code = lit.as_str();
            if rest.starts_with(code) {
                let start = self.offset;
                self.offset += code.len();
                self.tokens.push(Token::new(TokenKind::Error, code, start, self.offset));
                return;
            }
        }
        self.recover(self.offset);
    }

    /// `[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?`, leading `.` allowed.
    fn scan_number(&mut self) {
        let start = self.offset;
        let mut i = self.offset;
        while i < self.bytes.len() && self.bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i < self.bytes.len()
            && self.bytes[i] == b'.'
            && self.bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())
        {
            i += 1;
            while i < self.bytes.len() && self.bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        if i < self.bytes.len() && matches!(self.bytes[i], b'e' | b'E') {
            let mut j = i + 1;
            if j < self.bytes.len() && matches!(self.bytes[j], b'+' | b'-') {
                j += 1;
            }
            if j < self.bytes.len() && self.bytes[j].is_ascii_digit() {
                i = j;
                while i < self.bytes.len() && self.bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
        }
        self.offset = i;
        self.tokens
            .push(Token::new(TokenKind::Number, &self.body[start..i], start, i));
    }

    fn scan_whitespace(&mut self) {
        let start = self.offset;
        while self.offset < self.bytes.len()
            && matches!(self.bytes[self.offset], b' ' | b'\t' | b'\n' | b'\r')
        {
            self.offset += 1;
        }
        self.whitespace_count += 1;
        self.tokens.push(Token::new(
            TokenKind::Whitespace,
            &self.body[start..self.offset],
            start,
            self.offset,
        ));
    }

    /// Two-character comparison operators take precedence over singles.
    fn scan_operator(&mut self) {
        let start = self.offset;
        let two = self.body.get(start..start + 2);
        if matches!(two, Some("<=") | Some(">=") | Some("<>")) {
            self.offset += 2;
        } else {
            self.offset += 1;
        }
        self.tokens.push(Token::new(
            TokenKind::Op,
            &self.body[start..self.offset],
            start,
            self.offset,
        ));
    }

    /// `'Sheet Name'!` qualifier followed by a cell or range reference.
    fn scan_quoted_sheet(&mut self) {
        let start = self.offset;
        let mut name = String::new();
        let mut i = self.offset + 1;
        loop {
            match self.bytes.get(i) {
                Some(b'\'') if self.bytes.get(i + 1) == Some(&b'\'') => {
                    name.push('\'');
                    i += 2;
                }
                Some(b'\'') => break,
                Some(_) => {
                    let ch = self.body[i..].chars().next().expect("in-bounds char");
                    name.push(ch);
                    i += ch.len_utf8();
                }
                None => {
                    self.recover(start);
                    return;
                }
            }
        }
        // i sits on the closing quote; a '!' and a reference must follow.
        if self.bytes.get(i + 1) != Some(&b'!') {
            self.recover(start);
            return;
        }
        let ref_start = i + 2;
        let Some(ref_end) = self.match_reference(ref_start) else {
            self.recover(start);
            return;
        };
        self.tokens
            .push(Token::new(TokenKind::SheetRef, name, start, ref_start));
        self.push_reference(ref_start, ref_end);
    }

    /// Words beginning with `$`, a letter, or `_`: sheet-qualified
    /// references, ranges, cells, booleans, function names, and names, in
    /// that priority order.
    fn scan_word(&mut self) {
        let start = self.offset;

        // Unquoted sheet qualifier: ident immediately followed by `!` and a
        // reference.
        if self.bytes[start] != b'$' {
            let mut i = start;
            while i < self.bytes.len()
                && (self.bytes[i].is_ascii_alphanumeric() || self.bytes[i] == b'_')
            {
                i += 1;
            }
            if i > start && self.bytes.get(i) == Some(&b'!') {
                let ref_start = i + 1;
                if let Some(ref_end) = self.match_reference(ref_start) {
                    self.tokens.push(Token::new(
                        TokenKind::SheetRef,
                        &self.body[start..i],
                        start,
                        ref_start,
                    ));
                    self.push_reference(ref_start, ref_end);
                    return;
                }
                self.recover(start);
                return;
            }
        }

        if let Some(end) = self.match_reference(start) {
            self.push_reference(start, end);
            return;
        }
        if self.bytes[start] == b'$' {
            // `$` that did not open a reference is unrecognised input.
            self.recover(start);
            return;
        }

        // Plain identifier: boolean, function call, or name.
        let mut i = start;
        while i < self.bytes.len()
            && (self.bytes[i].is_ascii_alphanumeric() || matches!(self.bytes[i], b'_' | b'.'))
        {
            i += 1;
        }
        let word = &self.body[start..i];
        self.offset = i;
        if self.bytes.get(i) == Some(&b'(') {
            self.tokens
                .push(Token::new(TokenKind::Func, word.to_ascii_uppercase(), start, i));
        } else if word.eq_ignore_ascii_case("TRUE") || word.eq_ignore_ascii_case("FALSE") {
            self.tokens.push(Token::new(TokenKind::Bool, word, start, i));
        } else {
            self.tokens.push(Token::new(TokenKind::Name, word, start, i));
        }
    }

    /// Match `$?[A-Z]+$?[0-9]+` at `from`, returning the end offset. The
    /// match must not be followed by an identifier character (so `A1B` and
    /// `SUM1` lex as words, not references).
    fn match_cell(&self, from: usize) -> Option<usize> {
        let mut i = from;
        if self.bytes.get(i) == Some(&b'$') {
            i += 1;
        }
        let col_start = i;
        while i < self.bytes.len() && self.bytes[i].is_ascii_uppercase() {
            i += 1;
        }
        if i == col_start {
            return None;
        }
        if self.bytes.get(i) == Some(&b'$') {
            i += 1;
        }
        let row_start = i;
        while i < self.bytes.len() && self.bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == row_start {
            return None;
        }
        match self.bytes.get(i) {
            Some(b) if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.') => None,
            _ => Some(i),
        }
    }

    /// Match a range (`A1:B2`) or single cell at `from`.
    fn match_reference(&self, from: usize) -> Option<usize> {
        let cell_end = self.match_cell(from)?;
        if self.bytes.get(cell_end) == Some(&b':') {
            if let Some(range_end) = self.match_cell(cell_end + 1) {
                return Some(range_end);
            }
        }
        Some(cell_end)
    }

    fn push_reference(&mut self, start: usize, end: usize) {
        let text = &self.body[start..end];
        let kind = if text.contains(':') { TokenKind::RangeRef } else { TokenKind::CellRef };
        self.tokens.push(Token::new(kind, text, start, end));
        self.offset = end;
    }

    /// Error recovery: emit one `Invalid` token from `from` up to (not
    /// including) the next `,` or `)` at or above the current parenthesis
    /// depth, or the end of input.
    fn recover(&mut self, from: usize) {
        let mut i = from.max(self.offset);
        if i == self.offset {
            // Make progress even when the offending character is the first.
            i = self.offset + utf8_len(self.bytes[self.offset]);
        }
        let mut depth = 0i32;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'(' => depth += 1,
                b')' if depth == 0 => break,
                b')' => depth -= 1,
                b',' if depth == 0 => break,
                _ => {}
            }
            i += utf8_len(self.bytes[i]);
        }
        self.tokens
            .push(Token::new(TokenKind::Invalid, &self.body[from..i], from, i));
        self.invalid_count += 1;
        self.offset = i;
    }
}

#[inline]
fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(formula: &str) -> Vec<TokenKind> {
        TokenStream::tokenize(formula)
            .significant()
            .map(|t| t.kind)
            .collect()
    }

    fn texts(formula: &str) -> Vec<String> {
        TokenStream::tokenize(formula)
            .significant()
            .map(|t| t.text.clone())
            .collect()
    }

    #[test]
    fn simple_arithmetic() {
        assert_eq!(
            kinds("=A1+A2"),
            [TokenKind::CellRef, TokenKind::Op, TokenKind::CellRef]
        );
    }

    #[test]
    fn function_call_with_range() {
        assert_eq!(
            kinds("=SUM(B2:B4)"),
            [
                TokenKind::Func,
                TokenKind::LParen,
                TokenKind::RangeRef,
                TokenKind::RParen
            ]
        );
        assert_eq!(texts("=sum(B2:B4)")[0], "SUM");
    }

    #[test]
    fn sheet_qualified_references() {
        assert_eq!(
            kinds("=Data!B2+'P&L 2024'!C3"),
            [
                TokenKind::SheetRef,
                TokenKind::CellRef,
                TokenKind::Op,
                TokenKind::SheetRef,
                TokenKind::CellRef
            ]
        );
        let stream = TokenStream::tokenize("='P&L 2024'!C3");
        assert_eq!(stream.tokens[0].text, "P&L 2024");
    }

    #[test]
    fn anchors_and_case() {
        assert_eq!(kinds("=$A$1"), [TokenKind::CellRef]);
        assert_eq!(kinds("=$A1:B$2"), [TokenKind::RangeRef]);
        // Lowercase letters never form references.
        assert_eq!(kinds("=a1"), [TokenKind::Name]);
    }

    #[test]
    fn numbers() {
        assert_eq!(texts("=1.5e-3+.25+2"), ["1.5e-3", "+", ".25", "+", "2"]);
        // `1.` does not match the number rule; the dot is unrecognised.
        let stream = TokenStream::tokenize("=1.+2");
        assert!(stream.has_invalid());
    }

    #[test]
    fn strings_with_escapes() {
        let stream = TokenStream::tokenize("=\"say \"\"hi\"\"\"&A1");
        assert_eq!(stream.tokens[0].kind, TokenKind::Str);
        assert_eq!(stream.tokens[0].text, "say \"hi\"");
        assert!(!stream.has_invalid());
    }

    #[test]
    fn unterminated_string_flags() {
        let stream = TokenStream::tokenize("=\"oops");
        assert!(stream.has_invalid());
    }

    #[test]
    fn error_literals() {
        assert_eq!(kinds("=#REF!+1"), [TokenKind::Error, TokenKind::Op, TokenKind::Number]);
        assert_eq!(kinds("=#DIV/0!"), [TokenKind::Error]);
        // Unknown # codes trigger recovery.
        assert!(TokenStream::tokenize("=#BAD+1").has_invalid());
    }

    #[test]
    fn booleans_functions_names() {
        assert_eq!(
            kinds("=IF(TRUE,TaxRate,FALSE)"),
            [
                TokenKind::Func,
                TokenKind::LParen,
                TokenKind::Bool,
                TokenKind::Comma,
                TokenKind::Name,
                TokenKind::Comma,
                TokenKind::Bool,
                TokenKind::RParen
            ]
        );
    }

    #[test]
    fn operators_longest_match() {
        assert_eq!(texts("=A1<=B1"), ["A1", "<=", "B1"]);
        assert_eq!(texts("=A1<>B1"), ["A1", "<>", "B1"]);
        assert_eq!(texts("=A1<B1"), ["A1", "<", "B1"]);
        assert_eq!(texts("=50%"), ["50", "%"]);
    }

    #[test]
    fn recovery_resumes_at_top_level_separator() {
        // `@` is unknown; everything up to the top-level comma is skipped,
        // then scanning resumes and still sees B1.
        let stream = TokenStream::tokenize("=SUM(@bad(x),B1)");
        assert!(stream.has_invalid());
        let sig: Vec<_> = stream.significant().map(|t| (t.kind, t.text.clone())).collect();
        assert!(sig.iter().any(|(k, t)| *k == TokenKind::CellRef && t == "B1"));
    }

    #[test]
    fn whitespace_counted_not_significant() {
        let stream = TokenStream::tokenize("= A1 +  B2 ");
        assert_eq!(stream.whitespace_count(), 4);
        assert_eq!(
            stream.significant().map(|t| t.kind).collect::<Vec<_>>(),
            [TokenKind::CellRef, TokenKind::Op, TokenKind::CellRef]
        );
    }

    #[test]
    fn complexity_counts_the_fixed_operator_set() {
        assert_eq!(operator_complexity("=A1+A2"), 1);
        assert_eq!(operator_complexity("=SUM(A1:A9)*(1+B2)"), 6);
        assert_eq!(operator_complexity("42"), 0);
    }

    #[test]
    fn spans_cover_source() {
        let formula = "=SUM(A1:B2, \"x\")";
        let stream = TokenStream::tokenize(formula);
        let body_len = formula.len() - 1;
        let mut covered = vec![false; body_len];
        for t in &stream.tokens {
            for slot in &mut covered[t.start..t.end] {
                assert!(!*slot, "overlapping span in {formula:?}");
                *slot = true;
            }
        }
        assert!(covered.iter().all(|c| *c), "gap in spans for {formula:?}");
    }
}
