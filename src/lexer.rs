use std::{fmt, rc::Rc};

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::trace;

use crate::ast::{BindingId, Expr, RegexSpec};

/// Builds an AST node once its name has been consumed from the input.
///
/// Built-ins, `let` names, loop variables and command-line definitions are all
/// stored this way, so shadowing is simply a matter of which scope is searched
/// first.
pub type Builder = Rc<dyn Fn(&mut ParseState<'_>) -> Result<Expr, ParseError>>;

/// What a name resolves to.
#[derive(Clone)]
pub enum Definition {
    /// A predicate form: always produces a `Bool` node and may only appear
    /// where a predicate is expected.
    Predicate(Builder),
    /// A value form: produces a node of any type; used on either side of a
    /// comparison, and as a predicate on its own when it is `Bool`.
    Value(Builder),
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Predicate(_) => f.write_str("Predicate(..)"),
            Definition::Value(_) => f.write_str("Value(..)"),
        }
    }
}

pub type PredicateMap = FxHashMap<String, Definition>;

/// Line and column (both 1-based) of a node in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    /// Byte offset into the query text.
    pub offset: usize,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// IUPAC nucleotide code to 4-bit base mask, indexed by `letter - 'a'`.
const NUCLEOTIDES: [u8; 26] = [
    1,  // a
    14, // b
    2,  // c
    13, // d
    0,  // e
    0,  // f
    4,  // g
    11, // h
    0,  // i
    0,  // j
    12, // k
    0,  // l
    3,  // m
    15, // n
    0,  // o
    0,  // p
    0,  // q
    5,  // r
    6,  // s
    8,  // t
    8,  // u
    7,  // v
    9,  // w
    0,  // x
    10, // y
    0,  // z
];

/// Base mask of a nucleotide letter; unknown letters match nothing.
pub fn nucleotide_mask(c: char) -> u8 {
    let c = c.to_ascii_lowercase();
    if c.is_ascii_lowercase() {
        NUCLEOTIDES[(c as u8 - b'a') as usize]
    } else {
        0
    }
}

pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Characters allowed in the glob arguments of `chr`, `read_group`, ...
pub fn is_glob_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '*' | '?' | '.' | '-' | '+' | ':' | '|')
}

/// Cursor over the query text plus the stack of name scopes.
pub struct ParseState<'a> {
    input: &'a str,
    index: usize,
    line: u32,
    column: u32,
    scopes: Vec<Rc<PredicateMap>>,
    next_binding: u32,
    depth: u32,
}

/// How deeply parentheses, negations and `let` chains may nest.
pub const MAX_NESTING: u32 = 64;

impl<'a> ParseState<'a> {
    pub fn new(input: &'a str) -> Self {
        ParseState {
            input,
            index: 0,
            line: 1,
            column: 1,
            scopes: Vec::new(),
            next_binding: 0,
            depth: 0,
        }
    }

    pub fn input(&self) -> &'a str {
        self.input
    }

    pub fn offset(&self) -> usize {
        self.index
    }

    pub fn location(&self) -> SourceLoc {
        SourceLoc {
            line: self.line,
            column: self.column,
        }
    }

    pub fn at_end(&self) -> bool {
        self.index >= self.input.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.input[self.index..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.input[self.index..].chars().nth(n)
    }

    pub fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.index += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    /// Error at the current position.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.index, self.location(), message)
    }

    pub fn error_at(&self, offset: usize, loc: SourceLoc, message: impl Into<String>) -> ParseError {
        ParseError {
            offset,
            line: loc.line,
            column: loc.column,
            message: message.into(),
        }
    }

    /// Skip whitespace and `#` comments.
    pub fn skip_space(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.advance(),
                Some('#') => {
                    while let Some(c) = self.peek() {
                        self.advance();
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Consume `c` if it is next (after optional space); leaves the cursor
    /// after any trailing space.
    pub fn consume_char(&mut self, c: char) -> bool {
        self.skip_space();
        if self.peek() == Some(c) {
            self.advance();
            self.skip_space();
            true
        } else {
            false
        }
    }

    /// Like [`consume_char`](Self::consume_char) but `c` is required.
    pub fn parse_char_in_space(&mut self, c: char) -> Result<(), ParseError> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", c)))
        }
    }

    /// Consume an operator spelled by several characters.
    pub fn consume_str(&mut self, s: &str) -> bool {
        self.skip_space();
        if self.input[self.index..].starts_with(s) {
            for _ in s.chars() {
                self.advance();
            }
            self.skip_space();
            true
        } else {
            false
        }
    }

    pub fn looking_at(&self, s: &str) -> bool {
        self.input[self.index..].starts_with(s)
    }

    /// Consume `word` only if it is a whole token (not a prefix of a longer
    /// identifier). Does nothing and returns `false` otherwise.
    pub fn parse_keyword(&mut self, word: &str) -> bool {
        self.skip_space();
        let rest = &self.input[self.index..];
        if !rest.starts_with(word) {
            return false;
        }
        if rest[word.len()..].chars().next().is_some_and(is_identifier_char) {
            return false;
        }
        for _ in word.chars() {
            self.advance();
        }
        self.skip_space();
        true
    }

    /// Read the longest run of characters accepted by `accept`.
    pub fn parse_identifier(&mut self, accept: impl Fn(char) -> bool) -> Option<&'a str> {
        let start = self.index;
        while let Some(c) = self.peek() {
            if accept(c) {
                self.advance();
            } else {
                break;
            }
        }
        if self.index == start {
            None
        } else {
            Some(&self.input[start..self.index])
        }
    }

    /// A predicate name: identifier characters plus an optional trailing `?`.
    pub fn parse_name(&mut self) -> Option<&'a str> {
        let start = self.index;
        self.parse_identifier(is_identifier_char)?;
        if self.peek() == Some('?') {
            self.advance();
        }
        Some(&self.input[start..self.index])
    }

    fn scan_number(&mut self) -> (usize, bool) {
        let start = self.index;
        let mut is_float = false;
        if self.peek() == Some('-') {
            self.advance();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e' | 'E'))
            && self
                .peek_nth(1)
                .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
        {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some('-' | '+')) {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        (start, is_float)
    }

    pub fn parse_int(&mut self) -> Result<i64, ParseError> {
        self.skip_space();
        let loc = self.location();
        let start = self.index;
        if self.peek() == Some('-') {
            self.advance();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let text = &self.input[start..self.index];
        text.parse::<i64>()
            .map_err(|_| self.error_at(start, loc, "expected integer"))
    }

    pub fn parse_float(&mut self) -> Result<f64, ParseError> {
        self.skip_space();
        let loc = self.location();
        let (start, _) = self.scan_number();
        let text = &self.input[start..self.index];
        text.parse::<f64>()
            .map_err(|_| self.error_at(start, loc, "expected floating point number"))
    }

    /// Parse an integer or a float, whichever the text spells.
    pub fn parse_number(&mut self) -> Result<NumberLiteral, ParseError> {
        self.skip_space();
        let loc = self.location();
        let (start, is_float) = self.scan_number();
        let text = &self.input[start..self.index];
        if is_float {
            text.parse::<f64>()
                .map(NumberLiteral::Float)
                .map_err(|_| self.error_at(start, loc, "expected floating point number"))
        } else {
            text.parse::<i64>()
                .map(NumberLiteral::Int)
                .map_err(|_| self.error_at(start, loc, "expected number"))
        }
    }

    /// `'A` is the integer code point of `A`.
    pub fn parse_char_literal(&mut self) -> Result<i64, ParseError> {
        self.skip_space();
        if self.peek() != Some('\'') {
            return Err(self.error("expected character literal"));
        }
        self.advance();
        match self.peek() {
            Some(c) if !c.is_whitespace() => {
                self.advance();
                Ok(c as i64)
            }
            _ => Err(self.error("expected character after `'`")),
        }
    }

    pub fn parse_string_literal(&mut self) -> Result<String, ParseError> {
        self.skip_space();
        let start = self.index;
        let loc = self.location();
        if self.peek() != Some('"') {
            return Err(self.error("expected string literal"));
        }
        self.advance();
        let mut result = String::new();
        while let Some(c) = self.peek() {
            self.advance();
            match c {
                '"' => return Ok(result),
                '\\' => {
                    let escaped = match self.peek() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some(other) => {
                            return Err(self.error(format!("invalid escape sequence `\\{}`", other)));
                        }
                        None => break,
                    };
                    result.push(escaped);
                    self.advance();
                }
                _ => result.push(c),
            }
        }
        Err(self.error_at(start, loc, "unterminated string literal"))
    }

    /// `/regex/` with an optional `i` suffix. The pattern is checked here so
    /// that bad patterns are reported against the query text.
    pub fn parse_regex(&mut self) -> Result<RegexSpec, ParseError> {
        self.skip_space();
        let start = self.index;
        let loc = self.location();
        if self.peek() != Some('/') {
            return Err(self.error("expected regular expression"));
        }
        self.advance();
        let mut source = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error_at(start, loc, "unterminated regular expression")),
                Some('/') => {
                    self.advance();
                    break;
                }
                Some('\\') if self.peek_nth(1) == Some('/') => {
                    self.advance();
                    self.advance();
                    source.push('/');
                }
                Some(c) => {
                    self.advance();
                    source.push(c);
                }
            }
        }
        let case_insensitive =
            if self.peek() == Some('i') && !self.peek_nth(1).is_some_and(is_identifier_char) {
                self.advance();
                true
            } else {
                false
            };
        let spec = RegexSpec::new(source, case_insensitive);
        if let Err(e) = spec.compile() {
            return Err(self.error_at(start, loc, format!("invalid regular expression: {}", e)));
        }
        Ok(spec)
    }

    /// A single IUPAC nucleotide letter as a base mask.
    pub fn parse_nt(&mut self) -> Result<u8, ParseError> {
        self.skip_space();
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                self.advance();
                Ok(nucleotide_mask(c))
            }
            _ => Err(self.error("expected nucleotide")),
        }
    }

    /// Whether a numeric literal (possibly negative) starts here.
    pub fn starts_number(&self) -> bool {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => true,
            Some('-') => self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    pub fn allocate_binding(&mut self) -> BindingId {
        let id = BindingId(self.next_binding);
        self.next_binding += 1;
        id
    }

    /// The scopes currently visible, innermost last.
    pub fn scopes(&self) -> Vec<Rc<PredicateMap>> {
        self.scopes.clone()
    }

    /// A state over `input` that sees `scopes` and continues this state's
    /// binding numbering. Hand it back with [`adopt_bindings`](Self::adopt_bindings)
    /// once it is done so ids stay unique across both.
    pub fn nested<'b>(&self, input: &'b str, scopes: Vec<Rc<PredicateMap>>) -> ParseState<'b> {
        ParseState {
            input,
            index: 0,
            line: 1,
            column: 1,
            scopes,
            next_binding: self.next_binding,
            depth: self.depth,
        }
    }

    /// Enter one more level of nesting, failing past [`MAX_NESTING`].
    pub fn descend(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn adopt_bindings(&mut self, nested: &ParseState<'_>) {
        self.next_binding = self.next_binding.max(nested.next_binding);
    }

    pub fn push_scope(&mut self, scope: Rc<PredicateMap>) {
        self.scopes.push(scope);
    }

    /// Pop `scope`, which must be the innermost one.
    pub fn pop_scope(&mut self, scope: &Rc<PredicateMap>) {
        match self.scopes.pop() {
            Some(top) if Rc::ptr_eq(&top, scope) => {}
            _ => panic!("scope stack out of order: popped a scope that was not the innermost"),
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Look `name` up from the innermost scope outwards.
    pub fn resolve(&self, name: &str, offset: usize, loc: SourceLoc) -> Result<Definition, ParseError> {
        for scope in self.scopes.iter().rev() {
            if let Some(definition) = scope.get(name) {
                trace!(name, "resolved predicate");
                return Ok(definition.clone());
            }
        }
        Err(self.error_at(offset, loc, format!("unknown predicate `{}`", name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberLiteral {
    Int(i64),
    Float(f64),
}

#[test]
fn test_keyword_boundaries() {
    let mut state = ParseState::new("then thenx");
    assert!(state.parse_keyword("then"));
    assert!(!state.parse_keyword("then"));
    assert_eq!(state.parse_name(), Some("thenx"));
}

#[test]
fn test_nucleotide_table() {
    assert_eq!(nucleotide_mask('A'), 1);
    assert_eq!(nucleotide_mask('n'), 15);
    assert_eq!(nucleotide_mask('x'), 0);
    assert_eq!(nucleotide_mask('5'), 0);
}
