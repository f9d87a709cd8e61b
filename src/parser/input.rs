//! Low-level input cursor shared by the parser.
//!
//! Tracks the byte position, line and column, nesting depth and entity
//! expansion count, and collects diagnostics. All reads go through here so
//! that locations in errors are always accurate.

use crate::error::{ErrorSeverity, ParseDiagnostic, ParseError, SourceLocation};
use crate::util::qname::{is_name_char, is_name_start_char};

/// Maximum element nesting depth.
pub(crate) const DEFAULT_MAX_DEPTH: u32 = 256;

/// Maximum length in bytes of a single text node.
pub(crate) const DEFAULT_MAX_TEXT_LENGTH: usize = 10 * 1024 * 1024;

/// Maximum length in bytes of an element or attribute name.
pub(crate) const DEFAULT_MAX_NAME_LENGTH: usize = 50_000;

/// Maximum number of entity reference expansions per document.
pub(crate) const DEFAULT_MAX_ENTITY_EXPANSIONS: u32 = 10_000;

/// Maximum number of entity expansions open inside one another.
pub(crate) const MAX_ENTITY_NESTING: usize = 40;

/// Limits applied when the parser is asked to relax them.
pub(crate) const HUGE_MAX_DEPTH: u32 = 2048;
pub(crate) const HUGE_MAX_TEXT_LENGTH: usize = 1024 * 1024 * 1024;
pub(crate) const HUGE_MAX_ENTITY_EXPANSIONS: u32 = 10_000_000;

/// `Char`, XML 1.0 §2.2 `[2]`.
pub(crate) fn is_xml_char(c: char) -> bool {
    matches!(c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x0001_0000..=0x0010_FFFF
    )
}

fn is_xml_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// Parser limits, fixed for the lifetime of one parse.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub max_depth: u32,
    pub max_text_length: usize,
    pub max_name_length: usize,
    pub max_entity_expansions: u32,
}

impl Limits {
    pub fn standard() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            max_entity_expansions: DEFAULT_MAX_ENTITY_EXPANSIONS,
        }
    }

    pub fn huge() -> Self {
        Self {
            max_depth: HUGE_MAX_DEPTH,
            max_text_length: HUGE_MAX_TEXT_LENGTH,
            max_name_length: DEFAULT_MAX_NAME_LENGTH * 20,
            max_entity_expansions: HUGE_MAX_ENTITY_EXPANSIONS,
        }
    }
}

pub(crate) struct ParserInput<'a> {
    input: &'a str,
    pos: usize,
    line: u32,
    column: u32,
    depth: u32,
    entity_expansions: u32,
    pub limits: Limits,
    recover: bool,
    pub(crate) diagnostics: Vec<ParseDiagnostic>,
}

impl<'a> ParserInput<'a> {
    pub fn new(input: &'a str, limits: Limits, recover: bool) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
            entity_expansions: 0,
            limits,
            recover,
            diagnostics: Vec::new(),
        }
    }

    pub fn recover(&self) -> bool {
        self.recover
    }

    // -- Depth and expansion tracking --

    pub fn increment_depth(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            return Err(self.fatal(format!(
                "maximum nesting depth exceeded ({})",
                self.limits.max_depth
            )));
        }
        Ok(())
    }

    pub fn decrement_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Opens a cursor over entity replacement text that shares this
    /// cursor's limits, depth and expansion count.
    pub fn nested<'b>(&self, text: &'b str) -> ParserInput<'b> {
        let mut inner = ParserInput::new(text, self.limits, self.recover);
        inner.depth = self.depth;
        inner.entity_expansions = self.entity_expansions;
        inner
    }

    /// Takes back the counters and diagnostics of a finished nested cursor.
    pub fn absorb(&mut self, inner: ParserInput<'_>) {
        self.entity_expansions = inner.entity_expansions;
        self.diagnostics.extend(inner.diagnostics);
    }

    pub fn count_expansion(&mut self) -> Result<(), ParseError> {
        self.entity_expansions += 1;
        if self.entity_expansions > self.limits.max_entity_expansions {
            return Err(self.fatal("entity expansion limit exceeded"));
        }
        Ok(())
    }

    // -- Position queries --

    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            byte_offset: self.pos,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    // -- Peeking --

    pub fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    pub fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos..).and_then(|s| s.chars().next())
    }

    pub fn looking_at(&self, s: &str) -> bool {
        self.input
            .get(self.pos..)
            .is_some_and(|rest| rest.starts_with(s))
    }

    // -- Advancing --

    /// Advances over `count` bytes of ASCII input.
    pub fn advance(&mut self, count: usize) {
        for _ in 0..count {
            if let Some(b) = self.peek() {
                self.bump(char::from(b));
            }
        }
    }

    fn bump(&mut self, ch: char) {
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += ch.len_utf8();
    }

    /// Consumes one character with `\r\n` normalization (XML 1.0 §2.11)
    /// and `Char` validation.
    pub fn next_char(&mut self) -> Result<char, ParseError> {
        let ch = self
            .peek_char()
            .ok_or_else(|| self.fatal("unexpected end of input"))?;
        self.bump(ch);
        if ch == '\r' {
            if self.peek() == Some(b'\n') {
                self.bump('\n');
            }
            return Ok('\n');
        }
        if !is_xml_char(ch) {
            self.error_or_recover(format!("invalid XML character: U+{:04X}", ch as u32))?;
        }
        Ok(ch)
    }

    pub fn expect_str(&mut self, expected: &str) -> Result<(), ParseError> {
        if self.looking_at(expected) {
            for ch in expected.chars() {
                self.bump(ch);
            }
            Ok(())
        } else {
            let found = self
                .peek_char()
                .map_or_else(|| "end of input".to_string(), |c| format!("'{c}'"));
            Err(self.fatal(format!("expected '{expected}', found {found}")))
        }
    }

    pub fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while let Some(b) = self.peek().filter(|&b| is_xml_whitespace(b)) {
            self.bump(char::from(b));
        }
        self.pos > start
    }

    pub fn skip_whitespace_required(&mut self) -> Result<(), ParseError> {
        if self.skip_whitespace() {
            Ok(())
        } else {
            Err(self.fatal("whitespace required"))
        }
    }

    /// Parses a `Name` (XML 1.0 §2.3 `[5]`).
    pub fn parse_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        match self.peek_char() {
            Some(c) if is_name_start_char(c) => self.bump(c),
            Some(c) => return Err(self.fatal(format!("invalid name start character '{c}'"))),
            None => return Err(self.fatal("unexpected end of input, expected a name")),
        }
        while let Some(c) = self.peek_char().filter(|&c| is_name_char(c)) {
            self.bump(c);
        }
        if self.pos - start > self.limits.max_name_length {
            return Err(self.fatal("name exceeds maximum length"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    /// Parses a quoted literal and returns its raw text.
    pub fn parse_quoted(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.fatal("expected quoted value")),
        };
        self.advance(1);
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.fatal("unterminated quoted value")),
                Some(b) if b == quote => {
                    self.advance(1);
                    return Ok(value);
                }
                Some(_) => value.push(self.next_char()?),
            }
        }
    }

    /// Consumes input up to (and including) `terminator`, returning the text
    /// before it.
    pub fn take_until(&mut self, terminator: &str, what: &str) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            if self.looking_at(terminator) {
                self.expect_str(terminator)?;
                return Ok(text);
            }
            if self.at_end() {
                return Err(self.fatal(format!("unterminated {what}")));
            }
            text.push(self.next_char()?);
        }
    }

    /// Parses the body of a character reference after `&#`, through `;`.
    pub fn parse_char_ref(&mut self) -> Result<char, ParseError> {
        let hex = self.peek() == Some(b'x');
        if hex {
            self.advance(1);
        }
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| if hex { b.is_ascii_hexdigit() } else { b.is_ascii_digit() })
        {
            self.advance(1);
        }
        let digits = &self.input[start..self.pos];
        self.expect_str(";")?;
        let radix = if hex { 16 } else { 10 };
        u32::from_str_radix(digits, radix)
            .ok()
            .and_then(char::from_u32)
            .filter(|&c| is_xml_char(c))
            .ok_or_else(|| self.fatal(format!("invalid character reference &#{}{digits};", if hex { "x" } else { "" })))
    }

    // -- Diagnostics --

    pub fn fatal(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location: self.location(),
            diagnostics: self.diagnostics.clone(),
        }
    }

    pub fn push_diagnostic(&mut self, severity: ErrorSeverity, message: String) {
        self.diagnostics.push(ParseDiagnostic {
            severity,
            message,
            location: self.location(),
        });
    }

    /// Records a recoverable error in recovery mode, fails otherwise.
    pub fn error_or_recover(&mut self, message: String) -> Result<(), ParseError> {
        if self.recover {
            self.push_diagnostic(ErrorSeverity::Error, message);
            Ok(())
        } else {
            Err(self.fatal(message))
        }
    }
}

/// A namespace scope stack mapping prefixes to URIs during parsing.
pub(crate) struct NamespaceResolver {
    scopes: Vec<Vec<(Option<String>, String)>>,
}

impl NamespaceResolver {
    pub fn new() -> Self {
        Self { scopes: vec![Vec::new()] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn bind(&mut self, prefix: Option<String>, uri: String) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((prefix, uri));
        }
    }

    /// Resolves a prefix; an empty URI (`xmlns=""`) resolves to `None`.
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(crate::util::qname::XML_NAMESPACE);
        }
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// Returns `true` if `prefix` is already bound to exactly `uri` in an
    /// enclosing scope.
    pub fn is_redundant(&self, prefix: Option<&str>, uri: &str) -> bool {
        let enclosing = self.scopes.len().saturating_sub(1);
        self.scopes[..enclosing]
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .is_some_and(|(_, u)| u == uri)
    }
}
