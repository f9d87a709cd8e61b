//! Tokenizer for XPath 1.0 expressions.
//!
//! Applies the lexical disambiguation rules of XPath 1.0 section 3.7: after
//! a token that ends an operand, `*` is multiplication and `and`, `or`,
//! `div`, `mod` are operators. Elsewhere a name is a function name when
//! followed by `(`, an axis name when followed by `::`, and a name test
//! otherwise.

use super::ast::{Axis, BinaryOp, NodeTest};
use super::types::XPathError;
use crate::util::qname::{is_name_char, is_name_start_char};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    DotDot,
    At,
    Comma,
    DoubleColon,
    Slash,
    DoubleSlash,
    Pipe,
    Minus,
    /// Any binary operator except `-` and `|`.
    Op(BinaryOp),
    Number(f64),
    Literal(String),
    Variable(String),
    NameTest(NodeTest),
    /// `node`, `text`, `comment` or `processing-instruction` before `(`.
    NodeType(String),
    FunctionName(String),
    AxisName(Axis),
}

impl Token {
    /// Whether a following `*` or operator name must be read as an operator.
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Self::RParen
                | Self::RBracket
                | Self::Dot
                | Self::DotDot
                | Self::Number(_)
                | Self::Literal(_)
                | Self::Variable(_)
                | Self::NameTest(_)
        )
    }
}

/// A token and the byte offset where it starts.
pub type Spanned = (Token, usize);

/// Splits an expression into tokens.
///
/// # Errors
///
/// Returns `XPathError::Syntax` at the first character that cannot start a
/// token, or for an unterminated literal.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, XPathError> {
    Lexer {
        src: source,
        pos: 0,
        tokens: Vec::new(),
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    tokens: Vec<Spanned>,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Spanned>, XPathError> {
        loop {
            self.skip_space();
            let start = self.pos;
            let Some(c) = self.peek() else {
                return Ok(self.tokens);
            };
            let token = match c {
                '(' => self.single(Token::LParen),
                ')' => self.single(Token::RParen),
                '[' => self.single(Token::LBracket),
                ']' => self.single(Token::RBracket),
                '@' => self.single(Token::At),
                ',' => self.single(Token::Comma),
                '|' => self.single(Token::Pipe),
                '+' => self.single(Token::Op(BinaryOp::Add)),
                '-' => self.single(Token::Minus),
                '=' => self.single(Token::Op(BinaryOp::Eq)),
                '/' if self.rest().starts_with("//") => self.double(Token::DoubleSlash),
                '/' => self.single(Token::Slash),
                ':' if self.rest().starts_with("::") => self.double(Token::DoubleColon),
                '!' if self.rest().starts_with("!=") => self.double(Token::Op(BinaryOp::Ne)),
                '<' if self.rest().starts_with("<=") => self.double(Token::Op(BinaryOp::Le)),
                '<' => self.single(Token::Op(BinaryOp::Lt)),
                '>' if self.rest().starts_with(">=") => self.double(Token::Op(BinaryOp::Ge)),
                '>' => self.single(Token::Op(BinaryOp::Gt)),
                '.' if self.rest().starts_with("..") => self.double(Token::DotDot),
                '.' if !self.rest()[1..].starts_with(|d: char| d.is_ascii_digit()) => {
                    self.single(Token::Dot)
                }
                '.' | '0'..='9' => self.number(),
                '"' | '\'' => self.literal(c, start)?,
                '$' => {
                    self.pos += 1;
                    let name = self.qname().ok_or_else(|| {
                        XPathError::syntax("expected variable name after '$'", start)
                    })?;
                    Token::Variable(name)
                }
                '*' => {
                    self.pos += 1;
                    if self.after_operand() {
                        Token::Op(BinaryOp::Mul)
                    } else {
                        Token::NameTest(NodeTest::AnyName)
                    }
                }
                c if is_name_start_char(c) && c != ':' => self.name(start)?,
                other => {
                    return Err(XPathError::syntax(
                        format!("unexpected character '{other}'"),
                        start,
                    ))
                }
            };
            self.tokens.push((token, start));
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_space(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
        self.pos += rest.len() - trimmed.len();
    }

    fn single(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    fn double(&mut self, token: Token) -> Token {
        self.pos += 2;
        token
    }

    fn after_operand(&self) -> bool {
        self.tokens.last().is_some_and(|(t, _)| t.ends_operand())
    }

    fn number(&mut self) -> Token {
        let rest = self.rest();
        let mut len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if rest[len..].starts_with('.') {
            len += 1;
            len += rest[len..]
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len() - len);
        }
        let text = &rest[..len];
        self.pos += len;
        let value = text.trim_end_matches('.').parse().unwrap_or(0.0);
        Token::Number(value)
    }

    fn literal(&mut self, quote: char, start: usize) -> Result<Token, XPathError> {
        let body = &self.src[self.pos + 1..];
        let end = body
            .find(quote)
            .ok_or_else(|| XPathError::syntax("unterminated string literal", start))?;
        let value = body[..end].to_string();
        self.pos += end + 2;
        Ok(Token::Literal(value))
    }

    fn ncname(&mut self) -> Option<&'a str> {
        let rest: &'a str = &self.src[self.pos..];
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start_char(c) && c != ':' => {}
            _ => return None,
        }
        let len = chars
            .find(|&(_, c)| !is_name_char(c) || c == ':')
            .map_or(rest.len(), |(i, _)| i);
        self.pos += len;
        Some(&rest[..len])
    }

    /// Reads `NCName (':' NCName)?`.
    fn qname(&mut self) -> Option<String> {
        let first = self.ncname()?.to_string();
        let save = self.pos;
        if self.rest().starts_with(':') && !self.rest().starts_with("::") {
            self.pos += 1;
            if let Some(local) = self.ncname() {
                return Some(format!("{first}:{local}"));
            }
            self.pos = save;
        }
        Some(first)
    }

    fn name(&mut self, start: usize) -> Result<Token, XPathError> {
        let first = self.ncname().unwrap_or_default().to_string();

        if self.after_operand() {
            let op = match first.as_str() {
                "and" => BinaryOp::And,
                "or" => BinaryOp::Or,
                "div" => BinaryOp::Div,
                "mod" => BinaryOp::Mod,
                _ => {
                    return Err(XPathError::syntax(
                        format!("expected an operator, found '{first}'"),
                        start,
                    ))
                }
            };
            return Ok(Token::Op(op));
        }

        if self.rest().starts_with(":*") {
            self.pos += 2;
            return Ok(Token::NameTest(NodeTest::AnyLocalName(first)));
        }

        let mut prefix = None;
        let mut local = first;
        if self.rest().starts_with(':') && !self.rest().starts_with("::") {
            self.pos += 1;
            let at = self.pos;
            let second = self
                .ncname()
                .ok_or_else(|| XPathError::syntax("expected local name after ':'", at))?
                .to_string();
            prefix = Some(local);
            local = second;
        }

        let lookahead = self.rest().trim_start_matches([' ', '\t', '\r', '\n']);
        if prefix.is_none() && lookahead.starts_with("::") {
            let axis = Axis::from_name(&local)
                .ok_or_else(|| XPathError::syntax(format!("unknown axis '{local}'"), start))?;
            return Ok(Token::AxisName(axis));
        }
        if lookahead.starts_with('(') {
            if prefix.is_none()
                && matches!(
                    local.as_str(),
                    "node" | "text" | "comment" | "processing-instruction"
                )
            {
                return Ok(Token::NodeType(local));
            }
            let name = match prefix {
                Some(p) => format!("{p}:{local}"),
                None => local,
            };
            return Ok(Token::FunctionName(name));
        }
        Ok(Token::NameTest(NodeTest::Name { prefix, local }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    fn name(local: &str) -> Token {
        Token::NameTest(NodeTest::Name {
            prefix: None,
            local: local.to_string(),
        })
    }

    #[test]
    fn test_star_disambiguation() {
        assert_eq!(
            kinds("* * *"),
            vec![
                Token::NameTest(NodeTest::AnyName),
                Token::Op(BinaryOp::Mul),
                Token::NameTest(NodeTest::AnyName),
            ]
        );
    }

    #[test]
    fn test_operator_names() {
        assert_eq!(
            kinds("div div div"),
            vec![name("div"), Token::Op(BinaryOp::Div), name("div")]
        );
        assert_eq!(
            kinds("a and b"),
            vec![name("a"), Token::Op(BinaryOp::And), name("b")]
        );
    }

    #[test]
    fn test_axis_and_function_names() {
        assert_eq!(
            kinds("child::text()"),
            vec![
                Token::AxisName(Axis::Child),
                Token::DoubleColon,
                Token::NodeType("text".into()),
                Token::LParen,
                Token::RParen,
            ]
        );
        assert_eq!(
            kinds("count (x)")[0],
            Token::FunctionName("count".into())
        );
    }

    #[test]
    fn test_prefixed_names() {
        assert_eq!(
            kinds("svg:rect | svg:*"),
            vec![
                Token::NameTest(NodeTest::Name {
                    prefix: Some("svg".into()),
                    local: "rect".into()
                }),
                Token::Pipe,
                Token::NameTest(NodeTest::AnyLocalName("svg".into())),
            ]
        );
    }

    #[test]
    fn test_numbers_and_literals() {
        assert_eq!(
            kinds(".5 + 3. - 'x'"),
            vec![
                Token::Number(0.5),
                Token::Op(BinaryOp::Add),
                Token::Number(3.0),
                Token::Minus,
                Token::Literal("x".into()),
            ]
        );
    }

    #[test]
    fn test_dots_and_slashes() {
        assert_eq!(
            kinds("..//./@id"),
            vec![
                Token::DotDot,
                Token::DoubleSlash,
                Token::Dot,
                Token::Slash,
                Token::At,
                name("id"),
            ]
        );
    }

    #[test]
    fn test_errors_carry_offsets() {
        assert_eq!(
            tokenize("a # b"),
            Err(XPathError::syntax("unexpected character '#'", 2))
        );
        assert!(tokenize("'open").unwrap_err().is_syntax());
        assert!(tokenize("bogus::x").unwrap_err().is_syntax());
    }

    #[test]
    fn test_variables() {
        assert_eq!(
            kinds("$p:v"),
            vec![Token::Variable("p:v".into())]
        );
    }
}
