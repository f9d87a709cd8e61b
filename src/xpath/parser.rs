//! Expression compiler: tokens to [`Expr`].
//!
//! Binary operators are parsed by precedence climbing over the XPath 1.0
//! levels (loosest first): `or`, `and`, equality, relational, additive,
//! multiplicative. Unary minus binds tighter than all of them, and `|`
//! tighter still. Location paths, filter expressions and the abbreviations
//! `.`, `..`, `@` and `//` are expanded into explicit steps here so the
//! evaluator only sees full axes.

use super::ast::{Axis, BinaryOp, Expr, NodeTest, Step};
use super::lexer::{tokenize, Spanned, Token};
use super::types::XPathError;

/// Deepest expression tree the compiler builds. Parenthesized groups,
/// predicates, function arguments, negations and each operator in a chain
/// count one level.
pub const MAX_NESTING_DEPTH: usize = 200;

/// Compiles an expression string.
///
/// # Errors
///
/// Returns `XPathError::Syntax` with the byte offset of the offending token
/// when the input is not a complete XPath 1.0 expression.
///
/// ```
/// use oxidom::xpath::parser::parse;
///
/// assert!(parse("//book[@price > 10]/title").is_ok());
/// assert!(parse("1 + ").unwrap_err().is_syntax());
/// ```
pub fn parse(source: &str) -> Result<Expr, XPathError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(XPathError::syntax("empty expression", 0));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
        depth: 0,
    };
    let expr = parser.expr()?;
    if let Some((token, at)) = parser.tokens.get(parser.pos) {
        return Err(XPathError::syntax(
            format!("unexpected {token:?} after expression"),
            *at,
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    depth: usize,
}

fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq | BinaryOp::Ne => 3,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
        BinaryOp::Add | BinaryOp::Sub => 5,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |&(_, at)| at)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), XPathError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, wanted: &str) -> XPathError {
        let found = match self.peek() {
            Some(token) => format!("{token:?}"),
            None => "end of expression".to_string(),
        };
        XPathError::syntax(format!("expected {wanted}, found {found}"), self.offset())
    }

    /// Claims one level of nesting.
    fn descend(&mut self) -> Result<(), XPathError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(XPathError::syntax("expression nested too deeply", self.offset()));
        }
        self.depth += 1;
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, XPathError> {
        let entered = self.depth;
        self.descend()?;
        let expr = self.binary(1)?;
        self.depth = entered;
        Ok(expr)
    }

    fn binary_op(&self) -> Option<BinaryOp> {
        match self.peek()? {
            Token::Op(op) => Some(*op),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        }
    }

    fn binary(&mut self, min_level: u8) -> Result<Expr, XPathError> {
        let entered = self.depth;
        let mut left = self.unary()?;
        while let Some(op) = self.binary_op() {
            let level = precedence(op);
            if level < min_level {
                break;
            }
            self.pos += 1;
            self.descend()?;
            let right = self.binary(level + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = entered;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, XPathError> {
        let entered = self.depth;
        if self.eat(&Token::Minus) {
            self.descend()?;
            let operand = self.unary()?;
            self.depth = entered;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        let mut expr = self.path()?;
        while self.eat(&Token::Pipe) {
            self.descend()?;
            expr = Expr::Union(Box::new(expr), Box::new(self.path()?));
        }
        self.depth = entered;
        Ok(expr)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Dot
                    | Token::DotDot
                    | Token::At
                    | Token::AxisName(_)
                    | Token::NameTest(_)
                    | Token::NodeType(_)
            )
        )
    }

    fn path(&mut self) -> Result<Expr, XPathError> {
        if self.eat(&Token::Slash) {
            let mut steps = Vec::new();
            if self.starts_step() {
                self.relative_steps(&mut steps)?;
            }
            return Ok(Expr::Path {
                absolute: true,
                steps,
            });
        }
        if self.eat(&Token::DoubleSlash) {
            let mut steps = vec![Step::descendant_or_self()];
            self.relative_steps(&mut steps)?;
            return Ok(Expr::Path {
                absolute: true,
                steps,
            });
        }
        if self.starts_step() {
            let mut steps = Vec::new();
            self.relative_steps(&mut steps)?;
            return Ok(Expr::Path {
                absolute: false,
                steps,
            });
        }

        let primary = self.primary()?;
        let predicates = self.predicates()?;
        let base = if predicates.is_empty() {
            primary
        } else {
            Expr::Filter {
                base: Box::new(primary),
                predicates,
            }
        };
        let mut steps = Vec::new();
        if self.eat(&Token::DoubleSlash) {
            steps.push(Step::descendant_or_self());
        } else if !self.eat(&Token::Slash) {
            return Ok(base);
        }
        self.relative_steps(&mut steps)?;
        Ok(Expr::Chain {
            base: Box::new(base),
            steps,
        })
    }

    fn relative_steps(&mut self, steps: &mut Vec<Step>) -> Result<(), XPathError> {
        steps.push(self.step()?);
        loop {
            if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
            } else if !self.eat(&Token::Slash) {
                return Ok(());
            }
            steps.push(self.step()?);
        }
    }

    fn step(&mut self) -> Result<Step, XPathError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        let axis = match self.peek() {
            Some(Token::At) => {
                self.pos += 1;
                Axis::Attribute
            }
            Some(&Token::AxisName(axis)) => {
                self.pos += 1;
                self.expect(&Token::DoubleColon, "'::'")?;
                axis
            }
            _ => Axis::Child,
        };
        let test = self.node_test()?;
        let predicates = self.predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest, XPathError> {
        match self.peek().cloned() {
            Some(Token::NameTest(test)) => {
                self.pos += 1;
                Ok(test)
            }
            Some(Token::NodeType(kind)) => {
                self.pos += 1;
                self.expect(&Token::LParen, "'('")?;
                let test = match kind.as_str() {
                    "node" => NodeTest::AnyNode,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => {
                        let target = match self.peek() {
                            Some(Token::Literal(t)) => Some(t.clone()),
                            _ => None,
                        };
                        if target.is_some() {
                            self.pos += 1;
                        }
                        NodeTest::ProcessingInstruction(target)
                    }
                };
                self.expect(&Token::RParen, "')'")?;
                Ok(test)
            }
            _ => Err(self.unexpected("a node test")),
        }
    }

    fn predicates(&mut self) -> Result<Vec<Expr>, XPathError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.expr()?);
            self.expect(&Token::RBracket, "']'")?;
        }
        Ok(predicates)
    }

    fn primary(&mut self) -> Result<Expr, XPathError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected("an expression"));
        };
        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Token::Literal(s) => {
                self.pos += 1;
                Ok(Expr::Literal(s))
            }
            Token::Variable(name) => {
                self.pos += 1;
                Ok(Expr::Variable(name))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::FunctionName(name) => {
                self.pos += 1;
                self.expect(&Token::LParen, "'('")?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma, "',' or ')'")?;
                    }
                }
                Ok(Expr::Call { name, args })
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn child(local: &str) -> Step {
        Step {
            axis: Axis::Child,
            test: NodeTest::Name {
                prefix: None,
                local: local.to_string(),
            },
            predicates: Vec::new(),
        }
    }

    #[test]
    fn test_absolute_paths() {
        assert_eq!(
            parse("/").unwrap(),
            Expr::Path {
                absolute: true,
                steps: Vec::new()
            }
        );
        assert_eq!(
            parse("//b").unwrap(),
            Expr::Path {
                absolute: true,
                steps: vec![Step::descendant_or_self(), child("b")]
            }
        );
    }

    #[test]
    fn test_abbreviations_expand() {
        let Expr::Path { absolute, steps } = parse("../@id").unwrap() else {
            panic!("expected a path");
        };
        assert!(!absolute);
        assert_eq!(steps[0].axis, Axis::Parent);
        assert_eq!(steps[0].test, NodeTest::AnyNode);
        assert_eq!(steps[1].axis, Axis::Attribute);
    }

    #[test]
    fn test_precedence() {
        let Expr::Binary { op, right, .. } = parse("1 + 2 * 3").unwrap() else {
            panic!("expected a binary expression");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));

        let Expr::Binary { op, left, .. } = parse("a or b and c").unwrap() else {
            panic!("expected a binary expression");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(*left, Expr::Path { .. }));
    }

    #[test]
    fn test_left_associative_subtraction() {
        let Expr::Binary { op, left, .. } = parse("5 - 2 - 1").unwrap() else {
            panic!("expected a binary expression");
        };
        assert_eq!(op, BinaryOp::Sub);
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));
    }

    #[test]
    fn test_filter_and_chain() {
        let expr = parse("(a | b)[1]//c").unwrap();
        let Expr::Chain { base, steps } = expr else {
            panic!("expected a chained path");
        };
        assert!(matches!(*base, Expr::Filter { .. }));
        assert_eq!(steps, vec![Step::descendant_or_self(), child("c")]);
    }

    #[test]
    fn test_function_arguments() {
        assert_eq!(
            parse("concat('a', 'b')").unwrap(),
            Expr::Call {
                name: "concat".into(),
                args: vec![Expr::Literal("a".into()), Expr::Literal("b".into())]
            }
        );
        assert_eq!(
            parse("processing-instruction('php')").unwrap(),
            Expr::Path {
                absolute: false,
                steps: vec![Step {
                    axis: Axis::Child,
                    test: NodeTest::ProcessingInstruction(Some("php".into())),
                    predicates: Vec::new()
                }]
            }
        );
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["", "1 + ", "a[", "f(1,", "child::", "(1", "a b", "@"] {
            assert!(parse(bad).unwrap_err().is_syntax(), "{bad:?} should fail");
        }
    }

    #[test]
    fn test_error_offset_at_end() {
        let XPathError::Syntax { position, .. } = parse("1 + ").unwrap_err() else {
            panic!("expected a syntax error");
        };
        assert_eq!(position, 4);
    }

    #[test]
    fn test_nesting_limit() {
        let parens = |n: usize| format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert_eq!(parse(&parens(MAX_NESTING_DEPTH - 1)).unwrap(), Expr::Number(1.0));
        let err = parse(&parens(800)).unwrap_err();
        assert!(err.is_syntax());
        assert!(err.to_string().contains("nested too deeply"), "{err}");

        assert!(parse(&format!("{}1", "-".repeat(150))).is_ok());
        assert!(parse(&format!("{}1", "-".repeat(100_000))).unwrap_err().is_syntax());
    }

    #[test]
    fn test_long_operator_chains_are_bounded() {
        let chain = |n: usize| vec!["1"; n].join(" + ");
        assert!(parse(&chain(100)).is_ok());
        assert!(parse(&chain(50_000)).unwrap_err().is_syntax());
        assert!(parse(&vec!["a"; 50_000].join(" | ")).unwrap_err().is_syntax());
        assert!(parse(&format!("{}a{}", "a[".repeat(500), "]".repeat(500)))
            .unwrap_err()
            .is_syntax());
    }

    #[test]
    fn test_nesting_budget_is_released_between_siblings() {
        let group = format!("{}1{}", "(".repeat(150), ")".repeat(150));
        let siblings = format!("f({group}, {group}, {group})");
        assert!(parse(&siblings).is_ok());
    }
}
