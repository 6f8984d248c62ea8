//! Formula parser
//!
//! A recursive descent parser over the token stream produced by
//! [`tokenize`](crate::tokenizer::tokenize), with proper operator
//! precedence and a bound on nesting depth.

use crate::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::tokenizer::{tokenize, Token, TokenKind};
use gridcalc_core::{CellAddress, CellRange};

/// Default limit on nested parentheses, unary operators, exponents and calls
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Parse a formula string into an AST
///
/// The leading `=` is optional.
///
/// # Example
/// ```rust
/// use gridcalc_formula::parse_formula;
///
/// let ast = parse_formula("=1+2").unwrap();
/// let ast = parse_formula("=SUM(A1:A10)").unwrap();
/// let ast = parse_formula("=IF(A1>0,\"Yes\",\"No\")").unwrap();
/// assert!(parse_formula("=1+").is_err());
/// ```
pub fn parse_formula(formula: &str) -> FormulaResult<Expr> {
    Parser::new().parse(formula)
}

/// Reusable parser configuration
#[derive(Debug, Clone, Copy)]
pub struct Parser {
    max_depth: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Parser with [`DEFAULT_MAX_DEPTH`]
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Parser with a custom nesting limit
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Tokenize and parse `formula`
    pub fn parse(&self, formula: &str) -> FormulaResult<Expr> {
        let tokens = tokenize(formula)?;
        let mut parser = FormulaParser {
            tokens,
            pos: 0,
            depth: 0,
            max_depth: self.max_depth,
        };

        let expr = parser.parse_expression()?;

        // Make sure we consumed all input
        let token = parser.current_token();
        if token.kind != TokenKind::EndOfInput {
            return Err(FormulaError::syntax(token.position, "end of input"));
        }

        Ok(expr)
    }
}

struct FormulaParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl FormulaParser {
    // === Token helpers ===

    fn current_token(&self) -> &Token {
        // The stream always ends with EndOfInput and we never advance past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.current_token().kind
    }

    fn consume(&mut self) -> Token {
        let token = self.current_token().clone();
        if token.kind != TokenKind::EndOfInput {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> FormulaResult<Token> {
        if self.peek_kind() == kind {
            Ok(self.consume())
        } else {
            Err(FormulaError::syntax(
                self.current_token().position,
                kind.to_string(),
            ))
        }
    }

    fn current_operator(&self) -> Option<BinaryOperator> {
        let token = self.current_token();
        if token.kind == TokenKind::Operator {
            BinaryOperator::from_symbol(&token.text)
        } else {
            None
        }
    }

    fn enter(&mut self) -> FormulaResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(FormulaError::NestingTooDeep {
                position: self.current_token().position,
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> FormulaResult<T>) -> FormulaResult<T> {
        self.enter()?;
        let result = f(self);
        self.leave();
        result
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Comparison: =, <>, <, <=, >, >=
    // 2. Concatenation: &
    // 3. Addition/Subtraction: +, -
    // 4. Multiplication/Division: *, /
    // 5. Unary: -, +
    // 6. Exponentiation: ^ (right associative)
    // 7. Primary: literals, references, ranges, function calls, parentheses

    fn parse_expression(&mut self) -> FormulaResult<Expr> {
        self.parse_comparison()
    }

    fn parse_binary_level(
        &mut self,
        ops: &[BinaryOperator],
        next: fn(&mut Self) -> FormulaResult<Expr>,
    ) -> FormulaResult<Expr> {
        let mut left = next(self)?;

        while let Some(op) = self.current_operator().filter(|op| ops.contains(op)) {
            self.consume();
            let right = next(self)?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> FormulaResult<Expr> {
        self.parse_binary_level(
            &[
                BinaryOperator::Equal,
                BinaryOperator::NotEqual,
                BinaryOperator::LessThan,
                BinaryOperator::LessEqual,
                BinaryOperator::GreaterThan,
                BinaryOperator::GreaterEqual,
            ],
            Self::parse_concatenation,
        )
    }

    fn parse_concatenation(&mut self) -> FormulaResult<Expr> {
        self.parse_binary_level(&[BinaryOperator::Concat], Self::parse_additive)
    }

    fn parse_additive(&mut self) -> FormulaResult<Expr> {
        self.parse_binary_level(
            &[BinaryOperator::Add, BinaryOperator::Subtract],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<Expr> {
        self.parse_binary_level(
            &[BinaryOperator::Multiply, BinaryOperator::Divide],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        let op = match self.current_operator() {
            Some(BinaryOperator::Subtract) => UnaryOperator::Negate,
            Some(BinaryOperator::Add) => UnaryOperator::Plus,
            _ => return self.parse_exponent(),
        };

        self.consume();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_exponent(&mut self) -> FormulaResult<Expr> {
        let base = self.parse_range()?;

        if self.current_operator() == Some(BinaryOperator::Power) {
            self.consume();
            // Right associative; the exponent may carry its own sign
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(Expr::BinaryOp {
                op: BinaryOperator::Power,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }

        Ok(base)
    }

    fn parse_range(&mut self) -> FormulaResult<Expr> {
        let start = self.parse_primary()?;

        if self.peek_kind() != TokenKind::Colon {
            return Ok(start);
        }

        let colon = self.consume();
        let start = match start {
            Expr::CellRef(addr) => addr,
            _ => return Err(FormulaError::syntax(colon.position, "cell reference before ':'")),
        };

        let end = self.expect(TokenKind::CellRef)?;
        let end = CellAddress::parse(&end.text)?;

        Ok(Expr::RangeRef(CellRange::new(start, end)))
    }

    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        let token = self.current_token().clone();

        match token.kind {
            TokenKind::Number => {
                self.consume();
                // The tokenizer only emits finite, parseable numbers
                let n = token
                    .text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::syntax(token.position, "number"))?;
                Ok(Expr::Number(n))
            }

            TokenKind::String => {
                self.consume();
                Ok(Expr::Text(token.text))
            }

            TokenKind::Boolean => {
                self.consume();
                Ok(Expr::Boolean(token.text == "TRUE"))
            }

            TokenKind::CellRef => {
                self.consume();
                Ok(Expr::CellRef(CellAddress::parse(&token.text)?))
            }

            TokenKind::OpenParen => {
                self.consume();
                let expr = self.nested(Self::parse_expression)?;
                self.expect(TokenKind::CloseParen)?;
                Ok(expr)
            }

            TokenKind::FunctionName => {
                self.consume();
                self.nested(|p| p.parse_function_call(token.text.to_uppercase()))
            }

            _ => Err(FormulaError::syntax(token.position, "expression")),
        }
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<Expr> {
        self.expect(TokenKind::OpenParen)?;

        let mut args = Vec::new();

        if self.peek_kind() != TokenKind::CloseParen {
            args.push(self.parse_expression()?);

            while self.peek_kind() == TokenKind::Comma {
                self.consume();
                args.push(self.parse_expression()?);
            }
        }

        self.expect(TokenKind::CloseParen)?;

        Ok(Expr::FunctionCall { name, args })
    }
}
