//! Abstract Syntax Tree for formulas

use gridcalc_core::{CellAddress, CellRange};
use std::collections::BTreeSet;
use std::fmt;

/// Formula expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// String literal
    Text(String),
    /// Boolean literal
    Boolean(bool),
    /// Single cell reference
    CellRef(CellAddress),
    /// Range reference (A1:B10)
    RangeRef(CellRange),
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function call; the name is always upper-case
    FunctionCall { name: String, args: Vec<Expr> },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Concat,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl BinaryOperator {
    /// Operator text as written in a formula
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Power => "^",
            BinaryOperator::Concat => "&",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
        }
    }

    /// Parse operator text
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Subtract,
            "*" => BinaryOperator::Multiply,
            "/" => BinaryOperator::Divide,
            "^" => BinaryOperator::Power,
            "&" => BinaryOperator::Concat,
            "=" => BinaryOperator::Equal,
            "<>" => BinaryOperator::NotEqual,
            "<" => BinaryOperator::LessThan,
            "<=" => BinaryOperator::LessEqual,
            ">" => BinaryOperator::GreaterThan,
            ">=" => BinaryOperator::GreaterEqual,
            _ => return None,
        })
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => 1,
            BinaryOperator::Concat => 2,
            BinaryOperator::Add | BinaryOperator::Subtract => 3,
            BinaryOperator::Multiply | BinaryOperator::Divide => 4,
            BinaryOperator::Power => 6,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Negate,
    Plus,
}

impl UnaryOperator {
    /// Operator text as written in a formula
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::Plus => "+",
        }
    }
}

const UNARY_PRECEDENCE: u8 = 5;
const PRIMARY_PRECEDENCE: u8 = 7;

/// A cell or range a formula reads
///
/// Ranges are kept whole rather than expanded into their cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    Cell(CellAddress),
    Range(CellRange),
}

impl Reference {
    /// Check if the reference covers `addr`
    pub fn contains(&self, addr: &CellAddress) -> bool {
        match self {
            Reference::Cell(cell) => cell == addr,
            Reference::Range(range) => range.contains(addr),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Cell(addr) => write!(f, "{}", addr),
            Reference::Range(range) => write!(f, "{}", range),
        }
    }
}

impl Expr {
    /// Every cell and range the expression reads, deduplicated and sorted
    ///
    /// # Example
    /// ```rust
    /// use gridcalc_formula::{parse_formula, Reference};
    /// use gridcalc_core::{CellAddress, CellRange};
    ///
    /// let ast = parse_formula("=A1+SUM(B1:B3)+A1").unwrap();
    /// let refs: Vec<_> = ast.references().into_iter().collect();
    /// assert_eq!(refs, vec![
    ///     Reference::Cell(CellAddress::new(0, 0)),
    ///     Reference::Range(CellRange::parse("B1:B3").unwrap()),
    /// ]);
    /// ```
    pub fn references(&self) -> BTreeSet<Reference> {
        let mut refs = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::CellRef(addr) => {
                    refs.insert(Reference::Cell(*addr));
                }
                Expr::RangeRef(range) => {
                    refs.insert(Reference::Range(*range));
                }
                Expr::UnaryOp { operand, .. } => stack.push(operand),
                Expr::BinaryOp { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
                Expr::FunctionCall { args, .. } => stack.extend(args.iter()),
                Expr::Number(_) | Expr::Text(_) | Expr::Boolean(_) => {}
            }
        }
        refs
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::UnaryOp { .. } => UNARY_PRECEDENCE,
            Expr::BinaryOp { op, .. } => op.precedence(),
            _ => PRIMARY_PRECEDENCE,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, parenthesize: bool) -> fmt::Result {
        if parenthesize {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

/// Prints normalized formula text without the leading `=`, adding
/// parentheses only where precedence requires them.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Text(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Expr::Boolean(true) => f.write_str("TRUE"),
            Expr::Boolean(false) => f.write_str("FALSE"),
            Expr::CellRef(addr) => write!(f, "{}", addr),
            Expr::RangeRef(range) => write!(f, "{}", range),
            Expr::UnaryOp { op, operand } => {
                f.write_str(op.symbol())?;
                operand.fmt_child(f, operand.precedence() < UNARY_PRECEDENCE)
            }
            Expr::BinaryOp { op, left, right } => {
                let prec = op.precedence();
                if *op == BinaryOperator::Power {
                    left.fmt_child(f, left.precedence() <= prec)?;
                    f.write_str(op.symbol())?;
                    right.fmt_child(f, right.precedence() < UNARY_PRECEDENCE)
                } else {
                    left.fmt_child(f, left.precedence() < prec)?;
                    f.write_str(op.symbol())?;
                    right.fmt_child(f, right.precedence() <= prec)
                }
            }
            Expr::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}
