//! Formula evaluator
//!
//! Evaluates formula ASTs against a [`ValueProvider`]. Evaluation never
//! fails: every problem becomes a [`Value::Error`]. Referenced cells are
//! read as values and their formulas are never evaluated from here.

use crate::ast::Expr;
use crate::functions::{ArgValue, FunctionImpl, FunctionRegistry, RangeValues};
use crate::operators::{apply_binary, apply_unary};
use gridcalc_core::{CellRange, ErrorKind, Value, ValueProvider, MAX_RANGE_CELLS};

/// Recursion limit for ASTs built by hand rather than by the parser
pub const MAX_EVAL_DEPTH: usize = 256;

/// Evaluate an expression with the built-in function registry
///
/// # Example
/// ```rust
/// use gridcalc_formula::{evaluate, parse_formula};
/// use gridcalc_core::{CellAddress, Value};
///
/// let ast = parse_formula("=A1*2").unwrap();
/// let cells = |addr: CellAddress| {
///     if addr == CellAddress::new(0, 0) { Value::Number(21.0) } else { Value::Empty }
/// };
/// assert_eq!(evaluate(&ast, &cells), Value::Number(42.0));
/// ```
pub fn evaluate(expr: &Expr, provider: &dyn ValueProvider) -> Value {
    evaluate_with(expr, provider, FunctionRegistry::builtin())
}

/// Evaluate an expression with a specific function registry
pub fn evaluate_with(
    expr: &Expr,
    provider: &dyn ValueProvider,
    registry: &FunctionRegistry,
) -> Value {
    Evaluator::new(provider, registry).evaluate(expr)
}

/// Tree-walking evaluator
///
/// Lazy functions receive `&mut Evaluator` so they can evaluate just the
/// arguments they need.
pub struct Evaluator<'a> {
    provider: &'a dyn ValueProvider,
    registry: &'a FunctionRegistry,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(provider: &'a dyn ValueProvider, registry: &'a FunctionRegistry) -> Self {
        Self {
            provider,
            registry,
            depth: 0,
        }
    }

    /// Evaluate an expression in scalar position
    pub fn evaluate(&mut self, expr: &Expr) -> Value {
        if self.depth >= MAX_EVAL_DEPTH {
            return Value::Error(ErrorKind::ValueError);
        }

        self.depth += 1;
        let value = self.evaluate_node(expr);
        self.depth -= 1;
        value
    }

    /// Evaluate an expression in function-argument position
    ///
    /// References stay references here: ranges become [`ArgValue::Range`]
    /// and single cells 1x1 ranges. A range over [`MAX_RANGE_CELLS`] is
    /// `#REF!`.
    pub fn evaluate_arg(&mut self, expr: &Expr) -> ArgValue {
        match expr {
            Expr::RangeRef(range) if range.cell_count() > MAX_RANGE_CELLS => {
                ArgValue::Scalar(Value::Error(ErrorKind::RefError))
            }
            Expr::RangeRef(range) => ArgValue::Range(self.read_range(*range)),
            Expr::CellRef(addr) => {
                ArgValue::Range(RangeValues::single(self.provider.get_value(*addr)))
            }
            other => ArgValue::Scalar(self.evaluate(other)),
        }
    }

    fn evaluate_node(&mut self, expr: &Expr) -> Value {
        match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Text(s) => Value::Text(s.clone()),
            Expr::Boolean(b) => Value::Boolean(*b),
            Expr::CellRef(addr) => self.provider.get_value(*addr),
            // Ranges are only values as function arguments
            Expr::RangeRef(_) => Value::Error(ErrorKind::ValueError),
            Expr::UnaryOp { op, operand } => {
                let value = self.evaluate(operand);
                apply_unary(*op, &value)
            }
            Expr::BinaryOp { op, left, right } => {
                let left = self.evaluate(left);
                if left.is_error() {
                    return left;
                }
                let right = self.evaluate(right);
                apply_binary(*op, &left, &right)
            }
            Expr::FunctionCall { name, args } => self.call_function(name, args),
        }
    }

    fn call_function(&mut self, name: &str, args: &[Expr]) -> Value {
        let registry = self.registry;
        let def = match registry.get(name) {
            Some(def) => def,
            None => return Value::Error(ErrorKind::NameError),
        };

        if !def.accepts(args.len()) {
            return Value::Error(ErrorKind::ValueError);
        }

        match &def.implementation {
            FunctionImpl::Lazy(f) => f(args, self),
            FunctionImpl::Eager(f) => {
                let values = self.evaluate_args(args);
                f(&values)
            }
            FunctionImpl::Custom(f) => {
                let values = self.evaluate_args(args);
                f(&values)
            }
        }
    }

    fn evaluate_args(&mut self, args: &[Expr]) -> Vec<ArgValue> {
        args.iter().map(|arg| self.evaluate_arg(arg)).collect()
    }

    fn read_range(&self, range: CellRange) -> RangeValues {
        let values: Vec<Value> = self
            .provider
            .list_range_addresses(range)
            .into_iter()
            .map(|addr| self.provider.get_value(addr))
            .collect();

        let (rows, cols) = (range.height() as usize, range.width() as usize);
        if values.len() == rows * cols {
            RangeValues::new(rows, cols, values)
        } else {
            // Provider listed a different shape; keep the values as one row
            let len = values.len();
            RangeValues::new(1, len, values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::UnaryOperator;
    use crate::parser::parse_formula;
    use gridcalc_core::{CellAddress, CellStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn addr(s: &str) -> CellAddress {
        CellAddress::parse(s).unwrap()
    }

    fn eval(formula: &str) -> Value {
        let store = MemoryStore::new();
        evaluate(&parse_formula(formula).unwrap(), &store)
    }

    fn eval_in(store: &MemoryStore, formula: &str) -> Value {
        evaluate(&parse_formula(formula).unwrap(), store)
    }

    fn store_with(cells: &[(&str, Value)]) -> MemoryStore {
        let mut store = MemoryStore::new();
        for (a, v) in cells {
            store.set_value(addr(a), v.clone());
        }
        store
    }

    #[test]
    fn test_evaluate_literals() {
        assert_eq!(eval("=42"), Value::Number(42.0));
        assert_eq!(eval("=\"Hello\""), Value::text("Hello"));
        assert_eq!(eval("=TRUE"), Value::Boolean(true));
    }

    #[test]
    fn test_evaluate_precedence() {
        assert_eq!(eval("=1+2*3"), Value::Number(7.0));
        assert_eq!(eval("=(1+2)*3"), Value::Number(9.0));
        assert_eq!(eval("=2^3^2"), Value::Number(512.0));
        assert_eq!(eval("=-2^2"), Value::Number(-4.0));
        assert_eq!(eval("=2^-1"), Value::Number(0.5));
        assert_eq!(eval("=10-4-3"), Value::Number(3.0));
        assert_eq!(eval("=1+2&3"), Value::text("33"));
    }

    #[test]
    fn test_evaluate_comparison() {
        assert_eq!(eval("=1<2"), Value::Boolean(true));
        assert_eq!(eval("=\"a\"=\"A\""), Value::Boolean(true));
        assert_eq!(eval("=\"b\">\"A\""), Value::Boolean(true));
        assert_eq!(eval("=1<\"a\""), Value::Boolean(true));
        assert_eq!(eval("=\"z\"<TRUE"), Value::Boolean(true));
        assert_eq!(eval("=2<>2"), Value::Boolean(false));
        assert_eq!(eval("=A1=0"), Value::Boolean(true));
        assert_eq!(eval("=A1=\"\""), Value::Boolean(true));
    }

    #[test]
    fn test_evaluate_errors() {
        assert_eq!(eval("=1/0"), Value::Error(ErrorKind::DivByZero));
        assert_eq!(eval("=1+\"x\""), Value::Error(ErrorKind::ValueError));
        assert_eq!(eval("=NA()+1/0"), Value::Error(ErrorKind::NotAvailable));
        assert_eq!(eval("=NOSUCHFN(1)"), Value::Error(ErrorKind::NameError));
        assert_eq!(eval("=NOSUCHFN(1/0)"), Value::Error(ErrorKind::NameError));
        assert_eq!(eval("=ABS(1,2)"), Value::Error(ErrorKind::ValueError));
        assert_eq!(eval("=SUM()"), Value::Error(ErrorKind::ValueError));
    }

    #[test]
    fn test_evaluate_cell_refs() {
        let store = store_with(&[("A1", Value::Number(2.0)), ("A2", Value::Number(3.0))]);
        assert_eq!(eval_in(&store, "=A1+A2"), Value::Number(5.0));
        assert_eq!(eval_in(&store, "=B7"), Value::Empty);
        assert_eq!(eval_in(&store, "=B7+1"), Value::Number(1.0));
    }

    #[test]
    fn test_range_outside_function_is_value_error() {
        let store = store_with(&[("A1", Value::Number(2.0))]);
        assert_eq!(eval_in(&store, "=A1:A2"), Value::Error(ErrorKind::ValueError));
        assert_eq!(eval_in(&store, "=A1:A2+1"), Value::Error(ErrorKind::ValueError));
    }

    #[test]
    fn test_oversized_range_is_ref_error() {
        let store = store_with(&[("A1", Value::Number(2.0))]);
        assert_eq!(
            eval_in(&store, "=SUM(A1:XFD1048576)"),
            Value::Error(ErrorKind::RefError)
        );
        assert_eq!(
            eval_in(&store, "=COUNTA(A1:B1048576)"),
            Value::Error(ErrorKind::RefError)
        );
        assert_eq!(eval_in(&store, "=SUM(A1:A100)"), Value::Number(2.0));
    }

    #[test]
    fn test_evaluate_sum_skips_text() {
        let store = store_with(&[
            ("A1", Value::Number(1.0)),
            ("A2", Value::text("x")),
            ("A3", Value::Number(2.0)),
        ]);
        assert_eq!(eval_in(&store, "=SUM(A1:A3)"), Value::Number(3.0));
        assert_eq!(eval_in(&store, "=SUM(A2)"), Value::Number(0.0));
        assert_eq!(eval_in(&store, "=COUNT(A1:A3)"), Value::Number(2.0));
        assert_eq!(eval_in(&store, "=AVERAGE(A1:A3)"), Value::Number(1.5));
    }

    #[test]
    fn test_evaluate_vlookup() {
        let store = store_with(&[
            ("A1", Value::Number(1.0)),
            ("A2", Value::Number(2.0)),
            ("A3", Value::Number(3.0)),
            ("B1", Value::text("x")),
            ("B2", Value::text("y")),
            ("B3", Value::text("z")),
        ]);
        assert_eq!(
            eval_in(&store, "=VLOOKUP(2, A1:B3, 2, FALSE)"),
            Value::text("y")
        );
        assert_eq!(
            eval_in(&store, "=VLOOKUP(9, A1:B3, 3, FALSE)"),
            Value::Error(ErrorKind::RefError)
        );
        assert_eq!(
            eval_in(&store, "=INDEX(A1:B3, MATCH(3, A1:A3, 0), 2)"),
            Value::text("z")
        );
        assert_eq!(eval_in(&store, "=HLOOKUP(\"x\", B1:B3, 2, FALSE)"), Value::text("y"));
    }

    #[test]
    fn test_if_evaluates_only_selected_branch() {
        assert_eq!(eval("=IF(1=1, 5, 1/0)"), Value::Number(5.0));
        assert_eq!(eval("=IF(FALSE, 1/0, \"no\")"), Value::text("no"));
        assert_eq!(eval("=IF(0, 1)"), Value::Boolean(false));
        assert_eq!(eval("=IF(\"x\", 1, 2)"), Value::Error(ErrorKind::ValueError));
        assert_eq!(eval("=IF(1/0, 1, 2)"), Value::Error(ErrorKind::DivByZero));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = FunctionRegistry::with_builtins();
        registry
            .register_custom("TICK", 0, Some(0), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Value::Number(1.0)
            })
            .unwrap();

        let ast = parse_formula("=IF(TRUE, 1, TICK())").unwrap();
        let store = MemoryStore::new();
        assert_eq!(evaluate_with(&ast, &store, &registry), Value::Number(1.0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let ast = parse_formula("=IF(FALSE, 1, TICK())").unwrap();
        assert_eq!(evaluate_with(&ast, &store, &registry), Value::Number(1.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_iferror() {
        assert_eq!(eval("=IFERROR(1/0, \"oops\")"), Value::text("oops"));
        assert_eq!(eval("=IFERROR(7, 1/0)"), Value::Number(7.0));
    }

    #[test]
    fn test_text_functions() {
        assert_eq!(eval("=CONCATENATE(\"a\", 1, TRUE)"), Value::text("a1TRUE"));
        assert_eq!(eval("=LEFT(\"Hello\", 2)&RIGHT(\"World\", 3)"), Value::text("Herld"));
        assert_eq!(eval("=MID(\"abcdef\", 3, 2)"), Value::text("cd"));
        assert_eq!(eval("=LEN(UPPER(\"abc\"))"), Value::Number(3.0));
        assert_eq!(eval("=LOWER(\"ABC\")"), Value::text("abc"));
    }

    #[test]
    fn test_info_functions() {
        let store = store_with(&[("A1", Value::Number(1.0))]);
        assert_eq!(eval_in(&store, "=ISBLANK(A2)"), Value::Boolean(true));
        assert_eq!(eval_in(&store, "=ISNUMBER(A1)"), Value::Boolean(true));
        assert_eq!(eval_in(&store, "=ISTEXT(A1)"), Value::Boolean(false));
        assert_eq!(eval_in(&store, "=ISERROR(1/0)"), Value::Boolean(true));
        assert_eq!(eval_in(&store, "=ISNA(NA())"), Value::Boolean(true));
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let store = store_with(&[("A1", Value::Number(0.1)), ("A2", Value::Number(0.2))]);
        let ast = parse_formula("=A1+A2*3/7-ROUND(A1, 1)").unwrap();
        let first = evaluate(&ast, &store);
        let second = evaluate(&ast, &store);
        assert!(first.is_identical(&second));
    }

    #[test]
    fn test_hand_built_deep_ast_is_bounded() {
        let mut expr = Expr::Number(1.0);
        for _ in 0..(MAX_EVAL_DEPTH + 10) {
            expr = Expr::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(expr),
            };
        }
        let store = MemoryStore::new();
        assert_eq!(evaluate(&expr, &store), Value::Error(ErrorKind::ValueError));
    }

    #[test]
    fn test_closure_provider() {
        let ast = parse_formula("=SUM(A1:B2)").unwrap();
        let provider = |a: CellAddress| Value::Number((a.row + a.col as u32 + 1) as f64);
        // 1 + 2 + 2 + 3
        assert_eq!(evaluate(&ast, &provider), Value::Number(8.0));
    }
}
