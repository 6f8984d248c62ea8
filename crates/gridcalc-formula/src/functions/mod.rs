//! Built-in spreadsheet functions and the function registry

pub mod date;
pub mod info;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod text;

use crate::ast::Expr;
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::Evaluator;
use ahash::AHashMap;
use gridcalc_core::{ErrorKind, Value};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A rectangular block of values read from a range, stored row-major
#[derive(Debug, Clone, PartialEq)]
pub struct RangeValues {
    rows: usize,
    cols: usize,
    values: Vec<Value>,
}

impl RangeValues {
    /// Build from row-major values; `values.len()` must equal `rows * cols`
    pub fn new(rows: usize, cols: usize, values: Vec<Value>) -> Self {
        debug_assert_eq!(rows * cols, values.len());
        Self { rows, cols, values }
    }

    /// A 1x1 block
    pub fn single(value: Value) -> Self {
        Self {
            rows: 1,
            cols: 1,
            values: vec![value],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Value at a zero-based position
    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        if row < self.rows && col < self.cols {
            self.values.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// All values in row-major order
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// An evaluated function argument
///
/// Range references stay ranges so that lookups can see their shape;
/// single-cell references arrive as 1x1 ranges.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Scalar(Value),
    Range(RangeValues),
}

impl ArgValue {
    /// The argument as a single value
    ///
    /// A 1x1 range yields its only cell; larger ranges are `#VALUE!`.
    pub fn scalar(&self) -> Value {
        match self {
            ArgValue::Scalar(v) => v.clone(),
            ArgValue::Range(r) if r.values.len() == 1 => r.values[0].clone(),
            ArgValue::Range(_) => Value::Error(ErrorKind::ValueError),
        }
    }

    /// The argument as a block, wrapping scalars in a 1x1 range
    pub fn to_range(&self) -> RangeValues {
        match self {
            ArgValue::Scalar(v) => RangeValues::single(v.clone()),
            ArgValue::Range(r) => r.clone(),
        }
    }

    /// Check if the argument came from a reference rather than a literal
    pub fn is_range(&self) -> bool {
        matches!(self, ArgValue::Range(_))
    }
}

/// Eager implementation: receives evaluated arguments
pub type EagerFn = fn(&[ArgValue]) -> Value;

/// Lazy implementation: receives unevaluated arguments and the evaluator
pub type LazyFn = fn(&[Expr], &mut Evaluator<'_>) -> Value;

/// User-supplied eager implementation
pub type CustomFn = Arc<dyn Fn(&[ArgValue]) -> Value + Send + Sync>;

/// How a function is invoked
#[derive(Clone)]
pub enum FunctionImpl {
    Eager(EagerFn),
    Lazy(LazyFn),
    Custom(CustomFn),
}

impl fmt::Debug for FunctionImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionImpl::Eager(_) => f.write_str("Eager"),
            FunctionImpl::Lazy(_) => f.write_str("Lazy"),
            FunctionImpl::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Function definition
#[derive(Debug, Clone)]
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: String,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
    /// Shipped with the engine rather than registered by a caller
    pub builtin: bool,
}

impl FunctionDef {
    fn builtin(
        name: &str,
        min_args: usize,
        max_args: Option<usize>,
        implementation: FunctionImpl,
    ) -> Self {
        Self {
            name: name.to_string(),
            min_args,
            max_args,
            implementation,
            builtin: true,
        }
    }

    /// Check an argument count against the declared bounds
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }
}

/// Built-in registry, created on first use
static BUILTIN_REGISTRY: OnceLock<Arc<FunctionRegistry>> = OnceLock::new();

/// Function registry
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in function
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_text_functions();
        registry.register_lookup_functions();
        registry.register_info_functions();
        registry.register_date_functions();

        registry
    }

    /// The shared built-in registry
    pub fn builtin() -> &'static FunctionRegistry {
        Self::shared_builtin()
    }

    /// The shared built-in registry, as a handle that can be stored
    pub fn shared() -> Arc<FunctionRegistry> {
        Arc::clone(Self::shared_builtin())
    }

    fn shared_builtin() -> &'static Arc<FunctionRegistry> {
        BUILTIN_REGISTRY.get_or_init(|| Arc::new(Self::with_builtins()))
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_uppercase())
    }

    /// Check if a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Register a caller-defined eager function
    ///
    /// Built-in names cannot be replaced; registering a custom name again
    /// replaces the earlier definition.
    ///
    /// # Example
    /// ```rust
    /// use gridcalc_formula::functions::FunctionRegistry;
    /// use gridcalc_formula::{evaluate_with, parse_formula};
    /// use gridcalc_core::{CellAddress, Value};
    ///
    /// let mut registry = FunctionRegistry::with_builtins();
    /// registry
    ///     .register_custom("DOUBLE", 1, Some(1), |args| match args[0].scalar() {
    ///         Value::Number(n) => Value::Number(n * 2.0),
    ///         other => other,
    ///     })
    ///     .unwrap();
    ///
    /// let ast = parse_formula("=DOUBLE(21)").unwrap();
    /// let empty = |_: CellAddress| Value::Empty;
    /// assert_eq!(evaluate_with(&ast, &empty, &registry), Value::Number(42.0));
    /// assert!(registry.register_custom("SUM", 0, None, |_| Value::Empty).is_err());
    /// ```
    pub fn register_custom<F>(
        &mut self,
        name: &str,
        min_args: usize,
        max_args: Option<usize>,
        implementation: F,
    ) -> FormulaResult<()>
    where
        F: Fn(&[ArgValue]) -> Value + Send + Sync + 'static,
    {
        let key = name.to_uppercase();
        if !lazy_regex::regex_is_match!(r"^[A-Z_][A-Z0-9_.]*$", &key) {
            return Err(FormulaError::InvalidFunctionName(name.to_string()));
        }
        if self.functions.get(&key).map_or(false, |def| def.builtin) {
            return Err(FormulaError::BuiltinConflict(key));
        }

        self.functions.insert(
            key.clone(),
            FunctionDef {
                name: key,
                min_args,
                max_args,
                implementation: FunctionImpl::Custom(Arc::new(implementation)),
                builtin: false,
            },
        );
        Ok(())
    }

    fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    fn eager(&mut self, name: &str, min_args: usize, max_args: Option<usize>, f: EagerFn) {
        self.register(FunctionDef::builtin(
            name,
            min_args,
            max_args,
            FunctionImpl::Eager(f),
        ));
    }

    fn lazy(&mut self, name: &str, min_args: usize, max_args: Option<usize>, f: LazyFn) {
        self.register(FunctionDef::builtin(
            name,
            min_args,
            max_args,
            FunctionImpl::Lazy(f),
        ));
    }

    fn register_math_functions(&mut self) {
        self.eager("SUM", 1, None, math::fn_sum);
        self.eager("AVERAGE", 1, None, math::fn_average);
        self.eager("COUNT", 1, None, math::fn_count);
        self.eager("COUNTA", 1, None, math::fn_counta);
        self.eager("MIN", 1, None, math::fn_min);
        self.eager("MAX", 1, None, math::fn_max);
        self.eager("ABS", 1, Some(1), math::fn_abs);
        self.eager("ROUND", 1, Some(2), math::fn_round);
    }

    fn register_logical_functions(&mut self) {
        self.lazy("IF", 2, Some(3), logical::fn_if);
        self.lazy("IFERROR", 2, Some(2), logical::fn_iferror);
        self.eager("AND", 1, None, logical::fn_and);
        self.eager("OR", 1, None, logical::fn_or);
        self.eager("NOT", 1, Some(1), logical::fn_not);
    }

    fn register_text_functions(&mut self) {
        self.eager("CONCATENATE", 1, None, text::fn_concatenate);
        self.eager("LEFT", 1, Some(2), text::fn_left);
        self.eager("RIGHT", 1, Some(2), text::fn_right);
        self.eager("MID", 3, Some(3), text::fn_mid);
        self.eager("LEN", 1, Some(1), text::fn_len);
        self.eager("LOWER", 1, Some(1), text::fn_lower);
        self.eager("UPPER", 1, Some(1), text::fn_upper);
        self.eager("TRIM", 1, Some(1), text::fn_trim);
    }

    fn register_lookup_functions(&mut self) {
        self.eager("VLOOKUP", 3, Some(4), lookup::fn_vlookup);
        self.eager("HLOOKUP", 3, Some(4), lookup::fn_hlookup);
        self.eager("INDEX", 2, Some(3), lookup::fn_index);
        self.eager("MATCH", 2, Some(3), lookup::fn_match);
    }

    fn register_date_functions(&mut self) {
        self.eager("TODAY", 0, Some(0), date::fn_today);
        self.eager("NOW", 0, Some(0), date::fn_now);
        self.eager("DATE", 3, Some(3), date::fn_date);
        self.eager("YEAR", 1, Some(1), date::fn_year);
        self.eager("MONTH", 1, Some(1), date::fn_month);
        self.eager("DAY", 1, Some(1), date::fn_day);
        self.eager("DATEVALUE", 1, Some(1), date::fn_datevalue);
    }

    fn register_info_functions(&mut self) {
        self.eager("NA", 0, Some(0), info::fn_na);
        self.eager("ISERROR", 1, Some(1), info::fn_iserror);
        self.eager("ISNA", 1, Some(1), info::fn_isna);
        self.eager("ISBLANK", 1, Some(1), info::fn_isblank);
        self.eager("ISNUMBER", 1, Some(1), info::fn_isnumber);
        self.eager("ISTEXT", 1, Some(1), info::fn_istext);
    }
}

// === Argument helpers shared by the function modules ===

/// Integer argument, truncated toward zero
pub(crate) fn int_arg(arg: &ArgValue) -> Result<i64, ErrorKind> {
    let n = crate::operators::to_number(&arg.scalar())?;
    Ok(n.trunc() as i64)
}

/// Optional integer argument with a default
pub(crate) fn opt_int_arg(args: &[ArgValue], index: usize, default: i64) -> Result<i64, ErrorKind> {
    match args.get(index) {
        Some(arg) => int_arg(arg),
        None => Ok(default),
    }
}

/// Turn a `Result` from argument coercion into a value
pub(crate) fn or_error(result: Result<Value, ErrorKind>) -> Value {
    result.unwrap_or_else(Value::Error)
}
