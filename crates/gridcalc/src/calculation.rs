//! Sheet calculation engine
//!
//! A [`Sheet`] owns the dependency graph and the parsed formulas for one
//! grid of cells, and keeps the cached values in its [`CellStore`] up to
//! date as cells are edited.
//!
//! Every edit runs one recalculation pass over the edited cell and its
//! transitive dependents:
//!
//! 1. cells that form a cycle get `#CIRCULAR!` and are not evaluated
//! 2. the remaining formula cells are evaluated in dependency order
//! 3. a cell whose precedents kept their values is skipped
//! 4. results are staged and only written back if no newer generation was
//!    announced while the pass ran
//!
//! # Example
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! let mut sheet = Sheet::new();
//! sheet.set("A1", "2").unwrap();
//! sheet.set("A2", "3").unwrap();
//! sheet.set("A3", "=A1+A2").unwrap();
//!
//! let a3 = CellAddress::parse("A3").unwrap();
//! assert_eq!(sheet.value(a3), Value::Number(5.0));
//!
//! let report = sheet.set("A1", "10").unwrap();
//! assert_eq!(sheet.value(a3), Value::Number(13.0));
//! assert!(report.affected_cells.contains(&a3));
//! ```

use crate::{
    evaluate_with, CellAddress, CellRange, CellStore, ChangeSink, DependencyGraph, Error,
    ErrorKind, Expr, FormulaResult, FunctionRegistry, MemoryStore, Parser, Reference, Result,
    Value, ValueProvider, MAX_RANGE_CELLS,
};
use ahash::AHashSet;
use gridcalc_formula::operators::parse_numeric_text;
use gridcalc_formula::DEFAULT_MAX_DEPTH;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Options for sheet calculation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationOptions {
    /// Skip cells whose precedents kept their values (default: true)
    pub short_circuit: bool,
    /// Maximum nesting depth accepted by the parser (default: 64)
    pub max_nesting_depth: usize,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            short_circuit: true,
            max_nesting_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Shared generation counter
///
/// Every edit takes the next generation. A clone held by another thread can
/// call [`supersede`](Self::supersede) to announce that a newer edit is on
/// its way; a pass in flight then stops and discards its staged results.
#[derive(Debug, Clone, Default)]
pub struct GenerationHandle {
    counter: Arc<AtomicU64>,
}

impl GenerationHandle {
    /// Create a counter starting at generation 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest generation
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Announce a newer generation, returning it
    pub fn supersede(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Outcome of one recalculation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcReport {
    /// Generation the pass ran under
    pub generation: u64,
    /// Cells whose value changed, row-major (empty if superseded)
    pub affected_cells: Vec<CellAddress>,
    /// Number of formula evaluations performed
    pub evaluated: usize,
    /// Cells found in a cycle during the pass, row-major
    pub circular: Vec<CellAddress>,
    /// Whether a newer generation cut the pass short
    pub superseded: bool,
}

/// Parsed cell input
enum Input {
    Formula { text: String, ast: Expr },
    Literal { text: Option<String>, value: Value },
}

/// What a single pass recalculates
struct PassPlan {
    generation: u64,
    /// Cells evaluated regardless of their precedents
    forced: AHashSet<CellAddress>,
    /// Closure of the pass
    nodes: BTreeSet<CellAddress>,
    /// Cells already changed before any evaluation
    changed: AHashSet<CellAddress>,
    /// Values decided before any evaluation
    staged: BTreeMap<CellAddress, Value>,
}

/// Store reads with the pass's staged values layered on top
struct StagedView<'a, S> {
    store: &'a S,
    staged: &'a BTreeMap<CellAddress, Value>,
}

impl<S: ValueProvider> ValueProvider for StagedView<'_, S> {
    fn get_value(&self, addr: CellAddress) -> Value {
        match self.staged.get(&addr) {
            Some(value) => value.clone(),
            None => self.store.get_value(addr),
        }
    }

    fn list_range_addresses(&self, range: CellRange) -> Vec<CellAddress> {
        self.store.list_range_addresses(range)
    }
}

/// A grid of cells with incremental recalculation
///
/// The sheet is the single writer of its graph and store: every mutation
/// goes through [`set_formula`](Self::set_formula) or one of its typed
/// conveniences. `Sheet` is `Send`, so a worker thread may own it.
pub struct Sheet<S: CellStore = MemoryStore> {
    store: S,
    graph: DependencyGraph,
    formulas: BTreeMap<CellAddress, Expr>,
    circular: AHashSet<CellAddress>,
    /// Closure of a superseded pass, folded into the next one
    pending: BTreeSet<CellAddress>,
    registry: Arc<FunctionRegistry>,
    options: CalculationOptions,
    generation: GenerationHandle,
    sink: Option<Box<dyn ChangeSink + Send>>,
}

impl Default for Sheet<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl Sheet<MemoryStore> {
    /// Create an empty sheet backed by a [`MemoryStore`]
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl<S: CellStore> fmt::Debug for Sheet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sheet")
            .field("formulas", &self.formulas.len())
            .field("circular", &self.circular.len())
            .field("pending", &self.pending.len())
            .field("generation", &self.generation.current())
            .field("options", &self.options)
            .finish()
    }
}

impl<S: CellStore> Sheet<S> {
    /// Wrap an existing store
    ///
    /// Formulas already held by the store are not evaluated until
    /// [`recalculate_all`](Self::recalculate_all) is called.
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            graph: DependencyGraph::new(),
            formulas: BTreeMap::new(),
            circular: AHashSet::new(),
            pending: BTreeSet::new(),
            registry: FunctionRegistry::shared(),
            options: CalculationOptions::default(),
            generation: GenerationHandle::new(),
            sink: None,
        }
    }

    /// Use a custom function registry
    pub fn with_registry(mut self, registry: Arc<FunctionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use custom calculation options
    pub fn with_options(mut self, options: CalculationOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a generation counter with other threads
    pub fn with_generation_handle(mut self, generation: GenerationHandle) -> Self {
        self.generation = generation;
        self
    }

    /// Report changed cells to `sink` after every committed pass
    pub fn with_change_sink(mut self, sink: impl ChangeSink + Send + 'static) -> Self {
        self.set_change_sink(sink);
        self
    }

    /// Replace the change sink
    pub fn set_change_sink(&mut self, sink: impl ChangeSink + Send + 'static) {
        self.sink = Some(Box::new(sink));
    }

    /// Remove and return the change sink
    pub fn take_change_sink(&mut self) -> Option<Box<dyn ChangeSink + Send>> {
        self.sink.take()
    }

    pub fn options(&self) -> &CalculationOptions {
        &self.options
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// A clone of the generation counter
    pub fn generation_handle(&self) -> GenerationHandle {
        self.generation.clone()
    }

    /// Latest generation
    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    // === Edits ===

    /// Set a cell's input and recalculate its dependents
    ///
    /// Text starting with `=` is a formula. Anything else is a literal:
    /// empty text clears the cell, `TRUE`/`FALSE` are booleans, numeric
    /// text is a number and everything else is text. A leading `'` forces
    /// text, so `'=A1` is the three characters `=A1`.
    ///
    /// A formula that fails to parse is returned as an error and leaves the
    /// cell, its edges and every cached value untouched.
    pub fn set_formula(&mut self, addr: CellAddress, text: &str) -> FormulaResult<RecalcReport> {
        let input = self.parse_input(text)?;
        Ok(self.apply(addr, input))
    }

    /// [`set_formula`](Self::set_formula) with an A1-style address
    pub fn set(&mut self, addr: &str, text: &str) -> FormulaResult<RecalcReport> {
        let addr = CellAddress::parse(addr)?;
        self.set_formula(addr, text)
    }

    /// Store a literal value and recalculate its dependents
    ///
    /// Text that would read back as something else, such as `=1+1` or
    /// `42`, is stored behind a leading `'`, so the cell never turns into a
    /// formula or a number when its input is parsed again.
    pub fn set_value(&mut self, addr: CellAddress, value: impl Into<Value>) -> RecalcReport {
        let value = value.into();
        let text = literal_input(&value);
        self.apply(addr, Input::Literal { text, value })
    }

    /// Empty a cell and recalculate its dependents
    pub fn clear(&mut self, addr: CellAddress) -> RecalcReport {
        self.apply(
            addr,
            Input::Literal {
                text: None,
                value: Value::Empty,
            },
        )
    }

    fn parse_input(&self, text: &str) -> FormulaResult<Input> {
        let trimmed = text.trim();

        if trimmed.starts_with('=') {
            let ast = Parser::with_max_depth(self.options.max_nesting_depth).parse(trimmed)?;
            return Ok(Input::Formula {
                text: trimmed.to_string(),
                ast,
            });
        }

        let value = parse_literal(text);
        let text = if value.is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        Ok(Input::Literal { text, value })
    }

    fn apply(&mut self, addr: CellAddress, input: Input) -> RecalcReport {
        let generation = self.generation.supersede();
        let mut plan = PassPlan {
            generation,
            forced: AHashSet::new(),
            nodes: BTreeSet::new(),
            changed: AHashSet::new(),
            staged: BTreeMap::new(),
        };

        match input {
            Input::Formula { text, ast } => {
                let diff = self.graph.set_references(addr, ast.references());
                trace!(
                    cell = %addr,
                    added = diff.added.len(),
                    removed = diff.removed.len(),
                    "formula edges updated"
                );
                self.formulas.insert(addr, ast);
                self.store.set_input(addr, Some(text));
            }
            Input::Literal { text, value } => {
                self.graph.clear_references(addr);
                self.formulas.remove(&addr);

                if !self.store.get_value(addr).is_identical(&value) {
                    plan.changed.insert(addr);
                }
                match text {
                    Some(text) => {
                        self.store.set_input(addr, Some(text));
                        self.store.set_value(addr, value);
                    }
                    None => self.store.remove(addr),
                }
            }
        }

        let mut seeds: Vec<CellAddress> = std::mem::take(&mut self.pending).into_iter().collect();
        seeds.push(addr);

        plan.nodes = self.graph.transitive_dependents(&seeds);
        plan.nodes.extend(seeds.iter().copied());
        plan.forced.extend(seeds);

        self.run_pass(plan)
    }

    /// Rebuild the graph from the store and evaluate every formula
    ///
    /// Intended for initial loads: no short-circuit, every formula cell is
    /// evaluated once in dependency order. Formula text that no longer
    /// parses yields `#VALUE!`.
    pub fn recalculate_all(&mut self) -> RecalcReport {
        let generation = self.generation.supersede();

        self.graph.clear();
        self.formulas.clear();
        self.circular.clear();
        self.pending.clear();

        let parser = Parser::with_max_depth(self.options.max_nesting_depth);
        let mut staged = BTreeMap::new();
        let mut changed = AHashSet::new();

        for addr in self.store.addresses() {
            let Some(text) = self.store.get_formula_text(addr) else {
                continue;
            };
            match parser.parse(&text) {
                Ok(ast) => {
                    self.graph.set_references(addr, ast.references());
                    self.formulas.insert(addr, ast);
                }
                Err(e) => {
                    warn!(cell = %addr, error = %e, "stored formula failed to parse");
                    let value = Value::Error(ErrorKind::ValueError);
                    if !self.store.get_value(addr).is_identical(&value) {
                        changed.insert(addr);
                    }
                    staged.insert(addr, value);
                }
            }
        }

        let nodes: BTreeSet<CellAddress> = self.formulas.keys().copied().collect();
        let plan = PassPlan {
            generation,
            forced: nodes.iter().copied().collect(),
            nodes,
            changed,
            staged,
        };

        self.run_pass(plan)
    }

    fn run_pass(&mut self, mut plan: PassPlan) -> RecalcReport {
        let generation = plan.generation;

        // Cycle detection over the closure only
        let cycles = self.graph.find_cycles(&plan.nodes);
        let now_circular: BTreeSet<CellAddress> = cycles.into_iter().flatten().collect();

        for node in &plan.nodes {
            if self.circular.remove(node) && !now_circular.contains(node) {
                // Freed from a cycle: its cached value is stale
                plan.forced.insert(*node);
            }
        }
        if !now_circular.is_empty() {
            warn!(
                generation,
                cells = ?now_circular.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "circular reference"
            );
        }
        for &cell in &now_circular {
            self.circular.insert(cell);
            let value = Value::Error(ErrorKind::CircularRef);
            if !self.store.get_value(cell).is_identical(&value) {
                plan.changed.insert(cell);
            }
            plan.staged.insert(cell, value);
        }

        for node in &plan.nodes {
            if self.formulas.contains_key(node) {
                self.store.set_dirty(*node, true);
            }
        }

        let order: Vec<CellAddress> = self
            .graph
            .topological_order(&plan.nodes)
            .into_iter()
            .filter(|cell| self.formulas.contains_key(cell) && !now_circular.contains(cell))
            .collect();

        let mut evaluated = 0;
        let mut skipped = 0;

        for cell in order {
            if self.generation.current() != generation {
                return self.abandon(plan, evaluated, now_circular);
            }

            if self.options.short_circuit
                && !plan.forced.contains(&cell)
                && !self.reads_any(cell, &plan.changed)
            {
                skipped += 1;
                continue;
            }

            let Some(ast) = self.formulas.get(&cell) else {
                continue;
            };
            let view = StagedView {
                store: &self.store,
                staged: &plan.staged,
            };
            let value = evaluate_with(ast, &view, &self.registry);
            evaluated += 1;
            trace!(cell = %cell, value = %value, "evaluated");

            if !self.store.get_value(cell).is_identical(&value) {
                plan.changed.insert(cell);
            }
            plan.staged.insert(cell, value);
        }

        if self.generation.current() != generation {
            return self.abandon(plan, evaluated, now_circular);
        }

        // Commit
        for (cell, value) in plan.staged {
            if !self.store.get_value(cell).is_identical(&value) {
                self.store.set_value(cell, value);
            }
        }
        for node in &plan.nodes {
            self.store.set_dirty(*node, false);
        }

        let mut affected: Vec<CellAddress> = plan.changed.into_iter().collect();
        affected.sort();

        debug!(
            generation,
            closure = plan.nodes.len(),
            evaluated,
            skipped,
            changed = affected.len(),
            "recalculation pass committed"
        );

        if !affected.is_empty() {
            if let Some(sink) = self.sink.as_mut() {
                sink.cells_changed(&affected);
            }
        }

        RecalcReport {
            generation,
            affected_cells: affected,
            evaluated,
            circular: now_circular.into_iter().collect(),
            superseded: false,
        }
    }

    /// Drop a superseded pass, leaving its closure dirty for the next one
    fn abandon(
        &mut self,
        plan: PassPlan,
        evaluated: usize,
        circular: BTreeSet<CellAddress>,
    ) -> RecalcReport {
        debug!(
            generation = plan.generation,
            latest = self.generation.current(),
            closure = plan.nodes.len(),
            evaluated,
            "recalculation pass superseded"
        );
        self.pending.extend(plan.nodes);

        RecalcReport {
            generation: plan.generation,
            affected_cells: Vec::new(),
            evaluated,
            circular: circular.into_iter().collect(),
            superseded: true,
        }
    }

    /// Whether `cell` reads any of `changed`, directly or through a range
    fn reads_any(&self, cell: CellAddress, changed: &AHashSet<CellAddress>) -> bool {
        self.graph
            .references(cell)
            .iter()
            .any(|reference| match reference {
                Reference::Cell(addr) => changed.contains(addr),
                Reference::Range(range) => changed.iter().any(|addr| range.contains(addr)),
            })
    }

    // === Queries ===

    /// Cached value of a cell ([`Value::Empty`] if unset)
    pub fn value(&self, addr: CellAddress) -> Value {
        self.store.get_value(addr)
    }

    /// Normalized formula text, if the cell holds a formula
    pub fn formula(&self, addr: CellAddress) -> Option<String> {
        self.formulas.get(&addr).map(|ast| format!("={}", ast))
    }

    /// Raw input text as last entered
    pub fn input(&self, addr: CellAddress) -> Option<String> {
        self.store.get_input(addr)
    }

    /// Cached values of a range, one `Vec` per row
    ///
    /// Fails for ranges over [`MAX_RANGE_CELLS`] cells.
    pub fn values_in(&self, range: CellRange) -> Result<Vec<Vec<Value>>> {
        if range.cell_count() > MAX_RANGE_CELLS {
            return Err(Error::RangeTooLarge(range.to_string(), MAX_RANGE_CELLS));
        }
        let width = range.width() as usize;
        let cells: Vec<Value> = range.cells().map(|addr| self.value(addr)).collect();
        Ok(cells.chunks(width).map(<[Value]>::to_vec).collect())
    }

    /// Evaluate formula text against the sheet without storing it
    pub fn evaluate_formula(&self, text: &str) -> FormulaResult<Value> {
        let ast = Parser::with_max_depth(self.options.max_nesting_depth).parse(text)?;
        Ok(evaluate_with(&ast, &self.store, &self.registry))
    }

    /// References read by a cell's formula
    pub fn precedents(&self, addr: CellAddress) -> Vec<Reference> {
        self.graph.references(addr)
    }

    /// Formula cells reading `addr` directly or through a range
    pub fn dependents(&self, addr: CellAddress) -> Vec<CellAddress> {
        self.graph.dependents(addr)
    }

    /// Whether the cell is part of a reference cycle
    pub fn is_circular(&self, addr: CellAddress) -> bool {
        self.circular.contains(&addr)
    }

    /// Whether the cell's cached value is stale
    pub fn is_dirty(&self, addr: CellAddress) -> bool {
        self.store.is_dirty(addr)
    }

    /// Cells currently in a cycle, row-major
    pub fn circular_cells(&self) -> Vec<CellAddress> {
        let mut cells: Vec<CellAddress> = self.circular.iter().copied().collect();
        cells.sort();
        cells
    }

    /// Cells holding a formula, row-major
    pub fn formula_cells(&self) -> Vec<CellAddress> {
        self.formulas.keys().copied().collect()
    }

    /// The dependency graph
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}

/// Interpret non-formula input
fn parse_literal(text: &str) -> Value {
    if let Some(forced) = text.trim_start().strip_prefix('\'') {
        return Value::Text(forced.to_string());
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Empty;
    }
    if trimmed.eq_ignore_ascii_case("TRUE") {
        return Value::Boolean(true);
    }
    if trimmed.eq_ignore_ascii_case("FALSE") {
        return Value::Boolean(false);
    }
    match parse_numeric_text(trimmed) {
        Some(n) => Value::Number(n),
        None => Value::Text(text.to_string()),
    }
}

/// Input text that reads back as `value`
fn literal_input(value: &Value) -> Option<String> {
    match value {
        Value::Empty => None,
        Value::Text(text) if parse_literal(text).is_identical(value) => Some(text.clone()),
        Value::Text(text) => Some(format!("'{}", text)),
        other => Some(other.to_string()),
    }
}
