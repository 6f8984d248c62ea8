//! Cell store interfaces and the in-memory implementation
//!
//! The engine never owns cell contents directly. It reads values through
//! [`ValueProvider`], reads and writes cell state through [`CellStore`], and
//! reports the cells whose value changed after a pass to a [`ChangeSink`].

use std::collections::BTreeMap;

use crate::{CellAddress, CellRange, Value};

/// Read-only access to cell values
///
/// Implemented for every `Fn(CellAddress) -> Value`, which makes ad-hoc
/// evaluation against a closure straightforward.
pub trait ValueProvider {
    /// Current value of a cell ([`Value::Empty`] if unset)
    fn get_value(&self, addr: CellAddress) -> Value;

    /// Every address covered by `range`, in row-major order
    fn list_range_addresses(&self, range: CellRange) -> Vec<CellAddress> {
        range.cells().collect()
    }
}

impl<F> ValueProvider for F
where
    F: Fn(CellAddress) -> Value,
{
    fn get_value(&self, addr: CellAddress) -> Value {
        self(addr)
    }
}

/// Mutable cell state used by the recalculation engine
pub trait CellStore: ValueProvider {
    /// Formula text held at `addr`, including the leading `=`
    fn get_formula_text(&self, addr: CellAddress) -> Option<String>;

    /// Raw input text held at `addr`
    fn get_input(&self, addr: CellAddress) -> Option<String>;

    /// Replace the raw input text, keeping the cached value
    fn set_input(&mut self, addr: CellAddress, input: Option<String>);

    /// Replace the cached value
    fn set_value(&mut self, addr: CellAddress, value: Value);

    /// Mark the cached value as stale or fresh
    fn set_dirty(&mut self, addr: CellAddress, dirty: bool);

    /// Whether the cached value is stale
    fn is_dirty(&self, addr: CellAddress) -> bool;

    /// Forget everything about a cell
    fn remove(&mut self, addr: CellAddress);

    /// Every populated address, in row-major order
    fn addresses(&self) -> Vec<CellAddress>;
}

/// Receives the cells whose value changed after a recalculation pass
pub trait ChangeSink {
    /// Called once per committed pass that changed at least one value
    fn cells_changed(&mut self, cells: &[CellAddress]);
}

impl<F> ChangeSink for F
where
    F: FnMut(&[CellAddress]),
{
    fn cells_changed(&mut self, cells: &[CellAddress]) {
        (*self)(cells)
    }
}

/// A [`ChangeSink`] that records every notification it receives
#[derive(Debug, Default, Clone)]
pub struct ChangeLog {
    batches: Vec<Vec<CellAddress>>,
}

impl ChangeLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications, oldest first
    pub fn batches(&self) -> &[Vec<CellAddress>] {
        &self.batches
    }

    /// The most recent notification
    pub fn last(&self) -> Option<&[CellAddress]> {
        self.batches.last().map(Vec::as_slice)
    }

    /// Drop all recorded notifications
    pub fn clear(&mut self) {
        self.batches.clear();
    }
}

impl ChangeSink for ChangeLog {
    fn cells_changed(&mut self, cells: &[CellAddress]) {
        self.batches.push(cells.to_vec());
    }
}

/// Complete state of a single cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellData {
    /// Raw input text (formula text keeps its leading `=`)
    pub input: Option<String>,
    /// Cached value
    pub value: Value,
    /// Whether `value` is stale
    pub dirty: bool,
}

impl CellData {
    /// Check if this cell carries nothing worth storing
    pub fn is_empty(&self) -> bool {
        self.input.is_none() && self.value.is_empty() && !self.dirty
    }
}

/// Sparse row-based in-memory cell store
///
/// Structure: `BTreeMap<row_index, BTreeMap<col_index, CellData>>`, so
/// iteration is row-major.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    rows: BTreeMap<u32, BTreeMap<u16, CellData>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cell's data
    pub fn get(&self, addr: CellAddress) -> Option<&CellData> {
        self.rows.get(&addr.row).and_then(|row| row.get(&addr.col))
    }

    fn entry(&mut self, addr: CellAddress) -> &mut CellData {
        self.rows
            .entry(addr.row)
            .or_default()
            .entry(addr.col)
            .or_default()
    }

    fn prune(&mut self, addr: CellAddress) {
        if let Some(row) = self.rows.get_mut(&addr.row) {
            if row.get(&addr.col).map_or(false, CellData::is_empty) {
                row.remove(&addr.col);
            }
            if row.is_empty() {
                self.rows.remove(&addr.row);
            }
        }
    }

    /// Number of populated cells
    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    /// Check if no cell is populated
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over populated cells in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (CellAddress, &CellData)> {
        self.rows.iter().flat_map(|(&row, cols)| {
            cols.iter()
                .map(move |(&col, data)| (CellAddress::new(row, col), data))
        })
    }
}

impl ValueProvider for MemoryStore {
    fn get_value(&self, addr: CellAddress) -> Value {
        self.get(addr).map(|c| c.value.clone()).unwrap_or_default()
    }
}

impl CellStore for MemoryStore {
    fn get_formula_text(&self, addr: CellAddress) -> Option<String> {
        self.get(addr)
            .and_then(|c| c.input.as_deref())
            .filter(|input| input.starts_with('='))
            .map(str::to_string)
    }

    fn get_input(&self, addr: CellAddress) -> Option<String> {
        self.get(addr).and_then(|c| c.input.clone())
    }

    fn set_input(&mut self, addr: CellAddress, input: Option<String>) {
        self.entry(addr).input = input;
        self.prune(addr);
    }

    fn set_value(&mut self, addr: CellAddress, value: Value) {
        self.entry(addr).value = value;
        self.prune(addr);
    }

    fn set_dirty(&mut self, addr: CellAddress, dirty: bool) {
        if dirty || self.get(addr).is_some() {
            self.entry(addr).dirty = dirty;
            self.prune(addr);
        }
    }

    fn is_dirty(&self, addr: CellAddress) -> bool {
        self.get(addr).map_or(false, |c| c.dirty)
    }

    fn remove(&mut self, addr: CellAddress) {
        if let Some(row) = self.rows.get_mut(&addr.row) {
            row.remove(&addr.col);
            if row.is_empty() {
                self.rows.remove(&addr.row);
            }
        }
    }

    fn addresses(&self) -> Vec<CellAddress> {
        self.iter().map(|(addr, _)| addr).collect()
    }
}
