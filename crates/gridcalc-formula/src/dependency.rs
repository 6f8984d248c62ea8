//! Dependency tracking for formula recalculation
//!
//! Edges run from a formula cell to the references it reads. A range
//! reference is kept as a single edge and only tested for containment when
//! looking up dependents, so `=SUM(A1:A10000)` costs one edge rather than
//! ten thousand. Range edges are also indexed by row stripe, so finding the
//! readers of a cell only tests the ranges overlapping its stripe.

use crate::ast::Reference;
use ahash::{AHashMap, AHashSet};
use gridcalc_core::{CellAddress, CellRange};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Rows per stripe in the range index
const ROW_STRIPE: u32 = 256;

fn stripes(range: &CellRange) -> std::ops::RangeInclusive<u32> {
    range.start.row / ROW_STRIPE..=range.end.row / ROW_STRIPE
}

/// Edges added and removed by [`DependencyGraph::set_references`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDiff {
    /// References the cell reads now but did not before
    pub added: Vec<Reference>,
    /// References the cell no longer reads
    pub removed: Vec<Reference>,
}

impl EdgeDiff {
    /// Whether the edit left the cell's edges unchanged
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Graph of formula cells and the cells and ranges they read
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Formula cell -> references it reads
    precedents: AHashMap<CellAddress, BTreeSet<Reference>>,
    /// Cell -> formula cells reading it directly
    cell_readers: AHashMap<CellAddress, AHashSet<CellAddress>>,
    /// Range -> formula cells reading it
    range_readers: AHashMap<CellRange, AHashSet<CellAddress>>,
    /// Row stripe -> ranges overlapping it
    range_stripes: AHashMap<u32, AHashSet<CellRange>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outgoing edges of `cell` with `references`
    pub fn set_references(
        &mut self,
        cell: CellAddress,
        references: BTreeSet<Reference>,
    ) -> EdgeDiff {
        let previous = self.precedents.remove(&cell).unwrap_or_default();

        let removed: Vec<Reference> = previous.difference(&references).copied().collect();
        let added: Vec<Reference> = references.difference(&previous).copied().collect();

        for reference in &removed {
            self.unlink(cell, *reference);
        }
        for reference in &added {
            match *reference {
                Reference::Cell(addr) => {
                    self.cell_readers.entry(addr).or_default().insert(cell);
                }
                Reference::Range(range) => {
                    let readers = self.range_readers.entry(range).or_default();
                    if readers.is_empty() {
                        for stripe in stripes(&range) {
                            self.range_stripes.entry(stripe).or_default().insert(range);
                        }
                    }
                    readers.insert(cell);
                }
            }
        }

        if !references.is_empty() {
            self.precedents.insert(cell, references);
        }

        EdgeDiff { added, removed }
    }

    /// Remove every outgoing edge of `cell`
    pub fn clear_references(&mut self, cell: CellAddress) -> EdgeDiff {
        self.set_references(cell, BTreeSet::new())
    }

    fn unlink(&mut self, cell: CellAddress, reference: Reference) {
        match reference {
            Reference::Cell(addr) => {
                if let Some(readers) = self.cell_readers.get_mut(&addr) {
                    readers.remove(&cell);
                    if readers.is_empty() {
                        self.cell_readers.remove(&addr);
                    }
                }
            }
            Reference::Range(range) => {
                if let Some(readers) = self.range_readers.get_mut(&range) {
                    readers.remove(&cell);
                    if readers.is_empty() {
                        self.range_readers.remove(&range);
                        for stripe in stripes(&range) {
                            if let Some(ranges) = self.range_stripes.get_mut(&stripe) {
                                ranges.remove(&range);
                                if ranges.is_empty() {
                                    self.range_stripes.remove(&stripe);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// References read by `cell`, sorted
    pub fn references(&self, cell: CellAddress) -> Vec<Reference> {
        self.precedents
            .get(&cell)
            .map(|refs| refs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `cell` reads `addr`, directly or through a range
    pub fn reads(&self, cell: CellAddress, addr: CellAddress) -> bool {
        self.precedents
            .get(&cell)
            .map_or(false, |refs| refs.iter().any(|r| r.contains(&addr)))
    }

    /// Formula cells reading `cell` directly or through a range, sorted
    pub fn dependents(&self, cell: CellAddress) -> Vec<CellAddress> {
        let mut found: BTreeSet<CellAddress> = self
            .cell_readers
            .get(&cell)
            .map(|readers| readers.iter().copied().collect())
            .unwrap_or_default();

        let overlapping = self.range_stripes.get(&(cell.row / ROW_STRIPE));
        for range in overlapping.into_iter().flatten() {
            if range.contains(&cell) {
                if let Some(readers) = self.range_readers.get(range) {
                    found.extend(readers.iter().copied());
                }
            }
        }

        found.into_iter().collect()
    }

    /// Every cell reachable from `seeds` through dependent edges
    ///
    /// Seeds are included only when some path leads back to them.
    pub fn transitive_dependents(&self, seeds: &[CellAddress]) -> BTreeSet<CellAddress> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<CellAddress> = seeds.iter().copied().collect();

        while let Some(cell) = queue.pop_front() {
            for dependent in self.dependents(cell) {
                if seen.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }

        seen
    }

    /// Dependent edges restricted to `nodes`
    fn subgraph(&self, nodes: &BTreeSet<CellAddress>) -> BTreeMap<CellAddress, Vec<CellAddress>> {
        nodes
            .iter()
            .map(|&node| {
                let next = self
                    .dependents(node)
                    .into_iter()
                    .filter(|d| nodes.contains(d))
                    .collect();
                (node, next)
            })
            .collect()
    }

    /// Cycles among `nodes`, each sorted, ordered by their first cell
    ///
    /// A cycle is a strongly connected component with more than one cell,
    /// or a single cell that reads itself.
    pub fn find_cycles(&self, nodes: &BTreeSet<CellAddress>) -> Vec<Vec<CellAddress>> {
        let edges = self.subgraph(nodes);

        let mut cycles: Vec<Vec<CellAddress>> = tarjan_scc(&edges)
            .into_iter()
            .filter(|scc| match scc.as_slice() {
                [single] => edges.get(single).map_or(false, |next| next.contains(single)),
                _ => true,
            })
            .map(|mut scc| {
                scc.sort();
                scc
            })
            .collect();

        cycles.sort();
        cycles
    }

    /// Evaluation order for `nodes`: every cell after the cells it reads
    ///
    /// Kahn's algorithm over the strongly connected components, so the
    /// members of a cycle come out together and every cell reading a cycle
    /// comes after it. Ties are broken by each component's first cell in
    /// row-major order, which keeps the result deterministic.
    pub fn topological_order(&self, nodes: &BTreeSet<CellAddress>) -> Vec<CellAddress> {
        let edges = self.subgraph(nodes);

        let mut components = tarjan_scc(&edges);
        let mut owner: AHashMap<CellAddress, usize> = AHashMap::with_capacity(nodes.len());
        for (index, component) in components.iter_mut().enumerate() {
            component.sort();
            owner.extend(component.iter().map(|&cell| (cell, index)));
        }

        let mut in_degree = vec![0usize; components.len()];
        let mut downstream: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
        for (node, next) in &edges {
            let Some(&from) = owner.get(node) else {
                continue;
            };
            for dependent in next {
                match owner.get(dependent) {
                    Some(&to) if to != from && downstream[from].insert(to) => {
                        in_degree[to] += 1;
                    }
                    _ => {}
                }
            }
        }

        let mut ready: BTreeSet<(CellAddress, usize)> = components
            .iter()
            .enumerate()
            .filter(|&(index, _)| in_degree[index] == 0)
            .map(|(index, component)| (component[0], index))
            .collect();
        let mut order = Vec::with_capacity(nodes.len());

        while let Some((_, index)) = ready.pop_first() {
            order.extend(components[index].iter().copied());
            for &to in &downstream[index] {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    ready.insert((components[to][0], to));
                }
            }
        }

        order
    }

    /// Formula cells with at least one reference, sorted
    pub fn formula_cells(&self) -> Vec<CellAddress> {
        let mut cells: Vec<CellAddress> = self.precedents.keys().copied().collect();
        cells.sort();
        cells
    }

    /// Whether `cell` has outgoing edges or is read by any formula
    pub fn contains(&self, cell: CellAddress) -> bool {
        self.precedents.contains_key(&cell) || !self.dependents(cell).is_empty()
    }

    /// Number of cells and ranges with edges attached
    pub fn node_count(&self) -> usize {
        let mut cells: AHashSet<CellAddress> = self.precedents.keys().copied().collect();
        cells.extend(self.cell_readers.keys().copied());
        cells.len() + self.range_readers.len()
    }

    /// Whether the graph holds no edges
    pub fn is_empty(&self) -> bool {
        self.precedents.is_empty()
    }

    /// Drop every edge
    pub fn clear(&mut self) {
        self.precedents.clear();
        self.cell_readers.clear();
        self.range_readers.clear();
        self.range_stripes.clear();
    }
}

/// Tarjan's strongly connected components, iterative
///
/// An explicit work stack replaces recursion so long dependency chains
/// cannot overflow the call stack.
fn tarjan_scc(edges: &BTreeMap<CellAddress, Vec<CellAddress>>) -> Vec<Vec<CellAddress>> {
    let mut counter = 0usize;
    let mut indices: AHashMap<CellAddress, usize> = AHashMap::new();
    let mut lowlinks: AHashMap<CellAddress, usize> = AHashMap::new();
    let mut on_stack: AHashSet<CellAddress> = AHashSet::new();
    let mut stack: Vec<CellAddress> = Vec::new();
    let mut components = Vec::new();

    for &root in edges.keys() {
        if indices.contains_key(&root) {
            continue;
        }

        indices.insert(root, counter);
        lowlinks.insert(root, counter);
        counter += 1;
        stack.push(root);
        on_stack.insert(root);

        // (node, index of the next successor to visit)
        let mut work: Vec<(CellAddress, usize)> = vec![(root, 0)];

        while let Some(frame) = work.last_mut() {
            let node = frame.0;
            let successors = edges.get(&node).map_or(&[][..], Vec::as_slice);

            if let Some(&next) = successors.get(frame.1) {
                frame.1 += 1;
                match indices.get(&next) {
                    None => {
                        indices.insert(next, counter);
                        lowlinks.insert(next, counter);
                        counter += 1;
                        stack.push(next);
                        on_stack.insert(next);
                        work.push((next, 0));
                    }
                    Some(&next_index) if on_stack.contains(&next) => {
                        if let Some(low) = lowlinks.get_mut(&node) {
                            *low = (*low).min(next_index);
                        }
                    }
                    Some(_) => {}
                }
                continue;
            }

            work.pop();
            let node_low = lowlinks.get(&node).copied().unwrap_or(usize::MAX);
            if let Some(&(parent, _)) = work.last() {
                if let Some(low) = lowlinks.get_mut(&parent) {
                    *low = (*low).min(node_low);
                }
            }

            if indices.get(&node) == Some(&node_low) {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack.remove(&member);
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }

    components
}
