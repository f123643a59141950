//! Incremental recalculation.
//!
//! A [`RecalcPass`] is created per edit (or per host-supplied seed batch) and
//! moves through three states:
//!
//! ```text
//! Seeded ──propagate()──▶ Propagating ──publish()──▶ Published
//! ```
//!
//! Propagation computes the transitive closure of the seeds (visited set +
//! FIFO queue), then evaluates the closure in dependency order, so every cell
//! is evaluated exactly once and only after all of its in-closure precedents.
//! New values are staged; nothing is visible to readers of the engine until
//! the caller applies the published values in one step.

use std::collections::VecDeque;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::address::CellAddress;
use crate::cell::CellRecord;
use crate::config::EngineConfig;
use crate::dep_graph::DepGraph;
use crate::formula::eval::{evaluate, CellLookup, ErrorKind, Value};
use crate::named_range::NamedRangeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Seeded,
    Propagating,
    Published,
}

/// A cell that ended the pass holding an error sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecalcError {
    pub cell: CellAddress,
    pub kind: ErrorKind,
}

/// Report from one recalculation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecalcReport {
    /// Cells in the order they were evaluated.
    pub order: Vec<CellAddress>,

    /// Number of cells evaluated (`order.len()`).
    pub cells_recomputed: usize,

    /// Cells whose value differs from the previously published one.
    pub changed: Vec<CellAddress>,

    /// Cells holding an error sentinel after the pass.
    pub errors: Vec<RecalcError>,

    /// Cells the cycle guard marked as circular, sorted.
    pub cycle_cells: Vec<CellAddress>,

    /// True if the cycle guard fired.
    pub had_cycles: bool,

    /// Wall time of the pass in microseconds.
    pub duration_us: u64,
}

impl RecalcReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format as a concise one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} cells in {}us, changed={}, errors={}, cycles={}",
            self.cells_recomputed,
            self.duration_us,
            self.changed.len(),
            self.errors.len(),
            self.had_cycles,
        )
    }

    /// Format as a one-line log entry.
    ///
    /// Format: `[recalc]     42us  3 cells  changed=2  errors=0  cycles=0`
    pub fn log_line(&self) -> String {
        format!(
            "[recalc] {:>6}us  {} cells  changed={}  errors={}  cycles={}",
            self.duration_us,
            self.cells_recomputed,
            self.changed.len(),
            self.errors.len(),
            self.cycle_cells.len(),
        )
    }

    /// Position of a cell in the evaluation order.
    pub fn eval_position(&self, cell: CellAddress) -> Option<usize> {
        self.order.iter().position(|&c| c == cell)
    }
}

/// Reads staged values first, then published ones.
struct StagedView<'p> {
    cells: &'p FxHashMap<CellAddress, CellRecord>,
    names: &'p NamedRangeStore,
    staged: &'p FxHashMap<CellAddress, Value>,
}

impl CellLookup for StagedView<'_> {
    fn value(&self, cell: CellAddress) -> Value {
        if let Some(value) = self.staged.get(&cell) {
            return value.clone();
        }
        self.cells
            .get(&cell)
            .map(|record| record.value.clone())
            .unwrap_or_default()
    }

    fn named_ranges(&self) -> &NamedRangeStore {
        self.names
    }
}

/// One recalculation pass over borrowed engine state.
pub struct RecalcPass<'p> {
    graph: &'p DepGraph,
    cells: &'p FxHashMap<CellAddress, CellRecord>,
    names: &'p NamedRangeStore,
    log_summary: bool,
    state: PassState,
    seeds: Vec<CellAddress>,
    staged: FxHashMap<CellAddress, Value>,
    report: RecalcReport,
    started: Instant,
}

impl<'p> RecalcPass<'p> {
    pub fn new(
        graph: &'p DepGraph,
        cells: &'p FxHashMap<CellAddress, CellRecord>,
        names: &'p NamedRangeStore,
        config: &EngineConfig,
    ) -> Self {
        Self {
            graph,
            cells,
            names,
            log_summary: config.log_recalc_summary,
            state: PassState::Seeded,
            seeds: Vec::new(),
            staged: FxHashMap::default(),
            report: RecalcReport::new(),
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Add changed cells. Only meaningful before `propagate`.
    pub fn seed(&mut self, cells: impl IntoIterator<Item = CellAddress>) {
        if self.state == PassState::Seeded {
            self.seeds.extend(cells);
        }
    }

    /// Evaluate the seeds and everything downstream of them into the staging area.
    pub fn propagate(&mut self) {
        if self.state != PassState::Seeded {
            return;
        }
        self.state = PassState::Propagating;

        let closure = self.closure();

        // In-degree counts only precedents inside the closure.
        let mut in_degree: FxHashMap<CellAddress, usize> = closure
            .iter()
            .map(|&cell| {
                let count = self
                    .graph
                    .precedents(cell)
                    .into_iter()
                    .filter(|p| closure.contains(p))
                    .count();
                (cell, count)
            })
            .collect();

        let mut ready: Vec<CellAddress> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&cell, _)| cell)
            .collect();
        ready.sort();
        let mut queue: VecDeque<CellAddress> = ready.into();
        let mut done: FxHashSet<CellAddress> = FxHashSet::default();

        self.drain(&mut queue, &mut in_degree, &closure, &mut done);

        // Whatever is left waits on a cycle.
        if done.len() < closure.len() {
            let stuck: FxHashSet<CellAddress> =
                closure.iter().copied().filter(|c| !done.contains(c)).collect();
            let mut members = self.graph.cycle_members(&stuck);
            if members.is_empty() {
                members = stuck.iter().copied().collect();
                members.sort();
            }
            log::warn!("recalc: {} cells on a dependency cycle", members.len());

            for &cell in &members {
                self.stage(cell, Value::Error(ErrorKind::CircularReference));
                done.insert(cell);
            }
            for &cell in &members {
                self.release_successors(cell, &mut queue, &mut in_degree, &closure, &done);
            }
            self.report.had_cycles = true;
            self.report.cycle_cells = members;

            self.drain(&mut queue, &mut in_degree, &closure, &mut done);
        }
    }

    /// Finish the pass: hand back staged values and the report.
    ///
    /// The caller applies all values at once, so no reader ever observes a
    /// partly recalculated sheet.
    pub fn publish(mut self) -> (FxHashMap<CellAddress, Value>, RecalcReport) {
        if self.state == PassState::Seeded {
            self.propagate();
        }
        self.state = PassState::Published;

        self.report.cells_recomputed = self.report.order.len();
        self.report.duration_us = self.started.elapsed().as_micros() as u64;

        if self.log_summary {
            log::debug!("{}", self.report.log_line());
        }
        (self.staged, self.report)
    }

    /// Seeds plus all transitive dependents.
    fn closure(&self) -> FxHashSet<CellAddress> {
        let mut visited = FxHashSet::default();
        let mut queue: VecDeque<CellAddress> = self.seeds.iter().copied().collect();

        while let Some(cell) = queue.pop_front() {
            if !visited.insert(cell) {
                continue;
            }
            queue.extend(self.graph.successors(cell));
        }
        visited
    }

    fn drain(
        &mut self,
        queue: &mut VecDeque<CellAddress>,
        in_degree: &mut FxHashMap<CellAddress, usize>,
        closure: &FxHashSet<CellAddress>,
        done: &mut FxHashSet<CellAddress>,
    ) {
        while let Some(cell) = queue.pop_front() {
            if !done.insert(cell) {
                continue;
            }
            self.recompute(cell);
            self.release_successors(cell, queue, in_degree, closure, done);
        }
    }

    fn release_successors(
        &self,
        cell: CellAddress,
        queue: &mut VecDeque<CellAddress>,
        in_degree: &mut FxHashMap<CellAddress, usize>,
        closure: &FxHashSet<CellAddress>,
        done: &FxHashSet<CellAddress>,
    ) {
        for succ in self.graph.successors(cell) {
            if !closure.contains(&succ) || done.contains(&succ) {
                continue;
            }
            if let Some(deg) = in_degree.get_mut(&succ) {
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    queue.push_back(succ);
                }
            }
        }
    }

    fn recompute(&mut self, cell: CellAddress) {
        // Cleared cells have no record; they read as blank already.
        let Some(record) = self.cells.get(&cell) else {
            return;
        };

        let value = match record.call() {
            Some(call) => {
                let view = StagedView {
                    cells: self.cells,
                    names: self.names,
                    staged: &self.staged,
                };
                evaluate(call, cell.sheet, &view)
            }
            None => record.input_value(),
        };

        log::trace!("recalc {} = {}", cell, value);
        self.report.order.push(cell);
        self.stage(cell, value);
    }

    fn stage(&mut self, cell: CellAddress, value: Value) {
        let previous = self
            .cells
            .get(&cell)
            .map(|record| &record.value)
            .cloned()
            .unwrap_or_default();
        if value != previous {
            self.report.changed.push(cell);
        }
        if let Value::Error(kind) = value {
            self.report.errors.push(RecalcError { cell, kind });
        }
        self.staged.insert(cell, value);
    }
}
