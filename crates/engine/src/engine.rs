//! The engine: cell map, dependency graph and named ranges for one document.
//!
//! Every public mutation is all-or-nothing. It either returns a structural
//! error with no state changed, or applies the edit, rewires the graph and
//! recalculates everything downstream before returning.

use rustc_hash::FxHashMap;

use crate::address::{CellAddress, SheetId};
use crate::cell::CellRecord;
use crate::config::EngineConfig;
use crate::dep_graph::DepGraph;
use crate::error::EngineError;
use crate::formula::eval::Value;
use crate::formula::parser::{parse, ParseOutcome};
use crate::formula::refs::{extract_references, mentions_any};
use crate::named_range::{NamedRange, NamedRangeId, NamedRangeStore, Rect};
use crate::recalc::{RecalcPass, RecalcReport};

#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
    cells: FxHashMap<CellAddress, CellRecord>,
    graph: DepGraph,
    names: NamedRangeStore,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Cell edits
    // =========================================================================

    /// Set a cell's raw input and recalculate everything downstream.
    ///
    /// Empty (or whitespace-only) input clears the cell. On error nothing
    /// changes: not the cell, not the graph, not any value.
    pub fn update_cell(&mut self, addr: CellAddress, raw: &str) -> Result<RecalcReport, EngineError> {
        self.stage_input(addr, raw)?;
        Ok(self.recalculate([addr]))
    }

    /// Validate and store a cell's input and rewire the graph without
    /// recalculating.
    ///
    /// For bulk edits (paste, undo): stage every cell, then call
    /// [`recalculate`](Self::recalculate) once with all of them as seeds.
    /// Until then, formulas keep their last published values.
    pub fn stage_input(&mut self, addr: CellAddress, raw: &str) -> Result<(), EngineError> {
        let outcome = parse(raw).map_err(|e| rejected(addr, e))?;
        let deps = match &outcome {
            ParseOutcome::Call(call) => extract_references(call, addr.sheet, &self.names, &self.config)
                .map_err(|e| rejected(addr, e))?,
            ParseOutcome::Constant | ParseOutcome::Unevaluated => Vec::new(),
        };

        if let Some(path) = self.graph.find_cycle_path(addr, &deps) {
            return Err(rejected(addr, EngineError::CircularReference { cell: addr, path }));
        }

        if raw.trim().is_empty() {
            self.cells.remove(&addr);
            // Dependents still read the blank cell, so its node stays until they go.
            if self.graph.successors(addr).is_empty() {
                self.graph.remove_node(addr);
                return Ok(());
            }
        } else {
            let mut record = CellRecord::new(raw, outcome);
            if let Some(previous) = self.cells.get(&addr) {
                record.value = previous.value.clone();
            }
            self.cells.insert(addr, record);
        }
        self.graph.set_dependencies(addr, &deps);
        Ok(())
    }

    /// Recalculate the seeds and their transitive dependents, then publish.
    pub fn recalculate(&mut self, seeds: impl IntoIterator<Item = CellAddress>) -> RecalcReport {
        let (staged, report) = {
            let mut pass = RecalcPass::new(&self.graph, &self.cells, &self.names, &self.config);
            pass.seed(seeds);
            pass.propagate();
            pass.publish()
        };

        for (addr, value) in staged {
            if let Some(record) = self.cells.get_mut(&addr) {
                record.value = value;
            }
        }
        report
    }

    /// Reset to an empty document. Configuration is kept.
    pub fn clear(&mut self) {
        log::info!(
            "clearing engine: {} cells, {} named ranges",
            self.cells.len(),
            self.names.len()
        );
        self.cells.clear();
        self.graph.clear();
        self.names = NamedRangeStore::new();
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Last published value. Never triggers recalculation.
    pub fn get_cell_value(&self, addr: CellAddress) -> Value {
        self.cells
            .get(&addr)
            .map(|record| record.value.clone())
            .unwrap_or_default()
    }

    /// Cells whose formulas read `addr` directly, sorted.
    pub fn get_dependents(&self, addr: CellAddress) -> Vec<CellAddress> {
        self.graph.successors(addr)
    }

    /// Cells `addr`'s formula reads, sorted.
    pub fn get_precedents(&self, addr: CellAddress) -> Vec<CellAddress> {
        self.graph.precedents(addr)
    }

    pub fn cell(&self, addr: CellAddress) -> Option<&CellRecord> {
        self.cells.get(&addr)
    }

    /// Number of non-blank cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn dep_graph(&self) -> &DepGraph {
        &self.graph
    }

    pub fn named_ranges(&self) -> &NamedRangeStore {
        &self.names
    }

    // =========================================================================
    // Named ranges
    // =========================================================================

    /// Define a new named range. Formulas already spelling the name (including
    /// an A1 address it now shadows) are rewired and recalculated.
    pub fn add_named_range(
        &mut self,
        name: &str,
        sheet: SheetId,
        rect: Rect,
    ) -> Result<(NamedRangeId, RecalcReport), EngineError> {
        let mut names = self.names.clone();
        let id = names
            .insert(NamedRange::new(name, sheet, rect))
            .map_err(|e| rejected_name(name, e.into()))?;
        let report = self.rewire_names(names, &[name.trim()])?;
        Ok((id, report))
    }

    /// Rename a named range. Formulas using the old spelling now evaluate to
    /// the unknown-name sentinel; formulas spelling the new name pick it up.
    pub fn rename_named_range(&mut self, old_name: &str, new_name: &str) -> Result<RecalcReport, EngineError> {
        let mut names = self.names.clone();
        names
            .rename(old_name, new_name)
            .map_err(|e| rejected_name(old_name, e.into()))?;
        self.rewire_names(names, &[old_name.trim(), new_name.trim()])
    }

    /// Point a named range at a different rectangle.
    pub fn retarget_named_range(
        &mut self,
        name: &str,
        sheet: SheetId,
        rect: Rect,
    ) -> Result<RecalcReport, EngineError> {
        let mut names = self.names.clone();
        names
            .retarget(name, sheet, rect)
            .map_err(|e| rejected_name(name, e.into()))?;
        self.rewire_names(names, &[name.trim()])
    }

    /// Delete a named range. Formulas using it are not rewritten; they
    /// re-evaluate to the unknown-name sentinel.
    pub fn delete_named_range(&mut self, name: &str) -> Result<RecalcReport, EngineError> {
        let mut names = self.names.clone();
        names.remove(name).map_err(|e| rejected_name(name, e.into()))?;
        self.rewire_names(names, &[name.trim()])
    }

    /// Commit `names` after re-extracting the dependencies of every formula
    /// mentioning one of `affected`. Rejected without side effects if the new
    /// edges would close a cycle.
    fn rewire_names(&mut self, names: NamedRangeStore, affected: &[&str]) -> Result<RecalcReport, EngineError> {
        // A dangling name is a value error here, not a reason to refuse the edit.
        let config = EngineConfig {
            reject_unresolved_names: false,
            ..self.config.clone()
        };

        let mut touched: Vec<CellAddress> = self
            .cells
            .iter()
            .filter(|(_, record)| record.call().map_or(false, |call| mentions_any(call, affected)))
            .map(|(&addr, _)| addr)
            .collect();
        touched.sort();

        let mut graph = self.graph.clone();
        for &addr in &touched {
            let Some(call) = self.cells.get(&addr).and_then(|record| record.call()) else {
                continue;
            };
            let deps = extract_references(call, addr.sheet, &names, &config)
                .map_err(|e| rejected(addr, e))?;
            if let Some(path) = graph.find_cycle_path(addr, &deps) {
                return Err(rejected(addr, EngineError::CircularReference { cell: addr, path }));
            }
            graph.set_dependencies(addr, &deps);
        }

        self.names = names;
        self.graph = graph;
        log::debug!("named range change rewired {} formulas", touched.len());
        Ok(self.recalculate(touched))
    }
}

fn rejected(addr: CellAddress, err: EngineError) -> EngineError {
    log::warn!("rejected edit of {}: {}", addr, err);
    err
}

fn rejected_name(name: &str, err: EngineError) -> EngineError {
    log::warn!("rejected named range change for '{}': {}", name, err);
    err
}
