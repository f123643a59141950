//! Spreadsheet formula evaluation and dependency tracking.
//!
//! [`Engine`] owns the cells of one document, the dependency graph between
//! them and the named ranges their formulas may use. Each edit is parsed,
//! checked for cycles, wired into the graph and recalculated through its
//! transitive dependents before the call returns.

pub mod address;
pub mod cell;
pub mod config;
pub mod dep_graph;
pub mod engine;
pub mod error;
pub mod formula;
pub mod named_range;
pub mod recalc;

pub use address::{CellAddress, SheetId};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ConfigError, EngineError, NamedRangeError};
pub use formula::eval::{ErrorKind, Value};
pub use named_range::{NamedRange, NamedRangeId, Rect};
pub use recalc::RecalcReport;
