//! Structural errors returned synchronously to the caller.
//!
//! These reject an edit and leave the engine untouched. Evaluation failures
//! are not errors in this sense: they are stored on the cell as
//! [`Value::Error`](crate::formula::eval::Value::Error) and propagate through
//! the graph like any other value.

use thiserror::Error;

use crate::address::CellAddress;
use crate::formula::functions::Function;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The formula text is not `=NAME(arg, ...)`.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Wrong argument count, or an argument shape the function never accepts.
    #[error("{function}: {reason}")]
    Arity { function: Function, reason: String },

    /// Applying the edit would make `cell` depend on itself.
    #[error("circular reference: {}", format_path(.path))]
    CircularReference {
        cell: CellAddress,
        path: Vec<CellAddress>,
    },

    /// A name token that is neither a defined named range nor an A1 address.
    #[error("unresolved reference '{0}'")]
    UnresolvedReference(String),

    /// A range token that expands past the configured cell limit.
    #[error("range {token} spans more than {limit} cells")]
    RangeTooLarge { token: String, limit: usize },

    #[error(transparent)]
    NamedRange(#[from] NamedRangeError),
}

impl EngineError {
    /// Short machine-readable code for hosts that map errors to UI text.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Syntax(_) => "syntax_error",
            EngineError::Arity { .. } => "arity_error",
            EngineError::CircularReference { .. } => "circular_reference",
            EngineError::UnresolvedReference(_) => "unresolved_reference",
            EngineError::RangeTooLarge { .. } => "range_too_large",
            EngineError::NamedRange(_) => "named_range_error",
        }
    }
}

fn format_path(path: &[CellAddress]) -> String {
    let cells: Vec<String> = path.iter().map(|c| c.a1()).collect();
    if cells.len() <= 5 {
        cells.join(" → ")
    } else {
        format!(
            "{} cells: {} → ... → {}",
            cells.len(),
            cells[0],
            cells[cells.len() - 1]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamedRangeError {
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid range for '{name}': {reason}")]
    InvalidRect { name: String, reason: String },

    #[error("name '{0}' already exists")]
    Duplicate(String),

    #[error("name '{0}' not found")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
