// Formula evaluator - resolves operands and runs a parsed call

use serde::{Deserialize, Serialize};

use crate::address::{CellAddress, SheetId};
use crate::named_range::NamedRangeStore;

use super::parser::{Arg, FormulaCall};
use super::refs::resolve_token;

/// Read access to cell values and named ranges during evaluation.
pub trait CellLookup {
    /// Current value of a cell. Cells never written are blank.
    fn value(&self, cell: CellAddress) -> Value;

    /// Named ranges used to resolve name tokens.
    fn named_ranges(&self) -> &NamedRangeStore;
}

// =============================================================================
// ErrorKind: recoverable evaluation failures
// =============================================================================

/// Why a cell holds an error sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The cell sits on a dependency cycle found during recalculation.
    CircularReference,
    /// AVERAGE, MIN or MAX over zero operands.
    EmptyOperands,
    /// SQRT of a negative number.
    NegativeSqrt,
    /// ABS or SQRT given something other than exactly one cell.
    NotSingleCell,
    /// A name token that no longer resolves (e.g. its named range was deleted).
    UnknownName,
    /// A result that is NaN or infinite.
    InvalidNumber,
}

impl ErrorKind {
    /// The text stored and displayed for this error.
    pub fn sentinel(self) -> &'static str {
        match self {
            ErrorKind::CircularReference => "#ERROR: Circular Reference",
            ErrorKind::EmptyOperands => "#ERROR: Empty Range",
            ErrorKind::NegativeSqrt => "#ERROR: Negative Square Root",
            ErrorKind::NotSingleCell => "#ERROR: Expected Single Cell",
            ErrorKind::UnknownName => "#ERROR: Unknown Name",
            ErrorKind::InvalidNumber => "#ERROR: Invalid Number",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sentinel())
    }
}

// =============================================================================
// Value: what a cell holds after evaluation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Text(String),
    Error(ErrorKind),
    /// Shown as typed, never evaluated: blank cells (`""`) and formulas
    /// naming an unknown function.
    Literal(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::blank()
    }
}

impl Value {
    pub fn blank() -> Self {
        Value::Literal(String::new())
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Literal(s) if s.is_empty())
    }

    /// Value of non-formula input: blank, a number, or text as typed.
    pub fn from_input(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::blank();
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(raw.to_string()),
        }
    }

    /// Numeric view used by the function library.
    ///
    /// Errors propagate; text, blank and unevaluated values count as 0.
    pub fn as_number(&self) -> Result<f64, ErrorKind> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Error(kind) => Err(*kind),
            Value::Text(_) | Value::Literal(_) => Ok(0.0),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Value::Error(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn to_display(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Text(s) | Value::Literal(s) => s.clone(),
            Value::Error(kind) => kind.sentinel().to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_display())
    }
}

/// One argument after reference resolution: the values it flattens to.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub values: Vec<Value>,
}

impl Operand {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

/// Evaluate a parsed call for a formula living on `sheet`.
///
/// Never fails: every problem becomes a `Value::Error`.
pub fn evaluate<L: CellLookup>(call: &FormulaCall, sheet: SheetId, lookup: &L) -> Value {
    let mut operands = Vec::with_capacity(call.args.len());

    for arg in &call.args {
        let operand = match arg {
            Arg::Number(n) => Operand::new(vec![Value::Number(*n)]),
            Arg::Reference(token) => match resolve_token(token, sheet, lookup.named_ranges()) {
                Some(cells) => Operand::new(cells.into_iter().map(|c| lookup.value(c)).collect()),
                None => return Value::Error(ErrorKind::UnknownName),
            },
        };
        operands.push(operand);
    }

    call.function.apply(&operands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::{parse, ParseOutcome};
    use crate::named_range::{NamedRange, Rect};
    use rustc_hash::FxHashMap;

    #[derive(Default)]
    struct MapLookup {
        values: FxHashMap<CellAddress, Value>,
        names: NamedRangeStore,
    }

    impl MapLookup {
        fn set(&mut self, a1: &str, value: Value) {
            let cell = CellAddress::parse(SheetId::DEFAULT, a1).unwrap();
            self.values.insert(cell, value);
        }
    }

    impl CellLookup for MapLookup {
        fn value(&self, cell: CellAddress) -> Value {
            self.values.get(&cell).cloned().unwrap_or_default()
        }

        fn named_ranges(&self) -> &NamedRangeStore {
            &self.names
        }
    }

    fn eval(formula: &str, lookup: &MapLookup) -> Value {
        match parse(formula).unwrap() {
            ParseOutcome::Call(call) => evaluate(&call, SheetId::DEFAULT, lookup),
            other => panic!("expected a call, got {:?}", other),
        }
    }

    #[test]
    fn test_value_from_input() {
        assert_eq!(Value::from_input("5"), Value::Number(5.0));
        assert_eq!(Value::from_input(" -2.5 "), Value::Number(-2.5));
        assert_eq!(Value::from_input("hello"), Value::Text("hello".into()));
        assert_eq!(Value::from_input("inf"), Value::Text("inf".into()));
        assert!(Value::from_input("   ").is_blank());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Number(15.0).to_display(), "15");
        assert_eq!(Value::Number(3.14).to_display(), "3.14");
        assert_eq!(Value::Error(ErrorKind::CircularReference).to_display(), "#ERROR: Circular Reference");
        assert_eq!(Value::blank().to_display(), "");
    }

    #[test]
    fn test_sum_over_range_and_cells() {
        let mut lookup = MapLookup::default();
        lookup.set("A1", Value::Number(1.0));
        lookup.set("A2", Value::Number(2.0));
        lookup.set("B1", Value::Number(10.0));
        assert_eq!(eval("=SUM(A1:A2, B1, 4)", &lookup), Value::Number(17.0));
    }

    #[test]
    fn test_blank_cells_contribute_zero() {
        let lookup = MapLookup::default();
        assert_eq!(eval("=SUM(A1:A3)", &lookup), Value::Number(0.0));
        assert_eq!(eval("=COUNT(A1:A3)", &lookup), Value::Number(3.0));
    }

    #[test]
    fn test_error_cell_propagates() {
        let mut lookup = MapLookup::default();
        lookup.set("B1", Value::Error(ErrorKind::NegativeSqrt));
        assert_eq!(eval("=SUM(B1, 5)", &lookup), Value::Error(ErrorKind::NegativeSqrt));
    }

    #[test]
    fn test_named_range_operand() {
        let mut lookup = MapLookup::default();
        lookup.set("A1", Value::Number(1.0));
        lookup.set("A2", Value::Number(2.0));
        lookup.set("A3", Value::Number(3.0));
        lookup
            .names
            .insert(NamedRange::new("Rev", SheetId::DEFAULT, Rect::new(0, 0, 1, 3)))
            .unwrap();
        assert_eq!(eval("=SUM(Rev)", &lookup), Value::Number(6.0));
        assert_eq!(eval("=SUM(rev)", &lookup), Value::Number(6.0));
    }

    #[test]
    fn test_unknown_name_is_error_value() {
        let lookup = MapLookup::default();
        assert_eq!(eval("=SUM(Missing)", &lookup), Value::Error(ErrorKind::UnknownName));
    }

    #[test]
    fn test_abs_with_multi_cell_named_range() {
        let mut lookup = MapLookup::default();
        lookup
            .names
            .insert(NamedRange::new("Pair", SheetId::DEFAULT, Rect::new(0, 0, 2, 1)))
            .unwrap();
        assert_eq!(eval("=ABS(Pair)", &lookup), Value::Error(ErrorKind::NotSingleCell));
    }

    #[test]
    fn test_if_with_text_branch() {
        let mut lookup = MapLookup::default();
        lookup.set("A1", Value::Number(1.0));
        lookup.set("B1", Value::Text("ok".into()));
        assert_eq!(eval("=IF(A1, B1, 0)", &lookup), Value::Text("ok".into()));
    }
}
