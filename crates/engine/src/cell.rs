use serde::{Deserialize, Serialize};

use crate::formula::eval::{ErrorKind, Value};
use crate::formula::parser::{self, FormulaCall, ParseOutcome};

/// Everything the engine stores for one non-blank cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    /// Input exactly as the user typed it.
    pub raw_input: String,
    /// The trimmed formula text when the input starts with `=`.
    pub formula: Option<String>,
    /// Last computed value.
    pub value: Value,
    #[serde(skip)]
    pub(crate) call: Option<FormulaCall>,
}

impl CellRecord {
    /// Build a record from raw input and its parse outcome.
    ///
    /// The value is provisional for formulas: the recalculation pass that
    /// follows every edit overwrites it.
    pub(crate) fn new(raw_input: &str, outcome: ParseOutcome) -> Self {
        let trimmed = raw_input.trim();
        let formula = trimmed.starts_with('=').then(|| trimmed.to_string());
        let call = match outcome {
            ParseOutcome::Call(call) => Some(call),
            ParseOutcome::Constant | ParseOutcome::Unevaluated => None,
        };
        let mut record = Self {
            raw_input: raw_input.to_string(),
            formula,
            value: Value::blank(),
            call,
        };
        record.value = record.input_value();
        record
    }

    /// Re-parse a record (e.g. after deserializing, where the call is skipped).
    pub fn from_input(raw_input: &str) -> Result<Self, crate::error::EngineError> {
        Ok(Self::new(raw_input, parser::parse(raw_input)?))
    }

    /// Value of a cell that is not evaluated: a constant, or a formula naming
    /// an unknown function (shown as typed). Evaluated formulas yield blank.
    pub fn input_value(&self) -> Value {
        match (&self.formula, &self.call) {
            (_, Some(_)) => Value::blank(),
            (Some(_), None) => Value::Literal(self.raw_input.clone()),
            (None, None) => Value::from_input(&self.raw_input),
        }
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// True when the formula names a built-in function and will be evaluated.
    pub fn is_evaluated_formula(&self) -> bool {
        self.call.is_some()
    }

    pub fn call(&self) -> Option<&FormulaCall> {
        self.call.as_ref()
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.value.error_kind()
    }

    pub fn display_value(&self) -> String {
        self.value.to_display()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_input() {
        let record = CellRecord::from_input("42").unwrap();
        assert_eq!(record.value, Value::Number(42.0));
        assert!(!record.is_formula());
        assert_eq!(record.error(), None);
    }

    #[test]
    fn test_text_input_keeps_raw() {
        let record = CellRecord::from_input(" hello ").unwrap();
        assert_eq!(record.value, Value::Text(" hello ".into()));
        assert_eq!(record.raw_input, " hello ");
    }

    #[test]
    fn test_formula_input() {
        let record = CellRecord::from_input(" =SUM(A1:A3) ").unwrap();
        assert_eq!(record.formula.as_deref(), Some("=SUM(A1:A3)"));
        assert!(record.is_evaluated_formula());
    }

    #[test]
    fn test_unknown_function_is_literal() {
        let record = CellRecord::from_input("=VLOOKUP(A1)").unwrap();
        assert!(record.is_formula());
        assert!(!record.is_evaluated_formula());
        assert_eq!(record.value, Value::Literal("=VLOOKUP(A1)".into()));
        assert_eq!(record.display_value(), "=VLOOKUP(A1)");
        assert_eq!(record.input_value(), record.value);
    }

    #[test]
    fn test_malformed_formula_rejected() {
        assert!(CellRecord::from_input("=SUM(").is_err());
    }
}
