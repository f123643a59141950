// Built-in spreadsheet functions

use serde::{Deserialize, Serialize};

use super::eval::{ErrorKind, Operand, Value};

/// The built-in function set. Anything else is left unevaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Function {
    Sum,
    Average,
    Min,
    Max,
    Count,
    Product,
    If,
    Round,
    Power,
    Abs,
    Sqrt,
}

/// How many arguments a function takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    AtLeast(usize),
    Exactly(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::AtLeast(n) => count >= n,
            Arity::Exactly(n) => count == n,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (prefix, n) = match self {
            Arity::AtLeast(n) => ("at least ", *n),
            Arity::Exactly(n) => ("exactly ", *n),
        };
        let noun = if n == 1 { "argument" } else { "arguments" };
        write!(f, "{}{} {}", prefix, n, noun)
    }
}

impl Function {
    pub const ALL: [Function; 11] = [
        Function::Sum,
        Function::Average,
        Function::Min,
        Function::Max,
        Function::Count,
        Function::Product,
        Function::If,
        Function::Round,
        Function::Power,
        Function::Abs,
        Function::Sqrt,
    ];

    /// Look up a function by name (case-insensitive).
    /// This is the single source of truth for supported functions.
    pub fn from_name(name: &str) -> Option<Function> {
        let upper = name.to_ascii_uppercase();
        Function::ALL.iter().copied().find(|f| f.name() == upper)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sum => "SUM",
            Function::Average => "AVERAGE",
            Function::Min => "MIN",
            Function::Max => "MAX",
            Function::Count => "COUNT",
            Function::Product => "PRODUCT",
            Function::If => "IF",
            Function::Round => "ROUND",
            Function::Power => "POWER",
            Function::Abs => "ABS",
            Function::Sqrt => "SQRT",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Function::Sum
            | Function::Average
            | Function::Min
            | Function::Max
            | Function::Count
            | Function::Product => Arity::AtLeast(1),
            Function::If => Arity::Exactly(3),
            Function::Round | Function::Power => Arity::Exactly(2),
            Function::Abs | Function::Sqrt => Arity::Exactly(1),
        }
    }

    /// Functions whose argument must be one cell, never a range.
    pub fn requires_single_cell(self) -> bool {
        matches!(self, Function::Abs | Function::Sqrt)
    }

    /// Run the function over already-resolved operands.
    ///
    /// Arity has been checked by the parser; the error sentinel is the only
    /// failure channel here.
    pub(crate) fn apply(self, args: &[Operand]) -> Value {
        let result = match self {
            Function::Sum => numbers(args).map(|v| v.iter().sum()),
            Function::Average => numbers(args).and_then(|v| {
                if v.is_empty() {
                    Err(ErrorKind::EmptyOperands)
                } else {
                    Ok(v.iter().sum::<f64>() / v.len() as f64)
                }
            }),
            Function::Min => numbers(args).and_then(|v| {
                v.into_iter().reduce(f64::min).ok_or(ErrorKind::EmptyOperands)
            }),
            Function::Max => numbers(args).and_then(|v| {
                v.into_iter().reduce(f64::max).ok_or(ErrorKind::EmptyOperands)
            }),
            Function::Count => numbers(args).map(|v| v.len() as f64),
            Function::Product => numbers(args).map(|v| {
                if v.is_empty() {
                    0.0
                } else {
                    v.iter().product()
                }
            }),
            Function::If => return if_(args),
            Function::Round => round(args),
            Function::Power => first_number(&args[0])
                .and_then(|base| first_number(&args[1]).map(|exp| base.powf(exp))),
            Function::Abs => single_number(&args[0]).map(f64::abs),
            Function::Sqrt => single_number(&args[0]).and_then(|n| {
                if n < 0.0 {
                    Err(ErrorKind::NegativeSqrt)
                } else {
                    Ok(n.sqrt())
                }
            }),
        };

        match result {
            Ok(n) if n.is_finite() => Value::Number(n),
            Ok(_) => Value::Error(ErrorKind::InvalidNumber),
            Err(kind) => Value::Error(kind),
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Flatten all operands into one numeric list. Errors win over everything.
fn numbers(args: &[Operand]) -> Result<Vec<f64>, ErrorKind> {
    let mut out = Vec::new();
    for arg in args {
        for value in &arg.values {
            out.push(value.as_number()?);
        }
    }
    Ok(out)
}

/// First resolved value of an operand as a number; an empty operand is 0.
fn first_number(arg: &Operand) -> Result<f64, ErrorKind> {
    arg.values.first().map_or(Ok(0.0), Value::as_number)
}

fn single_number(arg: &Operand) -> Result<f64, ErrorKind> {
    match arg.values.as_slice() {
        [value] => value.as_number(),
        _ => Err(ErrorKind::NotSingleCell),
    }
}

fn round(args: &[Operand]) -> Result<f64, ErrorKind> {
    let value = first_number(&args[0])?;
    let digits = first_number(&args[1])?.trunc().clamp(-400.0, 400.0) as i32;
    // f64 carries ~15 significant decimal digits; beyond that rounding is a no-op.
    if digits > 15 {
        Ok(value)
    } else if digits < -308 {
        // Past the largest finite power of ten every f64 rounds to zero.
        Ok(0.0_f64.copysign(value))
    } else if digits >= 0 {
        let factor = 10_f64.powi(digits);
        Ok((value * factor).round() / factor)
    } else {
        let factor = 10_f64.powi(-digits);
        Ok((value / factor).round() * factor)
    }
}

fn if_(args: &[Operand]) -> Value {
    let condition = match first_number(&args[0]) {
        Ok(n) => n != 0.0,
        Err(kind) => return Value::Error(kind),
    };
    let branch = if condition { &args[1] } else { &args[2] };

    match branch.values.first() {
        None => Value::Number(0.0),
        Some(Value::Number(n)) => Value::Number(*n),
        Some(Value::Error(kind)) => Value::Error(*kind),
        Some(Value::Text(s)) | Some(Value::Literal(s)) => Value::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Operand {
        Operand::new(values.iter().map(|n| Value::Number(*n)).collect())
    }

    fn one(value: Value) -> Operand {
        Operand::new(vec![value])
    }

    #[test]
    fn test_from_name_case_insensitive() {
        assert_eq!(Function::from_name("sum"), Some(Function::Sum));
        assert_eq!(Function::from_name("Sqrt"), Some(Function::Sqrt));
        assert_eq!(Function::from_name("VLOOKUP"), None);
        assert_eq!(Function::from_name(""), None);
    }

    #[test]
    fn test_arity_table() {
        assert!(Function::Sum.arity().accepts(1));
        assert!(Function::Sum.arity().accepts(9));
        assert!(!Function::Sum.arity().accepts(0));
        assert!(Function::If.arity().accepts(3));
        assert!(!Function::If.arity().accepts(2));
        assert!(Function::Round.arity().accepts(2));
        assert!(!Function::Abs.arity().accepts(2));
        assert_eq!(Function::If.arity().to_string(), "exactly 3 arguments");
        assert_eq!(Function::Max.arity().to_string(), "at least 1 argument");
    }

    #[test]
    fn test_aggregates() {
        let args = [nums(&[1.0, 2.0]), nums(&[3.0])];
        assert_eq!(Function::Sum.apply(&args), Value::Number(6.0));
        assert_eq!(Function::Average.apply(&args), Value::Number(2.0));
        assert_eq!(Function::Min.apply(&args), Value::Number(1.0));
        assert_eq!(Function::Max.apply(&args), Value::Number(3.0));
        assert_eq!(Function::Count.apply(&args), Value::Number(3.0));
        assert_eq!(Function::Product.apply(&args), Value::Number(6.0));
    }

    #[test]
    fn test_empty_operands() {
        let args = [nums(&[])];
        assert_eq!(Function::Sum.apply(&args), Value::Number(0.0));
        assert_eq!(Function::Count.apply(&args), Value::Number(0.0));
        assert_eq!(Function::Product.apply(&args), Value::Number(0.0));
        assert_eq!(Function::Average.apply(&args), Value::Error(ErrorKind::EmptyOperands));
        assert_eq!(Function::Min.apply(&args), Value::Error(ErrorKind::EmptyOperands));
        assert_eq!(Function::Max.apply(&args), Value::Error(ErrorKind::EmptyOperands));
    }

    #[test]
    fn test_text_contributes_zero() {
        let args = [Operand::new(vec![Value::Number(4.0), Value::Text("x".into()), Value::blank()])];
        assert_eq!(Function::Sum.apply(&args), Value::Number(4.0));
        assert_eq!(Function::Count.apply(&args), Value::Number(3.0));
        assert_eq!(Function::Min.apply(&args), Value::Number(0.0));
    }

    #[test]
    fn test_error_operand_propagates() {
        let args = [nums(&[5.0]), one(Value::Error(ErrorKind::NegativeSqrt))];
        assert_eq!(Function::Sum.apply(&args), Value::Error(ErrorKind::NegativeSqrt));
        assert_eq!(Function::Count.apply(&args), Value::Error(ErrorKind::NegativeSqrt));
    }

    #[test]
    fn test_if_truthiness() {
        let f = |c: f64| Function::If.apply(&[nums(&[c]), nums(&[1.0]), nums(&[2.0])]);
        assert_eq!(f(0.0), Value::Number(2.0));
        assert_eq!(f(5.0), Value::Number(1.0));
        assert_eq!(f(-1.0), Value::Number(1.0));
    }

    #[test]
    fn test_if_text_branch_falls_back_to_raw_text() {
        let args = [nums(&[1.0]), one(Value::Text("yes".into())), nums(&[0.0])];
        assert_eq!(Function::If.apply(&args), Value::Text("yes".into()));
    }

    #[test]
    fn test_if_condition_uses_first_value() {
        let args = [nums(&[0.0, 9.0]), nums(&[1.0]), nums(&[2.0])];
        assert_eq!(Function::If.apply(&args), Value::Number(2.0));
    }

    #[test]
    fn test_if_error_condition() {
        let args = [one(Value::Error(ErrorKind::UnknownName)), nums(&[1.0]), nums(&[2.0])];
        assert_eq!(Function::If.apply(&args), Value::Error(ErrorKind::UnknownName));
    }

    #[test]
    fn test_round() {
        assert_eq!(Function::Round.apply(&[nums(&[3.14159]), nums(&[2.0])]), Value::Number(3.14));
        assert_eq!(Function::Round.apply(&[nums(&[2.5]), nums(&[0.0])]), Value::Number(3.0));
        assert_eq!(Function::Round.apply(&[nums(&[1.2345]), nums(&[2.9])]), Value::Number(1.23));
        assert_eq!(Function::Round.apply(&[nums(&[1234.0]), nums(&[-2.0])]), Value::Number(1200.0));
    }

    #[test]
    fn test_round_huge_negative_digits() {
        assert_eq!(Function::Round.apply(&[nums(&[1.0]), nums(&[-10_000_000_000.0])]), Value::Number(0.0));
        assert_eq!(Function::Round.apply(&[nums(&[5.0]), nums(&[-400.0])]), Value::Number(0.0));
        assert_eq!(Function::Round.apply(&[nums(&[5.0]), nums(&[-308.0])]), Value::Number(0.0));
        assert_eq!(Function::Round.apply(&[nums(&[5.0]), nums(&[1e12])]), Value::Number(5.0));
    }

    #[test]
    fn test_abs_sqrt_power() {
        assert_eq!(Function::Abs.apply(&[nums(&[-3.0])]), Value::Number(3.0));
        assert_eq!(Function::Sqrt.apply(&[nums(&[16.0])]), Value::Number(4.0));
        assert_eq!(Function::Sqrt.apply(&[nums(&[-4.0])]), Value::Error(ErrorKind::NegativeSqrt));
        assert_eq!(Function::Power.apply(&[nums(&[2.0]), nums(&[10.0])]), Value::Number(1024.0));
    }

    #[test]
    fn test_single_cell_rule() {
        assert_eq!(Function::Abs.apply(&[nums(&[1.0, 2.0])]), Value::Error(ErrorKind::NotSingleCell));
        assert_eq!(Function::Sqrt.apply(&[nums(&[])]), Value::Error(ErrorKind::NotSingleCell));
    }

    #[test]
    fn test_non_finite_result() {
        assert_eq!(
            Function::Power.apply(&[nums(&[-8.0]), nums(&[0.5])]),
            Value::Error(ErrorKind::InvalidNumber)
        );
        assert_eq!(
            Function::Product.apply(&[nums(&[f64::MAX, 10.0])]),
            Value::Error(ErrorKind::InvalidNumber)
        );
    }
}
