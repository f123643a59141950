// Formula parser - converts cell text into a single typed function call
// Grammar: "=" NAME "(" [arg ("," arg)*] ")" where arg is a number, A1, A1:B2, or a name

use crate::address::parse_range;
use crate::error::EngineError;

use super::functions::Function;

/// Result of parsing raw cell input.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Text not starting with `=`: a plain value.
    Constant,
    /// A formula naming a function we do not know. Displayed as typed, not evaluated.
    Unevaluated,
    /// A validated call of a built-in function.
    Call(FormulaCall),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormulaCall {
    pub function: Function,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Number(f64),
    /// A reference-shaped token as typed: `A1`, `A1:B3`, or a name.
    ///
    /// Kept unresolved so a named range defined later with the same spelling
    /// wins over the literal address.
    Reference(String),
}

impl Arg {
    pub fn is_range_literal(&self) -> bool {
        matches!(self, Arg::Reference(token) if token.contains(':'))
    }
}

impl FormulaCall {
    /// Reference tokens in argument order.
    pub fn references(&self) -> impl Iterator<Item = &str> + '_ {
        self.args.iter().filter_map(|arg| match arg {
            Arg::Reference(token) => Some(token.as_str()),
            Arg::Number(_) => None,
        })
    }
}

/// Parse raw cell input.
///
/// Plain text is `Constant`. A formula whose function name is unknown is
/// `Unevaluated` (in-progress input stays displayable). A known function with
/// malformed arguments is a `Syntax` error; a wrong argument count or a range
/// given to ABS/SQRT is an `Arity` error.
pub fn parse(input: &str) -> Result<ParseOutcome, EngineError> {
    let formula = input.trim();
    let Some(body) = formula.strip_prefix('=') else {
        return Ok(ParseOutcome::Constant);
    };

    // Only the name decides whether the rest must follow our grammar.
    let name = leading_ident(body);
    if name.is_empty() {
        return Err(if body.trim().is_empty() {
            EngineError::Syntax("empty formula".to_string())
        } else {
            EngineError::Syntax("expected a function name after '='".to_string())
        });
    }
    let Some(function) = Function::from_name(name) else {
        return Ok(ParseOutcome::Unevaluated);
    };

    let tokens = tokenize(body)?;
    let args = parse_call_args(&tokens[1..])?;
    check_arity(function, &args)?;
    Ok(ParseOutcome::Call(FormulaCall { function, args }))
}

/// The identifier at the start of a formula body, or "" if there is none.
fn leading_ident(body: &str) -> &str {
    let body = body.trim_start();
    if !body.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return "";
    }
    let end = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(body.len());
    &body[..end]
}

fn check_arity(function: Function, args: &[Arg]) -> Result<(), EngineError> {
    let arity = function.arity();
    if !arity.accepts(args.len()) {
        return Err(EngineError::Arity {
            function,
            reason: format!("expects {}, got {}", arity, args.len()),
        });
    }
    if function.requires_single_cell() {
        if let Some(Arg::Reference(token)) = args.iter().find(|a| a.is_range_literal()) {
            return Err(EngineError::Arity {
                function,
                reason: format!("argument must be a single cell, not the range {}", token),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    LParen,
    RParen,
    Colon,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EngineError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => { chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            ':' => { tokens.push(Token::Colon); chars.next(); }
            ',' => { tokens.push(Token::Comma); chars.next(); }
            'A'..='Z' | 'a'..='z' | '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '0'..='9' | '.' | '-' | '+' => {
                let mut num_str = String::new();
                if c == '-' || c == '+' {
                    num_str.push(c);
                    chars.next();
                }
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| EngineError::Syntax(format!("invalid number: {}", num_str)))?;
                tokens.push(Token::Number(num));
            }
            _ => return Err(EngineError::Syntax(format!("unexpected character: {}", c))),
        }
    }

    Ok(tokens)
}

/// Parse `( args )` that must end the formula.
fn parse_call_args(tokens: &[Token]) -> Result<Vec<Arg>, EngineError> {
    if tokens.first() != Some(&Token::LParen) {
        return Err(EngineError::Syntax("expected '(' after function name".to_string()));
    }

    let mut args = Vec::new();
    let mut pos = 1;

    // Empty call: SUM()
    if tokens.get(pos) == Some(&Token::RParen) {
        pos += 1;
    } else {
        loop {
            let (arg, next) = parse_arg(tokens, pos)?;
            args.push(arg);
            pos = next;

            match tokens.get(pos) {
                Some(Token::Comma) => pos += 1,
                Some(Token::RParen) => {
                    pos += 1;
                    break;
                }
                Some(_) => return Err(EngineError::Syntax("expected ',' or ')'".to_string())),
                None => return Err(EngineError::Syntax("missing closing parenthesis".to_string())),
            }
        }
    }

    if pos != tokens.len() {
        return Err(EngineError::Syntax(
            "unexpected input after closing parenthesis".to_string(),
        ));
    }
    Ok(args)
}

fn parse_arg(tokens: &[Token], pos: usize) -> Result<(Arg, usize), EngineError> {
    match tokens.get(pos) {
        Some(Token::Number(n)) => Ok((Arg::Number(*n), pos + 1)),
        Some(Token::Ident(start)) => {
            if tokens.get(pos + 1) == Some(&Token::Colon) {
                let Some(Token::Ident(end)) = tokens.get(pos + 2) else {
                    return Err(EngineError::Syntax(format!("incomplete range after {}:", start)));
                };
                let range = format!("{}:{}", start, end);
                if parse_range(&range).is_none() {
                    return Err(EngineError::Syntax(format!("invalid range: {}", range)));
                }
                Ok((Arg::Reference(range), pos + 3))
            } else {
                Ok((Arg::Reference(start.clone()), pos + 1))
            }
        }
        Some(Token::Comma) | Some(Token::RParen) => {
            Err(EngineError::Syntax("empty argument".to_string()))
        }
        Some(Token::LParen) => Err(EngineError::Syntax("nested expressions are not supported".to_string())),
        Some(Token::Colon) => Err(EngineError::Syntax("unexpected ':'".to_string())),
        None => Err(EngineError::Syntax("unexpected end of formula".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(formula: &str) -> FormulaCall {
        match parse(formula) {
            Ok(ParseOutcome::Call(call)) => call,
            other => panic!("expected call for {}, got {:?}", formula, other),
        }
    }

    fn reference(token: &str) -> Arg {
        Arg::Reference(token.to_string())
    }

    #[test]
    fn test_plain_text_is_constant() {
        assert_eq!(parse("hello").unwrap(), ParseOutcome::Constant);
        assert_eq!(parse("42").unwrap(), ParseOutcome::Constant);
        assert_eq!(parse("").unwrap(), ParseOutcome::Constant);
    }

    #[test]
    fn test_parse_sum_with_mixed_args() {
        let c = call("=SUM(A1:A3, B2, 5, Rev)");
        assert_eq!(c.function, Function::Sum);
        assert_eq!(
            c.args,
            vec![reference("A1:A3"), reference("B2"), Arg::Number(5.0), reference("Rev")]
        );
        assert_eq!(c.references().collect::<Vec<_>>(), vec!["A1:A3", "B2", "Rev"]);
    }

    #[test]
    fn test_function_name_case_insensitive() {
        assert_eq!(call("=sum(a1)").function, Function::Sum);
        assert_eq!(call("  =Round(1.5, 0)").function, Function::Round);
    }

    #[test]
    fn test_signed_and_decimal_numbers() {
        assert_eq!(call("=ABS(-3)").args, vec![Arg::Number(-3.0)]);
        assert_eq!(call("=ROUND(3.14159,2)").args, vec![Arg::Number(3.14159), Arg::Number(2.0)]);
        assert_eq!(call("=SUM(+.5)").args, vec![Arg::Number(0.5)]);
    }

    #[test]
    fn test_unknown_function_is_unevaluated() {
        assert_eq!(parse("=VLOOKUP(A1, B1:C3, 2)").unwrap(), ParseOutcome::Unevaluated);
        assert_eq!(parse("=SU").unwrap(), ParseOutcome::Unevaluated);
        assert_eq!(parse("=A1").unwrap(), ParseOutcome::Unevaluated);
    }

    #[test]
    fn test_unknown_function_body_is_not_tokenized() {
        for input in ["=VLOOKUP(A1;B1)", "=CONCAT(\"a\", B1)", "=IFERROR(A1/B1, 0)", "= TEXT(A1 & \"%\")", "=A1+B1"] {
            assert_eq!(parse(input).unwrap(), ParseOutcome::Unevaluated, "{}", input);
        }
        // Known functions still get the strict grammar.
        assert!(matches!(parse("=SUM(A1/B1)"), Err(EngineError::Syntax(_))));
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["=", "=5", "=(A1)", "=SUM(A1", "=SUM A1", "=SUM(A1,)", "=SUM(,A1)",
                    "=SUM(A1) + 1", "=SUM(A1:)", "=SUM(A1:Rev)", "=SUM((A1))", "=SUM(A1;B1)", "=SUM(1.2.3)"] {
            match parse(bad) {
                Err(EngineError::Syntax(_)) => {}
                other => panic!("expected syntax error for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_arity_errors() {
        for bad in ["=SUM()", "=IF(1,2)", "=IF(1,2,3,4)", "=ROUND(1)", "=POWER(1,2,3)", "=ABS()", "=SQRT(1,2)"] {
            match parse(bad) {
                Err(EngineError::Arity { .. }) => {}
                other => panic!("expected arity error for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_single_cell_functions_reject_range_literal() {
        let err = parse("=ABS(A1:A2)").unwrap_err();
        assert!(matches!(err, EngineError::Arity { function: Function::Abs, .. }));
        assert!(err.to_string().contains("single cell"));
        assert!(matches!(parse("=SQRT(B1:C1)"), Err(EngineError::Arity { .. })));
        // A name may still be a single cell; checked at evaluation.
        assert!(parse("=SQRT(Total)").is_ok());
    }

    #[test]
    fn test_dotted_names_are_one_token() {
        assert_eq!(call("=SUM(Sales.Q1)").args, vec![reference("Sales.Q1")]);
    }
}
