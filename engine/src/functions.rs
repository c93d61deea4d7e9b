//! FILENAME: engine/src/functions.rs
//! PURPOSE: The closed registry of callable formula functions.
//! CONTEXT: Only the names listed here may be invoked from an expression;
//! everything else fails closed with an UnknownFunction error. The
//! registry is deliberately small: arithmetic helpers, a truncating
//! round, sum over collections, and the guarded division the parser
//! rewrites "/" into.

use crate::error::EvalError;
use crate::value::Value;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Every callable function name, used by the formula resolver to validate
/// authored formulas before any unit exists.
pub const FUNCTION_WHITELIST: &[&str] = &["abs", "min", "max", "round", "sum", "div"];

/// Returns true if the name is a callable registry function.
pub fn is_whitelisted(name: &str) -> bool {
    FUNCTION_WHITELIST.contains(&name)
}

/// Invokes a registry function on already-evaluated arguments.
pub fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "abs" => call_abs(args),
        "min" => call_min_max(name, args, false),
        "max" => call_min_max(name, args, true),
        "round" => call_round(args),
        "sum" => call_sum(args),
        "div" => call_div(args),
        _ => Err(EvalError::UnknownFunction {
            name: name.to_string(),
        }),
    }
}

fn require_number(name: &str, value: &Value) -> Result<Decimal, EvalError> {
    value.as_number().ok_or_else(|| EvalError::TypeMismatch {
        expression: format!("{}(..)", name),
        message: format!("expected a number, got {}", value.as_text()),
    })
}

fn call_abs(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 1 {
        return Err(EvalError::ArityMismatch {
            name: "abs".to_string(),
            expected: "1".to_string(),
            actual: args.len(),
        });
    }
    let n = require_number("abs", &args[0])?;
    Ok(Value::Number(n.abs()))
}

/// min/max accept either a single list or two-or-more scalar arguments.
fn call_min_max(name: &str, args: &[Value], want_max: bool) -> Result<Value, EvalError> {
    let numbers = collect_numbers(name, args)?;
    if numbers.is_empty() {
        return Err(EvalError::ArityMismatch {
            name: name.to_string(),
            expected: "at least 1".to_string(),
            actual: 0,
        });
    }

    let mut best = numbers[0];
    for n in &numbers[1..] {
        if (want_max && *n > best) || (!want_max && *n < best) {
            best = *n;
        }
    }
    Ok(Value::Number(best))
}

/// Truncating round: round(x) drops the fraction, round(x, digits) keeps
/// the given number of decimal places without rounding up.
fn call_round(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [value] => {
            let n = require_number("round", value)?;
            Ok(Value::Number(n.trunc()))
        }
        [value, digits] => {
            let n = require_number("round", value)?;
            let d = require_number("round", digits)?;
            let scale = d.trunc().to_u32().unwrap_or(0);
            Ok(Value::Number(n.trunc_with_scale(scale)))
        }
        _ => Err(EvalError::ArityMismatch {
            name: "round".to_string(),
            expected: "1 or 2".to_string(),
            actual: args.len(),
        }),
    }
}

/// Sums a list argument or a run of scalar arguments; empty input is 0.
fn call_sum(args: &[Value]) -> Result<Value, EvalError> {
    let numbers = collect_numbers("sum", args)?;
    let total = numbers.iter().fold(Decimal::ZERO, |acc, n| acc + n);
    Ok(Value::Number(total))
}

/// Guarded division: a zero divisor yields 0 instead of raising.
/// The parser rewrites every "/" into this call.
fn call_div(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 2 {
        return Err(EvalError::ArityMismatch {
            name: "div".to_string(),
            expected: "2".to_string(),
            actual: args.len(),
        });
    }
    let numerand = require_number("div", &args[0])?;
    let divisor = require_number("div", &args[1])?;

    if divisor.is_zero() {
        return Ok(Value::Number(Decimal::ZERO));
    }
    Ok(Value::Number(numerand / divisor))
}

/// Flattens arguments into a number list: a single List argument spreads
/// into its elements, anything else must coerce to a number.
fn collect_numbers(name: &str, args: &[Value]) -> Result<Vec<Decimal>, EvalError> {
    let mut numbers = Vec::new();

    if let [Value::List(items)] = args {
        for item in items {
            numbers.push(require_number(name, item)?);
        }
        return Ok(numbers);
    }

    for arg in args {
        numbers.push(require_number(name, arg)?);
    }
    Ok(numbers)
}
