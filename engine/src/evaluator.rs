//! FILENAME: engine/src/evaluator.rs
//! PURPOSE: Evaluates AST expressions against a scope to compute values.
//! CONTEXT: After a formula is parsed into an AST, this module traverses
//! the tree and computes the final result. It handles name lookups,
//! decimal arithmetic, comparisons, short-circuit boolean logic,
//! accessors, conditionals, comprehensions, and calls into the closed
//! function registry.
//!
//! SUPPORTED FEATURES:
//! - Literal evaluation: Numbers (decimal), Strings, Booleans, none
//! - Name lookup from the Scope (unknown names are evaluation errors)
//! - Binary operations: +, -, *, ==, !=, <, >, <=, >=
//! - Unary operations: - + !
//! - Boolean and/or with short-circuit on truthiness
//! - Functions: abs, min, max, round, sum, div (guarded division)
//! - Attribute/subscript access on Maps and Lists
//! - Conditionals evaluating exactly one branch
//! - Single-level comprehensions in a copy-then-extend child scope
//! - Bounded function definitions (body evaluated, params from scope)
//!
//! Evaluation is referentially transparent: the same expression and scope
//! always produce the same value, which is what makes unit memoization
//! sound.

use crate::error::EvalError;
use crate::functions;
use crate::scope::Scope;
use crate::value::Value;
use parser::ast::{BinaryOperator, BoolOperator, Expression, Literal, UnaryOperator};
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;

/// Evaluates an expression against a scope.
pub fn evaluate(expr: &Expression, scope: &Scope) -> Result<Value, EvalError> {
    match expr {
        Expression::Literal(lit) => Ok(eval_literal(lit)),
        Expression::Name(name) => eval_name(name, scope, expr),
        Expression::UnaryOp { op, operand } => eval_unary_op(*op, operand, scope),
        Expression::BinaryOp { left, op, right } => eval_binary_op(left, *op, right, scope),
        Expression::BoolOp { left, op, right } => eval_bool_op(left, *op, right, scope),
        Expression::FunctionCall { name, args } => eval_function_call(name, args, scope),
        Expression::Attribute { value, attr } => eval_attribute(value, attr, scope, expr),
        Expression::Subscript { value, index } => eval_subscript(value, index, scope, expr),
        Expression::Conditional {
            condition,
            then_expr,
            else_expr,
        } => eval_conditional(condition, then_expr, else_expr, scope),
        Expression::Comprehension {
            element,
            var,
            source,
        } => eval_comprehension(element, var, source, scope, expr),
        // A def wrapper evaluates its body directly; parameters resolve
        // from the enclosing scope by name.
        Expression::FunctionDef { body, .. } => evaluate(body, scope),
    }
}

/// Evaluates a literal value.
fn eval_literal(lit: &Literal) -> Value {
    match lit {
        Literal::Number(n) => Value::Number(*n),
        Literal::Text(s) => Value::Text(s.clone()),
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::None => Value::None,
    }
}

/// Looks a name up in the scope.
fn eval_name(name: &str, scope: &Scope, expr: &Expression) -> Result<Value, EvalError> {
    match scope.get(name) {
        Some(value) => Ok(value.clone()),
        None => Err(EvalError::UnknownName {
            name: name.to_string(),
            expression: expr.to_string(),
        }),
    }
}

/// Evaluates a unary operation.
fn eval_unary_op(
    op: UnaryOperator,
    operand: &Expression,
    scope: &Scope,
) -> Result<Value, EvalError> {
    let value = evaluate(operand, scope)?;

    match op {
        UnaryOperator::Negate => {
            let n = value
                .as_number()
                .ok_or_else(|| EvalError::type_mismatch(operand, "cannot negate a non-number"))?;
            Ok(Value::Number(-n))
        }
        UnaryOperator::Plus => {
            let n = value.as_number().ok_or_else(|| {
                EvalError::type_mismatch(operand, "unary + applies only to numbers")
            })?;
            Ok(Value::Number(n))
        }
        UnaryOperator::Not => Ok(Value::Boolean(!value.is_truthy())),
    }
}

/// Evaluates a binary operation.
fn eval_binary_op(
    left: &Expression,
    op: BinaryOperator,
    right: &Expression,
    scope: &Scope,
) -> Result<Value, EvalError> {
    let lhs = evaluate(left, scope)?;
    let rhs = evaluate(right, scope)?;

    match op {
        BinaryOperator::Add => eval_add(left, &lhs, &rhs),
        BinaryOperator::Subtract => {
            let (a, b) = numeric_pair(left, right, &lhs, &rhs)?;
            Ok(Value::Number(a - b))
        }
        BinaryOperator::Multiply => {
            let (a, b) = numeric_pair(left, right, &lhs, &rhs)?;
            Ok(Value::Number(a * b))
        }
        BinaryOperator::Equal => Ok(Value::Boolean(values_equal(&lhs, &rhs))),
        BinaryOperator::NotEqual => Ok(Value::Boolean(!values_equal(&lhs, &rhs))),
        BinaryOperator::LessThan => compare(left, &lhs, &rhs).map(|o| Value::Boolean(o == Ordering::Less)),
        BinaryOperator::GreaterThan => {
            compare(left, &lhs, &rhs).map(|o| Value::Boolean(o == Ordering::Greater))
        }
        BinaryOperator::LessEqual => {
            compare(left, &lhs, &rhs).map(|o| Value::Boolean(o != Ordering::Greater))
        }
        BinaryOperator::GreaterEqual => {
            compare(left, &lhs, &rhs).map(|o| Value::Boolean(o != Ordering::Less))
        }
    }
}

/// Addition: numbers add, two texts concatenate.
fn eval_add(context: &Expression, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    if let (Value::Text(a), Value::Text(b)) = (lhs, rhs) {
        return Ok(Value::Text(format!("{}{}", a, b)));
    }

    match (lhs.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => Ok(Value::Number(a + b)),
        _ => Err(EvalError::type_mismatch(
            context,
            format!("cannot add {} and {}", lhs.as_text(), rhs.as_text()),
        )),
    }
}

/// Coerces both operands of an arithmetic operator to numbers.
fn numeric_pair(
    left: &Expression,
    right: &Expression,
    lhs: &Value,
    rhs: &Value,
) -> Result<(rust_decimal::Decimal, rust_decimal::Decimal), EvalError> {
    let a = lhs
        .as_number()
        .ok_or_else(|| EvalError::type_mismatch(left, "expected a number"))?;
    let b = rhs
        .as_number()
        .ok_or_else(|| EvalError::type_mismatch(right, "expected a number"))?;
    Ok((a, b))
}

/// Equality is total: values of different variants are simply not equal.
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    lhs == rhs
}

/// Ordering comparisons work within a type: numbers numerically, texts
/// lexically, booleans false < true. Mixing types is an error.
fn compare(context: &Expression, lhs: &Value, rhs: &Value) -> Result<Ordering, EvalError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
        _ => Err(EvalError::type_mismatch(
            context,
            format!(
                "cannot order {} against {}",
                lhs.as_text(),
                rhs.as_text()
            ),
        )),
    }
}

/// Evaluates a short-circuit boolean operation.
fn eval_bool_op(
    left: &Expression,
    op: BoolOperator,
    right: &Expression,
    scope: &Scope,
) -> Result<Value, EvalError> {
    let lhs = evaluate(left, scope)?.is_truthy();

    match op {
        BoolOperator::And => {
            if !lhs {
                return Ok(Value::Boolean(false));
            }
        }
        BoolOperator::Or => {
            if lhs {
                return Ok(Value::Boolean(true));
            }
        }
    }

    let rhs = evaluate(right, scope)?.is_truthy();
    Ok(Value::Boolean(rhs))
}

/// Evaluates a call against the closed function registry.
fn eval_function_call(
    name: &str,
    args: &[Expression],
    scope: &Scope,
) -> Result<Value, EvalError> {
    let mut evaluated = Vec::with_capacity(args.len());
    for arg in args {
        evaluated.push(evaluate(arg, scope)?);
    }
    functions::call(name, &evaluated)
}

/// Attribute access: the value must be a Map carrying the attribute.
fn eval_attribute(
    value: &Expression,
    attr: &str,
    scope: &Scope,
    expr: &Expression,
) -> Result<Value, EvalError> {
    let target = evaluate(value, scope)?;

    match target {
        Value::Map(map) => map.get(attr).cloned().ok_or_else(|| {
            EvalError::type_mismatch(expr, format!("no attribute '{}'", attr))
        }),
        other => Err(EvalError::type_mismatch(
            expr,
            format!("cannot read attribute '{}' of {}", attr, other.as_text()),
        )),
    }
}

/// Subscript access: Maps take string keys, Lists take integer indices.
fn eval_subscript(
    value: &Expression,
    index: &Expression,
    scope: &Scope,
    expr: &Expression,
) -> Result<Value, EvalError> {
    let target = evaluate(value, scope)?;
    let key = evaluate(index, scope)?;

    match (&target, &key) {
        (Value::Map(map), Value::Text(name)) => map.get(name).cloned().ok_or_else(|| {
            EvalError::type_mismatch(expr, format!("no key '{}'", name))
        }),
        (Value::List(items), Value::Number(n)) => {
            let idx = n.to_usize().ok_or_else(|| {
                EvalError::type_mismatch(expr, format!("invalid index {}", n))
            })?;
            items.get(idx).cloned().ok_or_else(|| {
                EvalError::type_mismatch(expr, format!("index {} out of bounds", idx))
            })
        }
        _ => Err(EvalError::type_mismatch(
            expr,
            format!(
                "cannot subscript {} with {}",
                target.as_text(),
                key.as_text()
            ),
        )),
    }
}

/// Evaluates a conditional; exactly one branch runs.
fn eval_conditional(
    condition: &Expression,
    then_expr: &Expression,
    else_expr: &Expression,
    scope: &Scope,
) -> Result<Value, EvalError> {
    if evaluate(condition, scope)?.is_truthy() {
        evaluate(then_expr, scope)
    } else {
        evaluate(else_expr, scope)
    }
}

/// Evaluates a single-level comprehension over a List source.
fn eval_comprehension(
    element: &Expression,
    var: &str,
    source: &Expression,
    scope: &Scope,
    expr: &Expression,
) -> Result<Value, EvalError> {
    let items = match evaluate(source, scope)? {
        Value::List(items) => items,
        other => {
            return Err(EvalError::type_mismatch(
                expr,
                format!("comprehension source must be a list, got {}", other.as_text()),
            ))
        }
    };

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let child = scope.child(var.to_string(), item);
        results.push(evaluate(element, &child)?);
    }
    Ok(Value::List(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::parse;
    use std::collections::BTreeMap;

    fn num(s: &str) -> Value {
        Value::Number(s.parse().unwrap())
    }

    fn eval(input: &str, scope: &Scope) -> Result<Value, EvalError> {
        evaluate(&parse(input).unwrap(), scope)
    }

    #[test]
    fn evaluates_arithmetic_with_decimal_precision() {
        let scope = Scope::new();
        assert_eq!(eval("0.1 + 0.2", &scope).unwrap(), num("0.3"));
        assert_eq!(eval("2 * 3 + 4", &scope).unwrap(), num("10"));
    }

    #[test]
    fn divide_by_zero_is_zero_not_an_error() {
        let mut scope = Scope::new();
        scope.set("a", num("10"));
        scope.set("b", num("0"));
        assert_eq!(eval("a / b", &scope).unwrap(), num("0"));
    }

    #[test]
    fn multiplication_binds_before_division() {
        // price * quantity / 2 with quantity=0 must be 0 through the
        // product being the numerand, not through the divisor guard.
        let mut scope = Scope::new();
        scope.set("price", num("10"));
        scope.set("quantity", num("0"));
        assert_eq!(eval("price * quantity / 2", &scope).unwrap(), num("0"));

        // Sanity: same shape with a nonzero product halves it.
        scope.set("quantity", num("6"));
        assert_eq!(eval("price * quantity / 2", &scope).unwrap(), num("30"));
    }

    #[test]
    fn unknown_name_is_an_evaluation_error() {
        let scope = Scope::new();
        let err = eval("missing + 1", &scope).unwrap_err();
        match err {
            EvalError::UnknownName { name, .. } => assert_eq!(name, "missing"),
            other => panic!("Expected UnknownName, got {:?}", other),
        }
    }

    #[test]
    fn text_concatenation_with_plus() {
        let scope = Scope::new();
        assert_eq!(
            eval("\"foo\" + \"bar\"", &scope).unwrap(),
            Value::Text("foobar".to_string())
        );
    }

    #[test]
    fn comparisons_and_boolean_logic() {
        let mut scope = Scope::new();
        scope.set("qty", num("5"));

        assert_eq!(eval("qty > 3 and qty < 10", &scope).unwrap(), Value::Boolean(true));
        assert_eq!(eval("qty < 3 or qty == 5", &scope).unwrap(), Value::Boolean(true));
        assert_eq!(eval("!(qty == 5)", &scope).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        // "missing" is unbound; short-circuit must never evaluate it.
        let scope = Scope::new();
        assert_eq!(eval("false and missing", &scope).unwrap(), Value::Boolean(false));
        assert_eq!(eval("true or missing", &scope).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn conditional_evaluates_one_branch_only() {
        let mut scope = Scope::new();
        scope.set("flag", Value::Boolean(true));
        // The else branch references an unbound name and must not run.
        assert_eq!(eval("1 if flag else missing", &scope).unwrap(), num("1"));
    }

    #[test]
    fn attribute_and_subscript_access() {
        let mut attrs = BTreeMap::new();
        attrs.insert("weight".to_string(), num("12.5"));
        let mut scope = Scope::new();
        scope.set("article", Value::Map(attrs));
        scope.set("items", Value::List(vec![num("1"), num("2")]));

        assert_eq!(eval("article.weight", &scope).unwrap(), num("12.5"));
        assert_eq!(eval("article[\"weight\"]", &scope).unwrap(), num("12.5"));
        assert_eq!(eval("items[1]", &scope).unwrap(), num("2"));
    }

    #[test]
    fn comprehension_maps_over_a_list() {
        let mut scope = Scope::new();
        scope.set("items", Value::List(vec![num("1"), num("2"), num("3")]));

        assert_eq!(
            eval("[x * 2 for x in items]", &scope).unwrap(),
            Value::List(vec![num("2"), num("4"), num("6")])
        );
        assert_eq!(eval("sum([x * 2 for x in items])", &scope).unwrap(), num("12"));
    }

    #[test]
    fn comprehension_variable_does_not_leak() {
        let mut scope = Scope::new();
        scope.set("items", Value::List(vec![num("1")]));

        let _ = eval("[x for x in items]", &scope).unwrap();
        assert!(!scope.contains("x"));
    }

    #[test]
    fn function_def_evaluates_body_against_scope() {
        let mut scope = Scope::new();
        scope.set("price", num("10"));
        scope.set("cost", num("4"));

        assert_eq!(
            eval("def margin(price, cost): return price - cost", &scope).unwrap(),
            num("6")
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let mut scope = Scope::new();
        scope.set("a", num("7"));
        let expr = parse("a * 3 + a / 2").unwrap();

        let first = evaluate(&expr, &scope).unwrap();
        for _ in 0..10 {
            assert_eq!(evaluate(&expr, &scope).unwrap(), first);
        }
    }
}
