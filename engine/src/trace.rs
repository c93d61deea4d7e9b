//! FILENAME: engine/src/trace.rs
//! PURPOSE: Renders human-readable calculation traces for formula units.
//! CONTEXT: Alongside every computed formula value the engine records how
//! the value was derived: the authored expression, the same expression
//! with its names replaced by the values they resolved to, and the
//! result. Traces are deterministic for identical inputs and are cached
//! (and persisted) together with the value.

use crate::scope::Scope;
use crate::value::Value;
use parser::ast::Expression;

/// Builds the trace for one computed formula:
/// "price * quantity = 10 * 0 = 0".
pub fn build_trace(expr: &Expression, scope: &Scope, result: &Value) -> String {
    format!(
        "{} = {} = {}",
        expr,
        render_substituted(expr, scope),
        result.as_text()
    )
}

/// Renders an expression with every resolvable name replaced by its value.
/// Unresolvable names render as written (they were an error upstream).
fn render_substituted(expr: &Expression, scope: &Scope) -> String {
    match expr {
        Expression::Literal(lit) => lit.to_string(),

        Expression::Name(name) => match scope.get(name) {
            Some(value) => value.as_text(),
            None => name.clone(),
        },

        Expression::UnaryOp { op, operand } => {
            format!("{}{}", op, operand_text(operand, scope))
        }

        Expression::BinaryOp { left, op, right } => format!(
            "{} {} {}",
            operand_text(left, scope),
            op,
            operand_text(right, scope)
        ),

        Expression::BoolOp { left, op, right } => format!(
            "{} {} {}",
            operand_text(left, scope),
            op,
            operand_text(right, scope)
        ),

        Expression::FunctionCall { name, args } => {
            let rendered: Vec<String> =
                args.iter().map(|a| render_substituted(a, scope)).collect();
            format!("{}({})", name, rendered.join(", "))
        }

        Expression::Attribute { value, attr } => {
            format!("{}.{}", operand_text(value, scope), attr)
        }

        Expression::Subscript { value, index } => format!(
            "{}[{}]",
            operand_text(value, scope),
            render_substituted(index, scope)
        ),

        Expression::Conditional {
            condition,
            then_expr,
            else_expr,
        } => format!(
            "{} if {} else {}",
            operand_text(then_expr, scope),
            operand_text(condition, scope),
            operand_text(else_expr, scope)
        ),

        Expression::Comprehension {
            element,
            var,
            source,
        } => format!(
            "[{} for {} in {}]",
            element,
            var,
            render_substituted(source, scope)
        ),

        Expression::FunctionDef { body, .. } => render_substituted(body, scope),
    }
}

/// Parenthesizes compound operands the same way the AST Display does.
fn operand_text(expr: &Expression, scope: &Scope) -> String {
    let rendered = render_substituted(expr, scope);
    match expr {
        Expression::BinaryOp { .. }
        | Expression::BoolOp { .. }
        | Expression::Conditional { .. } => format!("({})", rendered),
        _ => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::evaluate;
    use parser::parse;

    fn num(s: &str) -> Value {
        Value::Number(s.parse().unwrap())
    }

    #[test]
    fn trace_shows_expression_bindings_and_result() {
        let expr = parse("price * quantity").unwrap();
        let mut scope = Scope::new();
        scope.set("price", num("10"));
        scope.set("quantity", num("0"));

        let result = evaluate(&expr, &scope).unwrap();
        let trace = build_trace(&expr, &scope, &result);

        assert_eq!(trace, "price * quantity = 10 * 0 = 0");
    }

    #[test]
    fn trace_renders_division_as_guarded_call() {
        let expr = parse("total / count").unwrap();
        let mut scope = Scope::new();
        scope.set("total", num("9"));
        scope.set("count", num("0"));

        let result = evaluate(&expr, &scope).unwrap();
        let trace = build_trace(&expr, &scope, &result);

        assert_eq!(trace, "div(total, count) = div(9, 0) = 0");
    }

    #[test]
    fn trace_is_deterministic() {
        let expr = parse("a + b").unwrap();
        let mut scope = Scope::new();
        scope.set("a", num("1"));
        scope.set("b", num("2"));

        let result = evaluate(&expr, &scope).unwrap();
        let first = build_trace(&expr, &scope, &result);
        for _ in 0..5 {
            assert_eq!(build_trace(&expr, &scope, &result), first);
        }
    }
}
