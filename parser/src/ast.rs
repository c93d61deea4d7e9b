//! FILENAME: parser/src/ast.rs
//! PURPOSE: Defines the Abstract Syntax Tree (AST) for formula expressions.
//! CONTEXT: After the Lexer tokenizes a formula string, the Parser converts
//! those tokens into this tree structure. The Evaluator then traverses
//! this tree to compute the final result.
//!
//! SUPPORTED EXPRESSIONS:
//! - Literals: Numbers (decimal), Strings, Booleans, none
//! - Name references: price, total_weight
//! - Binary operations: +, -, *, ==, !=, <, >, <=, >=
//! - Boolean operations: and, or (short-circuit)
//! - Unary operations: - + !
//! - Function calls: sum(parts), round(price, 2)
//! - Attribute access: article.weight
//! - Subscript access: row["amount"], items[0]
//! - Conditionals: a if cond else b
//! - Comprehensions (single level): [r.qty for r in group]
//! - Bounded function definitions: def margin(price, cost): return price - cost
//!
//! Division never appears in a parsed tree: the parser rewrites `a / b`
//! into the guarded builtin call `div(a, b)` which yields 0 for a zero
//! divisor instead of raising.

use rust_decimal::Decimal;

/// Represents a parsed formula expression.
/// This is the core data structure that the evaluator will traverse.
#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    /// A literal value: number, string, boolean, or none.
    Literal(Literal),

    /// A reference to a named value in the evaluation scope.
    Name(String),

    /// A unary operation: op operand (e.g., -5, !done).
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// A binary operation: left op right (e.g., 5 + 3, qty > 10).
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    /// A short-circuit boolean operation: left and/or right.
    BoolOp {
        left: Box<Expression>,
        op: BoolOperator,
        right: Box<Expression>,
    },

    /// A call to a whitelisted function like sum(parts) or round(x, 2).
    /// The name is resolved against the closed registry at evaluation time.
    FunctionCall { name: String, args: Vec<Expression> },

    /// Attribute access like article.weight.
    Attribute {
        value: Box<Expression>,
        attr: String,
    },

    /// Subscript access like row["amount"] or items[0].
    Subscript {
        value: Box<Expression>,
        index: Box<Expression>,
    },

    /// A conditional expression: then_expr if condition else else_expr.
    /// Exactly one branch is evaluated.
    Conditional {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },

    /// A single-level comprehension: [element for var in source].
    Comprehension {
        element: Box<Expression>,
        var: String,
        source: Box<Expression>,
    },

    /// A bounded function definition: def name(params): return body.
    /// Parameters are resolved from the evaluation scope by name; the
    /// defined name is not callable (the function registry stays closed).
    FunctionDef {
        name: String,
        params: Vec<String>,
        body: Box<Expression>,
    },
}

/// Literal values that can appear in formulas.
#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Number(Decimal),
    Text(String),
    Boolean(bool),
    None,
}

/// Binary operators for expressions.
/// There is deliberately no Divide: division is rewritten at parse time.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOperator {
    Add,      // +
    Subtract, // -
    Multiply, // *

    // Comparison operators
    Equal,        // ==
    NotEqual,     // !=
    LessThan,     // <
    GreaterThan,  // >
    LessEqual,    // <=
    GreaterEqual, // >=
}

/// Short-circuit boolean operators.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BoolOperator {
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOperator {
    Negate, // -
    Plus,   // +
    Not,    // !
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOperator::Add => write!(f, "+"),
            BinaryOperator::Subtract => write!(f, "-"),
            BinaryOperator::Multiply => write!(f, "*"),
            BinaryOperator::Equal => write!(f, "=="),
            BinaryOperator::NotEqual => write!(f, "!="),
            BinaryOperator::LessThan => write!(f, "<"),
            BinaryOperator::GreaterThan => write!(f, ">"),
            BinaryOperator::LessEqual => write!(f, "<="),
            BinaryOperator::GreaterEqual => write!(f, ">="),
        }
    }
}

impl std::fmt::Display for BoolOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoolOperator::And => write!(f, "and"),
            BoolOperator::Or => write!(f, "or"),
        }
    }
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Plus => write!(f, "+"),
            UnaryOperator::Not => write!(f, "!"),
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Text(s) => write!(f, "\"{}\"", s),
            Literal::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Literal::None => write!(f, "none"),
        }
    }
}

impl Expression {
    /// Returns true if this node needs parentheses when rendered as an
    /// operand of a surrounding operator.
    fn is_compound(&self) -> bool {
        matches!(
            self,
            Expression::BinaryOp { .. }
                | Expression::BoolOp { .. }
                | Expression::Conditional { .. }
        )
    }
}

/// Renders an operand, parenthesized if compound. Used by the Display impl
/// so traces stay readable without tracking full precedence.
fn fmt_operand(expr: &Expression, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if expr.is_compound() {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(lit) => write!(f, "{}", lit),
            Expression::Name(name) => write!(f, "{}", name),
            Expression::UnaryOp { op, operand } => {
                write!(f, "{}", op)?;
                fmt_operand(operand, f)
            }
            Expression::BinaryOp { left, op, right } => {
                fmt_operand(left, f)?;
                write!(f, " {} ", op)?;
                fmt_operand(right, f)
            }
            Expression::BoolOp { left, op, right } => {
                fmt_operand(left, f)?;
                write!(f, " {} ", op)?;
                fmt_operand(right, f)
            }
            Expression::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Attribute { value, attr } => {
                fmt_operand(value, f)?;
                write!(f, ".{}", attr)
            }
            Expression::Subscript { value, index } => {
                fmt_operand(value, f)?;
                write!(f, "[{}]", index)
            }
            Expression::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                fmt_operand(then_expr, f)?;
                write!(f, " if ")?;
                fmt_operand(condition, f)?;
                write!(f, " else ")?;
                fmt_operand(else_expr, f)
            }
            Expression::Comprehension {
                element,
                var,
                source,
            } => {
                write!(f, "[{} for {} in {}]", element, var, source)
            }
            Expression::FunctionDef { name, params, body } => {
                write!(f, "def {}(", name)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, "): return {}", body)
            }
        }
    }
}
