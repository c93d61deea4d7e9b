//! FILENAME: parser/src/tests.rs
//! PURPOSE: Consolidated unit tests for the parser crate.

use crate::ast::{BinaryOperator, BoolOperator, Expression, Literal, UnaryOperator};
use crate::dependency_extractor::extract_dependencies;
use crate::lexer::Lexer;
use crate::parser::parse;
use crate::token::Token;
use rust_decimal::Decimal;

fn num(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn name(s: &str) -> Expression {
    Expression::Name(s.to_string())
}

fn number(s: &str) -> Expression {
    Expression::Literal(Literal::Number(num(s)))
}

// ========================================
// LEXER TESTS
// ========================================

#[test]
fn lexer_tokenizes_simple_math() {
    let mut lexer = Lexer::new("1 + 2");

    assert_eq!(lexer.next_token(), Token::Number(num("1")));
    assert_eq!(lexer.next_token(), Token::Plus);
    assert_eq!(lexer.next_token(), Token::Number(num("2")));
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_tokenizes_functions() {
    let mut lexer = Lexer::new("sum(parts, 10)");

    assert_eq!(lexer.next_token(), Token::Identifier("sum".to_string()));
    assert_eq!(lexer.next_token(), Token::LParen);
    assert_eq!(lexer.next_token(), Token::Identifier("parts".to_string()));
    assert_eq!(lexer.next_token(), Token::Comma);
    assert_eq!(lexer.next_token(), Token::Number(num("10")));
    assert_eq!(lexer.next_token(), Token::RParen);
}

#[test]
fn lexer_handles_strings_in_both_quote_styles() {
    let mut lexer = Lexer::new("\"Hello\" 'World'");

    assert_eq!(lexer.next_token(), Token::String("Hello".to_string()));
    assert_eq!(lexer.next_token(), Token::String("World".to_string()));
}

#[test]
fn lexer_tokenizes_keywords() {
    let mut lexer = Lexer::new("true false none and or if else for in def return");

    assert_eq!(lexer.next_token(), Token::True);
    assert_eq!(lexer.next_token(), Token::False);
    assert_eq!(lexer.next_token(), Token::None);
    assert_eq!(lexer.next_token(), Token::And);
    assert_eq!(lexer.next_token(), Token::Or);
    assert_eq!(lexer.next_token(), Token::If);
    assert_eq!(lexer.next_token(), Token::Else);
    assert_eq!(lexer.next_token(), Token::For);
    assert_eq!(lexer.next_token(), Token::In);
    assert_eq!(lexer.next_token(), Token::Def);
    assert_eq!(lexer.next_token(), Token::Return);
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_keywords_are_case_sensitive() {
    let mut lexer = Lexer::new("True AND");
    assert_eq!(lexer.next_token(), Token::Identifier("True".to_string()));
    assert_eq!(lexer.next_token(), Token::Identifier("AND".to_string()));
}

#[test]
fn lexer_tokenizes_comparison_operators() {
    let mut lexer = Lexer::new("< > <= >= != ==");

    assert_eq!(lexer.next_token(), Token::LessThan);
    assert_eq!(lexer.next_token(), Token::GreaterThan);
    assert_eq!(lexer.next_token(), Token::LessEqual);
    assert_eq!(lexer.next_token(), Token::GreaterEqual);
    assert_eq!(lexer.next_token(), Token::NotEqual);
    assert_eq!(lexer.next_token(), Token::EqualEqual);
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_rejects_lone_equals() {
    let mut lexer = Lexer::new("a = b");
    assert_eq!(lexer.next_token(), Token::Identifier("a".to_string()));
    assert_eq!(lexer.next_token(), Token::Illegal('='));
}

#[test]
fn lexer_tokenizes_accessors() {
    let mut lexer = Lexer::new("row.amount[0]");

    assert_eq!(lexer.next_token(), Token::Identifier("row".to_string()));
    assert_eq!(lexer.next_token(), Token::Dot);
    assert_eq!(lexer.next_token(), Token::Identifier("amount".to_string()));
    assert_eq!(lexer.next_token(), Token::LBracket);
    assert_eq!(lexer.next_token(), Token::Number(num("0")));
    assert_eq!(lexer.next_token(), Token::RBracket);
}

#[test]
fn lexer_reads_decimal_numbers_exactly() {
    let mut lexer = Lexer::new("3.14159 .5");
    assert_eq!(lexer.next_token(), Token::Number(num("3.14159")));
    assert_eq!(lexer.next_token(), Token::Number(num("0.5")));
}

// ========================================
// PARSER TESTS - LITERALS
// ========================================

#[test]
fn parser_parses_number_literal() {
    let result = parse("42").unwrap();
    assert_eq!(result, number("42"));
}

#[test]
fn parser_parses_string_literal() {
    let result = parse("\"Hello World\"").unwrap();
    assert_eq!(
        result,
        Expression::Literal(Literal::Text("Hello World".to_string()))
    );
}

#[test]
fn parser_parses_boolean_and_none_literals() {
    assert_eq!(
        parse("true").unwrap(),
        Expression::Literal(Literal::Boolean(true))
    );
    assert_eq!(
        parse("false").unwrap(),
        Expression::Literal(Literal::Boolean(false))
    );
    assert_eq!(parse("none").unwrap(), Expression::Literal(Literal::None));
}

#[test]
fn parser_parses_name_reference() {
    assert_eq!(parse("total_weight").unwrap(), name("total_weight"));
}

// ========================================
// PARSER TESTS - OPERATORS & PRECEDENCE
// ========================================

#[test]
fn parser_parses_addition() {
    let result = parse("1 + 2").unwrap();
    assert_eq!(
        result,
        Expression::BinaryOp {
            left: Box::new(number("1")),
            op: BinaryOperator::Add,
            right: Box::new(number("2")),
        }
    );
}

#[test]
fn parser_multiplication_binds_tighter_than_addition() {
    let result = parse("1 + 2 * 3").unwrap();
    assert_eq!(
        result,
        Expression::BinaryOp {
            left: Box::new(number("1")),
            op: BinaryOperator::Add,
            right: Box::new(Expression::BinaryOp {
                left: Box::new(number("2")),
                op: BinaryOperator::Multiply,
                right: Box::new(number("3")),
            }),
        }
    );
}

#[test]
fn parser_rewrites_division_to_guarded_call() {
    let result = parse("a / b").unwrap();
    assert_eq!(
        result,
        Expression::FunctionCall {
            name: "div".to_string(),
            args: vec![name("a"), name("b")],
        }
    );
}

#[test]
fn parser_multiply_before_divide_left_to_right() {
    // price * quantity / 2 must parse as div(price * quantity, 2):
    // the product is the numerand of the guarded division.
    let result = parse("price * quantity / 2").unwrap();
    assert_eq!(
        result,
        Expression::FunctionCall {
            name: "div".to_string(),
            args: vec![
                Expression::BinaryOp {
                    left: Box::new(name("price")),
                    op: BinaryOperator::Multiply,
                    right: Box::new(name("quantity")),
                },
                number("2"),
            ],
        }
    );
}

#[test]
fn parser_parses_comparison() {
    let result = parse("qty >= 10").unwrap();
    assert_eq!(
        result,
        Expression::BinaryOp {
            left: Box::new(name("qty")),
            op: BinaryOperator::GreaterEqual,
            right: Box::new(number("10")),
        }
    );
}

#[test]
fn parser_comparison_binds_tighter_than_and() {
    let result = parse("a > 1 and b < 2").unwrap();
    match result {
        Expression::BoolOp { op, left, right } => {
            assert_eq!(op, BoolOperator::And);
            assert!(matches!(*left, Expression::BinaryOp { .. }));
            assert!(matches!(*right, Expression::BinaryOp { .. }));
        }
        other => panic!("Expected BoolOp, got {:?}", other),
    }
}

#[test]
fn parser_and_binds_tighter_than_or() {
    let result = parse("a or b and c").unwrap();
    match result {
        Expression::BoolOp { op, left, right } => {
            assert_eq!(op, BoolOperator::Or);
            assert_eq!(*left, name("a"));
            assert!(matches!(*right, Expression::BoolOp { .. }));
        }
        other => panic!("Expected BoolOp, got {:?}", other),
    }
}

#[test]
fn parser_parses_unary_operators() {
    assert_eq!(
        parse("-5").unwrap(),
        Expression::UnaryOp {
            op: UnaryOperator::Negate,
            operand: Box::new(number("5")),
        }
    );
    assert_eq!(
        parse("!done").unwrap(),
        Expression::UnaryOp {
            op: UnaryOperator::Not,
            operand: Box::new(name("done")),
        }
    );
    assert_eq!(
        parse("+x").unwrap(),
        Expression::UnaryOp {
            op: UnaryOperator::Plus,
            operand: Box::new(name("x")),
        }
    );
}

#[test]
fn parser_parses_parenthesized_expression() {
    let result = parse("(1 + 2) * 3").unwrap();
    assert_eq!(
        result,
        Expression::BinaryOp {
            left: Box::new(Expression::BinaryOp {
                left: Box::new(number("1")),
                op: BinaryOperator::Add,
                right: Box::new(number("2")),
            }),
            op: BinaryOperator::Multiply,
            right: Box::new(number("3")),
        }
    );
}

// ========================================
// PARSER TESTS - CALLS & ACCESSORS
// ========================================

#[test]
fn parser_parses_function_call() {
    let result = parse("round(price, 2)").unwrap();
    assert_eq!(
        result,
        Expression::FunctionCall {
            name: "round".to_string(),
            args: vec![name("price"), number("2")],
        }
    );
}

#[test]
fn parser_parses_empty_argument_list() {
    let result = parse("sum()").unwrap();
    assert_eq!(
        result,
        Expression::FunctionCall {
            name: "sum".to_string(),
            args: vec![],
        }
    );
}

#[test]
fn parser_parses_attribute_access() {
    let result = parse("article.weight").unwrap();
    assert_eq!(
        result,
        Expression::Attribute {
            value: Box::new(name("article")),
            attr: "weight".to_string(),
        }
    );
}

#[test]
fn parser_parses_chained_accessors() {
    let result = parse("row.amounts[0]").unwrap();
    assert_eq!(
        result,
        Expression::Subscript {
            value: Box::new(Expression::Attribute {
                value: Box::new(name("row")),
                attr: "amounts".to_string(),
            }),
            index: Box::new(number("0")),
        }
    );
}

#[test]
fn parser_parses_subscript_with_string_key() {
    let result = parse("row[\"amount\"]").unwrap();
    assert_eq!(
        result,
        Expression::Subscript {
            value: Box::new(name("row")),
            index: Box::new(Expression::Literal(Literal::Text("amount".to_string()))),
        }
    );
}

// ========================================
// PARSER TESTS - CONDITIONALS
// ========================================

#[test]
fn parser_parses_conditional() {
    let result = parse("a if cond else b").unwrap();
    assert_eq!(
        result,
        Expression::Conditional {
            condition: Box::new(name("cond")),
            then_expr: Box::new(name("a")),
            else_expr: Box::new(name("b")),
        }
    );
}

#[test]
fn parser_conditional_else_is_right_associative() {
    let result = parse("a if c1 else b if c2 else d").unwrap();
    match result {
        Expression::Conditional { else_expr, .. } => {
            assert!(matches!(*else_expr, Expression::Conditional { .. }));
        }
        other => panic!("Expected Conditional, got {:?}", other),
    }
}

// ========================================
// PARSER TESTS - COMPREHENSIONS
// ========================================

#[test]
fn parser_parses_comprehension() {
    let result = parse("[r.qty for r in group]").unwrap();
    assert_eq!(
        result,
        Expression::Comprehension {
            element: Box::new(Expression::Attribute {
                value: Box::new(name("r")),
                attr: "qty".to_string(),
            }),
            var: "r".to_string(),
            source: Box::new(name("group")),
        }
    );
}

#[test]
fn parser_parses_comprehension_inside_call() {
    let result = parse("sum([r.qty for r in group])").unwrap();
    match result {
        Expression::FunctionCall { name, args } => {
            assert_eq!(name, "sum");
            assert!(matches!(args[0], Expression::Comprehension { .. }));
        }
        other => panic!("Expected FunctionCall, got {:?}", other),
    }
}

#[test]
fn parser_rejects_nested_comprehension() {
    let err = parse("[[y for y in x] for x in rows]").unwrap_err();
    assert!(err.message.contains("nested"));
}

// ========================================
// PARSER TESTS - FUNCTION DEFINITIONS
// ========================================

#[test]
fn parser_parses_function_def() {
    let result = parse("def margin(price, cost): return price - cost").unwrap();
    assert_eq!(
        result,
        Expression::FunctionDef {
            name: "margin".to_string(),
            params: vec!["price".to_string(), "cost".to_string()],
            body: Box::new(Expression::BinaryOp {
                left: Box::new(name("price")),
                op: BinaryOperator::Subtract,
                right: Box::new(name("cost")),
            }),
        }
    );
}

#[test]
fn parser_parses_function_def_without_params() {
    let result = parse("def answer(): return 42").unwrap();
    assert_eq!(
        result,
        Expression::FunctionDef {
            name: "answer".to_string(),
            params: vec![],
            body: Box::new(number("42")),
        }
    );
}

#[test]
fn parser_rejects_nested_function_def() {
    assert!(parse("1 + def f(): return 2").is_err());
}

// ========================================
// PARSER TESTS - ERRORS
// ========================================

#[test]
fn parser_rejects_empty_input() {
    assert!(parse("").is_err());
    assert!(parse("   ").is_err());
}

#[test]
fn parser_rejects_trailing_tokens() {
    assert!(parse("1 + 2 3").is_err());
}

#[test]
fn parser_rejects_unclosed_paren() {
    assert!(parse("(1 + 2").is_err());
}

#[test]
fn parser_rejects_illegal_character() {
    let err = parse("1 # 2").unwrap_err();
    assert!(err.message.contains("Illegal"));
}

#[test]
fn parser_rejects_missing_operand() {
    assert!(parse("1 +").is_err());
    assert!(parse("* 2").is_err());
}

// ========================================
// DISPLAY RENDERING
// ========================================

#[test]
fn display_renders_binary_with_parens_for_compound_operands() {
    let expr = parse("(price + tax) * qty").unwrap();
    assert_eq!(expr.to_string(), "(price + tax) * qty");
}

#[test]
fn display_renders_division_as_guarded_call() {
    let expr = parse("a / b").unwrap();
    assert_eq!(expr.to_string(), "div(a, b)");
}

#[test]
fn display_renders_comprehension() {
    let expr = parse("[r.qty for r in group]").unwrap();
    assert_eq!(expr.to_string(), "[r.qty for r in group]");
}

// ========================================
// DEPENDENCY EXTRACTION
// ========================================

#[test]
fn extractor_collects_names_and_functions() {
    let expr = parse("round(price * quantity, 2)").unwrap();
    let refs = extract_dependencies(&expr);

    assert!(refs.names.contains("price"));
    assert!(refs.names.contains("quantity"));
    assert!(refs.functions.contains("round"));
    assert_eq!(refs.names.len(), 2);
}

#[test]
fn extractor_excludes_comprehension_variable() {
    let expr = parse("sum([r.qty for r in group])").unwrap();
    let refs = extract_dependencies(&expr);

    assert!(refs.names.contains("group"));
    assert!(!refs.names.contains("r"));
    assert!(refs.functions.contains("sum"));
}

#[test]
fn extractor_keeps_def_params_as_external_names() {
    let expr = parse("def margin(price, cost): return price - cost").unwrap();
    let refs = extract_dependencies(&expr);

    assert!(refs.names.contains("price"));
    assert!(refs.names.contains("cost"));
    assert!(!refs.names.contains("margin"));
}

#[test]
fn extractor_sees_division_as_div_call() {
    let expr = parse("a / b").unwrap();
    let refs = extract_dependencies(&expr);
    assert!(refs.functions.contains("div"));
}
