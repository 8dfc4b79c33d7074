//! Arithmetic tool
//!
//! Evaluates `+ - * /` expressions with parentheses. Input is checked
//! against a fixed character set before anything is parsed.

use serde_json::{json, Value};
use thiserror::Error;

use crate::core::ToolDefinition;
use crate::tools::{ToolContext, ToolHandler};

/// Deepest parenthesis / unary nesting accepted
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum CalcError {
    #[error("expression is empty")]
    Empty,
    #[error("character '{0}' is not allowed; use digits, + - * / . ( ) and spaces")]
    ForbiddenCharacter(char),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected '{0}'")]
    Unexpected(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("division by zero")]
    DivisionByZero,
    #[error("expression nests too deeply")]
    TooDeep,
    #[error("result is not a finite number")]
    NotFinite,
}

/// Whether a character may appear in an expression
pub fn is_allowed(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '+' | '-' | '*' | '/' | '.' | '(' | ')') || c.is_whitespace()
}

/// Evaluate an arithmetic expression
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    if let Some(bad) = expression.chars().find(|c| !is_allowed(*c)) {
        return Err(CalcError::ForbiddenCharacter(bad));
    }

    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(CalcError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr(0)?;
    if let Some(token) = parser.peek() {
        return Err(CalcError::Unexpected(token.to_string()));
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

/// JSON number for a result, integral values without a fraction
pub fn number_to_json(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{}", n),
            Token::Op(c) => write!(f, "{}", c),
            Token::Open => f.write_str("("),
            Token::Close => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| CalcError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Num(value));
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            op => {
                tokens.push(Token::Op(op));
                i += 1;
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expr(&mut self, depth: usize) -> Result<f64, CalcError> {
        let mut value = self.term(depth)?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term(depth)?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self, depth: usize) -> Result<f64, CalcError> {
        let mut value = self.factor(depth)?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.factor(depth)?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self, depth: usize) -> Result<f64, CalcError> {
        if depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Op('-')) => Ok(-self.factor(depth + 1)?),
            Some(Token::Op('+')) => self.factor(depth + 1),
            Some(Token::Open) => {
                let value = self.expr(depth + 1)?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    Some(other) => Err(CalcError::Unexpected(other.to_string())),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(other) => Err(CalcError::Unexpected(other.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

/// The `calculator` tool
#[derive(Debug, Clone, Default)]
pub struct Calculator;

impl ToolHandler for Calculator {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "calculator",
            "Evaluate an arithmetic expression using + - * / and parentheses",
            json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "Expression to evaluate, e.g. (2 + 3) * 4"
                    }
                },
                "required": ["expression"]
            }),
        )
    }

    fn call(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, String> {
        let expression = args
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| "expression must be a string".to_string())?;
        evaluate(expression)
            .map(number_to_json)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(evaluate("5*7").unwrap(), 35.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
        assert_eq!(evaluate("-(3 - 5)").unwrap(), 2.0);
        assert_eq!(evaluate("8 - 2 - 1").unwrap(), 5.0);
    }

    #[test]
    fn test_forbidden_characters_never_evaluate() {
        for input in ["1+1; rm -rf", "Math.max(1)", "2**3a", "x", "1,5", "2^3"] {
            assert!(matches!(
                evaluate(input),
                Err(CalcError::ForbiddenCharacter(_))
            ), "{input}");
        }
    }

    #[test]
    fn test_malformed_expressions() {
        assert_eq!(evaluate("   "), Err(CalcError::Empty));
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("(1 + 2"), Err(CalcError::UnexpectedEnd));
        assert!(evaluate("1..2").is_err());
        assert!(evaluate("1 2").is_err());
        assert!(evaluate("*3").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let expr = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(evaluate(&expr), Err(CalcError::TooDeep));
    }

    #[test]
    fn test_tool_returns_integral_json() {
        let ctx = ToolContext::default();
        let result = Calculator.call(&json!({"expression": "5*7"}), &ctx).unwrap();
        assert_eq!(result, json!(35));
        let result = Calculator.call(&json!({"expression": "1/4"}), &ctx).unwrap();
        assert_eq!(result, json!(0.25));
    }
}
