//! Calculator tool: evaluates arithmetic expressions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr   = term (('+' | '-') term)*
//! term   = power (('*' | '/' | '%') power)*
//! power  = unary ('^' power)?
//! unary  = '-' unary | atom
//! atom   = NUMBER | '(' expr ')'
//! ```

use std::iter::Peekable;
use std::str::Chars;

use async_trait::async_trait;
use steward_core::error::ToolError;
use steward_core::tool::{Tool, ToolOutput};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("expected ')'")]
    UnclosedParen,

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,
}

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Calculate the value of an arithmetic expression. Supports + - * / % ^, parentheses and decimals."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        match evaluate(expr) {
            Ok(value) => Ok(ToolOutput::ok(format_number(value))
                .with_data(serde_json::json!({ "result": value }))),
            Err(e) => Ok(ToolOutput::failed(format!("Cannot evaluate '{expr}': {e}"))),
        }
    }
}

/// Whole numbers print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    let mut parser = Parser {
        chars: expr.chars().peekable(),
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if let Some(c) = parser.chars.next() {
        return Err(CalcError::UnexpectedChar(c));
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn peek_op(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.peek().copied()
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut left = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek_op() {
            self.chars.next();
            let right = self.term()?;
            if op == '+' {
                left += right;
            } else {
                left -= right;
            }
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut left = self.power()?;
        while let Some(op @ ('*' | '/' | '%')) = self.peek_op() {
            self.chars.next();
            let right = self.power()?;
            left = match op {
                '*' => left * right,
                _ if right == 0.0 => return Err(CalcError::DivisionByZero),
                '/' => left / right,
                _ => left % right,
            };
        }
        Ok(left)
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.unary()?;
        if self.peek_op() == Some('^') {
            self.chars.next();
            let exponent = self.power()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        if self.peek_op() == Some('-') {
            self.chars.next();
            return Ok(-self.unary()?);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<f64, CalcError> {
        match self.peek_op() {
            Some('(') => {
                self.chars.next();
                let value = self.expr()?;
                match self.peek_op() {
                    Some(')') => {
                        self.chars.next();
                        Ok(value)
                    }
                    _ => Err(CalcError::UnclosedParen),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(d) = self.chars.next_if(|d| d.is_ascii_digit() || *d == '.') {
                    literal.push(d);
                }
                literal
                    .parse()
                    .map_err(|_| CalcError::InvalidNumber(literal))
            }
            Some(c) => Err(CalcError::UnexpectedChar(c)),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}
