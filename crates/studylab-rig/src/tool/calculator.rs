//! Arithmetic calculator tool.
//!
//! Expressions are evaluated by a small recursive-descent parser over
//! `f64`. Supported syntax: numbers, `+ - * /`, `//` (floor division),
//! `**` (power), unary signs and parentheses.

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::Deserialize;

use super::ToolError;

/// Tracing target for calculator evaluations.
const TRACING_TARGET: &str = "studylab_rig::tool::calculator";

/// Characters allowed besides ASCII digits.
const OPERATORS: &str = "+-*/().";

const ERR_CHARACTERS: &str =
    "错误：表达式包含不允许的字符。只支持数字和基本运算符 (+, -, *, /, ())";
const ERR_PARENTHESES: &str = "错误：括号不匹配";
const ERR_DIVISION_BY_ZERO: &str = "错误：除数不能为零";

/// Maximum nesting of parentheses and unary signs.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Deserialize)]
pub struct CalculatorArgs {
    /// Expression to evaluate, e.g. `(10 + 5) * 3`.
    pub expression: String,
}

/// Evaluates basic arithmetic expressions.
///
/// Invalid input is reported in the output text rather than as a tool error,
/// so the model can read the message and correct itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalculatorTool;

impl Tool for CalculatorTool {
    type Args = CalculatorArgs;
    type Error = ToolError;
    type Output = String;

    const NAME: &'static str = "calculator";

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "计算数学表达式。支持加法(+)、减法(-)、乘法(*)、除法(/)和括号()，\
                          例如 \"2 + 2\" 或 \"(10 + 5) * 3\"。"
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "要计算的数学表达式"
                    }
                },
                "required": ["expression"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(calculate(&args.expression))
    }
}

/// Evaluates `expression` and formats the answer as `<expression> = <value>`.
pub fn calculate(expression: &str) -> String {
    let compact: String = expression.chars().filter(|c| *c != ' ').collect();

    let allowed = |c: char| c.is_ascii_digit() || OPERATORS.contains(c);
    if compact.is_empty() || !compact.chars().all(allowed) {
        return ERR_CHARACTERS.to_owned();
    }
    if compact.matches('(').count() != compact.matches(')').count() {
        return ERR_PARENTHESES.to_owned();
    }

    match evaluate(&compact) {
        Ok(value) => {
            let result = format!("{expression} = {}", format_number(value));
            tracing::debug!(target: TRACING_TARGET, %result, "evaluated expression");
            result
        }
        Err(EvalError::DivisionByZero) => ERR_DIVISION_BY_ZERO.to_owned(),
        Err(EvalError::Invalid(reason)) => {
            tracing::warn!(target: TRACING_TARGET, expression, %reason, "evaluation failed");
            format!("错误：计算失败 - {reason}")
        }
    }
}

/// Prints integral values without a fractional part, others rounded to
/// 10 decimal places.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    if value.fract() == 0.0 {
        return format!("{value:.0}");
    }

    let rounded = (value * 1e10).round() / 1e10;
    format!("{rounded}")
}

#[derive(Debug, PartialEq)]
enum EvalError {
    DivisionByZero,
    Invalid(String),
}

fn evaluate(input: &str) -> Result<f64, EvalError> {
    let mut parser = Parser {
        bytes: input.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expression()?;
    if parser.pos != parser.bytes.len() {
        return Err(EvalError::Invalid(format!(
            "unexpected '{}' at position {}",
            parser.bytes[parser.pos] as char,
            parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(EvalError::Invalid("result is out of range".into()));
    }
    Ok(value)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.bytes[self.pos..].starts_with(token.as_bytes()) {
            self.pos += token.len();
            return true;
        }
        false
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<f64, EvalError> {
        let mut value = self.term()?;
        loop {
            if self.eat("+") {
                value += self.term()?;
            } else if self.eat("-") {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    // term := unary (('*' | '/' | '//') unary)*
    fn term(&mut self) -> Result<f64, EvalError> {
        let mut value = self.unary()?;
        loop {
            if self.peek() == Some(b'*') && !self.bytes[self.pos..].starts_with(b"**") {
                self.pos += 1;
                value *= self.unary()?;
            } else if self.eat("//") {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                value = (value / divisor).floor();
            } else if self.eat("/") {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                value /= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    // Every recursive rule passes through here.
    fn unary(&mut self) -> Result<f64, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::Invalid(format!(
                "expression is nested deeper than {MAX_DEPTH} levels"
            )));
        }

        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    // unary := ('+' | '-') unary | power
    fn signed(&mut self) -> Result<f64, EvalError> {
        if self.eat("-") {
            return Ok(-self.unary()?);
        }
        if self.eat("+") {
            return self.unary();
        }
        self.power()
    }

    // power := atom ('**' unary)?
    fn power(&mut self) -> Result<f64, EvalError> {
        let base = self.atom()?;
        if self.eat("**") {
            let exponent = self.unary()?;
            if base == 0.0 && exponent < 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // atom := number | '(' expression ')'
    fn atom(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.expression()?;
                if !self.eat(")") {
                    return Err(EvalError::Invalid("missing closing parenthesis".into()));
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(EvalError::Invalid(format!(
                "unexpected '{}' at position {}",
                c as char, self.pos
            ))),
            None => Err(EvalError::Invalid("unexpected end of expression".into())),
        }
    }

    fn number(&mut self) -> Result<f64, EvalError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'.') {
            self.pos += 1;
        }

        let literal = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| EvalError::Invalid("invalid number".into()))?;
        if literal == "." {
            return Err(EvalError::Invalid("invalid number '.'".into()));
        }
        literal
            .parse::<f64>()
            .map_err(|_| EvalError::Invalid(format!("invalid number '{literal}'")))
    }
}
