//! Arithmetic expression tool.
//!
//! A small recursive-descent evaluator over `f64`:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('**' unary)?
//! primary := number | name | name '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! `**` binds tighter than unary minus, so `-2**2` is `-4`.

use async_trait::async_trait;

use crate::error::ToolError;
use crate::state::ToolArgs;
use crate::tools::{require_str, Tool, ToolDescriptor, ToolParam};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ToolError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
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
                // Exponent only when digits follow; a bare `e` is the constant.
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ToolError::InvalidArguments(format!("bad number '{}'", text)))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '^' => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '+' | '-' | '*' | '/' | '%' | '(' | ')' | ',' => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    _ => Token::Comma,
                });
                i += 1;
            }
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

/// Deepest nesting of parentheses, calls, signs and exponents accepted.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ToolError> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(ToolError::InvalidArguments(format!(
                "expected {:?}, found {:?}",
                expected, t
            ))),
            None => Err(ToolError::InvalidArguments(format!(
                "expected {:?}, found end of input",
                expected
            ))),
        }
    }

    /// Run `f` one nesting level deeper, refusing past [`MAX_DEPTH`].
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ToolError>,
    ) -> Result<T, ToolError> {
        if self.depth >= MAX_DEPTH {
            return Err(ToolError::InvalidArguments(
                "expression nested too deeply".into(),
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<f64, ToolError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ToolError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(ToolError::Failed("division by zero".into()));
                    }
                    value /= rhs;
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(ToolError::Failed("modulo by zero".into()));
                    }
                    // Sign follows the divisor.
                    value = value - rhs * (value / rhs).floor();
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, ToolError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.nested(Self::unary)?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, ToolError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exponent = self.nested(Self::unary)?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, ToolError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => self.nested(|p| {
                let value = p.expr()?;
                p.expect(Token::RParen)?;
                Ok(value)
            }),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.nested(|p| {
                        let mut args = vec![p.expr()?];
                        while p.peek() == Some(&Token::Comma) {
                            p.pos += 1;
                            args.push(p.expr()?);
                        }
                        p.expect(Token::RParen)?;
                        Ok(args)
                    })?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(t) => Err(ToolError::InvalidArguments(format!("unexpected {:?}", t))),
            None => Err(ToolError::InvalidArguments("unexpected end of input".into())),
        }
    }
}

fn constant(name: &str) -> Result<f64, ToolError> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        "tau" => Ok(std::f64::consts::TAU),
        _ => Err(ToolError::InvalidArguments(format!("unknown name: {}", name))),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, ToolError> {
    let arity = |n: usize| -> Result<(), ToolError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments(format!(
                "{}() takes {} argument(s), got {}",
                name,
                n,
                args.len()
            )))
        }
    };

    let x = args[0];
    match name {
        "log" if args.len() == 2 => Ok(x.ln() / args[1].ln()),
        "pow" => {
            arity(2)?;
            Ok(x.powf(args[1]))
        }
        _ => {
            arity(1)?;
            let value = match name {
                "sqrt" => x.sqrt(),
                "sin" => x.sin(),
                "cos" => x.cos(),
                "tan" => x.tan(),
                "asin" => x.asin(),
                "acos" => x.acos(),
                "atan" => x.atan(),
                "log" | "ln" => x.ln(),
                "log10" => x.log10(),
                "log2" => x.log2(),
                "exp" => x.exp(),
                "abs" | "fabs" => x.abs(),
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                "round" => x.round(),
                _ => {
                    return Err(ToolError::InvalidArguments(format!(
                        "unknown name: {}",
                        name
                    )))
                }
            };
            Ok(value)
        }
    }
}

/// Evaluate `expression`. Non-finite results are errors.
pub fn evaluate(expression: &str) -> Result<f64, ToolError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(ToolError::InvalidArguments("empty expression".into()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(t) = parser.peek() {
        return Err(ToolError::InvalidArguments(format!("unexpected {:?}", t)));
    }
    if !value.is_finite() {
        return Err(ToolError::Failed("math domain error".into()));
    }
    Ok(value)
}

/// Integral results print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub struct CalculatorTool {
    descriptor: ToolDescriptor,
}

impl CalculatorTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "calculator",
                "Tính toán biểu thức toán học cơ bản (hàm math, + - * / **). Tham số: expression.",
            )
            .param(ToolParam::required("expression", "Biểu thức cần tính")),
        }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: &ToolArgs) -> Result<String, ToolError> {
        let expression = require_str(args, "expression")?;
        evaluate(&expression).map(format_number)
    }
}
