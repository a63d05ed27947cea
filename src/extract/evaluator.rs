//! Restricted evaluator for function-wrapped state payloads
//!
//! Some frameworks serialize state as an immediately-invoked function so that
//! repeated values can be passed once as arguments:
//!
//! ```text
//! (function(a,b){return {layout:"default",data:[{title:a}],error:b}}("Home",null))
//! ```
//!
//! This module interprets exactly that shape and nothing more. The function
//! body must be a single `return` statement, and both the returned expression
//! and the call arguments may only build literal values: objects (quoted or
//! bare keys), arrays, strings, numbers, `true`, `false`, `null`,
//! `undefined`, `void 0`, `!0` / `!1` style negation, and references to the
//! function's parameters. Anything else is rejected with an [`EvalError`].
//! No script is ever executed. Nesting is bounded by [`MAX_STATE_DEPTH`].

use crate::state::{value_depth, MAX_STATE_DEPTH};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Why a function-wrapped payload could not be evaluated
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected character '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("expected {expected} at offset {offset}")]
    Expected { expected: &'static str, offset: usize },

    #[error("function body must be a single return statement")]
    UnsupportedBody,

    #[error("function is defined but never called")]
    NotInvoked,

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),

    #[error("trailing input at offset {0}")]
    TrailingInput(usize),

    #[error("nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Literal expression tree, resolved against parameter bindings after parsing
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Undefined,
    Null,
    Bool(bool),
    Number(f64, Option<i64>),
    Str(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Ident(String),
    Not(Box<Expr>),
}

/// Evaluates an immediately-invoked function expression to its return value
///
/// Accepted call shapes:
/// - `(function(a){return ...})(1)`
/// - `(function(a){return ...}(1))`
/// - `function(a){return ...}(1)`
///
/// A trailing `;` is allowed. Parameters without a matching argument are
/// `undefined`; object members whose value is `undefined` are dropped and
/// array elements become `null`, as `JSON.stringify` would do.
pub fn evaluate_function_call(source: &str) -> Result<Value, EvalError> {
    let mut parser = Parser::new(source);

    parser.skip_ws();
    let wrapped = parser.eat('(');
    parser.skip_ws();
    parser.expect_keyword("function")?;
    parser.skip_ws();
    // Named function expressions are fine; the name is irrelevant
    if parser.peek().is_some_and(is_ident_start) {
        parser.parse_identifier()?;
    }
    let params = parser.parse_params()?;
    let body = parser.parse_body()?;

    let args = if wrapped {
        parser.skip_ws();
        if parser.eat(')') {
            // (function(){...})(args)
            parser.skip_ws();
            if parser.peek() != Some('(') {
                return Err(EvalError::NotInvoked);
            }
            parser.parse_args()?
        } else {
            // (function(){...}(args))
            let args = parser.parse_args()?;
            parser.skip_ws();
            parser.expect(')')?;
            args
        }
    } else {
        parser.skip_ws();
        if parser.peek() != Some('(') {
            return Err(EvalError::NotInvoked);
        }
        parser.parse_args()?
    };

    parser.skip_ws();
    parser.eat(';');
    parser.skip_ws();
    if let Some(offset) = parser.remaining_offset() {
        return Err(EvalError::TrailingInput(offset));
    }

    let empty = HashMap::new();
    let mut bindings = HashMap::with_capacity(params.len());
    for (index, name) in params.into_iter().enumerate() {
        let value = match args.get(index) {
            Some(arg) => resolve(arg, &empty)?,
            None => None,
        };
        bindings.insert(name, value);
    }

    let value = resolve(&body, &bindings)?.unwrap_or(Value::Null);
    // Parameters can nest one bounded tree inside another
    if value_depth(&value) > MAX_STATE_DEPTH {
        return Err(EvalError::TooDeep(MAX_STATE_DEPTH));
    }
    Ok(value)
}

/// Resolves an expression; `None` stands for `undefined`
fn resolve(
    expr: &Expr,
    bindings: &HashMap<String, Option<Value>>,
) -> Result<Option<Value>, EvalError> {
    let value = match expr {
        Expr::Undefined => return Ok(None),
        Expr::Null => Value::Null,
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Number(f, int) => match int {
            Some(i) => Value::Number(Number::from(*i)),
            None => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        },
        Expr::Str(s) => Value::String(s.clone()),
        Expr::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(resolve(item, bindings)?.unwrap_or(Value::Null));
            }
            Value::Array(values)
        }
        Expr::Object(members) => {
            let mut map = Map::new();
            for (key, member) in members {
                if let Some(value) = resolve(member, bindings)? {
                    map.insert(key.clone(), value);
                }
            }
            Value::Object(map)
        }
        Expr::Ident(name) => {
            return bindings
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownIdentifier(name.clone()));
        }
        Expr::Not(inner) => Value::Bool(!is_truthy(resolve(inner, bindings)?.as_ref())),
    };
    Ok(Some(value))
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    /// Runs `parse` one nesting level down
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.depth >= MAX_STATE_DEPTH {
            return Err(EvalError::TooDeep(MAX_STATE_DEPTH));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Result<char, EvalError> {
        let c = self.peek().ok_or(EvalError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), EvalError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(EvalError::Unexpected {
                found,
                offset: self.pos,
            }),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn remaining_offset(&self) -> Option<usize> {
        (self.pos < self.chars.len()).then_some(self.pos)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn expect_keyword(&mut self, keyword: &'static str) -> Result<(), EvalError> {
        let start = self.pos;
        let word = self.parse_identifier().map_err(|_| EvalError::Expected {
            expected: keyword,
            offset: start,
        })?;
        if word != keyword {
            return Err(EvalError::Expected {
                expected: keyword,
                offset: start,
            });
        }
        Ok(())
    }

    fn parse_identifier(&mut self) -> Result<String, EvalError> {
        match self.peek() {
            Some(c) if is_ident_start(c) => {}
            Some(found) => {
                return Err(EvalError::Unexpected {
                    found,
                    offset: self.pos,
                })
            }
            None => return Err(EvalError::UnexpectedEnd),
        }

        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    /// `(a, b, c)`
    fn parse_params(&mut self) -> Result<Vec<String>, EvalError> {
        self.expect('(')?;
        let mut params = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(')') {
                return Ok(params);
            }
            params.push(self.parse_identifier()?);
            self.skip_ws();
            if !self.eat(',') {
                self.skip_ws();
                self.expect(')')?;
                return Ok(params);
            }
        }
    }

    /// `{ return <expr>; }`
    fn parse_body(&mut self) -> Result<Expr, EvalError> {
        self.skip_ws();
        self.expect('{')?;
        self.skip_ws();
        if self.expect_keyword("return").is_err() {
            return Err(EvalError::UnsupportedBody);
        }
        let expr = self.parse_expr()?;
        self.skip_ws();
        self.eat(';');
        self.skip_ws();
        if !self.eat('}') {
            return Err(EvalError::UnsupportedBody);
        }
        Ok(expr)
    }

    /// `(expr, expr, ...)`
    fn parse_args(&mut self) -> Result<Vec<Expr>, EvalError> {
        self.expect('(')?;
        let mut args = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(')') {
                return Ok(args);
            }
            args.push(self.parse_expr()?);
            self.skip_ws();
            if !self.eat(',') {
                self.skip_ws();
                self.expect(')')?;
                return Ok(args);
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.skip_ws();
        let c = self.peek().ok_or(EvalError::UnexpectedEnd)?;
        match c {
            '{' => self.nested(Self::parse_object),
            '[' => self.nested(Self::parse_array),
            '"' | '\'' => Ok(Expr::Str(self.parse_string()?)),
            '!' => {
                self.pos += 1;
                let inner = self.nested(Self::parse_expr)?;
                Ok(Expr::Not(Box::new(inner)))
            }
            '-' | '+' | '.' | '0'..='9' => self.parse_number(),
            c if is_ident_start(c) => self.parse_word(),
            found => Err(EvalError::Unexpected {
                found,
                offset: self.pos,
            }),
        }
    }

    fn parse_word(&mut self) -> Result<Expr, EvalError> {
        let word = self.parse_identifier()?;
        Ok(match word.as_str() {
            "true" => Expr::Bool(true),
            "false" => Expr::Bool(false),
            "null" => Expr::Null,
            "undefined" => Expr::Undefined,
            // JSON.stringify turns non-finite numbers into null
            "NaN" | "Infinity" => Expr::Null,
            "void" => {
                self.nested(Self::parse_expr)?;
                Expr::Undefined
            }
            _ => Expr::Ident(word),
        })
    }

    fn parse_object(&mut self) -> Result<Expr, EvalError> {
        self.expect('{')?;
        let mut members = Vec::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Ok(Expr::Object(members));
            }

            let key = match self.peek() {
                Some('"') | Some('\'') => self.parse_string()?,
                Some(c) if c.is_ascii_digit() => {
                    let start = self.pos;
                    while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                        self.pos += 1;
                    }
                    self.chars[start..self.pos].iter().collect()
                }
                Some(c) if is_ident_start(c) => self.parse_identifier()?,
                Some(found) => {
                    return Err(EvalError::Unexpected {
                        found,
                        offset: self.pos,
                    })
                }
                None => return Err(EvalError::UnexpectedEnd),
            };

            self.skip_ws();
            self.expect(':')?;
            let value = self.parse_expr()?;
            members.push((key, value));

            self.skip_ws();
            if !self.eat(',') {
                self.skip_ws();
                self.expect('}')?;
                return Ok(Expr::Object(members));
            }
        }
    }

    fn parse_array(&mut self) -> Result<Expr, EvalError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(']') {
                return Ok(Expr::Array(items));
            }
            items.push(self.parse_expr()?);
            self.skip_ws();
            if !self.eat(',') {
                self.skip_ws();
                self.expect(']')?;
                return Ok(Expr::Array(items));
            }
        }
    }

    fn parse_number(&mut self) -> Result<Expr, EvalError> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.pos += 1;
                true
            }
            Some('+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos].iter().collect();
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| EvalError::InvalidNumber(self.slice_from(start)))?;
            let value = if negative { -value } else { value };
            return Ok(Expr::Number(value as f64, Some(value)));
        }

        let digits_start = self.pos;
        let mut is_integer = true;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' => is_integer = false,
                'e' | 'E' => {
                    is_integer = false;
                    if matches!(self.peek_at(1), Some('+') | Some('-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }

        let literal: String = self.chars[digits_start..self.pos].iter().collect();
        if literal.is_empty() {
            // `-Infinity` and friends
            if self.peek().is_some_and(is_ident_start) {
                return match self.parse_word()? {
                    Expr::Null => Ok(Expr::Null),
                    _ => Err(EvalError::InvalidNumber(self.slice_from(start))),
                };
            }
            return Err(EvalError::InvalidNumber(self.slice_from(start)));
        }

        let parsed: f64 = literal
            .parse()
            .map_err(|_| EvalError::InvalidNumber(self.slice_from(start)))?;
        let value = if negative { -parsed } else { parsed };

        let int = if is_integer {
            literal
                .parse::<i64>()
                .ok()
                .map(|i| if negative { -i } else { i })
        } else {
            None
        };

        Ok(Expr::Number(value, int))
    }

    fn slice_from(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_string(&mut self) -> Result<String, EvalError> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            let c = self.bump()?;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            let escape_at = self.pos - 1;
            let escaped = self.bump()?;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{0008}'),
                'f' => out.push('\u{000C}'),
                'v' => out.push('\u{000B}'),
                '0' => out.push('\0'),
                // Line continuation
                '\n' => {}
                'x' => {
                    let code = self.parse_hex_digits(2, escape_at)?;
                    out.push(char::from_u32(code).ok_or(EvalError::InvalidEscape(escape_at))?);
                }
                'u' => {
                    let code = self.parse_unicode_escape(escape_at)?;
                    out.push(code);
                }
                other => out.push(other),
            }
        }
    }

    fn parse_hex_digits(&mut self, count: usize, escape_at: usize) -> Result<u32, EvalError> {
        let mut code = 0u32;
        for _ in 0..count {
            let digit = self
                .bump()?
                .to_digit(16)
                .ok_or(EvalError::InvalidEscape(escape_at))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    /// `\uXXXX`, `\u{X...}` and surrogate pairs
    fn parse_unicode_escape(&mut self, escape_at: usize) -> Result<char, EvalError> {
        if self.eat('{') {
            let mut code = 0u32;
            loop {
                let c = self.bump()?;
                if c == '}' {
                    break;
                }
                let digit = c.to_digit(16).ok_or(EvalError::InvalidEscape(escape_at))?;
                code = code
                    .checked_mul(16)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or(EvalError::InvalidEscape(escape_at))?;
            }
            return char::from_u32(code).ok_or(EvalError::InvalidEscape(escape_at));
        }

        let high = self.parse_hex_digits(4, escape_at)?;
        if (0xD800..0xDC00).contains(&high)
            && self.peek() == Some('\\')
            && self.peek_at(1) == Some('u')
        {
            let checkpoint = self.pos;
            self.pos += 2;
            let low = self.parse_hex_digits(4, escape_at)?;
            if (0xDC00..0xE000).contains(&low) {
                let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                return char::from_u32(combined).ok_or(EvalError::InvalidEscape(escape_at));
            }
            self.pos = checkpoint;
        }

        Ok(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER))
    }
}
