//! `{{expression}}` templates
//!
//! Templates are compiled once when a pipeline is loaded: every placeholder
//! is parsed into an [`ast::Expr`] so that malformed expressions surface as
//! configuration errors before the first step runs. Rendering and evaluation
//! against a [`Scope`] are then infallible.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use eval::{evaluate, Scope};
pub use parser::parse_expression;

use crate::template::ast::Expr;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors produced while compiling a template
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Empty expression")]
    EmptyExpression,

    #[error("Unterminated `{{{{` placeholder")]
    UnterminatedPlaceholder,

    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Unterminated regex literal")]
    UnterminatedRegex,

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unexpected {found}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
    },

    #[error("Unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("{name}() takes {expected} argument(s), got {found}")]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Invalid regex /{pattern}/: {message}")]
    InvalidRegex { pattern: String, message: String },
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Expr(Expr),
}

/// A compiled template string
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Compile a string containing zero or more `{{expression}}` placeholders
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let body = &rest[start + 2..];
            let end = find_closing(body).ok_or(TemplateError::UnterminatedPlaceholder)?;
            segments.push(Segment::Expr(parse_expression(body[..end].trim())?));
            rest = &body[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Compile a guard: a string without placeholders is read as a bare
    /// expression (`when: "platform === 'win32'"`)
    pub fn parse_expression_or_template(source: &str) -> Result<Self, TemplateError> {
        if source.contains("{{") {
            return Self::parse(source);
        }
        Ok(Self {
            source: source.to_string(),
            segments: vec![Segment::Expr(parse_expression(source.trim())?)],
        })
    }

    /// Original source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the template contains no placeholders
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Text(_)))
    }

    /// Compiled placeholder expressions, in order
    pub fn expressions(&self) -> impl Iterator<Item = &Expr> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Expr(expr) => Some(expr),
            Segment::Text(_) => None,
        })
    }

    /// Render to a string, converting each expression result to text
    pub fn render(&self, scope: &dyn Scope) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => text.clone(),
                Segment::Expr(expr) => value::to_display_string(&evaluate(expr, scope)),
            })
            .collect()
    }

    /// Evaluate to a value
    ///
    /// A template that is exactly one placeholder yields the expression's
    /// typed value; anything else renders to a string.
    pub fn evaluate(&self, scope: &dyn Scope) -> Value {
        match self.segments.as_slice() {
            [Segment::Expr(expr)] => evaluate(expr, scope),
            [] => Value::String(String::new()),
            _ => Value::String(self.render(scope)),
        }
    }
}

/// Offset of the `}}` closing a placeholder body
///
/// Quoted strings and `/regex/` literals are skipped, matching the lexer:
/// a `/` outside a string always opens a regex.
fn find_closing(body: &str) -> Option<usize> {
    #[derive(Clone, Copy)]
    enum Scan {
        Code,
        Quoted(u8),
        Regex { in_class: bool },
    }

    let bytes = body.as_bytes();
    let mut state = Scan::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        state = match state {
            Scan::Quoted(_) | Scan::Regex { .. } if b == b'\\' => {
                i += 2;
                continue;
            }
            Scan::Quoted(q) if b == q => Scan::Code,
            Scan::Regex { in_class: false } if b == b'/' => Scan::Code,
            Scan::Regex { .. } if b == b'[' => Scan::Regex { in_class: true },
            Scan::Regex { .. } if b == b']' => Scan::Regex { in_class: false },
            Scan::Code if b == b'\'' || b == b'"' => Scan::Quoted(b),
            Scan::Code if b == b'/' => Scan::Regex { in_class: false },
            Scan::Code if b == b'}' && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            other => other,
        };
        i += 1;
    }

    None
}

/// A structured parameter value whose string leaves are templates
#[derive(Debug, Clone)]
pub enum TemplateValue {
    Template(Template),
    Array(Vec<TemplateValue>),
    Object(Vec<(String, TemplateValue)>),
    Literal(Value),
}

impl TemplateValue {
    /// Compile every string leaf of a JSON value
    pub fn compile(value: &Value) -> Result<Self, TemplateError> {
        Ok(match value {
            Value::String(s) => TemplateValue::Template(Template::parse(s)?),
            Value::Array(items) => TemplateValue::Array(
                items
                    .iter()
                    .map(TemplateValue::compile)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => TemplateValue::Object(
                map.iter()
                    .map(|(k, v)| TemplateValue::compile(v).map(|compiled| (k.clone(), compiled)))
                    .collect::<Result<_, _>>()?,
            ),
            other => TemplateValue::Literal(other.clone()),
        })
    }

    /// Resolve every template leaf against a scope
    pub fn resolve(&self, scope: &dyn Scope) -> Value {
        match self {
            TemplateValue::Template(template) => template.evaluate(scope),
            TemplateValue::Array(items) => {
                Value::Array(items.iter().map(|item| item.resolve(scope)).collect())
            }
            TemplateValue::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.resolve(scope));
                }
                Value::Object(map)
            }
            TemplateValue::Literal(value) => value.clone(),
        }
    }

    /// Compiled expressions anywhere in the value
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            TemplateValue::Template(template) => template.expressions().collect(),
            TemplateValue::Array(items) => items.iter().flat_map(|i| i.expressions()).collect(),
            TemplateValue::Object(entries) => {
                entries.iter().flat_map(|(_, v)| v.expressions()).collect()
            }
            TemplateValue::Literal(_) => Vec::new(),
        }
    }
}
