//! Expression evaluation
//!
//! Evaluation never fails: a missing variable or a property read on
//! something that is not an object produces `null`. Everything that could be
//! wrong with an expression is rejected by the parser instead.

use crate::template::ast::{BinaryOp, Expr, LogicalOp, Method, UnaryOp};
use crate::template::value::{
    add, compare, is_truthy, loose_equals, number, strict_equals, to_display_string, to_number,
};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

/// Names and filesystem facts an expression can observe
pub trait Scope {
    /// Value bound to a root name, `Value::Null` when undefined
    fn lookup(&self, name: &str) -> Value;

    /// Value of `root.name`
    ///
    /// Scopes that can read a member without building the whole root value
    /// override this.
    fn lookup_member(&self, root: &str, name: &str) -> Value {
        property(&self.lookup(root), name)
    }

    /// Whether `path` exists relative to the current working directory
    fn exists(&self, path: &str) -> bool;
}

/// Evaluate an expression against a scope
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Identifier(name) => scope.lookup(name),
        Expr::Property { object, name } => match object.as_ref() {
            Expr::Identifier(root) => scope.lookup_member(root, name),
            object => property(&evaluate(object, scope), name),
        },
        Expr::Index { object, index } => {
            let object = evaluate(object, scope);
            let index = evaluate(index, scope);
            index_value(&object, &index)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope);
            match op {
                UnaryOp::Not => Value::Bool(!is_truthy(&value)),
                UnaryOp::Negate => to_number(&value).map(|n| number(-n)).unwrap_or(Value::Null),
            }
        }
        Expr::Binary { left, op, right } => {
            let left = evaluate(left, scope);
            let right = evaluate(right, scope);
            binary(&left, *op, &right)
        }
        Expr::Logical { left, op, right } => {
            let left = evaluate(left, scope);
            match op {
                LogicalOp::And if !is_truthy(&left) => left,
                LogicalOp::Or if is_truthy(&left) => left,
                LogicalOp::Nullish if !left.is_null() => left,
                _ => evaluate(right, scope),
            }
        }
        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            if is_truthy(&evaluate(condition, scope)) {
                evaluate(then_expr, scope)
            } else {
                evaluate(else_expr, scope)
            }
        }
        Expr::RegexMatch {
            subject,
            regex,
            global,
        } => match evaluate(subject, scope) {
            Value::String(s) => regex_match(regex, &s, *global),
            _ => Value::Null,
        },
        Expr::RegexTest { regex, subject } => {
            let subject = evaluate(subject, scope);
            Value::Bool(regex.is_match(&to_display_string(&subject)))
        }
        Expr::Method {
            receiver,
            method,
            args,
        } => {
            let receiver = evaluate(receiver, scope);
            let args: Vec<Value> = args.iter().map(|a| evaluate(a, scope)).collect();
            call_method(&receiver, *method, &args)
        }
        Expr::Exists(path) => {
            let path = to_display_string(&evaluate(path, scope));
            Value::Bool(!path.is_empty() && scope.exists(&path))
        }
    }
}

/// Read `name` from an object, or `length` from a string or array
pub fn property(object: &Value, name: &str) -> Value {
    match (object, name) {
        (Value::Object(map), _) => map.get(name).cloned().unwrap_or(Value::Null),
        (Value::String(s), "length") => Value::from(s.chars().count()),
        (Value::Array(items), "length") => Value::from(items.len()),
        _ => Value::Null,
    }
}

fn index_value(object: &Value, index: &Value) -> Value {
    match object {
        Value::Array(items) => to_number(index)
            .filter(|n| *n >= 0.0 && n.fract() == 0.0)
            .and_then(|n| items.get(n as usize).cloned())
            .unwrap_or(Value::Null),
        Value::Object(_) => property(object, &to_display_string(index)),
        Value::String(s) => to_number(index)
            .filter(|n| *n >= 0.0 && n.fract() == 0.0)
            .and_then(|n| s.chars().nth(n as usize))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn binary(left: &Value, op: BinaryOp, right: &Value) -> Value {
    let ordering = || compare(left, right);
    match op {
        BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
        BinaryOp::StrictNe => Value::Bool(!strict_equals(left, right)),
        BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
        BinaryOp::Ne => Value::Bool(!loose_equals(left, right)),
        BinaryOp::Lt => Value::Bool(ordering() == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(ordering(), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Gt => Value::Bool(ordering() == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            ordering(),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => match (to_number(left), to_number(right)) {
            (Some(a), Some(b)) => number(a - b),
            _ => Value::Null,
        },
    }
}

/// `String.prototype.match` semantics: capture groups (unmatched groups are
/// `null`) for a single match, every full match with the `g` flag, `null`
/// when nothing matches
fn regex_match(regex: &Regex, subject: &str, global: bool) -> Value {
    if global {
        let matches: Vec<Value> = regex
            .find_iter(subject)
            .map(|m| Value::String(m.as_str().to_string()))
            .collect();
        return if matches.is_empty() {
            Value::Null
        } else {
            Value::Array(matches)
        };
    }

    match regex.captures(subject) {
        Some(captures) => Value::Array(
            captures
                .iter()
                .map(|group| {
                    group
                        .map(|m| Value::String(m.as_str().to_string()))
                        .unwrap_or(Value::Null)
                })
                .collect(),
        ),
        None => Value::Null,
    }
}

fn call_method(receiver: &Value, method: Method, args: &[Value]) -> Value {
    let s = match receiver {
        Value::String(s) => s,
        Value::Array(items) if method == Method::Includes => {
            let needle = args.first().cloned().unwrap_or(Value::Null);
            return Value::Bool(items.iter().any(|item| strict_equals(item, &needle)));
        }
        _ => return Value::Null,
    };
    let arg = || args.first().map(to_display_string).unwrap_or_default();

    match method {
        Method::Includes => Value::Bool(s.contains(&arg())),
        Method::StartsWith => Value::Bool(s.starts_with(&arg())),
        Method::EndsWith => Value::Bool(s.ends_with(&arg())),
        Method::Trim => Value::String(s.trim().to_string()),
        Method::ToLowerCase => Value::String(s.to_lowercase()),
        Method::ToUpperCase => Value::String(s.to_uppercase()),
    }
}
