//! Expression AST nodes

use regex::Regex;
use serde_json::Value;

/// Expression AST node
#[derive(Debug, Clone)]
pub enum Expr {
    /// Literal value (`'linux'`, `8.9`, `true`, `null`)
    Literal(Value),

    /// Root name lookup (`platform`, `local`, `input`)
    Identifier(String),

    /// Property access (`local.cuda_arch`, `input?.stdout`)
    Property { object: Box<Expr>, name: String },

    /// Index access (`matches[1]`, `m?.[1]`)
    Index { object: Box<Expr>, index: Box<Expr> },

    /// Unary operation
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Comparison or arithmetic
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Short-circuit operators; these yield operand values, not booleans
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },

    /// `condition ? then_expr : else_expr`
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// `subject.match(/re/flags)`
    RegexMatch {
        subject: Box<Expr>,
        regex: Regex,
        global: bool,
    },

    /// `/re/flags.test(subject)`
    RegexTest { regex: Regex, subject: Box<Expr> },

    /// String method call (`s.includes('x')`)
    Method {
        receiver: Box<Expr>,
        method: Method,
        args: Vec<Expr>,
    },

    /// `exists(path)`, relative to the current working directory
    Exists(Box<Expr>),
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical NOT (!)
    Not,
    /// Numeric negation (-)
    Negate,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// Supported string methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Includes,
    StartsWith,
    EndsWith,
    Trim,
    ToLowerCase,
    ToUpperCase,
}

impl Method {
    /// Look up a method by its source name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "includes" => Some(Method::Includes),
            "startsWith" => Some(Method::StartsWith),
            "endsWith" => Some(Method::EndsWith),
            "trim" => Some(Method::Trim),
            "toLowerCase" => Some(Method::ToLowerCase),
            "toUpperCase" => Some(Method::ToUpperCase),
            _ => None,
        }
    }

    /// Number of arguments the method takes
    pub fn arity(&self) -> usize {
        match self {
            Method::Includes | Method::StartsWith | Method::EndsWith => 1,
            Method::Trim | Method::ToLowerCase | Method::ToUpperCase => 0,
        }
    }
}

impl Expr {
    /// Create a property access expression
    pub fn property(object: Expr, name: impl Into<String>) -> Self {
        Expr::Property {
            object: Box::new(object),
            name: name.into(),
        }
    }

    /// Create a binary expression
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Create a short-circuit expression
    pub fn logical(left: Expr, op: LogicalOp, right: Expr) -> Self {
        Expr::Logical {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Create a ternary expression
    pub fn ternary(condition: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Expr::Ternary {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        }
    }

    /// Every string the expression can possibly produce, when that set is
    /// statically known
    ///
    /// Literal strings and ternaries over literal strings are static; anything
    /// that reads a variable is not. Used to check jump targets at load time.
    pub fn static_strings(&self) -> Option<Vec<String>> {
        match self {
            Expr::Literal(Value::String(s)) => Some(vec![s.clone()]),
            Expr::Ternary {
                then_expr,
                else_expr,
                ..
            } => {
                let mut values = then_expr.static_strings()?;
                values.extend(else_expr.static_strings()?);
                Some(values)
            }
            _ => None,
        }
    }
}
