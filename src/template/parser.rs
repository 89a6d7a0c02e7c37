//! Expression parser
//!
//! Recursive descent over the token stream. Precedence, lowest first:
//! ternary, `??`, `||`, `&&`, equality, relational, additive, unary, postfix
//! (`.`, `?.`, `[]`, calls), primary.

use crate::template::ast::{BinaryOp, Expr, LogicalOp, Method, UnaryOp};
use crate::template::lexer::{tokenize, Token};
use crate::template::TemplateError;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

/// Parse a single expression
pub fn parse_expression(input: &str) -> Result<Expr, TemplateError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(TemplateError::EmptyExpression);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.ternary()?;

    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(TemplateError::UnexpectedToken {
            found: token.describe(),
            expected: "end of expression",
        }),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), TemplateError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(TemplateError::UnexpectedToken {
                found: token.describe(),
                expected: what,
            }),
            None => Err(TemplateError::UnexpectedEnd { expected: what }),
        }
    }

    fn ternary(&mut self) -> Result<Expr, TemplateError> {
        let condition = self.nullish()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then_expr = self.ternary()?;
        self.expect(Token::Colon, "`:` in ternary")?;
        let else_expr = self.ternary()?;
        Ok(Expr::ternary(condition, then_expr, else_expr))
    }

    fn nullish(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.or()?;
        while self.eat(&Token::Nullish) {
            let right = self.or()?;
            left = Expr::logical(left, LogicalOp::Nullish, right);
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expr::logical(left, LogicalOp::Or, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            left = Expr::logical(left, LogicalOp::And, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::StrictEq) => BinaryOp::StrictEq,
                Some(Token::StrictNe) => BinaryOp::StrictNe,
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.relational()?;
            left = Expr::binary(left, op, right);
        }
    }

    fn relational(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Expr::binary(left, op, right);
        }
    }

    fn additive(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::binary(left, op, right);
        }
    }

    fn unary(&mut self) -> Result<Expr, TemplateError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.unary()?),
            });
        }
        if self.eat(&Token::Minus) {
            return Ok(Expr::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(self.unary()?),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.primary()?;

        loop {
            match self.peek() {
                Some(Token::Dot) | Some(Token::QuestionDot) => {
                    let optional = self.peek() == Some(&Token::QuestionDot);
                    self.pos += 1;
                    if optional && self.eat(&Token::LBracket) {
                        expr = self.index(expr)?;
                        continue;
                    }
                    let name = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        Some(token) => {
                            return Err(TemplateError::UnexpectedToken {
                                found: token.describe(),
                                expected: "property name",
                            })
                        }
                        None => {
                            return Err(TemplateError::UnexpectedEnd {
                                expected: "property name",
                            })
                        }
                    };
                    if self.eat(&Token::LParen) {
                        expr = self.method_call(expr, &name)?;
                    } else {
                        expr = Expr::property(expr, name);
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    expr = self.index(expr)?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn index(&mut self, object: Expr) -> Result<Expr, TemplateError> {
        let index = self.ternary()?;
        self.expect(Token::RBracket, "`]`")?;
        Ok(Expr::Index {
            object: Box::new(object),
            index: Box::new(index),
        })
    }

    /// Parse the arguments of `receiver.name(`; the `(` is already consumed
    fn method_call(&mut self, receiver: Expr, name: &str) -> Result<Expr, TemplateError> {
        if name == "match" {
            let (regex, global) = match self.advance() {
                Some(Token::Regex { pattern, flags }) => compile_regex(&pattern, &flags)?,
                Some(token) => {
                    return Err(TemplateError::UnexpectedToken {
                        found: token.describe(),
                        expected: "regex literal",
                    })
                }
                None => {
                    return Err(TemplateError::UnexpectedEnd {
                        expected: "regex literal",
                    })
                }
            };
            self.expect(Token::RParen, "`)`")?;
            return Ok(Expr::RegexMatch {
                subject: Box::new(receiver),
                regex,
                global,
            });
        }

        let method =
            Method::from_name(name).ok_or_else(|| TemplateError::UnknownMethod(name.to_string()))?;
        let args = self.arguments()?;
        if args.len() != method.arity() {
            return Err(TemplateError::WrongArity {
                name: name.to_string(),
                expected: method.arity(),
                found: args.len(),
            });
        }

        Ok(Expr::Method {
            receiver: Box::new(receiver),
            method,
            args,
        })
    }

    /// Comma-separated arguments up to and including the closing `)`
    fn arguments(&mut self) -> Result<Vec<Expr>, TemplateError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.ternary()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(Token::Comma, "`,` or `)`")?;
        }
    }

    fn primary(&mut self) -> Result<Expr, TemplateError> {
        let token = self.advance().ok_or(TemplateError::UnexpectedEnd {
            expected: "expression",
        })?;

        match token {
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Num(n) => Ok(Expr::Literal(crate::template::value::number(n))),
            Token::LParen => {
                let expr = self.ternary()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(expr)
            }
            Token::Regex { pattern, flags } => {
                let (regex, _) = compile_regex(&pattern, &flags)?;
                self.expect(Token::Dot, "`.test(` after regex literal")?;
                match self.advance() {
                    Some(Token::Ident(name)) if name == "test" => {}
                    _ => {
                        return Err(TemplateError::UnexpectedToken {
                            found: format!("regex /{}/", pattern),
                            expected: "`.test(` after regex literal",
                        })
                    }
                }
                self.expect(Token::LParen, "`(`")?;
                let subject = self.ternary()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(Expr::RegexTest {
                    regex,
                    subject: Box::new(subject),
                })
            }
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    self.function_call(&name)
                }
                _ => Ok(Expr::Identifier(name)),
            },
            other => Err(TemplateError::UnexpectedToken {
                found: other.describe(),
                expected: "expression",
            }),
        }
    }

    fn function_call(&mut self, name: &str) -> Result<Expr, TemplateError> {
        match name {
            "exists" => {
                let mut args = self.arguments()?;
                if args.len() != 1 {
                    return Err(TemplateError::WrongArity {
                        name: name.to_string(),
                        expected: 1,
                        found: args.len(),
                    });
                }
                Ok(Expr::Exists(Box::new(args.remove(0))))
            }
            _ => Err(TemplateError::UnknownFunction(name.to_string())),
        }
    }
}

fn compile_regex(pattern: &str, flags: &str) -> Result<(Regex, bool), TemplateError> {
    let mut builder = RegexBuilder::new(pattern);
    let mut global = false;

    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'g' => global = true,
            other => {
                return Err(TemplateError::InvalidRegex {
                    pattern: pattern.to_string(),
                    message: format!("unsupported flag `{}`", other),
                })
            }
        }
    }

    let regex = builder.build().map_err(|e| TemplateError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    Ok((regex, global))
}
