//! Tokenizer for template expressions

use crate::template::TemplateError;

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Regex { pattern: String, flags: String },
    Dot,
    QuestionDot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
    Not,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Nullish,
    Plus,
    Minus,
}

impl Token {
    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier `{}`", name),
            Token::Str(s) => format!("string '{}'", s),
            Token::Num(n) => format!("number {}", n),
            Token::Regex { pattern, .. } => format!("regex /{}/", pattern),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Dot => ".",
            Token::QuestionDot => "?.",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Not => "!",
            Token::StrictEq => "===",
            Token::StrictNe => "!==",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::And => "&&",
            Token::Or => "||",
            Token::Nullish => "??",
            Token::Plus => "+",
            Token::Minus => "-",
            _ => "",
        }
    }
}

/// Split an expression into tokens
///
/// There is no division operator, so a `/` always opens a regex literal.
pub fn tokenize(input: &str) -> Result<Vec<Token>, TemplateError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            let start = pos;
            while pos < chars.len()
                && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_' || chars[pos] == '$')
            {
                pos += 1;
            }
            tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && peek_is_digit(&chars, pos + 1)) {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            let text: String = chars[start..pos].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| TemplateError::InvalidNumber(text.clone()))?;
            tokens.push(Token::Num(value));
            continue;
        }

        match c {
            '\'' | '"' => {
                let (value, next) = read_string(&chars, pos)?;
                tokens.push(Token::Str(value));
                pos = next;
            }
            '/' => {
                let (pattern, flags, next) = read_regex(&chars, pos)?;
                tokens.push(Token::Regex { pattern, flags });
                pos = next;
            }
            '.' => {
                tokens.push(Token::Dot);
                pos += 1;
            }
            '?' => {
                if chars.get(pos + 1) == Some(&'.') && !peek_is_digit(&chars, pos + 2) {
                    tokens.push(Token::QuestionDot);
                    pos += 2;
                } else if chars.get(pos + 1) == Some(&'?') {
                    tokens.push(Token::Nullish);
                    pos += 2;
                } else {
                    tokens.push(Token::Question);
                    pos += 1;
                }
            }
            '[' => {
                tokens.push(Token::LBracket);
                pos += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                pos += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                pos += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                pos += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                pos += 1;
            }
            '!' => {
                if starts_with(&chars, pos, "!==") {
                    tokens.push(Token::StrictNe);
                    pos += 3;
                } else if starts_with(&chars, pos, "!=") {
                    tokens.push(Token::Ne);
                    pos += 2;
                } else {
                    tokens.push(Token::Not);
                    pos += 1;
                }
            }
            '=' => {
                if starts_with(&chars, pos, "===") {
                    tokens.push(Token::StrictEq);
                    pos += 3;
                } else if starts_with(&chars, pos, "==") {
                    tokens.push(Token::Eq);
                    pos += 2;
                } else {
                    return Err(TemplateError::UnexpectedChar { ch: c, pos });
                }
            }
            '<' => {
                if starts_with(&chars, pos, "<=") {
                    tokens.push(Token::Le);
                    pos += 2;
                } else {
                    tokens.push(Token::Lt);
                    pos += 1;
                }
            }
            '>' => {
                if starts_with(&chars, pos, ">=") {
                    tokens.push(Token::Ge);
                    pos += 2;
                } else {
                    tokens.push(Token::Gt);
                    pos += 1;
                }
            }
            '&' if starts_with(&chars, pos, "&&") => {
                tokens.push(Token::And);
                pos += 2;
            }
            '|' if starts_with(&chars, pos, "||") => {
                tokens.push(Token::Or);
                pos += 2;
            }
            _ => return Err(TemplateError::UnexpectedChar { ch: c, pos }),
        }
    }

    Ok(tokens)
}

fn peek_is_digit(chars: &[char], pos: usize) -> bool {
    chars.get(pos).is_some_and(|c| c.is_ascii_digit())
}

fn starts_with(chars: &[char], pos: usize, pattern: &str) -> bool {
    pattern
        .chars()
        .enumerate()
        .all(|(i, p)| chars.get(pos + i) == Some(&p))
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), TemplateError> {
    let quote = chars[start];
    let mut value = String::new();
    let mut pos = start + 1;

    while pos < chars.len() {
        let c = chars[pos];
        if c == quote {
            return Ok((value, pos + 1));
        }
        if c == '\\' {
            let escaped = chars.get(pos + 1).ok_or(TemplateError::UnterminatedString)?;
            value.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                other => *other,
            });
            pos += 2;
            continue;
        }
        value.push(c);
        pos += 1;
    }

    Err(TemplateError::UnterminatedString)
}

fn read_regex(chars: &[char], start: usize) -> Result<(String, String, usize), TemplateError> {
    let mut pattern = String::new();
    let mut pos = start + 1;
    let mut in_class = false;

    loop {
        let c = *chars.get(pos).ok_or(TemplateError::UnterminatedRegex)?;
        match c {
            '\\' => {
                let escaped = chars.get(pos + 1).ok_or(TemplateError::UnterminatedRegex)?;
                pattern.push('\\');
                pattern.push(*escaped);
                pos += 2;
                continue;
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => break,
            _ => {}
        }
        pattern.push(c);
        pos += 1;
    }
    pos += 1;

    let mut flags = String::new();
    while pos < chars.len() && chars[pos].is_ascii_alphabetic() {
        flags.push(chars[pos]);
        pos += 1;
    }

    Ok((pattern, flags, pos))
}
