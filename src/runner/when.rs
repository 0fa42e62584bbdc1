//! When condition parsing and evaluation
//!
//! Conditions are boolean expressions over registered results:
//!
//! ```text
//! output.failed
//! probe.succeeded and not install.changed
//! 'Docker version' in probe.output
//! probe.rc == 0 or (probe.rc != 127 and 'ok' not in probe.output)
//! ```
//!
//! Evaluation fails closed: referencing a name with no registered result is
//! an [`UnresolvedReference`], which the runner turns into a skip.

use crate::error::PredicateError;
use crate::runner::{Registry, UnresolvedReference};
use std::fmt;
use std::str::FromStr;

/// Boolean field of a registered result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    Succeeded,
    Failed,
    Changed,
}

impl StatusField {
    fn as_str(&self) -> &'static str {
        match self {
            StatusField::Succeeded => "succeeded",
            StatusField::Failed => "failed",
            StatusField::Changed => "changed",
        }
    }
}

/// Exit code comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
}

/// A parsed condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Literal(bool),
    Status {
        name: String,
        field: StatusField,
    },
    OutputContains {
        name: String,
        needle: String,
        negated: bool,
    },
    ExitCode {
        name: String,
        op: CmpOp,
        value: i64,
    },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Parse a condition expression
    pub fn parse(input: &str) -> Result<Self, PredicateError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let predicate = parser.expr()?;

        match parser.peek() {
            None => Ok(predicate),
            Some(token) => Err(token.unexpected()),
        }
    }

    /// Registry names this predicate reads, in order of appearance
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Predicate::Literal(_) => {}
            Predicate::Status { name, .. }
            | Predicate::OutputContains { name, .. }
            | Predicate::ExitCode { name, .. } => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Predicate::Not(inner) => inner.collect_references(names),
            Predicate::And(left, right) | Predicate::Or(left, right) => {
                left.collect_references(names);
                right.collect_references(names);
            }
        }
    }
}

impl FromStr for Predicate {
    type Err = PredicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Predicate::parse(s)
    }
}

/// Evaluate a predicate against the registry
///
/// `and`/`or` short-circuit, so a reference on the untaken side is never read.
pub fn evaluate(predicate: &Predicate, registry: &Registry) -> Result<bool, UnresolvedReference> {
    match predicate {
        Predicate::Literal(value) => Ok(*value),
        Predicate::Status { name, field } => {
            let entry = registry.get(name)?;
            Ok(match field {
                StatusField::Succeeded => entry.result.succeeded,
                StatusField::Failed => !entry.result.succeeded,
                StatusField::Changed => entry.result.changed,
            })
        }
        Predicate::OutputContains {
            name,
            needle,
            negated,
        } => {
            let entry = registry.get(name)?;
            Ok(entry.result.output.contains(needle.as_str()) != *negated)
        }
        Predicate::ExitCode { name, op, value } => {
            let entry = registry.get(name)?;
            let matches = entry.result.exit_code.map(i64::from) == Some(*value);
            Ok(match op {
                CmpOp::Eq => matches,
                CmpOp::Ne => !matches,
            })
        }
        Predicate::Not(inner) => Ok(!evaluate(inner, registry)?),
        Predicate::And(left, right) => {
            Ok(evaluate(left, registry)? && evaluate(right, registry)?)
        }
        Predicate::Or(left, right) => Ok(evaluate(left, registry)? || evaluate(right, registry)?),
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Literal(value) => write!(f, "{}", value),
            Predicate::Status { name, field } => write!(f, "{}.{}", name, field.as_str()),
            Predicate::OutputContains {
                name,
                needle,
                negated,
            } => {
                let not = if *negated { "not " } else { "" };
                write!(f, "{} {}in {}.output", quote(needle), not, name)
            }
            Predicate::ExitCode { name, op, value } => {
                let op = match op {
                    CmpOp::Eq => "==",
                    CmpOp::Ne => "!=",
                };
                write!(f, "{}.rc {} {}", name, op, value)
            }
            Predicate::Not(inner) => match **inner {
                Predicate::And(..) | Predicate::Or(..) => write!(f, "not ({})", inner),
                _ => write!(f, "not {}", inner),
            },
            // Operators are left-associative: a right operand of equal or
            // lower precedence needs parentheses to parse back the same way
            Predicate::And(left, right) => {
                match **left {
                    Predicate::Or(..) => write!(f, "({})", left)?,
                    _ => write!(f, "{}", left)?,
                }
                f.write_str(" and ")?;
                match **right {
                    Predicate::And(..) | Predicate::Or(..) => write!(f, "({})", right),
                    _ => write!(f, "{}", right),
                }
            }
            Predicate::Or(left, right) => {
                write!(f, "{} or ", left)?;
                match **right {
                    Predicate::Or(..) => write!(f, "({})", right),
                    _ => write!(f, "{}", right),
                }
            }
        }
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', r"\\").replace('\'', r"\'"))
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    Dot,
    LParen,
    RParen,
    EqEq,
    NotEq,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    offset: usize,
}

impl Token {
    fn unexpected(&self) -> PredicateError {
        PredicateError::UnexpectedToken {
            token: self.text.clone(),
            offset: self.offset,
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(word) if word == keyword)
    }
}

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "true", "false"];

/// Whether `name` can be used as a registry name inside conditions
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&name)
}

fn tokenize(input: &str) -> Result<Vec<Token>, PredicateError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let single = |kind: TokenKind| Token {
            kind,
            text: c.to_string(),
            offset,
        };

        match c {
            '.' => {
                tokens.push(single(TokenKind::Dot));
                i += 1;
            }
            '(' => {
                tokens.push(single(TokenKind::LParen));
                i += 1;
            }
            ')' => {
                tokens.push(single(TokenKind::RParen));
                i += 1;
            }
            '=' | '!' => {
                let kind = match (c, chars.get(i + 1).map(|&(_, next)| next)) {
                    ('=', Some('=')) => TokenKind::EqEq,
                    ('!', Some('=')) => TokenKind::NotEq,
                    _ => {
                        return Err(PredicateError::UnexpectedToken {
                            token: c.to_string(),
                            offset,
                        })
                    }
                };
                let text = format!("{}=", c);
                tokens.push(Token { kind, text, offset });
                i += 2;
            }
            '\'' | '"' => {
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(PredicateError::UnterminatedString(offset)),
                        Some(&(_, '\\')) => {
                            let &(_, escaped) = chars
                                .get(j + 1)
                                .ok_or(PredicateError::UnterminatedString(offset))?;
                            value.push(escaped);
                            j += 2;
                        }
                        Some(&(_, ch)) if ch == c => break,
                        Some(&(_, ch)) => {
                            value.push(ch);
                            j += 1;
                        }
                    }
                }
                let end = chars.get(j + 1).map_or(input.len(), |&(o, _)| o);
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    text: input[offset..end].to_string(),
                    offset,
                });
                i = j + 1;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut j = i + 1;
                while chars.get(j).is_some_and(|&(_, d)| d.is_ascii_digit()) {
                    j += 1;
                }
                let end = chars.get(j).map_or(input.len(), |&(o, _)| o);
                let text = &input[offset..end];
                let value = text
                    .parse::<i64>()
                    .map_err(|_| PredicateError::InvalidInteger(text.to_string()))?;
                tokens.push(Token {
                    kind: TokenKind::Int(value),
                    text: text.to_string(),
                    offset,
                });
                i = j;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while chars
                    .get(j)
                    .is_some_and(|&(_, d)| d.is_ascii_alphanumeric() || d == '_')
                {
                    j += 1;
                }
                let end = chars.get(j).map_or(input.len(), |&(o, _)| o);
                let word = input[offset..end].to_string();
                tokens.push(Token {
                    kind: TokenKind::Ident(word.clone()),
                    text: word,
                    offset,
                });
                i = j;
            }
            other => {
                return Err(PredicateError::UnexpectedToken {
                    token: other.to_string(),
                    offset,
                })
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
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, PredicateError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(PredicateError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), PredicateError> {
        let token = self.next()?;
        if token.kind == kind {
            Ok(())
        } else {
            Err(token.unexpected())
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), PredicateError> {
        let token = self.next()?;
        if token.is_keyword(keyword) {
            Ok(())
        } else {
            Err(token.unexpected())
        }
    }

    fn name(&mut self) -> Result<String, PredicateError> {
        let token = self.next()?;
        match &token.kind {
            TokenKind::Ident(word) if !KEYWORDS.contains(&word.as_str()) => Ok(word.clone()),
            _ => Err(token.unexpected()),
        }
    }

    fn expr(&mut self) -> Result<Predicate, PredicateError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            let right = self.and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Predicate, PredicateError> {
        let mut left = self.unary()?;
        while self.eat_keyword("and") {
            let right = self.unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Predicate, PredicateError> {
        if self.eat_keyword("not") {
            return Ok(Predicate::Not(Box::new(self.unary()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Predicate, PredicateError> {
        let token = self.next()?;

        match token.kind {
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Str(needle) => {
                let negated = self.eat_keyword("not");
                self.expect_keyword("in")?;
                let name = self.name()?;
                self.expect(TokenKind::Dot)?;
                let field = self.next()?;
                if field.is_keyword("output") {
                    Ok(Predicate::OutputContains {
                        name,
                        needle,
                        negated,
                    })
                } else {
                    Err(PredicateError::UnknownField(field.text))
                }
            }
            TokenKind::Ident(ref word) if word == "true" => Ok(Predicate::Literal(true)),
            TokenKind::Ident(ref word) if word == "false" => Ok(Predicate::Literal(false)),
            TokenKind::Ident(ref word) if !KEYWORDS.contains(&word.as_str()) => {
                let name = word.clone();
                self.expect(TokenKind::Dot)?;
                let field = self.next()?;
                let field_name = match &field.kind {
                    TokenKind::Ident(f) => f.as_str(),
                    _ => return Err(field.unexpected()),
                };

                let status = match field_name {
                    "succeeded" => StatusField::Succeeded,
                    "failed" => StatusField::Failed,
                    "changed" => StatusField::Changed,
                    "rc" => return self.exit_code(name),
                    "output" => {
                        return Err(self
                            .peek()
                            .map_or(PredicateError::UnexpectedEnd, Token::unexpected))
                    }
                    other => return Err(PredicateError::UnknownField(other.to_string())),
                };
                Ok(Predicate::Status {
                    name,
                    field: status,
                })
            }
            _ => Err(token.unexpected()),
        }
    }

    fn exit_code(&mut self, name: String) -> Result<Predicate, PredicateError> {
        let op_token = self.next()?;
        let op = match op_token.kind {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::Ne,
            _ => return Err(op_token.unexpected()),
        };

        let value_token = self.next()?;
        match value_token.kind {
            TokenKind::Int(value) => Ok(Predicate::ExitCode { name, op, value }),
            _ => Err(value_token.unexpected()),
        }
    }
}
