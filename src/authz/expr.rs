//! Boolean expressions for `condition expr="..."` permissions.
//!
//! Supported syntax:
//! - Comparisons: `==`, `!=`, `>`, `<`, `>=`, `<=`
//! - Boolean operators: `&&`, `||`, `!`
//! - Membership: `x in list`
//! - Dot-path access: `actor.id`, `resource.owner`, `context.region`
//! - Literals: integers, floats, `"strings"`, `true`, `false`, `null`
//! - Parentheses for grouping

use serde_json::Value;

use crate::authz::errors::{AuthzError, PolicyError};

// ─── AST ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    In {
        element: Box<Expr>,
        collection: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
}

/// A compiled condition expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, PolicyError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(PolicyError::InvalidCondition("empty expression".into()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let ast = parser.parse_or()?;
        if let Some(tok) = parser.tokens.get(parser.pos) {
            return Err(PolicyError::InvalidCondition(format!(
                "unexpected trailing token: {tok:?}"
            )));
        }
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate against a JSON document. Non-boolean results and operand
    /// type mismatches are evaluation failures, not `false`.
    pub fn evaluate(&self, document: &Value) -> Result<bool, AuthzError> {
        match eval(&self.ast, document)? {
            Value::Bool(b) => Ok(b),
            other => Err(AuthzError::ConditionFailed(format!(
                "`{}` must evaluate to a boolean, got {other}",
                self.source
            ))),
        }
    }
}

// ─── Lexer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Dot,
    LParen,
    RParen,
    Op(BinOp),
    Not,
    In,
}

fn tokenize(input: &str) -> Result<Vec<Token>, PolicyError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '.' => Token::Dot,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '=' | '!' | '>' | '<' | '&' | '|' => {
                let doubled = chars.next_if_eq(&'=').is_some();
                match (c, doubled) {
                    ('=', true) => Token::Op(BinOp::Eq),
                    ('!', true) => Token::Op(BinOp::Ne),
                    ('>', true) => Token::Op(BinOp::Ge),
                    ('<', true) => Token::Op(BinOp::Le),
                    ('!', false) => Token::Not,
                    ('>', false) => Token::Op(BinOp::Gt),
                    ('<', false) => Token::Op(BinOp::Lt),
                    ('&', false) if chars.next_if_eq(&'&').is_some() => Token::Op(BinOp::And),
                    ('|', false) if chars.next_if_eq(&'|').is_some() => Token::Op(BinOp::Or),
                    _ => {
                        return Err(PolicyError::InvalidCondition(format!(
                            "unexpected operator starting with `{c}`"
                        )))
                    }
                }
            }
            '"' => {
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => s.push(escaped),
                            None => break,
                        },
                        Some(ch) => s.push(ch),
                        None => {
                            return Err(PolicyError::InvalidCondition(
                                "unterminated string literal".into(),
                            ))
                        }
                    }
                }
                Token::Literal(Value::String(s))
            }
            c if c.is_ascii_digit() => {
                let mut num = String::from(c);
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit() || *d == '.') {
                    num.push(d);
                }
                Token::Literal(parse_number(&num)?)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(w) = chars.next_if(|w| w.is_ascii_alphanumeric() || *w == '_') {
                    word.push(w);
                }
                match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    "in" => Token::In,
                    _ => Token::Ident(word),
                }
            }
            c => {
                return Err(PolicyError::InvalidCondition(format!(
                    "unexpected character `{c}`"
                )))
            }
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn parse_number(text: &str) -> Result<Value, PolicyError> {
    if text.contains('.') {
        let f: f64 = text
            .parse()
            .map_err(|_| PolicyError::InvalidCondition(format!("invalid float `{text}`")))?;
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| PolicyError::InvalidCondition(format!("invalid float `{text}`")))
    } else {
        let n: i64 = text
            .parse()
            .map_err(|_| PolicyError::InvalidCondition(format!("invalid integer `{text}`")))?;
        Ok(Value::from(n))
    }
}

// ─── Parser ─────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    /// or_expr = and_expr ("||" and_expr)*
    fn parse_or(&mut self) -> Result<Expr, PolicyError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Op(BinOp::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    /// and_expr = comparison ("&&" comparison)*
    fn parse_and(&mut self) -> Result<Expr, PolicyError> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::Op(BinOp::And)) {
            self.advance();
            let right = self.parse_comparison()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    /// comparison = unary ((cmp_op | "in") unary)?
    fn parse_comparison(&mut self) -> Result<Expr, PolicyError> {
        let left = self.parse_unary()?;
        match self.peek() {
            Some(Token::Op(op)) if !matches!(op, BinOp::And | BinOp::Or) => {
                let op = *op;
                self.advance();
                let right = self.parse_unary()?;
                Ok(binary(op, left, right))
            }
            Some(Token::In) => {
                self.advance();
                let right = self.parse_unary()?;
                Ok(Expr::In {
                    element: Box::new(left),
                    collection: Box::new(right),
                })
            }
            _ => Ok(left),
        }
    }

    /// unary = "!" unary | primary
    fn parse_unary(&mut self) -> Result<Expr, PolicyError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    /// primary = literal | path | "(" or_expr ")"
    fn parse_primary(&mut self) -> Result<Expr, PolicyError> {
        match self.advance() {
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::Ident(name)) => {
                let mut path = vec![name];
                while self.peek() == Some(&Token::Dot) {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(segment)) => path.push(segment),
                        _ => {
                            return Err(PolicyError::InvalidCondition(
                                "expected identifier after `.`".into(),
                            ))
                        }
                    }
                }
                Ok(Expr::Path(path))
            }
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                if self.advance() != Some(Token::RParen) {
                    return Err(PolicyError::InvalidCondition(
                        "expected closing parenthesis `)`".into(),
                    ));
                }
                Ok(expr)
            }
            other => Err(PolicyError::InvalidCondition(format!(
                "unexpected token: {other:?}"
            ))),
        }
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

// ─── Evaluator ──────────────────────────────────────────────────────────

fn eval(expr: &Expr, document: &Value) -> Result<Value, AuthzError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => {
            let mut current = document;
            for segment in segments {
                current = current.get(segment).unwrap_or(&Value::Null);
            }
            Ok(current.clone())
        }
        Expr::Not(inner) => match eval(inner, document)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => Err(AuthzError::ConditionFailed(
                "`!` operator requires a boolean operand".into(),
            )),
        },
        Expr::In {
            element,
            collection,
        } => {
            let needle = eval(element, document)?;
            match eval(collection, document)? {
                Value::Array(items) => Ok(Value::Bool(
                    items.iter().any(|item| values_equal(item, &needle)),
                )),
                _ => Err(AuthzError::ConditionFailed(
                    "`in` operator requires an array on the right side".into(),
                )),
            }
        }
        Expr::Binary { op, left, right } => {
            let l = eval(left, document)?;
            let r = eval(right, document)?;
            let result = match op {
                BinOp::And | BinOp::Or => match (&l, &r) {
                    (Value::Bool(a), Value::Bool(b)) => {
                        if *op == BinOp::And {
                            *a && *b
                        } else {
                            *a || *b
                        }
                    }
                    _ => {
                        return Err(AuthzError::ConditionFailed(
                            "`&&` and `||` require boolean operands".into(),
                        ))
                    }
                },
                BinOp::Eq => values_equal(&l, &r),
                BinOp::Ne => !values_equal(&l, &r),
                BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le => {
                    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                        return Err(AuthzError::ConditionFailed(
                            "comparison operator requires numeric operands".into(),
                        ));
                    };
                    match op {
                        BinOp::Gt => a > b,
                        BinOp::Lt => a < b,
                        BinOp::Ge => a >= b,
                        _ => a <= b,
                    }
                }
            };
            Ok(Value::Bool(result))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
