//! Boolean predicates over a JSON input value.
//!
//! Predicates are parsed into an AST at condition-creation time; anything
//! outside the grammar is rejected there instead of being miscompiled later.
//! The grammar is deliberately closed: dotted field access into the input,
//! literals, comparison operators, `contains`, and logical AND/OR/NOT. There
//! is no access to external state and no way out of the evaluator.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use weft_core::error::{Result, WeftError};

/// A parsed, reusable predicate.
#[derive(Debug, Clone)]
pub struct Predicate {
    source: String,
    expr: Expr,
}

impl Predicate {
    /// Parse a predicate expression. Unsupported syntax is a `Predicate`
    /// error naming the offending token.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = lex(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(WeftError::Predicate(format!(
                "unexpected trailing input in predicate '{}'",
                source
            )));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Evaluate against an input value. Pure; missing fields read as null.
    pub fn matches(&self, input: &Value) -> bool {
        truthy(&eval(&self.expr, input))
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Predicate::parse(&source).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Field(Vec<String>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    True,
    False,
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Contains,
    LParen,
    RParen,
}

fn lex(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    match chars[i] {
                        '\\' if chars.get(i + 1) == Some(&'"') => {
                            s.push('"');
                            i += 2;
                        }
                        '\\' if chars.get(i + 1) == Some(&'\\') => {
                            s.push('\\');
                            i += 2;
                        }
                        '"' => {
                            closed = true;
                            i += 1;
                            break;
                        }
                        other => {
                            s.push(other);
                            i += 1;
                        }
                    }
                }
                if !closed {
                    return Err(WeftError::Predicate(format!(
                        "unterminated string literal in '{}'",
                        source
                    )));
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text.parse::<f64>().map_err(|_| {
                    WeftError::Predicate(format!("invalid number literal '{}'", text))
                })?;
                tokens.push(Token::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "contains" => Token::Contains,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(WeftError::Predicate(format!(
                    "unsupported character '{}' in predicate '{}'",
                    other, source
                )));
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

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            Some(Token::Contains) => BinOp::Contains,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_primary()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(WeftError::Predicate("missing closing parenthesis".into())),
                }
            }
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(serde_json::json!(n))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(word)) => {
                let path = word.split('.').map(str::to_string).collect();
                Ok(Expr::Field(path))
            }
            other => Err(WeftError::Predicate(format!(
                "expected a value, found {:?}",
                other
            ))),
        }
    }
}

fn eval(expr: &Expr, input: &Value) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Field(path) => lookup(input, path),
        Expr::Not(inner) => Value::Bool(!truthy(&eval(inner, input))),
        Expr::Binary(op, left, right) => {
            match op {
                BinOp::And => {
                    let l = eval(left, input);
                    if !truthy(&l) {
                        return Value::Bool(false);
                    }
                    return Value::Bool(truthy(&eval(right, input)));
                }
                BinOp::Or => {
                    let l = eval(left, input);
                    if truthy(&l) {
                        return Value::Bool(true);
                    }
                    return Value::Bool(truthy(&eval(right, input)));
                }
                _ => {}
            }

            let l = eval(left, input);
            let r = eval(right, input);
            Value::Bool(match op {
                BinOp::Eq => loose_eq(&l, &r),
                BinOp::Ne => !loose_eq(&l, &r),
                BinOp::Lt => compare_numbers(&l, &r, |a, b| a < b),
                BinOp::Le => compare_numbers(&l, &r, |a, b| a <= b),
                BinOp::Gt => compare_numbers(&l, &r, |a, b| a > b),
                BinOp::Ge => compare_numbers(&l, &r, |a, b| a >= b),
                BinOp::Contains => contains(&l, &r),
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            })
        }
    }
}

fn lookup(input: &Value, path: &[String]) -> Value {
    let mut current = input;
    for segment in path {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare_numbers(left: &Value, right: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => cmp(l, r),
        _ => false,
    }
}

fn contains(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle),
        (Value::Array(items), needle) => items.iter().any(|item| loose_eq(item, needle)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> Value {
        serde_json::json!({
            "customerType": "vip",
            "orderValue": 1500,
            "customer": { "region": "eu", "flags": ["priority", "fragile"] },
            "note": "handle with care"
        })
    }

    #[test]
    fn equality_and_relational() {
        let p = Predicate::parse(r#"customerType == "vip" AND orderValue > 1000"#).unwrap();
        assert!(p.matches(&input()));

        let p = Predicate::parse("orderValue <= 100").unwrap();
        assert!(!p.matches(&input()));

        let p = Predicate::parse("orderValue != 1500").unwrap();
        assert!(!p.matches(&input()));
    }

    #[test]
    fn dotted_field_access() {
        let p = Predicate::parse(r#"customer.region == "eu""#).unwrap();
        assert!(p.matches(&input()));

        let p = Predicate::parse(r#"customer.missing.deep == "x""#).unwrap();
        assert!(!p.matches(&input()));
    }

    #[test]
    fn logical_operators_and_parens() {
        let p = Predicate::parse(
            r#"(customerType == "vip" OR customerType == "gold") AND NOT (orderValue < 100)"#,
        )
        .unwrap();
        assert!(p.matches(&input()));

        let p = Predicate::parse(r#"customerType == "gold" || orderValue >= 1500"#).unwrap();
        assert!(p.matches(&input()));

        let p = Predicate::parse("!true").unwrap();
        assert!(!p.matches(&input()));
    }

    #[test]
    fn contains_on_strings_and_arrays() {
        let p = Predicate::parse(r#"note contains "care""#).unwrap();
        assert!(p.matches(&input()));

        let p = Predicate::parse(r#"customer.flags contains "priority""#).unwrap();
        assert!(p.matches(&input()));

        let p = Predicate::parse(r#"customer.flags contains "bulk""#).unwrap();
        assert!(!p.matches(&input()));
    }

    #[test]
    fn missing_field_reads_as_null() {
        let p = Predicate::parse("missingField == null").unwrap();
        assert!(p.matches(&input()));

        let p = Predicate::parse("missingField").unwrap();
        assert!(!p.matches(&input()));
    }

    #[test]
    fn out_of_grammar_rejected_at_parse_time() {
        // Method calls and anything else outside the grammar must fail at
        // condition-creation time, never evaluate.
        assert!(Predicate::parse(r#"input.match(/vip/)"#).is_err());
        assert!(Predicate::parse("orderValue + 1 > 2").is_err());
        assert!(Predicate::parse(r#"customerType == "vip" extra"#).is_err());
        assert!(Predicate::parse(r#"name == "unterminated"#).is_err());
        assert!(Predicate::parse("orderValue >").is_err());
    }

    #[test]
    fn serde_round_trip_parses_on_deserialize() {
        let p: Predicate = serde_json::from_str(r#""orderValue > 10""#).unwrap();
        assert_eq!(p.source(), "orderValue > 10");
        assert_eq!(serde_json::to_string(&p).unwrap(), r#""orderValue > 10""#);

        let bad: std::result::Result<Predicate, _> = serde_json::from_str(r#""a ++ b""#);
        assert!(bad.is_err());
    }
}
