//! Environment markers.
//!
//! A marker is a boolean expression over environment keys such as
//! `os_name == "posix" and (sys_platform != "win32" or extra == "tls")`.
//! Dependencies carrying a marker only apply when it evaluates to true for
//! the target environment and the active extras.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::version::Version;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid marker '{input}': {reason}")]
pub struct MarkerError {
    pub input: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerOp {
    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Compatible,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerValue {
    Key(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Marker {
    Expression {
        lhs: MarkerValue,
        op: MarkerOp,
        rhs: MarkerValue,
    },
    And(Vec<Marker>),
    Or(Vec<Marker>),
}

/// Key/value description of a target environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerEnvironment {
    values: BTreeMap<String, String>,
}

impl MarkerEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe the host running this process
    pub fn current() -> Self {
        let os_name = if cfg!(windows) { "nt" } else { "posix" };
        let sys_platform = match std::env::consts::OS {
            "macos" => "darwin",
            "windows" => "win32",
            other => other,
        };
        let platform_system = match std::env::consts::OS {
            "macos" => "Darwin",
            "windows" => "Windows",
            "linux" => "Linux",
            other => other,
        };

        Self::new()
            .with("os_name", os_name)
            .with("sys_platform", sys_platform)
            .with("platform_system", platform_system)
            .with("platform_machine", std::env::consts::ARCH)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Stable textual identity, used as part of memoization keys
    pub fn fingerprint(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl Marker {
    pub fn parse(input: &str) -> Result<Self, MarkerError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
        };
        let marker = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing tokens"));
        }
        Ok(marker)
    }

    /// `extra == "<name>"`
    pub fn extra(name: &str) -> Self {
        Marker::Expression {
            lhs: MarkerValue::Key("extra".to_string()),
            op: MarkerOp::Equal,
            rhs: MarkerValue::Literal(name.to_string()),
        }
    }

    pub fn and(self, other: Marker) -> Marker {
        match (self, other) {
            (Marker::And(mut left), Marker::And(right)) => {
                left.extend(right);
                Marker::And(left)
            },
            (Marker::And(mut left), right) => {
                left.push(right);
                Marker::And(left)
            },
            (left, right) => Marker::And(vec![left, right]),
        }
    }

    pub fn or(self, other: Marker) -> Marker {
        match (self, other) {
            (Marker::Or(mut left), Marker::Or(right)) => {
                left.extend(right);
                Marker::Or(left)
            },
            (Marker::Or(mut left), right) => {
                left.push(right);
                Marker::Or(left)
            },
            (left, right) => Marker::Or(vec![left, right]),
        }
    }

    pub fn evaluate(&self, env: &MarkerEnvironment, extras: &BTreeSet<String>) -> bool {
        match self {
            Marker::And(children) => children.iter().all(|m| m.evaluate(env, extras)),
            Marker::Or(children) => children.iter().any(|m| m.evaluate(env, extras)),
            Marker::Expression { lhs, op, rhs } => evaluate_expression(lhs, *op, rhs, env, extras),
        }
    }

    /// Whether this marker refers to the `extra` key anywhere
    pub fn mentions_extra(&self) -> bool {
        match self {
            Marker::And(children) | Marker::Or(children) => {
                children.iter().any(Marker::mentions_extra)
            },
            Marker::Expression { lhs, rhs, .. } => {
                matches!(lhs, MarkerValue::Key(k) if k == "extra")
                    || matches!(rhs, MarkerValue::Key(k) if k == "extra")
            },
        }
    }
}

fn evaluate_expression(
    lhs: &MarkerValue,
    op: MarkerOp,
    rhs: &MarkerValue,
    env: &MarkerEnvironment,
    extras: &BTreeSet<String>,
) -> bool {
    // `extra` compares against the set of active extras, not a single value
    let extra_literal = match (lhs, rhs) {
        (MarkerValue::Key(k), MarkerValue::Literal(v)) if k == "extra" => Some(v),
        (MarkerValue::Literal(v), MarkerValue::Key(k)) if k == "extra" => Some(v),
        _ => None,
    };
    if let Some(value) = extra_literal {
        let active = extras.contains(&normalize_extra(value));
        return match op {
            MarkerOp::Equal => active,
            MarkerOp::NotEqual => !active,
            _ => false,
        };
    }

    let resolve = |value: &MarkerValue| -> String {
        match value {
            MarkerValue::Key(key) => env.get(key).unwrap_or_default().to_string(),
            MarkerValue::Literal(literal) => literal.clone(),
        }
    };
    let left = resolve(lhs);
    let right = resolve(rhs);
    let versions = left.parse::<Version>().ok().zip(right.parse::<Version>().ok());

    match op {
        MarkerOp::Equal => match &versions {
            Some((l, r)) => l == r,
            None => left == right,
        },
        MarkerOp::NotEqual => match &versions {
            Some((l, r)) => l != r,
            None => left != right,
        },
        MarkerOp::Less => compare(&versions, &left, &right).is_lt(),
        MarkerOp::LessEq => compare(&versions, &left, &right).is_le(),
        MarkerOp::Greater => compare(&versions, &left, &right).is_gt(),
        MarkerOp::GreaterEq => compare(&versions, &left, &right).is_ge(),
        MarkerOp::Compatible => match (&versions, super::version::PartialVersion::parse(&right)) {
            (Some((l, r)), Ok(partial)) => match partial.compatible_upper() {
                Some(upper) => l >= r && *l < upper,
                None => false,
            },
            _ => false,
        },
        MarkerOp::In => right.contains(&left),
        MarkerOp::NotIn => !right.contains(&left),
    }
}

fn compare(versions: &Option<(Version, Version)>, left: &str, right: &str) -> std::cmp::Ordering {
    match versions {
        Some((l, r)) => l.cmp(r),
        None => left.cmp(right),
    }
}

/// Extras follow the same normalization as package names
pub fn normalize_extra(name: &str) -> String {
    super::package::PackageName::new(name).as_str().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Op(MarkerOp),
    Ident(String),
    Str(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, MarkerError> {
    let err = |reason: &str| MarkerError {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            },
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            },
            '"' | '\'' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == c)
                    .map(|p| start + p)
                    .ok_or_else(|| err("unterminated string"))?;
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            },
            '<' | '>' | '=' | '!' | '~' => {
                let start = i;
                while i < chars.len() && matches!(chars[i], '<' | '>' | '=' | '!' | '~') {
                    i += 1;
                }
                let op: String = chars[start..i].iter().collect();
                let op = match op.as_str() {
                    "==" | "===" => MarkerOp::Equal,
                    "!=" => MarkerOp::NotEqual,
                    "<" => MarkerOp::Less,
                    "<=" => MarkerOp::LessEq,
                    ">" => MarkerOp::Greater,
                    ">=" => MarkerOp::GreaterEq,
                    "~=" => MarkerOp::Compatible,
                    _ => return Err(err(&format!("unknown operator '{}'", op))),
                };
                tokens.push(Token::Op(op));
            },
            c if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '.' | '-'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "in" => tokens.push(Token::Op(MarkerOp::In)),
                    "not" => {
                        // only valid as the first half of `not in`
                        tokens.push(Token::Op(MarkerOp::NotIn));
                        let skipped = chars[i..].iter().take_while(|c| c.is_whitespace()).count();
                        let rest = &chars[i + skipped..];
                        if rest.len() < 2 || rest[0] != 'i' || rest[1] != 'n' {
                            return Err(err("expected 'in' after 'not'"));
                        }
                        i += skipped + 2;
                    },
                    _ => tokens.push(Token::Ident(word)),
                }
            },
            other => return Err(err(&format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> MarkerError {
        MarkerError {
            input: self.input.to_string(),
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Marker, MarkerError> {
        let mut children = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Marker::Or(children)
        })
    }

    fn parse_and(&mut self) -> Result<Marker, MarkerError> {
        let mut children = vec![self.parse_atom()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            children.push(self.parse_atom()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Marker::And(children)
        })
    }

    fn parse_atom(&mut self) -> Result<Marker, MarkerError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            return match self.next() {
                Some(Token::RParen) => Ok(inner),
                _ => Err(self.error("missing closing parenthesis")),
            };
        }

        let lhs = self.parse_value()?;
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(self.error("expected a comparison operator")),
        };
        let rhs = self.parse_value()?;
        Ok(Marker::Expression { lhs, op, rhs })
    }

    fn parse_value(&mut self) -> Result<MarkerValue, MarkerError> {
        match self.next() {
            Some(Token::Ident(key)) => Ok(MarkerValue::Key(key)),
            Some(Token::Str(literal)) => Ok(MarkerValue::Literal(literal)),
            _ => Err(self.error("expected a marker key or quoted string")),
        }
    }
}

impl FromStr for Marker {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Marker::parse(s)
    }
}

impl fmt::Display for MarkerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MarkerOp::Equal => "==",
            MarkerOp::NotEqual => "!=",
            MarkerOp::Less => "<",
            MarkerOp::LessEq => "<=",
            MarkerOp::Greater => ">",
            MarkerOp::GreaterEq => ">=",
            MarkerOp::Compatible => "~=",
            MarkerOp::In => "in",
            MarkerOp::NotIn => "not in",
        };
        f.write_str(text)
    }
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerValue::Key(key) => f.write_str(key),
            MarkerValue::Literal(literal) => write!(f, "\"{}\"", literal),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Expression { lhs, op, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            Marker::And(children) => {
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" and ")?;
                    }
                    match child {
                        Marker::Or(_) => write!(f, "({})", child)?,
                        _ => write!(f, "{}", child)?,
                    }
                }
                Ok(())
            },
            Marker::Or(children) => {
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{}", child)?;
                }
                Ok(())
            },
        }
    }
}

impl Serialize for Marker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Marker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux() -> MarkerEnvironment {
        MarkerEnvironment::new()
            .with("os_name", "posix")
            .with("sys_platform", "linux")
            .with("python_version", "3.11")
    }

    fn no_extras() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[test]
    fn test_simple_equality() {
        let marker = Marker::parse("sys_platform == 'linux'").unwrap();
        assert!(marker.evaluate(&linux(), &no_extras()));

        let marker = Marker::parse("sys_platform == \"win32\"").unwrap();
        assert!(!marker.evaluate(&linux(), &no_extras()));
    }

    #[test]
    fn test_boolean_combinators_and_parentheses() {
        let marker =
            Marker::parse("os_name == 'posix' and (sys_platform == 'darwin' or sys_platform == 'linux')")
                .unwrap();
        assert!(marker.evaluate(&linux(), &no_extras()));
        assert_eq!(
            marker.to_string(),
            "os_name == \"posix\" and (sys_platform == \"darwin\" or sys_platform == \"linux\")"
        );
    }

    #[test]
    fn test_version_comparison() {
        let marker = Marker::parse("python_version >= '3.8'").unwrap();
        assert!(marker.evaluate(&linux(), &no_extras()));

        let marker = Marker::parse("python_version < '3.10'").unwrap();
        assert!(!marker.evaluate(&linux(), &no_extras()));
    }

    #[test]
    fn test_in_and_not_in() {
        let marker = Marker::parse("'lin' in sys_platform").unwrap();
        assert!(marker.evaluate(&linux(), &no_extras()));

        let marker = Marker::parse("sys_platform not in 'win32 cygwin'").unwrap();
        assert!(marker.evaluate(&linux(), &no_extras()));
    }

    #[test]
    fn test_extra_uses_active_set() {
        let marker = Marker::parse("extra == 'TLS'").unwrap();
        assert!(marker.mentions_extra());
        assert!(!marker.evaluate(&linux(), &no_extras()));

        let extras = BTreeSet::from(["tls".to_string()]);
        assert!(marker.evaluate(&linux(), &extras));
    }

    #[test]
    fn test_invalid_markers() {
        assert!(Marker::parse("sys_platform ==").is_err());
        assert!(Marker::parse("(os_name == 'posix'").is_err());
        assert!(Marker::parse("os_name <> 'posix'").is_err());
        assert!(Marker::parse("os_name == 'posix").is_err());
    }

    #[test]
    fn test_environment_fingerprint_is_stable() {
        let a = MarkerEnvironment::new().with("b", "2").with("a", "1");
        let b = MarkerEnvironment::new().with("a", "1").with("b", "2");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), "a=1;b=2");
    }
}
