// src/context/condition.rs

//! Run conditions attached to tasks.
//!
//! Grammar (one comparison per condition):
//!
//! ```text
//! key            truthy value present
//! !key           missing or falsy
//! key == lit     key != lit
//! key >  lit     key >= lit     key < lit     key <= lit
//! key =~ regex
//! ```
//!
//! Literals are `true`/`false`, integers, floats, or strings (quoted with
//! `'` / `"`, or bare).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::context::Value;

static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(!)?\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*(?:(==|!=|>=|<=|=~|>|<)\s*(.+?))?\s*$")
        .expect("condition grammar regex is valid")
});

#[derive(Debug, Clone)]
enum Test {
    Truthy { negated: bool },
    Compare { op: CompareOp, literal: Value },
    Matches(Regex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// A parsed task condition.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    key: String,
    test: Test,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, String> {
        let caps = CONDITION_RE
            .captures(source)
            .ok_or_else(|| "expected `key`, `!key` or `key <op> value`".to_string())?;

        let negated = caps.get(1).is_some();
        let key = caps[2].to_string();

        let test = match (caps.get(3), caps.get(4)) {
            (None, _) => Test::Truthy { negated },
            (Some(_), _) if negated => {
                return Err("negation only applies to a bare key".to_string());
            }
            (Some(op), Some(rhs)) => match op.as_str() {
                "=~" => {
                    let pattern = unquote(rhs.as_str());
                    let re = Regex::new(pattern)
                        .map_err(|e| format!("invalid regex '{pattern}': {e}"))?;
                    Test::Matches(re)
                }
                other => Test::Compare {
                    op: match other {
                        "==" => CompareOp::Eq,
                        "!=" => CompareOp::Ne,
                        ">" => CompareOp::Gt,
                        ">=" => CompareOp::Ge,
                        "<" => CompareOp::Lt,
                        _ => CompareOp::Le,
                    },
                    literal: parse_literal(rhs.as_str()),
                },
            },
            (Some(_), None) => return Err("operator without a value".to_string()),
        };

        Ok(Self {
            source: source.trim().to_string(),
            key,
            test,
        })
    }

    /// The context key this condition reads.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn evaluate(&self, values: &BTreeMap<String, Value>) -> bool {
        let current = values.get(&self.key);
        match &self.test {
            Test::Truthy { negated } => {
                let truthy = current.map(Value::is_truthy).unwrap_or(false);
                truthy != *negated
            }
            Test::Matches(re) => current.is_some_and(|v| re.is_match(&v.to_string())),
            Test::Compare { op, literal } => {
                let Some(current) = current else {
                    return *op == CompareOp::Ne;
                };
                match op {
                    CompareOp::Eq => current.loosely_eq(literal),
                    CompareOp::Ne => !current.loosely_eq(literal),
                    CompareOp::Gt => current.compare(literal) == Some(Ordering::Greater),
                    CompareOp::Ge => matches!(
                        current.compare(literal),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    CompareOp::Lt => current.compare(literal) == Some(Ordering::Less),
                    CompareOp::Le => matches!(
                        current.compare(literal),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                }
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    for q in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn parse_literal(raw: &str) -> Value {
    let trimmed = raw.trim();
    let unquoted = unquote(trimmed);
    if unquoted.len() != trimmed.len() {
        return Value::Text(unquoted.to_string());
    }
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Value::Float(f);
    }
    Value::Text(trimmed.to_string())
}
