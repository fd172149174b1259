//! The `<operator><integer>` condition mini-language.
//!
//! Conditions compare a match count against a threshold, e.g. `">=1"`,
//! `"==2"` or `"!= 0"`. The operator must come first; whitespace around
//! either part is tolerated.
//!
//! ```
//! use verdict_common::Condition;
//!
//! let cond: Condition = ">=2".parse().unwrap();
//! assert!(!cond.evaluate(1));
//! assert!(cond.evaluate(2));
//! ```

use crate::errors::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Equal,
    NotEqual,
    GreaterOrEqual,
    LessOrEqual,
    Greater,
    Less,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
            Comparison::GreaterOrEqual => ">=",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::Less => "<",
        }
    }
}

// Two-character operators first so ">=" is never read as ">".
const OPERATORS: [Comparison; 6] = [
    Comparison::Equal,
    Comparison::NotEqual,
    Comparison::GreaterOrEqual,
    Comparison::LessOrEqual,
    Comparison::Greater,
    Comparison::Less,
];

/// A parsed count condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Condition {
    op: Comparison,
    value: i64,
}

impl Condition {
    pub fn new(op: Comparison, value: i64) -> Self {
        Self { op, value }
    }

    /// `>=n`
    pub fn at_least(value: i64) -> Self {
        Self::new(Comparison::GreaterOrEqual, value)
    }

    /// `==n`
    pub fn exactly(value: i64) -> Self {
        Self::new(Comparison::Equal, value)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let op = OPERATORS
            .iter()
            .copied()
            .find(|op| trimmed.starts_with(op.symbol()))
            .ok_or_else(|| {
                Error::validation(format!(
                    "Invalid condition '{}': must start with one of ==, !=, >=, <=, >, <",
                    text
                ))
            })?;

        let number = trimmed[op.symbol().len()..].trim();
        let value = number.parse::<i64>().map_err(|_| {
            Error::validation(format!(
                "Invalid condition '{}': '{}' is not an integer",
                text, number
            ))
        })?;

        Ok(Self { op, value })
    }

    pub fn op(&self) -> Comparison {
        self.op
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// Evaluates the condition against an actual count.
    pub fn evaluate(&self, count: i64) -> bool {
        match self.op {
            Comparison::Equal => count == self.value,
            Comparison::NotEqual => count != self.value,
            Comparison::GreaterOrEqual => count >= self.value,
            Comparison::LessOrEqual => count <= self.value,
            Comparison::Greater => count > self.value,
            Comparison::Less => count < self.value,
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::at_least(1)
    }
}

impl FromStr for Condition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.value)
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Condition::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_operators() {
        let cases = [
            ("==2", Comparison::Equal, 2),
            ("!=0", Comparison::NotEqual, 0),
            (">=1", Comparison::GreaterOrEqual, 1),
            ("<=5", Comparison::LessOrEqual, 5),
            (">3", Comparison::Greater, 3),
            ("<10", Comparison::Less, 10),
        ];
        for (text, op, value) in cases {
            let cond = Condition::parse(text).unwrap();
            assert_eq!(cond.op(), op, "operator of {}", text);
            assert_eq!(cond.value(), value, "value of {}", text);
        }
    }

    #[test]
    fn test_whitespace_tolerated() {
        let cond = Condition::parse("  >=  4 ").unwrap();
        assert_eq!(cond, Condition::at_least(4));
        assert_eq!(cond.to_string(), ">=4");
    }

    #[test]
    fn test_evaluate() {
        let eq = Condition::exactly(2);
        assert!(eq.evaluate(2));
        assert!(!eq.evaluate(3));

        let lt = Condition::parse("<2").unwrap();
        assert!(lt.evaluate(0));
        assert!(!lt.evaluate(2));

        let ne = Condition::parse("!=0").unwrap();
        assert!(ne.evaluate(7));
        assert!(!ne.evaluate(0));
    }

    #[test]
    fn test_invalid_conditions() {
        for text in ["", "2", "=2", ">=", ">=x", "=>1", ">= 1.5"] {
            let err = Condition::parse(text).unwrap_err();
            assert!(matches!(err, Error::Validation { .. }), "{:?} should be rejected", text);
        }
    }

    #[test]
    fn test_default_is_at_least_one() {
        assert_eq!(Condition::default().to_string(), ">=1");
    }

    #[test]
    fn test_yaml_round_trip() {
        let cond: Condition = serde_yaml::from_str("\"<=3\"").unwrap();
        assert_eq!(cond, Condition::parse("<=3").unwrap());
        assert!(serde_yaml::from_str::<Condition>("\"~3\"").is_err());
    }
}
