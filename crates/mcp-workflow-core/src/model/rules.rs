//! Typed boolean predicates used by switch and loop nodes.
//!
//! Each rule implements [`Rule::test`] against a JSON value. Numeric
//! comparisons coerce integers and floats; `between` is inclusive on both
//! ends; `regex_match` anchors at the start of the input while
//! `regex_search` matches anywhere.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    Any,
    Gt { value: Value },
    Lt { value: Value },
    Gte { value: Value },
    Lte { value: Value },
    Eq { value: Value },
    Neq { value: Value },
    Between { value: Value, value2: Value },
    Contains { value: Value },
    RegexMatch { value: String },
    RegexSearch { value: String },
    Truthy,
    Falsy,
}

impl Rule {
    pub fn test(&self, value: &Value) -> bool {
        match self {
            Rule::Any => true,
            Rule::Gt { value: rhs } => compare(value, rhs).is_some_and(|o| o.is_gt()),
            Rule::Lt { value: rhs } => compare(value, rhs).is_some_and(|o| o.is_lt()),
            Rule::Gte { value: rhs } => compare(value, rhs).is_some_and(|o| o.is_ge()),
            Rule::Lte { value: rhs } => compare(value, rhs).is_some_and(|o| o.is_le()),
            Rule::Eq { value: rhs } => loose_eq(value, rhs),
            Rule::Neq { value: rhs } => !loose_eq(value, rhs),
            Rule::Between { value: lo, value2: hi } => {
                compare(value, lo).is_some_and(|o| o.is_ge())
                    && compare(value, hi).is_some_and(|o| o.is_le())
            }
            Rule::Contains { value: needle } => contains(value, needle),
            Rule::RegexMatch { value: pattern } => regex_from(pattern)
                .and_then(|re| {
                    let text = value.as_str()?;
                    Some(re.find(text).is_some_and(|m| m.start() == 0))
                })
                .unwrap_or(false),
            Rule::RegexSearch { value: pattern } => regex_from(pattern)
                .and_then(|re| Some(re.is_match(value.as_str()?)))
                .unwrap_or(false),
            Rule::Truthy => is_truthy(value),
            Rule::Falsy => !is_truthy(value),
        }
    }
}

fn regex_from(pattern: &str) -> Option<regex::Regex> {
    regex::Regex::new(pattern)
        .map_err(|e| tracing::warn!(pattern, error = %e, "invalid rule regex"))
        .ok()
}

fn compare(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    if let (Value::Number(a), Value::Number(b)) = (lhs, rhs) {
        return a.as_f64() == b.as_f64();
    }
    lhs == rhs
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Object(map) => needle.as_str().is_some_and(|n| map.contains_key(n)),
        _ => false,
    }
}

/// Truthiness over JSON values: null, false, zero and empty containers are
/// falsy; everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rules_any() {
        let rule = Rule::Any;
        assert!(rule.test(&json!(42)));
        assert!(rule.test(&json!(false)));
    }

    #[test]
    fn test_rules_gt() {
        let rule = Rule::Gt { value: json!(2) };
        assert!(rule.test(&json!(3)));
        assert!(!rule.test(&json!(2)));
    }

    #[test]
    fn test_rules_lt() {
        let rule = Rule::Lt { value: json!(2) };
        assert!(!rule.test(&json!(3)));
        assert!(!rule.test(&json!(2)));
        assert!(rule.test(&json!(1)));
    }

    #[test]
    fn test_rules_gte() {
        let rule = Rule::Gte { value: json!(2) };
        assert!(rule.test(&json!(3)));
        assert!(rule.test(&json!(2)));
        assert!(!rule.test(&json!(0.5)));
    }

    #[test]
    fn test_rules_lte() {
        let rule = Rule::Lte { value: json!(2) };
        assert!(!rule.test(&json!(3)));
        assert!(rule.test(&json!(2)));
        assert!(rule.test(&json!(0.5)));
    }

    #[test]
    fn test_rules_eq() {
        let rule = Rule::Eq { value: json!(2) };
        assert!(!rule.test(&json!(3)));
        assert!(rule.test(&json!(2)));
        assert!(rule.test(&json!(2.0)));
        assert!(!rule.test(&json!(0.5)));
    }

    #[test]
    fn test_rules_neq() {
        let rule = Rule::Neq { value: json!(2) };
        assert!(rule.test(&json!(3)));
        assert!(!rule.test(&json!(2)));
        assert!(rule.test(&json!(0.5)));
    }

    #[test]
    fn test_rules_between() {
        let rule = Rule::Between {
            value: json!(2),
            value2: json!(4),
        };
        assert!(rule.test(&json!(3)));
        assert!(rule.test(&json!(2)));
        assert!(rule.test(&json!(4)));
        assert!(!rule.test(&json!(0.5)));
    }

    #[test]
    fn test_rules_contains() {
        let rule = Rule::Contains { value: json!(2) };
        assert!(rule.test(&json!(["a", 2])));
        assert!(!rule.test(&json!([])));

        let rule = Rule::Contains { value: json!("b") };
        assert!(rule.test(&json!("abc")));
        assert!(rule.test(&json!({"b": 1})));
    }

    #[test]
    fn test_rules_regex_match() {
        let rule = Rule::RegexMatch {
            value: "Xa+".into(),
        };
        assert!(rule.test(&json!("Xa123")));
        assert!(!rule.test(&json!("xXa")));

        let rule = Rule::RegexMatch {
            value: "^Xa+$".into(),
        };
        assert!(rule.test(&json!("Xaa")));
        assert!(!rule.test(&json!("Xa123")));
    }

    #[test]
    fn test_rules_regex_search() {
        let rule = Rule::RegexSearch {
            value: "Xa+".into(),
        };
        assert!(rule.test(&json!("Xa123")));
        assert!(rule.test(&json!("xXa")));

        let rule = Rule::RegexSearch {
            value: "^Xa+$".into(),
        };
        assert!(!rule.test(&json!("1Xaa")));
        assert!(!rule.test(&json!("Xa123")));
        assert!(rule.test(&json!("Xaa")));
    }

    #[test]
    fn test_rules_truthy() {
        let rule = Rule::Truthy;
        assert!(rule.test(&json!("abc")));
        assert!(!rule.test(&json!({})));
    }

    #[test]
    fn test_rules_falsy() {
        let rule = Rule::Falsy;
        assert!(rule.test(&json!([])));
        assert!(!rule.test(&json!(1)));
    }

    #[test]
    fn test_rule_serde_tags() {
        let rule: Rule = serde_json::from_value(json!({"type": "gte", "value": 2})).unwrap();
        assert_eq!(rule, Rule::Gte { value: json!(2) });

        let encoded = serde_json::to_value(&Rule::Between {
            value: json!(1),
            value2: json!(9),
        })
        .unwrap();
        assert_eq!(encoded, json!({"type": "between", "value": 1, "value2": 9}));
    }
}
