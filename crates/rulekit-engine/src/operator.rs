//! The operator table.
//!
//! [`compare`] is the single shared operator evaluation used by every
//! condition handler. It is pure and total: malformed patterns, non-numeric
//! operands, and unknown operators all produce `false`, never an error.
//!
//! | Operator | Semantics |
//! |---|---|
//! | `=` / `!=` | string-cast equality |
//! | `>` `>=` `<` `<=` | numeric, false unless both sides are numeric |
//! | `LIKE` / `NOT LIKE` | case-insensitive anchored wildcard (`*`, `?`) |
//! | `REGEXP` | `/pattern/flags` as a raw regex, otherwise a wildcard |
//! | `IN` / `NOT IN` | string-cast membership in a list |
//! | `EXISTS` / `NOT EXISTS` | non-empty, zero counts as present |
//! | `IS` / `IS NOT` | boolean-cast equality |

use std::fmt;
use std::str::FromStr;

use regex::RegexBuilder;
use rulekit_core::errors::RuleError;
use rulekit_core::value::{as_numeric, cast_bool, cast_string, exists};
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::normalize_operator;

/// Regex flags accepted after the closing delimiter.
const REGEX_FLAGS: &str = "imsxu";

/// A recognized comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// `REGEXP`
    Regexp,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `EXISTS`
    Exists,
    /// `NOT EXISTS`
    NotExists,
    /// `IS`
    Is,
    /// `IS NOT`
    IsNot,
}

impl Operator {
    /// Every operator, in table order.
    pub fn all() -> &'static [Operator] {
        &[
            Self::Eq,
            Self::NotEq,
            Self::Gt,
            Self::Gte,
            Self::Lt,
            Self::Lte,
            Self::Like,
            Self::NotLike,
            Self::Regexp,
            Self::In,
            Self::NotIn,
            Self::Exists,
            Self::NotExists,
            Self::Is,
            Self::IsNot,
        ]
    }

    /// Parse an operator, ignoring case and surrounding/inner whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        let op = match normalize_operator(raw).as_str() {
            "=" => Self::Eq,
            "!=" => Self::NotEq,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            "LIKE" => Self::Like,
            "NOT LIKE" => Self::NotLike,
            "REGEXP" => Self::Regexp,
            "IN" => Self::In,
            "NOT IN" => Self::NotIn,
            "EXISTS" => Self::Exists,
            "NOT EXISTS" => Self::NotExists,
            "IS" => Self::Is,
            "IS NOT" => Self::IsNot,
            _ => return None,
        };
        Some(op)
    }

    /// Canonical spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Regexp => "REGEXP",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Exists => "EXISTS",
            Self::NotExists => "NOT EXISTS",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
        }
    }

    /// Operators that take a whole list as their expected value instead of
    /// being applied per element.
    pub fn consumes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| RuleError::UnknownOperator {
            operator: normalize_operator(s),
        })
    }
}

/// Compare `actual` against `expected` under an operator string.
///
/// Unknown operators are logged and evaluate to `false`.
pub fn compare(actual: &Value, expected: &Value, operator: &str) -> bool {
    match operator.parse::<Operator>() {
        Ok(op) => compare_with(actual, expected, op),
        Err(e) => {
            warn!(error = %e, "unknown operator, evaluating as false");
            false
        }
    }
}

/// Compare under an already-parsed operator.
pub fn compare_with(actual: &Value, expected: &Value, op: Operator) -> bool {
    match op {
        Operator::Eq => cast_string(actual) == cast_string(expected),
        Operator::NotEq => cast_string(actual) != cast_string(expected),
        Operator::Gt => numeric(actual, expected, |a, e| a > e),
        Operator::Gte => numeric(actual, expected, |a, e| a >= e),
        Operator::Lt => numeric(actual, expected, |a, e| a < e),
        Operator::Lte => numeric(actual, expected, |a, e| a <= e),
        Operator::Like => wildcard_match(&cast_string(actual), &cast_string(expected)),
        Operator::NotLike => !wildcard_match(&cast_string(actual), &cast_string(expected)),
        Operator::Regexp => regexp_match(&cast_string(actual), &cast_string(expected)),
        Operator::In => contains(expected, actual),
        Operator::NotIn => !contains(expected, actual),
        Operator::Exists => exists(actual),
        Operator::NotExists => !exists(actual),
        Operator::Is => cast_bool(actual) == cast_bool(expected),
        Operator::IsNot => cast_bool(actual) != cast_bool(expected),
    }
}

fn numeric(actual: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (as_numeric(actual), as_numeric(expected)) {
        (Some(a), Some(e)) => cmp(a, e),
        _ => false,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    let needle = cast_string(needle);
    match haystack {
        Value::Array(items) => items.iter().any(|item| cast_string(item) == needle),
        single => cast_string(single) == needle,
    }
}

/// Case-insensitive, anchored wildcard match: `*` is any run of characters,
/// `?` is exactly one.
pub fn wildcard_match(value: &str, pattern: &str) -> bool {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');

    match RegexBuilder::new(&source)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
    {
        Ok(re) => re.is_match(value),
        Err(e) => {
            debug!(pattern, error = %e, "wildcard pattern failed to compile");
            false
        }
    }
}

/// Split `/body/flags` into its parts. `None` when not delimiter-wrapped.
fn split_delimited(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);
    flags
        .chars()
        .all(|c| REGEX_FLAGS.contains(c))
        .then_some((body, flags))
}

/// `REGEXP`: raw regex for `/…/flags`, wildcard otherwise.
pub fn regexp_match(value: &str, pattern: &str) -> bool {
    let Some((body, flags)) = split_delimited(pattern) else {
        return wildcard_match(value, pattern);
    };

    match RegexBuilder::new(body)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()
    {
        Ok(re) => re.is_match(value),
        Err(e) => {
            warn!(pattern, error = %e, "malformed regular expression, evaluating as false");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulekit_core::logging::capture_logs;
    use serde_json::json;
    use tracing::Level;

    #[test]
    fn parse_is_case_and_space_insensitive() {
        assert_eq!(Operator::parse("like"), Some(Operator::Like));
        assert_eq!(Operator::parse(" Not   Like "), Some(Operator::NotLike));
        assert_eq!(Operator::parse("is not"), Some(Operator::IsNot));
        assert_eq!(Operator::parse("=="), None);
    }

    #[test]
    fn every_operator_round_trips_its_spelling() {
        for op in Operator::all() {
            assert_eq!(Operator::parse(op.as_str()), Some(*op));
            assert_eq!(op.to_string(), op.as_str());
        }
    }

    #[test]
    fn from_str_reports_unknown() {
        let err = "between".parse::<Operator>().unwrap_err();
        assert_eq!(err.to_string(), "unknown operator: BETWEEN");
    }

    #[test]
    fn equality_is_string_cast() {
        assert!(compare(&json!("POST"), &json!("POST"), "="));
        assert!(compare(&json!(10), &json!("10"), "="));
        assert!(compare(&json!(true), &json!("1"), "="));
        assert!(compare(&json!({"a": 1}), &json!(""), "="));
        assert!(!compare(&json!("post"), &json!("POST"), "="));
        assert!(compare(&json!("a"), &json!("b"), "!="));
    }

    #[test]
    fn numeric_operators() {
        assert!(!compare(&json!("abc"), &json!("5"), ">"));
        assert!(compare(&json!("10"), &json!("5"), ">"));
        assert!(compare(&json!(5), &json!("5"), ">="));
        assert!(compare(&json!("2.5"), &json!(3), "<"));
        assert!(compare(&json!("3"), &json!(3), "<="));
        assert!(!compare(&json!("10"), &json!("x"), "<"));
        assert!(!compare(&Value::Null, &json!(0), ">="));
    }

    #[test]
    fn in_coerces_scalar_expected() {
        assert!(!compare(&json!("10"), &json!("5"), "IN"));
        assert!(compare(&json!("5"), &json!("5"), "IN"));
        assert!(compare(&json!("b"), &json!(["a", "b"]), "IN"));
        assert!(compare(&json!(2), &json!(["1", "2"]), "in"));
        assert!(compare(&json!("z"), &json!(["a", "b"]), "NOT IN"));
        assert!(!compare(&json!("a"), &json!(["a", "b"]), "NOT IN"));
    }

    #[test]
    fn exists_treats_zero_as_present() {
        assert!(compare(&json!(0), &json!(""), "EXISTS"));
        assert!(!compare(&json!(""), &json!(""), "EXISTS"));
        assert!(compare(&json!("0"), &json!(""), "EXISTS"));
        assert!(compare(&Value::Null, &json!(""), "NOT EXISTS"));
        assert!(!compare(&json!("x"), &json!(""), "NOT EXISTS"));
    }

    #[test]
    fn is_compares_booleans() {
        assert!(compare(&json!(true), &json!(true), "IS"));
        assert!(compare(&json!("yes"), &json!(1), "IS"));
        assert!(compare(&json!(""), &json!(false), "IS"));
        assert!(compare(&json!("0"), &json!("false"), "IS"));
        assert!(compare(&json!(1), &json!(false), "IS NOT"));
    }

    #[test]
    fn like_wildcards() {
        assert!(compare(&json!("report-2024.pdf"), &json!("report*"), "LIKE"));
        assert!(!compare(&json!("notreport"), &json!("report*"), "LIKE"));
        assert!(compare(&json!("REPORT.PDF"), &json!("report.pdf"), "LIKE"));
        assert!(compare(&json!("cat"), &json!("c?t"), "LIKE"));
        assert!(!compare(&json!("cart"), &json!("c?t"), "LIKE"));
        assert!(compare(&json!("a+b(c)"), &json!("a+b(*)"), "LIKE"));
        assert!(compare(&json!("notreport"), &json!("report*"), "NOT LIKE"));
    }

    #[test]
    fn regexp_delimited_and_fallback() {
        assert!(compare(&json!("order-123"), &json!("/^order-\\d+$/"), "REGEXP"));
        assert!(!compare(&json!("ORDER-123"), &json!("/^order-\\d+$/"), "REGEXP"));
        assert!(compare(&json!("ORDER-123"), &json!("/^order-\\d+$/i"), "REGEXP"));
        assert!(compare(&json!("xx order-1 yy"), &json!("/order-\\d/"), "REGEXP"));
        assert!(compare(&json!("report-1"), &json!("report*"), "REGEXP"));
        assert!(compare(&json!("xa/bx"), &json!("/a/b/"), "REGEXP"));
    }

    #[test]
    fn malformed_regex_is_false_and_logged() {
        let (logs, _guard) = capture_logs();
        assert!(!compare(&json!("abc"), &json!("/([a-z/"), "REGEXP"));
        assert!(logs.has_event(Level::WARN, "malformed regular expression"));
    }

    #[test]
    fn unknown_operator_is_false_and_logged() {
        let (logs, _guard) = capture_logs();
        assert!(!compare(&json!("a"), &json!("a"), "BETWEEN"));
        assert!(logs.has_event(Level::WARN, "unknown operator"));
    }

    #[test]
    fn split_delimited_requires_flag_chars() {
        assert_eq!(split_delimited("/abc/i"), Some(("abc", "i")));
        assert_eq!(split_delimited("/a/b/"), Some(("a/b", "")));
        assert_eq!(split_delimited("/abc/zz"), None);
        assert_eq!(split_delimited("abc"), None);
        assert_eq!(split_delimited("/abc"), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn any_value() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(|n| json!(n)),
                (-1.0e6f64..1.0e6).prop_map(|f| json!(f)),
                ".{0,12}".prop_map(Value::String),
            ];
            leaf.prop_recursive(2, 8, 4, |inner| {
                prop_oneof![
                    proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    proptest::collection::hash_map("[a-z]{1,3}", inner, 0..3)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        fn any_operator() -> impl Strategy<Value = String> {
            prop_oneof![
                proptest::sample::select(Operator::all().to_vec()).prop_map(|op| op.as_str().to_lowercase()),
                ".{0,8}",
            ]
        }

        proptest! {
            #[test]
            fn compare_is_total_and_pure(
                actual in any_value(),
                expected in any_value(),
                operator in any_operator(),
            ) {
                let first = compare(&actual, &expected, &operator);
                let second = compare(&actual, &expected, &operator);
                prop_assert_eq!(first, second);
            }

            #[test]
            fn regexp_never_panics(value in ".{0,16}", pattern in "/.{0,12}/[imsx]{0,2}") {
                let _ = regexp_match(&value, &pattern);
            }

            #[test]
            fn negated_operators_are_complements(actual in any_value(), expected in any_value()) {
                prop_assert_ne!(compare_with(&actual, &expected, Operator::Eq), compare_with(&actual, &expected, Operator::NotEq));
                prop_assert_ne!(compare_with(&actual, &expected, Operator::Like), compare_with(&actual, &expected, Operator::NotLike));
                prop_assert_ne!(compare_with(&actual, &expected, Operator::In), compare_with(&actual, &expected, Operator::NotIn));
                prop_assert_ne!(compare_with(&actual, &expected, Operator::Exists), compare_with(&actual, &expected, Operator::NotExists));
                prop_assert_ne!(compare_with(&actual, &expected, Operator::Is), compare_with(&actual, &expected, Operator::IsNot));
            }
        }
    }
}
