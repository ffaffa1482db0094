//! Clause matching: the operator comparison library.

use std::sync::OnceLock;

use chrono::DateTime;
use regex::Regex;
use semver::Version;
use serde_json::Value;

use crate::context::Context;
use crate::rule::{Clause, Op};

/// Evaluate a clause against a context, without segment recursion.
///
/// `segmentMatch` clauses are resolved by the evaluator, which has access to
/// the segment provider; here they match nothing, which is also the required
/// behavior for `segmentMatch` inside segment rules.
///
/// An absent context kind or attribute is a non-match regardless of
/// `negate`; negation applies only to the outcome of an actual comparison.
pub(crate) fn clause_matches_context(clause: &Clause, context: &Context) -> bool {
    if clause.op == Op::SegmentMatch {
        return false;
    }
    let Some(single) = context.individual(clause.context_kind.as_ref()) else {
        return false;
    };
    let Some(value) = single.attribute(&clause.attribute) else {
        return false;
    };
    if value.is_null() {
        return false;
    }
    let matched = match &value {
        // A list attribute matches if any element matches any clause value.
        Value::Array(elements) => elements.iter().any(|e| matches_any_clause_value(clause, e)),
        scalar => matches_any_clause_value(clause, scalar),
    };
    matched != clause.negate
}

fn matches_any_clause_value(clause: &Clause, context_value: &Value) -> bool {
    clause
        .values
        .iter()
        .any(|clause_value| apply_op(clause.op, context_value, clause_value))
}

/// Apply an operator to one context value and one clause value. Returns
/// `false` for any type mismatch, parse failure, or unknown operator.
fn apply_op(op: Op, context_value: &Value, clause_value: &Value) -> bool {
    try_apply_op(op, context_value, clause_value).unwrap_or(false)
}

fn try_apply_op(op: Op, context_value: &Value, clause_value: &Value) -> Option<bool> {
    match op {
        Op::In => Some(values_equal(context_value, clause_value)),

        Op::StartsWith => {
            Some(context_value.as_str()?.starts_with(clause_value.as_str()?))
        }
        Op::EndsWith => Some(context_value.as_str()?.ends_with(clause_value.as_str()?)),
        Op::Contains => Some(context_value.as_str()?.contains(clause_value.as_str()?)),

        Op::Matches => {
            let pattern = Regex::new(clause_value.as_str()?).ok()?;
            Some(pattern.is_match(context_value.as_str()?))
        }

        Op::LessThan | Op::LessThanOrEqual | Op::GreaterThan | Op::GreaterThanOrEqual => {
            let lhs = context_value.as_f64()?;
            let rhs = clause_value.as_f64()?;
            Some(match op {
                Op::LessThan => lhs < rhs,
                Op::LessThanOrEqual => lhs <= rhs,
                Op::GreaterThan => lhs > rhs,
                _ => lhs >= rhs,
            })
        }

        Op::Before | Op::After => {
            let lhs = parse_timestamp_millis(context_value)?;
            let rhs = parse_timestamp_millis(clause_value)?;
            Some(if op == Op::Before { lhs < rhs } else { lhs > rhs })
        }

        Op::SemVerEqual | Op::SemVerLessThan | Op::SemVerGreaterThan => {
            let lhs = parse_semver(context_value.as_str()?)?;
            let rhs = parse_semver(clause_value.as_str()?)?;
            let ordering = lhs.cmp_precedence(&rhs);
            Some(match op {
                Op::SemVerEqual => ordering.is_eq(),
                Op::SemVerLessThan => ordering.is_lt(),
                _ => ordering.is_gt(),
            })
        }

        Op::SegmentMatch | Op::Unknown => None,
    }
}

/// Equality with numeric cross-type tolerance: the same mathematical value
/// matches across integer and float representations.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// A timestamp operand is numeric epoch milliseconds or an RFC 3339 string.
fn parse_timestamp_millis(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let time = DateTime::parse_from_rfc3339(s).ok()?;
            Some(time.timestamp_millis() as f64)
        }
        _ => None,
    }
}

/// Parse a version, tolerating missing minor/patch components ("2" and
/// "2.1" are padded to "2.0.0" and "2.1.0" before strict parsing).
fn parse_semver(s: &str) -> Option<Version> {
    if let Ok(version) = Version::parse(s) {
        return Some(version);
    }
    static LOOSE: OnceLock<Regex> = OnceLock::new();
    let loose = LOOSE.get_or_init(|| {
        Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?(.*)$").expect("static regex must parse")
    });
    let caps = loose.captures(s)?;
    let padded = format!(
        "{}.{}.{}{}",
        &caps[1],
        caps.get(2).map_or("0", |m| m.as_str()),
        caps.get(3).map_or("0", |m| m.as_str()),
        caps.get(4).map_or("", |m| m.as_str()),
    );
    Version::parse(&padded).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::ContextBuilder;
    use crate::rule::Op;

    fn clause(attribute: &str, op: Op, values: Vec<Value>) -> Clause {
        Clause {
            attribute: attribute.to_owned(),
            op,
            values,
            negate: false,
            context_kind: None,
        }
    }

    fn user_with(attribute: &str, value: Value) -> Context {
        ContextBuilder::new("key")
            .set_attribute(attribute, value)
            .build()
            .unwrap()
    }

    #[test]
    fn op_in_exact_and_numeric_equality() {
        let c = clause("x", Op::In, vec![json!("a"), json!(99)]);
        assert!(clause_matches_context(&c, &user_with("x", json!("a"))));
        assert!(clause_matches_context(&c, &user_with("x", json!(99))));
        // Same mathematical value across int/float representations.
        assert!(clause_matches_context(&c, &user_with("x", json!(99.0))));
        assert!(!clause_matches_context(&c, &user_with("x", json!("b"))));
        assert!(!clause_matches_context(&c, &user_with("x", json!("99"))));
    }

    #[test]
    fn string_operators() {
        assert!(clause_matches_context(
            &clause("email", Op::StartsWith, vec![json!("test")]),
            &user_with("email", json!("test@example.com"))
        ));
        assert!(clause_matches_context(
            &clause("email", Op::EndsWith, vec![json!("@example.com")]),
            &user_with("email", json!("test@example.com"))
        ));
        assert!(clause_matches_context(
            &clause("email", Op::Contains, vec![json!("@exam")]),
            &user_with("email", json!("test@example.com"))
        ));
        // Both operands must be strings.
        assert!(!clause_matches_context(
            &clause("n", Op::StartsWith, vec![json!("9")]),
            &user_with("n", json!(99))
        ));
    }

    #[test]
    fn regex_matches() {
        let c = clause("email", Op::Matches, vec![json!("^test.*")]);
        assert!(clause_matches_context(&c, &user_with("email", json!("test@example.com"))));
        assert!(!clause_matches_context(&c, &user_with("email", json!("example@test.com"))));
        // A bad pattern is a non-match, not an error.
        let bad = clause("email", Op::Matches, vec![json!("(unclosed")]);
        assert!(!clause_matches_context(&bad, &user_with("email", json!("anything"))));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(clause_matches_context(
            &clause("age", Op::GreaterThan, vec![json!(18)]),
            &user_with("age", json!(19))
        ));
        assert!(clause_matches_context(
            &clause("age", Op::GreaterThanOrEqual, vec![json!(18)]),
            &user_with("age", json!(18))
        ));
        assert!(clause_matches_context(
            &clause("age", Op::LessThan, vec![json!(18)]),
            &user_with("age", json!(17.5))
        ));
        assert!(clause_matches_context(
            &clause("age", Op::LessThanOrEqual, vec![json!(18)]),
            &user_with("age", json!(18))
        ));
        // Strings are not coerced to numbers.
        assert!(!clause_matches_context(
            &clause("age", Op::GreaterThan, vec![json!(18)]),
            &user_with("age", json!("19"))
        ));
    }

    #[test]
    fn timestamp_comparisons() {
        let before = clause("joined", Op::Before, vec![json!("2024-01-01T00:00:00Z")]);
        let after = clause("joined", Op::After, vec![json!("2024-01-01T00:00:00Z")]);

        assert!(clause_matches_context(&before, &user_with("joined", json!("2023-06-15T12:00:00Z"))));
        assert!(!clause_matches_context(&after, &user_with("joined", json!("2023-06-15T12:00:00Z"))));
        assert!(clause_matches_context(&after, &user_with("joined", json!("2024-06-15T12:00:00+02:00"))));

        // Numeric operands are epoch milliseconds.
        let epoch = clause("joined", Op::After, vec![json!(1_700_000_000_000_i64)]);
        assert!(clause_matches_context(&epoch, &user_with("joined", json!(1_700_000_000_001_i64))));

        // Unparseable timestamps fail gracefully to non-match.
        assert!(!clause_matches_context(&before, &user_with("joined", json!("not a date"))));
    }

    #[test]
    fn semver_comparisons() {
        let eq = clause("v", Op::SemVerEqual, vec![json!("2.0.0")]);
        assert!(clause_matches_context(&eq, &user_with("v", json!("2.0.0"))));
        // Lenient on missing minor/patch.
        assert!(clause_matches_context(&eq, &user_with("v", json!("2"))));
        assert!(clause_matches_context(&eq, &user_with("v", json!("2.0"))));

        let lt = clause("v", Op::SemVerLessThan, vec![json!("2.0.0")]);
        assert!(clause_matches_context(&lt, &user_with("v", json!("1.9.9"))));
        assert!(clause_matches_context(&lt, &user_with("v", json!("2.0.0-rc1"))));
        assert!(!clause_matches_context(&lt, &user_with("v", json!("2.0.0"))));

        let gt = clause("v", Op::SemVerGreaterThan, vec![json!("1.10.0")]);
        assert!(clause_matches_context(&gt, &user_with("v", json!("1.11"))));
        assert!(!clause_matches_context(&gt, &user_with("v", json!("1.2.0"))));

        assert!(!clause_matches_context(&eq, &user_with("v", json!("not-a-version"))));
    }

    #[test]
    fn list_attribute_matches_any_element() {
        let c = clause("groups", Op::In, vec![json!("qa")]);
        assert!(clause_matches_context(&c, &user_with("groups", json!(["dev", "qa"]))));
        assert!(!clause_matches_context(&c, &user_with("groups", json!(["dev", "ops"]))));
    }

    #[test]
    fn negation() {
        let mut c = clause("country", Op::In, vec![json!("de")]);
        c.negate = true;
        assert!(!clause_matches_context(&c, &user_with("country", json!("de"))));
        assert!(clause_matches_context(&c, &user_with("country", json!("fr"))));
        // An absent attribute is a non-match even when negated.
        assert!(!clause_matches_context(&c, &user_with("other", json!("x"))));
    }

    #[test]
    fn null_attribute_is_a_non_match() {
        let c = clause("x", Op::In, vec![json!(null)]);
        assert!(!clause_matches_context(&c, &user_with("x", json!(null))));
    }

    #[test]
    fn clause_kind_restricts_attribute_lookup() {
        let mut c = clause("key", Op::In, vec![json!("acme")]);
        c.context_kind = Some("organization".into());
        let user = ContextBuilder::new("acme").build().unwrap();
        assert!(!clause_matches_context(&c, &user));
        let org = ContextBuilder::new("acme").kind("organization").build().unwrap();
        assert!(clause_matches_context(&c, &org));
    }

    #[test]
    fn unknown_operator_matches_nothing() {
        let c = clause("x", Op::Unknown, vec![json!("a")]);
        assert!(!clause_matches_context(&c, &user_with("x", json!("a"))));
    }

    #[test]
    fn lenient_semver_parsing() {
        assert_eq!(parse_semver("2"), Some(Version::parse("2.0.0").unwrap()));
        assert_eq!(parse_semver("2.1"), Some(Version::parse("2.1.0").unwrap()));
        assert_eq!(
            parse_semver("2.1-beta.1"),
            Some(Version::parse("2.1.0-beta.1").unwrap())
        );
        assert_eq!(parse_semver("nope"), None);
    }
}
