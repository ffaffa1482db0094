//! Targeting rules, clauses and rollouts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Kind;

/// Index into a flag's `variations` list.
///
/// Kept as a plain integer on the wire; every use is bounds-checked at
/// evaluation time so that out-of-range data surfaces as a malformed-flag
/// result instead of a parse failure or panic.
pub type VariationIndex = i64;

/// Denominator for rollout weights: weights are parts per 100 000.
pub const WEIGHT_SCALE: i64 = 100_000;

/// Comparison operator of a [`Clause`].
///
/// Operators never fail loudly: a type mismatch, bad regex, unparseable
/// timestamp or version makes the clause a non-match. Operators unknown to
/// this crate deserialize to [`Op::Unknown`] and match nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Op {
    /// Exact equality against any clause value. Numbers compare by
    /// mathematical value across integer/float representations.
    In,
    StartsWith,
    EndsWith,
    Contains,
    /// Regex match; the clause value is the pattern.
    Matches,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Timestamp comparison. Operands are epoch milliseconds or RFC 3339
    /// strings.
    Before,
    After,
    /// Membership in the segments named by the clause values.
    SegmentMatch,
    /// Semantic-version precedence comparison, lenient on missing
    /// minor/patch components.
    SemVerEqual,
    SemVerLessThan,
    SemVerGreaterThan,
    /// Operator introduced after this crate was built.
    #[serde(other)]
    Unknown,
}

/// A single predicate: `attribute op values`, optionally negated and
/// restricted to one context kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clause {
    /// Attribute name or reference path. Empty for `segmentMatch`.
    #[serde(default)]
    pub attribute: String,
    pub op: Op,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub negate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_kind: Option<Kind>,
}

/// A flag rule: a conjunction of clauses selecting a variation or rollout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub clauses: Vec<Clause>,
    #[serde(flatten)]
    pub variation_or_rollout: VariationOrRollout,
    #[serde(default)]
    pub track_events: bool,
}

/// Either a fixed variation index or a weighted rollout.
///
/// Well-formed data carries exactly one of the two. If both are present the
/// fixed variation wins (encoded by variant order here). Data carrying
/// neither still parses -- as [`VariationOrRollout::Malformed`] -- and
/// produces a malformed-flag result at evaluation time, so one bad rule
/// cannot take down decoding of the whole flag set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariationOrRollout {
    Variation {
        variation: VariationIndex,
    },
    Rollout {
        rollout: Rollout,
    },
    Malformed(Value),
}

impl Default for VariationOrRollout {
    fn default() -> VariationOrRollout {
        VariationOrRollout::Malformed(Value::Null)
    }
}

impl From<Rollout> for VariationOrRollout {
    fn from(rollout: Rollout) -> VariationOrRollout {
        VariationOrRollout::Rollout { rollout }
    }
}

/// A weighted distribution of contexts across variations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    #[serde(default)]
    pub kind: RolloutKind,
    /// Which kind of a multi-context is bucketed. Default `"user"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_kind: Option<Kind>,
    /// Attribute used for bucketing. Default `"key"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_by: Option<String>,
    #[serde(default)]
    pub variations: Vec<WeightedVariation>,
    /// When present, replaces key/salt-based hashing so bucketing stays
    /// stable when a rollout is migrated between flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloutKind {
    /// A plain percentage rollout.
    #[default]
    Rollout,
    /// An experiment: matches are flagged for analytics tracking unless the
    /// selected bucket is `untracked`.
    Experiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedVariation {
    pub variation: VariationIndex,
    /// Parts per 100 000.
    pub weight: i64,
    #[serde(default)]
    pub untracked: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_operator_names() {
        let ops: Vec<Op> = serde_json::from_value(json!([
            "in",
            "startsWith",
            "endsWith",
            "contains",
            "matches",
            "lessThan",
            "lessThanOrEqual",
            "greaterThan",
            "greaterThanOrEqual",
            "before",
            "after",
            "segmentMatch",
            "semVerEqual",
            "semVerLessThan",
            "semVerGreaterThan"
        ]))
        .unwrap();
        assert_eq!(ops[0], Op::In);
        assert_eq!(ops[4], Op::Matches);
        assert_eq!(ops[11], Op::SegmentMatch);
        assert_eq!(ops[14], Op::SemVerGreaterThan);
    }

    #[test]
    fn unknown_operator_still_parses() {
        let clause: Clause = serde_json::from_value(json!({
            "attribute": "name",
            "op": "somethingNew",
            "values": ["x"]
        }))
        .unwrap();
        assert_eq!(clause.op, Op::Unknown);
    }

    #[test]
    fn rule_with_fixed_variation() {
        let rule: FlagRule = serde_json::from_value(json!({
            "id": "rule-1",
            "clauses": [],
            "variation": 2
        }))
        .unwrap();
        assert!(matches!(
            rule.variation_or_rollout,
            VariationOrRollout::Variation { variation: 2 }
        ));
    }

    #[test]
    fn rule_with_rollout() {
        let rule: FlagRule = serde_json::from_value(json!({
            "id": "rule-2",
            "clauses": [],
            "rollout": {
                "kind": "experiment",
                "seed": 42,
                "variations": [{"variation": 0, "weight": 100000}]
            }
        }))
        .unwrap();
        let VariationOrRollout::Rollout { rollout } = rule.variation_or_rollout else {
            panic!("expected rollout");
        };
        assert_eq!(rollout.kind, RolloutKind::Experiment);
        assert_eq!(rollout.seed, Some(42));
        assert_eq!(rollout.variations.len(), 1);
    }

    #[test]
    fn rule_with_neither_is_preserved_as_malformed() {
        let rule: FlagRule = serde_json::from_value(json!({
            "id": "rule-3",
            "clauses": []
        }))
        .unwrap();
        assert!(matches!(
            rule.variation_or_rollout,
            VariationOrRollout::Malformed(_)
        ));
    }

    #[test]
    fn fixed_variation_wins_over_rollout() {
        let vor: VariationOrRollout = serde_json::from_value(json!({
            "variation": 1,
            "rollout": {"variations": [{"variation": 0, "weight": 100000}]}
        }))
        .unwrap();
        assert!(matches!(vor, VariationOrRollout::Variation { variation: 1 }));
    }
}
