//! Segment data model.

use serde::{Deserialize, Serialize};

use crate::context::Kind;
use crate::rule::Clause;

/// A reusable set of contexts that flag clauses can match with the
/// `segmentMatch` operator.
///
/// Standard segments carry explicit include/exclude key lists plus weighted
/// rules. "Big" segments (`unbounded`) store bulk membership externally and
/// are looked up through the big-segment store, namespaced by `generation`
/// so stale membership data is detectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub key: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub salt: String,
    /// Explicitly included keys of the default `"user"` kind. Inclusion wins
    /// over exclusion.
    #[serde(default)]
    pub included: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Context-kind-scoped include lists, checked before the legacy lists.
    #[serde(default)]
    pub included_contexts: Vec<SegmentTarget>,
    #[serde(default)]
    pub excluded_contexts: Vec<SegmentTarget>,
    #[serde(default)]
    pub rules: Vec<SegmentRule>,
    /// Marks an externally-stored big segment.
    #[serde(default)]
    pub unbounded: bool,
    /// Which kind's key identifies membership in the big-segment store.
    /// Default `"user"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unbounded_context_kind: Option<Kind>,
    /// Monotonic version of externally-stored membership data. A big segment
    /// without a generation is malformed and matches nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    /// Tombstone marker, filtered by data providers.
    #[serde(default)]
    pub deleted: bool,
}

/// Explicit key list scoped to one context kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_kind: Option<Kind>,
    #[serde(default)]
    pub values: Vec<String>,
}

/// A segment rule: a conjunction of clauses, optionally weighted.
///
/// Absent `weight` means the rule matches unconditionally when its clauses
/// match. Segment rule clauses must not use `segmentMatch`; nested segment
/// references are treated as non-matches, which keeps segment evaluation
/// non-recursive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRule {
    #[serde(default)]
    pub clauses: Vec<Clause>,
    /// Parts per 100 000 of bucketed contexts this rule admits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_by: Option<String>,
    /// Which kind of a multi-context is bucketed for `weight`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_context_kind: Option<Kind>,
}

impl Segment {
    /// Key under which membership for this segment appears in big-segment
    /// membership maps: `<segment key>.g<generation>`.
    pub fn membership_key(&self) -> Option<String> {
        let generation = self.generation?;
        Some(format!("{}.g{}", self.key, generation))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_segment_json() {
        let segment: Segment = serde_json::from_value(json!({
            "key": "beta-testers",
            "version": 3,
            "salt": "salty",
            "included": ["alice"],
            "excluded": ["bob"],
            "includedContexts": [
                {"contextKind": "organization", "values": ["acme"]}
            ],
            "rules": [{
                "clauses": [{"attribute": "email", "op": "endsWith", "values": ["@example.com"]}],
                "weight": 25000,
                "bucketBy": "email"
            }]
        }))
        .unwrap();
        assert_eq!(segment.included, vec!["alice"]);
        assert_eq!(segment.rules[0].weight, Some(25000));
        assert!(!segment.unbounded);
    }

    #[test]
    fn membership_key_requires_generation() {
        let mut segment: Segment =
            serde_json::from_value(json!({"key": "big", "unbounded": true})).unwrap();
        assert_eq!(segment.membership_key(), None);

        segment.generation = Some(4);
        assert_eq!(segment.membership_key(), Some("big.g4".to_owned()));
    }
}
