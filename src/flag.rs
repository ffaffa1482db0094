//! Feature flag data model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Kind;
use crate::rule::{FlagRule, VariationIndex, VariationOrRollout};

/// UTC instant used in provider metadata.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A feature flag configuration, decoded once from provider-supplied JSON and
/// immutable afterwards.
///
/// The `variations` list is the source of truth for valid variation indices.
/// Indices referenced elsewhere (targets, rules, off variation, rollout
/// buckets) are validated against it during evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub key: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub on: bool,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    /// Salt mixed into bucketing hashes so distinct flags shuffle contexts
    /// independently.
    #[serde(default)]
    pub salt: String,
    /// Legacy targets, keyed on the default `"user"` kind.
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Context-kind-scoped targets, checked before the legacy list.
    #[serde(default)]
    pub context_targets: Vec<Target>,
    #[serde(default)]
    pub rules: Vec<FlagRule>,
    #[serde(default)]
    pub fallthrough: VariationOrRollout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_variation: Option<VariationIndex>,
    #[serde(default)]
    pub variations: Vec<Value>,
    /// Tombstone marker. Data providers filter deleted flags out; the
    /// evaluator never sees one.
    #[serde(default)]
    pub deleted: bool,

    // Event-annotation metadata. Not evaluation-affecting; carried for the
    // event layer.
    #[serde(default)]
    pub track_events: bool,
    #[serde(default)]
    pub track_events_fallthrough: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_events_until_date: Option<u64>,
    #[serde(default)]
    pub client_side: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_settings: Option<MigrationSettings>,
}

/// A dependency on another flag being on and yielding a specific variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prerequisite {
    pub key: String,
    pub variation: VariationIndex,
}

/// An explicit list of context keys mapped to one variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Absent in the legacy list, meaning the default `"user"` kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_kind: Option<Kind>,
    pub variation: VariationIndex,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Migration-tracking configuration, orthogonal to evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_ratio: Option<u32>,
}

impl Flag {
    /// Look up a variation value by bounds-checked index.
    pub(crate) fn variation_value(&self, index: VariationIndex) -> Option<&Value> {
        let index = usize::try_from(index).ok()?;
        self.variations.get(index)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_full_flag_json() {
        let flag: Flag = serde_json::from_value(json!({
            "key": "feature",
            "version": 7,
            "on": true,
            "prerequisites": [{"key": "other", "variation": 1}],
            "salt": "saltyA",
            "targets": [{"variation": 2, "values": ["alice"]}],
            "contextTargets": [
                {"contextKind": "organization", "variation": 1, "values": ["acme"]}
            ],
            "rules": [{
                "id": "rule-1",
                "clauses": [
                    {"attribute": "country", "op": "in", "values": ["de"], "negate": false}
                ],
                "variation": 0
            }],
            "fallthrough": {"variation": 0},
            "offVariation": 1,
            "variations": [true, false, "maybe"],
            "trackEvents": true,
            "debugEventsUntilDate": 1700000000000u64,
            "migrationSettings": {"checkRatio": 10}
        }))
        .unwrap();

        assert_eq!(flag.key, "feature");
        assert_eq!(flag.prerequisites, vec![Prerequisite { key: "other".into(), variation: 1 }]);
        assert_eq!(flag.context_targets[0].context_kind, Some("organization".into()));
        assert_eq!(flag.off_variation, Some(1));
        assert_eq!(flag.variations.len(), 3);
        assert_eq!(flag.migration_settings.unwrap().check_ratio, Some(10));
    }

    #[test]
    fn minimal_flag_defaults() {
        let flag: Flag = serde_json::from_value(json!({"key": "bare"})).unwrap();
        assert!(!flag.on);
        assert!(flag.prerequisites.is_empty());
        assert!(flag.off_variation.is_none());
        assert!(!flag.deleted);
        assert!(matches!(
            flag.fallthrough,
            VariationOrRollout::Malformed(Value::Null)
        ));
    }

    #[test]
    fn variation_value_bounds() {
        let flag: Flag = serde_json::from_value(json!({
            "key": "f",
            "variations": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(flag.variation_value(0), Some(&json!("a")));
        assert_eq!(flag.variation_value(2), None);
        assert_eq!(flag.variation_value(-1), None);
    }
}
