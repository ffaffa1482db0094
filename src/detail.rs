//! Evaluation results and machine-readable reasons.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of evaluating a flag for a context.
///
/// `variation_index` is `None` when no variation applies (off without an off
/// variation, or an error), in which case `value` is `None` and the caller
/// substitutes its own default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detail {
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_index: Option<usize>,
    pub reason: Reason,
}

impl Detail {
    /// A detail carrying no value, as produced by evaluation errors.
    pub fn error(error_kind: ErrorKind) -> Detail {
        Detail {
            value: None,
            variation_index: None,
            reason: Reason::Error { error_kind },
        }
    }
}

/// Why an evaluation produced its result.
///
/// Serializes as `{"kind": ..., ...}` with auxiliary fields present only
/// where the kind defines them; `inExperiment` appears only when true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// The flag was off; the off variation (if any) was returned.
    Off,
    /// No target or rule matched; the fallthrough variation or rollout
    /// applied.
    #[serde(rename_all = "camelCase")]
    Fallthrough {
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        in_experiment: bool,
    },
    /// The context key appeared in an explicit target list.
    TargetMatch,
    /// A rule matched, identified by position and id.
    #[serde(rename_all = "camelCase")]
    RuleMatch {
        rule_index: usize,
        rule_id: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        in_experiment: bool,
    },
    /// A prerequisite flag was off, missing, erroring, or yielded the wrong
    /// variation; the off variation was returned.
    #[serde(rename_all = "camelCase")]
    PrerequisiteFailed { prerequisite_key: String },
    /// The evaluation could not produce a variation.
    #[serde(rename_all = "camelCase")]
    Error { error_kind: ErrorKind },
}

impl Reason {
    /// Return `true` if the result was part of an experiment and should be
    /// tracked by the event layer.
    pub fn in_experiment(&self) -> bool {
        match self {
            Reason::Fallthrough { in_experiment } => *in_experiment,
            Reason::RuleMatch { in_experiment, .. } => *in_experiment,
            _ => false,
        }
    }
}

/// Machine-readable classification of evaluation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The host SDK was asked to evaluate before flag data was available.
    ClientNotReady,
    /// The requested flag key is unknown to the data provider.
    FlagNotFound,
    /// The flag data violates an internal invariant (out-of-range variation
    /// index, empty rollout, incomplete rule, prerequisite cycle).
    MalformedFlag,
    /// No evaluation context was supplied.
    UserNotSpecified,
    /// An unexpected failure was caught at the evaluation boundary.
    Exception,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn roundtrip(reason: &Reason) -> Reason {
        let encoded = serde_json::to_value(reason).unwrap();
        serde_json::from_value(encoded).unwrap()
    }

    #[test]
    fn off_serializes_with_kind_only() {
        assert_eq!(serde_json::to_value(Reason::Off).unwrap(), json!({"kind": "OFF"}));
    }

    #[test]
    fn fallthrough_omits_in_experiment_when_false() {
        assert_eq!(
            serde_json::to_value(Reason::Fallthrough { in_experiment: false }).unwrap(),
            json!({"kind": "FALLTHROUGH"})
        );
        assert_eq!(
            serde_json::to_value(Reason::Fallthrough { in_experiment: true }).unwrap(),
            json!({"kind": "FALLTHROUGH", "inExperiment": true})
        );
    }

    #[test]
    fn rule_match_fields() {
        let reason = Reason::RuleMatch {
            rule_index: 2,
            rule_id: "rule-abc".to_owned(),
            in_experiment: false,
        };
        assert_eq!(
            serde_json::to_value(&reason).unwrap(),
            json!({"kind": "RULE_MATCH", "ruleIndex": 2, "ruleId": "rule-abc"})
        );
        assert_eq!(roundtrip(&reason), reason);
    }

    #[test]
    fn prerequisite_failed_fields() {
        let reason = Reason::PrerequisiteFailed {
            prerequisite_key: "other-flag".to_owned(),
        };
        assert_eq!(
            serde_json::to_value(&reason).unwrap(),
            json!({"kind": "PREREQUISITE_FAILED", "prerequisiteKey": "other-flag"})
        );
        assert_eq!(roundtrip(&reason), reason);
    }

    #[test]
    fn error_kinds() {
        let reason = Reason::Error {
            error_kind: ErrorKind::MalformedFlag,
        };
        assert_eq!(
            serde_json::to_value(&reason).unwrap(),
            json!({"kind": "ERROR", "errorKind": "MALFORMED_FLAG"})
        );
        assert_eq!(
            serde_json::to_value(ErrorKind::ClientNotReady).unwrap(),
            json!("CLIENT_NOT_READY")
        );
        assert_eq!(roundtrip(&reason), reason);
    }

    #[test]
    fn detail_serialization() {
        let detail = Detail {
            value: Some(json!("on")),
            variation_index: Some(1),
            reason: Reason::TargetMatch,
        };
        assert_eq!(
            serde_json::to_value(&detail).unwrap(),
            json!({"value": "on", "variationIndex": 1, "reason": {"kind": "TARGET_MATCH"}})
        );

        let error = Detail::error(ErrorKind::FlagNotFound);
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"value": null, "reason": {"kind": "ERROR", "errorKind": "FLAG_NOT_FOUND"}})
        );
    }
}
