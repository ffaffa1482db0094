//! Builders for constructing flags and segments in tests.
//!
//! These are ordinary chained-setter builders over the wire model, intended
//! for test fixtures and host-SDK test harnesses; production data arrives
//! through deserialization instead.

use serde_json::Value;

use crate::context::Kind;
use crate::flag::{Flag, Prerequisite, Target};
use crate::rule::{Clause, FlagRule, Op, Rollout, VariationIndex, VariationOrRollout};
use crate::segment::{Segment, SegmentRule, SegmentTarget};

/// Builder for [`Flag`].
#[derive(Debug, Clone)]
pub struct FlagBuilder {
    flag: Flag,
}

impl FlagBuilder {
    /// Start from an empty flag: off, no variations, no off variation, and a
    /// fallthrough that is malformed until set.
    pub fn new(key: &str) -> FlagBuilder {
        FlagBuilder {
            flag: Flag {
                key: key.to_owned(),
                version: 1,
                on: false,
                prerequisites: vec![],
                salt: "salt".to_owned(),
                targets: vec![],
                context_targets: vec![],
                rules: vec![],
                fallthrough: VariationOrRollout::default(),
                off_variation: None,
                variations: vec![],
                deleted: false,
                track_events: false,
                track_events_fallthrough: false,
                debug_events_until_date: None,
                client_side: false,
                migration_settings: None,
            },
        }
    }

    /// A ready-to-use boolean flag: variations `[false, true]`, on, serving
    /// `true` through the fallthrough and `false` when off.
    pub fn boolean(key: &str) -> FlagBuilder {
        FlagBuilder::new(key)
            .on(true)
            .variations(vec![Value::Bool(false), Value::Bool(true)])
            .off_variation(0)
            .fallthrough_variation(1)
    }

    pub fn on(mut self, on: bool) -> Self {
        self.flag.on = on;
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.flag.version = version;
        self
    }

    pub fn salt(mut self, salt: &str) -> Self {
        self.flag.salt = salt.to_owned();
        self
    }

    pub fn variations(mut self, variations: Vec<Value>) -> Self {
        self.flag.variations = variations;
        self
    }

    pub fn off_variation(mut self, index: VariationIndex) -> Self {
        self.flag.off_variation = Some(index);
        self
    }

    pub fn fallthrough_variation(mut self, index: VariationIndex) -> Self {
        self.flag.fallthrough = VariationOrRollout::Variation { variation: index };
        self
    }

    pub fn fallthrough_rollout(mut self, rollout: Rollout) -> Self {
        self.flag.fallthrough = rollout.into();
        self
    }

    pub fn prerequisite(mut self, key: &str, variation: VariationIndex) -> Self {
        self.flag.prerequisites.push(Prerequisite {
            key: key.to_owned(),
            variation,
        });
        self
    }

    pub fn target(mut self, variation: VariationIndex, keys: &[&str]) -> Self {
        self.flag.targets.push(Target {
            context_kind: None,
            variation,
            values: keys.iter().map(|k| (*k).to_owned()).collect(),
        });
        self
    }

    pub fn context_target(
        mut self,
        kind: impl Into<Kind>,
        variation: VariationIndex,
        keys: &[&str],
    ) -> Self {
        self.flag.context_targets.push(Target {
            context_kind: Some(kind.into()),
            variation,
            values: keys.iter().map(|k| (*k).to_owned()).collect(),
        });
        self
    }

    pub fn rule(mut self, rule: FlagRule) -> Self {
        self.flag.rules.push(rule);
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.flag.deleted = deleted;
        self
    }

    pub fn track_events(mut self, track: bool) -> Self {
        self.flag.track_events = track;
        self
    }

    pub fn build(self) -> Flag {
        self.flag
    }
}

/// Builder for a [`FlagRule`].
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    rule: FlagRule,
}

impl RuleBuilder {
    pub fn new(id: &str) -> RuleBuilder {
        RuleBuilder {
            rule: FlagRule {
                id: id.to_owned(),
                clauses: vec![],
                variation_or_rollout: VariationOrRollout::default(),
                track_events: false,
            },
        }
    }

    pub fn clause(mut self, clause: Clause) -> Self {
        self.rule.clauses.push(clause);
        self
    }

    /// Shorthand for a clause matching an attribute with the `in` operator.
    pub fn matching(self, attribute: &str, values: Vec<Value>) -> Self {
        self.clause(Clause {
            attribute: attribute.to_owned(),
            op: Op::In,
            values,
            negate: false,
            context_kind: None,
        })
    }

    pub fn variation(mut self, index: VariationIndex) -> Self {
        self.rule.variation_or_rollout = VariationOrRollout::Variation { variation: index };
        self
    }

    pub fn rollout(mut self, rollout: Rollout) -> Self {
        self.rule.variation_or_rollout = rollout.into();
        self
    }

    pub fn build(self) -> FlagRule {
        self.rule
    }
}

/// Builder for [`Segment`].
#[derive(Debug, Clone)]
pub struct SegmentBuilder {
    segment: Segment,
}

impl SegmentBuilder {
    pub fn new(key: &str) -> SegmentBuilder {
        SegmentBuilder {
            segment: Segment {
                key: key.to_owned(),
                version: 1,
                salt: "salt".to_owned(),
                included: vec![],
                excluded: vec![],
                included_contexts: vec![],
                excluded_contexts: vec![],
                rules: vec![],
                unbounded: false,
                unbounded_context_kind: None,
                generation: None,
                deleted: false,
            },
        }
    }

    pub fn salt(mut self, salt: &str) -> Self {
        self.segment.salt = salt.to_owned();
        self
    }

    pub fn included(mut self, keys: &[&str]) -> Self {
        self.segment.included = keys.iter().map(|k| (*k).to_owned()).collect();
        self
    }

    pub fn excluded(mut self, keys: &[&str]) -> Self {
        self.segment.excluded = keys.iter().map(|k| (*k).to_owned()).collect();
        self
    }

    pub fn included_context(mut self, kind: impl Into<Kind>, keys: &[&str]) -> Self {
        self.segment.included_contexts.push(SegmentTarget {
            context_kind: Some(kind.into()),
            values: keys.iter().map(|k| (*k).to_owned()).collect(),
        });
        self
    }

    pub fn excluded_context(mut self, kind: impl Into<Kind>, keys: &[&str]) -> Self {
        self.segment.excluded_contexts.push(SegmentTarget {
            context_kind: Some(kind.into()),
            values: keys.iter().map(|k| (*k).to_owned()).collect(),
        });
        self
    }

    pub fn rule(mut self, rule: SegmentRule) -> Self {
        self.segment.rules.push(rule);
        self
    }

    pub fn unbounded(mut self, unbounded: bool) -> Self {
        self.segment.unbounded = unbounded;
        self
    }

    pub fn unbounded_context_kind(mut self, kind: impl Into<Kind>) -> Self {
        self.segment.unbounded_context_kind = Some(kind.into());
        self
    }

    pub fn generation(mut self, generation: u64) -> Self {
        self.segment.generation = Some(generation);
        self
    }

    pub fn build(self) -> Segment {
        self.segment
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn boolean_flag_shape() {
        let flag = FlagBuilder::boolean("f").build();
        assert!(flag.on);
        assert_eq!(flag.variations, vec![json!(false), json!(true)]);
        assert_eq!(flag.off_variation, Some(0));
        assert!(matches!(
            flag.fallthrough,
            VariationOrRollout::Variation { variation: 1 }
        ));
    }

    #[test]
    fn builders_chain() {
        let flag = FlagBuilder::new("f")
            .on(true)
            .variations(vec![json!("a"), json!("b")])
            .prerequisite("other", 1)
            .target(0, &["alice"])
            .context_target("organization", 1, &["acme"])
            .rule(RuleBuilder::new("r1").matching("country", vec![json!("de")]).variation(1).build())
            .fallthrough_variation(0)
            .build();
        assert_eq!(flag.prerequisites.len(), 1);
        assert_eq!(flag.rules[0].id, "r1");
        assert_eq!(flag.context_targets[0].values, vec!["acme"]);
    }
}
