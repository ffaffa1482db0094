//! Segment matching, including externally-stored big segments.

use crate::rule::WEIGHT_SCALE;
use crate::segment::{Segment, SegmentRule, SegmentTarget};
use crate::store::{BigSegmentMembership, BigSegmentsStatus};

use super::bucketing::bucket_context;
use super::clauses::clause_matches_context;
use super::evaluator::EvalScope;

impl EvalScope<'_> {
    pub(super) fn segment_matches(&mut self, segment: &Segment) -> bool {
        if segment.unbounded {
            self.big_segment_matches(segment)
        } else {
            self.standard_segment_matches(segment)
        }
    }

    /// Explicit inclusion wins over exclusion, exclusion wins over rules.
    fn standard_segment_matches(&self, segment: &Segment) -> bool {
        if self.targets_contain_context(&segment.included_contexts, &segment.included) {
            return true;
        }
        if self.targets_contain_context(&segment.excluded_contexts, &segment.excluded) {
            return false;
        }
        self.segment_rules_match(segment)
    }

    /// Kind-scoped lists first, then the legacy user-keyed list.
    fn targets_contain_context(&self, targets: &[SegmentTarget], legacy: &[String]) -> bool {
        for target in targets {
            let key = self.context.key(target.context_kind.as_ref());
            if key.is_some_and(|key| target.values.iter().any(|v| v == key)) {
                return true;
            }
        }
        self.context
            .key(None)
            .is_some_and(|key| legacy.iter().any(|v| v == key))
    }

    fn segment_rules_match(&self, segment: &Segment) -> bool {
        segment
            .rules
            .iter()
            .any(|rule| self.segment_rule_matches(rule, segment))
    }

    fn segment_rule_matches(&self, rule: &SegmentRule, segment: &Segment) -> bool {
        // Segment rule clauses never resolve segmentMatch, so segment
        // evaluation cannot recurse.
        if !rule
            .clauses
            .iter()
            .all(|clause| clause_matches_context(clause, self.context))
        {
            return false;
        }
        let Some(weight) = rule.weight else {
            return true;
        };
        let bucket = bucket_context(
            self.context,
            rule.rollout_context_kind.as_ref(),
            &segment.key,
            rule.bucket_by.as_deref(),
            &segment.salt,
            None,
        );
        // A context that cannot be bucketed is not admitted by a weighted
        // rule.
        bucket.is_some_and(|bucket| bucket < weight as f64 / WEIGHT_SCALE as f64)
    }

    /// Membership of a big segment: the stored decision when one exists,
    /// otherwise the segment's own rules.
    fn big_segment_matches(&mut self, segment: &Segment) -> bool {
        let Some(membership_key) = segment.membership_key() else {
            let segment_key = segment.key.as_str();
            log::warn!(target: "flagcore",
                segment_key;
                "big segment has no generation, matching nothing");
            self.record_big_segments_status(BigSegmentsStatus::NotConfigured);
            return false;
        };
        let context = self.context;
        let Some(context_key) = context.key(segment.unbounded_context_kind.as_ref()) else {
            return false;
        };

        let stored = self
            .membership_for(context_key)
            .as_ref()
            .and_then(|membership| membership.get(&membership_key))
            .copied();
        match stored {
            Some(included) => included,
            None => self.segment_rules_match(segment),
        }
    }

    /// Stored membership for one context key, queried at most once per
    /// evaluation.
    fn membership_for(&mut self, context_key: &str) -> &Option<BigSegmentMembership> {
        if !self.memberships.contains_key(context_key) {
            let (membership, status) = match self.big_segment_store {
                Some(store) => store.membership(context_key),
                None => (None, BigSegmentsStatus::NotConfigured),
            };
            self.record_big_segments_status(status);
            self.memberships.insert(context_key.to_owned(), membership);
        }
        &self.memberships[context_key]
    }

    /// Keep the worst status observed during this evaluation.
    fn record_big_segments_status(&mut self, status: BigSegmentsStatus) {
        self.big_segments_status = Some(match self.big_segments_status {
            Some(current) => current.max(status),
            None => status,
        });
    }
}
