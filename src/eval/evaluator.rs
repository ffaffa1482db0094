//! The core evaluation state machine.

use std::collections::HashMap;

use crate::context::Context;
use crate::detail::{Detail, ErrorKind, Reason};
use crate::error::FlagDataError;
use crate::flag::Flag;
use crate::rule::{
    Clause, FlagRule, Op, RolloutKind, VariationIndex, VariationOrRollout, WEIGHT_SCALE,
};
use crate::store::{BigSegmentMembership, BigSegmentStore, BigSegmentsStatus, DataStore};

use super::bucketing::bucket_context;
use super::clauses::clause_matches_context;

/// A successfully evaluated prerequisite, reported for event recording.
#[derive(Debug, Clone, PartialEq)]
pub struct PrerequisiteEvent {
    /// Key of the flag whose prerequisite was evaluated.
    pub target_flag_key: String,
    /// Key of the prerequisite flag.
    pub prerequisite_flag_key: String,
    /// Full result of the prerequisite evaluation.
    pub detail: Detail,
}

/// Caller-supplied observer invoked synchronously for each prerequisite that
/// evaluates successfully.
pub trait PrerequisiteEventRecorder {
    fn record(&self, event: PrerequisiteEvent);
}

/// Evaluates flags against contexts using an injected data provider and an
/// optional big-segment store.
///
/// Evaluation is synchronous and call-scoped: no I/O happens beyond the
/// injected interfaces, and no state is shared between calls. `evaluate`
/// always returns a usable [`Detail`]; data problems surface as
/// [`ErrorKind::MalformedFlag`] results, never as panics or `Err`.
pub struct Evaluator<'a> {
    store: &'a dyn DataStore,
    big_segment_store: Option<&'a dyn BigSegmentStore>,
}

impl<'a> Evaluator<'a> {
    pub fn new(store: &'a dyn DataStore) -> Evaluator<'a> {
        Evaluator {
            store,
            big_segment_store: None,
        }
    }

    pub fn with_big_segment_store(
        store: &'a dyn DataStore,
        big_segment_store: &'a dyn BigSegmentStore,
    ) -> Evaluator<'a> {
        Evaluator {
            store,
            big_segment_store: Some(big_segment_store),
        }
    }

    /// Evaluate a flag for the given context.
    pub fn evaluate(
        &self,
        flag: &Flag,
        context: &Context,
        recorder: Option<&dyn PrerequisiteEventRecorder>,
    ) -> Detail {
        self.evaluate_with_big_segments_status(flag, context, recorder)
            .0
    }

    /// Evaluate a flag and also report the worst big-segment store status
    /// observed, `None` if no big segment was referenced.
    pub fn evaluate_with_big_segments_status(
        &self,
        flag: &Flag,
        context: &Context,
        recorder: Option<&dyn PrerequisiteEventRecorder>,
    ) -> (Detail, Option<BigSegmentsStatus>) {
        let mut scope = EvalScope {
            store: self.store,
            big_segment_store: self.big_segment_store,
            context,
            recorder,
            prereq_chain: Vec::new(),
            memberships: HashMap::new(),
            big_segments_status: None,
        };

        let flag_key = flag.key.as_str();
        let detail = match scope.evaluate_flag(flag) {
            Ok(detail) => detail,
            Err(err) => {
                log::warn!(target: "flagcore", flag_key; "malformed flag data: {err}");
                Detail::error(ErrorKind::MalformedFlag)
            }
        };

        let context_key = context.canonical_key();
        log::trace!(target: "flagcore",
            flag_key,
            context_key,
            reason:serde = detail.reason;
            "evaluated flag");

        (detail, scope.big_segments_status)
    }

    /// Evaluate a flag by key, producing a `FLAG_NOT_FOUND` error result
    /// when the provider has no such flag.
    pub fn evaluate_key(
        &self,
        flag_key: &str,
        context: &Context,
        recorder: Option<&dyn PrerequisiteEventRecorder>,
    ) -> Detail {
        match self.store.flag(flag_key) {
            Some(flag) => self.evaluate(flag, context, recorder),
            None => {
                log::warn!(target: "flagcore", flag_key; "flag not found");
                Detail::error(ErrorKind::FlagNotFound)
            }
        }
    }

    /// Evaluate every flag in the store for one context, as used by hosts
    /// building client-side flag state. Individual failures stay in the map
    /// as error details rather than failing the batch.
    pub fn evaluate_all(&self, context: &Context) -> HashMap<String, Detail> {
        self.store
            .all_flags()
            .into_iter()
            .map(|(key, flag)| (key.to_owned(), self.evaluate(flag, context, None)))
            .collect()
    }
}

/// Per-call evaluation state: the prerequisite chain for cycle detection and
/// the big-segment membership cache, both scoped to one top-level `evaluate`
/// and one context.
pub(super) struct EvalScope<'a> {
    pub(super) store: &'a dyn DataStore,
    pub(super) big_segment_store: Option<&'a dyn BigSegmentStore>,
    pub(super) context: &'a Context,
    pub(super) recorder: Option<&'a dyn PrerequisiteEventRecorder>,
    pub(super) prereq_chain: Vec<String>,
    pub(super) memberships: HashMap<String, Option<BigSegmentMembership>>,
    pub(super) big_segments_status: Option<BigSegmentsStatus>,
}

impl EvalScope<'_> {
    fn evaluate_flag(&mut self, flag: &Flag) -> Result<Detail, FlagDataError> {
        if !flag.on {
            return self.off_value(flag, Reason::Off);
        }

        if let Some(reason) = self.check_prerequisites(flag)? {
            return self.off_value(flag, reason);
        }

        if let Some(index) = self.match_targets(flag) {
            return variation_detail(flag, index, Reason::TargetMatch);
        }

        for (rule_index, rule) in flag.rules.iter().enumerate() {
            if self.rule_matches(rule) {
                let (index, in_experiment) =
                    self.resolve_variation_or_rollout(flag, &rule.variation_or_rollout)?;
                return variation_detail(
                    flag,
                    index,
                    Reason::RuleMatch {
                        rule_index,
                        rule_id: rule.id.clone(),
                        in_experiment,
                    },
                );
            }
        }

        let (index, in_experiment) =
            self.resolve_variation_or_rollout(flag, &flag.fallthrough)?;
        variation_detail(flag, index, Reason::Fallthrough { in_experiment })
    }

    /// Check prerequisites in declared order, stopping at the first failure.
    /// Returns the `PrerequisiteFailed` reason for a failure, `None` when
    /// all passed.
    fn check_prerequisites(&mut self, flag: &Flag) -> Result<Option<Reason>, FlagDataError> {
        if flag.prerequisites.is_empty() {
            return Ok(None);
        }
        self.prereq_chain.push(flag.key.clone());
        let result = self.check_prerequisites_inner(flag);
        self.prereq_chain.pop();
        result
    }

    fn check_prerequisites_inner(&mut self, flag: &Flag) -> Result<Option<Reason>, FlagDataError> {
        let store = self.store;
        for prereq in &flag.prerequisites {
            // The visited-set check must run before every recursive descent;
            // it is the only bound on prerequisite depth.
            if self.prereq_chain.iter().any(|key| *key == prereq.key) {
                return Err(FlagDataError::PrerequisiteCycle(prereq.key.clone()));
            }

            let failed = match store.flag(&prereq.key) {
                None => true,
                Some(prereq_flag) => match self.evaluate_flag(prereq_flag) {
                    Err(err @ FlagDataError::PrerequisiteCycle(_)) => return Err(err),
                    Err(err) => {
                        let prerequisite_key = prereq.key.as_str();
                        log::warn!(target: "flagcore",
                            prerequisite_key;
                            "malformed prerequisite flag data: {err}");
                        true
                    }
                    Ok(detail) => {
                        let passed = prereq_flag.on
                            && detail
                                .variation_index
                                .is_some_and(|index| index as VariationIndex == prereq.variation);
                        if passed {
                            if let Some(recorder) = self.recorder {
                                recorder.record(PrerequisiteEvent {
                                    target_flag_key: flag.key.clone(),
                                    prerequisite_flag_key: prereq.key.clone(),
                                    detail,
                                });
                            }
                        }
                        !passed
                    }
                },
            };

            if failed {
                return Ok(Some(Reason::PrerequisiteFailed {
                    prerequisite_key: prereq.key.clone(),
                }));
            }
        }
        Ok(None)
    }

    /// Context-kind-scoped targets first, then the legacy user-keyed list.
    fn match_targets(&self, flag: &Flag) -> Option<VariationIndex> {
        for target in &flag.context_targets {
            let key = self.context.key(target.context_kind.as_ref());
            if key.is_some_and(|key| target.values.iter().any(|v| v == key)) {
                return Some(target.variation);
            }
        }
        for target in &flag.targets {
            let key = self.context.key(None);
            if key.is_some_and(|key| target.values.iter().any(|v| v == key)) {
                return Some(target.variation);
            }
        }
        None
    }

    fn rule_matches(&mut self, rule: &FlagRule) -> bool {
        rule.clauses.iter().all(|clause| self.clause_matches(clause))
    }

    /// Clause matching with `segmentMatch` resolution through the data
    /// provider; everything else is handled by the operator library.
    pub(super) fn clause_matches(&mut self, clause: &Clause) -> bool {
        if clause.op != Op::SegmentMatch {
            return clause_matches_context(clause, self.context);
        }
        let store = self.store;
        let matched = clause.values.iter().any(|value| match value.as_str() {
            Some(segment_key) => store
                .segment(segment_key)
                .is_some_and(|segment| self.segment_matches(segment)),
            None => false,
        });
        matched != clause.negate
    }

    /// Resolve a variation or rollout to `(variation index, in_experiment)`.
    fn resolve_variation_or_rollout(
        &self,
        flag: &Flag,
        vor: &VariationOrRollout,
    ) -> Result<(VariationIndex, bool), FlagDataError> {
        match vor {
            VariationOrRollout::Variation { variation } => Ok((*variation, false)),

            VariationOrRollout::Rollout { rollout } => {
                let Some(last) = rollout.variations.last() else {
                    return Err(FlagDataError::EmptyRolloutVariations);
                };
                let bucket = bucket_context(
                    self.context,
                    rollout.context_kind.as_ref(),
                    &flag.key,
                    rollout.bucket_by.as_deref(),
                    &flag.salt,
                    rollout.seed,
                );

                // Bucket range starts are inclusive, ends exclusive. A
                // context that does not bucket, or a bucket value at or past
                // the cumulative sum (malformed weights, floating-point
                // edge), lands in the last bucket as a fail-safe.
                let mut selected = last;
                if let Some(bucket) = bucket {
                    let mut cumulative = 0.0;
                    for weighted in &rollout.variations {
                        cumulative += weighted.weight as f64 / WEIGHT_SCALE as f64;
                        if bucket < cumulative {
                            selected = weighted;
                            break;
                        }
                    }
                }

                let in_experiment =
                    rollout.kind == RolloutKind::Experiment && !selected.untracked;
                Ok((selected.variation, in_experiment))
            }

            VariationOrRollout::Malformed(_) => {
                Err(FlagDataError::IncompleteVariationOrRollout)
            }
        }
    }

    /// The off-variation result: a valid null detail when no off variation
    /// is configured.
    fn off_value(&self, flag: &Flag, reason: Reason) -> Result<Detail, FlagDataError> {
        match flag.off_variation {
            None => Ok(Detail {
                value: None,
                variation_index: None,
                reason,
            }),
            Some(index) => variation_detail(flag, index, reason),
        }
    }
}

fn variation_detail(
    flag: &Flag,
    index: VariationIndex,
    reason: Reason,
) -> Result<Detail, FlagDataError> {
    let value = flag
        .variation_value(index)
        .ok_or(FlagDataError::VariationOutOfRange(index))?;
    Ok(Detail {
        value: Some(value.clone()),
        variation_index: Some(index as usize),
        reason,
    })
}
