//! # flagcore
//!
//! `flagcore` is a client-side feature-flag evaluation engine: given flag and
//! segment definitions and an evaluation context, it deterministically
//! resolves which variation the context receives and why.
//!
//! It implements the full rule model of modern flag delivery platforms:
//! individual targeting, boolean clause matching over context attributes,
//! reusable segments (including externally-stored "big" segments),
//! prerequisite flags with cycle detection, and consistent percentage
//! rollouts and experiments driven by SHA-1 bucketing.
//!
//! The crate performs no I/O of its own. Hosts supply definitions through the
//! [`DataStore`] trait (typically an [`InMemoryDataStore`] fed by their
//! delivery channel) and optionally bulk membership through
//! [`BigSegmentStore`].
//!
//! ```
//! use flagcore::{ContextBuilder, Evaluator, InMemoryDataStore};
//!
//! let store = InMemoryDataStore::new();
//! store.replace_all(
//!     [serde_json::from_value(serde_json::json!({
//!         "key": "new-dashboard",
//!         "on": true,
//!         "variations": [false, true],
//!         "offVariation": 0,
//!         "fallthrough": {"variation": 1},
//!     }))
//!     .unwrap()],
//!     [],
//! );
//!
//! let snapshot = store.snapshot();
//! let evaluator = Evaluator::new(&*snapshot);
//! let context = ContextBuilder::new("user-key").build().unwrap();
//!
//! let detail = evaluator.evaluate_key("new-dashboard", &context, None);
//! assert_eq!(detail.value, Some(serde_json::json!(true)));
//! ```

pub mod context;
pub mod detail;
pub mod error;
pub mod eval;
pub mod flag;
pub mod rule;
pub mod segment;
pub mod store;
pub mod testing;

pub use context::{Context, ContextBuilder, Kind, MultiContextBuilder, SingleContext};
pub use detail::{Detail, ErrorKind, Reason};
pub use error::ContextError;
pub use eval::{Evaluator, PrerequisiteEvent, PrerequisiteEventRecorder};
pub use flag::{Flag, Prerequisite, Target};
pub use rule::{
    Clause, FlagRule, Op, Rollout, RolloutKind, VariationIndex, VariationOrRollout,
    WeightedVariation, WEIGHT_SCALE,
};
pub use segment::{Segment, SegmentRule, SegmentTarget};
pub use store::{
    BigSegmentMembership, BigSegmentStore, BigSegmentStoreMetadata, BigSegmentsStatus,
    DataSnapshot, DataStore, InMemoryDataStore,
};
