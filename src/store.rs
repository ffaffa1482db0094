//! Data-provider interfaces and an in-memory implementation.
//!
//! The evaluator reaches outward only through [`DataStore`] (flag and segment
//! definitions) and [`BigSegmentStore`] (externally-stored bulk membership).
//! [`InMemoryDataStore`] is a thread-safe multi-reader multi-writer holder
//! for snapshot data: writers replace or patch the snapshot, readers take an
//! `Arc` snapshot that later writes cannot affect, so one evaluation always
//! sees a consistent data set.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::flag::{Flag, Timestamp};
use crate::segment::Segment;

/// Source of flag and segment definitions.
///
/// Implementations must filter tombstoned (deleted) entries; the evaluator
/// never distinguishes "absent" from "deleted".
pub trait DataStore {
    fn flag(&self, key: &str) -> Option<&Flag>;
    fn segment(&self, key: &str) -> Option<&Segment>;
    fn all_flags(&self) -> HashMap<&str, &Flag>;
}

/// An immutable set of flags and segments.
#[derive(Debug, Clone, Default)]
pub struct DataSnapshot {
    flags: HashMap<String, Flag>,
    segments: HashMap<String, Segment>,
}

impl DataSnapshot {
    pub fn new(flags: impl IntoIterator<Item = Flag>, segments: impl IntoIterator<Item = Segment>) -> DataSnapshot {
        DataSnapshot {
            flags: flags.into_iter().map(|f| (f.key.clone(), f)).collect(),
            segments: segments.into_iter().map(|s| (s.key.clone(), s)).collect(),
        }
    }
}

impl DataStore for DataSnapshot {
    fn flag(&self, key: &str) -> Option<&Flag> {
        self.flags.get(key).filter(|flag| !flag.deleted)
    }

    fn segment(&self, key: &str) -> Option<&Segment> {
        self.segments.get(key).filter(|segment| !segment.deleted)
    }

    fn all_flags(&self) -> HashMap<&str, &Flag> {
        self.flags
            .iter()
            .filter(|(_, flag)| !flag.deleted)
            .map(|(key, flag)| (key.as_str(), flag))
            .collect()
    }
}

/// Thread-safe storage for the currently-active [`DataSnapshot`].
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    data: RwLock<Arc<DataSnapshot>>,
}

impl InMemoryDataStore {
    pub fn new() -> InMemoryDataStore {
        InMemoryDataStore::default()
    }

    /// Get the currently-active snapshot. Evaluations should hold one
    /// snapshot for their whole duration.
    pub fn snapshot(&self) -> Arc<DataSnapshot> {
        // Err() is possible only if the lock is poisoned (a writer panicked
        // while holding it), which should never happen.
        let data = self
            .data
            .read()
            .expect("thread holding data store lock should not panic");
        data.clone()
    }

    /// Replace all stored data at once.
    pub fn replace_all(
        &self,
        flags: impl IntoIterator<Item = Flag>,
        segments: impl IntoIterator<Item = Segment>,
    ) {
        let mut slot = self
            .data
            .write()
            .expect("thread holding data store lock should not panic");
        *slot = Arc::new(DataSnapshot::new(flags, segments));
    }

    /// Insert or update one flag. An update with a version not newer than the
    /// stored one is ignored. Deleting is an upsert of a tombstone.
    pub fn upsert_flag(&self, flag: Flag) {
        let mut slot = self
            .data
            .write()
            .expect("thread holding data store lock should not panic");
        if let Some(existing) = slot.flags.get(&flag.key) {
            if existing.version >= flag.version {
                return;
            }
        }
        let mut next = (**slot).clone();
        next.flags.insert(flag.key.clone(), flag);
        *slot = Arc::new(next);
    }

    /// Insert or update one segment, with the same version gating as
    /// [`upsert_flag`](InMemoryDataStore::upsert_flag).
    pub fn upsert_segment(&self, segment: Segment) {
        let mut slot = self
            .data
            .write()
            .expect("thread holding data store lock should not panic");
        if let Some(existing) = slot.segments.get(&segment.key) {
            if existing.version >= segment.version {
                return;
            }
        }
        let mut next = (**slot).clone();
        next.segments.insert(segment.key.clone(), segment);
        *slot = Arc::new(next);
    }
}

/// Health of big-segment membership data, per the store's own freshness
/// metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BigSegmentsStatus {
    /// The store responded and its data is fresh.
    Healthy,
    /// The store responded but its data has not been updated recently.
    Stale,
    /// No big-segment store is configured.
    NotConfigured,
    /// The store query failed.
    StoreError,
}

/// Freshness metadata reported by a big-segment store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigSegmentStoreMetadata {
    pub last_updated: Option<Timestamp>,
}

/// Membership map for one context: keys are segment membership keys
/// (`<segment key>.g<generation>`), values are explicit include/exclude
/// decisions. A segment absent from the map has no stored opinion and falls
/// back to the segment's rules.
pub type BigSegmentMembership = HashMap<String, bool>;

/// Externally-stored membership for segments too large to embed in flag
/// data.
///
/// The store receives the raw context key and performs its own hashing. All
/// statuses must be tolerated by callers: `Stale` and `StoreError` still
/// deliver whatever membership data is available.
pub trait BigSegmentStore {
    fn metadata(&self) -> BigSegmentStoreMetadata;
    fn membership(&self, context_key: &str) -> (Option<BigSegmentMembership>, BigSegmentsStatus);
}
