//! Block, extrinsic and event filters.
//!
//! A list of specs is OR-ed, the fields of one spec are AND-ed, absent fields match anything.

use serde::{Deserialize, Deserializer, Serialize};

use crate::pipeline::wrap::{IndexedBlock, WrappedEvent, WrappedExtrinsic};

/// Inclusive spec version bounds, an absent bound is unbounded on that side.
///
/// Serialized as a two element array, eg. `[1, null]`. Deserialization also accepts
/// shorter arrays, missing bounds are unbounded, so `[1]` works in formats without null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpecVersionRange(pub Option<u32>, pub Option<u32>);

impl<'de> Deserialize<'de> for SpecVersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bounds = Vec::<Option<u32>>::deserialize(deserializer)?;
        if bounds.len() > 2 {
            return Err(serde::de::Error::invalid_length(
                bounds.len(),
                &"at most two bounds",
            ));
        }
        Ok(SpecVersionRange(
            bounds.first().copied().flatten(),
            bounds.get(1).copied().flatten(),
        ))
    }
}

impl SpecVersionRange {
    /// Returns true if `spec_version` lies within the bounds.
    pub fn contains(&self, spec_version: u32) -> bool {
        self.0.map_or(true, |lower| spec_version >= lower)
            && self.1.map_or(true, |upper| spec_version <= upper)
    }
}

/// Predicate bundle selecting blocks, extrinsics or events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterSpec {
    /// Spec versions to keep.
    pub spec_version: Option<SpecVersionRange>,
    /// Pallet name.
    pub module: Option<String>,
    /// Call or event name.
    pub method: Option<String>,
    /// Extrinsic outcome, ignored for blocks and events.
    pub success: Option<bool>,
}

impl FilterSpec {
    fn spec_version_matches(&self, spec_version: u32) -> bool {
        self.spec_version
            .map_or(true, |range| range.contains(spec_version))
    }

    fn matches_extrinsic(&self, extrinsic: &WrappedExtrinsic) -> bool {
        self.spec_version_matches(extrinsic.spec_version)
            && self
                .module
                .as_ref()
                .map_or(true, |module| extrinsic.extrinsic.section == *module)
            && self
                .method
                .as_ref()
                .map_or(true, |method| extrinsic.extrinsic.method == *method)
            && self
                .success
                .map_or(true, |success| extrinsic.success == success)
    }

    /// Empty module or method strings match anything.
    fn matches_event(&self, event: &WrappedEvent) -> bool {
        let wildcard = |field: &Option<String>, value: &str| match field.as_deref() {
            None | Some("") => true,
            Some(expected) => expected == value,
        };
        self.spec_version_matches(event.spec_version)
            && wildcard(&self.module, &event.event.event.section)
            && wildcard(&self.method, &event.event.event.method)
    }
}

/// Keeps `block` unless `filter` sets a spec version range the block falls outside of.
pub fn filter_block(block: IndexedBlock, filter: Option<&FilterSpec>) -> Option<IndexedBlock> {
    match filter {
        Some(filter) if !filter.spec_version_matches(block.spec_version) => None,
        _ => Some(block),
    }
}

/// Keeps the extrinsics matching any of `filters`, all of them if `filters` is empty.
pub fn filter_extrinsics(
    extrinsics: Vec<WrappedExtrinsic>,
    filters: &[FilterSpec],
) -> Vec<WrappedExtrinsic> {
    if filters.is_empty() {
        return extrinsics;
    }
    extrinsics
        .into_iter()
        .filter(|extrinsic| filters.iter().any(|f| f.matches_extrinsic(extrinsic)))
        .collect()
}

/// Keeps the events matching any of `filters`, all of them if `filters` is empty.
pub fn filter_events(events: Vec<WrappedEvent>, filters: &[FilterSpec]) -> Vec<WrappedEvent> {
    if filters.is_empty() {
        return events;
    }
    events
        .into_iter()
        .filter(|event| filters.iter().any(|f| f.matches_event(event)))
        .collect()
}
