//! Fan-in of parallel branch results.

use crate::core::State;
use crate::errors::{MergeConflictError, MergeKind};
use std::collections::BTreeMap;

/// Merges the artifacts and outputs each branch wrote onto `base`.
///
/// A branch wrote a key if the key is missing from `base` or holds a
/// different value there. Two branches writing the same key is a conflict
/// even when they wrote equal values. Changes to other fields and removals
/// are not merged.
///
/// Branches are visited in the order given, so the reported conflict is
/// always between the earliest two writers.
pub fn merge_branches(base: &State, branches: &[(&str, State)]) -> Result<State, MergeConflictError> {
    let mut merged = base.clone();
    let mut artifact_writers: BTreeMap<&str, &str> = BTreeMap::new();
    let mut output_writers: BTreeMap<&str, &str> = BTreeMap::new();

    for (branch, state) in branches {
        for (key, artifact) in state.artifacts() {
            if base.artifact(key) == Some(artifact) {
                continue;
            }
            if let Some(first) = artifact_writers.insert(key.as_str(), *branch) {
                return Err(MergeConflictError::new(MergeKind::Artifact, key, first, *branch));
            }
            merged = merged.with_artifact(key.clone(), artifact.clone());
        }

        for (key, value) in state.outputs() {
            if base.output(key) == Some(value) {
                continue;
            }
            if let Some(first) = output_writers.insert(key.as_str(), *branch) {
                return Err(MergeConflictError::new(MergeKind::Output, key, first, *branch));
            }
            merged = merged.with_output(key.clone(), value.clone());
        }
    }

    Ok(merged)
}
