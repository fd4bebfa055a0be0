//! Assertions over orderings and errors.

use std::collections::HashMap;

use crate::core::Stack;
use crate::errors::{MergeKind, StackflowError};

/// Asserts that every stack comes after all of its dependencies.
///
/// # Panics
///
/// If a dependency is missing from `sorted` or appears after its dependent.
pub fn assert_dependencies_first(sorted: &[Stack]) {
    let position: HashMap<&str, usize> = sorted
        .iter()
        .enumerate()
        .map(|(i, s)| (s.path.as_str(), i))
        .collect();

    for (i, stack) in sorted.iter().enumerate() {
        for dep in &stack.dependencies {
            let Some(&at) = position.get(dep.as_str()) else {
                panic!("dependency '{dep}' of '{}' is not in the order", stack.name);
            };
            assert!(at < i, "'{dep}' (at {at}) must come before '{}' (at {i})", stack.name);
        }
    }
}

/// Asserts that the outermost failing stage is `index`/`name`.
///
/// # Panics
///
/// If the error was not raised by that stage.
pub fn assert_failed_at(err: &StackflowError, index: usize, name: &str) {
    match err.stage_trail().first() {
        Some(&(at, stage)) => assert_eq!((at, stage), (index, name), "unexpected failing stage: {err}"),
        None => panic!("error carries no stage position: {err}"),
    }
}

/// Asserts that the error is a merge conflict on `key`.
///
/// # Panics
///
/// If the root cause is not a merge conflict of that kind and key.
pub fn assert_merge_conflict(err: &StackflowError, kind: MergeKind, key: &str) {
    let Some(conflict) = err.as_merge_conflict() else {
        panic!("expected a merge conflict, got: {err}");
    };
    assert_eq!(conflict.kind, kind, "conflict kind");
    assert_eq!(conflict.key, key, "conflict key");
}
