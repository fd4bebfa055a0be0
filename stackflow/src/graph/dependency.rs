//! Construction and validation of the stack dependency graph.

use crate::core::Stack;
use crate::errors::{CycleDetectedError, GraphValidationError};
use std::collections::HashMap;

/// DFS marker for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// A validated dependency graph over a stack collection.
///
/// Stacks are identified by [`Stack::path`]. Construction rejects duplicate
/// paths, dangling dependencies and cycles, so every graph that exists can
/// be ordered.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Stacks in declaration order.
    pub(super) stacks: Vec<Stack>,
    /// Stack path -> index into `stacks`.
    index: HashMap<String, usize>,
    /// Index -> indices of the stacks it depends on, in declaration order.
    pub(super) dependencies: Vec<Vec<usize>>,
    /// Index -> indices of the stacks that depend on it.
    pub(super) dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Builds and validates a graph.
    ///
    /// # Errors
    ///
    /// - [`GraphValidationError::DuplicateStack`] if two stacks share a path
    /// - [`GraphValidationError::MissingDependency`] if a dependency names no stack
    /// - [`GraphValidationError::Cycle`] with the full cycle path
    pub fn new(stacks: impl IntoIterator<Item = Stack>) -> Result<Self, GraphValidationError> {
        let stacks: Vec<Stack> = stacks.into_iter().collect();

        let mut index: HashMap<String, usize> = HashMap::with_capacity(stacks.len());
        for (i, stack) in stacks.iter().enumerate() {
            if let Some(&first) = index.get(&stack.path) {
                return Err(GraphValidationError::DuplicateStack {
                    path: stack.path.clone(),
                    first: stacks[first].name.clone(),
                    second: stack.name.clone(),
                });
            }
            index.insert(stack.path.clone(), i);
        }

        let mut dependencies = Vec::with_capacity(stacks.len());
        let mut dependents = vec![Vec::new(); stacks.len()];
        for (i, stack) in stacks.iter().enumerate() {
            let mut deps: Vec<usize> = Vec::with_capacity(stack.dependencies.len());
            for dep in &stack.dependencies {
                let Some(&j) = index.get(dep) else {
                    return Err(GraphValidationError::MissingDependency {
                        stack: stack.name.clone(),
                        missing: dep.clone(),
                    });
                };
                if !deps.contains(&j) {
                    deps.push(j);
                    dependents[j].push(i);
                }
            }
            dependencies.push(deps);
        }

        let graph = Self {
            stacks,
            index,
            dependencies,
            dependents,
        };
        graph.detect_cycles()?;

        tracing::debug!(stacks = graph.len(), "Dependency graph validated");
        Ok(graph)
    }

    /// Returns the number of stacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Returns true if the graph has no stacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Returns the stacks in declaration order.
    #[must_use]
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Returns true if a stack with this path is in the graph.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Looks up a stack by path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Stack> {
        self.index.get(path).map(|&i| &self.stacks[i])
    }

    /// Returns the stacks `path` depends on directly.
    #[must_use]
    pub fn dependencies_of(&self, path: &str) -> Vec<&Stack> {
        self.neighbours(path, &self.dependencies)
    }

    /// Returns the stacks that depend directly on `path`.
    #[must_use]
    pub fn dependents_of(&self, path: &str) -> Vec<&Stack> {
        self.neighbours(path, &self.dependents)
    }

    fn neighbours<'a>(&'a self, path: &str, edges: &'a [Vec<usize>]) -> Vec<&'a Stack> {
        self.index
            .get(path)
            .map(|&i| edges[i].iter().map(|&j| &self.stacks[j]).collect())
            .unwrap_or_default()
    }

    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut marks = vec![Mark::Unvisited; self.stacks.len()];
        let mut path = Vec::new();

        for start in 0..self.stacks.len() {
            if marks[start] == Mark::Unvisited {
                if let Some(cycle) = self.visit(start, &mut marks, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }

    fn visit(&self, node: usize, marks: &mut [Mark], path: &mut Vec<usize>) -> Option<Vec<String>> {
        marks[node] = Mark::InProgress;
        path.push(node);

        for &dep in &self.dependencies[node] {
            match marks[dep] {
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(dep, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::InProgress => {
                    // `dep` is on the current path, so the cycle is the path from it.
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|&i| self.stacks[i].name.clone())
                        .collect();
                    cycle.push(self.stacks[dep].name.clone());
                    return Some(cycle);
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[node] = Mark::Done;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::stack;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new(Vec::new()).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_lookup_and_neighbours() {
        let graph = DependencyGraph::new(vec![
            stack("shared", &[]),
            stack("api", &["shared"]),
            stack("worker", &["shared"]),
        ])
        .unwrap();

        assert!(graph.contains("api"));
        assert_eq!(graph.get("api").unwrap().name, "api");
        assert_eq!(graph.dependencies_of("api")[0].name, "shared");

        let dependents: Vec<&str> = graph
            .dependents_of("shared")
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(dependents, vec!["api", "worker"]);
        assert!(graph.dependents_of("missing").is_empty());
    }

    #[test]
    fn test_missing_dependency() {
        let err = DependencyGraph::new(vec![stack("api", &["db"])]).unwrap_err();
        assert_eq!(
            err,
            GraphValidationError::MissingDependency {
                stack: "api".to_string(),
                missing: "db".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_path() {
        let mut copy = stack("api-copy", &[]);
        copy.path = "api".to_string();

        let err = DependencyGraph::new(vec![stack("api", &[]), copy]).unwrap_err();
        assert_eq!(
            err,
            GraphValidationError::DuplicateStack {
                path: "api".to_string(),
                first: "api".to_string(),
                second: "api-copy".to_string(),
            }
        );
    }

    #[test]
    fn test_mutual_dependency_reports_both() {
        let err = DependencyGraph::new(vec![stack("a", &["b"]), stack("b", &["a"])]).unwrap_err();

        let cycle = err.cycle_path().expect("cycle error");
        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn test_cycle_path_is_reconstructed() {
        let err = DependencyGraph::new(vec![
            stack("a", &["b"]),
            stack("b", &["c"]),
            stack("c", &["a"]),
            stack("d", &[]),
        ])
        .unwrap_err();

        assert_eq!(err.cycle_path().unwrap(), ["a", "b", "c", "a"]);
        assert_eq!(err.to_string(), "circular dependency detected: a -> b -> c -> a");
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = DependencyGraph::new(vec![stack("a", &["a"])]).unwrap_err();
        assert_eq!(err.cycle_path().unwrap(), ["a", "a"]);
    }

    #[test]
    fn test_cycle_behind_acyclic_prefix() {
        let err = DependencyGraph::new(vec![
            stack("root", &[]),
            stack("x", &["root", "y"]),
            stack("y", &["x"]),
        ])
        .unwrap_err();

        let cycle = err.cycle_path().unwrap();
        assert!(!cycle.contains(&"root".to_string()));
        assert_eq!(cycle.len(), 3);
    }
}
