//! Deterministic ordering over a validated graph.

use super::DependencyGraph;
use crate::core::Stack;
use crate::errors::{Result, StackflowError};
use std::collections::BTreeSet;

impl DependencyGraph {
    /// Returns the stacks in deployment order: every stack after all of its
    /// dependencies.
    ///
    /// Among stacks that are ready at the same time, the one with the smaller
    /// `(name, path)` goes first, so the order does not depend on how the
    /// input was arranged.
    ///
    /// # Errors
    ///
    /// Only [`StackflowError::Internal`]; a validated graph always sorts.
    pub fn topological_sort(&self) -> Result<Vec<Stack>> {
        Ok(self
            .order()?
            .into_iter()
            .map(|i| self.stacks[i].clone())
            .collect())
    }

    /// Groups stacks into waves that can run concurrently.
    ///
    /// A stack's level is one more than the deepest of its dependencies, and
    /// 0 without dependencies. Waves come back in increasing level order and
    /// each wave lists its stacks in topological order.
    ///
    /// # Errors
    ///
    /// Only [`StackflowError::Internal`]; a validated graph always sorts.
    pub fn parallel_levels(&self) -> Result<Vec<Vec<Stack>>> {
        let mut level = vec![0usize; self.stacks.len()];
        let mut waves: Vec<Vec<Stack>> = Vec::new();

        for node in self.order()? {
            let depth = self.dependencies[node]
                .iter()
                .map(|&dep| level[dep] + 1)
                .max()
                .unwrap_or(0);
            level[node] = depth;

            if waves.len() <= depth {
                waves.resize_with(depth + 1, Vec::new);
            }
            waves[depth].push(self.stacks[node].clone());
        }

        Ok(waves)
    }

    /// Kahn's algorithm over dependency -> dependent edges.
    fn order(&self) -> Result<Vec<usize>> {
        let n = self.stacks.len();

        let mut by_key: Vec<usize> = (0..n).collect();
        by_key.sort_by(|&a, &b| {
            let (a, b) = (&self.stacks[a], &self.stacks[b]);
            (&a.name, &a.path).cmp(&(&b.name, &b.path))
        });
        let mut rank = vec![0usize; n];
        for (r, &i) in by_key.iter().enumerate() {
            rank[i] = r;
        }

        // In-degree counts unmet dependencies.
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(|i| rank[i])
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(r) = ready.pop_first() {
            let node = by_key[r];
            order.push(node);
            for &dependent in &self.dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(rank[dependent]);
                }
            }
        }

        if order.len() != n {
            return Err(StackflowError::Internal(format!(
                "topological sort reached {} of {} stacks in a validated graph",
                order.len(),
                n
            )));
        }
        Ok(order)
    }
}
