//! Stack and context fixtures.

use std::sync::Arc;

use crate::context::Context;
use crate::core::{Stack, State};
use crate::events::CollectingEventSink;

/// Creates a Python stack whose name and path are both `name`.
#[must_use]
pub fn stack(name: &str, dependencies: &[&str]) -> Stack {
    Stack::new(name, name)
        .with_runtime("python3.12")
        .with_dependencies(dependencies.iter().copied())
}

/// `shared` with `api` and `worker` both depending on it.
#[must_use]
pub fn diamond() -> Vec<Stack> {
    vec![
        stack("shared", &[]),
        stack("api", &["shared"]),
        stack("worker", &["shared"]),
    ]
}

/// A linear chain `s0 <- s1 <- ... <- s{n-1}`.
#[must_use]
pub fn chain(n: usize) -> Vec<Stack> {
    (0..n)
        .map(|i| {
            let name = format!("s{i}");
            if i == 0 {
                stack(&name, &[])
            } else {
                stack(&name, &[&format!("s{}", i - 1)])
            }
        })
        .collect()
}

/// A state at `/project` holding `stacks`.
#[must_use]
pub fn state_with(stacks: Vec<Stack>) -> State {
    State::new("/project").with_stacks(stacks)
}

/// A context whose events are collected.
#[must_use]
pub fn collecting_context() -> (Context, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let ctx = Context::new().with_event_sink(sink.clone());
    (ctx, sink)
}
