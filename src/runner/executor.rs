// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Depth-first execution of a plan.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use crate::{
    config::Configuration,
    event::EventKind,
    observer::Dispatcher,
    plan::{ExecutionState, NodeType, Outcome, PlanNode},
    step::{self, AssertionFailure, Backend, HookKind, NotImplemented, StepContext},
    transform::properties,
};

use super::Clock;

/// Non-passing result of a step or hook.
#[derive(Debug)]
struct Failure {
    outcome: Outcome,
    message: String,
    cause: Option<Arc<anyhow::Error>>,
}

impl Failure {
    fn new(outcome: Outcome, message: String) -> Self {
        Self { outcome, message, cause: None }
    }

    fn resolution(error: step::Error) -> Self {
        Self {
            outcome: Outcome::Error,
            message: error.to_string(),
            cause: Some(Arc::new(error.into())),
        }
    }

    /// Classifies an error returned by a step or hook.
    fn classify(error: anyhow::Error) -> Self {
        let outcome = if error.downcast_ref::<AssertionFailure>().is_some() {
            Outcome::Failed
        } else if error.downcast_ref::<NotImplemented>().is_some() {
            Outcome::NotImplemented
        } else {
            Outcome::Error
        };
        Self {
            outcome,
            message: format!("{error:#}"),
            cause: Some(Arc::new(error)),
        }
    }
}

/// Runs a contributed function, turning errors and panics into a
/// [`Failure`].
fn invoke(f: impl FnOnce() -> anyhow::Result<()>) -> Result<(), Failure> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Failure::classify(e)),
        Err(payload) => {
            let message = panic_message(&*payload);
            Err(Failure {
                outcome: Outcome::Error,
                message: format!("Panicked: {message}"),
                cause: Some(Arc::new(anyhow::anyhow!(message))),
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Collects the leaves of the given nodes, in execution order.
fn collect_leaves<'n>(nodes: &'n mut [PlanNode], out: &mut Vec<&'n mut PlanNode>) {
    for node in nodes {
        if node.is_leaf() {
            out.push(node);
        } else {
            collect_leaves(&mut node.children, out);
        }
    }
}

fn skip(leaf: &mut PlanNode, message: Option<&str>) {
    leaf.state = Some(ExecutionState {
        result: Some(Outcome::Skipped),
        message: message.map(str::to_owned),
        ..ExecutionState::default()
    });
}

/// Walker executing a plan with a single [`Clock`].
pub(super) struct Executor<'r> {
    backend: &'r Backend,
    clock: &'r dyn Clock,
    dispatcher: &'r Dispatcher,
    configuration: &'r Configuration,
    fail_fast: bool,
    aborted: bool,
}

impl<'r> Executor<'r> {
    pub(super) fn new(
        backend: &'r Backend,
        clock: &'r dyn Clock,
        dispatcher: &'r Dispatcher,
        configuration: &'r Configuration,
        fail_fast: bool,
    ) -> Self {
        Self {
            backend,
            clock,
            dispatcher,
            configuration,
            fail_fast,
            aborted: false,
        }
    }

    /// Runs the given node and its descendants.
    pub(super) fn run(&mut self, node: &mut PlanNode) {
        match node.node_type {
            NodeType::TestCase => self.run_case(node),
            NodeType::Plan | NodeType::Aggregator => {
                self.publish(EventKind::NodeRunStarted, node);
                for child in &mut node.children {
                    self.run(child);
                }
                self.publish(EventKind::NodeRunFinished, node);
            }
            NodeType::Step | NodeType::VirtualStep => {
                tracing::warn!(node = %node.id, "step outside of a test case, ignored");
            }
        }
    }

    fn run_case(&mut self, case: &mut PlanNode) {
        if case.flag(properties::ABSORBED) {
            tracing::debug!(test_case = %case.id, "absorbed test case, not scheduled");
            return;
        }
        if self.aborted {
            let mut leaves = Vec::new();
            collect_leaves(&mut case.children, &mut leaves);
            for leaf in leaves {
                skip(leaf, Some("Skipped after a previous failure"));
            }
            return;
        }

        let span = tracing::info_span!("test_case", id = %case.id);
        let _entered = span.enter();
        self.publish(EventKind::NodeRunStarted, case);

        if case.flag(properties::UNRESOLVED) {
            let mut leaves = Vec::new();
            collect_leaves(&mut case.children, &mut leaves);
            let message = format!("No implementation found for `{}`", case.name);
            let mut failure = Some(Failure::new(Outcome::NotImplemented, message));
            for leaf in leaves {
                match failure.take() {
                    Some(f) => {
                        let _ = self.record(leaf, Err(f));
                    }
                    None => skip(leaf, None),
                }
            }
        } else {
            self.run_steps(case);
        }

        let result = case.result();
        tracing::info!(
            test_case = %case.id,
            result = result.map_or_else(|| "NONE".to_owned(), |r| r.to_string()),
            "test case finished",
        );
        self.publish(EventKind::NodeRunFinished, case);

        if self.fail_fast && result.is_some_and(Outcome::is_blocking) {
            tracing::warn!(test_case = %case.id, "failing fast, skipping the rest");
            self.aborted = true;
        }
    }

    /// Runs setup hooks, every step and teardown hooks of a test case.
    fn run_steps(&self, case: &mut PlanNode) {
        let mut context =
            StepContext::new(case.id.clone(), self.configuration.clone());
        let mut setup = self.run_hooks(HookKind::Setup, &mut context).err();

        let mut leaves = Vec::new();
        collect_leaves(&mut case.children, &mut leaves);
        let mut blocked = false;
        for leaf in &mut leaves {
            if let Some(failure) = setup.take() {
                let _ = self.record(leaf, Err(failure));
                blocked = true;
            } else if blocked {
                skip(leaf, None);
            } else {
                blocked = self.run_leaf(leaf, &mut context).is_blocking();
            }
        }
        if let Some(failure) = setup {
            tracing::warn!(test_case = %case.id, error = %failure.message, "setup failed");
        }

        if let Err(failure) = self.run_hooks(HookKind::Teardown, &mut context) {
            match leaves.last_mut() {
                Some(last) => self.escalate(last, failure),
                None => tracing::warn!(
                    test_case = %case.id,
                    error = %failure.message,
                    "teardown failed",
                ),
            }
        }
    }

    /// Runs every hook of the given kind in order.
    ///
    /// A failing setup hook stops the remaining ones, teardown hooks always
    /// run all.
    fn run_hooks(
        &self,
        kind: HookKind,
        context: &mut StepContext,
    ) -> Result<(), Failure> {
        let mut first = None;
        for hook in self.backend.hooks(kind) {
            tracing::trace!(hook = %hook.name, %kind, "running hook");
            if let Err(mut failure) = invoke(|| (hook.function)(context)) {
                failure.outcome = Outcome::Error;
                failure.message =
                    format!("{kind} hook `{}` failed: {}", hook.name, failure.message);
                if kind == HookKind::Setup {
                    return Err(failure);
                }
                let _ = first.get_or_insert(failure);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn run_leaf(&self, leaf: &mut PlanNode, context: &mut StepContext) -> Outcome {
        let result = match leaf.node_type {
            NodeType::VirtualStep => {
                self.publish(EventKind::NodeRunStarted, leaf);
                Ok(())
            }
            _ => {
                self.publish(EventKind::NodeRunStarted, leaf);
                self.invoke_step(leaf, context)
            }
        };
        self.record(leaf, result)
    }

    /// Resolves and invokes a step. The start instant is taken before
    /// resolving it.
    fn invoke_step(
        &self,
        leaf: &mut PlanNode,
        context: &mut StepContext,
    ) -> Result<(), Failure> {
        leaf.state = Some(ExecutionState::started(self.clock.now()));

        let found = self.backend.resolve_node(leaf).map_err(Failure::resolution)?;
        let Some(found) = found else {
            return Err(Failure::new(
                Outcome::Undefined,
                format!("Undefined step `{}`", leaf.name),
            ));
        };
        let data = leaf.data.as_ref().map(|d| self.backend.expand_data(d));
        let arguments = found.arguments(data).map_err(Failure::resolution)?;

        tracing::trace!(
            step = %leaf.id,
            definition = found.definition().id(),
            contributor = %found.step.contributor,
            "invoking step",
        );
        let function = found.definition().function();
        invoke(|| function(context, &arguments))
    }

    /// Finishes the state of a leaf with the given result.
    fn record(&self, leaf: &mut PlanNode, result: Result<(), Failure>) -> Outcome {
        let now = self.clock.now();
        let mut state = leaf
            .state
            .take()
            .filter(|s| s.start.is_some())
            .unwrap_or_else(|| ExecutionState::started(now));
        state.finish = Some(now);
        let outcome = match result {
            Ok(()) => Outcome::Passed,
            Err(failure) => {
                state.message = Some(failure.message);
                state.cause = failure.cause;
                failure.outcome
            }
        };
        state.result = Some(outcome);
        leaf.state = Some(state);

        tracing::debug!(step = %leaf.id, %outcome, "step finished");
        self.publish(EventKind::NodeRunFinished, leaf);
        outcome
    }

    /// Turns a leaf into an [`Outcome::Error`] after a teardown failure.
    fn escalate(&self, leaf: &mut PlanNode, failure: Failure) {
        let now = self.clock.now();
        let state = leaf.state.get_or_insert_with(ExecutionState::default);
        let _ = state.start.get_or_insert(now);
        let _ = state.finish.get_or_insert(now);
        state.result = Some(Outcome::Error);
        state.message = Some(match state.message.take() {
            Some(m) => format!("{m}\n{}", failure.message),
            None => failure.message,
        });
        if state.cause.is_none() {
            state.cause = failure.cause;
        }
        tracing::debug!(step = %leaf.id, "teardown failure reported");
    }

    fn publish(&self, kind: EventKind, node: &PlanNode) {
        if !self.dispatcher.is_empty() {
            let _ = self.dispatcher.publish(kind, Arc::new(node.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        let failed = Failure::classify(AssertionFailure::new("expected 1").into());
        let todo = Failure::classify(NotImplemented.into());
        let error = Failure::classify(anyhow::anyhow!("boom"));

        assert_eq!(failed.outcome, Outcome::Failed);
        assert_eq!(failed.message, "expected 1");
        assert_eq!(todo.outcome, Outcome::NotImplemented);
        assert_eq!(error.outcome, Outcome::Error);
        assert!(error.cause.is_some());
    }

    #[test]
    fn panics_become_errors() {
        let failure = invoke(|| panic!("kaboom")).unwrap_err();

        assert_eq!(failure.outcome, Outcome::Error);
        assert_eq!(failure.message, "Panicked: kaboom");
    }

    #[test]
    fn leaves_are_collected_in_order() {
        let mut case = PlanNode::new("c", NodeType::TestCase, "c");
        let agg = case.add_child(PlanNode::new("c#1", NodeType::Aggregator, "a"));
        let _ = agg.add_child(PlanNode::new("c#1.1", NodeType::Step, "x"));
        let _ = agg.add_child(PlanNode::new("c#1.2", NodeType::Step, "y"));
        let _ = case.add_child(PlanNode::new("c#2", NodeType::VirtualStep, "b"));

        let mut leaves = Vec::new();
        collect_leaves(&mut case.children, &mut leaves);

        assert_eq!(
            leaves.iter().map(|l| l.id.as_str()).collect::<Vec<_>>(),
            ["c#1.1", "c#1.2", "c#2"],
        );
    }
}
