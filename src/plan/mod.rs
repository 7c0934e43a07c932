// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Executable plan tree.
//!
//! A plan is a tree of [`PlanNode`]s: a single [`NodeType::Plan`] root,
//! [`NodeType::Aggregator`]s for features and outlines, and
//! [`NodeType::TestCase`]s owning their [`NodeType::Step`]s. Only leaves
//! carry an [`ExecutionState`], composite results and timings are always
//! derived from their descendants.

pub mod builder;
pub mod snapshot;

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::{Duration, SystemTime},
};

use derive_more::with_trait::Display;
use serde::{Deserialize, Serialize};

use crate::parser::StepArgument;

#[doc(inline)]
pub use self::builder::{properties, BuildError, PlanBuilder};

/// Kind of a [`PlanNode`].
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Root of the tree.
    #[display("PLAN")]
    Plan,

    /// Grouping node: a feature, an outline or a mapped step.
    #[display("AGGREGATOR")]
    Aggregator,

    /// Concrete scenario, or a single outline row.
    #[display("TEST_CASE")]
    TestCase,

    /// Step to be invoked.
    #[display("STEP")]
    Step,

    /// Placeholder step passing without invocation.
    #[display("VIRTUAL_STEP")]
    VirtualStep,
}

/// Terminal result of a node.
///
/// Ordered by severity, so a composite result is the [`Iterator::max`] of
/// its children results.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Ran successfully.
    #[display("PASSED")]
    Passed,

    /// Not run because of a previous outcome.
    #[display("SKIPPED")]
    Skipped,

    /// Matched a step explicitly declared as not implemented yet.
    #[display("NOT_IMPLEMENTED")]
    NotImplemented,

    /// Matched no step definition.
    #[display("UNDEFINED")]
    Undefined,

    /// An assertion did not hold.
    #[display("FAILED")]
    Failed,

    /// Unexpected error or panic.
    #[display("ERROR")]
    Error,
}

impl Outcome {
    /// Indicates whether this [`Outcome`] stops the rest of its test case.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        !matches!(self, Self::Passed | Self::Skipped)
    }
}

/// Lifecycle stage of a leaf.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// Not started yet.
    Pending,

    /// Started, not finished.
    Running,

    /// Finished with the given [`Outcome`].
    Finished(Outcome),
}

/// Execution state of a leaf [`PlanNode`].
#[derive(Clone, Debug, Default)]
pub struct ExecutionState {
    /// When the execution started.
    pub start: Option<SystemTime>,

    /// When the execution finished.
    pub finish: Option<SystemTime>,

    /// Terminal result.
    pub result: Option<Outcome>,

    /// Human-readable failure description.
    pub message: Option<String>,

    /// Original failure cause, kept for diagnostics only.
    pub cause: Option<Arc<anyhow::Error>>,
}

impl PartialEq for ExecutionState {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.finish == other.finish
            && self.result == other.result
            && self.message == other.message
    }
}

impl ExecutionState {
    /// Creates a state started at the given instant.
    #[must_use]
    pub fn started(at: SystemTime) -> Self {
        Self { start: Some(at), ..Self::default() }
    }

    /// Returns the [`Status`] of this state.
    #[must_use]
    pub fn status(&self) -> Status {
        match (self.start, self.result) {
            (_, Some(result)) => Status::Finished(result),
            (Some(_), None) => Status::Running,
            (None, None) => Status::Pending,
        }
    }
}

/// Node of the executable plan tree.
///
/// Children are owned exclusively. The parent is referred to by id only.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanNode {
    /// Identifier, unique within a plan and stable across rebuilds.
    pub id: String,

    /// Kind of this node.
    pub node_type: NodeType,

    /// Display name: feature or scenario name, or step text.
    pub name: String,

    /// Language of the source document.
    pub language: Option<String>,

    /// Source keyword (`Feature`, `Given`...).
    pub keyword: Option<String>,

    /// Tags, without the leading `@`.
    pub tags: BTreeSet<String>,

    /// Arbitrary properties.
    pub properties: BTreeMap<String, String>,

    /// Doc string or data table of a step.
    pub data: Option<StepArgument>,

    /// Id of the parent node.
    pub parent: Option<String>,

    /// Execution state, present on leaves once the run reached them.
    pub state: Option<ExecutionState>,

    /// Children, in execution order.
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    /// Id of every plan root.
    pub const ROOT_ID: &'static str = "plan";

    /// Creates a new childless [`PlanNode`].
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        node_type: NodeType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type,
            name: name.into(),
            language: None,
            keyword: None,
            tags: BTreeSet::new(),
            properties: BTreeMap::new(),
            data: None,
            parent: None,
            state: None,
            children: Vec::new(),
        }
    }

    /// Creates an empty plan root.
    #[must_use]
    pub fn root() -> Self {
        Self::new(Self::ROOT_ID, NodeType::Plan, "")
    }

    /// Appends the given `child`, returning a reference to it.
    pub fn add_child(&mut self, mut child: Self) -> &mut Self {
        child.parent = Some(self.id.clone());
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Replaces every child, re-pointing their parents to this node.
    pub fn set_children(&mut self, children: Vec<Self>) {
        self.children = children;
        for child in &mut self.children {
            child.parent = Some(self.id.clone());
        }
    }

    /// Indicates whether this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Indicates whether this node carries the given `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag.trim_start_matches('@'))
    }

    /// Returns the value of the given property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Indicates whether the given property is set to `true`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.property(key) == Some("true")
    }

    /// Sets the given property.
    pub fn set_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        let _ = self.properties.insert(key.into(), value.into());
    }

    /// Iterates over every descendant, depth-first and pre-order.
    #[must_use]
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: self.children.iter().rev().collect() }
    }

    /// Iterates over every descendant leaf, in execution order.
    pub fn leaves(&self) -> impl Iterator<Item = &Self> {
        self.descendants().filter(|n| n.is_leaf())
    }

    /// Iterates over every descendant [`NodeType::TestCase`].
    pub fn test_cases(&self) -> impl Iterator<Item = &Self> {
        self.descendants().filter(|n| n.node_type == NodeType::TestCase)
    }

    /// Looks for this node or a descendant with the given `id`.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Self> {
        if self.id == id {
            return Some(self);
        }
        self.descendants().find(|n| n.id == id)
    }

    /// Mutable version of [`PlanNode::find()`].
    pub fn find_mut(&mut self, id: &str) -> Option<&mut Self> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Calls `f` on this node and every descendant, pre-order.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Self)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }

    /// Returns the [`Status`] of a leaf, or [`Status::Pending`] for a
    /// composite.
    #[must_use]
    pub fn status(&self) -> Status {
        self.state.as_ref().map_or(Status::Pending, ExecutionState::status)
    }

    /// Returns the effective result of this node.
    ///
    /// A leaf reports its own; a composite reports the most severe result of
    /// its children, or [`None`] if none of them has run.
    #[must_use]
    pub fn result(&self) -> Option<Outcome> {
        if self.is_leaf() {
            self.state.as_ref().and_then(|s| s.result)
        } else {
            self.children.iter().filter_map(Self::result).max()
        }
    }

    /// Returns when this node started: its own start for a leaf, the
    /// earliest descendant start otherwise.
    #[must_use]
    pub fn start_instant(&self) -> Option<SystemTime> {
        if self.is_leaf() {
            self.state.as_ref().and_then(|s| s.start)
        } else {
            self.children.iter().filter_map(Self::start_instant).min()
        }
    }

    /// Returns when this node finished: its own finish for a leaf, the
    /// latest descendant finish otherwise.
    #[must_use]
    pub fn finish_instant(&self) -> Option<SystemTime> {
        if self.is_leaf() {
            self.state.as_ref().and_then(|s| s.finish)
        } else {
            self.children.iter().filter_map(Self::finish_instant).max()
        }
    }

    /// Returns how long this node ran, if it ran at all.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        let (start, finish) = (self.start_instant()?, self.finish_instant()?);
        finish.duration_since(start).ok()
    }

    /// Returns the first failure message of this node or its descendants.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.state
            .as_ref()
            .and_then(|s| s.message.as_deref())
            .or_else(|| self.children.iter().find_map(Self::message))
    }
}

/// Iterator over the descendants of a [`PlanNode`].
#[derive(Debug)]
pub struct Descendants<'n> {
    stack: Vec<&'n PlanNode>,
}

impl<'n> Iterator for Descendants<'n> {
    type Item = &'n PlanNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(
        id: &str,
        start: u64,
        finish: u64,
        result: Outcome,
    ) -> PlanNode {
        let mut node = PlanNode::new(id, NodeType::Step, id);
        node.state = Some(ExecutionState {
            start: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(start)),
            finish: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(finish)),
            result: Some(result),
            ..ExecutionState::default()
        });
        node
    }

    #[test]
    fn composite_result_is_most_severe() {
        let mut case = PlanNode::new("c", NodeType::TestCase, "case");
        let _ = case.add_child(finished("a", 0, 1, Outcome::Passed));
        let _ = case.add_child(finished("b", 1, 2, Outcome::Undefined));
        let _ = case.add_child(finished("c", 2, 3, Outcome::Skipped));
        let _ = case.add_child(PlanNode::new("d", NodeType::Step, "pending"));

        assert_eq!(case.result(), Some(Outcome::Undefined));
        assert_eq!(case.children[3].result(), None);
        assert_eq!(case.duration(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn unrun_composite_has_no_result_nor_duration() {
        let mut case = PlanNode::new("c", NodeType::TestCase, "case");
        let _ = case.add_child(PlanNode::new("s", NodeType::Step, "step"));

        assert_eq!(case.result(), None);
        assert_eq!(case.duration(), None);
        assert_eq!(case.status(), Status::Pending);
    }

    #[test]
    fn outcome_order() {
        use Outcome as O;

        let mut all = [
            O::Error,
            O::Passed,
            O::Failed,
            O::NotImplemented,
            O::Undefined,
            O::Skipped,
        ];
        all.sort();

        assert_eq!(
            all,
            [
                O::Passed,
                O::Skipped,
                O::NotImplemented,
                O::Undefined,
                O::Failed,
                O::Error,
            ],
        );
    }

    #[test]
    fn navigation() {
        let mut root = PlanNode::root();
        let feature =
            root.add_child(PlanNode::new("f", NodeType::Aggregator, "f"));
        let case =
            feature.add_child(PlanNode::new("c", NodeType::TestCase, "c"));
        let _ = case.add_child(PlanNode::new("c#1", NodeType::Step, "one"));
        let _ = case.add_child(PlanNode::new("c#2", NodeType::Step, "two"));

        assert_eq!(
            root.descendants().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            ["f", "c", "c#1", "c#2"],
        );
        assert_eq!(root.leaves().count(), 2);
        assert_eq!(root.find("c#2").and_then(|n| n.parent.as_deref()), Some("c"));
        assert!(root.find_mut("missing").is_none());
    }
}
