// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Lifecycle events of a plan and its runs.
//!
//! Every [`Event`] carries the [`PlanNode`] it is about: the plan root for
//! plan-level events, the started or finished node otherwise. Events are
//! created by the [`Dispatcher`] when published.
//!
//! [`Dispatcher`]: crate::observer::Dispatcher

use std::{sync::Arc, time::Instant};

use derive_more::with_trait::{AsRef, Debug, Deref, Display};

use crate::plan::PlanNode;

/// Type of an [`Event`].
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum EventKind {
    /// A plan was built and transformed.
    #[display("plan-created")]
    PlanCreated,

    /// A plan run started.
    #[display("plan-run-started")]
    PlanRunStarted,

    /// A plan run finished, the payload carries the complete result tree.
    #[display("plan-run-finished")]
    PlanRunFinished,

    /// A node started running.
    #[display("node-run-started")]
    NodeRunStarted,

    /// A node finished running.
    #[display("node-run-finished")]
    NodeRunFinished,
}

impl EventKind {
    /// Every [`EventKind`], in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::PlanCreated,
        Self::PlanRunStarted,
        Self::NodeRunStarted,
        Self::NodeRunFinished,
        Self::PlanRunFinished,
    ];

    /// Indicates whether this kind is about the whole plan.
    #[must_use]
    pub const fn is_plan_level(self) -> bool {
        matches!(
            self,
            Self::PlanCreated | Self::PlanRunStarted | Self::PlanRunFinished,
        )
    }
}

/// Immutable notification delivered to observers.
#[derive(AsRef, Clone, Debug, Deref)]
#[non_exhaustive]
pub struct Event {
    /// What happened.
    pub kind: EventKind,

    /// Position of this [`Event`] among the ones of its dispatcher.
    pub seq: u64,

    /// When it was dispatched.
    pub at: Instant,

    /// Node this [`Event`] is about.
    #[as_ref]
    #[deref]
    #[debug("{}", payload.id)]
    pub payload: Arc<PlanNode>,
}

impl Event {
    /// Creates a new [`Event`] dispatched now.
    #[must_use]
    pub fn new(kind: EventKind, seq: u64, payload: Arc<PlanNode>) -> Self {
        Self { kind, seq, at: Instant::now(), payload }
    }
}
