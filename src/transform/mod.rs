// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Structural rewrites of a built plan, run before execution.

mod redefinition;

use std::sync::Arc;

use derive_more::{Debug, Display, Error, From};

use crate::{
    config::{self, Configuration},
    extension::{self, Registry},
    parser::Document,
    plan::PlanNode,
};

#[doc(inline)]
pub use self::redefinition::{
    Direction, RedefinitionReport, RedefinitionRule, RedefinitionTransformer,
};

/// Well-known [`PlanNode`] properties set by transformers.
pub mod properties {
    /// Set to `true` on a test case whose steps were moved into another one.
    /// Absorbed test cases are never executed.
    pub const ABSORBED: &str = "absorbed";

    /// Set to `true` on a definition test case without implementation.
    pub const UNRESOLVED: &str = "unresolved";

    /// Id of the test case a redefined test case took its steps from.
    pub const REDEFINED_BY: &str = "redefinedBy";
}

/// Error of transforming a plan.
#[derive(Clone, Debug, Display, Error, From)]
pub enum Error {
    /// The id tag pattern is not a valid regex.
    #[display("Invalid id tag pattern `{pattern}`: {reason}")]
    #[from(ignore)]
    InvalidPattern {
        /// The offending pattern.
        #[error(not(source))]
        pattern: String,

        /// Why it is invalid.
        #[error(not(source))]
        reason: String,
    },

    /// The id tag pattern does not have exactly one capture group.
    #[display(
        "Id tag pattern `{pattern}` must have exactly one capture group, \
         but has {groups}"
    )]
    #[from(ignore)]
    CaptureGroups {
        /// The offending pattern.
        #[error(not(source))]
        pattern: String,

        /// Number of capture groups found.
        #[error(not(source))]
        groups: usize,
    },

    /// Two test cases with the same role share an id.
    #[display("Test cases `{first}` and `{second}` are both `@{tag}` with id `{id}`")]
    #[from(ignore)]
    DuplicateId {
        /// Tag of the role.
        #[error(not(source))]
        tag: String,

        /// Shared captured id.
        #[error(not(source))]
        id: String,

        /// Id of the first test case.
        #[error(not(source))]
        first: String,

        /// Id of the second test case.
        #[error(not(source))]
        second: String,
    },

    /// A test case is tagged with both roles of a correlation.
    #[display(
        "Test case `{test_case}` cannot be both `@{source_tag}` and \
         `@{target_tag}`"
    )]
    #[from(ignore)]
    BothRoles {
        /// Id of the test case.
        #[error(not(source))]
        test_case: String,

        /// Tag of the definition role.
        #[error(not(source))]
        source_tag: String,

        /// Tag of the implementation role.
        #[error(not(source))]
        target_tag: String,
    },

    /// A step map is malformed or does not fit the steps.
    #[display("Bad step map `{map}` of test case `{test_case}`: {reason}")]
    #[from(ignore)]
    StepMap {
        /// Id of the test case declaring it.
        #[error(not(source))]
        test_case: String,

        /// The step map.
        #[error(not(source))]
        map: String,

        /// What is wrong.
        #[error(not(source))]
        reason: String,
    },

    /// A transformer-specific failure.
    #[display("Transformer `{transformer}` failed: {reason}")]
    #[from(ignore)]
    Custom {
        /// Name of the transformer.
        #[error(not(source))]
        transformer: String,

        /// What went wrong.
        #[error(not(source))]
        reason: String,
    },

    /// Invalid configuration value.
    #[display("{_0}")]
    Config(config::Error),

    /// Transformers cannot be resolved.
    #[display("{_0}")]
    Extension(extension::Error),
}

/// Structural rewrite of a plan.
///
/// Transformers run after the plan is fully built and before it is
/// executed. They may change the steps of test cases, but never the ids of
/// existing test cases.
pub trait PlanTransformer: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Rewrites the parsed `documents` before the plan is built out of them.
    ///
    /// Does nothing by default.
    ///
    /// # Errors
    ///
    /// If the rewrite is not possible.
    fn prepare(
        &self,
        _: &mut [Document],
        _: &Configuration,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Rewrites the given `plan` in place.
    ///
    /// # Errors
    ///
    /// If the rewrite is not possible, leaving the `plan` in an unspecified
    /// state.
    fn transform(
        &self,
        plan: &mut PlanNode,
        configuration: &Configuration,
    ) -> Result<(), Error>;
}

/// Ordered list of [`PlanTransformer`]s.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    #[debug("{}", transformers.len())]
    transformers: Vec<Arc<dyn PlanTransformer>>,
}

impl Pipeline {
    /// Creates an empty [`Pipeline`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [`Pipeline`] of the active transformers of the given
    /// [`Registry`], in ascending priority.
    ///
    /// # Errors
    ///
    /// If the transformers cannot be resolved.
    pub fn from_registry(registry: &Registry) -> Result<Self, Error> {
        let transformers = registry
            .resolve_as::<Arc<dyn PlanTransformer>>(&extension::PLAN_TRANSFORMER)?;
        Ok(Self { transformers })
    }

    /// Appends a [`PlanTransformer`].
    #[must_use]
    pub fn with(mut self, transformer: Arc<dyn PlanTransformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    /// Indicates whether this [`Pipeline`] has no transformers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Prepares the `documents` with every [`PlanTransformer`] in order.
    ///
    /// # Errors
    ///
    /// On the first failing [`PlanTransformer`].
    pub fn prepare(
        &self,
        documents: &mut [Document],
        configuration: &Configuration,
    ) -> Result<(), Error> {
        for transformer in &self.transformers {
            transformer.prepare(documents, configuration)?;
        }
        Ok(())
    }

    /// Applies every [`PlanTransformer`] in order.
    ///
    /// # Errors
    ///
    /// On the first failing [`PlanTransformer`].
    pub fn apply(
        &self,
        plan: &mut PlanNode,
        configuration: &Configuration,
    ) -> Result<(), Error> {
        for transformer in &self.transformers {
            tracing::debug!(transformer = transformer.name(), "transforming plan");
            transformer.transform(plan, configuration)?;
        }
        Ok(())
    }
}
