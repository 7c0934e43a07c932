// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Step backend: matching step text against contributed
//! [`StepDefinition`]s, coercing arguments and invoking them.
//!
//! Step implementations come from [`StepContributor`]s. Each of them
//! provides [`StepDefinition`]s (phrase templates bound to functions),
//! optional setup/teardown [`Hook`]s, and optional extra [`DataType`]s.
//! The [`Backend`] compiles all of them once, then resolves every plan step
//! to its best-scoring definition.

pub mod assertion;
mod backend;
mod context;
mod definition;
pub mod types;

use std::sync::Arc;

use derive_more::{Debug, Display, Error, From};

use crate::{config::Configuration, extension};

#[doc(inline)]
pub use self::{
    assertion::{ensure, Assertion, AssertionFailure, Comparison},
    backend::{Backend, BackendBuilder, ConfigurationEvaluator, Match},
    context::{ArgumentError, Arguments, StepContext},
    definition::{CompiledStep, Param, StepDefinition, StepFn, Template},
    types::{DataType, FromValue, TypeRegistry, Value},
};

/// Error of resolving steps.
#[derive(Clone, Debug, Display, Error, From)]
pub enum Error {
    /// A placeholder names an unknown [`DataType`].
    #[display("Step `{definition}` uses unknown type `{type_name}`")]
    #[from(ignore)]
    UnknownType {
        /// Id of the [`StepDefinition`].
        #[error(not(source))]
        definition: String,

        /// Name of the unknown type.
        #[error(not(source))]
        type_name: String,
    },

    /// A template does not compile into a regex.
    #[display("Step `{definition}` has an invalid template: {reason}")]
    #[from(ignore)]
    InvalidTemplate {
        /// Id of the [`StepDefinition`].
        #[error(not(source))]
        definition: String,

        /// Regex error.
        #[error(not(source))]
        reason: String,
    },

    /// Several definitions match a step equally well.
    #[display(
        "Step `{text}` of `{node}` is ambiguous, possible matches: {}",
        candidates.join(", "),
    )]
    #[from(ignore)]
    Ambiguous {
        /// Id of the step node.
        #[error(not(source))]
        node: String,

        /// Step text, after property expansion.
        #[error(not(source))]
        text: String,

        /// Ids of the matching definitions.
        #[error(not(source))]
        candidates: Vec<String>,
    },

    /// A matched placeholder cannot be coerced to its type.
    #[display("Argument `{argument}` of type `{type_name}`: {reason}")]
    #[from(ignore)]
    Coercion {
        /// Name of the argument.
        #[error(not(source))]
        argument: String,

        /// Name of the type.
        #[error(not(source))]
        type_name: String,

        /// Why the coercion failed.
        #[error(not(source))]
        reason: String,
    },

    /// Step contributors or property evaluators cannot be resolved.
    #[display("{_0}")]
    Extension(extension::Error),
}

/// Marker error of a step declared but not implemented yet.
///
/// A step returning it is reported as [`Outcome::NotImplemented`].
///
/// [`Outcome::NotImplemented`]: crate::plan::Outcome::NotImplemented
#[derive(Clone, Copy, Debug, Default, Display, Error, Eq, PartialEq)]
#[display("Step is not implemented yet")]
pub struct NotImplemented;

/// When a [`Hook`] runs.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum HookKind {
    /// Before the first step of every test case.
    #[display("setup")]
    Setup,

    /// After the last step of every test case, whatever the outcome.
    #[display("teardown")]
    Teardown,
}

/// Function of a [`Hook`].
pub type HookFn =
    Arc<dyn Fn(&mut StepContext) -> anyhow::Result<()> + Send + Sync>;

/// Setup or teardown function, run in ascending `order`.
#[derive(Clone, Debug)]
pub struct Hook {
    /// Name, for diagnostics.
    pub name: String,

    /// When it runs.
    pub kind: HookKind,

    /// Position among hooks of the same kind, lower first.
    pub order: i32,

    /// Function to run.
    #[debug(skip)]
    pub function: HookFn,
}

impl Hook {
    fn new<F>(name: impl Into<String>, kind: HookKind, order: i32, f: F) -> Self
    where
        F: Fn(&mut StepContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self { name: name.into(), kind, order, function: Arc::new(f) }
    }

    /// Creates a [`HookKind::Setup`] hook.
    pub fn setup<F>(name: impl Into<String>, order: i32, f: F) -> Self
    where
        F: Fn(&mut StepContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(name, HookKind::Setup, order, f)
    }

    /// Creates a [`HookKind::Teardown`] hook.
    pub fn teardown<F>(name: impl Into<String>, order: i32, f: F) -> Self
    where
        F: Fn(&mut StepContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(name, HookKind::Teardown, order, f)
    }
}

/// Provider of step implementations, registered at the
/// [`STEP_CONTRIBUTOR`] extension point as an `Arc<dyn StepContributor>`.
///
/// [`STEP_CONTRIBUTOR`]: extension::STEP_CONTRIBUTOR
pub trait StepContributor: Send + Sync {
    /// Identity of this contributor, for diagnostics.
    fn info(&self) -> String;

    /// Step definitions.
    fn steps(&self) -> Vec<StepDefinition>;

    /// Setup and teardown hooks.
    fn hooks(&self) -> Vec<Hook> {
        Vec::new()
    }

    /// Extra data types usable in placeholders.
    fn data_types(&self) -> Vec<DataType> {
        Vec::new()
    }
}

/// Evaluator of `${expression}` properties in step text, registered at the
/// [`PROPERTY_EVALUATOR`] extension point as an
/// `Arc<dyn PropertyEvaluator>`.
///
/// [`PROPERTY_EVALUATOR`]: extension::PROPERTY_EVALUATOR
pub trait PropertyEvaluator: Send + Sync {
    /// Evaluates the `expression` between `${` and `}`, returning [`None`]
    /// if it is not handled by this evaluator.
    fn evaluate(
        &self,
        expression: &str,
        configuration: &Configuration,
    ) -> Option<String>;
}
