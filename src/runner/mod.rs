// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! [`Runner`] turning documents into an executed plan.
//!
//! A run goes through these stages:
//! 1. Documents are parsed, prepared by plan transformers and built into a
//!    plan, with ids assigned.
//! 2. Plan transformers rewrite it, redefinition being one of them.
//! 3. Every step scheduled to run is resolved, so ambiguities fail before
//!    any step is executed.
//! 4. The plan is executed depth-first, one test case after another.
//! 5. Reporters receive the complete result tree.

pub mod clock;
mod executor;

use std::{path::Path, sync::Arc};

use derive_more::with_trait::Debug;
use smart_default::SmartDefault;

use crate::{
    config::{self, keys, Configuration},
    defaults,
    event::EventKind,
    extension::{self, Registry},
    observer::Dispatcher,
    parser::{self, Basic, Document, Parser as _},
    plan::{Outcome, PlanBuilder, PlanNode},
    step::Backend,
    transform::Pipeline,
    Error,
};

#[doc(inline)]
pub use self::clock::{Clock, ManualClock, SystemClock};

use self::executor::Executor;

/// Receiver of the complete result tree after a run, registered at the
/// [`REPORTER`] extension point as an `Arc<dyn Reporter>`.
///
/// [`REPORTER`]: extension::REPORTER
pub trait Reporter: Send + Sync {
    /// Reports the executed `plan`.
    ///
    /// # Errors
    ///
    /// If the report cannot be produced. Failures are logged and do not
    /// affect the run.
    fn report(
        &self,
        plan: &PlanNode,
        configuration: &Configuration,
    ) -> anyhow::Result<()>;
}

/// Options of a [`Runner`].
#[derive(Clone, Debug, SmartDefault)]
pub struct Options {
    /// Skip every test case after the first one not passing.
    pub fail_fast: bool,

    /// Language of documents without `# language:` header.
    #[default("en".to_owned())]
    pub language: String,
}

impl Options {
    /// Reads the [`Options`] out of the given [`Configuration`].
    ///
    /// # Errors
    ///
    /// If a configured value is invalid.
    pub fn from_config(configuration: &Configuration) -> Result<Self, config::Error> {
        let default = Self::default();
        Ok(Self {
            fail_fast: configuration.get_or(keys::FAIL_FAST, default.fail_fast)?,
            language: configuration.get_or(keys::LANGUAGE, default.language)?,
        })
    }
}

/// Executes plans against the extensions of a [`Registry`].
#[derive(Debug)]
pub struct Runner {
    configuration: Configuration,
    options: Options,
    backend: Backend,
    pipeline: Pipeline,
    #[debug("{}", reporters.len())]
    reporters: Vec<Arc<dyn Reporter>>,
    dispatcher: Arc<Dispatcher>,
    #[debug(skip)]
    clock: Arc<dyn Clock>,
}

impl Runner {
    /// Creates a [`Runner`] out of the active extensions of the given
    /// [`Registry`], with the built-in ones added.
    ///
    /// The effective [`Configuration`] is the `user` one on top of the
    /// defaults of every configuration contributor.
    ///
    /// # Errors
    ///
    /// If the extensions cannot be resolved, or the configuration is
    /// invalid.
    pub fn new(registry: &Registry, user: &Configuration) -> Result<Self, Error> {
        let _ = registry.register(&defaults::loader());
        let configuration = extension::configure(registry, user)?;
        let options = Options::from_config(&configuration)?;
        let backend = Backend::from_registry(registry, &configuration)?;
        let pipeline = Pipeline::from_registry(registry)?;
        let reporters =
            registry.resolve_as::<Arc<dyn Reporter>>(&extension::REPORTER)?;
        tracing::debug!(?options, reporters = reporters.len(), "runner created");

        Ok(Self {
            configuration,
            options,
            backend,
            pipeline,
            reporters,
            dispatcher: Arc::new(Dispatcher::new()),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the [`Clock`] stamping executed nodes.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the effective [`Configuration`].
    #[must_use]
    pub const fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Returns the [`Options`] read out of the [`Configuration`].
    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Returns the step [`Backend`].
    #[must_use]
    pub const fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Returns the [`Dispatcher`] of this [`Runner`]'s events.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Parses a document, or every `*.feature` document of a directory.
    ///
    /// A malformed document does not prevent the other ones from loading.
    pub fn load(&self, path: impl AsRef<Path>) -> Vec<parser::Result<Document>> {
        let documents = Basic.parse(path.as_ref(), &self.options.language);
        for err in documents.iter().filter_map(|r| r.as_ref().err()) {
            tracing::warn!(error = %err, "document not loaded");
        }
        documents
    }

    /// Builds, transforms and validates the plan of the given documents.
    ///
    /// # Errors
    ///
    /// If the plan cannot be built or transformed, or a step is ambiguous.
    pub fn plan<'d, I>(&self, documents: I) -> Result<PlanNode, Error>
    where
        I: IntoIterator<Item = &'d Document>,
    {
        let mut documents = documents.into_iter().cloned().collect::<Vec<_>>();
        self.pipeline.prepare(&mut documents, &self.configuration)?;
        let mut plan =
            PlanBuilder::from_config(&self.configuration)?.build(&documents)?;
        self.pipeline.apply(&mut plan, &self.configuration)?;
        self.backend.validate(&plan)?;

        self.publish(EventKind::PlanCreated, &plan);
        Ok(plan)
    }

    /// Loads the documents under the given `path` and plans them.
    ///
    /// # Errors
    ///
    /// If any document is malformed, or see [`Runner::plan()`].
    pub fn plan_path(&self, path: impl AsRef<Path>) -> Result<PlanNode, Error> {
        let documents = self
            .load(path)
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        self.plan(&documents)
    }

    /// Executes the given `plan`, recording the state of every leaf, then
    /// hands it to the reporters.
    ///
    /// Returns the result of the whole plan, if anything ran.
    pub fn run(&self, plan: &mut PlanNode) -> Option<Outcome> {
        let span = tracing::info_span!("plan_run", test_cases = plan.test_cases().count());
        let _entered = span.enter();
        self.publish(EventKind::PlanRunStarted, plan);

        let mut executor = Executor::new(
            &self.backend,
            &*self.clock,
            &self.dispatcher,
            &self.configuration,
            self.options.fail_fast,
        );
        for child in &mut plan.children {
            executor.run(child);
        }

        let result = plan.result();
        tracing::info!(
            result = result.map_or_else(|| "NONE".to_owned(), |r| r.to_string()),
            duration = ?plan.duration(),
            "plan run finished",
        );
        self.publish(EventKind::PlanRunFinished, plan);

        for reporter in &self.reporters {
            if let Err(e) = reporter.report(plan, &self.configuration) {
                tracing::warn!(error = %e, "reporter failed");
            }
        }
        result
    }

    fn publish(&self, kind: EventKind, plan: &PlanNode) {
        if !self.dispatcher.is_empty() {
            let _ = self.dispatcher.publish(kind, Arc::new(plan.clone()));
        }
    }
}
