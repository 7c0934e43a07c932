// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Behavior-driven test automation engine.
//!
//! Gherkin-like documents are parsed into [`Document`]s, built into a
//! [`PlanNode`] tree with outlines expanded, rewritten by plan transformers
//! (binding definition scenarios to their implementations, for one), then
//! executed step by step against pluggable step contributors.
//!
//! Every pluggable concern is an extension point of the [`extension`]
//! module: step contributors, property evaluators, plan transformers,
//! reporters and configuration contributors.
//!
//! ```rust
//! # use std::sync::Arc;
//! use pepino::{
//!     extension::{self, ExtensionDescriptor, Instance, Registration, Registry},
//!     step::{StepContributor, StepDefinition},
//!     Configuration, Document, Outcome, Runner,
//! };
//!
//! struct Basket;
//!
//! impl StepContributor for Basket {
//!     fn info(&self) -> String {
//!         "basket".into()
//!     }
//!
//!     fn steps(&self) -> Vec<StepDefinition> {
//!         vec![StepDefinition::new(
//!             "count",
//!             "there are {integer} cucumbers",
//!             |_, args| {
//!                 assert!(args.value::<i64>("integer")? > 0);
//!                 Ok(())
//!             },
//!         )]
//!     }
//! }
//!
//! let registry = Registry::new();
//! registry.register_one(Registration::new(
//!     ExtensionDescriptor::new("acme", "basket", &extension::STEP_CONTRIBUTOR),
//!     || Instance::new(Arc::new(Basket) as Arc<dyn StepContributor>),
//! ));
//! let runner = Runner::new(&registry, &Configuration::empty()).unwrap();
//!
//! let doc = Document::parse(
//!     "Feature: Basket\n  Scenario: full\n    Given there are 12 cucumbers\n",
//!     "en",
//! )
//! .unwrap();
//! let mut plan = runner.plan([&doc]).unwrap();
//!
//! assert_eq!(runner.run(&mut plan), Some(Outcome::Passed));
//! ```

pub mod cli;
pub mod config;
pub mod defaults;
mod error;
pub mod event;
pub mod extension;
pub mod observer;
pub mod parser;
pub mod plan;
pub mod runner;
pub mod step;
pub mod tag;
pub mod transform;

#[doc(inline)]
pub use self::{
    config::Configuration,
    error::{Error, ErrorKind},
    event::{Event, EventKind},
    extension::Registry,
    observer::{Dispatcher, Observer},
    parser::Document,
    plan::{NodeType, Outcome, PlanNode},
    runner::{Reporter, Runner},
};
