// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Discovery and arbitration of pluggable implementations.
//!
//! Every pluggable concern (step contributors, plan transformers, reporters,
//! property evaluators, configuration contributors) is an
//! [`ExtensionPoint`]. Implementations are described by an
//! [`ExtensionDescriptor`], discovered by [`Loader`]s and resolved by the
//! [`Registry`], which applies version compatibility, overrides and priority
//! ordering.

mod descriptor;
mod loader;
mod registry;

use derive_more::{Display, Error};

use crate::config::Configuration;

#[doc(inline)]
pub use self::{
    descriptor::{
        ExtensionDescriptor, ExtensionPoint, LoadStrategy, Version,
        CONFIG_CONTRIBUTOR, PLAN_TRANSFORMER, PROPERTY_EVALUATOR, REPORTER,
        STEP_CONTRIBUTOR,
    },
    loader::{
        Factory, Instance, InventoryLoader, Loader, Registration,
        StaticExtension, StaticLoader,
    },
    registry::Registry,
};

/// Error of resolving extensions.
#[derive(Clone, Debug, Display, Eq, Error, PartialEq)]
pub enum Error {
    /// Extensions of an [`ExtensionPoint`] override each other in a cycle.
    #[display(
        "Ambiguous overrides of `{point}` extensions: {}",
        chain.join(" -> "),
    )]
    OverrideCycle {
        /// Name of the [`ExtensionPoint`].
        #[error(not(source))]
        point: String,

        /// Ids of the extensions forming the cycle.
        chain: Vec<String>,
    },

    /// An extension instance is not of the requested type.
    #[display("Extension `{id}` is not a `{expected}`")]
    UnexpectedType {
        /// Id of the offending extension.
        #[error(not(source))]
        id: String,

        /// Name of the requested type.
        expected: &'static str,
    },

    /// A [`Version`] string is malformed.
    #[display("Invalid version `{_0}`")]
    InvalidVersion(#[error(not(source))] String),
}

/// Contributor of default [`Configuration`] values.
///
/// Defaults of every active contributor are merged in ascending priority, so
/// the highest-priority contributor is applied last; user configuration is
/// applied on top of all of them.
pub trait ConfigContributor: Send + Sync {
    /// Returns the default values this contributor provides.
    fn defaults(&self) -> Configuration;
}

/// Merges the defaults of the active [`ConfigContributor`]s of the given
/// [`Registry`] below the given `user` [`Configuration`].
///
/// # Errors
///
/// If the contributors cannot be resolved.
pub fn configure(
    registry: &Registry,
    user: &Configuration,
) -> Result<Configuration, Error> {
    let contributors = registry
        .resolve_as::<std::sync::Arc<dyn ConfigContributor>>(&CONFIG_CONTRIBUTOR)?;
    let defaults = contributors
        .iter()
        .fold(Configuration::empty(), |acc, c| acc.merge(&c.defaults()));
    Ok(defaults.merge(user))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    struct Defaults(&'static str);

    impl ConfigContributor for Defaults {
        fn defaults(&self) -> Configuration {
            Configuration::from_pairs([("language", self.0), (self.0, "set")])
        }
    }

    fn contributor(name: &'static str, priority: i32) -> Registration {
        Registration::new(
            ExtensionDescriptor::new("acme", name, &CONFIG_CONTRIBUTOR)
                .with_priority(priority),
            move || Instance::new(Arc::new(Defaults(name)) as Arc<dyn ConfigContributor>),
        )
    }

    #[test]
    fn highest_priority_contributor_is_applied_last() {
        let registry = Registry::new();
        let _ = registry.register_one(contributor("es", ExtensionDescriptor::MAX_PRIORITY));
        let _ = registry.register_one(contributor("en", 1));

        let conf = configure(&registry, &Configuration::empty()).unwrap();

        assert_eq!(conf.get_raw("language"), Some("es"));
        assert_eq!(conf.get_raw("en"), Some("set"));
        assert_eq!(conf.get_raw("es"), Some("set"));
    }

    #[test]
    fn user_configuration_wins() {
        let registry = Registry::new();
        let _ = registry.register_one(contributor("es", 1));

        let conf = configure(
            &registry,
            &Configuration::from_pairs([("language", "fr")]),
        )
        .unwrap();

        assert_eq!(conf.get_raw("language"), Some("fr"));
    }
}
