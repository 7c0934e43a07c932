// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Built-in extensions, registered by every [`Runner`].
//!
//! They are registered with the lowest priority under the `pepino`
//! provider, so any of them can be replaced by an extension overriding
//! `pepino:<name>`.
//!
//! [`Runner`]: crate::Runner

use std::sync::Arc;

use crate::{
    config::{keys, Configuration},
    extension::{
        self, ConfigContributor, ExtensionDescriptor, Instance, Registration,
        StaticLoader,
    },
    transform::{PlanTransformer, RedefinitionRule, RedefinitionTransformer},
};

/// Provider of the built-in extensions.
pub const PROVIDER: &str = "pepino";

/// [`ConfigContributor`] of the engine defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfiguration;

impl ConfigContributor for DefaultConfiguration {
    fn defaults(&self) -> Configuration {
        let rule = RedefinitionRule::default();
        Configuration::builder()
            .set(keys::LANGUAGE, "en")
            .set(keys::FAIL_FAST, "false")
            .set(keys::ID_TAG_PATTERN, rule.id_tag_pattern.as_str())
            .set(keys::DEFINITION_TAG, rule.source_tag)
            .set(keys::IMPLEMENTATION_TAG, rule.target_tag)
            .set(keys::REDEFINITION_DIRECTION, rule.direction.to_string())
            .build()
    }
}

/// Returns the [`StaticLoader`] of the built-in extensions.
#[must_use]
pub fn loader() -> StaticLoader {
    let builtin = |name: &str, point| {
        ExtensionDescriptor::new(PROVIDER, name, point)
            .with_priority(ExtensionDescriptor::MIN_PRIORITY)
    };
    StaticLoader::new(PROVIDER)
        .with(Registration::new(
            builtin("defaults", &extension::CONFIG_CONTRIBUTOR),
            || {
                Instance::new(
                    Arc::new(DefaultConfiguration) as Arc<dyn ConfigContributor>
                )
            },
        ))
        .with(Registration::new(
            builtin("redefinition", &extension::PLAN_TRANSFORMER),
            || {
                Instance::new(
                    Arc::new(RedefinitionTransformer) as Arc<dyn PlanTransformer>
                )
            },
        ))
}
