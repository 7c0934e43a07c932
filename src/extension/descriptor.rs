// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Identity of an extension: [`ExtensionPoint`]s, [`Version`]s and
//! [`ExtensionDescriptor`]s.

use std::{borrow::Cow, str::FromStr};

use derive_more::with_trait::Display;

use super::Error;

/// Semantic version of an extension or an [`ExtensionPoint`].
#[derive(
    Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[display("{major}.{minor}.{patch}")]
pub struct Version {
    /// Major version, incompatible changes.
    pub major: u64,

    /// Minor version, backward-compatible additions.
    pub minor: u64,

    /// Patch version.
    pub patch: u64,
}

impl Version {
    /// Creates a new [`Version`].
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Indicates whether something built against this [`Version`] of an
    /// [`ExtensionPoint`] can be plugged into the `provided` one.
    ///
    /// Majors must be equal, and the required minor must not be newer than
    /// the provided one.
    #[must_use]
    pub const fn is_compatible_with(&self, provided: &Self) -> bool {
        self.major == provided.major && self.minor <= provided.minor
    }
}

impl FromStr for Version {
    type Err = Error;

    /// Parses `major[.minor[.patch]]`, ignoring any `-pre`/`+build` suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidVersion(s.to_owned());

        let core = s.trim().split(['-', '+']).next().unwrap_or_default();
        let mut parts = core.split('.');
        let mut next = |required: bool| -> Result<u64, Error> {
            match parts.next() {
                Some(p) => p.parse().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let version = Self::new(next(true)?, next(false)?, next(false)?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

/// Capability point that extensions plug into.
///
/// Each kind of contributor (steps, transformers, reporters...) is a
/// distinct [`ExtensionPoint`] resolved independently by the same
/// [`Registry`].
///
/// [`Registry`]: super::Registry
#[derive(Clone, Debug, Display, Eq, Hash, PartialEq)]
#[display("{name} ({version})")]
pub struct ExtensionPoint {
    /// Identifier of this [`ExtensionPoint`].
    name: Cow<'static, str>,

    /// Current [`Version`] of this [`ExtensionPoint`]'s contract.
    version: Version,
}

impl ExtensionPoint {
    /// Declares a new [`ExtensionPoint`].
    #[must_use]
    pub const fn new(name: &'static str, version: Version) -> Self {
        Self { name: Cow::Borrowed(name), version }
    }

    /// Declares a new [`ExtensionPoint`] with a runtime name.
    #[must_use]
    pub fn custom(name: impl Into<String>, version: Version) -> Self {
        Self { name: Cow::Owned(name.into()), version }
    }

    /// Returns the identifier of this [`ExtensionPoint`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the contract [`Version`] of this [`ExtensionPoint`].
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }
}

/// [`ExtensionPoint`] of [`StepContributor`]s.
///
/// [`StepContributor`]: crate::step::StepContributor
pub const STEP_CONTRIBUTOR: ExtensionPoint =
    ExtensionPoint::new("step-contributor", Version::new(1, 0, 0));

/// [`ExtensionPoint`] of [`PropertyEvaluator`]s.
///
/// [`PropertyEvaluator`]: crate::step::PropertyEvaluator
pub const PROPERTY_EVALUATOR: ExtensionPoint =
    ExtensionPoint::new("property-evaluator", Version::new(1, 0, 0));

/// [`ExtensionPoint`] of [`PlanTransformer`]s.
///
/// [`PlanTransformer`]: crate::transform::PlanTransformer
pub const PLAN_TRANSFORMER: ExtensionPoint =
    ExtensionPoint::new("plan-transformer", Version::new(1, 0, 0));

/// [`ExtensionPoint`] of [`Reporter`]s.
///
/// [`Reporter`]: crate::observer::Reporter
pub const REPORTER: ExtensionPoint =
    ExtensionPoint::new("reporter", Version::new(1, 0, 0));

/// [`ExtensionPoint`] of [`ConfigContributor`]s.
///
/// [`ConfigContributor`]: crate::extension::ConfigContributor
pub const CONFIG_CONTRIBUTOR: ExtensionPoint =
    ExtensionPoint::new("config-contributor", Version::new(1, 0, 0));

/// Strategy of providing instances of an extension.
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
pub enum LoadStrategy {
    /// Single instance cached by the [`Registry`] and shared by all callers.
    ///
    /// [`Registry`]: super::Registry
    #[default]
    #[display("singleton")]
    Singleton,

    /// New instance on every request.
    #[display("fresh")]
    Fresh,
}

/// Identity and arbitration metadata of one implementation of one
/// [`ExtensionPoint`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExtensionDescriptor {
    /// Provider (vendor, crate) of the extension.
    pub provider: String,

    /// Name of the extension, unique per provider.
    pub name: String,

    /// [`Version`] of the extension itself.
    pub version: Version,

    /// Name of the [`ExtensionPoint`] this extension implements.
    pub extension_point: String,

    /// [`Version`] of the [`ExtensionPoint`] contract this extension was
    /// built against.
    pub extension_point_version: Version,

    /// Arbitration priority: higher values are applied later.
    pub priority: i32,

    /// Reference (`name`, `provider:name` or full id) of another extension
    /// this one supersedes.
    pub overrides: Option<String>,

    /// Whether the lifecycle of instances is owned outside the [`Registry`].
    ///
    /// [`Registry`]: super::Registry
    pub externally_managed: bool,

    /// How instances are provided.
    pub load_strategy: LoadStrategy,
}

impl ExtensionDescriptor {
    /// Lowest possible priority.
    pub const MIN_PRIORITY: i32 = i32::MIN;

    /// Highest possible priority.
    pub const MAX_PRIORITY: i32 = i32::MAX;

    /// Creates a new [`ExtensionDescriptor`] of version `1.0.0` targeting the
    /// current version of the given `point`.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        name: impl Into<String>,
        point: &ExtensionPoint,
    ) -> Self {
        Self {
            provider: provider.into(),
            name: name.into(),
            version: Version::new(1, 0, 0),
            extension_point: point.name().to_owned(),
            extension_point_version: point.version(),
            priority: 0,
            overrides: None,
            externally_managed: false,
            load_strategy: LoadStrategy::default(),
        }
    }

    /// Sets the [`Version`] of this extension.
    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Sets the [`ExtensionPoint`] [`Version`] this extension requires.
    #[must_use]
    pub fn requiring(mut self, point_version: Version) -> Self {
        self.extension_point_version = point_version;
        self
    }

    /// Sets the priority of this extension.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Makes this extension supersede the referenced one.
    #[must_use]
    pub fn overriding(mut self, reference: impl Into<String>) -> Self {
        self.overrides = Some(reference.into());
        self
    }

    /// Marks this extension as managed outside the [`Registry`].
    ///
    /// [`Registry`]: super::Registry
    #[must_use]
    pub fn externally_managed(mut self) -> Self {
        self.externally_managed = true;
        self
    }

    /// Sets the [`LoadStrategy`] of this extension.
    #[must_use]
    pub fn with_load_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.load_strategy = strategy;
        self
    }

    /// Returns the `provider:name` of this extension.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.provider, self.name)
    }

    /// Returns the unique `provider:name:version` of this extension.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.provider, self.name, self.version)
    }

    /// Indicates whether the given override `reference` designates this
    /// extension.
    #[must_use]
    pub fn is_referenced_by(&self, reference: &str) -> bool {
        reference == self.name
            || reference == self.qualified_name()
            || reference == self.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_versions() {
        assert_eq!("1.2.3".parse(), Ok(Version::new(1, 2, 3)));
        assert_eq!("2".parse(), Ok(Version::new(2, 0, 0)));
        assert_eq!("1.4-SNAPSHOT".parse(), Ok(Version::new(1, 4, 0)));
        assert!("1.x".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn version_compatibility() {
        let point = Version::new(1, 2, 0);

        assert!(Version::new(1, 0, 0).is_compatible_with(&point));
        assert!(Version::new(1, 2, 9).is_compatible_with(&point));
        assert!(!Version::new(1, 3, 0).is_compatible_with(&point));
        assert!(!Version::new(2, 0, 0).is_compatible_with(&point));
    }

    #[test]
    fn references() {
        let d = ExtensionDescriptor::new("acme", "rest-steps", &STEP_CONTRIBUTOR)
            .with_version(Version::new(2, 1, 0));

        assert_eq!(d.id(), "acme:rest-steps:2.1.0");
        assert!(d.is_referenced_by("rest-steps"));
        assert!(d.is_referenced_by("acme:rest-steps"));
        assert!(d.is_referenced_by("acme:rest-steps:2.1.0"));
        assert!(!d.is_referenced_by("other:rest-steps"));
    }
}
