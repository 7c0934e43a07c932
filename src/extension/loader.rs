// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Discovery strategies feeding a [`Registry`].
//!
//! [`Registry`]: super::Registry

use std::{any::Any, fmt, sync::Arc};

use derive_more::with_trait::Debug;

use super::ExtensionDescriptor;

/// Type-erased instance of an extension.
///
/// Trait objects are stored wrapped into an [`Arc`], so a step contributor
/// is registered as `Instance::new(Arc::new(steps) as Arc<dyn
/// StepContributor>)` and retrieved as `Arc<dyn StepContributor>`.
#[derive(Clone)]
pub struct Instance(Arc<dyn Any + Send + Sync>);

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({:p})", Arc::as_ptr(&self.0))
    }
}

impl Instance {
    /// Wraps the given `value` into an [`Instance`].
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Returns a reference to the wrapped value, if it is of type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Returns a clone of the wrapped value, if it is of type `T`.
    #[must_use]
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    /// Indicates whether both [`Instance`]s are the very same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Constructor of [`Instance`]s.
pub type Factory = Arc<dyn Fn() -> Instance + Send + Sync>;

/// [`ExtensionDescriptor`] paired with the way to obtain its instances.
///
/// For [externally managed][1] extensions the factory is a lazy accessor
/// delegating to the owning collaborator.
///
/// [1]: ExtensionDescriptor::externally_managed
#[derive(Clone, Debug)]
pub struct Registration {
    /// Metadata of the extension.
    pub descriptor: ExtensionDescriptor,

    /// Constructor of the extension.
    #[debug(skip)]
    factory: Factory,
}

impl Registration {
    /// Creates a new [`Registration`].
    #[must_use]
    pub fn new<F>(descriptor: ExtensionDescriptor, factory: F) -> Self
    where
        F: Fn() -> Instance + Send + Sync + 'static,
    {
        Self { descriptor, factory: Arc::new(factory) }
    }

    /// Constructs a new [`Instance`] of the extension.
    #[must_use]
    pub fn instantiate(&self) -> Instance {
        (self.factory)()
    }
}

/// Discovery mechanism of [`Registration`]s.
///
/// Several [`Loader`]s may feed the same [`Registry`]: a static list, link
/// time registration, a bridge to a dependency injection container...
///
/// [`Registry`]: super::Registry
pub trait Loader: Send + Sync {
    /// Human-readable name of this [`Loader`], used in diagnostics.
    fn name(&self) -> &str;

    /// Discovers the [`Registration`]s this [`Loader`] knows about.
    fn load(&self) -> Vec<Registration>;
}

/// [`Loader`] over an explicit list of [`Registration`]s.
#[derive(Clone, Debug)]
pub struct StaticLoader {
    name: String,
    registrations: Vec<Registration>,
}

impl StaticLoader {
    /// Creates an empty [`StaticLoader`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), registrations: Vec::new() }
    }

    /// Adds the given [`Registration`] to this [`StaticLoader`].
    #[must_use]
    pub fn with(mut self, registration: Registration) -> Self {
        self.registrations.push(registration);
        self
    }
}

impl Loader for StaticLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Vec<Registration> {
        self.registrations.clone()
    }
}

/// Extension registered at link time via [`inventory::submit!`].
///
/// ```rust
/// # use std::sync::Arc;
/// # use pepino::extension::{
/// #     self, ExtensionDescriptor, Instance, Registration, StaticExtension,
/// # };
/// fn defaults() -> Registration {
///     Registration::new(
///         ExtensionDescriptor::new(
///             "acme",
///             "defaults",
///             &extension::CONFIG_CONTRIBUTOR,
///         ),
///         || Instance::new(42_u8),
///     )
/// }
///
/// inventory::submit! { StaticExtension::new(defaults) }
/// # fn main() {}
/// ```
#[derive(Clone, Copy, Debug)]
pub struct StaticExtension {
    register: fn() -> Registration,
}

impl StaticExtension {
    /// Creates a new [`StaticExtension`] out of its registration function.
    #[must_use]
    pub const fn new(register: fn() -> Registration) -> Self {
        Self { register }
    }
}

inventory::collect!(StaticExtension);

/// [`Loader`] of every [`StaticExtension`] linked into the binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct InventoryLoader;

impl Loader for InventoryLoader {
    fn name(&self) -> &str {
        "inventory"
    }

    fn load(&self) -> Vec<Registration> {
        inventory::iter::<StaticExtension>
            .into_iter()
            .map(|ext| (ext.register)())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::REPORTER;

    #[test]
    fn instance_downcasts() {
        let instance = Instance::new(Arc::new(7_u32));

        assert_eq!(instance.get::<Arc<u32>>().as_deref(), Some(&7));
        assert!(instance.get::<Arc<u64>>().is_none());
        assert!(instance.ptr_eq(&instance.clone()));
        assert!(!instance.ptr_eq(&Instance::new(Arc::new(7_u32))));
    }

    #[test]
    fn static_loader_yields_registrations() {
        let loader = StaticLoader::new("test")
            .with(Registration::new(
                ExtensionDescriptor::new("acme", "a", &REPORTER),
                || Instance::new(1_u8),
            ))
            .with(Registration::new(
                ExtensionDescriptor::new("acme", "b", &REPORTER),
                || Instance::new(2_u8),
            ));

        let loaded = loader.load();

        assert_eq!(loader.name(), "test");
        assert_eq!(
            loaded.iter().map(|r| r.descriptor.name.as_str()).collect::<Vec<_>>(),
            ["a", "b"],
        );
        assert_eq!(loaded[1].instantiate().get::<u8>(), Some(2));
    }
}
