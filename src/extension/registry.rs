// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! [`Registry`] arbitrating the discovered extensions.

use std::{any::Any, collections::HashMap};

use itertools::Itertools as _;
use parking_lot::RwLock;

use super::{
    Error, ExtensionDescriptor, ExtensionPoint, Instance, LoadStrategy, Loader,
    Registration,
};

/// Registry of extensions discovered by any number of [`Loader`]s.
///
/// For every [`ExtensionPoint`] it resolves the active extensions: those
/// compatible with the point's contract version and not superseded by
/// another one, ordered ascending by priority.
///
/// Registration and resolution may happen concurrently from several threads.
#[derive(Debug, Default)]
pub struct Registry {
    /// All the accepted [`Registration`]s, in discovery order.
    registrations: RwLock<Vec<Registration>>,

    /// [`LoadStrategy::Singleton`] instances, by extension id.
    singletons: RwLock<HashMap<String, Instance>>,
}

impl Registry {
    /// Creates an empty [`Registry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [`Registry`] fed by the given `loaders`.
    #[must_use]
    pub fn with_loaders<'a, I>(loaders: I) -> Self
    where
        I: IntoIterator<Item = &'a dyn Loader>,
    {
        let registry = Self::new();
        for loader in loaders {
            let _ = registry.register(loader);
        }
        registry
    }

    /// Ingests every [`Registration`] discovered by the given `loader`,
    /// returning how many were accepted.
    ///
    /// Registrations with an already known id are ignored.
    pub fn register(&self, loader: &dyn Loader) -> usize {
        let discovered = loader.load();
        tracing::debug!(
            loader = loader.name(),
            count = discovered.len(),
            "discovered extensions",
        );
        discovered
            .into_iter()
            .filter(|r| self.register_one(r.clone()))
            .count()
    }

    /// Ingests a single [`Registration`], returning `false` if an extension
    /// with the same id was already registered.
    pub fn register_one(&self, registration: Registration) -> bool {
        let mut registrations = self.registrations.write();
        let id = registration.descriptor.id();
        if registrations.iter().any(|r| r.descriptor.id() == id) {
            tracing::trace!(%id, "extension already registered, ignoring");
            return false;
        }
        tracing::trace!(%id, point = %registration.descriptor.extension_point, "registered extension");
        registrations.push(registration);
        true
    }

    /// Returns the descriptors of the active extensions of the given
    /// `point`, ascending by priority (then by provider and name).
    ///
    /// # Errors
    ///
    /// If overrides among the candidates form a cycle.
    pub fn descriptors(
        &self,
        point: &ExtensionPoint,
    ) -> Result<Vec<ExtensionDescriptor>, Error> {
        Ok(self.active(point)?.into_iter().map(|r| r.descriptor).collect())
    }

    /// Returns instances of the active extensions of the given `point`,
    /// ascending by priority. No candidates resolve to an empty list.
    ///
    /// # Errors
    ///
    /// If overrides among the candidates form a cycle.
    pub fn resolve(&self, point: &ExtensionPoint) -> Result<Vec<Instance>, Error> {
        Ok(self.active(point)?.iter().map(|r| self.provide(r)).collect())
    }

    /// Same as [`Registry::resolve()`], downcasting every instance to `T`.
    ///
    /// # Errors
    ///
    /// If overrides form a cycle, or an extension is not of type `T`.
    pub fn resolve_as<T: Any + Clone>(
        &self,
        point: &ExtensionPoint,
    ) -> Result<Vec<T>, Error> {
        self.active(point)?
            .iter()
            .map(|r| {
                self.provide(r).get::<T>().ok_or_else(|| Error::UnexpectedType {
                    id: r.descriptor.id(),
                    expected: std::any::type_name::<T>(),
                })
            })
            .collect()
    }

    /// Returns an instance of the highest-priority active extension of the
    /// given `point`, cached or fresh according to its [`LoadStrategy`].
    ///
    /// # Errors
    ///
    /// If overrides among the candidates form a cycle.
    pub fn instance(
        &self,
        point: &ExtensionPoint,
    ) -> Result<Option<Instance>, Error> {
        Ok(self.active(point)?.last().map(|r| self.provide(r)))
    }

    /// Provides an [`Instance`] of the given [`Registration`].
    fn provide(&self, registration: &Registration) -> Instance {
        let descriptor = &registration.descriptor;
        if descriptor.externally_managed {
            return registration.instantiate();
        }
        match descriptor.load_strategy {
            LoadStrategy::Fresh => registration.instantiate(),
            LoadStrategy::Singleton => {
                let id = descriptor.id();
                if let Some(cached) = self.singletons.read().get(&id) {
                    return cached.clone();
                }
                self.singletons
                    .write()
                    .entry(id)
                    .or_insert_with(|| registration.instantiate())
                    .clone()
            }
        }
    }

    /// Computes the active [`Registration`]s of the given `point`.
    fn active(&self, point: &ExtensionPoint) -> Result<Vec<Registration>, Error> {
        let candidates = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.descriptor.extension_point == point.name())
            .filter(|r| {
                let d = &r.descriptor;
                let compatible =
                    d.extension_point_version.is_compatible_with(&point.version());
                if !compatible {
                    tracing::warn!(
                        id = %d.id(),
                        required = %d.extension_point_version,
                        provided = %point.version(),
                        "extension is not compatible with extension point, ignoring",
                    );
                }
                compatible
            })
            .cloned()
            .collect::<Vec<_>>();

        let suppressed = suppressed(point, &candidates)?;

        Ok(candidates
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !suppressed[*i])
            .map(|(_, r)| r)
            .sorted_by(|a, b| {
                let (a, b) = (&a.descriptor, &b.descriptor);
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| a.provider.cmp(&b.provider))
                    .then_with(|| a.name.cmp(&b.name))
            })
            .collect())
    }
}

/// Marks the `candidates` superseded by another candidate.
///
/// Suppression is transitive: if `A` overrides `B` and `B` overrides `C`,
/// both `B` and `C` are suppressed, even though `B` is itself suppressed.
///
/// # Errors
///
/// If overrides form a cycle.
fn suppressed(
    point: &ExtensionPoint,
    candidates: &[Registration],
) -> Result<Vec<bool>, Error> {
    let edges = candidates
        .iter()
        .map(|r| {
            r.descriptor
                .overrides
                .as_deref()
                .map(|reference| {
                    candidates
                        .iter()
                        .enumerate()
                        .filter(|(_, other)| {
                            other.descriptor.id() != r.descriptor.id()
                                && other.descriptor.is_referenced_by(reference)
                        })
                        .map(|(j, _)| j)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        })
        .collect::<Vec<_>>();

    if let Some(cycle) = find_cycle(&edges) {
        return Err(Error::OverrideCycle {
            point: point.name().to_owned(),
            chain: cycle
                .into_iter()
                .map(|i| candidates[i].descriptor.id())
                .collect(),
        });
    }

    let mut suppressed = vec![false; candidates.len()];
    for (i, targets) in edges.iter().enumerate() {
        for &j in targets {
            tracing::info!(
                winner = %candidates[i].descriptor.id(),
                overridden = %candidates[j].descriptor.id(),
                "extension overrides another extension",
            );
            suppressed[j] = true;
        }
    }
    Ok(suppressed)
}

/// Finds a cycle in the given adjacency lists, returning its nodes with the
/// first one repeated at the end.
fn find_cycle(edges: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, Eq, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::InProgress;
        path.push(node);
        for &next in &edges[node] {
            match marks[next] {
                Mark::InProgress => {
                    let start = path.iter().position(|&n| n == next)?;
                    let mut cycle = path[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(next, edges, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }
        let _ = path.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; edges.len()];
    (0..edges.len()).find_map(|node| {
        (marks[node] == Mark::Unvisited)
            .then(|| visit(node, edges, &mut marks, &mut Vec::new()))
            .flatten()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::extension::{StaticLoader, Version, REPORTER, STEP_CONTRIBUTOR};

    fn reg(descriptor: ExtensionDescriptor) -> Registration {
        let name = descriptor.name.clone();
        Registration::new(descriptor, move || Instance::new(name.clone()))
    }

    fn names(registry: &Registry, point: &ExtensionPoint) -> Vec<String> {
        registry.resolve_as::<String>(point).unwrap()
    }

    #[test]
    fn unknown_point_resolves_empty() {
        let registry = Registry::new();

        assert!(registry.resolve(&REPORTER).unwrap().is_empty());
        assert!(registry.instance(&REPORTER).unwrap().is_none());
    }

    #[test]
    fn orders_by_priority_then_identity() {
        let loader = StaticLoader::new("test")
            .with(reg(
                ExtensionDescriptor::new("acme", "last", &REPORTER)
                    .with_priority(ExtensionDescriptor::MAX_PRIORITY),
            ))
            .with(reg(
                ExtensionDescriptor::new("acme", "first", &REPORTER).with_priority(1),
            ))
            .with(reg(
                ExtensionDescriptor::new("zeta", "tie", &REPORTER).with_priority(5),
            ))
            .with(reg(
                ExtensionDescriptor::new("alpha", "tie", &REPORTER).with_priority(5),
            ));
        let registry = Registry::with_loaders([&loader as &dyn Loader]);

        assert_eq!(names(&registry, &REPORTER), ["first", "tie", "tie", "last"]);
        assert_eq!(
            registry
                .descriptors(&REPORTER)
                .unwrap()
                .iter()
                .map(|d| d.provider.as_str())
                .collect::<Vec<_>>(),
            ["acme", "alpha", "zeta", "acme"],
        );
        assert_eq!(
            registry.instance(&REPORTER).unwrap().and_then(|i| i.get::<String>()),
            Some("last".into()),
        );
    }

    #[test]
    fn override_suppresses_target() {
        let loader = StaticLoader::new("test")
            .with(reg(ExtensionDescriptor::new("acme", "base", &REPORTER)))
            .with(reg(
                ExtensionDescriptor::new("acme", "custom", &REPORTER).overriding("base"),
            ))
            .with(reg(ExtensionDescriptor::new("acme", "other", &STEP_CONTRIBUTOR)));
        let registry = Registry::with_loaders([&loader as &dyn Loader]);

        assert_eq!(names(&registry, &REPORTER), ["custom"]);
        assert_eq!(names(&registry, &STEP_CONTRIBUTOR), ["other"]);
    }

    #[test]
    fn override_of_absent_extension_is_noop() {
        let registry = Registry::new();
        let _ = registry.register_one(reg(
            ExtensionDescriptor::new("acme", "custom", &REPORTER).overriding("ghost"),
        ));

        assert_eq!(names(&registry, &REPORTER), ["custom"]);
    }

    #[test]
    fn override_chain_is_transitive() {
        let registry = Registry::new();
        let _ = registry.register_one(reg(
            ExtensionDescriptor::new("acme", "a", &REPORTER).overriding("b"),
        ));
        let _ = registry.register_one(reg(
            ExtensionDescriptor::new("acme", "b", &REPORTER).overriding("acme:c"),
        ));
        let _ = registry.register_one(reg(ExtensionDescriptor::new("acme", "c", &REPORTER)));

        assert_eq!(names(&registry, &REPORTER), ["a"]);
    }

    #[test]
    fn override_cycle_is_an_error() {
        let registry = Registry::new();
        let _ = registry.register_one(reg(
            ExtensionDescriptor::new("acme", "a", &REPORTER).overriding("b"),
        ));
        let _ = registry.register_one(reg(
            ExtensionDescriptor::new("acme", "b", &REPORTER).overriding("a"),
        ));

        let err = registry.resolve(&REPORTER).unwrap_err();

        assert_eq!(
            err,
            Error::OverrideCycle {
                point: "reporter".into(),
                chain: vec![
                    "acme:a:1.0.0".into(),
                    "acme:b:1.0.0".into(),
                    "acme:a:1.0.0".into(),
                ],
            },
        );
    }

    #[test]
    fn incompatible_extensions_are_ignored() {
        let registry = Registry::new();
        let _ = registry.register_one(reg(
            ExtensionDescriptor::new("acme", "future", &REPORTER)
                .requiring(Version::new(1, 5, 0)),
        ));
        let _ = registry.register_one(reg(
            ExtensionDescriptor::new("acme", "legacy", &REPORTER)
                .requiring(Version::new(0, 9, 0)),
        ));
        let _ = registry.register_one(reg(ExtensionDescriptor::new("acme", "ok", &REPORTER)));

        assert_eq!(names(&registry, &REPORTER), ["ok"]);
    }

    #[test]
    fn duplicates_are_ignored() {
        let loader = StaticLoader::new("test")
            .with(reg(ExtensionDescriptor::new("acme", "a", &REPORTER)));
        let registry = Registry::new();

        assert_eq!(registry.register(&loader), 1);
        assert_eq!(registry.register(&loader), 0);
        assert_eq!(names(&registry, &REPORTER), ["a"]);
    }

    #[test]
    fn load_strategies() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        for (name, strategy) in
            [("single", LoadStrategy::Singleton), ("fresh", LoadStrategy::Fresh)]
        {
            let built = Arc::clone(&built);
            let _ = registry.register_one(Registration::new(
                ExtensionDescriptor::new("acme", name, &REPORTER)
                    .with_load_strategy(strategy)
                    .with_priority(i32::from(strategy == LoadStrategy::Fresh)),
                move || Instance::new(built.fetch_add(1, Ordering::SeqCst)),
            ));
        }

        let first = registry.resolve(&REPORTER).unwrap();
        let second = registry.resolve(&REPORTER).unwrap();

        assert!(first[0].ptr_eq(&second[0]), "singleton must be cached");
        assert!(!first[1].ptr_eq(&second[1]), "fresh must be rebuilt");
        assert_eq!(built.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn externally_managed_instances_are_delegated() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        let counter = Arc::clone(&built);
        let _ = registry.register_one(Registration::new(
            ExtensionDescriptor::new("container", "bean", &REPORTER).externally_managed(),
            move || Instance::new(counter.fetch_add(1, Ordering::SeqCst)),
        ));

        let _ = registry.resolve(&REPORTER).unwrap();
        let _ = registry.resolve(&REPORTER).unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unexpected_type_is_reported() {
        let registry = Registry::new();
        let _ = registry.register_one(reg(ExtensionDescriptor::new("acme", "a", &REPORTER)));

        assert!(matches!(
            registry.resolve_as::<u8>(&REPORTER),
            Err(Error::UnexpectedType { .. }),
        ));
    }
}
