// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! State available to hooks and steps of a single test case.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use derive_more::{Debug, Display, Error};

use crate::{config::Configuration, parser::StepArgument};

use super::{FromValue, Value};

/// Fixture store shared by the hooks and steps of one test case.
///
/// A fresh [`StepContext`] is created for every test case, so nothing leaks
/// between cases.
#[derive(Debug)]
pub struct StepContext {
    test_case: String,
    configuration: Configuration,
    #[debug("{} fixture(s)", fixtures.len())]
    fixtures: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl StepContext {
    /// Creates an empty [`StepContext`] for the given test case.
    #[must_use]
    pub fn new(
        test_case: impl Into<String>,
        configuration: Configuration,
    ) -> Self {
        Self {
            test_case: test_case.into(),
            configuration,
            fixtures: HashMap::new(),
        }
    }

    /// Returns the id of the running test case.
    #[must_use]
    pub fn test_case(&self) -> &str {
        &self.test_case
    }

    /// Returns the run [`Configuration`].
    #[must_use]
    pub const fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Stores a fixture, returning the previous one of the same type.
    pub fn insert<T: Any + Send>(&mut self, fixture: T) -> Option<T> {
        self.fixtures
            .insert(TypeId::of::<T>(), Box::new(fixture))
            .and_then(|old| old.downcast().ok().map(|b| *b))
    }

    /// Returns the fixture of type `T`, if any.
    #[must_use]
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.fixtures.get(&TypeId::of::<T>())?.downcast_ref()
    }

    /// Returns the fixture of type `T` mutably, if any.
    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.fixtures.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    /// Returns the fixture of type `T`, creating it with `init` if absent.
    pub fn get_or_insert_with<T: Any + Send>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> &mut T {
        let fixture = self
            .fixtures
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(init()));
        // Instead of `.unwrap()` to avoid documenting `# Panics`.
        fixture
            .downcast_mut()
            .unwrap_or_else(|| unreachable!("keyed by `TypeId`"))
    }

    /// Removes and returns the fixture of type `T`.
    pub fn remove<T: Any + Send>(&mut self) -> Option<T> {
        self.fixtures
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast().ok().map(|b| *b))
    }
}

/// Error of accessing an [`Arguments`] value.
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
pub enum ArgumentError {
    /// No argument has the requested name.
    #[display("No `{_0}` argument")]
    Missing(#[error(not(source))] String),

    /// The argument is of another kind.
    #[display("Argument `{name}` is not a {expected}")]
    Mismatch {
        /// Argument name.
        #[error(not(source))]
        name: String,

        /// Expected kind.
        #[error(not(source))]
        expected: &'static str,
    },
}

/// Coerced arguments of a matched step.
#[derive(Clone, Debug, Default)]
pub struct Arguments {
    values: Vec<(String, Value)>,
    data: Option<StepArgument>,
}

impl Arguments {
    /// Creates [`Arguments`] out of named `values` and the step `data`.
    #[must_use]
    pub fn new(
        values: Vec<(String, Value)>,
        data: Option<StepArgument>,
    ) -> Self {
        Self { values, data }
    }

    /// Returns the number of placeholder values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Indicates whether there are no placeholder values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the first value with the given `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns the value at the given position.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index).map(|(_, v)| v)
    }

    /// Returns the value with the given `name`, converted into `T`.
    ///
    /// # Errors
    ///
    /// If there is no such value, or it is of another kind.
    pub fn value<T: FromValue>(&self, name: &str) -> Result<T, ArgumentError> {
        let value = self
            .get(name)
            .ok_or_else(|| ArgumentError::Missing(name.to_owned()))?;
        T::from_value(value).ok_or_else(|| ArgumentError::Mismatch {
            name: name.to_owned(),
            expected: T::EXPECTED,
        })
    }

    /// Returns the doc string or data table attached to the step.
    #[must_use]
    pub const fn data(&self) -> Option<&StepArgument> {
        self.data.as_ref()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}
