// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Assertion predicates parsed out of step text, like `is greater than 5`.

use std::{cmp::Ordering, fmt, sync::Arc};

use derive_more::{Debug, Display, Error};
use itertools::Itertools as _;

use super::Value;

/// Failed [`Assertion`] or explicit step assertion.
///
/// A step returning this error is reported as [`Outcome::Failed`] rather
/// than [`Outcome::Error`].
///
/// [`Outcome::Error`]: crate::plan::Outcome::Error
/// [`Outcome::Failed`]: crate::plan::Outcome::Failed
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
#[display("{message}")]
pub struct AssertionFailure {
    /// Human-readable description of the failure.
    #[error(not(source))]
    pub message: String,
}

impl AssertionFailure {
    /// Creates a new [`AssertionFailure`].
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Fails with an [`AssertionFailure`] unless `condition` holds.
///
/// # Errors
///
/// If `condition` is `false`.
pub fn ensure(
    condition: bool,
    message: impl FnOnce() -> String,
) -> Result<(), AssertionFailure> {
    if condition {
        Ok(())
    } else {
        Err(AssertionFailure::new(message()))
    }
}

/// Predicate over a [`Value`] plus its human-readable description.
#[derive(Clone, Debug)]
pub struct Assertion {
    description: String,
    #[debug(skip)]
    predicate: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl Assertion {
    /// Creates a new [`Assertion`].
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self { description: description.into(), predicate: Arc::new(predicate) }
    }

    /// Returns the description, like `is greater than 5`.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Indicates whether the `actual` value satisfies this [`Assertion`].
    #[must_use]
    pub fn test(&self, actual: &Value) -> bool {
        (self.predicate)(actual)
    }

    /// Checks the `actual` value.
    ///
    /// # Errors
    ///
    /// If the `actual` value does not satisfy this [`Assertion`].
    pub fn check(&self, actual: impl Into<Value>) -> Result<(), AssertionFailure> {
        let actual = actual.into();
        ensure(self.test(&actual), || {
            format!("expected a value that {self}, but it was {actual}")
        })
    }
}

/// Comparison of an assertion phrase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Comparison {
    /// Equal to the expected value.
    Equal,

    /// Different from the expected value.
    NotEqual,

    /// Greater than the expected value.
    Greater,

    /// Less than the expected value.
    Less,

    /// Greater than or equal to the expected value.
    GreaterOrEqual,

    /// Less than or equal to the expected value.
    LessOrEqual,

    /// Text containing the expected value.
    Contains,

    /// Text not containing the expected value.
    NotContains,

    /// Text starting with the expected value.
    StartsWith,

    /// Text ending with the expected value.
    EndsWith,

    /// Empty text, without expected value.
    Empty,

    /// Non-empty text, without expected value.
    NotEmpty,
}

impl Comparison {
    /// Comparisons applicable to numbers.
    pub const NUMERIC: &'static [Self] = &[
        Self::Equal,
        Self::NotEqual,
        Self::GreaterOrEqual,
        Self::LessOrEqual,
        Self::Greater,
        Self::Less,
    ];

    /// Comparisons applicable to texts.
    pub const TEXTUAL: &'static [Self] = &[
        Self::Equal,
        Self::NotEqual,
        Self::Contains,
        Self::NotContains,
        Self::StartsWith,
        Self::EndsWith,
        Self::NotEmpty,
        Self::Empty,
    ];

    /// Indicates whether this [`Comparison`] takes no expected value.
    #[must_use]
    pub const fn is_unary(self) -> bool {
        matches!(self, Self::Empty | Self::NotEmpty)
    }

    /// Returns the phrase of this [`Comparison`] in the given `language`,
    /// English being the fallback.
    #[must_use]
    pub fn phrase(self, language: &str) -> &'static str {
        let es = language.split(['-', '_']).next() == Some("es");
        match (self, es) {
            (Self::Equal, false) => "is equal to",
            (Self::Equal, true) => "es igual a",
            (Self::NotEqual, false) => "is not equal to",
            (Self::NotEqual, true) => "no es igual a",
            (Self::Greater, false) => "is greater than",
            (Self::Greater, true) => "es mayor que",
            (Self::Less, false) => "is less than",
            (Self::Less, true) => "es menor que",
            (Self::GreaterOrEqual, false) => "is greater than or equal to",
            (Self::GreaterOrEqual, true) => "es mayor o igual que",
            (Self::LessOrEqual, false) => "is less than or equal to",
            (Self::LessOrEqual, true) => "es menor o igual que",
            (Self::Contains, false) => "contains",
            (Self::Contains, true) => "contiene",
            (Self::NotContains, false) => "does not contain",
            (Self::NotContains, true) => "no contiene",
            (Self::StartsWith, false) => "starts with",
            (Self::StartsWith, true) => "empieza por",
            (Self::EndsWith, false) => "ends with",
            (Self::EndsWith, true) => "termina en",
            (Self::Empty, false) => "is empty",
            (Self::Empty, true) => "está vacío",
            (Self::NotEmpty, false) => "is not empty",
            (Self::NotEmpty, true) => "no está vacío",
        }
    }

    /// Builds a regex alternation matching `{phrase} {value}` for every
    /// comparison in `all`, unary ones matching the bare phrase.
    #[must_use]
    pub fn pattern(all: &[Self], language: &str, value: &str) -> String {
        all.iter()
            .map(|c| {
                let phrase = regex::escape(c.phrase(language));
                if c.is_unary() {
                    phrase
                } else {
                    format!("{phrase}\\s+(?:{value})")
                }
            })
            .join("|")
    }

    /// Splits `raw` text into the [`Comparison`] it starts with and the
    /// remaining expected value.
    #[must_use]
    pub fn split<'r>(
        all: &[Self],
        language: &str,
        raw: &'r str,
    ) -> Option<(Self, &'r str)> {
        all.iter().find_map(|&c| {
            let rest = raw.strip_prefix(c.phrase(language))?;
            if c.is_unary() {
                rest.trim().is_empty().then_some((c, ""))
            } else {
                rest.starts_with(char::is_whitespace)
                    .then(|| (c, rest.trim()))
            }
        })
    }

    /// Checks the given [`Ordering`] of an actual value against an expected
    /// one.
    #[must_use]
    pub fn holds_for(self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => ordering.is_eq(),
            Self::NotEqual => ordering.is_ne(),
            Self::Greater => ordering.is_gt(),
            Self::Less => ordering.is_lt(),
            Self::GreaterOrEqual => ordering.is_ge(),
            Self::LessOrEqual => ordering.is_le(),
            Self::Contains
            | Self::NotContains
            | Self::StartsWith
            | Self::EndsWith
            | Self::Empty
            | Self::NotEmpty => false,
        }
    }

    /// Checks an `actual` text against an `expected` one.
    #[must_use]
    pub fn holds_for_text(self, actual: &str, expected: &str) -> bool {
        match self {
            Self::Contains => actual.contains(expected),
            Self::NotContains => !actual.contains(expected),
            Self::StartsWith => actual.starts_with(expected),
            Self::EndsWith => actual.ends_with(expected),
            Self::Empty => actual.is_empty(),
            Self::NotEmpty => !actual.is_empty(),
            Self::Equal
            | Self::NotEqual
            | Self::Greater
            | Self::Less
            | Self::GreaterOrEqual
            | Self::LessOrEqual => self.holds_for(actual.cmp(expected)),
        }
    }
}
