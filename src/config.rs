// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Immutable key/value [`Configuration`] consumed by every component.
//!
//! Values are stored as plain strings and converted on access, so the same
//! [`Configuration`] can be fed from CLI options, property files or
//! [configuration contributors][1] without any schema upfront.
//!
//! [1]: crate::extension::ConfigContributor

use std::{
    collections::BTreeMap, fmt, str::FromStr, sync::Arc, time::Duration,
};

use derive_more::{Display, Error};

/// Well-known configuration keys.
pub mod keys {
    /// Default language of documents not declaring one.
    pub const LANGUAGE: &str = "language";

    /// Regular expression extracting an identifier out of a tag.
    pub const ID_TAG_PATTERN: &str = "idTagPattern";

    /// Tag expression filtering the test cases of a plan.
    pub const TAG_FILTER: &str = "tagFilter";

    /// Whether a run stops scheduling test cases after the first failure.
    pub const FAIL_FAST: &str = "execution.failFast";

    /// Tag marking definition (business) scenarios.
    pub const DEFINITION_TAG: &str = "redefinition.definitionTag";

    /// Tag marking implementation (technical) scenarios.
    pub const IMPLEMENTATION_TAG: &str = "redefinition.implementationTag";

    /// Which side of a redefinition pair receives the other's steps.
    pub const REDEFINITION_DIRECTION: &str = "redefinition.direction";

    /// Node property mapping definition steps to implementation steps.
    pub const STEP_MAP: &str = "redefinition.stepMap";

    /// Every well-known key.
    pub const ALL: &[&str] = &[
        LANGUAGE,
        ID_TAG_PATTERN,
        TAG_FILTER,
        FAIL_FAST,
        DEFINITION_TAG,
        IMPLEMENTATION_TAG,
        REDEFINITION_DIRECTION,
        STEP_MAP,
    ];
}

/// [`Configuration`] error.
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
pub enum Error {
    /// A value cannot be converted into the requested type.
    #[display("Invalid value `{value}` for configuration key `{key}`: {reason}")]
    InvalidValue {
        /// Key of the offending value.
        #[error(not(source))]
        key: String,

        /// Raw value.
        value: String,

        /// Conversion failure description.
        reason: String,
    },

    /// A property line is not of the `key=value` form.
    #[display("Invalid property `{_0}`, expected `key=value`")]
    InvalidProperty(#[error(not(source))] String),
}

/// Immutable key/value lookup with typed accessors.
///
/// Cloning is cheap: values are shared behind an [`Arc`].
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Configuration {
    values: Arc<BTreeMap<String, String>>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl Configuration {
    /// Creates an empty [`Configuration`].
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Starts building a new [`Configuration`].
    #[must_use]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Creates a [`Configuration`] out of the given `pairs`.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .fold(Self::builder(), |b, (k, v)| b.set(k, v))
            .build()
    }

    /// Reads environment variables starting with `{prefix}_`.
    ///
    /// `PREFIX_EXECUTION_FAILFAST` becomes `execution.failFast`: segments are
    /// joined with dots, and the spelling of a matching [well-known key][1]
    /// is preferred over the lowercased name.
    ///
    /// [1]: keys::ALL
    #[must_use]
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Same as [`Configuration::from_env()`], but over arbitrary `vars`.
    #[must_use]
    pub fn from_vars<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{}_", prefix.to_ascii_uppercase());
        vars.into_iter()
            .filter_map(|(name, value)| {
                let rest = name.strip_prefix(&prefix)?;
                let key = rest.to_ascii_lowercase().replace('_', ".");
                let key = keys::ALL
                    .iter()
                    .find(|k| k.eq_ignore_ascii_case(&key))
                    .map_or(key, |k| (*k).to_owned());
                Some((key, value))
            })
            .fold(Self::builder(), |b, (k, v)| b.set(k, v))
            .build()
    }

    /// Parses `key=value` lines, ignoring blank lines and `#` comments.
    ///
    /// # Errors
    ///
    /// If a non-comment line has no `=` separator.
    pub fn from_properties(text: &str) -> Result<Self, Error> {
        let mut builder = Self::builder();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = parse_property(line)?;
            builder = builder.set(key, value);
        }
        Ok(builder.build())
    }

    /// Returns the raw value of the given `key`, if any.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Indicates whether a value is present for the given `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the value of the given `key` converted into `T`.
    ///
    /// # Errors
    ///
    /// If the value is present but cannot be parsed as `T`.
    pub fn get<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get_raw(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| Error::InvalidValue {
                    key: key.to_owned(),
                    value: raw.to_owned(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Same as [`Configuration::get()`], falling back to `default` when the
    /// value is absent.
    ///
    /// # Errors
    ///
    /// If the value is present but cannot be parsed as `T`.
    pub fn get_or<T>(&self, key: &str, default: T) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Returns the value of the given `key` as a human-readable
    /// [`Duration`] (like `1m 30s`).
    ///
    /// # Errors
    ///
    /// If the value is present but is not a valid duration.
    pub fn get_duration(&self, key: &str) -> Result<Option<Duration>, Error> {
        self.get::<humantime::Duration>(key).map(|d| d.map(Into::into))
    }

    /// Returns the comma-separated value of the given `key` as a list,
    /// empty if absent.
    #[must_use]
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get_raw(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns all the values of this [`Configuration`].
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Iterates over the keys of this [`Configuration`] in lexicographic
    /// order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.keys().map(String::as_str)
    }

    /// Indicates whether this [`Configuration`] has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the sub-[`Configuration`] of keys under `prefix.`, with the
    /// prefix stripped.
    #[must_use]
    pub fn inner(&self, prefix: &str) -> Self {
        let prefix = format!("{prefix}.");
        Self::from_pairs(self.values.iter().filter_map(|(k, v)| {
            k.strip_prefix(&prefix).map(|k| (k.to_owned(), v.clone()))
        }))
    }

    /// Merges `other` on top of this [`Configuration`]: values of `other`
    /// win on conflicting keys.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        let mut values = (*self.values).clone();
        values.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { values: Arc::new(values) }
    }
}

/// Parses a single `key=value` property.
///
/// # Errors
///
/// If there is no `=` separator or the key is empty.
pub fn parse_property(raw: &str) -> Result<(String, String), Error> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| Error::InvalidProperty(raw.to_owned()))
}

/// Builder of a [`Configuration`].
#[derive(Clone, Debug, Default)]
pub struct Builder {
    values: BTreeMap<String, String>,
}

impl Builder {
    /// Sets the `value` of the given `key`, replacing any previous one.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.values.insert(key.into(), value.into());
        self
    }

    /// Sets the `value` of the given `key` only if it is [`Some`].
    #[must_use]
    pub fn set_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(key, v.to_string()),
            None => self,
        }
    }

    /// Finishes building the [`Configuration`].
    #[must_use]
    pub fn build(self) -> Configuration {
        Configuration { values: Arc::new(self.values) }
    }
}
