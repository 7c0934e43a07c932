// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Typed step arguments and the [`DataType`]s coercing them.

use std::{collections::HashMap, fmt, sync::Arc};

use derive_more::with_trait::{Debug, From};
use itertools::Itertools as _;

use crate::parser::StepArgument;

use super::assertion::{Assertion, Comparison};

/// Coerced step argument.
#[derive(Clone, Debug, From)]
pub enum Value {
    /// Whole number.
    Integer(i64),

    /// Decimal number.
    Decimal(f64),

    /// Text, unquoted.
    Text(String),

    /// Several values.
    List(Vec<Value>),

    /// Predicate to check actual values against.
    Assertion(Assertion),

    /// Doc string or data table attached to the step.
    Data(StepArgument),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(t) => write!(f, "'{t}'"),
            Self::List(l) => write!(f, "[{}]", l.iter().join(", ")),
            Self::Assertion(a) => write!(f, "{a}"),
            Self::Data(StepArgument::DocString { content, .. }) => {
                write!(f, "\"\"\"{content}\"\"\"")
            }
            Self::Data(StepArgument::Table(t)) => {
                write!(f, "<table of {} rows>", t.rows.len())
            }
        }
    }
}

/// Conversion of a [`Value`] into a concrete Rust type.
pub trait FromValue: Sized {
    /// Name of the expected value kind, for diagnostics.
    const EXPECTED: &'static str;

    /// Extracts `Self`, if the [`Value`] is of the right kind.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "decimal";

    #[expect(clippy::cast_precision_loss, reason = "lossy by nature")]
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Decimal(d) => Some(*d),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "text";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(t) => Some(t.clone()),
            _ => None,
        }
    }
}

impl FromValue for Vec<String> {
    const EXPECTED: &'static str = "list";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(l) => l.iter().map(String::from_value).collect(),
            _ => None,
        }
    }
}

impl FromValue for Assertion {
    const EXPECTED: &'static str = "assertion";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Assertion(a) => Some(a.clone()),
            _ => None,
        }
    }
}

impl FromValue for StepArgument {
    const EXPECTED: &'static str = "doc string or data table";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Data(d) => Some(d.clone()),
            _ => None,
        }
    }
}

/// Regex of a [`DataType`] for the given language.
type PatternFn = dyn Fn(&str) -> String + Send + Sync;

/// Coercion of a [`DataType`]: `(language, raw text)` into a [`Value`].
type ParseFn = dyn Fn(&str, &str) -> Result<Value, String> + Send + Sync;

/// Named kind of step placeholder, like `{integer}`.
#[derive(Clone, Debug)]
pub struct DataType {
    name: String,
    #[debug(skip)]
    pattern: Arc<PatternFn>,
    #[debug(skip)]
    parse: Arc<ParseFn>,
}

impl DataType {
    /// Creates a language-independent [`DataType`] matching the `pattern`.
    pub fn new<F>(
        name: impl Into<String>,
        pattern: impl Into<String>,
        parse: F,
    ) -> Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        Self {
            name: name.into(),
            pattern: Arc::new(move |_| pattern.clone()),
            parse: Arc::new(move |_, raw| parse(raw)),
        }
    }

    /// Creates a [`DataType`] whose pattern and coercion depend on the
    /// language.
    pub fn localized<P, F>(
        name: impl Into<String>,
        pattern: P,
        parse: F,
    ) -> Self
    where
        P: Fn(&str) -> String + Send + Sync + 'static,
        F: Fn(&str, &str) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            pattern: Arc::new(pattern),
            parse: Arc::new(parse),
        }
    }

    /// Returns the name used in placeholders.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the regex matching values in the given `language`.
    ///
    /// Must not contain named capture groups.
    #[must_use]
    pub fn pattern(&self, language: &str) -> String {
        (self.pattern)(language)
    }

    /// Coerces the `raw` matched text.
    ///
    /// # Errors
    ///
    /// If the `raw` text is not a valid value of this [`DataType`].
    pub fn parse(&self, language: &str, raw: &str) -> Result<Value, String> {
        (self.parse)(language, raw)
    }
}

/// Set of [`DataType`]s by name.
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<DataType>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut registry = Self { types: HashMap::new() };
        for ty in builtin() {
            registry.add(ty);
        }
        registry
    }
}

impl TypeRegistry {
    /// Creates a [`TypeRegistry`] with the built-in [`DataType`]s.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a [`DataType`], replacing any other with the same name.
    pub fn add(&mut self, ty: DataType) {
        if let Some(old) = self.types.insert(ty.name.clone(), Arc::new(ty)) {
            tracing::debug!(name = %old.name, "data type replaced");
        }
    }

    /// Looks up a [`DataType`] by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<DataType>> {
        self.types.get(name).cloned()
    }
}

const INTEGER: &str = r"[-+]?\d+";
const DECIMAL: &str = r"[-+]?\d+(?:[.,]\d+)?";
const TEXT: &str = r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#;
const WORD: &str = r"[\w-]+";

fn parse_integer(raw: &str) -> Result<i64, String> {
    raw.trim_start_matches('+')
        .parse()
        .map_err(|e| format!("`{raw}` is not an integer: {e}"))
}

fn parse_decimal(raw: &str) -> Result<f64, String> {
    raw.trim_start_matches('+')
        .replace(',', ".")
        .parse()
        .map_err(|e| format!("`{raw}` is not a decimal: {e}"))
}

/// Strips the quotes of a `"text"` or `'text'`, unescaping them inside.
fn parse_text(raw: &str) -> Result<String, String> {
    let quote = raw.chars().next().filter(|c| matches!(c, '"' | '\''));
    let inner = quote
        .and_then(|q| raw.strip_prefix(q)?.strip_suffix(q))
        .ok_or_else(|| format!("`{raw}` is not a quoted text"))?;
    Ok(inner.replace("\\\"", "\"").replace("\\'", "'"))
}

/// Predicate built out of an assertion phrase.
type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Builds an assertion [`DataType`] comparing values of the `value` pattern.
fn assertion_type(
    name: &str,
    comparisons: &'static [Comparison],
    value: &'static str,
    predicate: fn(Comparison, &str) -> Result<Predicate, String>,
) -> DataType {
    DataType::localized(
        name,
        move |language| Comparison::pattern(comparisons, language, value),
        move |language, raw| {
            let (comparison, expected) =
                Comparison::split(comparisons, language, raw)
                    .ok_or_else(|| format!("`{raw}` is not an assertion"))?;
            let predicate = predicate(comparison, expected)?;
            Ok(Value::Assertion(Assertion::new(raw, predicate)))
        },
    )
}

/// Returns the built-in [`DataType`]s.
#[must_use]
pub fn builtin() -> Vec<DataType> {
    vec![
        DataType::new("integer", INTEGER, |raw| {
            parse_integer(raw).map(Value::Integer)
        }),
        DataType::new("decimal", DECIMAL, |raw| {
            parse_decimal(raw).map(Value::Decimal)
        }),
        DataType::new("text", TEXT, |raw| parse_text(raw).map(Value::Text)),
        DataType::new("word", WORD, |raw| Ok(Value::Text(raw.to_owned()))),
        DataType::new(
            "list",
            format!(r"(?:{WORD})(?:\s*,\s*(?:{WORD}))*"),
            |raw| {
                Ok(Value::List(
                    raw.split(',')
                        .map(|w| Value::Text(w.trim().to_owned()))
                        .collect(),
                ))
            },
        ),
        assertion_type(
            "integer-assertion",
            Comparison::NUMERIC,
            INTEGER,
            |comparison, expected| {
                let expected = parse_integer(expected)?;
                Ok(Box::new(move |actual: &Value| {
                    i64::from_value(actual)
                        .is_some_and(|a| comparison.holds_for(a.cmp(&expected)))
                }))
            },
        ),
        assertion_type(
            "decimal-assertion",
            Comparison::NUMERIC,
            DECIMAL,
            |comparison, expected| {
                let expected = parse_decimal(expected)?;
                Ok(Box::new(move |actual: &Value| {
                    f64::from_value(actual)
                        .and_then(|a| a.partial_cmp(&expected))
                        .is_some_and(|o| comparison.holds_for(o))
                }))
            },
        ),
        assertion_type(
            "text-assertion",
            Comparison::TEXTUAL,
            TEXT,
            |comparison, expected| {
                let expected = if comparison.is_unary() {
                    String::new()
                } else {
                    parse_text(expected)?
                };
                Ok(Box::new(move |actual: &Value| {
                    String::from_value(actual).is_some_and(|a| {
                        comparison.holds_for_text(&a, &expected)
                    })
                }))
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(ty: &str, language: &str, raw: &str) -> Value {
        TypeRegistry::new().get(ty).unwrap().parse(language, raw).unwrap()
    }

    #[test]
    fn coerces_scalars() {
        assert!(matches!(parse("integer", "en", "+42"), Value::Integer(42)));
        assert!(matches!(
            parse("decimal", "es", "1,5"),
            Value::Decimal(d) if (d - 1.5).abs() < f64::EPSILON
        ));
        assert!(matches!(
            parse("text", "en", r#""say \"hi\"""#),
            Value::Text(t) if t == r#"say "hi""#
        ));
        assert!(matches!(
            parse("list", "en", "a, b ,c"),
            Value::List(l) if l.len() == 3
        ));
    }

    #[test]
    fn integer_overflow_is_reported() {
        let err = TypeRegistry::new()
            .get("integer")
            .unwrap()
            .parse("en", "99999999999999999999")
            .unwrap_err();

        assert!(err.contains("is not an integer"), "{err}");
    }

    #[test]
    fn assertions() {
        let Value::Assertion(gt) =
            parse("integer-assertion", "en", "is greater than 5")
        else {
            panic!("not an assertion");
        };
        assert!(gt.test(&Value::Integer(6)));
        assert!(!gt.test(&Value::Integer(5)));
        assert!(!gt.test(&Value::Text("6".into())));

        let Value::Assertion(starts) =
            parse("text-assertion", "es", "empieza por 'pep'")
        else {
            panic!("not an assertion");
        };
        assert!(starts.test(&"pepino".into()));
        assert_eq!(starts.description(), "empieza por 'pep'");

        let Value::Assertion(empty) = parse("text-assertion", "en", "is empty")
        else {
            panic!("not an assertion");
        };
        assert!(empty.test(&"".into()));
    }

    #[test]
    fn assertion_patterns_are_anchorable() {
        let ty = TypeRegistry::new().get("decimal-assertion").unwrap();
        let re = regex::Regex::new(&format!("^(?:{})$", ty.pattern("en")))
            .unwrap();

        assert!(re.is_match("is less than or equal to 2.5"));
        assert!(!re.is_match("is about 2.5"));
    }
}
