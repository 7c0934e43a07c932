// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! [`StepDefinition`]s and their compiled [`Template`]s.

use std::{cmp::Reverse, sync::Arc};

use derive_more::with_trait::Debug;
use lazy_regex::regex;
use regex::Regex;

use super::{types::DataType, Arguments, Error, StepContext, TypeRegistry};

/// Function invoked for a matched step.
pub type StepFn = Arc<
    dyn Fn(&mut StepContext, &Arguments) -> anyhow::Result<()> + Send + Sync,
>;

/// Step definition contributed by a [`StepContributor`].
///
/// Its phrase is given per language as a template of literal words and
/// typed placeholders: `{type}` or `{name:type}`, like
/// `there are {count:integer} cucumbers`.
///
/// [`StepContributor`]: super::StepContributor
#[derive(Clone, Debug)]
pub struct StepDefinition {
    id: String,
    templates: Vec<(String, String)>,
    #[debug(skip)]
    function: StepFn,
}

impl StepDefinition {
    /// Creates a [`StepDefinition`] with its English `template`.
    pub fn new<F>(
        id: impl Into<String>,
        template: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(&mut StepContext, &Arguments) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: id.into(),
            templates: vec![("en".to_owned(), template.into())],
            function: Arc::new(f),
        }
    }

    /// Adds the `template` of another `language`.
    #[must_use]
    pub fn translated(
        mut self,
        language: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.templates.push((language.into(), template.into()));
        self
    }

    /// Returns the identifier of this [`StepDefinition`].
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the `(language, template)` pairs.
    #[must_use]
    pub fn templates(&self) -> &[(String, String)] {
        &self.templates
    }

    /// Returns the function to invoke.
    #[must_use]
    pub fn function(&self) -> &StepFn {
        &self.function
    }
}

/// Placeholder of a compiled [`Template`].
#[derive(Clone, Debug)]
pub struct Param {
    /// Argument name: explicit, or the type name.
    pub name: String,

    /// Type coercing the matched text.
    pub data_type: Arc<DataType>,
}

/// Template of a [`StepDefinition`] compiled for a language.
#[derive(Clone, Debug)]
pub struct Template {
    /// Language of the template.
    pub language: String,

    /// Source template.
    pub source: String,

    /// Anchored regex, capturing each placeholder as `p{index}`.
    pub regex: Regex,

    /// Placeholders, in order.
    pub params: Vec<Param>,

    /// Number of literal words.
    pub literals: usize,
}

impl Template {
    /// Compiles a `source` template of the given `language`.
    ///
    /// # Errors
    ///
    /// If a placeholder names an unknown type, or the result is not a valid
    /// regex.
    pub fn compile(
        definition: &str,
        language: &str,
        source: &str,
        types: &TypeRegistry,
    ) -> Result<Self, Error> {
        let placeholder = regex!(r"\{(?:(\w+):)?([\w-]+)\}");

        let mut pattern = String::from("^");
        let (mut params, mut literals, mut last) = (Vec::new(), 0, 0);
        let mut literal = |text: &str, pattern: &mut String| {
            let words = text.split_whitespace().collect::<Vec<_>>();
            literals += words.len();
            let escaped =
                words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>();
            if text.starts_with(char::is_whitespace) && pattern.len() > 1 {
                pattern.push_str(r"\s+");
            }
            pattern.push_str(&escaped.join(r"\s+"));
            if text.ends_with(char::is_whitespace) && !words.is_empty() {
                pattern.push_str(r"\s+");
            }
        };

        for caps in placeholder.captures_iter(source) {
            let (Some(whole), Some(ty)) = (caps.get(0), caps.get(2)) else {
                continue;
            };
            literal(&source[last..whole.start()], &mut pattern);
            last = whole.end();

            let data_type = types.get(ty.as_str()).ok_or_else(|| {
                Error::UnknownType {
                    definition: definition.to_owned(),
                    type_name: ty.as_str().to_owned(),
                }
            })?;
            let name = caps.get(1).map_or(ty.as_str(), |n| n.as_str());
            pattern.push_str(&format!(
                "(?P<p{}>{})",
                params.len(),
                data_type.pattern(language),
            ));
            params.push(Param { name: name.to_owned(), data_type });
        }
        literal(&source[last..], &mut pattern);
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| Error::InvalidTemplate {
            definition: definition.to_owned(),
            reason: e.to_string(),
        })?;
        tracing::trace!(definition, template = source, %regex, "compiled step");
        Ok(Self {
            language: language.to_owned(),
            source: source.to_owned(),
            regex,
            params,
            literals,
        })
    }

    /// Ranks a match of this [`Template`]: more literal words first, then
    /// fewer placeholders.
    #[must_use]
    pub fn score(&self) -> (usize, Reverse<usize>) {
        (self.literals, Reverse(self.params.len()))
    }

    /// Returns the raw text of every placeholder if the `text` matches.
    #[must_use]
    pub fn captures<'t>(&self, text: &'t str) -> Option<Vec<&'t str>> {
        let caps = self.regex.captures(text.trim())?;
        (0..self.params.len())
            .map(|i| caps.name(&format!("p{i}")).map(|m| m.as_str()))
            .collect()
    }
}

/// [`StepDefinition`] with its [`Template`]s compiled.
#[derive(Clone, Debug)]
pub struct CompiledStep {
    /// Source definition.
    pub definition: Arc<StepDefinition>,

    /// Contributor it comes from.
    pub contributor: String,

    /// Templates, one per language.
    pub templates: Vec<Template>,
}

impl CompiledStep {
    /// Compiles every template of the given `definition`.
    ///
    /// # Errors
    ///
    /// See [`Template::compile()`].
    pub fn compile(
        definition: StepDefinition,
        contributor: &str,
        types: &TypeRegistry,
    ) -> Result<Self, Error> {
        let templates = definition
            .templates
            .iter()
            .map(|(language, source)| {
                Template::compile(&definition.id, language, source, types)
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            definition: Arc::new(definition),
            contributor: contributor.to_owned(),
            templates,
        })
    }

    /// Returns the [`Template`] for the given `language`, comparing primary
    /// subtags only.
    #[must_use]
    pub fn template(&self, language: &str) -> Option<&Template> {
        let primary = |l: &str| {
            l.split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase()
        };
        let wanted = primary(language);
        self.templates.iter().find(|t| primary(&t.language) == wanted)
    }
}
