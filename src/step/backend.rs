// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! [`Backend`] resolving plan steps to [`StepDefinition`]s.

use std::sync::Arc;

use derive_more::with_trait::Debug;
use itertools::Itertools as _;
use lazy_regex::regex;

use crate::{
    config::Configuration,
    extension::{self, Registry},
    parser::StepArgument,
    plan::{NodeType, PlanNode},
    transform::properties,
};

use super::{
    Arguments, CompiledStep, DataType, Error, Hook, HookKind,
    PropertyEvaluator, StepContributor, StepDefinition, Template,
    TypeRegistry,
};

/// Built-in [`PropertyEvaluator`] resolving `${key}` to the value of a
/// configuration key.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigurationEvaluator;

impl PropertyEvaluator for ConfigurationEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        configuration: &Configuration,
    ) -> Option<String> {
        configuration.get_raw(expression.trim()).map(str::to_owned)
    }
}

/// Builder of a [`Backend`].
#[derive(Debug)]
pub struct BackendBuilder {
    types: TypeRegistry,
    #[debug(skip)]
    contributors: Vec<Arc<dyn StepContributor>>,
    #[debug(skip)]
    evaluators: Vec<Arc<dyn PropertyEvaluator>>,
    configuration: Configuration,
}

impl BackendBuilder {
    /// Adds a [`StepContributor`].
    #[must_use]
    pub fn contributor(mut self, contributor: Arc<dyn StepContributor>) -> Self {
        self.contributors.push(contributor);
        self
    }

    /// Adds a [`PropertyEvaluator`], consulted before the already added
    /// ones.
    #[must_use]
    pub fn evaluator(mut self, evaluator: Arc<dyn PropertyEvaluator>) -> Self {
        self.evaluators.insert(0, evaluator);
        self
    }

    /// Adds a [`DataType`].
    #[must_use]
    pub fn data_type(mut self, ty: DataType) -> Self {
        self.types.add(ty);
        self
    }

    /// Sets the [`Configuration`] steps and property evaluators see.
    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Compiles every contributed [`StepDefinition`].
    ///
    /// # Errors
    ///
    /// If a template uses an unknown type or does not compile.
    pub fn build(mut self) -> Result<Backend, Error> {
        for contributor in &self.contributors {
            for ty in contributor.data_types() {
                self.types.add(ty);
            }
        }

        let mut steps = Vec::new();
        let mut hooks = Vec::new();
        for contributor in &self.contributors {
            let info = contributor.info();
            let definitions = contributor.steps();
            tracing::debug!(
                contributor = %info,
                steps = definitions.len(),
                "loading step contributor",
            );
            for definition in definitions {
                steps.push(CompiledStep::compile(definition, &info, &self.types)?);
            }
            hooks.extend(contributor.hooks());
        }
        // Stable, so equal orders keep the contributor order.
        hooks.sort_by_key(|h| h.order);

        Ok(Backend {
            steps,
            hooks,
            evaluators: self.evaluators,
            configuration: self.configuration,
        })
    }
}

/// Resolved step: a definition, its template and the raw placeholder texts.
#[derive(Clone, Debug)]
pub struct Match<'b> {
    /// Matched definition.
    pub step: &'b CompiledStep,

    /// Matched template.
    pub template: &'b Template,

    /// Step text, after property expansion.
    pub text: String,

    raw: Vec<String>,
}

impl Match<'_> {
    /// Returns the matched [`StepDefinition`].
    #[must_use]
    pub fn definition(&self) -> &StepDefinition {
        &self.step.definition
    }

    /// Coerces the placeholder texts, attaching the step `data`.
    ///
    /// # Errors
    ///
    /// If a placeholder text is not a valid value of its type.
    pub fn arguments(
        &self,
        data: Option<StepArgument>,
    ) -> Result<Arguments, Error> {
        let values = self
            .template
            .params
            .iter()
            .zip(&self.raw)
            .map(|(param, raw)| {
                param
                    .data_type
                    .parse(&self.template.language, raw)
                    .map(|v| (param.name.clone(), v))
                    .map_err(|reason| Error::Coercion {
                        argument: param.name.clone(),
                        type_name: param.data_type.name().to_owned(),
                        reason,
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Arguments::new(values, data))
    }
}

/// Compiled set of step definitions and hooks.
#[derive(Debug)]
pub struct Backend {
    steps: Vec<CompiledStep>,
    hooks: Vec<Hook>,
    #[debug(skip)]
    evaluators: Vec<Arc<dyn PropertyEvaluator>>,
    configuration: Configuration,
}

impl Backend {
    /// Starts building a [`Backend`] with the built-in [`DataType`]s and the
    /// [`ConfigurationEvaluator`].
    #[must_use]
    pub fn builder() -> BackendBuilder {
        BackendBuilder {
            types: TypeRegistry::new(),
            contributors: Vec::new(),
            evaluators: vec![Arc::new(ConfigurationEvaluator)],
            configuration: Configuration::empty(),
        }
    }

    /// Builds a [`Backend`] out of the step contributors and property
    /// evaluators active in the given [`Registry`].
    ///
    /// # Errors
    ///
    /// If the extensions cannot be resolved, or a template is invalid.
    pub fn from_registry(
        registry: &Registry,
        configuration: &Configuration,
    ) -> Result<Self, Error> {
        let contributors = registry
            .resolve_as::<Arc<dyn StepContributor>>(&extension::STEP_CONTRIBUTOR)?;
        let evaluators = registry.resolve_as::<Arc<dyn PropertyEvaluator>>(
            &extension::PROPERTY_EVALUATOR,
        )?;

        let builder = evaluators.into_iter().fold(
            Self::builder().configuration(configuration.clone()),
            BackendBuilder::evaluator,
        );
        contributors
            .into_iter()
            .fold(builder, BackendBuilder::contributor)
            .build()
    }

    /// Returns the [`Configuration`] of this [`Backend`].
    #[must_use]
    pub const fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Returns the [`Hook`]s of the given kind, in execution order.
    pub fn hooks(&self, kind: HookKind) -> impl Iterator<Item = &Hook> {
        self.hooks.iter().filter(move |h| h.kind == kind)
    }

    /// Replaces every `${expression}` with the first value a
    /// [`PropertyEvaluator`] gives for it. Unresolved ones are kept as is.
    #[must_use]
    pub fn expand(&self, text: &str) -> String {
        regex!(r"\$\{([^{}]+)\}")
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let (whole, expr) = (&caps[0], &caps[1]);
                self.evaluators
                    .iter()
                    .find_map(|e| e.evaluate(expr, &self.configuration))
                    .unwrap_or_else(|| {
                        tracing::warn!(expression = expr, "unresolved property");
                        whole.to_owned()
                    })
            })
            .into_owned()
    }

    /// Expands properties inside a doc string or data table.
    #[must_use]
    pub fn expand_data(&self, data: &StepArgument) -> StepArgument {
        data.replace_with(|text| self.expand(text))
    }

    /// Resolves a step `text` of the given `language` to the best-scoring
    /// definition, if any.
    ///
    /// # Errors
    ///
    /// [`Error::Ambiguous`] if several definitions share the best score.
    pub fn resolve(
        &self,
        node: &str,
        text: &str,
        language: &str,
    ) -> Result<Option<Match<'_>>, Error> {
        let text = self.expand(text);
        let candidates = self
            .steps
            .iter()
            .filter_map(|step| {
                let template = step.template(language)?;
                let raw = template.captures(&text)?;
                let raw = raw.into_iter().map(str::to_owned).collect();
                Some((step, template, raw))
            })
            .max_set_by_key(|(_, template, _)| template.score());

        match candidates.len() {
            0 => {
                tracing::debug!(node, text, "no step definition");
                Ok(None)
            }
            1 => Ok(candidates.into_iter().next().map(|(step, template, raw)| {
                tracing::trace!(node, definition = step.definition.id(), "step resolved");
                Match { step, template, text, raw }
            })),
            _ => Err(Error::Ambiguous {
                node: node.to_owned(),
                text,
                candidates: candidates
                    .iter()
                    .map(|(step, ..)| {
                        format!("{} ({})", step.definition.id(), step.contributor)
                    })
                    .collect(),
            }),
        }
    }

    /// Resolves a [`NodeType::Step`] node.
    ///
    /// # Errors
    ///
    /// See [`Backend::resolve()`].
    pub fn resolve_node(&self, node: &PlanNode) -> Result<Option<Match<'_>>, Error> {
        let language = node.language.as_deref().unwrap_or("en");
        self.resolve(&node.id, &node.name, language)
    }

    /// Checks every step scheduled to run resolves unambiguously.
    ///
    /// Steps of absorbed and unresolved test cases are not checked, as they
    /// are never invoked.
    ///
    /// # Errors
    ///
    /// On the first ambiguous step.
    pub fn validate(&self, plan: &PlanNode) -> Result<(), Error> {
        for case in plan.test_cases() {
            if case.flag(properties::ABSORBED) || case.flag(properties::UNRESOLVED) {
                continue;
            }
            for step in case.leaves().filter(|n| n.node_type == NodeType::Step) {
                let _ = self.resolve_node(step)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Cucumbers;

    impl StepContributor for Cucumbers {
        fn info(&self) -> String {
            "cucumbers".into()
        }

        fn steps(&self) -> Vec<StepDefinition> {
            vec![
                StepDefinition::new(
                    "count",
                    "there are {count:integer} cucumbers",
                    |_, _| Ok(()),
                )
                .translated("es", "hay {count:integer} pepinos"),
                StepDefinition::new("any", "there are {word} cucumbers", |_, _| {
                    Ok(())
                }),
                StepDefinition::new(
                    "literal",
                    "there are many cucumbers",
                    |_, _| Ok(()),
                ),
                StepDefinition::new(
                    "color",
                    "the basket is {color}",
                    |_, _| Ok(()),
                ),
                StepDefinition::new("tint", "the basket is {word}", |_, _| {
                    Ok(())
                }),
            ]
        }

        fn data_types(&self) -> Vec<DataType> {
            vec![DataType::new("color", "red|green", |raw| Ok(raw.into()))]
        }
    }

    fn backend() -> Backend {
        Backend::builder()
            .contributor(Arc::new(Cucumbers))
            .configuration(Configuration::from_pairs([("basket.size", "12")]))
            .build()
            .unwrap()
    }

    #[test]
    fn more_literals_win() {
        let backend = backend();

        let found = backend.resolve("n", "there are many cucumbers", "en").unwrap();

        assert_eq!(found.unwrap().definition().id(), "literal");
    }

    #[test]
    fn equal_scores_are_ambiguous() {
        let backend = backend();

        let err = backend.resolve("n", "there are 12 cucumbers", "en").unwrap_err();

        assert!(matches!(
            err,
            Error::Ambiguous { ref candidates, .. } if candidates.len() == 2
        ));
        assert!(backend.resolve("n", "the basket is blue", "en").unwrap().is_some());
    }

    #[test]
    fn localized_templates_and_properties() {
        let backend = backend();

        let found = backend
            .resolve("n", "hay ${basket.size} pepinos", "es-ES")
            .unwrap()
            .unwrap();

        assert_eq!(found.text, "hay 12 pepinos");
        let args = found.arguments(None).unwrap();
        assert_eq!(args.value::<i64>("count"), Ok(12));
        assert!(backend.resolve("n", "hay 12 pepinos", "en").unwrap().is_none());
    }

    #[test]
    fn unresolved_properties_are_kept() {
        assert_eq!(backend().expand("a ${missing} b"), "a ${missing} b");
    }

    #[test]
    fn coercion_failures_are_reported() {
        let backend = backend();
        let found = backend
            .resolve("n", "hay 99999999999999999999 pepinos", "es")
            .unwrap()
            .unwrap();

        assert!(matches!(
            found.arguments(None),
            Err(Error::Coercion { ref argument, .. }) if argument == "count"
        ));
    }
}
