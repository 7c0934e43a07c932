// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Localized keyword tables.

use super::ast::StepKind;

/// Keywords of a single language.
#[derive(Clone, Copy, Debug)]
pub struct Keywords {
    /// Language tag of these [`Keywords`].
    pub language: &'static str,

    /// `Feature` section keywords.
    pub feature: &'static [&'static str],

    /// `Background` section keywords.
    pub background: &'static [&'static str],

    /// `Scenario` section keywords.
    pub scenario: &'static [&'static str],

    /// `Scenario Outline` section keywords.
    pub scenario_outline: &'static [&'static str],

    /// `Examples` section keywords.
    pub examples: &'static [&'static str],

    /// `Given` step keywords.
    pub given: &'static [&'static str],

    /// `When` step keywords.
    pub when: &'static [&'static str],

    /// `Then` step keywords.
    pub then: &'static [&'static str],

    /// `And` step keywords.
    pub and: &'static [&'static str],

    /// `But` step keywords.
    pub but: &'static [&'static str],
}

/// English [`Keywords`].
pub const EN: Keywords = Keywords {
    language: "en",
    feature: &["Feature", "Business Need", "Ability"],
    background: &["Background"],
    scenario: &["Scenario", "Example"],
    scenario_outline: &["Scenario Outline", "Scenario Template"],
    examples: &["Examples", "Scenarios"],
    given: &["Given"],
    when: &["When"],
    then: &["Then"],
    and: &["And"],
    but: &["But"],
};

/// Spanish [`Keywords`].
pub const ES: Keywords = Keywords {
    language: "es",
    feature: &["Característica", "Necesidad del negocio", "Requisito"],
    background: &["Antecedentes"],
    scenario: &["Escenario", "Ejemplo"],
    scenario_outline: &["Esquema del escenario"],
    examples: &["Ejemplos"],
    given: &["Dado", "Dada", "Dados", "Dadas"],
    when: &["Cuando"],
    then: &["Entonces"],
    and: &["Y", "E"],
    but: &["Pero"],
};

/// Every supported language.
pub const ALL: &[Keywords] = &[EN, ES];

/// Returns the [`Keywords`] of the given `language` tag, if supported.
///
/// Region subtags are ignored, so `es-ES` resolves to [`ES`].
#[must_use]
pub fn for_language(language: &str) -> Option<&'static Keywords> {
    let primary = language.split(['-', '_']).next().unwrap_or_default();
    ALL.iter().find(|k| k.language.eq_ignore_ascii_case(primary))
}

/// Kind of a section header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Section {
    /// `Feature:`.
    Feature,

    /// `Background:`.
    Background,

    /// `Scenario:`.
    Scenario,

    /// `Scenario Outline:`.
    ScenarioOutline,

    /// `Examples:`.
    Examples,
}

/// Step keyword role, before `And`/`But` resolution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepKeyword {
    /// Explicit role.
    Kind(StepKind),

    /// `And`, `But` or `*`: inherits the previous role.
    Conjunction,
}

impl Keywords {
    /// Recognizes a `Keyword: name` section header, returning the section,
    /// keyword and trimmed name.
    #[must_use]
    pub fn section<'l>(&self, line: &'l str) -> Option<(Section, &'static str, &'l str)> {
        [
            (Section::Feature, self.feature),
            (Section::Background, self.background),
            (Section::ScenarioOutline, self.scenario_outline),
            (Section::Scenario, self.scenario),
            (Section::Examples, self.examples),
        ]
        .into_iter()
        .find_map(|(section, keywords)| {
            keywords.iter().find_map(|&kw| {
                line.strip_prefix(kw)
                    .and_then(|rest| rest.strip_prefix(':'))
                    .map(|name| (section, kw, name.trim()))
            })
        })
    }

    /// Recognizes a `Keyword text` step, returning its role, keyword and
    /// trimmed text.
    #[must_use]
    pub fn step<'l>(&self, line: &'l str) -> Option<(StepKeyword, &'static str, &'l str)> {
        if let Some(text) = line.strip_prefix("* ") {
            return Some((StepKeyword::Conjunction, "*", text.trim()));
        }
        [
            (StepKeyword::Kind(StepKind::Given), self.given),
            (StepKeyword::Kind(StepKind::When), self.when),
            (StepKeyword::Kind(StepKind::Then), self.then),
            (StepKeyword::Conjunction, self.and),
            (StepKeyword::Conjunction, self.but),
        ]
        .into_iter()
        .find_map(|(kind, keywords)| {
            keywords.iter().find_map(|&kw| {
                line.strip_prefix(kw)
                    .filter(|rest| rest.starts_with(char::is_whitespace))
                    .map(|text| (kind, kw, text.trim()))
            })
        })
    }
}
