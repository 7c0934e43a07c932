// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! [`PlanBuilder`] turning parsed [`Document`]s into a [`PlanNode`] tree.

use std::collections::{BTreeMap, BTreeSet};

use derive_more::{Display, Error, From};
use lazy_regex::{regex, regex_captures};

use crate::{
    config::{self, keys, Configuration},
    parser::{
        Comment, Document, Feature, Location, Scenario, Step,
    },
    tag::{Ext as _, TagOperation},
};

use super::{NodeType, PlanNode};

/// Well-known [`PlanNode`] properties set by the [`PlanBuilder`].
pub mod properties {
    /// Source construct: `feature`, `scenario`, `scenarioOutline`,
    /// `example` or `step`.
    pub const GHERKIN_TYPE: &str = "gherkinType";

    /// Source location, as `path[line,column]`.
    pub const SOURCE: &str = "source";

    /// Free text below a header.
    pub const DESCRIPTION: &str = "description";

    /// Set to `true` on steps coming from a `Background`.
    pub const BACKGROUND: &str = "background";

    /// `Given`, `When` or `Then`.
    pub const STEP_KIND: &str = "stepKind";

    /// 1-based row index of an expanded outline example.
    pub const OUTLINE_ROW: &str = "outlineRow";
}

/// Error of building a plan.
#[derive(Clone, Debug, Display, Error, From)]
pub enum BuildError {
    /// A `Scenario Outline` has no example rows.
    #[from(ignore)]
    #[display("Scenario outline `{name}` at {source} has no examples")]
    OutlineWithoutExamples {
        /// Name of the outline.
        #[error(not(source))]
        name: String,

        /// Where the outline is.
        #[error(not(source))]
        source: String,
    },

    /// A `<placeholder>` matches no examples column.
    #[from(ignore)]
    #[display("Failed to resolve <{placeholder}> at {source}")]
    UnknownPlaceholder {
        /// Name of the placeholder.
        #[error(not(source))]
        placeholder: String,

        /// Where the placeholder is.
        #[error(not(source))]
        source: String,
    },

    /// A configuration value is malformed.
    #[display("{_0}")]
    Config(config::Error),
}

/// Builder of a [`PlanNode`] tree out of parsed [`Document`]s.
#[derive(Clone, Debug, Default)]
pub struct PlanBuilder {
    filter: Option<TagOperation>,
}

impl PlanBuilder {
    /// Creates a [`PlanBuilder`] keeping every test case.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [`PlanBuilder`] out of the [`keys::TAG_FILTER`] option.
    ///
    /// # Errors
    ///
    /// If the filter expression is malformed.
    pub fn from_config(config: &Configuration) -> Result<Self, BuildError> {
        Ok(Self { filter: config.get::<TagOperation>(keys::TAG_FILTER)? })
    }

    /// Keeps only test cases whose tags satisfy the `filter`.
    #[must_use]
    pub fn with_tag_filter(mut self, filter: TagOperation) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Builds the plan.
    ///
    /// Ids are assigned from positions and names before filtering, so they
    /// stay stable whatever the filter is.
    ///
    /// # Errors
    ///
    /// On the first outline without examples or unknown placeholder.
    pub fn build<'d, I>(&self, documents: I) -> Result<PlanNode, BuildError>
    where
        I: IntoIterator<Item = &'d Document>,
    {
        let mut root = PlanNode::root();
        for (n, document) in documents.into_iter().enumerate() {
            let Some(feature) = &document.feature else {
                continue;
            };
            let node = self.feature(n + 1, document, feature)?;
            if node.is_leaf() {
                tracing::debug!(feature = %node.id, "feature filtered out");
            } else {
                let _ = root.add_child(node);
            }
        }
        tracing::info!(
            features = root.children.len(),
            test_cases = root.test_cases().count(),
            "plan built",
        );
        Ok(root)
    }

    fn feature(
        &self,
        n: usize,
        document: &Document,
        feature: &Feature,
    ) -> Result<PlanNode, BuildError> {
        let source = Source(document);
        let mut node = PlanNode::new(
            format!("{n}:{}", slug(&feature.name)),
            NodeType::Aggregator,
            &feature.name,
        );
        node.language = Some(document.language.clone());
        node.keyword = Some(feature.keyword.clone());
        node.tags = feature.tags.iter().cloned().collect();
        node.properties = comment_properties(&feature.comments);
        node.set_property(properties::GHERKIN_TYPE, "feature");
        node.set_property(properties::SOURCE, source.at(feature.location));
        if !feature.description.is_empty() {
            node.set_property(properties::DESCRIPTION, &feature.description);
        }

        let background = feature.background.as_ref().map_or(&[][..], |b| {
            b.steps.as_slice()
        });
        for (i, scenario) in feature.scenarios.iter().enumerate() {
            let mut child = scenario_base(
                &node,
                format!("{}.{}:{}", node.id, i + 1, slug(&scenario.name)),
                scenario,
                source,
            );
            if scenario.outline {
                self.outline(&mut child, scenario, background, source)?;
                if !child.is_leaf() {
                    let _ = node.add_child(child);
                }
            } else if self.accepts(&child.tags) {
                child.node_type = NodeType::TestCase;
                child.set_property(properties::GHERKIN_TYPE, "scenario");
                let steps = background.iter().chain(&scenario.steps);
                add_steps(&mut child, steps, background.len(), source);
                let _ = node.add_child(child);
            }
        }
        Ok(node)
    }

    fn outline(
        &self,
        node: &mut PlanNode,
        outline: &Scenario,
        background: &[Step],
        source: Source<'_>,
    ) -> Result<(), BuildError> {
        node.set_property(properties::GHERKIN_TYPE, "scenarioOutline");

        let rows = outline
            .examples
            .iter()
            .filter_map(|ex| {
                let (header, values) = ex.table.as_ref()?.rows.split_first()?;
                Some(values.iter().map(move |v| (ex, header, v)))
            })
            .flatten()
            .collect::<Vec<_>>();
        if rows.is_empty() {
            return Err(BuildError::OutlineWithoutExamples {
                name: outline.name.clone(),
                source: source.at(outline.location),
            });
        }

        for (n, (examples, header, values)) in rows.into_iter().enumerate() {
            let row = n + 1;
            let replace = |text: &str, at: Location| {
                expand(text, header, values, || source.at(at))
            };

            let name = replace(&outline.name, outline.location)?;
            let mut case = PlanNode::new(
                format!("{}.{row}:{}", node.id, slug(&name)),
                NodeType::TestCase,
                format!("{name} [{row}]"),
            );
            case.language.clone_from(&node.language);
            case.keyword.clone_from(&node.keyword);
            case.tags = node.tags.clone();
            case.tags.extend(examples.tags.iter().cloned());
            case.properties = inherited(node);
            case.properties.extend(comment_properties(&examples.comments));
            case.set_property(properties::GHERKIN_TYPE, "example");
            case.set_property(properties::SOURCE, source.at(examples.location));
            case.set_property(properties::OUTLINE_ROW, row.to_string());
            if !self.accepts(&case.tags) {
                continue;
            }

            let steps = outline
                .steps
                .iter()
                .map(|step| {
                    let mut error = None;
                    let argument = step.argument.as_ref().map(|arg| {
                        arg.replace_with(|cell| {
                            replace(cell, step.location).unwrap_or_else(|e| {
                                error = Some(e);
                                String::new()
                            })
                        })
                    });
                    if let Some(e) = error {
                        return Err(e);
                    }
                    Ok(Step {
                        text: replace(&step.text, step.location)?,
                        argument,
                        ..step.clone()
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let steps = background.iter().chain(&steps);
            add_steps(&mut case, steps, background.len(), source);
            let _ = node.add_child(case);
        }
        Ok(())
    }

    fn accepts(&self, tags: &BTreeSet<String>) -> bool {
        self.filter.as_ref().map_or(true, |f| f.eval(tags))
    }
}

/// Creates the node of a `scenario`, inheriting from the `feature` one.
fn scenario_base(
    feature: &PlanNode,
    id: String,
    scenario: &Scenario,
    source: Source<'_>,
) -> PlanNode {
    let mut node = PlanNode::new(id, NodeType::Aggregator, &scenario.name);
    node.language.clone_from(&feature.language);
    node.keyword = Some(scenario.keyword.clone());
    node.tags = feature
        .tags
        .iter()
        .cloned()
        .chain(scenario.tags.iter().cloned())
        .collect();
    node.properties = inherited(feature);
    node.properties.extend(comment_properties(&scenario.comments));
    node.set_property(properties::SOURCE, source.at(scenario.location));
    if !scenario.description.is_empty() {
        node.set_property(properties::DESCRIPTION, &scenario.description);
    }
    node
}

/// Where the nodes of a [`Document`] come from.
#[derive(Clone, Copy, Debug)]
struct Source<'d>(&'d Document);

impl Source<'_> {
    fn at(self, location: Location) -> String {
        let path = self
            .0
            .path
            .as_deref()
            .map_or_else(String::new, |p| p.display().to_string());
        format!("{path}[{},{}]", location.line, location.column)
    }
}

/// Appends STEP nodes to the given test `case`, the first `background` of
/// them flagged as coming from the `Background`.
fn add_steps<'s>(
    case: &mut PlanNode,
    steps: impl Iterator<Item = &'s Step>,
    background: usize,
    source: Source<'_>,
) {
    for (n, step) in steps.enumerate() {
        let mut node = PlanNode::new(
            format!("{}#{}", case.id, n + 1),
            NodeType::Step,
            &step.text,
        );
        node.language.clone_from(&case.language);
        node.keyword = Some(step.keyword.clone());
        node.data.clone_from(&step.argument);
        node.properties = inherited(case);
        node.properties.extend(comment_properties(&step.comments));
        node.set_property(properties::GHERKIN_TYPE, "step");
        node.set_property(properties::SOURCE, source.at(step.location));
        node.set_property(properties::STEP_KIND, step.kind.to_string());
        if n < background {
            node.set_property(properties::BACKGROUND, "true");
        }
        let _ = case.add_child(node);
    }
}

/// Substitutes every `<name>` placeholder with the value of its column.
fn expand(
    text: &str,
    header: &[String],
    values: &[String],
    at: impl Fn() -> String,
) -> Result<String, BuildError> {
    let mut error = None;
    let expanded = regex!(r"<([^>\s]+)>")
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = caps.get(1).map_or("", |m| m.as_str());
            header
                .iter()
                .zip(values)
                .find_map(|(k, v)| (k == name).then_some(v.as_str()))
                .unwrap_or_else(|| {
                    error = Some(BuildError::UnknownPlaceholder {
                        placeholder: name.to_owned(),
                        source: at(),
                    });
                    ""
                })
        })
        .into_owned();
    error.map_or(Ok(expanded), Err)
}

/// Properties inherited by children: everything but the ones describing the
/// node itself.
fn inherited(parent: &PlanNode) -> BTreeMap<String, String> {
    const OWN: &[&str] = &[
        properties::GHERKIN_TYPE,
        properties::SOURCE,
        properties::DESCRIPTION,
        properties::OUTLINE_ROW,
    ];
    parent
        .properties
        .iter()
        .filter(|(k, _)| !OWN.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Extracts `key: value` properties out of `comments`.
fn comment_properties(comments: &[Comment]) -> BTreeMap<String, String> {
    comments
        .iter()
        .filter_map(|c| {
            let (_, key, value) =
                regex_captures!(r"^([\w.-]+)\s*:\s*(.*?)\s*$", &c.text)?;
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}

/// Lowercase, dash-separated form of a `name`, at most 40 characters long.
#[must_use]
pub fn slug(name: &str) -> String {
    let words = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase);
    let mut slug = String::new();
    for word in words {
        let sep = usize::from(!slug.is_empty());
        if slug.chars().count() + sep + word.chars().count() > 40 {
            if slug.is_empty() {
                slug.extend(word.chars().take(40));
            }
            break;
        }
        if sep > 0 {
            slug.push('-');
        }
        slug.push_str(&word);
    }
    slug
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::parser::{DataTable, StepArgument};

    use super::*;

    const CUCUMBERS: &str = "\
# owner: kitchen
@food
Feature: Eating cucumbers
  Background:
    Given a basket

  # priority: high
  @slow
  Scenario: eat some
    Given there are 12 cucumbers
    When I eat 5 cucumbers

  Scenario Outline: eat <eat> of <start>
    Given there are <start> cucumbers
    When I eat <eat> cucumbers
      | eaten |
      | <eat> |

    @few
    Examples:
      | start | eat |
      | 12    | 5   |
    @many
    Examples:
      | start | eat |
      | 20    | 15  |
";

    fn build(text: &str, builder: &PlanBuilder) -> Result<PlanNode, BuildError> {
        let doc = Document::parse(text, "en").unwrap();
        builder.build([&doc])
    }

    #[test]
    fn builds_ids_tags_and_properties() {
        let plan = build(CUCUMBERS, &PlanBuilder::new()).unwrap();

        assert_eq!(
            plan.descendants()
                .filter(|n| n.node_type != NodeType::Step)
                .map(|n| (n.id.as_str(), n.node_type))
                .collect::<Vec<_>>(),
            [
                ("1:eating-cucumbers", NodeType::Aggregator),
                ("1:eating-cucumbers.1:eat-some", NodeType::TestCase),
                ("1:eating-cucumbers.2:eat-eat-of-start", NodeType::Aggregator),
                (
                    "1:eating-cucumbers.2:eat-eat-of-start.1:eat-5-of-12",
                    NodeType::TestCase,
                ),
                (
                    "1:eating-cucumbers.2:eat-eat-of-start.2:eat-15-of-20",
                    NodeType::TestCase,
                ),
            ],
        );

        let case = plan.find("1:eating-cucumbers.1:eat-some").unwrap();
        assert_eq!(
            case.tags,
            BTreeSet::from(["food".to_owned(), "slow".to_owned()]),
        );
        assert_eq!(case.property("owner"), Some("kitchen"));
        assert_eq!(case.property("priority"), Some("high"));
        assert_eq!(case.property(properties::SOURCE), Some("[9,3]"));
        assert_eq!(
            case.children.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            ["a basket", "there are 12 cucumbers", "I eat 5 cucumbers"],
        );
        assert!(case.children[0].flag(properties::BACKGROUND));
        assert!(!case.children[1].flag(properties::BACKGROUND));
        assert_eq!(case.children[2].id, "1:eating-cucumbers.1:eat-some#3");
        assert_eq!(case.children[2].property(properties::STEP_KIND), Some("When"));
    }

    #[test]
    fn expands_outline_rows() {
        let plan = build(CUCUMBERS, &PlanBuilder::new()).unwrap();

        let row = plan
            .find("1:eating-cucumbers.2:eat-eat-of-start.2:eat-15-of-20")
            .unwrap();
        assert_eq!(row.name, "eat 15 of 20 [2]");
        assert!(row.has_tag("many"));
        assert!(!row.has_tag("few"));
        assert_eq!(row.property(properties::OUTLINE_ROW), Some("2"));
        assert_eq!(row.children[1].name, "there are 20 cucumbers");
        assert_eq!(
            row.children[2].data,
            Some(StepArgument::Table(DataTable {
                rows: vec![vec!["eaten".into()], vec!["15".into()]],
            })),
        );
    }

    #[test]
    fn filter_keeps_ids_and_drops_empty_nodes() {
        let builder = PlanBuilder::new()
            .with_tag_filter("@many or @slow".parse().unwrap());
        let plan = build(CUCUMBERS, &builder).unwrap();

        assert_eq!(
            plan.test_cases().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            [
                "1:eating-cucumbers.1:eat-some",
                "1:eating-cucumbers.2:eat-eat-of-start.2:eat-15-of-20",
            ],
        );

        let none = PlanBuilder::new()
            .with_tag_filter("@absent".parse().unwrap());
        assert!(build(CUCUMBERS, &none).unwrap().is_leaf());
    }

    #[test]
    fn outline_without_examples_fails() {
        let err = build(
            "Feature: f\n  Scenario Outline: o\n    Given <x>\n",
            &PlanBuilder::new(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            BuildError::OutlineWithoutExamples { ref name, ref source }
                if name == "o" && source == "[2,3]"
        ));
    }

    #[test]
    fn unknown_placeholder_fails() {
        let err = build(
            "Feature: f\n\
             \x20 Scenario Outline: o\n\
             \x20   Given <y>\n\
             \x20   Examples:\n\
             \x20     | x |\n\
             \x20     | 1 |\n",
            &PlanBuilder::new(),
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "Failed to resolve <y> at [3,5]");
    }

    #[test]
    fn invalid_filter_config() {
        let config = Configuration::from_pairs([(keys::TAG_FILTER, "a and")]);

        assert!(matches!(
            PlanBuilder::from_config(&config),
            Err(BuildError::Config(_)),
        ));
    }

    #[test]
    fn slugs() {
        assert_eq!(slug("Eat <eat> cucumbers!"), "eat-eat-cucumbers");
        assert_eq!(slug("  Ñandú  Über "), "ñandú-über");
        assert_eq!(
            slug("a very long scenario name that keeps going and going"),
            "a-very-long-scenario-name-that-keeps",
        );
    }
}
