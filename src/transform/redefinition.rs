// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Binding of definition test cases to their implementations.
//!
//! A business-readable *definition* test case and a technical
//! *implementation* test case correlate when an id tag of both yields the
//! same capture of the id tag pattern (like `@ID-42`). The receiving test
//! case then executes the steps of the other one, which is absorbed so it is
//! not executed twice.

use std::{collections::HashMap, str::FromStr};

use derive_more::with_trait::Display;
use lazy_regex::regex;
use regex::Regex;
use smart_default::SmartDefault;

use crate::{
    config::{keys, Configuration},
    parser::{Document, Scenario},
    plan::{properties as plan_props, NodeType, PlanNode},
};

use super::{properties, Error, PlanTransformer};

/// Which side of a correlated pair executes the steps of the other.
#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq)]
pub enum Direction {
    /// The test case tagged with the source tag takes the steps of the one
    /// tagged with the target tag.
    #[default]
    #[display("source-takes-target")]
    SourceTakesTarget,

    /// The test case tagged with the target tag takes the steps of the one
    /// tagged with the source tag.
    #[display("target-takes-source")]
    TargetTakesSource,
}

impl FromStr for Direction {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source-takes-target" | "source" => Ok(Self::SourceTakesTarget),
            "target-takes-source" | "target" => Ok(Self::TargetTakesSource),
            _ => Err("possible options: source-takes-target, target-takes-source"),
        }
    }
}

/// Correlation of definition and implementation test cases.
#[derive(Clone, Debug, SmartDefault)]
pub struct RedefinitionRule {
    /// Pattern extracting the correlation id out of a tag, with exactly one
    /// capture group.
    #[default(Regex::clone(regex!(r"^ID-(.+)$")))]
    pub id_tag_pattern: Regex,

    /// Tag of the definition test cases.
    #[default("Definition".to_owned())]
    pub source_tag: String,

    /// Tag of the implementation test cases.
    #[default("Implementation".to_owned())]
    pub target_tag: String,

    /// Which side executes the steps of the other.
    pub direction: Direction,
}

impl RedefinitionRule {
    /// Creates a [`RedefinitionRule`] out of an id tag `pattern` and the
    /// source and target tags, with the default [`Direction`].
    ///
    /// # Errors
    ///
    /// If the `pattern` is invalid, or has other than one capture group.
    pub fn new(
        pattern: &str,
        source_tag: impl Into<String>,
        target_tag: impl Into<String>,
    ) -> Result<Self, Error> {
        let id_tag_pattern =
            Regex::new(pattern).map_err(|e| Error::InvalidPattern {
                pattern: pattern.to_owned(),
                reason: e.to_string(),
            })?;
        // The implicit group 0 is the whole match.
        let groups = id_tag_pattern.captures_len() - 1;
        if groups != 1 {
            return Err(Error::CaptureGroups {
                pattern: pattern.to_owned(),
                groups,
            });
        }
        Ok(Self {
            id_tag_pattern,
            source_tag: source_tag.into().trim_start_matches('@').to_owned(),
            target_tag: target_tag.into().trim_start_matches('@').to_owned(),
            direction: Direction::default(),
        })
    }

    /// Reads a [`RedefinitionRule`] out of the given [`Configuration`],
    /// defaulting missing keys.
    ///
    /// # Errors
    ///
    /// If a configured value is invalid.
    pub fn from_config(configuration: &Configuration) -> Result<Self, Error> {
        let default = Self::default();
        let mut rule = Self::new(
            configuration
                .get_raw(keys::ID_TAG_PATTERN)
                .unwrap_or(default.id_tag_pattern.as_str()),
            configuration
                .get_raw(keys::DEFINITION_TAG)
                .unwrap_or(default.source_tag.as_str()),
            configuration
                .get_raw(keys::IMPLEMENTATION_TAG)
                .unwrap_or(default.target_tag.as_str()),
        )?;
        rule.direction = configuration
            .get_or(keys::REDEFINITION_DIRECTION, default.direction)?;
        Ok(rule)
    }

    /// Sets the [`Direction`].
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Returns the correlation id of the given `node`, from its first tag
    /// matching the id tag pattern.
    #[must_use]
    pub fn correlation_id(&self, node: &PlanNode) -> Option<String> {
        self.id_of(&node.tags)
    }

    fn id_of<'t>(&self, tags: impl IntoIterator<Item = &'t String>) -> Option<String> {
        tags.into_iter().find_map(|tag| {
            let caps = self.id_tag_pattern.captures(tag)?;
            caps.get(1).map(|m| m.as_str().to_owned())
        })
    }

    /// Returns the tags of the `(receiver, donor)` roles.
    fn roles(&self) -> (&str, &str) {
        match self.direction {
            Direction::SourceTakesTarget => {
                (self.source_tag.as_str(), self.target_tag.as_str())
            }
            Direction::TargetTakesSource => {
                (self.target_tag.as_str(), self.source_tag.as_str())
            }
        }
    }

    /// Replaces the examples of every outline tagged with the target tag by
    /// the ones of the outline tagged with the source tag and sharing its
    /// correlation id, so the source rows feed both outlines.
    ///
    /// Outlines tagged with both roles are left as they are.
    pub fn share_examples(&self, documents: &mut [Document]) {
        let mut shared = HashMap::new();
        for feature in documents.iter().filter_map(|d| d.feature.as_ref()) {
            for scenario in &feature.scenarios {
                let tags = || feature.tags.iter().chain(&scenario.tags);
                if !is_outline_of(scenario, tags(), &self.source_tag)
                    || is_outline_of(scenario, tags(), &self.target_tag)
                {
                    continue;
                }
                if let Some(id) = self.id_of(tags()) {
                    let _ = shared
                        .entry(id)
                        .or_insert_with(|| scenario.examples.clone());
                }
            }
        }

        for document in documents.iter_mut() {
            let Some(feature) = document.feature.as_mut() else {
                continue;
            };
            for scenario in &mut feature.scenarios {
                let tags = || feature.tags.iter().chain(&scenario.tags);
                if !is_outline_of(scenario, tags(), &self.target_tag)
                    || is_outline_of(scenario, tags(), &self.source_tag)
                {
                    continue;
                }
                let Some(examples) = self.id_of(tags()).and_then(|id| shared.get(&id))
                else {
                    continue;
                };
                tracing::debug!(outline = %scenario.name, "examples shared");
                scenario.examples.clone_from(examples);
            }
        }
    }

    /// Rewrites the given `plan`, so every receiving test case executes the
    /// steps of its correlated counterpart.
    ///
    /// Test cases keep their ids, steps are renumbered under their new
    /// parent.
    ///
    /// # Errors
    ///
    /// If several test cases of the same role share a correlation id, a test
    /// case has both roles, or a step map is malformed.
    pub fn apply(&self, plan: &mut PlanNode) -> Result<RedefinitionReport, Error> {
        let (receiver_tag, donor_tag) = self.roles();

        let mut report = RedefinitionReport::default();
        let mut bindings = Vec::new();
        {
            let receivers = self.index(plan, receiver_tag)?;
            let donors = self.index(plan, donor_tag)?;
            for (key, receiver) in &receivers {
                let Some(donor) = donors.get(key) else {
                    tracing::warn!(
                        test_case = %receiver.id,
                        id = %key.0,
                        role = receiver_tag,
                        missing = donor_tag,
                        "no counterpart found",
                    );
                    report.unresolved.push(receiver.id.clone());
                    continue;
                };
                if receiver.id == donor.id {
                    return Err(Error::BothRoles {
                        test_case: receiver.id.clone(),
                        source_tag: self.source_tag.clone(),
                        target_tag: self.target_tag.clone(),
                    });
                }
                let steps = redefined_steps(receiver, donor)?;
                bindings.push((receiver.id.clone(), donor.id.clone(), steps));
            }
        }
        report.unresolved.sort();

        for id in &report.unresolved {
            if let Some(node) = plan.find_mut(id) {
                node.set_property(properties::UNRESOLVED, "true");
            }
        }
        for (receiver, donor, steps) in bindings {
            if let Some(node) = plan.find_mut(&donor) {
                node.set_property(properties::ABSORBED, "true");
            }
            if let Some(node) = plan.find_mut(&receiver) {
                node.set_children(steps);
                node.set_property(properties::REDEFINED_BY, &donor);
            }
            tracing::debug!(test_case = %receiver, counterpart = %donor, "redefined");
            report.redefined.push((receiver, donor));
        }
        report.redefined.sort();

        tracing::info!(
            redefined = report.redefined.len(),
            unresolved = report.unresolved.len(),
            "redefinition applied",
        );
        Ok(report)
    }

    /// Indexes the test cases tagged with `tag` by correlation id and
    /// outline row.
    fn index<'p>(
        &self,
        plan: &'p PlanNode,
        tag: &str,
    ) -> Result<HashMap<(String, Option<String>), &'p PlanNode>, Error> {
        let mut index = HashMap::new();
        for case in plan.test_cases().filter(|c| c.has_tag(tag)) {
            let Some(id) = self.correlation_id(case) else {
                tracing::debug!(test_case = %case.id, tag, "no correlation id");
                continue;
            };
            let row = case.property(plan_props::OUTLINE_ROW).map(str::to_owned);
            if let Some(first) = index.insert((id.clone(), row), case) {
                return Err(Error::DuplicateId {
                    tag: tag.to_owned(),
                    id,
                    first: first.id.clone(),
                    second: case.id.clone(),
                });
            }
        }
        Ok(index)
    }
}

/// Outcome of applying a [`RedefinitionRule`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RedefinitionReport {
    /// `(receiver, donor)` ids of every redefined test case.
    pub redefined: Vec<(String, String)>,

    /// Ids of receiving test cases without counterpart.
    pub unresolved: Vec<String>,
}

/// [`PlanTransformer`] applying the [`RedefinitionRule`] read out of the
/// [`Configuration`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RedefinitionTransformer;

impl PlanTransformer for RedefinitionTransformer {
    fn name(&self) -> &str {
        "redefinition"
    }

    fn prepare(
        &self,
        documents: &mut [Document],
        configuration: &Configuration,
    ) -> Result<(), Error> {
        RedefinitionRule::from_config(configuration)?.share_examples(documents);
        Ok(())
    }

    fn transform(
        &self,
        plan: &mut PlanNode,
        configuration: &Configuration,
    ) -> Result<(), Error> {
        RedefinitionRule::from_config(configuration)?
            .apply(plan)
            .map(drop)
    }
}

/// Indicates whether the `scenario` is an outline with the `role` among its
/// `tags`.
fn is_outline_of<'t>(
    scenario: &Scenario,
    mut tags: impl Iterator<Item = &'t String>,
    role: &str,
) -> bool {
    scenario.outline && tags.any(|t| t == role)
}

/// Builds the new steps of the `receiver` out of the steps of the `donor`.
///
/// Without step map, the `donor` steps replace the `receiver` ones. With a
/// step map like `1-2-0`, every non-background `receiver` step becomes an
/// aggregator of the next N `donor` steps, or a virtual step for 0.
fn redefined_steps(
    receiver: &PlanNode,
    donor: &PlanNode,
) -> Result<Vec<PlanNode>, Error> {
    let Some(map) = donor.property(keys::STEP_MAP) else {
        return Ok(donor
            .children
            .iter()
            .enumerate()
            .map(|(n, step)| adopt(step, format!("{}#{}", receiver.id, n + 1)))
            .collect());
    };

    let bad_map = |reason: String| Error::StepMap {
        test_case: donor.id.clone(),
        map: map.to_owned(),
        reason,
    };
    let (background, donor_steps): (Vec<_>, Vec<_>) = donor
        .children
        .iter()
        .partition(|s| s.flag(plan_props::BACKGROUND));
    let wrappers = receiver
        .children
        .iter()
        .filter(|s| !s.flag(plan_props::BACKGROUND))
        .collect::<Vec<_>>();

    let mut counts = map
        .split('-')
        .map(|n| n.trim().parse::<usize>().map_err(|e| bad_map(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    if counts.len() > wrappers.len() {
        return Err(bad_map(format!(
            "{} entries, but there are only {} steps to redefine",
            counts.len(),
            wrappers.len(),
        )));
    }
    let mapped = counts.iter().sum::<usize>();
    if mapped > donor_steps.len() {
        return Err(bad_map(format!(
            "maps {mapped} steps, but there are only {}",
            donor_steps.len(),
        )));
    }
    counts.resize(wrappers.len(), 0);
    if let Some(last) = counts.last_mut() {
        *last += donor_steps.len() - mapped;
    }

    let mut steps = Vec::with_capacity(background.len() + wrappers.len());
    for step in background {
        let id = format!("{}#{}", receiver.id, steps.len() + 1);
        steps.push(adopt(step, id));
    }
    let mut donor_steps = donor_steps.into_iter();
    for (wrapper, count) in wrappers.into_iter().zip(counts) {
        let mut node = adopt(wrapper, format!("{}#{}", receiver.id, steps.len() + 1));
        node.node_type = if count == 0 {
            NodeType::VirtualStep
        } else {
            NodeType::Aggregator
        };
        let children = donor_steps
            .by_ref()
            .take(count)
            .enumerate()
            .map(|(n, step)| adopt(step, format!("{}.{}", node.id, n + 1)))
            .collect();
        node.set_children(children);
        steps.push(node);
    }
    Ok(steps)
}

/// Clones a step subtree under a new `id`, renaming its descendants.
fn adopt(step: &PlanNode, id: String) -> PlanNode {
    let mut node = step.clone();
    node.id = id;
    let children = node
        .children
        .iter()
        .enumerate()
        .map(|(n, child)| adopt(child, format!("{}.{}", node.id, n + 1)))
        .collect();
    node.set_children(children);
    node
}
