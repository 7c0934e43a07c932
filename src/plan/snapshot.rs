// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Persisted form of a [`PlanNode`] tree.

use std::{collections::BTreeMap, time::SystemTime};

use serde::{Deserialize, Serialize};

use crate::parser::StepArgument;

use super::{ExecutionState, NodeType, Outcome, PlanNode};

/// Serializable mirror of a [`PlanNode`].
///
/// Composite nodes carry their derived instants and result for the
/// convenience of consumers, but those are ignored when restoring a tree.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// [`PlanNode::id`].
    pub id: String,

    /// [`PlanNode::node_type`].
    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// [`PlanNode::name`].
    pub name: String,

    /// [`PlanNode::language`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// [`PlanNode::keyword`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,

    /// [`PlanNode::tags`].
    #[serde(default)]
    pub tags: Vec<String>,

    /// [`PlanNode::properties`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// [`PlanNode::data`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StepArgument>,

    /// [`PlanNode::start_instant()`].
    #[serde(default, skip_serializing_if = "Option::is_none", with = "rfc3339")]
    pub start_instant: Option<SystemTime>,

    /// [`PlanNode::finish_instant()`].
    #[serde(default, skip_serializing_if = "Option::is_none", with = "rfc3339")]
    pub finish_instant: Option<SystemTime>,

    /// [`PlanNode::result()`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Outcome>,

    /// Failure message of a leaf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Children snapshots.
    #[serde(default)]
    pub children: Vec<Snapshot>,
}

impl From<&PlanNode> for Snapshot {
    fn from(node: &PlanNode) -> Self {
        Self {
            id: node.id.clone(),
            node_type: node.node_type,
            name: node.name.clone(),
            language: node.language.clone(),
            keyword: node.keyword.clone(),
            tags: node.tags.iter().cloned().collect(),
            properties: node.properties.clone(),
            data: node.data.clone(),
            start_instant: node.start_instant(),
            finish_instant: node.finish_instant(),
            result: node.result(),
            error_message: node
                .state
                .as_ref()
                .and_then(|s| s.message.clone()),
            children: node.children.iter().map(Self::from).collect(),
        }
    }
}

impl From<Snapshot> for PlanNode {
    fn from(snapshot: Snapshot) -> Self {
        let mut node =
            Self::new(snapshot.id, snapshot.node_type, snapshot.name);
        node.language = snapshot.language;
        node.keyword = snapshot.keyword;
        node.tags = snapshot.tags.into_iter().collect();
        node.properties = snapshot.properties;
        node.data = snapshot.data;

        let ran = snapshot.start_instant.is_some()
            || snapshot.result.is_some()
            || snapshot.error_message.is_some();
        if snapshot.children.is_empty() && ran {
            node.state = Some(ExecutionState {
                start: snapshot.start_instant,
                finish: snapshot.finish_instant,
                result: snapshot.result,
                message: snapshot.error_message,
                cause: None,
            });
        }
        node.set_children(
            snapshot.children.into_iter().map(Self::from).collect(),
        );
        node
    }
}

/// Serializes the given `plan` as JSON.
///
/// # Errors
///
/// Never in practice, as every field is representable in JSON.
pub fn to_json(plan: &PlanNode) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Snapshot::from(plan))
}

/// Restores a plan from its JSON snapshot.
///
/// # Errors
///
/// If the `json` is not a valid snapshot.
pub fn from_json(json: &str) -> serde_json::Result<PlanNode> {
    serde_json::from_str::<Snapshot>(json).map(PlanNode::from)
}

/// RFC 3339 instants with nanosecond precision.
mod rfc3339 {
    use std::time::{Duration, SystemTime};

    use serde::{de, ser, Deserialize as _, Deserializer, Serializer};

    /// `9999-12-31T23:59:59Z`, the last instant RFC 3339 can express.
    const MAX_SECS: u64 = 253_402_300_799;

    pub(super) fn serialize<S: Serializer>(
        instant: &Option<SystemTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let Some(at) = *instant else {
            return serializer.serialize_none();
        };
        let representable = at
            .duration_since(SystemTime::UNIX_EPOCH)
            .is_ok_and(|d| d < Duration::from_secs(MAX_SECS + 1));
        if !representable {
            return Err(ser::Error::custom(format!(
                "{at:?} is out of the RFC 3339 range",
            )));
        }
        serializer.collect_str(&humantime::format_rfc3339_nanos(at))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SystemTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| humantime::parse_rfc3339(&s).map_err(de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    fn plan() -> PlanNode {
        let mut root = PlanNode::root();
        let feature =
            root.add_child(PlanNode::new("1:f", NodeType::Aggregator, "f"));
        let _ = feature.tags.insert("smoke".into());
        let case = feature
            .add_child(PlanNode::new("1:f.1:c", NodeType::TestCase, "c"));
        case.set_property("owner", "kitchen");
        let step =
            case.add_child(PlanNode::new("1:f.1:c#1", NodeType::Step, "one"));
        step.state = Some(ExecutionState {
            start: Some(
                SystemTime::UNIX_EPOCH + Duration::new(60, 123_456_789),
            ),
            finish: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(120)),
            result: Some(Outcome::Failed),
            message: Some("expected 7".into()),
            cause: Some(std::sync::Arc::new(anyhow::anyhow!("boom"))),
        });
        let _ =
            case.add_child(PlanNode::new("1:f.1:c#2", NodeType::Step, "two"));
        root
    }

    #[test]
    fn round_trips() {
        let plan = plan();

        let restored = from_json(&to_json(&plan).unwrap()).unwrap();

        assert_eq!(restored, plan);
        assert!(restored
            .find("1:f.1:c#1")
            .and_then(|n| n.state.as_ref())
            .is_some_and(|s| s.cause.is_none()));
    }

    #[test]
    fn writes_derived_values_and_rfc3339() {
        let json: serde_json::Value =
            serde_json::from_str(&to_json(&plan()).unwrap()).unwrap();

        let case = &json["children"][0]["children"][0];
        assert_eq!(case["type"], "TEST_CASE");
        assert_eq!(case["result"], "FAILED");
        assert_eq!(case["startInstant"], "1970-01-01T00:01:00.123456789Z");
        assert_eq!(case["finishInstant"], "1970-01-01T00:02:00.000000000Z");
        assert_eq!(case["children"][0]["errorMessage"], "expected 7");
        assert!(case["children"][1].get("result").is_none());
    }

    #[test]
    fn rejects_instants_before_the_epoch() {
        let mut plan = plan();
        if let Some(state) =
            plan.find_mut("1:f.1:c#1").and_then(|n| n.state.as_mut())
        {
            state.start = Some(SystemTime::UNIX_EPOCH - Duration::from_secs(1));
        }

        let err = to_json(&plan).unwrap_err();

        assert!(err.to_string().contains("out of the RFC 3339 range"), "{err}");
    }
}
