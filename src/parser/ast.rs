// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Abstract syntax tree of a parsed document.

use std::path::PathBuf;

use derive_more::with_trait::Display;
use serde::{Deserialize, Serialize};

/// Position inside a source document, both 1-based.
#[derive(
    Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[display("{line}:{column}")]
pub struct Location {
    /// Line number.
    pub line: usize,

    /// Column number of the first non-blank character.
    pub column: usize,
}

impl Location {
    /// Creates a new [`Location`].
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Comment line, associated with the element following it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Comment {
    /// Text after the `#` marker, trimmed.
    pub text: String,

    /// Where the comment is.
    pub location: Location,
}

/// Parsed document: at most one [`Feature`] plus trailing comments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Document {
    /// Path of the source file, if parsed from disk.
    pub path: Option<PathBuf>,

    /// Language tag the keywords were recognized in.
    pub language: String,

    /// The [`Feature`], absent in an empty document.
    pub feature: Option<Feature>,

    /// Comments not followed by any element.
    pub comments: Vec<Comment>,
}

/// `Feature` section.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Feature {
    /// Localized keyword used.
    pub keyword: String,

    /// Name after the keyword.
    pub name: String,

    /// Free text below the header.
    pub description: String,

    /// Tags, without the leading `@`, de-duplicated.
    pub tags: Vec<String>,

    /// Comments preceding the header.
    pub comments: Vec<Comment>,

    /// Where the header is.
    pub location: Location,

    /// Steps shared by every scenario.
    pub background: Option<Background>,

    /// Scenarios and scenario outlines, in document order.
    pub scenarios: Vec<Scenario>,
}

/// `Background` section.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Background {
    /// Localized keyword used.
    pub keyword: String,

    /// Name after the keyword.
    pub name: String,

    /// Free text below the header.
    pub description: String,

    /// Comments preceding the header.
    pub comments: Vec<Comment>,

    /// Where the header is.
    pub location: Location,

    /// Steps to prepend to every scenario.
    pub steps: Vec<Step>,
}

/// `Scenario` or `Scenario Outline` section.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Scenario {
    /// Localized keyword used.
    pub keyword: String,

    /// Name after the keyword.
    pub name: String,

    /// Free text below the header.
    pub description: String,

    /// Tags, without the leading `@`, de-duplicated.
    pub tags: Vec<String>,

    /// Comments preceding the header.
    pub comments: Vec<Comment>,

    /// Where the header is.
    pub location: Location,

    /// Whether this is a template expanded with [`Examples`].
    pub outline: bool,

    /// Steps, in document order.
    pub steps: Vec<Step>,

    /// Examples of an outline.
    pub examples: Vec<Examples>,
}

/// `Examples` section of an outline.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Examples {
    /// Localized keyword used.
    pub keyword: String,

    /// Name after the keyword.
    pub name: String,

    /// Free text below the header.
    pub description: String,

    /// Tags, without the leading `@`, de-duplicated.
    pub tags: Vec<String>,

    /// Comments preceding the header.
    pub comments: Vec<Comment>,

    /// Where the header is.
    pub location: Location,

    /// Header row followed by value rows.
    pub table: Option<DataTable>,
}

/// Grammatical role of a step.
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
pub enum StepKind {
    /// Precondition.
    #[default]
    Given,

    /// Action.
    When,

    /// Outcome.
    Then,
}

/// Single step.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Step {
    /// Localized keyword used (`Given`, `And`, `*`...).
    pub keyword: String,

    /// Role, inherited from the previous step for `And`/`But`/`*`.
    pub kind: StepKind,

    /// Text after the keyword.
    pub text: String,

    /// Trailing doc string or data table.
    pub argument: Option<StepArgument>,

    /// Comments preceding the step.
    pub comments: Vec<Comment>,

    /// Where the step is.
    pub location: Location,
}

/// Data attached to a step.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum StepArgument {
    /// Multi-line text block.
    #[serde(rename_all = "camelCase")]
    DocString {
        /// Optional content type after the opening delimiter.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,

        /// Text, with the delimiter indentation removed.
        content: String,
    },

    /// Table of cells.
    Table(DataTable),
}

impl StepArgument {
    /// Replaces every `<name>` placeholder with its value.
    #[must_use]
    pub fn replace_with(
        &self,
        mut replace: impl FnMut(&str) -> String,
    ) -> Self {
        match self {
            Self::DocString { content_type, content } => Self::DocString {
                content_type: content_type.clone(),
                content: replace(content),
            },
            Self::Table(table) => Self::Table(DataTable {
                rows: table
                    .rows
                    .iter()
                    .map(|row| row.iter().map(|c| replace(c)).collect())
                    .collect(),
            }),
        }
    }
}

/// Table of string cells, all rows having the same width.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DataTable {
    /// Rows of cells.
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Returns the header row, if any.
    #[must_use]
    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Returns the rows following the header.
    #[must_use]
    pub fn body(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or_default()
    }
}
