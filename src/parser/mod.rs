// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Tools for parsing feature documents.
//!
//! Documents follow the usual [Gherkin] layout (`Feature`, `Background`,
//! `Scenario`, `Scenario Outline`, `Examples` and steps) with localized
//! keywords. Unlike most Gherkin parsers, every malformed construct of a
//! document is reported at once in a single [`ParseError`].
//!
//! [Gherkin]: https://cucumber.io/docs/gherkin/reference

pub mod ast;
pub mod basic;
mod document;
pub mod keywords;

use std::{fmt, io, path::Path, path::PathBuf, sync::Arc};

use derive_more::{Display, Error, From};
use itertools::Itertools as _;

#[doc(inline)]
pub use self::{
    ast::{
        Background, Comment, DataTable, Document, Examples, Feature, Location,
        Scenario, Step, StepArgument, StepKind,
    },
    basic::Basic,
};

/// Source of parsed [`Document`]s.
pub trait Parser<I> {
    /// Parses the given `input` into [`Document`]s, recognizing keywords of
    /// the given `language` unless a document declares its own.
    ///
    /// A malformed document yields an [`Err`] entry without affecting the
    /// other ones.
    fn parse(&self, input: I, language: &str) -> Vec<Result<Document>>;
}

/// Result of parsing documents.
pub type Result<T> = std::result::Result<T, Error>;

/// [`Parser`] error.
#[derive(Clone, Debug, Display, Error, From)]
pub enum Error {
    /// Failed to read a document.
    #[display("Failed to read `{}`: {source}", path.display())]
    Io {
        /// Path of the document.
        #[error(not(source))]
        path: PathBuf,

        /// Underlying error.
        source: Arc<io::Error>,
    },

    /// Failed to walk a directory.
    #[display("Failed to walk directory: {_0}")]
    #[from(ignore)]
    Glob(Arc<globwalk::GlobError>),

    /// Document is malformed.
    #[display("{_0}")]
    Parse(ParseError),
}

/// Single malformed construct.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display("({location}): {message}")]
pub struct SyntaxError {
    /// Where the construct is.
    pub location: Location,

    /// What is wrong.
    pub message: String,
}

impl SyntaxError {
    /// Creates a new [`SyntaxError`].
    #[must_use]
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self { location, message: message.into() }
    }
}

/// Every malformed construct of one document.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub struct ParseError {
    /// Path of the document, if parsed from disk.
    #[error(not(source))]
    pub path: Option<PathBuf>,

    /// Errors sorted by location, never empty.
    #[error(not(source))]
    pub errors: Vec<SyntaxError>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .path
            .as_deref()
            .map_or_else(|| "<text>".into(), |p| p.display().to_string());
        write!(
            f,
            "Failed to parse `{path}`, {} error(s):\n{}",
            self.errors.len(),
            self.errors.iter().map(|e| format!("  {e}")).join("\n"),
        )
    }
}

impl Document {
    /// Parses an in-memory document.
    ///
    /// # Errors
    ///
    /// With every syntax error found in the `text`.
    pub fn parse(text: &str, language: &str) -> std::result::Result<Self, ParseError> {
        Self::parse_at(text, None, language)
    }

    /// Parses a document read from the given `path`.
    ///
    /// # Errors
    ///
    /// With every syntax error found in the `text`.
    pub fn parse_at(
        text: &str,
        path: Option<&Path>,
        language: &str,
    ) -> std::result::Result<Self, ParseError> {
        let parsed = document::DocumentParser::new(language).parse(text, path);
        match &parsed {
            Ok(doc) => tracing::debug!(
                path = ?path,
                language = %doc.language,
                scenarios = doc.feature.as_ref().map_or(0, |f| f.scenarios.len()),
                "parsed document",
            ),
            Err(e) => tracing::debug!(
                path = ?path,
                errors = e.errors.len(),
                "malformed document",
            ),
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const EATING: &str = r#"
# owner: kitchen
@smoke @smoke @fast
Feature: Eating cucumbers
  As a hungry person
  I want to eat cucumbers

  Background:
    Given a basket

  # priority: high
  Scenario: eat some
    Given there are 12 cucumbers
    When I eat 5 cucumbers
    Then I should have 7 cucumbers

  @outline
  Scenario Outline: eat <eat>
    Given there are <start> cucumbers
    * a note:
      """markdown
      eaten <eat>
        indented
      """
    And the prices:
      | kind | price |
      | long | 1.5   |

    @first
    Examples: few
      | start | eat |
      | 12    | 5   |
      | 20    | 5   |
"#;

    #[test]
    fn parses_full_document() {
        let doc = Document::parse(EATING, "en").unwrap();
        let feature = doc.feature.unwrap();

        assert_eq!(doc.language, "en");
        assert_eq!(feature.name, "Eating cucumbers");
        assert_eq!(feature.tags, ["smoke", "fast"]);
        assert_eq!(feature.comments[0].text, "owner: kitchen");
        assert_eq!(
            feature.description,
            "As a hungry person\nI want to eat cucumbers",
        );
        assert_eq!(feature.location, Location::new(4, 1));
        assert_eq!(feature.background.unwrap().steps.len(), 1);

        let plain = &feature.scenarios[0];
        assert_eq!(plain.comments[0].text, "priority: high");
        assert_eq!(
            plain.steps.iter().map(|s| s.kind).collect::<Vec<_>>(),
            [StepKind::Given, StepKind::When, StepKind::Then],
        );
        assert_eq!(plain.steps[1].location, Location::new(14, 5));

        let outline = &feature.scenarios[1];
        assert!(outline.outline);
        assert_eq!(outline.tags, ["outline"]);
        assert_eq!(outline.steps[1].kind, StepKind::Given);
        assert_eq!(
            outline.steps[1].argument,
            Some(StepArgument::DocString {
                content_type: Some("markdown".into()),
                content: "eaten <eat>\n  indented".into(),
            }),
        );
        assert_eq!(
            outline.steps[2].argument,
            Some(StepArgument::Table(DataTable {
                rows: vec![
                    vec!["kind".into(), "price".into()],
                    vec!["long".into(), "1.5".into()],
                ],
            })),
        );

        let examples = &outline.examples[0];
        assert_eq!(examples.name, "few");
        assert_eq!(examples.tags, ["first"]);
        assert_eq!(examples.table.as_ref().unwrap().body().len(), 2);
    }

    #[test]
    fn language_header_switches_keywords() {
        let doc = Document::parse(
            "# language: es\n\
             Característica: Comer pepinos\n\
             \x20 Escenario: comer\n\
             \x20   Dado que hay 12 pepinos\n\
             \x20   Y como 5 pepinos\n\
             \x20   Entonces quedan 7 pepinos\n",
            "en",
        )
        .unwrap();

        assert_eq!(doc.language, "es");
        let scenario = &doc.feature.unwrap().scenarios[0];
        assert_eq!(scenario.steps[1].keyword, "Y");
        assert_eq!(scenario.steps[1].kind, StepKind::Given);
        assert_eq!(scenario.steps[2].kind, StepKind::Then);
    }

    #[test]
    fn aggregates_every_error() {
        let err = Document::parse(
            "Given a step before anything\n\
             Feature: broken\n\
             \x20 Scenario: one\n\
             \x20   Given a table\n\
             \x20     | a | b |\n\
             \x20     | c |\n\
             \x20 Examples:\n\
             \x20 Feature: again\n\
             \x20 @tag\n",
            "en",
        )
        .unwrap_err();

        assert_eq!(
            err.errors
                .iter()
                .map(|e| (e.location.line, e.message.as_str()))
                .collect::<Vec<_>>(),
            [
                (1, "step outside of a scenario"),
                (6, "table row has 1 cells, but 2 were expected"),
                (7, "`Examples` outside of a scenario outline"),
                (8, "only one feature per document"),
                (9, "tags at the end of the document"),
            ],
        );
        assert!(err.to_string().contains("5 error(s)"));
    }

    #[test]
    fn unterminated_doc_string() {
        let err = Document::parse(
            "Feature: f\n  Scenario: s\n    Given text\n      \"\"\"\n      never closed\n",
            "en",
        )
        .unwrap_err();

        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].location, Location::new(4, 7));
        assert_eq!(err.errors[0].message, "unterminated doc string");
    }

    #[test]
    fn trailing_comments_belong_to_document() {
        let doc =
            Document::parse("Feature: f\n  Scenario: s\n# the end\n", "en")
                .unwrap();

        assert_eq!(doc.comments.len(), 1);
        assert_eq!(doc.comments[0].location, Location::new(3, 1));
    }

    #[test]
    fn empty_document_has_no_feature() {
        let doc = Document::parse("\n# just a comment\n", "en").unwrap();

        assert!(doc.feature.is_none());
    }
}
