// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Line-oriented [`Document`] parser collecting every syntax error.

use std::{mem, path::Path};

use lazy_regex::regex_captures;

use super::{
    ast::{
        Background, Comment, DataTable, Document, Examples, Feature,
        Location, Scenario, Step, StepArgument, StepKind,
    },
    keywords::{self, Keywords, Section, StepKeyword},
    ParseError, SyntaxError,
};

/// Section the parser is currently filling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Context {
    /// Nothing seen yet.
    Start,

    /// Inside the `Feature` header, before any section.
    Feature,

    /// Inside the `Background`.
    Background,

    /// Inside the last `Scenario` or `Scenario Outline`.
    Scenario,

    /// Inside the last `Examples` of the last outline.
    Examples,

    /// Inside a malformed section, whose content is skipped.
    Ignored,
}

/// Doc string being read.
#[derive(Debug)]
struct OpenDocString {
    delimiter: &'static str,
    indent: usize,
    content_type: Option<String>,
    lines: Vec<String>,
    location: Location,
}

/// State of a single document parse.
#[derive(Debug)]
pub(super) struct DocumentParser {
    keywords: &'static Keywords,
    content_seen: bool,
    feature: Option<Feature>,
    context: Context,
    tags: Vec<String>,
    tags_location: Option<Location>,
    comments: Vec<Comment>,
    doc_string: Option<OpenDocString>,
    step_kind: Option<StepKind>,
    errors: Vec<SyntaxError>,
}

impl DocumentParser {
    /// Creates a parser recognizing keywords of the `language` by default.
    pub(super) fn new(language: &str) -> Self {
        let mut errors = Vec::new();
        let keywords = keywords::for_language(language).unwrap_or_else(|| {
            errors.push(SyntaxError::new(
                Location::new(1, 1),
                format!("unsupported default language `{language}`"),
            ));
            &keywords::EN
        });
        Self {
            keywords,
            content_seen: false,
            feature: None,
            context: Context::Start,
            tags: Vec::new(),
            tags_location: None,
            comments: Vec::new(),
            doc_string: None,
            step_kind: None,
            errors,
        }
    }

    /// Parses the whole `text`.
    pub(super) fn parse(
        mut self,
        text: &str,
        path: Option<&Path>,
    ) -> Result<Document, ParseError> {
        for (n, line) in text.lines().enumerate() {
            self.line(line, n + 1);
        }
        self.finish(path)
    }

    fn error(&mut self, location: Location, message: impl Into<String>) {
        self.errors.push(SyntaxError::new(location, message));
    }

    fn line(&mut self, raw: &str, number: usize) {
        let line = raw.trim();
        let indent = raw.len() - raw.trim_start().len();
        let location =
            Location::new(number, raw[..indent].chars().count() + 1);

        if self.doc_string.is_some() {
            self.doc_string_line(raw, line, indent);
            return;
        }
        if line.is_empty() {
            return;
        }
        if let Some(comment) = line.strip_prefix('#') {
            self.comment(line, comment, location);
            return;
        }
        self.content_seen = true;

        if line.starts_with('@') {
            self.tag_line(line, location);
        } else if line.starts_with('|') {
            self.table_row(line, location);
        } else if let Some(delimiter) =
            ["\"\"\"", "```"].into_iter().find(|d| line.starts_with(d))
        {
            self.open_doc_string(line, delimiter, indent, location);
        } else if let Some((section, keyword, name)) =
            self.keywords.section(line)
        {
            self.section(section, keyword, name, location);
        } else if let Some((kind, keyword, text)) = self.keywords.step(line) {
            self.step(kind, keyword, text, location);
        } else {
            self.text(line, location);
        }
    }

    fn comment(&mut self, line: &str, text: &str, location: Location) {
        if let Some((_, language)) =
            regex_captures!(r"^#\s*language\s*:\s*([\w-]+)\s*$", line)
        {
            if !self.content_seen {
                match keywords::for_language(language) {
                    Some(keywords) => self.keywords = keywords,
                    None => self.error(
                        location,
                        format!("unsupported language `{language}`"),
                    ),
                }
                return;
            }
        }
        self.comments.push(Comment {
            text: text.trim().to_owned(),
            location,
        });
    }

    fn tag_line(&mut self, line: &str, location: Location) {
        for token in line.split_whitespace() {
            if token.starts_with('#') {
                break;
            }
            match token.strip_prefix('@').filter(|t| !t.is_empty()) {
                Some(tag) => {
                    if !self.tags.iter().any(|t| t == tag) {
                        self.tags.push(tag.to_owned());
                    }
                }
                None => {
                    self.error(location, format!("invalid tag `{token}`"));
                }
            }
        }
        self.tags_location.get_or_insert(location);
    }

    /// Reports tags not followed by a taggable element.
    fn reject_tags(&mut self) {
        if let Some(location) = self.tags_location.take() {
            self.tags.clear();
            self.error(
                location,
                "tags must precede a feature, scenario or examples",
            );
        }
    }

    fn take_tags(&mut self) -> Vec<String> {
        self.tags_location = None;
        mem::take(&mut self.tags)
    }

    fn section(
        &mut self,
        section: Section,
        keyword: &str,
        name: &str,
        location: Location,
    ) {
        self.step_kind = None;
        if section == Section::Background {
            self.reject_tags();
        }
        let tags = self.take_tags();
        let comments = mem::take(&mut self.comments);
        let keyword = keyword.to_owned();
        let name = name.to_owned();

        if section == Section::Feature {
            if self.feature.is_some() {
                self.error(location, "only one feature per document");
                self.context = Context::Ignored;
            } else {
                self.feature = Some(Feature {
                    keyword,
                    name,
                    tags,
                    comments,
                    location,
                    ..Feature::default()
                });
                self.context = Context::Feature;
            }
            return;
        }

        let context = self.context;
        let Some(feature) = self.feature.as_mut() else {
            self.error(location, format!("`{keyword}` outside of a feature"));
            self.context = Context::Ignored;
            return;
        };

        self.context = match section {
            Section::Feature => unreachable!("handled above"),
            Section::Background => {
                if feature.background.is_some() {
                    self.errors.push(SyntaxError::new(
                        location,
                        "only one background per feature",
                    ));
                    Context::Ignored
                } else if !feature.scenarios.is_empty() {
                    self.errors.push(SyntaxError::new(
                        location,
                        "background must precede every scenario",
                    ));
                    Context::Ignored
                } else {
                    feature.background = Some(Background {
                        keyword,
                        name,
                        comments,
                        location,
                        ..Background::default()
                    });
                    Context::Background
                }
            }
            Section::Scenario | Section::ScenarioOutline => {
                feature.scenarios.push(Scenario {
                    keyword,
                    name,
                    tags,
                    comments,
                    location,
                    outline: section == Section::ScenarioOutline,
                    ..Scenario::default()
                });
                Context::Scenario
            }
            Section::Examples => {
                let outline = feature
                    .scenarios
                    .last_mut()
                    .filter(|s| s.outline)
                    .filter(|_| {
                        matches!(context, Context::Scenario | Context::Examples)
                    });
                if let Some(outline) = outline {
                    outline.examples.push(Examples {
                        keyword,
                        name,
                        tags,
                        comments,
                        location,
                        ..Examples::default()
                    });
                    Context::Examples
                } else {
                    self.errors.push(SyntaxError::new(
                        location,
                        format!("`{keyword}` outside of a scenario outline"),
                    ));
                    Context::Ignored
                }
            }
        };
    }

    fn steps_mut(&mut self) -> Option<&mut Vec<Step>> {
        let feature = self.feature.as_mut()?;
        match self.context {
            Context::Background => {
                feature.background.as_mut().map(|b| &mut b.steps)
            }
            Context::Scenario => {
                feature.scenarios.last_mut().map(|s| &mut s.steps)
            }
            Context::Start
            | Context::Feature
            | Context::Examples
            | Context::Ignored => None,
        }
    }

    fn step(
        &mut self,
        kind: StepKeyword,
        keyword: &str,
        text: &str,
        location: Location,
    ) {
        self.reject_tags();
        let kind = match kind {
            StepKeyword::Kind(kind) => kind,
            StepKeyword::Conjunction => self.step_kind.unwrap_or_default(),
        };
        self.step_kind = Some(kind);
        let step = Step {
            keyword: keyword.to_owned(),
            kind,
            text: text.to_owned(),
            argument: None,
            comments: mem::take(&mut self.comments),
            location,
        };

        match self.context {
            Context::Ignored => {}
            Context::Examples => {
                self.error(location, "steps must precede the examples");
            }
            Context::Start | Context::Feature => {
                self.error(location, "step outside of a scenario");
            }
            Context::Background | Context::Scenario => {
                if let Some(steps) = self.steps_mut() {
                    steps.push(step);
                }
            }
        }
    }

    fn table_row(&mut self, line: &str, location: Location) {
        self.reject_tags();
        let Some(cells) = split_cells(line) else {
            self.error(location, "table row must end with `|`");
            return;
        };

        let table = match self.context {
            Context::Ignored => return,
            Context::Examples => self
                .feature
                .as_mut()
                .and_then(|f| f.scenarios.last_mut())
                .and_then(|s| s.examples.last_mut())
                .map(|e| e.table.get_or_insert_with(DataTable::default)),
            Context::Background | Context::Scenario => self
                .steps_mut()
                .and_then(|steps| steps.last_mut())
                .and_then(|step| {
                    match step.argument.get_or_insert_with(|| {
                        StepArgument::Table(DataTable::default())
                    }) {
                        StepArgument::Table(table) => Some(table),
                        StepArgument::DocString { .. } => None,
                    }
                }),
            Context::Start | Context::Feature => None,
        };
        let Some(table) = table else {
            self.error(location, "table row outside of a step or examples");
            return;
        };

        match table.rows.first().map(Vec::len) {
            Some(width) if width != cells.len() => {
                self.error(
                    location,
                    format!(
                        "table row has {} cells, but {width} were expected",
                        cells.len(),
                    ),
                );
            }
            _ => table.rows.push(cells),
        }
    }

    fn open_doc_string(
        &mut self,
        line: &str,
        delimiter: &'static str,
        indent: usize,
        location: Location,
    ) {
        self.reject_tags();
        let content_type = line[delimiter.len()..].trim();
        self.doc_string = Some(OpenDocString {
            delimiter,
            indent,
            content_type: (!content_type.is_empty())
                .then(|| content_type.to_owned()),
            lines: Vec::new(),
            location,
        });
    }

    fn doc_string_line(&mut self, raw: &str, line: &str, indent: usize) {
        let Some(open) = self.doc_string.as_mut() else {
            return;
        };
        if line != open.delimiter {
            let strip = indent.min(open.indent);
            open.lines
                .push(raw.get(strip..).unwrap_or(raw.trim_start()).to_owned());
            return;
        }

        let Some(open) = self.doc_string.take() else {
            return;
        };
        let argument = StepArgument::DocString {
            content_type: open.content_type,
            content: open.lines.join("\n"),
        };
        if self.context == Context::Ignored {
            return;
        }
        match self.steps_mut().and_then(|steps| steps.last_mut()) {
            Some(step) if step.argument.is_none() => {
                step.argument = Some(argument);
            }
            Some(_) => self.error(
                open.location,
                "step already has a doc string or data table",
            ),
            None => self.error(open.location, "doc string outside of a step"),
        }
    }

    fn text(&mut self, line: &str, location: Location) {
        self.reject_tags();
        let Some(feature) = self.feature.as_mut() else {
            if self.context != Context::Ignored {
                self.error(location, format!("expected a feature, found `{line}`"));
                self.context = Context::Ignored;
            }
            return;
        };

        let description = match self.context {
            Context::Feature => Some(&mut feature.description),
            Context::Background => feature
                .background
                .as_mut()
                .filter(|b| b.steps.is_empty())
                .map(|b| &mut b.description),
            Context::Scenario => feature
                .scenarios
                .last_mut()
                .filter(|s| s.steps.is_empty())
                .map(|s| &mut s.description),
            Context::Examples => feature
                .scenarios
                .last_mut()
                .and_then(|s| s.examples.last_mut())
                .filter(|e| e.table.is_none())
                .map(|e| &mut e.description),
            Context::Start | Context::Ignored => return,
        };
        match description {
            Some(description) => {
                if !description.is_empty() {
                    description.push('\n');
                }
                description.push_str(line);
            }
            None => self.errors.push(SyntaxError::new(
                location,
                format!("unexpected text `{line}`"),
            )),
        }
    }

    fn finish(mut self, path: Option<&Path>) -> Result<Document, ParseError> {
        if let Some(open) = self.doc_string.take() {
            self.error(open.location, "unterminated doc string");
        }
        if let Some(location) = self.tags_location.take() {
            self.error(location, "tags at the end of the document");
        }
        if !self.errors.is_empty() {
            self.errors.sort_by_key(|e| e.location);
            return Err(ParseError {
                path: path.map(Path::to_path_buf),
                errors: self.errors,
            });
        }
        Ok(Document {
            path: path.map(Path::to_path_buf),
            language: self.keywords.language.to_owned(),
            feature: self.feature,
            comments: self.comments,
        })
    }
}

/// Splits a `| a | b |` row into trimmed cells, unescaping `\|`, `\\` and
/// `\n`.
///
/// Returns [`None`] if the row is not closed by a `|`.
fn split_cells(row: &str) -> Option<Vec<String>> {
    let row = row.strip_prefix('|')?;
    let (mut cells, mut start, mut escaped) = (Vec::new(), 0, false);
    for (i, c) in row.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '|' => {
                cells.push(unescape(row[start..i].trim()));
                start = i + 1;
            }
            _ => {}
        }
    }
    // The row must end with an unescaped separator.
    (start == row.len() && !cells.is_empty()).then_some(cells)
}

/// Decodes the `\n`, `\|` and `\\` escapes of a table cell, keeping any
/// other backslash as is.
fn unescape(raw: &str) -> String {
    let (mut cell, mut chars) = (String::with_capacity(raw.len()), raw.chars());
    while let Some(c) = chars.next() {
        if c != '\\' {
            cell.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => cell.push('\n'),
            Some(e @ ('|' | '\\')) => cell.push(e),
            Some(other) => {
                cell.push('\\');
                cell.push(other);
            }
            None => cell.push('\\'),
        }
    }
    cell
}
