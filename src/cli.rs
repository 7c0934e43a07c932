// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Command line options converting into a [`Configuration`].
//!
//! No binary is shipped: a launcher parses [`Opts`] (or flattens them into
//! its own [`clap`] options) and hands the [`Configuration`] to a
//! [`Runner`].
//!
//! [`Runner`]: crate::Runner

use clap::Parser;

use crate::{
    config::{self, keys, Configuration},
    tag::{Ext as _, TagOperation},
    transform::Direction,
};

/// Options of a run.
#[derive(Clone, Debug, Default, Parser)]
#[command(name = "pepino", about = "Run behavior-driven test plans")]
pub struct Opts {
    /// Tag expression to filter test cases by.
    #[arg(
        id = "tags",
        long = "tags",
        short = 't',
        value_name = "tagexpr",
        global = true
    )]
    pub tags_filter: Option<TagOperation>,

    /// Language of documents without a `# language:` header.
    #[arg(long, value_name = "lang", global = true)]
    pub language: Option<String>,

    /// Skip every test case after the first one not passing.
    #[arg(long, global = true)]
    pub fail_fast: bool,

    /// Tag of definition test cases.
    #[arg(long, value_name = "tag")]
    pub definition_tag: Option<String>,

    /// Tag of implementation test cases.
    #[arg(long, value_name = "tag")]
    pub implementation_tag: Option<String>,

    /// Regex extracting the correlation id out of a tag, with one capture
    /// group.
    #[arg(long, value_name = "regex")]
    pub id_tag_pattern: Option<String>,

    /// Which test case executes the steps of the other one.
    #[arg(long, value_name = "source-takes-target|target-takes-source")]
    pub redefinition_direction: Option<Direction>,

    /// Additional configuration property.
    #[arg(
        short = 'D',
        long = "define",
        value_name = "key=value",
        value_parser = config::parse_property,
    )]
    pub properties: Vec<(String, String)>,
}

impl Opts {
    /// Shortcut for [`clap::Parser::parse()`], which doesn't require the trait
    /// being imported.
    #[must_use]
    pub fn parsed() -> Self {
        <Self as Parser>::parse()
    }

    /// Converts these [`Opts`] into a [`Configuration`].
    ///
    /// Explicit options win over `-D` properties of the same key.
    #[must_use]
    pub fn to_configuration(&self) -> Configuration {
        let builder = self
            .properties
            .iter()
            .fold(Configuration::builder(), |b, (k, v)| b.set(k, v));
        builder
            .set_opt(keys::TAG_FILTER, self.tags_filter.as_ref().map(|t| t.expression()))
            .set_opt(keys::LANGUAGE, self.language.as_ref())
            .set_opt(keys::FAIL_FAST, self.fail_fast.then_some(true))
            .set_opt(keys::DEFINITION_TAG, self.definition_tag.as_ref())
            .set_opt(keys::IMPLEMENTATION_TAG, self.implementation_tag.as_ref())
            .set_opt(keys::ID_TAG_PATTERN, self.id_tag_pattern.as_ref())
            .set_opt(keys::REDEFINITION_DIRECTION, self.redefinition_direction)
            .build()
    }
}

impl From<&Opts> for Configuration {
    fn from(opts: &Opts) -> Self {
        opts.to_configuration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_become_configuration() {
        let opts = Opts::try_parse_from([
            "pepino",
            "-t",
            "@smoke and not @slow",
            "--fail-fast",
            "-D",
            "execution.failFast=false",
            "-D",
            "db.url = jdbc:h2:mem",
            "--redefinition-direction",
            "target-takes-source",
        ])
        .unwrap();

        let conf = Configuration::from(&opts);

        assert_eq!(conf.get_raw(keys::FAIL_FAST), Some("true"));
        assert_eq!(conf.get_raw("db.url"), Some("jdbc:h2:mem"));
        assert_eq!(conf.get_raw(keys::TAG_FILTER), Some("(@smoke and not @slow)"));
        assert!(conf
            .get::<TagOperation>(keys::TAG_FILTER)
            .unwrap()
            .is_some_and(|t| t.eval(["smoke"]) && !t.eval(["smoke", "slow"])));
        assert_eq!(
            conf.get::<Direction>(keys::REDEFINITION_DIRECTION).unwrap(),
            Some(Direction::TargetTakesSource),
        );
        assert_eq!(conf.get_raw(keys::LANGUAGE), None);
    }

    #[test]
    fn malformed_properties_are_rejected() {
        assert!(Opts::try_parse_from(["pepino", "-D", "novalue"]).is_err());
        assert!(Opts::try_parse_from(["pepino", "--tags", "@a and"]).is_err());
    }
}
