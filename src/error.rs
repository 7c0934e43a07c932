// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Consolidated error of the engine.

use derive_more::{Display, Error, From};

use crate::{config, extension, parser, plan, step, transform};

/// Top-level error of building, transforming or validating a plan.
///
/// Step outcomes are never errors: they are recorded in the plan instead.
#[derive(Clone, Debug, Display, Error, From)]
pub enum Error {
    /// A document cannot be read or parsed.
    #[display("{_0}")]
    Parse(parser::Error),

    /// A plan cannot be built out of parsed documents.
    #[display("Failed to build plan: {_0}")]
    PlanBuild(plan::BuildError),

    /// Extensions cannot be resolved.
    #[display("Failed to resolve extensions: {_0}")]
    Extension(extension::Error),

    /// Steps cannot be compiled or resolved.
    #[display("Failed to resolve steps: {_0}")]
    Step(step::Error),

    /// A plan transformer failed.
    #[display("Failed to transform plan: {_0}")]
    Transform(transform::Error),

    /// Invalid configuration.
    #[display("Invalid configuration: {_0}")]
    Config(config::Error),
}

/// Kind of an [`Error`], for boundaries mapping errors to statuses.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Malformed document.
    Parse,

    /// Plan cannot be built.
    PlanBuild,

    /// Ambiguous or conflicting extensions.
    ExtensionResolution,

    /// Ambiguous, invalid or unknown steps.
    StepResolution,

    /// Failed plan transformation.
    Transform,

    /// Invalid configuration value.
    Config,

    /// Document cannot be read.
    Io,
}

impl Error {
    /// Returns the [`ErrorKind`] of this [`Error`], as decided where it was
    /// raised.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(parser::Error::Parse(_)) => ErrorKind::Parse,
            Self::Parse(parser::Error::Io { .. } | parser::Error::Glob(_)) => {
                ErrorKind::Io
            }
            Self::PlanBuild(plan::BuildError::Config(_))
            | Self::Transform(transform::Error::Config(_))
            | Self::Config(_) => ErrorKind::Config,
            Self::PlanBuild(_) => ErrorKind::PlanBuild,
            Self::Extension(_)
            | Self::Step(step::Error::Extension(_))
            | Self::Transform(transform::Error::Extension(_)) => {
                ErrorKind::ExtensionResolution
            }
            Self::Step(_) => ErrorKind::StepResolution,
            Self::Transform(_) => ErrorKind::Transform,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io, path::PathBuf, sync::Arc};

    use super::*;

    #[test]
    fn kinds_follow_origin() {
        let io = Error::from(parser::Error::Io {
            path: PathBuf::from("missing.feature"),
            source: Arc::new(io::Error::from(io::ErrorKind::NotFound)),
        });
        let ambiguous = Error::from(step::Error::Ambiguous {
            node: "n".into(),
            text: "t".into(),
            candidates: vec!["a".into(), "b".into()],
        });
        let cycle = Error::from(extension::Error::OverrideCycle {
            point: "reporter".into(),
            chain: vec!["a".into(), "b".into(), "a".into()],
        });
        let config = Error::from(transform::Error::Config(config::Error::InvalidProperty(
            "x".into(),
        )));

        assert_eq!(io.kind(), ErrorKind::Io);
        assert_eq!(ambiguous.kind(), ErrorKind::StepResolution);
        assert_eq!(cycle.kind(), ErrorKind::ExtensionResolution);
        assert_eq!(config.kind(), ErrorKind::Config);
    }
}
