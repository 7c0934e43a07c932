// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Default [`Parser`] implementation.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{ast::Document, Error, Parser, Result};

/// Default [`Parser`], reading a single `.feature` file or every `.feature`
/// file below a directory.
///
/// Documents are returned sorted by path, so plan ids are stable across
/// runs. IO is blocking.
#[derive(Clone, Copy, Debug, Default)]
pub struct Basic;

impl Basic {
    /// Reads and parses a single file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is malformed.
    pub fn parse_path(path: &Path, language: &str) -> Result<Document> {
        let text = fs::read_to_string(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: Arc::new(e),
        })?;
        Ok(Document::parse_at(&text, Some(path), language)?)
    }

    fn walk(path: &Path) -> Result<Vec<PathBuf>> {
        let walker = globwalk::GlobWalkerBuilder::new(path, "*.feature")
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Glob(Arc::new(e)))?;
        let mut paths = walker
            .filter_map(|entry| {
                entry
                    .map_err(|e| {
                        tracing::warn!(error = %e, "skipping unreadable entry");
                    })
                    .ok()
            })
            .map(globwalk::DirEntry::into_path)
            .collect::<Vec<_>>();
        paths.sort();
        Ok(paths)
    }
}

impl<I: AsRef<Path>> Parser<I> for Basic {
    fn parse(&self, input: I, language: &str) -> Vec<Result<Document>> {
        let path = input.as_ref();
        let path = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                return vec![Err(Error::Io {
                    path: path.to_path_buf(),
                    source: Arc::new(e),
                })];
            }
        };

        if path.is_file() {
            return vec![Self::parse_path(&path, language)];
        }
        match Self::walk(&path) {
            Ok(files) => files
                .iter()
                .map(|file| Self::parse_path(file, language))
                .collect(),
            Err(e) => vec![Err(e)],
        }
    }
}
