// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! Tag expressions filtering test cases, like `@smoke and not @wip`.

#[doc(no_inline)]
pub use gherkin::tagexpr::TagOperation;
use sealed::sealed;

/// Extension of a [`TagOperation`] allowing to evaluate it against the tags
/// of a test case, and to write it back as an expression.
#[sealed]
pub trait Ext {
    /// Evaluates this [`TagOperation`] for the given `tags`.
    ///
    /// Tags may be given with or without their leading `@`.
    #[must_use]
    fn eval<I, S>(&self, tags: I) -> bool
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S> + Clone;

    /// Writes this [`TagOperation`] as a fully parenthesized expression,
    /// parsing back to the same operation.
    #[must_use]
    fn expression(&self) -> String;
}

#[sealed]
impl Ext for TagOperation {
    fn eval<I, S>(&self, tags: I) -> bool
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S> + Clone,
    {
        match self {
            Self::And(l, r) => l.eval(tags.clone()) && r.eval(tags),
            Self::Or(l, r) => l.eval(tags.clone()) || r.eval(tags),
            Self::Not(t) => !t.eval(tags),
            Self::Tag(t) => {
                let t = t.trim_start_matches('@');
                tags.into_iter()
                    .any(|tag| tag.as_ref().trim_start_matches('@') == t)
            }
        }
    }

    fn expression(&self) -> String {
        match self {
            Self::And(l, r) => {
                format!("({} and {})", l.expression(), r.expression())
            }
            Self::Or(l, r) => format!("({} or {})", l.expression(), r.expression()),
            Self::Not(t) => format!("not {}", t.expression()),
            Self::Tag(t) => format!("@{}", t.trim_start_matches('@')),
        }
    }
}
