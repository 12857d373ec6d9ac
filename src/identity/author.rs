// Circulation Core - School Library Circulation Engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Author names
//!
//! Authors arrive either as one free-text string ("Frank Herbert",
//! "Herbert, Frank") or as a first/last pair from the manual entry form.
//! Both shapes reduce to the same lowercase token set, which is what
//! equality compares.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

lazy_static! {
    static ref TOKEN_SEPARATOR: Regex = Regex::new(r"[^\p{L}\p{N}]+").unwrap();
}

/// Author in either of the two shapes the system accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorName {
    Combined { name: String },
    Split { first: String, last: String },
}

impl AuthorName {
    pub fn combined<S: Into<String>>(name: S) -> Self {
        AuthorName::Combined { name: name.into() }
    }

    pub fn split<F: Into<String>, L: Into<String>>(first: F, last: L) -> Self {
        AuthorName::Split {
            first: first.into(),
            last: last.into(),
        }
    }

    /// Rebuild from stored or submitted columns
    ///
    /// A first or last name wins over the combined string. Missing parts
    /// become empty strings.
    pub fn from_parts(
        combined: Option<&str>,
        first: Option<&str>,
        last: Option<&str>,
    ) -> Self {
        let first = first.map(str::trim).unwrap_or_default();
        let last = last.map(str::trim).unwrap_or_default();
        if !first.is_empty() || !last.is_empty() {
            AuthorName::split(first, last)
        } else {
            AuthorName::combined(combined.map(str::trim).unwrap_or_default())
        }
    }

    /// Name as shown to people, "First Last" for split names
    pub fn display(&self) -> String {
        match self {
            AuthorName::Combined { name } => name.trim().to_string(),
            AuthorName::Split { first, last } => {
                let first = first.trim();
                let last = last.trim();
                match (first.is_empty(), last.is_empty()) {
                    (false, false) => format!("{} {}", first, last),
                    (false, true) => first.to_string(),
                    (true, false) => last.to_string(),
                    (true, true) => String::new(),
                }
            }
        }
    }

    pub fn first_name(&self) -> Option<&str> {
        match self {
            AuthorName::Split { first, .. } => Some(first.as_str()),
            AuthorName::Combined { .. } => None,
        }
    }

    pub fn last_name(&self) -> Option<&str> {
        match self {
            AuthorName::Split { last, .. } => Some(last.as_str()),
            AuthorName::Combined { .. } => None,
        }
    }

    /// Lowercase word tokens, order-insensitive
    pub fn tokens(&self) -> BTreeSet<String> {
        match self {
            AuthorName::Combined { name } => tokenize(name),
            AuthorName::Split { first, last } => {
                let mut tokens = tokenize(first);
                tokens.extend(tokenize(last));
                tokens
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        self.tokens().is_empty()
    }

    /// Case-insensitive equality across both shapes
    pub fn same_author(&self, other: &AuthorName) -> bool {
        self.tokens() == other.tokens()
    }
}

impl Default for AuthorName {
    fn default() -> Self {
        AuthorName::combined("")
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    TOKEN_SEPARATOR
        .split(&text.to_lowercase())
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}
