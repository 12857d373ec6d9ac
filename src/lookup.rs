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

//! Bibliographic lookup results
//!
//! ISBN and title/author lookups are performed outside the core. Their
//! payloads are loose: any field may be missing, and authors show up as a
//! string, an object with first/last names, or a list of either.

use crate::error::{CirculationError, Result};
use crate::identity::author::AuthorName;
use crate::storage::models::NewBook;
use serde::{Deserialize, Serialize};

/// One book as reported by a lookup service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<AuthorField>,
    #[serde(default)]
    pub authors: Vec<AuthorField>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default, alias = "isbn13")]
    pub isbn_13: Option<String>,
    #[serde(default, alias = "isbn10")]
    pub isbn_10: Option<String>,
    #[serde(default, alias = "coverImage")]
    pub cover_image: Option<String>,
    #[serde(default, alias = "publishDate")]
    pub publish_date: Option<String>,
    #[serde(default, alias = "pageCount")]
    pub page_count: Option<i64>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

/// Author entry in whichever shape the lookup used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthorField {
    Name(String),
    // Tried before Parts, whose fields are all optional
    Named {
        name: String,
    },
    Parts {
        #[serde(default, alias = "firstName")]
        first_name: Option<String>,
        #[serde(default, alias = "lastName")]
        last_name: Option<String>,
    },
}

impl AuthorField {
    fn into_author_name(self) -> AuthorName {
        match self {
            AuthorField::Name(name) | AuthorField::Named { name } => AuthorName::combined(name.trim()),
            AuthorField::Parts { first_name, last_name } => {
                AuthorName::from_parts(None, first_name.as_deref(), last_name.as_deref())
            }
        }
    }

    fn display(&self) -> String {
        self.clone().into_author_name().display()
    }
}

impl LookupResult {
    /// Parse a raw JSON payload
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Best ISBN available: 13-digit, then 10-digit, then whatever was given
    pub fn best_isbn(&self) -> Option<&str> {
        [&self.isbn_13, &self.isbn_10, &self.isbn]
            .into_iter()
            .filter_map(|isbn| isbn.as_deref())
            .map(str::trim)
            .find(|isbn| !isbn.is_empty())
    }

    /// Convert into a catalog candidate
    ///
    /// # Errors
    /// `InvalidInput` when the lookup carried no title.
    pub fn into_candidate(self) -> Result<NewBook> {
        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CirculationError::invalid_input("lookup result has no title"))?
            .to_string();

        let isbn = self.best_isbn().map(String::from);

        let author = match (self.author, self.authors.len()) {
            (Some(author), _) => author.into_author_name(),
            // A lone structured author keeps its first/last split
            (None, 1) => self
                .authors
                .into_iter()
                .next()
                .map(AuthorField::into_author_name)
                .unwrap_or_default(),
            (None, _) => {
                let joined = self
                    .authors
                    .iter()
                    .map(AuthorField::display)
                    .filter(|name| !name.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                AuthorName::combined(joined)
            }
        };

        Ok(NewBook {
            title,
            author,
            isbn,
            subject: self.subjects.into_iter().map(|s| s.trim().to_string()).find(|s| !s.is_empty()),
            published_date: self.publish_date,
            page_count: self.page_count,
            cover_image_url: self.cover_image,
            ..Default::default()
        })
    }
}
