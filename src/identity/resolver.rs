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

//! Duplicate detection for incoming books
//!
//! A candidate is a duplicate of an existing book when both carry an ISBN
//! and the normalized ISBNs agree. Failing that, the trimmed titles must
//! match case-insensitively and the authors must share the same token set.
//! Near matches (subtitles, typos) are left to the person entering the book.

use crate::identity::author::AuthorName;
use crate::identity::isbn::normalize_isbn;
use crate::storage::models::{Book, NewBook};
use serde::{Deserialize, Serialize};

/// Outcome of resolving one candidate against the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub is_duplicate: bool,
    pub existing_book_id: Option<i64>,
}

impl Resolution {
    pub fn new_title() -> Self {
        Self {
            is_duplicate: false,
            existing_book_id: None,
        }
    }

    pub fn duplicate_of(book_id: i64) -> Self {
        Self {
            is_duplicate: true,
            existing_book_id: Some(book_id),
        }
    }
}

/// Decide NEW vs. DUPLICATE for `candidate`
///
/// An ISBN match always beats a title and author match. Within a rule,
/// `books` may come in any order; the lowest matching id wins.
pub fn resolve(candidate: &NewBook, books: &[Book]) -> Resolution {
    let candidate_isbn = candidate.isbn.as_deref().and_then(normalize_isbn);
    let candidate_title = normalize_title(&candidate.title);

    lowest_id(books, |book| matches_isbn(candidate_isbn.as_deref(), book))
        .or_else(|| lowest_id(books, |book| matches_title_and_author(&candidate_title, &candidate.author, book)))
        .map(Resolution::duplicate_of)
        .unwrap_or_else(Resolution::new_title)
}

fn lowest_id(books: &[Book], matches: impl Fn(&Book) -> bool) -> Option<i64> {
    books.iter().filter(|book| matches(book)).map(|book| book.id).min()
}

fn matches_isbn(candidate_isbn: Option<&str>, book: &Book) -> bool {
    let Some(candidate_isbn) = candidate_isbn else {
        return false;
    };

    // Prefer the stored normalization, fall back to the raw column
    let existing = book
        .isbn13
        .clone()
        .or_else(|| book.isbn.as_deref().and_then(normalize_isbn));

    existing.as_deref() == Some(candidate_isbn)
}

fn matches_title_and_author(candidate_title: &str, candidate_author: &AuthorName, book: &Book) -> bool {
    !candidate_title.is_empty()
        && normalize_title(&book.title) == candidate_title
        && book.author_name().same_author(candidate_author)
}

fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}
