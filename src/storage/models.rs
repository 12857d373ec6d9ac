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

//! Database models
//!
//! # SQLite Adaptations
//! - Statuses stored as TEXT (`AVAILABLE`, `CHECKED_OUT`, `OPEN`, `RETURNED`)
//! - DateTime stored as TEXT in RFC 3339 format
//! - Author stored as the display string plus optional first/last columns
//! - `total_copies` / `available_copies` are computed by the `book_inventory` view
//! - Checkout titles come from the live book when it exists, else from the
//!   snapshot taken at checkout time (`checkout_records` view)

use crate::identity::author::AuthorName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// ENUMS
// ============================================================================

/// Availability of one physical copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopyStatus {
    Available,
    CheckedOut,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Available => "AVAILABLE",
            CopyStatus::CheckedOut => "CHECKED_OUT",
        }
    }
}

/// Checkout lifecycle: OPEN -> RETURNED, nothing else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStatus {
    Open,
    Returned,
}

impl CheckoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::Open => "OPEN",
            CheckoutStatus::Returned => "RETURNED",
        }
    }
}

// ============================================================================
// MAIN ENTITIES
// ============================================================================

/// Title-level catalog entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    /// Display form of the author
    pub author: String,
    #[sqlx(default)]
    pub author_first_name: Option<String>,
    #[sqlx(default)]
    pub author_last_name: Option<String>,
    /// ISBN as entered
    #[sqlx(default)]
    pub isbn: Option<String>,
    /// Normalized 13-digit ISBN used for matching and scanner returns
    #[sqlx(default)]
    pub isbn13: Option<String>,
    #[sqlx(default)]
    pub genre: Option<String>,
    #[sqlx(default)]
    pub subject: Option<String>,
    /// Free-form, lookups report anything from "1965" to "1965-08-01"
    #[sqlx(default)]
    pub published_date: Option<String>,
    #[sqlx(default)]
    pub page_count: Option<i64>,
    #[sqlx(default)]
    pub cover_image_url: Option<String>,
    #[sqlx(default)]
    pub reading_level: Option<String>,
    #[sqlx(default)]
    pub lexile_score: Option<i64>,
    #[sqlx(default)]
    pub ar_points: Option<f64>,

    // Derived by the book_inventory view
    pub total_copies: i64,
    pub available_copies: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Author in its structured form
    pub fn author_name(&self) -> AuthorName {
        AuthorName::from_parts(
            Some(&self.author),
            self.author_first_name.as_deref(),
            self.author_last_name.as_deref(),
        )
    }

    pub fn checked_out_copies(&self) -> i64 {
        self.total_copies - self.available_copies
    }
}

/// One physical, lendable unit of a book
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BookCopy {
    pub id: i64,
    pub book_id: i64,
    pub copy_number: i64,
    pub status: CopyStatus,
    /// Optimistic concurrency token, bumped on every status change
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl BookCopy {
    pub fn is_available(&self) -> bool {
        self.status == CopyStatus::Available
    }
}

/// Lending record, never deleted
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Checkout {
    pub id: i64,
    pub book_copy_id: i64,
    pub book_id: i64,
    pub copy_number: i64,
    pub book_title: String,
    pub student_id: i64,
    #[sqlx(default)]
    pub class_id: Option<i64>,
    pub checkout_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[sqlx(default)]
    pub returned_date: Option<DateTime<Utc>>,
    pub status: CheckoutStatus,
}

impl Checkout {
    pub fn is_open(&self) -> bool {
        self.status == CheckoutStatus::Open
    }
}

/// Library-wide circulation settings (single row)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LibrarySettings {
    pub default_due_days: i64,
    pub max_checkout_books: i64,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            default_due_days: crate::config::DEFAULT_DUE_DAYS as i64,
            max_checkout_books: crate::config::DEFAULT_MAX_CHECKOUT_BOOKS as i64,
        }
    }
}

// ============================================================================
// NEW RECORD STRUCTS (for inserts)
// ============================================================================

/// Candidate book, from the manual form, an ISBN lookup or a search result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    #[serde(default)]
    pub author: AuthorName,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub page_count: Option<i64>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub reading_level: Option<String>,
    #[serde(default)]
    pub lexile_score: Option<i64>,
    #[serde(default)]
    pub ar_points: Option<f64>,
}

impl NewBook {
    pub fn new<S: Into<String>>(title: S, author: AuthorName) -> Self {
        Self {
            title: title.into(),
            author,
            ..Default::default()
        }
    }

    pub fn with_isbn<S: Into<String>>(mut self, isbn: S) -> Self {
        self.isbn = Some(isbn.into());
        self
    }
}

/// Field-level metadata update
///
/// `None` leaves a field untouched. For optional text fields an empty
/// string clears the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<AuthorName>,
    pub isbn: Option<String>,
    pub genre: Option<String>,
    pub subject: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<i64>,
    pub cover_image_url: Option<String>,
    pub reading_level: Option<String>,
    pub lexile_score: Option<i64>,
    pub ar_points: Option<f64>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.isbn.is_none()
            && self.genre.is_none()
            && self.subject.is_none()
            && self.published_date.is_none()
            && self.page_count.is_none()
            && self.cover_image_url.is_none()
            && self.reading_level.is_none()
            && self.lexile_score.is_none()
            && self.ar_points.is_none()
    }
}

/// New checkout record for insertion
#[derive(Debug, Clone)]
pub struct NewCheckout {
    pub book_copy_id: i64,
    pub book_id: i64,
    pub copy_number: i64,
    pub book_title: String,
    pub student_id: i64,
    pub class_id: Option<i64>,
    pub checkout_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}
