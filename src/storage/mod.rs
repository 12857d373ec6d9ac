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

//! Database storage and models
//!
//! All circulation state lives in one SQLite database accessed through sqlx.
//!
//! # Database Schema
//! - `books`: title-level catalog entries
//! - `book_copies`: physical copies, with availability and a version counter
//! - `checkouts`: lending history, never deleted
//! - `library_settings`: loan period and per-student checkout cap
//!
//! Copy counts and checkout titles are read through the `book_inventory`
//! and `checkout_records` views.
//!
//! # Usage Example
//! ```no_run
//! use circulation_core::storage::{queries, Database, NewBook};
//! use circulation_core::identity::AuthorName;
//!
//! # async fn example() -> circulation_core::Result<()> {
//! let db = Database::new_in_memory().await?;
//!
//! let book = NewBook::new("Dune", AuthorName::split("Frank", "Herbert"));
//! let book_id = queries::insert_book(db.pool(), &book, chrono::Utc::now()).await?;
//!
//! let found = queries::find_book_by_id(db.pool(), book_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
