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

//! Book identity
//!
//! Candidates reach the catalog from three places: the manual entry form,
//! an ISBN lookup and a title/author search. This module decides whether a
//! candidate is a title the library already owns.

pub mod author;
pub mod isbn;
pub mod resolver;

pub use author::AuthorName;
pub use isbn::{ean13_check_digit, normalize_isbn, same_isbn, Isbn13};
pub use resolver::{resolve, Resolution};

/// A book offered for inclusion in the catalog
pub type Candidate = crate::storage::models::NewBook;
