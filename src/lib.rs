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

//! School library circulation engine
//!
//! Builds a deduplicated book inventory and moves copies between the shelf
//! and students.
//!
//! # Modules
//! - [`identity`]: ISBN normalization, author names, duplicate detection
//! - [`lookup`]: bibliographic lookup payloads turned into candidates
//! - [`inventory`]: books and copies
//! - [`circulation`]: checkout, return, overdue
//! - [`history`]: reading history and reports
//! - [`service`]: one method per REST route
//! - [`storage`]: SQLite persistence
//!
//! # Example
//! ```no_run
//! use circulation_core::{Actor, LibraryConfig, LibraryService, RequestContext};
//! use circulation_core::service::AddBookRequest;
//! use circulation_core::identity::AuthorName;
//! use circulation_core::storage::NewBook;
//!
//! # async fn example() -> circulation_core::Result<()> {
//! let service = LibraryService::open(&LibraryConfig::default()).await?;
//! let ctx = RequestContext::new(Actor::Staff { user_id: 1 });
//!
//! let request = AddBookRequest {
//!     book: NewBook::new("Dune", AuthorName::split("Frank", "Herbert")),
//!     copies: 2,
//!     force_new: false,
//! };
//! service.add_book(&ctx, &request).await?;
//! # Ok(())
//! # }
//! ```

pub mod circulation;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod identity;
pub mod inventory;
pub mod lookup;
pub mod service;
pub mod storage;

pub use circulation::{Circulation, CheckoutRequest, IsbnReturn, OverdueCheckout, ReconciliationNotice};
pub use config::LibraryConfig;
pub use context::{Actor, RequestContext};
pub use error::{CirculationError, ErrorKind, Result};
pub use history::HistoryAggregator;
pub use inventory::{AddOutcome, InventoryLedger};
pub use service::{ApiErrorBody, LibraryService};
