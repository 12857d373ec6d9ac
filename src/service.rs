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

//! Library service
//!
//! One method per REST route the UI talks to. Transport, headers and
//! authentication live outside the crate; a web layer deserializes the
//! request types here, calls the method, and serializes either the result
//! or an [`ApiErrorBody`].
//!
//! | Route                                   | Method                       |
//! |-----------------------------------------|------------------------------|
//! | `POST /books`                           | [`LibraryService::add_book`] |
//! | `POST /books/add-copies`                | [`LibraryService::add_copies`] |
//! | `PATCH /books/:id`                      | [`LibraryService::update_book`] |
//! | `DELETE /books/:id`                     | [`LibraryService::delete_book`] |
//! | `POST /checkouts`                       | [`LibraryService::create_checkout`] |
//! | `PUT /checkouts/:id/return`             | [`LibraryService::return_checkout`] |
//! | `PUT /checkouts/return-by-isbn`         | [`LibraryService::return_by_isbn`] |
//! | `GET /checkouts/student/:id/current`    | [`LibraryService::student_current`] |
//! | `GET /checkouts/student/:id/history`    | [`LibraryService::student_history`] |
//! | `GET /checkouts/student/:id/detailed-history` | [`LibraryService::student_detailed_history`] |
//! | `GET /checkouts/overdue`                | [`LibraryService::overdue`] |
//! | `GET /settings`, `PUT /settings`        | [`LibraryService::get_settings`], [`LibraryService::update_settings`] |

use crate::circulation::{Circulation, CheckoutRequest, IsbnReturn, OverdueCheckout};
use crate::config::LibraryConfig;
use crate::context::RequestContext;
use crate::error::{CirculationError, ErrorKind, Result};
use crate::history::{DetailedHistoryEntry, HistoryAggregator, ReadingHistoryEntry};
use crate::inventory::InventoryLedger;
use crate::lookup::LookupResult;
use crate::storage::{queries, Book, BookPatch, Checkout, Database, LibrarySettings, NewBook};
use serde::{Deserialize, Serialize};

/// Body of `POST /books`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBookRequest {
    #[serde(flatten)]
    pub book: NewBook,
    #[serde(default = "default_copies")]
    pub copies: i64,
    /// Create a new title even when the resolver found a match
    #[serde(default)]
    pub force_new: bool,
}

fn default_copies() -> i64 {
    1
}

/// Response of `POST /books`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AddBookResponse {
    Created { book: Book },
    /// Nothing was written; the caller may add copies to the existing book
    Duplicate { existing_book_id: i64 },
}

/// Body of `POST /books/add-copies`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AddCopiesRequest {
    pub book_id: i64,
    pub copies: i64,
}

/// Body of `PUT /checkouts/return-by-isbn`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnByIsbnRequest {
    pub isbn: String,
}

/// Error shape returned across the REST boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
}

impl From<&CirculationError> for ApiErrorBody {
    fn from(error: &CirculationError) -> Self {
        Self {
            kind: error.kind(),
            message: error.user_message(),
            status: error.status_code(),
        }
    }
}

impl From<CirculationError> for ApiErrorBody {
    fn from(error: CirculationError) -> Self {
        Self::from(&error)
    }
}

/// Ledger, circulation and history over one database
#[derive(Debug, Clone)]
pub struct LibraryService {
    db: Database,
    ledger: InventoryLedger,
    circulation: Circulation,
    history: HistoryAggregator,
}

impl LibraryService {
    /// Open (or create) the database named by the configuration
    pub async fn open(config: &LibraryConfig) -> Result<Self> {
        config.validate()?;
        let db = Database::new(&config.database.path, &config.database).await?;
        Self::from_database(db, config).await
    }

    /// Wrap an already opened database
    ///
    /// Seeds the settings row from `config` if the database has none yet.
    pub async fn from_database(db: Database, config: &LibraryConfig) -> Result<Self> {
        let seed = LibrarySettings {
            default_due_days: i64::from(config.default_due_days),
            max_checkout_books: i64::from(config.max_checkout_books),
        };
        queries::seed_settings(db.pool(), &seed).await?;

        Ok(Self {
            ledger: InventoryLedger::new(db.clone()),
            circulation: Circulation::from_config(db.clone(), config),
            history: HistoryAggregator::new(db.clone()),
            db,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn circulation(&self) -> &Circulation {
        &self.circulation
    }

    pub fn history(&self) -> &HistoryAggregator {
        &self.history
    }

    // ------------------------------------------------------------------------
    // Books
    // ------------------------------------------------------------------------

    /// `POST /books`
    pub async fn add_book(&self, ctx: &RequestContext, request: &AddBookRequest) -> Result<AddBookResponse> {
        if !request.force_new {
            if let Some(existing_book_id) = self.ledger.resolve(&request.book).await?.existing_book_id {
                tracing::info!(
                    request_id = %ctx.request_id,
                    existing_book_id,
                    "candidate is a duplicate, nothing added"
                );
                return Ok(AddBookResponse::Duplicate { existing_book_id });
            }
        }

        let book = self.ledger.add_new_book(ctx, &request.book, request.copies).await?;
        Ok(AddBookResponse::Created { book })
    }

    /// Add a book straight from a lookup payload
    pub async fn add_from_lookup(
        &self,
        ctx: &RequestContext,
        result: LookupResult,
        copies: i64,
        force_new: bool,
    ) -> Result<AddBookResponse> {
        let request = AddBookRequest {
            book: result.into_candidate()?,
            copies,
            force_new,
        };
        self.add_book(ctx, &request).await
    }

    /// `POST /books/add-copies`
    pub async fn add_copies(&self, ctx: &RequestContext, request: AddCopiesRequest) -> Result<Book> {
        self.ledger
            .add_copies_to_existing_book(ctx, request.book_id, request.copies)
            .await
    }

    /// `PATCH /books/:id`
    pub async fn update_book(&self, ctx: &RequestContext, book_id: i64, patch: &BookPatch) -> Result<Book> {
        self.ledger.update_book_metadata(ctx, book_id, patch).await
    }

    /// `DELETE /books/:id`
    pub async fn delete_book(&self, ctx: &RequestContext, book_id: i64) -> Result<()> {
        self.ledger.remove_book(ctx, book_id).await
    }

    // ------------------------------------------------------------------------
    // Checkouts
    // ------------------------------------------------------------------------

    /// `POST /checkouts`
    pub async fn create_checkout(&self, ctx: &RequestContext, request: CheckoutRequest) -> Result<Checkout> {
        self.circulation.checkout_with(ctx, request).await
    }

    /// `PUT /checkouts/:id/return`
    pub async fn return_checkout(&self, ctx: &RequestContext, checkout_id: i64) -> Result<Checkout> {
        self.circulation.return_by_checkout_id(ctx, checkout_id).await
    }

    /// `PUT /checkouts/return-by-isbn`
    pub async fn return_by_isbn(&self, ctx: &RequestContext, request: &ReturnByIsbnRequest) -> Result<IsbnReturn> {
        self.circulation.return_by_isbn(ctx, &request.isbn).await
    }

    /// `GET /checkouts/student/:id/current`
    pub async fn student_current(&self, student_id: i64) -> Result<Vec<Checkout>> {
        self.circulation.list_current_for_student(student_id).await
    }

    /// `GET /checkouts/student/:id/history`
    pub async fn student_history(&self, student_id: i64) -> Result<Vec<ReadingHistoryEntry>> {
        self.history.reading_history(student_id).await
    }

    /// `GET /checkouts/student/:id/detailed-history`
    pub async fn student_detailed_history(&self, student_id: i64) -> Result<Vec<DetailedHistoryEntry>> {
        self.history.detailed_reading_history(student_id).await
    }

    /// `GET /checkouts/overdue`
    pub async fn overdue(&self, ctx: &RequestContext) -> Result<Vec<OverdueCheckout>> {
        self.circulation.list_overdue(ctx).await
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// `GET /settings`
    pub async fn get_settings(&self) -> Result<LibrarySettings> {
        self.circulation.settings().await
    }

    /// `PUT /settings`
    pub async fn update_settings(&self, ctx: &RequestContext, settings: &LibrarySettings) -> Result<LibrarySettings> {
        self.circulation.update_settings(ctx, settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Actor;
    use crate::identity::AuthorName;

    async fn service(config: &LibraryConfig) -> LibraryService {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        LibraryService::from_database(db, config).await.expect("Failed to create service")
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Actor::Staff { user_id: 3 })
    }

    fn dune_request(copies: i64) -> AddBookRequest {
        AddBookRequest {
            book: NewBook::new("Dune", AuthorName::combined("Frank Herbert")).with_isbn("0441013597"),
            copies,
            force_new: false,
        }
    }

    #[tokio::test]
    async fn test_settings_seeded_from_config() {
        let config = LibraryConfig::builder()
            .default_due_days(21)
            .max_checkout_books(2)
            .build()
            .unwrap();
        let service = service(&config).await;

        let settings = service.get_settings().await.unwrap();
        assert_eq!(settings.default_due_days, 21);
        assert_eq!(settings.max_checkout_books, 2);

        // A second open keeps the persisted row
        let again = LibraryService::from_database(service.database().clone(), &LibraryConfig::default())
            .await
            .unwrap();
        assert_eq!(again.get_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_add_book_reports_duplicate() {
        let service = service(&LibraryConfig::default()).await;

        let created = service.add_book(&ctx(), &dune_request(2)).await.unwrap();
        let book_id = match created {
            AddBookResponse::Created { book } => book.id,
            other => panic!("expected a new book, got {:?}", other),
        };

        let response = service.add_book(&ctx(), &dune_request(1)).await.unwrap();
        assert!(matches!(response, AddBookResponse::Duplicate { existing_book_id } if existing_book_id == book_id));

        let book = service
            .add_copies(&ctx(), AddCopiesRequest { book_id, copies: 1 })
            .await
            .unwrap();
        assert_eq!(book.total_copies, 3);

        let mut forced = dune_request(1);
        forced.force_new = true;
        assert!(matches!(
            service.add_book(&ctx(), &forced).await.unwrap(),
            AddBookResponse::Created { .. }
        ));
    }

    #[tokio::test]
    async fn test_add_from_lookup() {
        let service = service(&LibraryConfig::default()).await;
        service.add_book(&ctx(), &dune_request(1)).await.unwrap();

        let lookup = LookupResult::from_json(r#"{"title": "Dune", "isbn_13": "9780441013593"}"#).unwrap();
        let response = service.add_from_lookup(&ctx(), lookup, 1, false).await.unwrap();
        assert!(matches!(response, AddBookResponse::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_request_bodies_deserialize() {
        let body = r#"{"title": "Holes", "author": {"kind": "split", "first": "Louis", "last": "Sachar"}, "copies": 2}"#;
        let request: AddBookRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.book.author, AuthorName::split("Louis", "Sachar"));
        assert_eq!(request.copies, 2);
        assert!(!request.force_new);

        let checkout: CheckoutRequest = serde_json::from_str(r#"{"book_id": 1, "student_id": 2}"#).unwrap();
        assert_eq!(checkout.class_id, None);
    }

    #[tokio::test]
    async fn test_error_body() {
        let service = service(&LibraryConfig::default()).await;

        let err = service.return_checkout(&ctx(), 77).await.unwrap_err();
        let body = ApiErrorBody::from(&err);

        assert_eq!(body.kind, ErrorKind::NotFound);
        assert_eq!(body.status, 404);
        assert!(!body.message.is_empty());
    }
}
