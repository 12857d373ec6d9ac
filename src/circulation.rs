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

//! Circulation state machine
//!
//! A checkout is OPEN until it is returned, then RETURNED forever. This is
//! the only module that writes `book_copies.status` or touches `checkouts`.
//!
//! # Concurrency
//! - Checkouts for the same book are serialized in-process by a per-book
//!   async mutex.
//! - The copy flip itself is a compare-and-set on `(status, version)`, which
//!   also holds across processes sharing the database file. A lost CAS is
//!   retried a bounded number of times, then reported as `Conflict`.
//! - Returns are a compare-and-set on the checkout status, so two racing
//!   returns produce one success and one `AlreadyReturned`.

use crate::config::{LibraryConfig, MAX_CHECKOUT_BOOKS, MAX_DUE_DAYS};
use crate::context::RequestContext;
use crate::error::{CirculationError, Entity, ErrorKind, Result};
use crate::identity::normalize_isbn;
use crate::storage::{queries, Checkout, Database, LibrarySettings, NewCheckout};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `OPEN` and past its due date
pub fn is_overdue(checkout: &Checkout, now: DateTime<Utc>) -> bool {
    checkout.is_open() && now > checkout.due_date
}

/// Whole days past due, 0 when not overdue
pub fn days_overdue(checkout: &Checkout, now: DateTime<Utc>) -> i64 {
    if is_overdue(checkout, now) {
        (now - checkout.due_date).num_days()
    } else {
        0
    }
}

/// Checkout request with the optional class the student borrowed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub book_id: i64,
    pub student_id: i64,
    #[serde(default)]
    pub class_id: Option<i64>,
}

/// Overdue checkout with its lateness
#[derive(Debug, Clone, Serialize)]
pub struct OverdueCheckout {
    #[serde(flatten)]
    pub checkout: Checkout,
    pub days_overdue: i64,
}

/// Disclosure attached to an ISBN return that had to pick among several
/// open checkouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationNotice {
    /// Normalized 13-digit ISBN that was scanned
    pub isbn: String,
    /// Open checkouts that matched the ISBN
    pub open_checkouts: usize,
    pub chosen_checkout_id: i64,
}

impl ReconciliationNotice {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ReconciliationNotice
    }

    pub fn message(&self) -> String {
        format!(
            "{} copies with ISBN {} were checked out; returned the oldest checkout ({}). Please verify the copy.",
            self.open_checkouts, self.isbn, self.chosen_checkout_id
        )
    }
}

/// Result of a return by ISBN
#[derive(Debug, Clone, Serialize)]
pub struct IsbnReturn {
    pub checkout: Checkout,
    pub reconciliation: Option<ReconciliationNotice>,
}

impl IsbnReturn {
    pub fn reconciled(&self) -> bool {
        self.reconciliation.is_some()
    }
}

type BookLocks = Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>;

/// Checkout and return engine
#[derive(Debug, Clone)]
pub struct Circulation {
    db: Database,
    retry_attempts: u32,
    book_locks: BookLocks,
}

impl Circulation {
    pub fn new(db: Database, retry_attempts: u32) -> Self {
        Self {
            db,
            retry_attempts: retry_attempts.max(1),
            book_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(db: Database, config: &LibraryConfig) -> Self {
        Self::new(db, config.checkout_retry_attempts)
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Persisted settings, or the defaults when the row was never seeded
    pub async fn settings(&self) -> Result<LibrarySettings> {
        Ok(queries::get_settings(self.db.pool()).await?.unwrap_or_default())
    }

    pub async fn update_settings(&self, ctx: &RequestContext, settings: &LibrarySettings) -> Result<LibrarySettings> {
        if !(1..=i64::from(MAX_DUE_DAYS)).contains(&settings.default_due_days) {
            return Err(CirculationError::invalid_input(format!(
                "default_due_days must be between 1 and {}",
                MAX_DUE_DAYS
            )));
        }
        if !(1..=i64::from(MAX_CHECKOUT_BOOKS)).contains(&settings.max_checkout_books) {
            return Err(CirculationError::invalid_input(format!(
                "max_checkout_books must be between 1 and {}",
                MAX_CHECKOUT_BOOKS
            )));
        }

        queries::upsert_settings(self.db.pool(), settings, ctx.now).await?;

        tracing::info!(
            request_id = %ctx.request_id,
            actor = %ctx.actor,
            default_due_days = settings.default_due_days,
            max_checkout_books = settings.max_checkout_books,
            "updated library settings"
        );

        self.settings().await
    }

    // ------------------------------------------------------------------------
    // Checkout
    // ------------------------------------------------------------------------

    pub async fn checkout(&self, ctx: &RequestContext, book_id: i64, student_id: i64) -> Result<Checkout> {
        self.checkout_with(
            ctx,
            CheckoutRequest {
                book_id,
                student_id,
                class_id: None,
            },
        )
        .await
    }

    /// Lend the lowest-numbered available copy of a book
    ///
    /// # Errors
    /// - `NotFound` for an unknown book
    /// - `CheckoutLimitExceeded` when the student is at the cap
    /// - `NoCopiesAvailable` when every copy is out
    /// - `Conflict` when the copy CAS kept losing
    pub async fn checkout_with(&self, ctx: &RequestContext, request: CheckoutRequest) -> Result<Checkout> {
        let CheckoutRequest { book_id, student_id, .. } = request;

        let settings = self.settings().await?;
        let limit = settings.max_checkout_books;
        let due_date = ctx.days_from_now(settings.default_due_days)?;

        let book = queries::find_book_by_id(self.db.pool(), book_id)
            .await?
            .ok_or_else(|| CirculationError::not_found(Entity::Book, book_id))?;

        if queries::count_open_for_student(self.db.pool(), student_id).await? >= limit {
            return Err(limit_exceeded(student_id, limit));
        }

        let lock = self.book_lock(book_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.claim_and_record(ctx, request, &book.title, limit, due_date).await
        };
        self.release_book_lock(book_id, lock).await;

        result
    }

    /// Retry loop run while holding the book's lock
    async fn claim_and_record(
        &self,
        ctx: &RequestContext,
        request: CheckoutRequest,
        book_title: &str,
        limit: i64,
        due_date: DateTime<Utc>,
    ) -> Result<Checkout> {
        let CheckoutRequest {
            book_id,
            student_id,
            class_id,
        } = request;

        for attempt in 1..=self.retry_attempts {
            let copy = queries::first_available_copy(self.db.pool(), book_id)
                .await?
                .ok_or(CirculationError::NoCopiesAvailable { book_id })?;

            let mut tx = self.db.pool().begin().await?;

            // Write first, so the transaction holds the write lock from here on
            let claimed = match queries::claim_copy(&mut *tx, copy.id, copy.version).await {
                Ok(rows) => rows,
                Err(e) if e.is_retryable() => {
                    tracing::warn!(request_id = %ctx.request_id, book_id, attempt, error = %e, "database busy during checkout");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if claimed == 0 {
                tx.rollback().await?;
                tracing::warn!(
                    request_id = %ctx.request_id,
                    book_id,
                    copy_id = copy.id,
                    attempt,
                    "lost race for copy, retrying"
                );
                continue;
            }

            if queries::count_open_for_student(&mut *tx, student_id).await? >= limit {
                tx.rollback().await?;
                return Err(limit_exceeded(student_id, limit));
            }

            let new_checkout = NewCheckout {
                book_copy_id: copy.id,
                book_id,
                copy_number: copy.copy_number,
                book_title: book_title.to_string(),
                student_id,
                class_id,
                checkout_date: ctx.now,
                due_date,
            };
            let checkout_id = queries::insert_checkout(&mut *tx, &new_checkout).await?;

            tx.commit().await?;

            tracing::info!(
                request_id = %ctx.request_id,
                actor = %ctx.actor,
                checkout_id,
                book_id,
                copy_number = copy.copy_number,
                student_id,
                "checked out"
            );

            return self.get_checkout(checkout_id).await;
        }

        Err(CirculationError::conflict(format!(
            "could not reserve a copy of book {} after {} attempts",
            book_id, self.retry_attempts
        )))
    }

    async fn book_lock(&self, book_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.book_locks.lock().await;
        locks.entry(book_id).or_default().clone()
    }

    /// Drop the map entry once no other checkout holds or awaits it
    async fn release_book_lock(&self, book_id: i64, lock: Arc<Mutex<()>>) {
        let mut locks = self.book_locks.lock().await;
        // Clones are only taken under the map lock, so the count is stable here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&book_id);
        }
        drop(lock);
    }

    #[cfg(test)]
    async fn tracked_book_locks(&self) -> usize {
        self.book_locks.lock().await.len()
    }

    // ------------------------------------------------------------------------
    // Return
    // ------------------------------------------------------------------------

    /// Close an OPEN checkout and put its copy back on the shelf
    ///
    /// # Errors
    /// - `NotFound` for an unknown checkout
    /// - `AlreadyReturned` when it is already closed
    pub async fn return_by_checkout_id(&self, ctx: &RequestContext, checkout_id: i64) -> Result<Checkout> {
        let mut tx = self.db.pool().begin().await?;

        if queries::close_checkout(&mut *tx, checkout_id, ctx.now).await? == 0 {
            tx.rollback().await?;
            return match queries::find_checkout(self.db.pool(), checkout_id).await? {
                None => Err(CirculationError::not_found(Entity::Checkout, checkout_id)),
                Some(_) => Err(CirculationError::AlreadyReturned { checkout_id }),
            };
        }

        let checkout = queries::find_checkout(&mut *tx, checkout_id)
            .await?
            .ok_or_else(|| CirculationError::internal(format!("checkout {} vanished during return", checkout_id)))?;

        if queries::release_copy(&mut *tx, checkout.book_copy_id).await? == 0 {
            tracing::warn!(
                request_id = %ctx.request_id,
                checkout_id,
                copy_id = checkout.book_copy_id,
                "returned copy was not marked checked out"
            );
        }

        tx.commit().await?;

        tracing::info!(
            request_id = %ctx.request_id,
            actor = %ctx.actor,
            checkout_id,
            book_id = checkout.book_id,
            student_id = checkout.student_id,
            "returned"
        );

        self.get_checkout(checkout_id).await
    }

    /// Return a scanned book when only its ISBN is known
    ///
    /// The oldest open checkout (by checkout date, then id) is closed. When
    /// more than one was open the result carries a [`ReconciliationNotice`].
    pub async fn return_by_isbn(&self, ctx: &RequestContext, isbn: &str) -> Result<IsbnReturn> {
        let isbn13 = normalize_isbn(isbn).ok_or_else(|| CirculationError::not_found(Entity::Isbn, isbn))?;

        let books = queries::find_books_by_isbn13(self.db.pool(), &isbn13).await?;
        if books.is_empty() {
            return Err(CirculationError::not_found(Entity::Isbn, &isbn13));
        }

        let mut candidates = Vec::new();
        for book in &books {
            candidates.extend(queries::list_open_for_book(self.db.pool(), book.id).await?);
        }
        candidates.sort_by_key(|c| (c.checkout_date, c.id));

        let open_checkouts = candidates.len();

        for candidate in candidates {
            match self.return_by_checkout_id(ctx, candidate.id).await {
                Ok(checkout) => {
                    let reconciliation = (open_checkouts > 1).then(|| ReconciliationNotice {
                        isbn: isbn13.clone(),
                        open_checkouts,
                        chosen_checkout_id: checkout.id,
                    });

                    if let Some(notice) = &reconciliation {
                        tracing::warn!(
                            request_id = %ctx.request_id,
                            actor = %ctx.actor,
                            isbn = %notice.isbn,
                            open_checkouts,
                            checkout_id = notice.chosen_checkout_id,
                            "reconciled ISBN return"
                        );
                    }

                    return Ok(IsbnReturn { checkout, reconciliation });
                }
                // Someone else returned it first, try the next oldest
                Err(CirculationError::AlreadyReturned { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(CirculationError::NotFound {
            entity: Entity::Isbn,
            id: format!("{} (no copy checked out)", isbn13),
        })
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn get_checkout(&self, checkout_id: i64) -> Result<Checkout> {
        queries::find_checkout(self.db.pool(), checkout_id)
            .await?
            .ok_or_else(|| CirculationError::not_found(Entity::Checkout, checkout_id))
    }

    pub async fn list_open(&self) -> Result<Vec<Checkout>> {
        queries::list_open_checkouts(self.db.pool()).await
    }

    pub async fn list_current_for_student(&self, student_id: i64) -> Result<Vec<Checkout>> {
        queries::list_open_for_student(self.db.pool(), student_id).await
    }

    pub async fn list_current_for_class(&self, class_id: i64) -> Result<Vec<Checkout>> {
        queries::list_open_for_class(self.db.pool(), class_id).await
    }

    /// Overdue checkouts, most overdue first
    pub async fn list_overdue(&self, ctx: &RequestContext) -> Result<Vec<OverdueCheckout>> {
        let mut overdue: Vec<OverdueCheckout> = self
            .list_open()
            .await?
            .into_iter()
            .filter(|checkout| is_overdue(checkout, ctx.now))
            .map(|checkout| OverdueCheckout {
                days_overdue: days_overdue(&checkout, ctx.now),
                checkout,
            })
            .collect();

        overdue.sort_by_key(|o| (o.checkout.due_date, o.checkout.id));
        Ok(overdue)
    }
}

fn limit_exceeded(student_id: i64, limit: i64) -> CirculationError {
    CirculationError::CheckoutLimitExceeded {
        student_id,
        limit: u32::try_from(limit).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CHECKOUT_RETRY_ATTEMPTS;
    use crate::context::Actor;
    use crate::identity::AuthorName;
    use crate::inventory::InventoryLedger;
    use crate::storage::{CheckoutStatus, CopyStatus, NewBook};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        ledger: InventoryLedger,
        circulation: Circulation,
    }

    async fn fixture() -> Fixture {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        Fixture {
            ledger: InventoryLedger::new(db.clone()),
            circulation: Circulation::new(db, DEFAULT_CHECKOUT_RETRY_ATTEMPTS),
        }
    }

    fn at(day: u32) -> RequestContext {
        let now = Utc.with_ymd_and_hms(2024, 9, day, 9, 0, 0).unwrap();
        RequestContext::at(Actor::Staff { user_id: 1 }, now)
    }

    async fn add_book(f: &Fixture, title: &str, isbn: &str, copies: i64) -> i64 {
        let candidate = NewBook::new(title, AuthorName::combined("Test Author")).with_isbn(isbn);
        f.ledger.add_new_book(&at(1), &candidate, copies).await.unwrap().id
    }

    #[tokio::test]
    async fn test_checkout_picks_lowest_copy_and_sets_due_date() {
        let f = fixture().await;
        let book_id = add_book(&f, "Dune", "9780441013593", 2).await;

        let ctx = at(2);
        let checkout = f.circulation.checkout(&ctx, book_id, 100).await.unwrap();

        assert_eq!(checkout.copy_number, 1);
        assert_eq!(checkout.status, CheckoutStatus::Open);
        assert_eq!(checkout.checkout_date, ctx.now);
        assert_eq!(checkout.due_date, ctx.now + Duration::days(14));
        assert_eq!(checkout.book_title, "Dune");

        let copies = f.ledger.list_copies(book_id).await.unwrap();
        assert_eq!(copies[0].status, CopyStatus::CheckedOut);
        assert_eq!(copies[1].status, CopyStatus::Available);
    }

    #[tokio::test]
    async fn test_oversized_loan_period_rejected() {
        let f = fixture().await;
        let book_id = add_book(&f, "Dune", "9780441013593", 1).await;

        let err = f
            .circulation
            .update_settings(
                &at(1),
                &LibrarySettings {
                    default_due_days: 100_000_000,
                    max_checkout_books: 5,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(f.circulation.settings().await.unwrap(), LibrarySettings::default());

        // A row written behind the service's back fails the checkout cleanly
        let oversized = LibrarySettings {
            default_due_days: 100_000_000,
            max_checkout_books: 5,
        };
        queries::upsert_settings(f.circulation.db.pool(), &oversized, at(1).now)
            .await
            .unwrap();
        let err = f.circulation.checkout(&at(2), book_id, 100).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(f.ledger.get_book(book_id).await.unwrap().available_copies, 1);
    }

    #[tokio::test]
    async fn test_checkout_unknown_book() {
        let f = fixture().await;
        let err = f.circulation.checkout(&at(2), 42, 100).await.unwrap_err();
        assert!(matches!(err, CirculationError::NotFound { entity: Entity::Book, .. }));
    }

    #[tokio::test]
    async fn test_book_locks_are_released() {
        let f = fixture().await;
        let dune = add_book(&f, "Dune", "9780441013593", 2).await;
        let holes = add_book(&f, "Holes", "9780440414803", 1).await;

        let ctx = at(2);
        let (a, b, c, d) = tokio::join!(
            f.circulation.checkout(&ctx, dune, 1),
            f.circulation.checkout(&ctx, dune, 2),
            f.circulation.checkout(&ctx, dune, 3),
            f.circulation.checkout(&ctx, holes, 4),
        );
        let dune_results = [a, b, c];
        assert_eq!(dune_results.iter().filter(|r| r.is_ok()).count(), 2);
        assert!(dune_results
            .iter()
            .any(|r| matches!(r, Err(CirculationError::NoCopiesAvailable { .. }))));
        assert!(d.is_ok());

        assert!(f.circulation.checkout(&ctx, 999, 5).await.is_err());
        assert_eq!(f.circulation.tracked_book_locks().await, 0);
    }

    #[tokio::test]
    async fn test_no_copies_available() {
        let f = fixture().await;
        let book_id = add_book(&f, "Holes", "9780440414803", 1).await;

        f.circulation.checkout(&at(2), book_id, 1).await.unwrap();
        let err = f.circulation.checkout(&at(2), book_id, 2).await.unwrap_err();
        assert!(matches!(err, CirculationError::NoCopiesAvailable { book_id: id } if id == book_id));
    }

    #[tokio::test]
    async fn test_checkout_limit() {
        let f = fixture().await;
        f.circulation
            .update_settings(
                &at(1),
                &LibrarySettings {
                    default_due_days: 7,
                    max_checkout_books: 1,
                },
            )
            .await
            .unwrap();

        let first = add_book(&f, "Dune", "9780441013593", 1).await;
        let second = add_book(&f, "Holes", "9780440414803", 1).await;

        let checkout = f.circulation.checkout(&at(2), first, 7).await.unwrap();
        assert_eq!(checkout.due_date, at(2).now + Duration::days(7));

        let err = f.circulation.checkout(&at(2), second, 7).await.unwrap_err();
        assert!(matches!(
            err,
            CirculationError::CheckoutLimitExceeded { student_id: 7, limit: 1 }
        ));

        // The rejected checkout must not have claimed the copy
        assert_eq!(f.ledger.get_book(second).await.unwrap().available_copies, 1);
    }

    #[tokio::test]
    async fn test_return_twice() {
        let f = fixture().await;
        let book_id = add_book(&f, "Dune", "9780441013593", 1).await;
        let checkout = f.circulation.checkout(&at(2), book_id, 1).await.unwrap();

        let returned = f.circulation.return_by_checkout_id(&at(5), checkout.id).await.unwrap();
        assert_eq!(returned.status, CheckoutStatus::Returned);
        assert_eq!(returned.returned_date, Some(at(5).now));

        let err = f.circulation.return_by_checkout_id(&at(5), checkout.id).await.unwrap_err();
        assert!(matches!(err, CirculationError::AlreadyReturned { checkout_id } if checkout_id == checkout.id));

        let err = f.circulation.return_by_checkout_id(&at(5), 9999).await.unwrap_err();
        assert!(matches!(err, CirculationError::NotFound { entity: Entity::Checkout, .. }));

        assert_eq!(f.ledger.get_book(book_id).await.unwrap().available_copies, 1);
    }

    #[tokio::test]
    async fn test_return_by_isbn_single_checkout() {
        let f = fixture().await;
        let book_id = add_book(&f, "Dune", "9780441013593", 2).await;
        let checkout = f.circulation.checkout(&at(2), book_id, 1).await.unwrap();

        let result = f.circulation.return_by_isbn(&at(3), "0-441-01359-7").await.unwrap();
        assert_eq!(result.checkout.id, checkout.id);
        assert!(!result.reconciled());
    }

    #[tokio::test]
    async fn test_return_by_isbn_reconciles_oldest() {
        let f = fixture().await;
        let book_id = add_book(&f, "Dune", "9780441013593", 3).await;

        let newer = f.circulation.checkout(&at(4), book_id, 1).await.unwrap();
        let oldest = f.circulation.checkout(&at(2), book_id, 2).await.unwrap();
        f.circulation.checkout(&at(3), book_id, 3).await.unwrap();

        let result = f.circulation.return_by_isbn(&at(10), "978-0-441-01359-3").await.unwrap();
        assert_eq!(result.checkout.id, oldest.id);

        let notice = result.reconciliation.expect("expected a reconciliation notice");
        assert_eq!(notice.open_checkouts, 3);
        assert_eq!(notice.chosen_checkout_id, oldest.id);
        assert_eq!(notice.isbn, "9780441013593");
        assert_eq!(notice.kind(), ErrorKind::ReconciliationNotice);

        assert!(f.circulation.get_checkout(newer.id).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn test_return_by_isbn_not_found() {
        let f = fixture().await;
        add_book(&f, "Dune", "9780441013593", 1).await;

        for isbn in ["garbage", "9780306406157", "9780441013593"] {
            let err = f.circulation.return_by_isbn(&at(3), isbn).await.unwrap_err();
            assert!(
                matches!(err, CirculationError::NotFound { entity: Entity::Isbn, .. }),
                "unexpected error for {}: {:?}",
                isbn,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_overdue_listing() {
        let f = fixture().await;
        let book_id = add_book(&f, "Dune", "9780441013593", 2).await;

        // Due on the 15th and the 20th
        f.circulation.checkout(&at(1), book_id, 1).await.unwrap();
        f.circulation.checkout(&at(6), book_id, 2).await.unwrap();

        assert!(f.circulation.list_overdue(&at(15)).await.unwrap().is_empty());

        let overdue = f.circulation.list_overdue(&at(18)).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].checkout.student_id, 1);
        assert_eq!(overdue[0].days_overdue, 3);

        let overdue = f.circulation.list_overdue(&at(25)).await.unwrap();
        assert_eq!(overdue.len(), 2);
        assert_eq!(overdue[0].days_overdue, 10);
    }

    #[tokio::test]
    async fn test_overdue_boundary() {
        let f = fixture().await;
        let book_id = add_book(&f, "Dune", "9780441013593", 1).await;
        let checkout = f.circulation.checkout(&at(1), book_id, 1).await.unwrap();

        let due = checkout.due_date;
        assert!(is_overdue(&checkout, due + Duration::seconds(1)));
        assert!(!is_overdue(&checkout, due - Duration::seconds(1)));
        assert!(!is_overdue(&checkout, due));
        assert_eq!(days_overdue(&checkout, due + Duration::hours(47)), 1);
    }

    #[tokio::test]
    async fn test_class_and_student_listings() {
        let f = fixture().await;
        let book_id = add_book(&f, "Dune", "9780441013593", 3).await;

        let request = CheckoutRequest {
            book_id,
            student_id: 1,
            class_id: Some(30),
        };
        f.circulation.checkout_with(&at(2), request).await.unwrap();
        f.circulation.checkout(&at(2), book_id, 2).await.unwrap();

        assert_eq!(f.circulation.list_current_for_class(30).await.unwrap().len(), 1);
        assert_eq!(f.circulation.list_current_for_student(2).await.unwrap().len(), 1);
        assert_eq!(f.circulation.list_open().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_settings_validation() {
        let f = fixture().await;
        assert_eq!(f.circulation.settings().await.unwrap(), LibrarySettings::default());

        let err = f
            .circulation
            .update_settings(
                &at(1),
                &LibrarySettings {
                    default_due_days: 0,
                    max_checkout_books: 3,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CirculationError::InvalidInput(_)));
    }
}
