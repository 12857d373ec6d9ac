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

//! Inventory ledger
//!
//! Owns books and their physical copies. Copy numbers start at 1 and keep
//! counting up; numbers freed by a removal are not reused. Copy status is
//! left alone here, only circulation flips it.

use crate::context::RequestContext;
use crate::error::{CirculationError, Entity, Result};
use crate::identity::{self, normalize_isbn, Resolution};
use crate::storage::{queries, Book, BookCopy, BookPatch, Database, NewBook};
use serde::Serialize;

/// Result of [`InventoryLedger::add_or_merge`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "book", rename_all = "snake_case")]
pub enum AddOutcome {
    Created(Book),
    Merged(Book),
}

impl AddOutcome {
    pub fn book(&self) -> &Book {
        match self {
            AddOutcome::Created(book) | AddOutcome::Merged(book) => book,
        }
    }

    pub fn into_book(self) -> Book {
        match self {
            AddOutcome::Created(book) | AddOutcome::Merged(book) => book,
        }
    }

    pub fn was_merged(&self) -> bool {
        matches!(self, AddOutcome::Merged(_))
    }
}

/// Book and copy bookkeeping
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    db: Database,
}

impl InventoryLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn get_book(&self, book_id: i64) -> Result<Book> {
        queries::find_book_by_id(self.db.pool(), book_id)
            .await?
            .ok_or_else(|| CirculationError::not_found(Entity::Book, book_id))
    }

    /// All books, title order
    pub async fn list_books(&self) -> Result<Vec<Book>> {
        queries::list_books(self.db.pool()).await
    }

    /// Books carrying this ISBN in either form
    pub async fn find_books_by_isbn(&self, isbn: &str) -> Result<Vec<Book>> {
        match normalize_isbn(isbn) {
            Some(isbn13) => queries::find_books_by_isbn13(self.db.pool(), &isbn13).await,
            None => Ok(Vec::new()),
        }
    }

    /// Case-insensitive title/author substring search
    pub async fn search_books(&self, query: &str, limit: i64) -> Result<Vec<Book>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        queries::search_books(self.db.pool(), query, limit.max(1)).await
    }

    pub async fn list_copies(&self, book_id: i64) -> Result<Vec<BookCopy>> {
        self.get_book(book_id).await?;
        queries::list_copies(self.db.pool(), book_id).await
    }

    /// Run the identity resolver against the whole catalog
    pub async fn resolve(&self, candidate: &NewBook) -> Result<Resolution> {
        let books = queries::list_books_by_id(self.db.pool()).await?;
        Ok(identity::resolve(candidate, &books))
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Create a book with `copies` AVAILABLE copies numbered from 1
    ///
    /// Does not check for duplicates; call [`Self::resolve`] first or use
    /// [`Self::add_or_merge`].
    pub async fn add_new_book(&self, ctx: &RequestContext, candidate: &NewBook, copies: i64) -> Result<Book> {
        validate_copy_count(copies)?;
        validate_candidate(candidate)?;

        let mut tx = self.db.pool().begin().await?;

        let book_id = queries::insert_book(&mut *tx, candidate, ctx.now).await?;
        for copy_number in 1..=copies {
            queries::insert_copy(&mut *tx, book_id, copy_number, ctx.now).await?;
        }

        tx.commit().await?;

        tracing::info!(
            request_id = %ctx.request_id,
            actor = %ctx.actor,
            book_id,
            copies,
            title = %candidate.title.trim(),
            "added book"
        );

        self.get_book(book_id).await
    }

    /// Append copies after the highest existing copy number
    pub async fn add_copies_to_existing_book(
        &self,
        ctx: &RequestContext,
        book_id: i64,
        additional_copies: i64,
    ) -> Result<Book> {
        validate_copy_count(additional_copies)?;

        let mut tx = self.db.pool().begin().await?;

        // Write first, so copy numbering runs under the write lock
        if queries::touch_book(&mut *tx, book_id, ctx.now).await? == 0 {
            return Err(CirculationError::not_found(Entity::Book, book_id));
        }

        let last = queries::max_copy_number(&mut *tx, book_id).await?;
        for copy_number in (last + 1)..=(last + additional_copies) {
            queries::insert_copy(&mut *tx, book_id, copy_number, ctx.now).await?;
        }

        tx.commit().await?;

        tracing::info!(
            request_id = %ctx.request_id,
            actor = %ctx.actor,
            book_id,
            additional_copies,
            "added copies"
        );

        self.get_book(book_id).await
    }

    /// Resolve, then create or merge
    pub async fn add_or_merge(&self, ctx: &RequestContext, candidate: &NewBook, copies: i64) -> Result<AddOutcome> {
        validate_copy_count(copies)?;
        validate_candidate(candidate)?;

        match self.resolve(candidate).await? {
            Resolution {
                is_duplicate: true,
                existing_book_id: Some(book_id),
            } => {
                tracing::debug!(request_id = %ctx.request_id, book_id, "candidate matches existing book");
                let book = self.add_copies_to_existing_book(ctx, book_id, copies).await?;
                Ok(AddOutcome::Merged(book))
            }
            _ => {
                let book = self.add_new_book(ctx, candidate, copies).await?;
                Ok(AddOutcome::Created(book))
            }
        }
    }

    /// Field-level metadata merge; copies are untouched
    pub async fn update_book_metadata(&self, ctx: &RequestContext, book_id: i64, patch: &BookPatch) -> Result<Book> {
        if patch.is_empty() {
            return self.get_book(book_id).await;
        }

        let mut tx = self.db.pool().begin().await?;

        if queries::touch_book(&mut *tx, book_id, ctx.now).await? == 0 {
            return Err(CirculationError::not_found(Entity::Book, book_id));
        }
        let mut book = queries::find_book_by_id(&mut *tx, book_id)
            .await?
            .ok_or_else(|| CirculationError::not_found(Entity::Book, book_id))?;

        apply_patch(&mut book, patch)?;
        queries::update_book(&mut *tx, &book, ctx.now).await?;

        tx.commit().await?;

        tracing::info!(request_id = %ctx.request_id, actor = %ctx.actor, book_id, "updated book metadata");

        self.get_book(book_id).await
    }

    /// Delete a book and all of its copies
    ///
    /// # Errors
    /// `Conflict` while any copy is checked out.
    pub async fn remove_book(&self, ctx: &RequestContext, book_id: i64) -> Result<()> {
        let deleted = queries::delete_book_if_idle(self.db.pool(), book_id).await?;

        if deleted == 0 {
            let book = self.get_book(book_id).await?;
            return Err(CirculationError::conflict(format!(
                "\"{}\" has {} copies checked out",
                book.title,
                book.checked_out_copies()
            )));
        }

        tracing::info!(request_id = %ctx.request_id, actor = %ctx.actor, book_id, "removed book");
        Ok(())
    }

    /// Delete one AVAILABLE copy
    pub async fn remove_book_copy(&self, ctx: &RequestContext, copy_id: i64) -> Result<()> {
        let deleted = queries::delete_copy_if_available(self.db.pool(), copy_id).await?;

        if deleted == 0 {
            return match queries::find_copy(self.db.pool(), copy_id).await? {
                None => Err(CirculationError::not_found(Entity::BookCopy, copy_id)),
                Some(copy) => Err(CirculationError::conflict(format!(
                    "copy #{} is checked out",
                    copy.copy_number
                ))),
            };
        }

        tracing::info!(request_id = %ctx.request_id, actor = %ctx.actor, copy_id, "removed copy");
        Ok(())
    }

    /// Shrink a book by deleting its highest-numbered AVAILABLE copies
    pub async fn remove_available_copies(&self, ctx: &RequestContext, book_id: i64, count: i64) -> Result<Book> {
        validate_copy_count(count)?;

        let mut tx = self.db.pool().begin().await?;

        if queries::touch_book(&mut *tx, book_id, ctx.now).await? == 0 {
            return Err(CirculationError::not_found(Entity::Book, book_id));
        }

        let copies = queries::last_available_copies(&mut *tx, book_id, count).await?;
        if (copies.len() as i64) < count {
            return Err(CirculationError::conflict(format!(
                "only {} copies are available to remove",
                copies.len()
            )));
        }

        for copy in &copies {
            if queries::delete_copy_if_available(&mut *tx, copy.id).await? == 0 {
                return Err(CirculationError::conflict(format!(
                    "copy #{} was checked out during removal",
                    copy.copy_number
                )));
            }
        }

        tx.commit().await?;

        tracing::info!(request_id = %ctx.request_id, actor = %ctx.actor, book_id, count, "removed copies");

        self.get_book(book_id).await
    }
}

fn validate_copy_count(copies: i64) -> Result<()> {
    if copies < 1 {
        return Err(CirculationError::invalid_input(format!(
            "copy count must be at least 1, got {}",
            copies
        )));
    }
    Ok(())
}

fn validate_candidate(candidate: &NewBook) -> Result<()> {
    if candidate.title.trim().is_empty() {
        return Err(CirculationError::invalid_input("title is required"));
    }
    if candidate.author.is_blank() {
        return Err(CirculationError::invalid_input("author is required"));
    }
    Ok(())
}

/// Empty text clears an optional field
fn optional_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn apply_patch(book: &mut Book, patch: &BookPatch) -> Result<()> {
    if let Some(title) = &patch.title {
        if title.trim().is_empty() {
            return Err(CirculationError::invalid_input("title cannot be blank"));
        }
        book.title = title.trim().to_string();
    }

    if let Some(author) = &patch.author {
        if author.is_blank() {
            return Err(CirculationError::invalid_input("author cannot be blank"));
        }
        book.author = author.display();
        book.author_first_name = author.first_name().map(|s| s.trim().to_string());
        book.author_last_name = author.last_name().map(|s| s.trim().to_string());
    }

    if let Some(isbn) = &patch.isbn {
        book.isbn = optional_text(isbn);
        book.isbn13 = book.isbn.as_deref().and_then(normalize_isbn);
    }

    if let Some(genre) = &patch.genre {
        book.genre = optional_text(genre);
    }
    if let Some(subject) = &patch.subject {
        book.subject = optional_text(subject);
    }
    if let Some(published_date) = &patch.published_date {
        book.published_date = optional_text(published_date);
    }
    if let Some(url) = &patch.cover_image_url {
        book.cover_image_url = optional_text(url);
    }
    if let Some(level) = &patch.reading_level {
        book.reading_level = optional_text(level);
    }

    if patch.page_count.is_some() {
        book.page_count = patch.page_count;
    }
    if patch.lexile_score.is_some() {
        book.lexile_score = patch.lexile_score;
    }
    if patch.ar_points.is_some() {
        book.ar_points = patch.ar_points;
    }

    Ok(())
}
