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

//! Database query functions
//!
//! Repository functions per table. Each takes any SQLite executor, so the
//! same function runs against the pool or inside a transaction
//! (`&mut *tx`). Conditional writes return the affected row count and
//! leave the decision to the caller.
//!
//! Reads go through the `book_inventory` and `checkout_records` views.

use crate::error::Result;
use crate::identity::isbn::normalize_isbn;
use crate::storage::models::*;
use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;

// ============================================================================
// BOOK QUERIES
// ============================================================================

/// Insert a new book
///
/// Returns the id of the inserted book.
pub async fn insert_book<'e, E: SqliteExecutor<'e>>(
    executor: E,
    book: &NewBook,
    now: DateTime<Utc>,
) -> Result<i64> {
    let isbn = book
        .isbn
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let result = sqlx::query(
        r#"
        INSERT INTO books (
            title, author, author_first_name, author_last_name, isbn, isbn13,
            genre, subject, published_date, page_count, cover_image_url,
            reading_level, lexile_score, ar_points, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(book.title.trim())
    .bind(book.author.display())
    .bind(book.author.first_name())
    .bind(book.author.last_name())
    .bind(isbn)
    .bind(isbn.and_then(normalize_isbn))
    .bind(&book.genre)
    .bind(&book.subject)
    .bind(&book.published_date)
    .bind(book.page_count)
    .bind(&book.cover_image_url)
    .bind(&book.reading_level)
    .bind(book.lexile_score)
    .bind(book.ar_points)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Find book by ID
pub async fn find_book_by_id<'e, E: SqliteExecutor<'e>>(
    executor: E,
    book_id: i64,
) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM book_inventory WHERE id = ?")
        .bind(book_id)
        .fetch_optional(executor)
        .await?;

    Ok(book)
}

/// Find books by normalized ISBN, oldest first
pub async fn find_books_by_isbn13<'e, E: SqliteExecutor<'e>>(
    executor: E,
    isbn13: &str,
) -> Result<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>(
        "SELECT * FROM book_inventory WHERE isbn13 = ? ORDER BY id",
    )
    .bind(isbn13)
    .fetch_all(executor)
    .await?;

    Ok(books)
}

/// List every book in id order
pub async fn list_books_by_id<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>("SELECT * FROM book_inventory ORDER BY id")
        .fetch_all(executor)
        .await?;

    Ok(books)
}

/// List every book alphabetically
pub async fn list_books<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>(
        "SELECT * FROM book_inventory ORDER BY title COLLATE NOCASE, id",
    )
    .fetch_all(executor)
    .await?;

    Ok(books)
}

/// Search books by title or author
pub async fn search_books<'e, E: SqliteExecutor<'e>>(
    executor: E,
    query: &str,
    limit: i64,
) -> Result<Vec<Book>> {
    let search_pattern = format!("%{}%", escape_like(query.trim()));
    let books = sqlx::query_as::<_, Book>(
        r#"
        SELECT * FROM book_inventory
        WHERE title LIKE ? ESCAPE '\' OR author LIKE ? ESCAPE '\'
        ORDER BY title COLLATE NOCASE, id
        LIMIT ?
        "#,
    )
    .bind(&search_pattern)
    .bind(&search_pattern)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(books)
}

/// Literal match for `%`, `_` and `\` inside a LIKE pattern
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Bump `updated_at`, taking the write lock for the enclosing transaction
///
/// Returns the number of touched books (0 or 1).
pub async fn touch_book<'e, E: SqliteExecutor<'e>>(
    executor: E,
    book_id: i64,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query("UPDATE books SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(book_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Write a book's metadata columns
pub async fn update_book<'e, E: SqliteExecutor<'e>>(
    executor: E,
    book: &Book,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE books SET
            title = ?, author = ?, author_first_name = ?, author_last_name = ?,
            isbn = ?, isbn13 = ?, genre = ?, subject = ?, published_date = ?,
            page_count = ?, cover_image_url = ?, reading_level = ?,
            lexile_score = ?, ar_points = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.author_first_name)
    .bind(&book.author_last_name)
    .bind(&book.isbn)
    .bind(&book.isbn13)
    .bind(&book.genre)
    .bind(&book.subject)
    .bind(&book.published_date)
    .bind(book.page_count)
    .bind(&book.cover_image_url)
    .bind(&book.reading_level)
    .bind(book.lexile_score)
    .bind(book.ar_points)
    .bind(now)
    .bind(book.id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Delete a book and its copies, unless a copy is checked out
///
/// Returns the number of deleted books (0 or 1).
pub async fn delete_book_if_idle<'e, E: SqliteExecutor<'e>>(
    executor: E,
    book_id: i64,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM books
        WHERE id = ?
          AND NOT EXISTS (
              SELECT 1 FROM book_copies WHERE book_id = ? AND status = 'CHECKED_OUT'
          )
        "#,
    )
    .bind(book_id)
    .bind(book_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// BOOK COPY QUERIES
// ============================================================================

/// Highest copy number ever kept for a book, 0 when it has none
pub async fn max_copy_number<'e, E: SqliteExecutor<'e>>(executor: E, book_id: i64) -> Result<i64> {
    let max: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(copy_number), 0) FROM book_copies WHERE book_id = ?",
    )
    .bind(book_id)
    .fetch_one(executor)
    .await?;

    Ok(max)
}

/// Insert an AVAILABLE copy
pub async fn insert_copy<'e, E: SqliteExecutor<'e>>(
    executor: E,
    book_id: i64,
    copy_number: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO book_copies (book_id, copy_number, status, version, created_at) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(book_id)
    .bind(copy_number)
    .bind(CopyStatus::Available)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// List copies of a book by copy number
pub async fn list_copies<'e, E: SqliteExecutor<'e>>(executor: E, book_id: i64) -> Result<Vec<BookCopy>> {
    let copies = sqlx::query_as::<_, BookCopy>(
        "SELECT * FROM book_copies WHERE book_id = ? ORDER BY copy_number",
    )
    .bind(book_id)
    .fetch_all(executor)
    .await?;

    Ok(copies)
}

/// Find copy by ID
pub async fn find_copy<'e, E: SqliteExecutor<'e>>(executor: E, copy_id: i64) -> Result<Option<BookCopy>> {
    let copy = sqlx::query_as::<_, BookCopy>("SELECT * FROM book_copies WHERE id = ?")
        .bind(copy_id)
        .fetch_optional(executor)
        .await?;

    Ok(copy)
}

/// Lowest-numbered AVAILABLE copy of a book
pub async fn first_available_copy<'e, E: SqliteExecutor<'e>>(
    executor: E,
    book_id: i64,
) -> Result<Option<BookCopy>> {
    let copy = sqlx::query_as::<_, BookCopy>(
        r#"
        SELECT * FROM book_copies
        WHERE book_id = ? AND status = 'AVAILABLE'
        ORDER BY copy_number
        LIMIT 1
        "#,
    )
    .bind(book_id)
    .fetch_optional(executor)
    .await?;

    Ok(copy)
}

/// Highest-numbered AVAILABLE copies of a book
pub async fn last_available_copies<'e, E: SqliteExecutor<'e>>(
    executor: E,
    book_id: i64,
    limit: i64,
) -> Result<Vec<BookCopy>> {
    let copies = sqlx::query_as::<_, BookCopy>(
        r#"
        SELECT * FROM book_copies
        WHERE book_id = ? AND status = 'AVAILABLE'
        ORDER BY copy_number DESC
        LIMIT ?
        "#,
    )
    .bind(book_id)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(copies)
}

/// Delete a copy only while it is AVAILABLE
pub async fn delete_copy_if_available<'e, E: SqliteExecutor<'e>>(
    executor: E,
    copy_id: i64,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM book_copies WHERE id = ? AND status = 'AVAILABLE'")
        .bind(copy_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Compare-and-set AVAILABLE -> CHECKED_OUT at a known version
pub async fn claim_copy<'e, E: SqliteExecutor<'e>>(
    executor: E,
    copy_id: i64,
    expected_version: i64,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE book_copies
        SET status = 'CHECKED_OUT', version = version + 1
        WHERE id = ? AND version = ? AND status = 'AVAILABLE'
        "#,
    )
    .bind(copy_id)
    .bind(expected_version)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// CHECKED_OUT -> AVAILABLE
pub async fn release_copy<'e, E: SqliteExecutor<'e>>(executor: E, copy_id: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE book_copies
        SET status = 'AVAILABLE', version = version + 1
        WHERE id = ? AND status = 'CHECKED_OUT'
        "#,
    )
    .bind(copy_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// CHECKOUT QUERIES
// ============================================================================

/// Insert an OPEN checkout
pub async fn insert_checkout<'e, E: SqliteExecutor<'e>>(
    executor: E,
    checkout: &NewCheckout,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO checkouts (
            book_copy_id, book_id, copy_number, book_title, student_id, class_id,
            checkout_date, due_date, status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(checkout.book_copy_id)
    .bind(checkout.book_id)
    .bind(checkout.copy_number)
    .bind(&checkout.book_title)
    .bind(checkout.student_id)
    .bind(checkout.class_id)
    .bind(checkout.checkout_date)
    .bind(checkout.due_date)
    .bind(CheckoutStatus::Open)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Find checkout by ID
pub async fn find_checkout<'e, E: SqliteExecutor<'e>>(
    executor: E,
    checkout_id: i64,
) -> Result<Option<Checkout>> {
    let checkout = sqlx::query_as::<_, Checkout>("SELECT * FROM checkout_records WHERE id = ?")
        .bind(checkout_id)
        .fetch_optional(executor)
        .await?;

    Ok(checkout)
}

/// Compare-and-set OPEN -> RETURNED
pub async fn close_checkout<'e, E: SqliteExecutor<'e>>(
    executor: E,
    checkout_id: i64,
    returned_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE checkouts SET status = 'RETURNED', returned_date = ? WHERE id = ? AND status = 'OPEN'",
    )
    .bind(returned_at)
    .bind(checkout_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Every OPEN checkout
pub async fn list_open_checkouts<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Vec<Checkout>> {
    let checkouts = sqlx::query_as::<_, Checkout>(
        "SELECT * FROM checkout_records WHERE status = 'OPEN' ORDER BY id",
    )
    .fetch_all(executor)
    .await?;

    Ok(checkouts)
}

/// OPEN checkouts held by a student
pub async fn list_open_for_student<'e, E: SqliteExecutor<'e>>(
    executor: E,
    student_id: i64,
) -> Result<Vec<Checkout>> {
    let checkouts = sqlx::query_as::<_, Checkout>(
        "SELECT * FROM checkout_records WHERE student_id = ? AND status = 'OPEN' ORDER BY id",
    )
    .bind(student_id)
    .fetch_all(executor)
    .await?;

    Ok(checkouts)
}

/// Count of OPEN checkouts held by a student
pub async fn count_open_for_student<'e, E: SqliteExecutor<'e>>(
    executor: E,
    student_id: i64,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM checkouts WHERE student_id = ? AND status = 'OPEN'",
    )
    .bind(student_id)
    .fetch_one(executor)
    .await?;

    Ok(count)
}

/// OPEN checkouts recorded against a class
pub async fn list_open_for_class<'e, E: SqliteExecutor<'e>>(
    executor: E,
    class_id: i64,
) -> Result<Vec<Checkout>> {
    let checkouts = sqlx::query_as::<_, Checkout>(
        "SELECT * FROM checkout_records WHERE class_id = ? AND status = 'OPEN' ORDER BY id",
    )
    .bind(class_id)
    .fetch_all(executor)
    .await?;

    Ok(checkouts)
}

/// OPEN checkouts against any copy of a book
pub async fn list_open_for_book<'e, E: SqliteExecutor<'e>>(
    executor: E,
    book_id: i64,
) -> Result<Vec<Checkout>> {
    let checkouts = sqlx::query_as::<_, Checkout>(
        "SELECT * FROM checkout_records WHERE book_id = ? AND status = 'OPEN' ORDER BY id",
    )
    .bind(book_id)
    .fetch_all(executor)
    .await?;

    Ok(checkouts)
}

/// Every checkout of a book, open or returned
pub async fn list_checkouts_for_book<'e, E: SqliteExecutor<'e>>(
    executor: E,
    book_id: i64,
) -> Result<Vec<Checkout>> {
    let checkouts = sqlx::query_as::<_, Checkout>(
        "SELECT * FROM checkout_records WHERE book_id = ? ORDER BY id DESC",
    )
    .bind(book_id)
    .fetch_all(executor)
    .await?;

    Ok(checkouts)
}

/// RETURNED checkouts of a student
pub async fn list_returned_for_student<'e, E: SqliteExecutor<'e>>(
    executor: E,
    student_id: i64,
) -> Result<Vec<Checkout>> {
    let checkouts = sqlx::query_as::<_, Checkout>(
        "SELECT * FROM checkout_records WHERE student_id = ? AND status = 'RETURNED' ORDER BY id",
    )
    .bind(student_id)
    .fetch_all(executor)
    .await?;

    Ok(checkouts)
}

/// Every RETURNED checkout
pub async fn list_returned_checkouts<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Vec<Checkout>> {
    let checkouts = sqlx::query_as::<_, Checkout>(
        "SELECT * FROM checkout_records WHERE status = 'RETURNED' ORDER BY id",
    )
    .fetch_all(executor)
    .await?;

    Ok(checkouts)
}

// ============================================================================
// SETTINGS QUERIES
// ============================================================================

/// Insert the settings row unless it already exists
pub async fn seed_settings<'e, E: SqliteExecutor<'e>>(
    executor: E,
    settings: &LibrarySettings,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO library_settings (id, default_due_days, max_checkout_books) VALUES (1, ?, ?)",
    )
    .bind(settings.default_due_days)
    .bind(settings.max_checkout_books)
    .execute(executor)
    .await?;

    Ok(())
}

/// Current settings, if seeded
pub async fn get_settings<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Option<LibrarySettings>> {
    let settings = sqlx::query_as::<_, LibrarySettings>(
        "SELECT default_due_days, max_checkout_books FROM library_settings WHERE id = 1",
    )
    .fetch_optional(executor)
    .await?;

    Ok(settings)
}

/// Overwrite the settings row
pub async fn upsert_settings<'e, E: SqliteExecutor<'e>>(
    executor: E,
    settings: &LibrarySettings,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO library_settings (id, default_due_days, max_checkout_books, updated_at)
        VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            default_due_days = excluded.default_due_days,
            max_checkout_books = excluded.max_checkout_books,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(settings.default_due_days)
    .bind(settings.max_checkout_books)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}
