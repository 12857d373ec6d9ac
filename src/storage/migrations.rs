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

//! Database migrations
//!
//! Migrations are plain SQL executed at runtime and tracked in the
//! `_migrations` table, so a database file can be opened by any build
//! without a build-time database connection.

use crate::error::Result;
use sqlx::{Executor, SqlitePool};

/// Run all database migrations
///
/// This function creates the database schema and applies any pending migrations.
/// Migrations are tracked in the `_migrations` table.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create migrations tracking table
    create_migrations_table(pool).await?;

    // Run all migrations in order
    run_migration(pool, 1, "initial_schema", create_initial_schema(pool)).await?;
    run_migration(pool, 2, "read_views", create_read_views(pool)).await?;

    Ok(())
}

/// Create migrations tracking table
async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    Ok(())
}

/// Run a single migration if it hasn't been applied yet
async fn run_migration(
    pool: &SqlitePool,
    id: i32,
    name: &str,
    migration_fn: impl std::future::Future<Output = Result<()>>,
) -> Result<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    if applied.is_some() {
        return Ok(());
    }

    migration_fn.await?;

    sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

    tracing::debug!(migration = name, "applied migration");

    Ok(())
}

/// Create initial database schema
async fn create_initial_schema(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
-- ============================================================================
-- CATALOG
-- ============================================================================

-- Title-level entries
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    author TEXT NOT NULL,              -- display form
    author_first_name TEXT,            -- set when entered as a first/last pair
    author_last_name TEXT,
    isbn TEXT,                         -- as entered
    isbn13 TEXT,                       -- normalized, NULL when absent or malformed
    genre TEXT,
    subject TEXT,
    published_date TEXT,
    page_count INTEGER,
    cover_image_url TEXT,
    reading_level TEXT,
    lexile_score INTEGER,
    ar_points REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Physical copies. status is written only by circulation.
CREATE TABLE IF NOT EXISTS book_copies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    book_id INTEGER NOT NULL,
    copy_number INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'AVAILABLE' CHECK (status IN ('AVAILABLE', 'CHECKED_OUT')),
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
    UNIQUE (book_id, copy_number)
);

-- ============================================================================
-- CIRCULATION
-- ============================================================================

-- Lending history. No foreign keys: rows outlive deleted books and copies.
CREATE TABLE IF NOT EXISTS checkouts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    book_copy_id INTEGER NOT NULL,
    book_id INTEGER NOT NULL,
    copy_number INTEGER NOT NULL,
    book_title TEXT NOT NULL,          -- snapshot at checkout time
    student_id INTEGER NOT NULL,
    class_id INTEGER,
    checkout_date TEXT NOT NULL,
    due_date TEXT NOT NULL,
    returned_date TEXT,
    status TEXT NOT NULL DEFAULT 'OPEN' CHECK (status IN ('OPEN', 'RETURNED'))
);

-- Singleton settings row (id = 1), seeded from configuration
CREATE TABLE IF NOT EXISTS library_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    default_due_days INTEGER NOT NULL CHECK (default_due_days > 0),
    max_checkout_books INTEGER NOT NULL CHECK (max_checkout_books > 0),
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- ============================================================================
-- INDEXES
-- ============================================================================

CREATE INDEX IF NOT EXISTS idx_books_isbn13 ON books(isbn13);
CREATE INDEX IF NOT EXISTS idx_books_title ON books(title COLLATE NOCASE);

CREATE INDEX IF NOT EXISTS idx_book_copies_book ON book_copies(book_id, copy_number);
CREATE INDEX IF NOT EXISTS idx_book_copies_status ON book_copies(book_id, status);

CREATE INDEX IF NOT EXISTS idx_checkouts_student ON checkouts(student_id, status);
CREATE INDEX IF NOT EXISTS idx_checkouts_book ON checkouts(book_id, status);
CREATE INDEX IF NOT EXISTS idx_checkouts_class ON checkouts(class_id, status);

-- At most one open checkout per copy
CREATE UNIQUE INDEX IF NOT EXISTS idx_checkouts_one_open_per_copy
    ON checkouts(book_copy_id) WHERE status = 'OPEN';
        "#,
    )
    .await?;

    Ok(())
}

/// Read-side views with derived columns
async fn create_read_views(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
-- Books with copy counts derived from book_copies
CREATE VIEW IF NOT EXISTS book_inventory AS
SELECT
    b.*,
    (SELECT COUNT(*) FROM book_copies c WHERE c.book_id = b.id) AS total_copies,
    (SELECT COUNT(*) FROM book_copies c
        WHERE c.book_id = b.id AND c.status = 'AVAILABLE') AS available_copies
FROM books b;

-- Checkouts titled from the live book, falling back to the snapshot
CREATE VIEW IF NOT EXISTS checkout_records AS
SELECT
    c.id,
    c.book_copy_id,
    c.book_id,
    c.copy_number,
    COALESCE(b.title, c.book_title) AS book_title,
    c.student_id,
    c.class_id,
    c.checkout_date,
    c.due_date,
    c.returned_date,
    c.status
FROM checkouts c
LEFT JOIN books b ON b.id = c.book_id;
        "#,
    )
    .await?;

    Ok(())
}
