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

//! Reading history and circulation reports
//!
//! Read-only views over the checkout log. Titles come from the live book
//! when it still exists, otherwise from the snapshot stored on the checkout.

use crate::circulation::is_overdue;
use crate::context::RequestContext;
use crate::error::{CirculationError, Result};
use crate::storage::{queries, Checkout, Database};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One returned checkout, day granularity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingHistoryEntry {
    pub checkout_id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub checkout_date: DateTime<Utc>,
    pub return_date: DateTime<Utc>,
    pub days_kept: i64,
}

/// One returned checkout, minute granularity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedHistoryEntry {
    pub checkout_id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub return_date: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// Average loan length of one title
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookDuration {
    pub book_id: i64,
    pub book_title: String,
    pub returns: usize,
    pub average_minutes: f64,
}

/// Loan durations across every returned checkout
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DurationTrends {
    pub total_returns: usize,
    pub average_minutes: Option<f64>,
    /// Longest average first
    pub books: Vec<BookDuration>,
    pub longest: Option<BookDuration>,
    pub shortest: Option<BookDuration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingDue {
    #[serde(flatten)]
    pub checkout: Checkout,
    pub days_until_due: i64,
}

/// Per-title view of what is currently out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckedOutBookSummary {
    pub book_id: i64,
    pub book_title: String,
    pub checked_out: usize,
    pub total_copies: i64,
    pub earliest_due_date: DateTime<Utc>,
    pub overdue: usize,
}

#[derive(Debug, Clone)]
pub struct HistoryAggregator {
    db: Database,
}

impl HistoryAggregator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returned checkouts of a student, most recent return first
    pub async fn reading_history(&self, student_id: i64) -> Result<Vec<ReadingHistoryEntry>> {
        let mut entries: Vec<ReadingHistoryEntry> = queries::list_returned_for_student(self.db.pool(), student_id)
            .await?
            .into_iter()
            .filter_map(|checkout| {
                let return_date = checkout.returned_date?;
                Some(ReadingHistoryEntry {
                    checkout_id: checkout.id,
                    book_id: checkout.book_id,
                    days_kept: (return_date - checkout.checkout_date).num_days(),
                    book_title: checkout.book_title,
                    checkout_date: checkout.checkout_date,
                    return_date,
                })
            })
            .collect();

        entries.sort_by(|a, b| b.return_date.cmp(&a.return_date).then(b.checkout_id.cmp(&a.checkout_id)));
        Ok(entries)
    }

    /// Same rows as [`Self::reading_history`] with minute durations
    pub async fn detailed_reading_history(&self, student_id: i64) -> Result<Vec<DetailedHistoryEntry>> {
        let mut entries: Vec<DetailedHistoryEntry> = queries::list_returned_for_student(self.db.pool(), student_id)
            .await?
            .into_iter()
            .filter_map(detailed_entry)
            .collect();

        entries.sort_by(|a, b| b.return_date.cmp(&a.return_date).then(b.checkout_id.cmp(&a.checkout_id)));
        Ok(entries)
    }

    /// Every checkout of a title, newest first
    pub async fn book_history(&self, book_id: i64) -> Result<Vec<Checkout>> {
        queries::list_checkouts_for_book(self.db.pool(), book_id).await
    }

    /// Average, longest and shortest loan durations over all students
    pub async fn duration_trends(&self) -> Result<DurationTrends> {
        let entries: Vec<DetailedHistoryEntry> = queries::list_returned_checkouts(self.db.pool())
            .await?
            .into_iter()
            .filter_map(detailed_entry)
            .collect();

        Ok(summarize_durations(&entries))
    }

    /// OPEN checkouts due between now and `within_days` from now, soonest first
    pub async fn upcoming_due_dates(&self, ctx: &RequestContext, within_days: i64) -> Result<Vec<UpcomingDue>> {
        if within_days < 0 {
            return Err(CirculationError::invalid_input("within_days cannot be negative"));
        }

        let horizon = ctx.days_from_now(within_days)?;
        let mut upcoming: Vec<UpcomingDue> = queries::list_open_checkouts(self.db.pool())
            .await?
            .into_iter()
            .filter(|c| c.due_date >= ctx.now && c.due_date <= horizon)
            .map(|checkout| UpcomingDue {
                days_until_due: (checkout.due_date - ctx.now).num_days(),
                checkout,
            })
            .collect();

        upcoming.sort_by_key(|u| (u.checkout.due_date, u.checkout.id));
        Ok(upcoming)
    }

    /// One row per title with copies out, earliest due first
    pub async fn checked_out_books_summary(&self, ctx: &RequestContext) -> Result<Vec<CheckedOutBookSummary>> {
        let open = queries::list_open_checkouts(self.db.pool()).await?;
        let total_copies: HashMap<i64, i64> = queries::list_books_by_id(self.db.pool())
            .await?
            .into_iter()
            .map(|book| (book.id, book.total_copies))
            .collect();

        let mut by_book: BTreeMap<i64, Vec<Checkout>> = BTreeMap::new();
        for checkout in open {
            by_book.entry(checkout.book_id).or_default().push(checkout);
        }

        let mut summary: Vec<CheckedOutBookSummary> = by_book
            .into_iter()
            .filter_map(|(book_id, checkouts)| {
                let earliest_due_date = checkouts.iter().map(|c| c.due_date).min()?;
                Some(CheckedOutBookSummary {
                    book_id,
                    book_title: checkouts[0].book_title.clone(),
                    checked_out: checkouts.len(),
                    total_copies: total_copies.get(&book_id).copied().unwrap_or_default(),
                    earliest_due_date,
                    overdue: checkouts.iter().filter(|c| is_overdue(c, ctx.now)).count(),
                })
            })
            .collect();

        summary.sort_by_key(|s| (s.earliest_due_date, s.book_id));
        Ok(summary)
    }
}

fn detailed_entry(checkout: Checkout) -> Option<DetailedHistoryEntry> {
    let return_date = checkout.returned_date?;
    Some(DetailedHistoryEntry {
        checkout_id: checkout.id,
        book_id: checkout.book_id,
        duration_minutes: (return_date - checkout.checkout_date).num_minutes(),
        book_title: checkout.book_title,
        return_date,
    })
}

fn summarize_durations(entries: &[DetailedHistoryEntry]) -> DurationTrends {
    if entries.is_empty() {
        return DurationTrends::default();
    }

    let total: i64 = entries.iter().map(|e| e.duration_minutes).sum();

    let mut per_book: BTreeMap<i64, (String, Vec<i64>)> = BTreeMap::new();
    for entry in entries {
        per_book
            .entry(entry.book_id)
            .or_insert_with(|| (entry.book_title.clone(), Vec::new()))
            .1
            .push(entry.duration_minutes);
    }

    let mut books: Vec<BookDuration> = per_book
        .into_iter()
        .map(|(book_id, (book_title, minutes))| BookDuration {
            book_id,
            book_title,
            returns: minutes.len(),
            average_minutes: minutes.iter().sum::<i64>() as f64 / minutes.len() as f64,
        })
        .collect();

    books.sort_by(|a, b| {
        b.average_minutes
            .total_cmp(&a.average_minutes)
            .then(a.book_id.cmp(&b.book_id))
    });

    DurationTrends {
        total_returns: entries.len(),
        average_minutes: Some(total as f64 / entries.len() as f64),
        longest: books.first().cloned(),
        shortest: books.last().cloned(),
        books,
    }
}
