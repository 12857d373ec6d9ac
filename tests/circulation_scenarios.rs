//! End-to-end circulation scenarios
//!
//! Drives the service the way the desk, the kiosk and the scanners do,
//! against in-memory and file-backed databases.

use chrono::{DateTime, Duration, TimeZone, Utc};
use circulation_core::identity::{normalize_isbn, AuthorName};
use circulation_core::service::{AddBookRequest, AddBookResponse, AddCopiesRequest};
use circulation_core::storage::{queries, CopyStatus, Database, NewBook};
use circulation_core::{
    Actor, CheckoutRequest, CirculationError, LibraryConfig, LibraryService, RequestContext,
};
use std::sync::Arc;

fn monday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 8, 30, 0).unwrap()
}

fn desk(now: DateTime<Utc>) -> RequestContext {
    RequestContext::at(Actor::Staff { user_id: 1 }, now)
}

async fn memory_service() -> LibraryService {
    let db = Database::new_in_memory().await.expect("Failed to create database");
    LibraryService::from_database(db, &LibraryConfig::default())
        .await
        .expect("Failed to create service")
}

async fn file_service(dir: &tempfile::TempDir, retries: u32) -> LibraryService {
    let config = LibraryConfig::builder()
        .database_path(dir.path().join("circulation.db"))
        .checkout_retry_attempts(retries)
        .build()
        .expect("Invalid config");
    LibraryService::open(&config).await.expect("Failed to open service")
}

fn dune(copies: i64) -> AddBookRequest {
    AddBookRequest {
        book: NewBook::new("Dune", AuthorName::split("Frank", "Herbert")).with_isbn("9780441013593"),
        copies,
        force_new: false,
    }
}

async fn add_book(service: &LibraryService, request: &AddBookRequest) -> i64 {
    match service.add_book(&desk(monday()), request).await.expect("add_book failed") {
        AddBookResponse::Created { book } => book.id,
        AddBookResponse::Duplicate { existing_book_id } => panic!("unexpected duplicate of {}", existing_book_id),
    }
}

async fn checkout(service: &LibraryService, ctx: &RequestContext, book_id: i64, student_id: i64) -> circulation_core::Result<circulation_core::storage::Checkout> {
    service
        .create_checkout(
            ctx,
            CheckoutRequest {
                book_id,
                student_id,
                class_id: None,
            },
        )
        .await
}

async fn open_checkouts_per_copy(db: &Database) -> Vec<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM checkouts WHERE status = 'OPEN' GROUP BY book_copy_id")
        .fetch_all(db.pool())
        .await
        .expect("Failed to count open checkouts")
}

#[tokio::test]
async fn dune_scenario() {
    let service = memory_service().await;
    let book_id = add_book(&service, &dune(2)).await;

    let ctx = desk(monday());
    let (a, b, c) = (101, 102, 103);

    let first = checkout(&service, &ctx, book_id, a).await.unwrap();
    assert_eq!(first.copy_number, 1);
    assert_eq!(first.due_date, monday() + Duration::days(14));

    let second = checkout(&service, &ctx, book_id, b).await.unwrap();
    assert_eq!(second.copy_number, 2);

    let err = checkout(&service, &ctx, book_id, c).await.unwrap_err();
    assert!(matches!(err, CirculationError::NoCopiesAvailable { .. }));
    assert!(err.is_business_state());

    service.return_checkout(&ctx, first.id).await.unwrap();

    let third = checkout(&service, &ctx, book_id, c).await.unwrap();
    assert_eq!(third.copy_number, 1);
    assert_eq!(third.student_id, c);
}

#[tokio::test]
async fn duplicate_submission_merges_into_existing_book() {
    let service = memory_service().await;
    let ctx = desk(monday());

    let first = service.ledger().add_or_merge(&ctx, &dune(1).book, 1).await.unwrap();
    let second = service.ledger().add_or_merge(&ctx, &dune(1).book, 1).await.unwrap();

    assert!(!first.was_merged());
    assert!(second.was_merged());
    assert_eq!(first.book().id, second.book().id);

    // The same candidate typed in by hand, ISBN-10 and combined author
    let by_hand = AddBookRequest {
        book: NewBook::new("DUNE ", AuthorName::combined("Herbert, Frank")).with_isbn("0-441-01359-7"),
        copies: 1,
        force_new: false,
    };
    let response = service.add_book(&ctx, &by_hand).await.unwrap();
    assert!(matches!(response, AddBookResponse::Duplicate { existing_book_id } if existing_book_id == first.book().id));

    assert_eq!(service.ledger().list_books().await.unwrap().len(), 1);
}

#[tokio::test]
async fn copy_count_matches_copy_rows() {
    let service = memory_service().await;
    let ctx = desk(monday());

    let book_id = add_book(&service, &dune(3)).await;
    service.add_copies(&ctx, AddCopiesRequest { book_id, copies: 4 }).await.unwrap();
    let out = checkout(&service, &ctx, book_id, 9).await.unwrap();

    let copies = service.ledger().list_copies(book_id).await.unwrap();
    service.ledger().remove_book_copy(&ctx, copies[3].id).await.unwrap();
    service.ledger().remove_available_copies(&ctx, book_id, 2).await.unwrap();

    let err = service.ledger().remove_book_copy(&ctx, out.book_copy_id).await.unwrap_err();
    assert!(err.is_conflict());

    let book = service.ledger().get_book(book_id).await.unwrap();
    let rows = service.ledger().list_copies(book_id).await.unwrap();
    assert_eq!(book.total_copies, rows.len() as i64);
    assert_eq!(book.total_copies, 4);
    assert_eq!(
        book.available_copies,
        rows.iter().filter(|c| c.status == CopyStatus::Available).count() as i64
    );

    let numbers: Vec<i64> = rows.iter().map(|c| c.copy_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 5]);

    let err = service.delete_book(&ctx, book_id).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn return_closes_exactly_once() {
    let service = memory_service().await;
    let ctx = desk(monday());
    let book_id = add_book(&service, &dune(1)).await;

    let out = checkout(&service, &ctx, book_id, 5).await.unwrap();

    let returned = service.return_checkout(&ctx, out.id).await.unwrap();
    assert!(!returned.is_open());

    let err = service.return_checkout(&ctx, out.id).await.unwrap_err();
    assert!(matches!(err, CirculationError::AlreadyReturned { .. }));

    let copy = queries::find_copy(service.database().pool(), out.book_copy_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copy.status, CopyStatus::Available);
}

#[test]
fn isbn_10_and_13_normalize_together() {
    assert_eq!(normalize_isbn("0-306-40615-2"), normalize_isbn("9780306406157"));
    assert_eq!(normalize_isbn("0-306-40615-2").as_deref(), Some("9780306406157"));
}

#[tokio::test]
async fn overdue_boundary() {
    let service = memory_service().await;
    let book_id = add_book(&service, &dune(1)).await;

    let out = checkout(&service, &desk(monday()), book_id, 5).await.unwrap();
    let due = out.due_date;

    let before = service.overdue(&desk(due - Duration::seconds(1))).await.unwrap();
    assert!(before.is_empty());

    let after = service.overdue(&desk(due + Duration::seconds(1))).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].days_overdue, 0);
}

#[tokio::test]
async fn checkout_limit_is_enforced() {
    let service = memory_service().await;
    let ctx = desk(monday());
    let book_id = add_book(&service, &dune(10)).await;

    let limit = service.get_settings().await.unwrap().max_checkout_books;
    for _ in 0..limit {
        checkout(&service, &ctx, book_id, 42).await.unwrap();
    }

    let err = checkout(&service, &ctx, book_id, 42).await.unwrap_err();
    assert!(matches!(err, CirculationError::CheckoutLimitExceeded { student_id: 42, .. }));
    assert_eq!(service.student_current(42).await.unwrap().len() as i64, limit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_never_share_a_copy() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let service = Arc::new(file_service(&dir, 3).await);

    const STUDENTS: i64 = 6;
    let book_id = add_book(&service, &dune(STUDENTS - 1)).await;

    let handles: Vec<_> = (0..STUDENTS)
        .map(|student_id| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let ctx = RequestContext::new(Actor::Student { student_id });
                checkout(&service, &ctx, book_id, student_id).await
            })
        })
        .collect();

    let results: Vec<_> = futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("checkout task panicked"))
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count() as i64;
    let no_copies = results
        .iter()
        .filter(|r| matches!(r, Err(CirculationError::NoCopiesAvailable { .. })))
        .count();

    assert_eq!(succeeded, STUDENTS - 1);
    assert_eq!(no_copies, 1);

    let mut copy_ids: Vec<i64> = results.iter().filter_map(|r| r.as_ref().ok()).map(|c| c.book_copy_id).collect();
    copy_ids.sort_unstable();
    copy_ids.dedup();
    assert_eq!(copy_ids.len() as i64, STUDENTS - 1);

    assert!(open_checkouts_per_copy(service.database()).await.iter().all(|&n| n == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_copy_additions_number_copies_uniquely() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let left = file_service(&dir, 3).await;
    let right = file_service(&dir, 3).await;

    let book_id = add_book(&left, &dune(1)).await;

    const TERMINALS: i64 = 8;
    let handles: Vec<_> = (0..TERMINALS)
        .map(|terminal| {
            let service = if terminal % 2 == 0 { left.clone() } else { right.clone() };
            tokio::spawn(async move {
                let ctx = RequestContext::new(Actor::Staff { user_id: terminal });
                service.add_copies(&ctx, AddCopiesRequest { book_id, copies: 2 }).await
            })
        })
        .collect();

    for joined in futures_util::future::join_all(handles).await {
        joined.expect("add_copies task panicked").expect("add_copies failed");
    }

    let copies = left.ledger().list_copies(book_id).await.unwrap();
    let numbers: Vec<i64> = copies.iter().map(|c| c.copy_number).collect();
    assert_eq!(numbers, (1..=1 + 2 * TERMINALS).collect::<Vec<_>>());

    let book = right.ledger().get_book(book_id).await.unwrap();
    assert_eq!(book.total_copies, 1 + 2 * TERMINALS);
    assert_eq!(book.available_copies, 1 + 2 * TERMINALS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_services_on_one_file_keep_copies_exclusive() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let left = file_service(&dir, 10).await;
    let right = file_service(&dir, 10).await;

    let book_id = add_book(&left, &dune(4)).await;

    let mut handles = Vec::new();
    for student_id in 0..8 {
        let service = if student_id % 2 == 0 { left.clone() } else { right.clone() };
        handles.push(tokio::spawn(async move {
            let ctx = RequestContext::new(Actor::Kiosk);
            checkout(&service, &ctx, book_id, student_id).await
        }));
    }

    let results: Vec<_> = futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("checkout task panicked"))
        .collect();

    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(e, CirculationError::NoCopiesAvailable { .. } | CirculationError::Conflict(_)),
                "unexpected error: {:?}",
                e
            );
        }
    }

    let succeeded = results.iter().filter(|r| r.is_ok()).count() as i64;
    let book = left.ledger().get_book(book_id).await.unwrap();
    assert_eq!(book.checked_out_copies(), succeeded);
    assert!(succeeded <= 4);
    assert!(open_checkouts_per_copy(left.database()).await.iter().all(|&n| n == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn double_return_race() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let service = file_service(&dir, 3).await;
    let book_id = add_book(&service, &dune(1)).await;

    let checkout_id = checkout(&service, &desk(monday()), book_id, 5).await.unwrap().id;

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.return_checkout(&desk(monday()), checkout_id).await })
    };
    let second = {
        let service = service.clone();
        tokio::spawn(async move { service.return_checkout(&desk(monday()), checkout_id).await })
    };

    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    let outcomes = [first, second];

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(CirculationError::AlreadyReturned { .. })))
            .count(),
        1
    );

    let book = service.ledger().get_book(book_id).await.unwrap();
    assert_eq!(book.available_copies, 1);
}

#[tokio::test]
async fn scanner_return_reports_reconciliation() {
    let service = memory_service().await;
    let book_id = add_book(&service, &dune(2)).await;

    let older = checkout(&service, &desk(monday()), book_id, 1).await.unwrap();
    checkout(&service, &desk(monday() + Duration::hours(2)), book_id, 2).await.unwrap();

    let request = circulation_core::service::ReturnByIsbnRequest {
        isbn: "0441013597".to_string(),
    };
    let first = service.return_by_isbn(&desk(monday() + Duration::days(3)), &request).await.unwrap();
    assert_eq!(first.checkout.id, older.id);
    assert!(first.reconciled());

    // One left, nothing to reconcile
    let second = service.return_by_isbn(&desk(monday() + Duration::days(3)), &request).await.unwrap();
    assert!(!second.reconciled());

    let err = service.return_by_isbn(&desk(monday() + Duration::days(3)), &request).await.unwrap_err();
    assert!(matches!(err, CirculationError::NotFound { .. }));
}

#[tokio::test]
async fn history_after_returns() {
    let service = memory_service().await;
    let book_id = add_book(&service, &dune(1)).await;

    let out = checkout(&service, &desk(monday()), book_id, 7).await.unwrap();
    service
        .return_checkout(&desk(monday() + Duration::days(5) + Duration::minutes(30)), out.id)
        .await
        .unwrap();

    let history = service.student_history(7).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].book_title, "Dune");
    assert_eq!(history[0].days_kept, 5);

    let detailed = service.student_detailed_history(7).await.unwrap();
    assert_eq!(detailed[0].duration_minutes, 5 * 24 * 60 + 30);

    assert!(service.student_current(7).await.unwrap().is_empty());
}
