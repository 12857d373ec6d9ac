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

use anyhow::Context;
use circulation_core::identity::AuthorName;
use circulation_core::service::{AddBookRequest, AddCopiesRequest, ReturnByIsbnRequest};
use circulation_core::storage::{LibrarySettings, NewBook};
use circulation_core::{
    Actor, ApiErrorBody, CheckoutRequest, CirculationError, LibraryConfig, LibraryService, RequestContext,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "circulation-cli")]
#[command(about = "Circulation CLI - school library desk from the terminal", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the configuration
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Staff user acting; omit to act as the kiosk
    #[arg(long, global = true)]
    staff: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a book, or report the existing match
    AddBook {
        #[arg(long)]
        title: String,
        /// Author as one string
        #[arg(long, conflicts_with_all = ["first_name", "last_name"])]
        author: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        isbn: Option<String>,
        #[arg(long, default_value_t = 1)]
        copies: i64,
        /// Create a new title even if it matches an existing one
        #[arg(long)]
        force_new: bool,
    },
    /// Add copies to an existing book
    AddCopies {
        book_id: i64,
        #[arg(default_value_t = 1)]
        copies: i64,
    },
    /// List books, or search by title/author
    ListBooks {
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Check a book out to a student
    Checkout {
        book_id: i64,
        student_id: i64,
        #[arg(long)]
        class_id: Option<i64>,
    },
    /// Return a checkout by id
    Return { checkout_id: i64 },
    /// Return a scanned book by ISBN
    ReturnIsbn { isbn: String },
    /// List overdue checkouts
    Overdue,
    /// Current checkouts of a student
    Current { student_id: i64 },
    /// Reading history of a student
    History {
        student_id: i64,
        /// Minute-level durations
        #[arg(long)]
        detailed: bool,
    },
    /// Loan duration trends
    Trends,
    /// Show or change library settings
    Settings {
        #[arg(long)]
        due_days: Option<i64>,
        #[arg(long)]
        max_books: Option<i64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<CirculationError>() {
            Some(error) => print_json(&ApiErrorBody::from(error)),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => LibraryConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => LibraryConfig::from_env().context("invalid environment configuration")?,
    };
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    init_tracing(&config.log_filter);

    let service = LibraryService::open(&config).await?;
    let actor = match cli.staff {
        Some(user_id) => Actor::Staff { user_id },
        None => Actor::Kiosk,
    };
    let ctx = RequestContext::new(actor);

    match cli.command {
        Commands::AddBook {
            title,
            author,
            first_name,
            last_name,
            isbn,
            copies,
            force_new,
        } => {
            let author = AuthorName::from_parts(author.as_deref(), first_name.as_deref(), last_name.as_deref());
            let mut book = NewBook::new(title, author);
            book.isbn = isbn;
            let request = AddBookRequest { book, copies, force_new };
            print_json(&service.add_book(&ctx, &request).await?);
        }
        Commands::AddCopies { book_id, copies } => {
            print_json(&service.add_copies(&ctx, AddCopiesRequest { book_id, copies }).await?);
        }
        Commands::ListBooks { query } => {
            let books = match query {
                Some(query) => service.ledger().search_books(&query, 100).await?,
                None => service.ledger().list_books().await?,
            };
            print_json(&books);
        }
        Commands::Checkout {
            book_id,
            student_id,
            class_id,
        } => {
            let request = CheckoutRequest {
                book_id,
                student_id,
                class_id,
            };
            print_json(&service.create_checkout(&ctx, request).await?);
        }
        Commands::Return { checkout_id } => {
            print_json(&service.return_checkout(&ctx, checkout_id).await?);
        }
        Commands::ReturnIsbn { isbn } => {
            let result = service.return_by_isbn(&ctx, &ReturnByIsbnRequest { isbn }).await?;
            if let Some(notice) = &result.reconciliation {
                eprintln!("Notice: {}", notice.message());
            }
            print_json(&result);
        }
        Commands::Overdue => print_json(&service.overdue(&ctx).await?),
        Commands::Current { student_id } => print_json(&service.student_current(student_id).await?),
        Commands::History { student_id, detailed } => {
            if detailed {
                print_json(&service.student_detailed_history(student_id).await?);
            } else {
                print_json(&service.student_history(student_id).await?);
            }
        }
        Commands::Trends => print_json(&service.history().duration_trends().await?),
        Commands::Settings { due_days, max_books } => {
            let current = service.get_settings().await?;
            if due_days.is_none() && max_books.is_none() {
                print_json(&current);
            } else {
                let updated = LibrarySettings {
                    default_due_days: due_days.unwrap_or(current.default_due_days),
                    max_checkout_books: max_books.unwrap_or(current.max_checkout_books),
                };
                print_json(&service.update_settings(&ctx, &updated).await?);
            }
        }
    }

    service.database().checkpoint().await?;
    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to serialize output: {}", e),
    }
}
