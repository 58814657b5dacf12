//! shelfcache - a command line client for a library backend.
//!
//! Lists, creates, updates and deletes records in any backend namespace
//! (`authors`, `books`, `loaned`, ...), and drives the borrowing workflow
//! (requests, fines, subscriptions). Reads keep working while the backend
//! is down by serving the last snapshot or the bundled seed data.

mod config;
mod format;

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use shelfcache_core::models::{total_fines, Entity, EntityId, Record, RequestStatus};
use shelfcache_core::poll::{poll_collection, Poller};
use shelfcache_core::status::{ComponentHealth, StatusReport, SystemStatus};
use shelfcache_core::{ApiClient, FileStore, Library, Loaded, Source};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use format::{format_date, format_value, truncate_string};

/// Widest a record line is allowed to get
const MAX_LINE_WIDTH: usize = 100;

#[derive(Parser)]
#[command(name = "shelfcache", version, about = "Library backend client that keeps working offline")]
struct Cli {
    /// Backend base URL, overriding the config file and SHELFCACHE_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a namespace (remote, else snapshot, else seed)
    List { namespace: String },
    /// Show one record
    Show { namespace: String, id: String },
    /// Create a record from a JSON object
    Create { namespace: String, body: String },
    /// Update a record with a JSON object of changed fields
    Update {
        namespace: String,
        id: String,
        body: String,
    },
    /// Delete a record
    Delete { namespace: String, id: String },
    /// Drop the local snapshot of a namespace
    Clear { namespace: String },
    /// Refresh every namespace
    Refresh,
    /// Backend status and uptime
    Status {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Poll a namespace until interrupted
    Watch {
        namespace: String,
        /// Seconds between refreshes (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Search books by title or description
    Search { term: String },
    /// Books by one author, category or publisher
    BooksBy {
        #[arg(value_enum)]
        by: BookFilter,
        id: i64,
    },
    /// Loans of a user
    Loans { user_id: String },
    /// Borrow and return requests
    Requests {
        /// Only this user's requests
        #[arg(long)]
        user: Option<String>,
        /// Only requests in this status (pending, accepted, denied, canceled)
        #[arg(long)]
        status: Option<RequestStatus>,
    },
    /// Fines, with their total
    Fines {
        #[arg(long, conflicts_with = "loan")]
        user: Option<String>,
        #[arg(long)]
        loan: Option<String>,
    },
    /// Subscriptions of a user
    Subscriptions { user_id: String },
    /// Approve a pending request
    Approve { request_id: String },
    /// Reject a pending request
    Reject { request_id: String },
    /// Ask to borrow a copy, or any copy of a book
    Borrow {
        user_id: String,
        #[arg(long, conflicts_with = "book", required_unless_present = "book")]
        copy: Option<i64>,
        #[arg(long)]
        book: Option<i64>,
    },
    /// Ask to return a borrowed copy
    Return { user_id: String, copy_id: i64 },
    /// Cancel a pending request
    Cancel { request_id: String },
    /// Get notified when a copy, or any copy of a book, is available
    Subscribe {
        user_id: String,
        #[arg(long, conflicts_with = "book", required_unless_present = "book")]
        copy: Option<i64>,
        #[arg(long)]
        book: Option<i64>,
    },
    /// Stop a subscription
    Unsubscribe { subscription_id: i64 },
    /// Email every subscriber whose copy is available
    Notify,
    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BookFilter {
    Author,
    Category,
    Publisher,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    config.apply_api_url_override(cli.api_url);

    if let Command::Config { write } = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        if write {
            let path = config.save()?;
            eprintln!("Saved to {}", path.display());
        }
        return Ok(());
    }

    let client = ApiClient::with_timeout(&config.api_base_url, config.request_timeout())?;
    let store = FileStore::new(config.cache_dir()?)?;
    let library = Library::new(Arc::new(client.clone()), Arc::new(store));
    info!(api = %client.base_url(), "shelfcache starting");

    match cli.command {
        Command::List { namespace } => {
            let loaded = library.record_collection(&namespace).get_all_with_source().await;
            print_loaded(&namespace, &loaded);
        }
        Command::Show { namespace, id } => {
            let id = EntityId::parse(&id);
            match library.record_collection(&namespace).find(id.clone()).await {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => bail!("No {} record with id {}", namespace, id),
            }
        }
        Command::Create { namespace, body } => {
            let body = parse_body(&body)?;
            let record = library.record_collection(&namespace).create(&body).await?;
            println!("Created {} {}", namespace, record.id());
        }
        Command::Update {
            namespace,
            id,
            body,
        } => {
            let body = parse_body(&body)?;
            let record = library
                .record_collection(&namespace)
                .update(EntityId::parse(&id), &body)
                .await?;
            println!("Updated {} {}", namespace, record.id());
        }
        Command::Delete { namespace, id } => {
            let id = EntityId::parse(&id);
            library.record_collection(&namespace).delete(id.clone()).await?;
            println!("Deleted {} {}", namespace, id);
        }
        Command::Clear { namespace } => {
            library.record_collection(&namespace).clear_cache();
            println!("Cleared local snapshot of {}", namespace);
        }
        Command::Refresh => {
            for summary in library.refresh_all().await {
                println!(
                    "{:<14} {:>5}  {}",
                    summary.namespace, summary.count, summary.source
                );
            }
        }
        Command::Status { watch } => {
            if watch {
                watch_status(&client, &config).await;
            } else {
                let (status, report) = fetch_status_report(&client).await?;
                print_status(&status, &report);
            }
        }
        Command::Watch {
            namespace,
            interval,
        } => {
            let interval = interval
                .map(|secs| std::time::Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| config.poll_interval());
            let collection = Arc::new(library.record_collection(&namespace));
            let (_poller, mut rx) = poll_collection(collection, interval);
            loop {
                tokio::select! {
                    Some(loaded) = rx.recv() => print_loaded(&namespace, &loaded),
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        Command::Search { term } => print_items(&library.search_books(&term).await)?,
        Command::BooksBy { by, id } => {
            let books = match by {
                BookFilter::Author => library.books_by_author(id).await,
                BookFilter::Category => library.books_by_category(id).await,
                BookFilter::Publisher => library.books_by_publisher(id).await,
            };
            print_items(&books)?;
        }
        Command::Loans { user_id } => print_items(&library.loans_for_user(&user_id).await)?,
        Command::Requests { user, status } => {
            let requests = match (user, status) {
                (Some(user), status) => library
                    .requests_for_user(&user)
                    .await
                    .into_iter()
                    .filter(|request| status.map_or(true, |s| request.status == s))
                    .collect(),
                (None, Some(status)) => library.requests_with_status(status).await,
                (None, None) => library.requests.get_all().await,
            };
            print_items(&requests)?;
        }
        Command::Fines { user, loan } => {
            let fines = match (user, loan) {
                (_, Some(loan)) => library.fines_for_loan(&loan).await,
                (Some(user), None) => library.fines_for_user(&user).await,
                (None, None) => library.fines.get_all().await,
            };
            print_items(&fines)?;
            println!("Total: {}", total_fines(&fines));
        }
        Command::Subscriptions { user_id } => {
            print_items(&library.subscriptions_for_user(&user_id).await)?
        }
        Command::Approve { request_id } => {
            let request = library.process_request(&request_id, true).await?;
            println!("Request {} is now {}", request.id, request.status.as_str());
        }
        Command::Reject { request_id } => {
            let request = library.process_request(&request_id, false).await?;
            println!("Request {} is now {}", request.id, request.status.as_str());
        }
        Command::Borrow {
            user_id,
            copy,
            book,
        } => {
            let request = match (copy, book) {
                (Some(copy), _) => library.request_borrow(&user_id, copy).await?,
                (None, Some(book)) => library.request_borrow_any(&user_id, book).await?,
                (None, None) => bail!("Pass --copy or --book"),
            };
            println!("Created borrow request {}", request.id);
        }
        Command::Return { user_id, copy_id } => {
            let request = library.request_return(&user_id, copy_id).await?;
            println!("Created return request {}", request.id);
        }
        Command::Cancel { request_id } => {
            library.cancel_request(&request_id).await?;
            println!("Canceled request {}", request_id);
        }
        Command::Subscribe {
            user_id,
            copy,
            book,
        } => {
            let message = match (copy, book) {
                (Some(copy), _) => library.subscribe(&user_id, copy).await?,
                (None, Some(book)) => library.subscribe_to_book(&user_id, book).await?,
                (None, None) => bail!("Pass --copy or --book"),
            };
            println!("{}", message);
        }
        Command::Unsubscribe { subscription_id } => {
            library.unsubscribe(subscription_id).await?;
            println!("Unsubscribed {}", subscription_id);
        }
        Command::Notify => println!("{}", library.notify_subscribers().await?),
        Command::Config { .. } => unreachable!("handled before the client is built"),
    }

    Ok(())
}

/// Request bodies are partial records, so they must be JSON objects.
fn parse_body(body: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body).context("Body must be valid JSON")?;
    if !value.is_object() {
        bail!("Body must be a JSON object, got: {}", truncate_string(body, 40));
    }
    Ok(value)
}

fn record_line(record: &Record) -> String {
    let id = record.id().to_string();
    let label = record.label().unwrap_or("");
    let rest: Vec<String> = record
        .fields()
        .iter()
        .filter(|(key, value)| {
            key.as_str() != "id" && value.as_str().map_or(true, |s| s != label)
        })
        .map(|(key, value)| format!("{}={}", key, format_value(value)))
        .collect();
    truncate_string(
        &format!("{:>8}  {:<24} {}", id, label, rest.join(" ")),
        MAX_LINE_WIDTH,
    )
}

/// Print typed entities the same way `list` prints records.
fn print_items<T: Serialize>(items: &[T]) -> Result<()> {
    for item in items {
        let record: Record = serde_json::from_value(serde_json::to_value(item)?)
            .context("Entity has no usable id")?;
        println!("{}", record_line(&record));
    }
    eprintln!("{} found", items.len());
    Ok(())
}

fn print_loaded(namespace: &str, loaded: &Loaded<Record>) {
    for record in &loaded.items {
        println!("{}", record_line(record));
    }
    let note = match loaded.source {
        Source::Remote => "",
        Source::Snapshot => " - backend unavailable, showing last snapshot",
        Source::Seed => " - backend unavailable, showing bundled sample data",
        Source::Empty => " - backend unavailable and nothing cached",
    };
    eprintln!("{} {} ({}){}", loaded.items.len(), namespace, loaded.source, note);
}

async fn fetch_status_report(client: &ApiClient) -> Result<(SystemStatus, StatusReport)> {
    let status = client.fetch_status().await?;
    let logs = client.fetch_status_logs().await?;
    Ok((status, StatusReport::from_logs(&logs)))
}

fn print_component(name: &str, state: &str, health: &ComponentHealth) {
    println!("{:<9} {:<8} {:>3}% uptime", name, state, health.uptime_percent);
    for log in &health.downtime_logs {
        println!(
            "    {}  {:<8} {}",
            format_date(&log.timestamp),
            log.status,
            truncate_string(&log.message, 60)
        );
    }
}

fn print_status(status: &SystemStatus, report: &StatusReport) {
    print_component("server", &status.server, &report.server);
    print_component("database", &status.database, &report.database);
}

async fn watch_status(client: &ApiClient, config: &Config) {
    let (tx, mut rx) = mpsc::channel(1);
    let poll_client = client.clone();
    let _poller = Poller::spawn(
        config.status_poll_interval(),
        move || {
            let client = poll_client.clone();
            async move { fetch_status_report(&client).await }
        },
        tx,
    );

    loop {
        tokio::select! {
            Some(result) = rx.recv() => match result {
                Ok((status, report)) => print_status(&status, &report),
                Err(e) => eprintln!("Status unavailable: {:#}", e),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}
