//! One cached collection per backend namespace.
//!
//! `Library` is built once at startup and handed to whatever needs data.
//! Collections share the same `Remote` and `SnapshotStore`; each gets the
//! bundled seed for its namespace when one ships.

use std::sync::Arc;

use anyhow::{bail, Result};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::cache::{CachedCollection, Remote, SnapshotStore, Source, Verb};
use crate::models::seeds::seed;
use crate::models::{
    Author, Book, BookCopy, BookLoan, BookRequest, Category, EntityId, Fine, Publisher, Record,
    RequestStatus, Subscription, User,
};

pub const AUTHORS: &str = "authors";
pub const BOOKS: &str = "books";
pub const CATEGORIES: &str = "categories";
pub const PUBLISHERS: &str = "publishers";
pub const BOOK_COPIES: &str = "book-copy";
pub const LOANS: &str = "loaned";
pub const REQUESTS: &str = "requests";
pub const FINES: &str = "fines";
pub const SUBSCRIPTIONS: &str = "subscriptions";
pub const USERS: &str = "users";

/// Every namespace the library front end manages.
pub const NAMESPACES: &[&str] = &[
    AUTHORS,
    BOOKS,
    CATEGORIES,
    PUBLISHERS,
    BOOK_COPIES,
    LOANS,
    REQUESTS,
    FINES,
    SUBSCRIPTIONS,
    USERS,
];

/// Outcome of refreshing one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub namespace: String,
    pub source: Source,
    pub count: usize,
}

pub struct Library {
    remote: Arc<dyn Remote>,
    store: Arc<dyn SnapshotStore>,
    pub authors: Arc<CachedCollection<Author>>,
    pub books: Arc<CachedCollection<Book>>,
    pub categories: Arc<CachedCollection<Category>>,
    pub publishers: Arc<CachedCollection<Publisher>>,
    pub book_copies: Arc<CachedCollection<BookCopy>>,
    pub loans: Arc<CachedCollection<BookLoan>>,
    pub requests: Arc<CachedCollection<BookRequest>>,
    pub fines: Arc<CachedCollection<Fine>>,
    pub subscriptions: Arc<CachedCollection<Subscription>>,
    pub users: Arc<CachedCollection<User>>,
}

impl Library {
    pub fn new(remote: Arc<dyn Remote>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            authors: Arc::new(seeded(AUTHORS, &remote, &store)),
            books: Arc::new(seeded(BOOKS, &remote, &store)),
            categories: Arc::new(seeded(CATEGORIES, &remote, &store)),
            publishers: Arc::new(seeded(PUBLISHERS, &remote, &store)),
            book_copies: Arc::new(seeded(BOOK_COPIES, &remote, &store)),
            loans: Arc::new(seeded(LOANS, &remote, &store)),
            requests: Arc::new(seeded(REQUESTS, &remote, &store)),
            fines: Arc::new(seeded(FINES, &remote, &store)),
            subscriptions: Arc::new(seeded(SUBSCRIPTIONS, &remote, &store)),
            users: Arc::new(seeded(USERS, &remote, &store)),
            remote,
            store,
        }
    }

    /// A schemaless collection for any namespace, seeded if a seed ships.
    pub fn record_collection(&self, namespace: &str) -> CachedCollection<Record> {
        seeded(namespace, &self.remote, &self.store)
    }

    /// Read every namespace concurrently, refreshing snapshots where the
    /// backend answers.
    pub async fn refresh_all(&self) -> Vec<RefreshSummary> {
        let refreshes: Vec<BoxFuture<'_, RefreshSummary>> = vec![
            summarize(&self.authors),
            summarize(&self.books),
            summarize(&self.categories),
            summarize(&self.publishers),
            summarize(&self.book_copies),
            summarize(&self.loans),
            summarize(&self.requests),
            summarize(&self.fines),
            summarize(&self.subscriptions),
            summarize(&self.users),
        ];
        let summaries = join_all(refreshes).await;

        let remote = summaries
            .iter()
            .filter(|s| s.source == Source::Remote)
            .count();
        info!(remote, total = summaries.len(), "Refreshed library collections");
        summaries
    }

    pub async fn add_author(&self, name: &str) -> Result<Author> {
        self.authors.create(&json!({ "name": name })).await
    }

    pub async fn rename_author(&self, id: i64, name: &str) -> Result<Author> {
        self.authors.update(id, &json!({ "name": name })).await
    }

    /// Books whose title or description contains `term`, case-insensitive.
    pub async fn search_books(&self, term: &str) -> Vec<Book> {
        self.books
            .query(&["search", "title", term], |book| book.matches_term(term))
            .await
    }

    pub async fn books_by_author(&self, author_id: i64) -> Vec<Book> {
        let id = author_id.to_string();
        self.books
            .query(&["search", "author", id.as_str()], |book| {
                book.author_ids.contains(&author_id)
            })
            .await
    }

    pub async fn books_by_category(&self, category_id: i64) -> Vec<Book> {
        let id = category_id.to_string();
        self.books
            .query(&["search", "category", id.as_str()], |book| {
                book.category_ids.contains(&category_id)
            })
            .await
    }

    pub async fn books_by_publisher(&self, publisher_id: i64) -> Vec<Book> {
        let id = publisher_id.to_string();
        self.books
            .query(&["search", "publisher", id.as_str()], |book| {
                book.publisher_id == Some(publisher_id)
            })
            .await
    }

    pub async fn copies_of(&self, book_id: i64) -> Vec<BookCopy> {
        let id = book_id.to_string();
        self.book_copies
            .query(&["book", id.as_str()], |copy| copy.original_book_id == book_id)
            .await
    }

    /// Loans of the user with `user_id`. Offline, loans are matched on the
    /// user's name, looked up in the local users data.
    pub async fn loans_for_user(&self, user_id: &str) -> Vec<BookLoan> {
        let user_name = self
            .users
            .local()
            .items
            .into_iter()
            .find(|user| user.id == user_id)
            .map(|user| user.user_name);
        self.loans
            .query(&[user_id], |loan| {
                user_name.is_some() && loan.user_name == user_name
            })
            .await
    }

    pub async fn requests_for_user(&self, username: &str) -> Vec<BookRequest> {
        self.requests
            .query(&["user", username], |request| same_user(request.username.as_deref(), username))
            .await
    }

    pub async fn requests_with_status(&self, status: RequestStatus) -> Vec<BookRequest> {
        self.requests
            .query(&["status", status.as_str()], |request| request.status == status)
            .await
    }

    pub async fn pending_requests(&self) -> Vec<BookRequest> {
        self.requests_with_status(RequestStatus::Pending).await
    }

    pub async fn fines_for_user(&self, username: &str) -> Vec<Fine> {
        self.fines
            .query(&["user", username], |fine| same_user(fine.username.as_deref(), username))
            .await
    }

    pub async fn fines_for_loan(&self, loan_id: &str) -> Vec<Fine> {
        self.fines
            .query(&["loan", loan_id], |fine| {
                fine.book_loan_id.as_deref() == Some(loan_id)
            })
            .await
    }

    pub async fn subscriptions_for_user(&self, user_id: &str) -> Vec<Subscription> {
        self.subscriptions
            .query(&["user", user_id], |sub| sub.user_id.as_deref() == Some(user_id))
            .await
    }

    /// Approve or reject a pending request.
    pub async fn process_request(&self, request_id: &str, approve: bool) -> Result<BookRequest> {
        let approve = if approve { "true" } else { "false" };
        self.requests
            .call_for_entity("process", Verb::Post, &["process", request_id, approve], &[])
            .await
    }

    /// Ask to borrow a specific copy.
    pub async fn request_borrow(&self, user_id: &str, copy_id: i64) -> Result<BookRequest> {
        let copy_id = copy_id.to_string();
        self.requests
            .call_for_entity(
                "borrow request",
                Verb::Post,
                &[user_id, "new", "borrow"],
                &[("bookCopyId", copy_id.as_str())],
            )
            .await
    }

    /// Ask to borrow whichever copy of a book the backend picks.
    pub async fn request_borrow_any(&self, user_id: &str, book_id: i64) -> Result<BookRequest> {
        let book_id = book_id.to_string();
        self.requests
            .call_for_entity(
                "borrow request",
                Verb::Post,
                &[user_id, "new", "borrow", "rand"],
                &[("bookId", book_id.as_str())],
            )
            .await
    }

    pub async fn request_return(&self, user_id: &str, copy_id: i64) -> Result<BookRequest> {
        let copy_id = copy_id.to_string();
        self.requests
            .call_for_entity(
                "return request",
                Verb::Post,
                &[user_id, "new", "return"],
                &[("bookCopyId", copy_id.as_str())],
            )
            .await
    }

    /// Cancel a pending request. The backend answers with no body, so the
    /// snapshot entry is marked canceled here.
    pub async fn cancel_request(&self, request_id: &str) -> Result<()> {
        self.requests
            .call(Verb::Put, &["cancel"], &[("requestId", request_id)])
            .await?;
        self.requests.patch_snapshot(
            &EntityId::from(request_id),
            &json!({ "status": RequestStatus::Canceled.as_str() }),
        );
        Ok(())
    }

    /// Subscribe to availability news for one copy. Returns the backend's
    /// confirmation.
    pub async fn subscribe(&self, user_id: &str, copy_id: i64) -> Result<String> {
        let copy_id = copy_id.to_string();
        let reply = self
            .subscriptions
            .call(Verb::Post, &["subscribe", user_id, copy_id.as_str()], &[])
            .await?;
        Ok(message_from(reply, "Subscribed"))
    }

    /// Subscribe to every copy of a book. Fails only if no copy could be
    /// subscribed to.
    pub async fn subscribe_to_book(&self, user_id: &str, book_id: i64) -> Result<String> {
        let copies = self.copies_of(book_id).await;
        let results = join_all(copies.iter().map(|copy| self.subscribe(user_id, copy.id))).await;
        let subscribed = results.iter().filter(|result| result.is_ok()).count();
        if subscribed == 0 {
            bail!("No subscriptions were successful for book {}", book_id);
        }
        info!(user_id, book_id, subscribed, copies = copies.len(), "Subscribed to book");
        Ok(format!("Subscribed to book {} with {} copies.", book_id, subscribed))
    }

    pub async fn unsubscribe(&self, subscription_id: i64) -> Result<()> {
        let id = subscription_id.to_string();
        self.subscriptions
            .call(Verb::Put, &["unsubscribe", id.as_str()], &[])
            .await?;
        Ok(())
    }

    /// Have the backend email every subscriber whose copy is available.
    pub async fn notify_subscribers(&self) -> Result<String> {
        let reply = self
            .subscriptions
            .call(Verb::Post, &["notify-all"], &[])
            .await?;
        Ok(message_from(reply, "Notification emails have been sent"))
    }
}

fn same_user(name: Option<&str>, username: &str) -> bool {
    name.is_some_and(|name| name.eq_ignore_ascii_case(username))
}

/// Text of a backend reply that is a plain message, or `default` when the
/// reply is empty.
fn message_from(reply: Value, default: &str) -> String {
    match reply {
        Value::String(message) => message,
        Value::Null => default.to_string(),
        other => other.to_string(),
    }
}

fn seeded<T>(
    namespace: &str,
    remote: &Arc<dyn Remote>,
    store: &Arc<dyn SnapshotStore>,
) -> CachedCollection<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    let collection = CachedCollection::new(namespace, remote.clone(), store.clone());
    match seed(namespace) {
        Some(items) => collection.with_seed(items),
        None => collection,
    }
}

fn summarize<T>(collection: &CachedCollection<T>) -> BoxFuture<'_, RefreshSummary>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    async move {
        let loaded = collection.get_all_with_source().await;
        RefreshSummary {
            namespace: collection.namespace().to_string(),
            source: loaded.source,
            count: loaded.items.len(),
        }
    }
    .boxed()
}
