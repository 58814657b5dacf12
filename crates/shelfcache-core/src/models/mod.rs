//! Data models for library entities.
//!
//! - `EntityId`, `Entity`: identity, the only thing the cache interprets
//! - `Record`: schemaless entity for namespaces without a model
//! - Catalog types: `Author`, `Book`, `Category`, `Publisher`, `BookCopy`
//! - Circulation types: `BookLoan`, `BookRequest`, `Fine`, `Subscription`
//! - `User`
//! - `seeds`: bundled fallback datasets

pub mod catalog;
pub mod circulation;
pub mod entity;
pub mod record;
pub mod seeds;
pub mod user;

pub use catalog::{Author, Book, BookCopy, Category, CopyStatus, Publisher};
pub use circulation::{
    total_fines, BookLoan, BookRequest, Fine, LoanStatus, RequestStatus, RequestType, Subscription,
};
pub use entity::{Entity, EntityId};
pub use record::Record;
pub use user::User;
