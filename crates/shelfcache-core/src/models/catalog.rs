use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Entity, EntityId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "publisherId", default)]
    pub publisher_id: Option<i64>,
    #[serde(rename = "authorIds", default)]
    pub author_ids: Vec<i64>,
    #[serde(rename = "categoryIds", default)]
    pub category_ids: Vec<i64>,
}

impl Book {
    /// Case-insensitive match on title or description, the same test the
    /// book search page applies when the backend search is unavailable.
    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.title.to_lowercase().contains(&term)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&term))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopyStatus {
    Available,
    Unavailable,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyStatus::Available => write!(f, "Available"),
            CopyStatus::Unavailable => write!(f, "Unavailable"),
            CopyStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookCopy {
    pub id: i64,
    #[serde(rename = "originalBookBookId")]
    pub original_book_id: i64,
    pub status: CopyStatus,
}

impl Entity for Author {
    fn id(&self) -> EntityId {
        EntityId::Int(self.id)
    }
}

impl Entity for Publisher {
    fn id(&self) -> EntityId {
        self.id.clone()
    }
}

impl Entity for Category {
    fn id(&self) -> EntityId {
        self.id.clone()
    }
}

impl Entity for Book {
    fn id(&self) -> EntityId {
        EntityId::Int(self.id)
    }
}

impl Entity for BookCopy {
    fn id(&self) -> EntityId {
        EntityId::Int(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_book_parses_backend_dto() {
        let book: Book = serde_json::from_value(json!({
            "id": 3,
            "title": "The Great Gatsby",
            "description": "Jazz age novel",
            "publisherId": 2,
            "authorIds": [4],
            "categoryIds": [1, 9]
        }))
        .unwrap();
        assert_eq!(book.publisher_id, Some(2));
        assert_eq!(book.category_ids, vec![1, 9]);
        assert!(book.matches_term("gatsby"));
        assert!(book.matches_term("JAZZ"));
        assert!(!book.matches_term("whale"));
    }

    #[test]
    fn test_unknown_copy_status_does_not_fail() {
        let copy: BookCopy = serde_json::from_value(json!({
            "id": 1, "originalBookBookId": 1, "status": "LOST"
        }))
        .unwrap();
        assert_eq!(copy.status, CopyStatus::Unknown);
    }
}
