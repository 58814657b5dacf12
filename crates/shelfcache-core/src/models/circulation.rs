use serde::{Deserialize, Serialize};

use super::{Entity, EntityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Rejected,
    RequestBorrowing,
    Borrowed,
    RequestReturning,
    Returned,
    Nonreturnable,
    #[serde(other)]
    Unknown,
}

impl LoanStatus {
    /// Whether the copy is still out with the borrower.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, LoanStatus::Borrowed | LoanStatus::RequestReturning)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLoan {
    pub id: String,
    #[serde(rename = "bookCopyId")]
    pub book_copy_id: i64,
    #[serde(rename = "bookCopyOriginalBookTitle", default)]
    pub book_title: Option<String>,
    #[serde(rename = "userUserName", default)]
    pub user_name: Option<String>,
    #[serde(rename = "loanDate", default)]
    pub loan_date: Option<String>,
    #[serde(rename = "dueDate", default)]
    pub due_date: Option<String>,
    #[serde(rename = "actualReturnDate", default)]
    pub actual_return_date: Option<String>,
    pub status: LoanStatus,
    #[serde(rename = "loanedAt", default)]
    pub loaned_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Borrowing,
    Returning,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Accepted,
    Denied,
    Pending,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl RequestStatus {
    /// Name used on the wire and in request URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Accepted => "ACCEPTED",
            RequestStatus::Denied => "DENIED",
            RequestStatus::Pending => "PENDING",
            RequestStatus::Canceled => "CANCELED",
            RequestStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACCEPTED" => Ok(RequestStatus::Accepted),
            "DENIED" => Ok(RequestStatus::Denied),
            "PENDING" => Ok(RequestStatus::Pending),
            "CANCELED" | "CANCELLED" => Ok(RequestStatus::Canceled),
            other => Err(format!("unknown request status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRequest {
    pub id: String,
    #[serde(rename = "bookLoanId")]
    pub book_loan_id: String,
    #[serde(default)]
    pub username: Option<String>,
    pub status: RequestStatus,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fine {
    pub id: String,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "bookLoanId", default)]
    pub book_loan_id: Option<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

/// Sum of fine amounts, as shown on the user fines page.
pub fn total_fines(fines: &[Fine]) -> f64 {
    fines.iter().map(|f| f.amount).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub title: String,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "bookId", default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<i64>,
    #[serde(rename = "bookCopyId", default, skip_serializing_if = "Option::is_none")]
    pub book_copy_id: Option<i64>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Entity for BookLoan {
    fn id(&self) -> EntityId {
        EntityId::Text(self.id.clone())
    }
}

impl Entity for BookRequest {
    fn id(&self) -> EntityId {
        EntityId::Text(self.id.clone())
    }
}

impl Entity for Fine {
    fn id(&self) -> EntityId {
        EntityId::Text(self.id.clone())
    }
}

impl Entity for Subscription {
    fn id(&self) -> EntityId {
        EntityId::Int(self.id)
    }
}
