//! Expense domain models shared by the store, the tools and the HTTP layer

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

//
// ================= Enums =================
//

/// Lifecycle status of an expense. Serialized with its display name
/// ("Draft", "Submitted", ...), which is also what the store persists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExpenseStatusName {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl ExpenseStatusName {
    pub const ALL: [ExpenseStatusName; 4] = [
        ExpenseStatusName::Draft,
        ExpenseStatusName::Submitted,
        ExpenseStatusName::Approved,
        ExpenseStatusName::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatusName::Draft => "Draft",
            ExpenseStatusName::Submitted => "Submitted",
            ExpenseStatusName::Approved => "Approved",
            ExpenseStatusName::Rejected => "Rejected",
        }
    }

    /// Lookup-table id used by the store
    pub fn id(&self) -> i32 {
        match self {
            ExpenseStatusName::Draft => 1,
            ExpenseStatusName::Submitted => 2,
            ExpenseStatusName::Approved => 3,
            ExpenseStatusName::Rejected => 4,
        }
    }
}

impl fmt::Display for ExpenseStatusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExpenseStatusName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ExpenseStatusName::ALL
            .iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| {
                format!(
                    "Unknown status '{}'. Expected one of: Draft, Submitted, Approved, Rejected",
                    s
                )
            })
    }
}

//
// ================= Expense =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub expense_id: i32,
    pub user_id: i32,
    pub user_name: String,
    pub email: String,
    pub category_id: i32,
    pub category_name: String,
    pub status_id: i32,
    pub status_name: String,
    pub amount_minor: i64,
    pub amount: f64,
    pub currency: String,
    pub expense_date: NaiveDate,
    pub description: Option<String>,
    pub receipt_file: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseCategory {
    pub category_id: i32,
    pub category_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseStatus {
    pub status_id: i32,
    pub status_name: String,
}

//
// ================= Requests =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseRequest {
    #[serde(default = "default_user_id")]
    pub user_id: i32,
    pub category_id: i32,
    pub amount: f64,
    pub expense_date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_submit_now")]
    pub submit_now: bool,
}

fn default_user_id() -> i32 {
    1
}

fn default_submit_now() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub expense_id: i32,
    pub status_name: ExpenseStatusName,
    #[serde(default)]
    pub reviewed_by: Option<i32>,
}

/// Convert a major-unit amount into minor units (pence)
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn from_minor_units(amount_minor: i64) -> f64 {
    amount_minor as f64 / 100.0
}

//
// ================= Store Outcome =================
//

/// Result of an expense store operation.
///
/// `OkWithWarning` is the degraded case: the store could not be reached, so
/// the data is a fallback placeholder and the warning carries the diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome<T> {
    Ok(T),
    OkWithWarning(T, String),
    Err(String),
}

impl<T> StoreOutcome<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StoreOutcome<U> {
        match self {
            StoreOutcome::Ok(value) => StoreOutcome::Ok(f(value)),
            StoreOutcome::OkWithWarning(value, warning) => {
                StoreOutcome::OkWithWarning(f(value), warning)
            }
            StoreOutcome::Err(error) => StoreOutcome::Err(error),
        }
    }

    pub fn is_err(&self) -> bool {
        matches!(self, StoreOutcome::Err(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            StoreOutcome::Ok(value) | StoreOutcome::OkWithWarning(value, _) => Some(value),
            StoreOutcome::Err(_) => None,
        }
    }

    /// The diagnostic string, for both degraded and failed outcomes
    pub fn error(&self) -> Option<&str> {
        match self {
            StoreOutcome::Ok(_) => None,
            StoreOutcome::OkWithWarning(_, message) | StoreOutcome::Err(message) => Some(message),
        }
    }

    pub fn into_parts(self) -> (Option<T>, Option<String>) {
        match self {
            StoreOutcome::Ok(value) => (Some(value), None),
            StoreOutcome::OkWithWarning(value, warning) => (Some(value), Some(warning)),
            StoreOutcome::Err(error) => (None, Some(error)),
        }
    }
}
