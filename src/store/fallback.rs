//! Fallback dataset served when the live store is unreachable

use crate::models::{Expense, ExpenseCategory, ExpenseStatus, ExpenseStatusName};
use chrono::{Duration, Utc};

lazy_static::lazy_static! {
    static ref CATEGORIES: Vec<ExpenseCategory> = ["Travel", "Meals", "Supplies", "Accommodation"]
        .iter()
        .enumerate()
        .map(|(i, name)| ExpenseCategory {
            category_id: i as i32 + 1,
            category_name: name.to_string(),
            is_active: true,
        })
        .collect();

    static ref STATUSES: Vec<ExpenseStatus> = ExpenseStatusName::ALL
        .iter()
        .map(|status| ExpenseStatus {
            status_id: status.id(),
            status_name: status.as_str().to_string(),
        })
        .collect();
}

pub fn categories() -> Vec<ExpenseCategory> {
    CATEGORIES.clone()
}

pub fn statuses() -> Vec<ExpenseStatus> {
    STATUSES.clone()
}

/// Two sample expenses, dated relative to now
pub fn expenses() -> Vec<Expense> {
    let now = Utc::now();

    vec![
        Expense {
            expense_id: 1,
            user_id: 1,
            user_name: "Demo User".to_string(),
            email: "demo@example.com".to_string(),
            category_id: 1,
            category_name: "Travel".to_string(),
            status_id: ExpenseStatusName::Submitted.id(),
            status_name: ExpenseStatusName::Submitted.to_string(),
            amount_minor: 12000,
            amount: 120.00,
            currency: "GBP".to_string(),
            expense_date: (now - Duration::days(5)).date_naive(),
            description: Some("Client meeting travel".to_string()),
            receipt_file: None,
            submitted_at: Some(now - Duration::days(4)),
            reviewed_by: None,
            reviewed_at: None,
            created_at: now - Duration::days(5),
        },
        Expense {
            expense_id: 2,
            user_id: 1,
            user_name: "Demo User".to_string(),
            email: "demo@example.com".to_string(),
            category_id: 2,
            category_name: "Meals".to_string(),
            status_id: ExpenseStatusName::Approved.id(),
            status_name: ExpenseStatusName::Approved.to_string(),
            amount_minor: 6900,
            amount: 69.00,
            currency: "GBP".to_string(),
            expense_date: (now - Duration::days(10)).date_naive(),
            description: Some("Business lunch".to_string()),
            receipt_file: None,
            submitted_at: Some(now - Duration::days(9)),
            reviewed_by: None,
            reviewed_at: Some(now - Duration::days(8)),
            created_at: now - Duration::days(10),
        },
    ]
}

pub fn expenses_with_status(status: ExpenseStatusName) -> Vec<Expense> {
    expenses()
        .into_iter()
        .filter(|e| e.status_name == status.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_dataset_shape() {
        assert_eq!(expenses().len(), 2);
        assert_eq!(categories().len(), 4);
        assert_eq!(statuses().len(), 4);
        assert_eq!(statuses()[1].status_name, "Submitted");
    }

    #[test]
    fn test_pending_fallback_is_submitted_only() {
        let pending = expenses_with_status(ExpenseStatusName::Submitted);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].description.as_deref(), Some("Client meeting travel"));
        assert!(expenses_with_status(ExpenseStatusName::Rejected).is_empty());
    }
}
