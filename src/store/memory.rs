//! In-memory expense store
//!
//! Seeded with the fallback dataset. Used when no database is configured
//! and as the store under test.

use super::{fallback, ExpenseStore};
use crate::models::{
    from_minor_units, to_minor_units, CreateExpenseRequest, Expense, ExpenseCategory,
    ExpenseStatus, ExpenseStatusName, StoreOutcome, UpdateStatusRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct User {
    name: String,
    email: String,
}

pub struct InMemoryExpenseStore {
    expenses: Arc<RwLock<Vec<Expense>>>,
    categories: Vec<ExpenseCategory>,
    users: HashMap<i32, User>,
}

impl InMemoryExpenseStore {
    pub fn new() -> Self {
        Self::with_expenses(fallback::expenses())
    }

    pub fn with_expenses(expenses: Vec<Expense>) -> Self {
        let mut users = HashMap::new();
        users.insert(
            1,
            User {
                name: "Demo User".to_string(),
                email: "demo@example.com".to_string(),
            },
        );
        users.insert(
            2,
            User {
                name: "Demo Manager".to_string(),
                email: "manager@example.com".to_string(),
            },
        );

        Self {
            expenses: Arc::new(RwLock::new(expenses)),
            categories: fallback::categories(),
            users,
        }
    }

    async fn filtered(&self, status: ExpenseStatusName) -> Vec<Expense> {
        let expenses = self.expenses.read().await;
        expenses
            .iter()
            .filter(|e| e.status_name == status.as_str())
            .cloned()
            .collect()
    }

    async fn set_status(
        &self,
        expense_id: i32,
        status: ExpenseStatusName,
        reviewed_by: Option<i32>,
    ) -> StoreOutcome<Expense> {
        let mut expenses = self.expenses.write().await;
        match expenses.iter_mut().find(|e| e.expense_id == expense_id) {
            Some(expense) => StoreOutcome::Ok(apply_status(expense, status, reviewed_by)),
            None => StoreOutcome::Err(format!("Expense {} not found", expense_id)),
        }
    }
}

fn apply_status(expense: &mut Expense, status: ExpenseStatusName, reviewed_by: Option<i32>) -> Expense {
    let now = Utc::now();
    expense.status_id = status.id();
    expense.status_name = status.to_string();

    match status {
        ExpenseStatusName::Submitted => expense.submitted_at = Some(now),
        ExpenseStatusName::Approved | ExpenseStatusName::Rejected => {
            expense.reviewed_by = reviewed_by;
            expense.reviewed_at = Some(now);
        }
        ExpenseStatusName::Draft => {}
    }

    expense.clone()
}

impl Default for InMemoryExpenseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExpenseStore for InMemoryExpenseStore {
    async fn list_all(&self) -> StoreOutcome<Vec<Expense>> {
        StoreOutcome::Ok(self.expenses.read().await.clone())
    }

    async fn get_by_id(&self, expense_id: i32) -> StoreOutcome<Expense> {
        let expenses = self.expenses.read().await;
        match expenses.iter().find(|e| e.expense_id == expense_id) {
            Some(expense) => StoreOutcome::Ok(expense.clone()),
            None => StoreOutcome::Err("Expense not found".to_string()),
        }
    }

    async fn list_by_status(&self, status: ExpenseStatusName) -> StoreOutcome<Vec<Expense>> {
        StoreOutcome::Ok(self.filtered(status).await)
    }

    async fn list_pending(&self) -> StoreOutcome<Vec<Expense>> {
        StoreOutcome::Ok(self.filtered(ExpenseStatusName::Submitted).await)
    }

    async fn create(&self, request: CreateExpenseRequest) -> StoreOutcome<Expense> {
        let Some(category) = self
            .categories
            .iter()
            .find(|c| c.category_id == request.category_id && c.is_active)
        else {
            return StoreOutcome::Err(format!("Unknown category id {}", request.category_id));
        };

        let Some(user) = self.users.get(&request.user_id) else {
            return StoreOutcome::Err(format!("Unknown user id {}", request.user_id));
        };

        let status = if request.submit_now {
            ExpenseStatusName::Submitted
        } else {
            ExpenseStatusName::Draft
        };

        let now = Utc::now();
        let amount_minor = to_minor_units(request.amount);

        let mut expenses = self.expenses.write().await;
        let expense_id = expenses.iter().map(|e| e.expense_id).max().unwrap_or(0) + 1;

        let expense = Expense {
            expense_id,
            user_id: request.user_id,
            user_name: user.name.clone(),
            email: user.email.clone(),
            category_id: category.category_id,
            category_name: category.category_name.clone(),
            status_id: status.id(),
            status_name: status.to_string(),
            amount_minor,
            amount: from_minor_units(amount_minor),
            currency: "GBP".to_string(),
            expense_date: request.expense_date,
            description: request.description,
            receipt_file: None,
            submitted_at: request.submit_now.then_some(now),
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
        };

        expenses.push(expense.clone());
        StoreOutcome::Ok(expense)
    }

    async fn update_status(&self, request: UpdateStatusRequest) -> StoreOutcome<Expense> {
        self.set_status(request.expense_id, request.status_name, request.reviewed_by)
            .await
    }

    async fn approve(&self, expense_id: i32, reviewer_id: i32) -> StoreOutcome<Expense> {
        // Check and transition under one write lock
        let mut expenses = self.expenses.write().await;

        let Some(expense) = expenses.iter_mut().find(|e| e.expense_id == expense_id) else {
            return StoreOutcome::Err(format!("Expense {} not found", expense_id));
        };

        if expense.status_name != ExpenseStatusName::Submitted.as_str() {
            return StoreOutcome::Err(format!(
                "Expense {} is {}; only Submitted expenses can be approved",
                expense_id, expense.status_name
            ));
        }

        StoreOutcome::Ok(apply_status(
            expense,
            ExpenseStatusName::Approved,
            Some(reviewer_id),
        ))
    }

    async fn list_categories(&self) -> StoreOutcome<Vec<ExpenseCategory>> {
        StoreOutcome::Ok(self.categories.clone())
    }

    async fn list_statuses(&self) -> StoreOutcome<Vec<ExpenseStatus>> {
        StoreOutcome::Ok(fallback::statuses())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request(category_id: i32, submit_now: bool) -> CreateExpenseRequest {
        CreateExpenseRequest {
            user_id: 1,
            category_id,
            amount: 42.5,
            expense_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: Some("Taxi".to_string()),
            submit_now,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_next_id_and_status() {
        let store = InMemoryExpenseStore::new();

        let submitted = store.create(request(1, true)).await;
        let expense = submitted.data().unwrap();
        assert_eq!(expense.expense_id, 3);
        assert_eq!(expense.status_name, "Submitted");
        assert_eq!(expense.amount_minor, 4250);
        assert!(expense.submitted_at.is_some());

        let draft = store.create(request(2, false)).await;
        assert_eq!(draft.data().unwrap().status_name, "Draft");
        assert_eq!(draft.data().unwrap().expense_id, 4);

        let all = store.list_all().await;
        assert_eq!(all.data().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_category() {
        let store = InMemoryExpenseStore::new();
        let outcome = store.create(request(99, true)).await;
        assert_eq!(outcome, StoreOutcome::Err("Unknown category id 99".to_string()));
    }

    #[tokio::test]
    async fn test_approve_moves_submitted_out_of_pending() {
        let store = InMemoryExpenseStore::new();
        assert_eq!(store.list_pending().await.data().unwrap().len(), 1);

        let approved = store.approve(1, 2).await;
        let expense = approved.data().unwrap();
        assert_eq!(expense.status_name, "Approved");
        assert_eq!(expense.reviewed_by, Some(2));

        assert!(store.list_pending().await.data().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approve_rejects_non_submitted_and_missing() {
        let store = InMemoryExpenseStore::new();

        let already = store.approve(2, 2).await;
        assert!(already.error().unwrap().contains("only Submitted"));

        let missing = store.approve(404, 2).await;
        assert_eq!(missing, StoreOutcome::Err("Expense 404 not found".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_approvals_succeed_once() {
        let store = Arc::new(InMemoryExpenseStore::new());

        let handles: Vec<_> = (0..32)
            .map(|reviewer_id| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.approve(1, reviewer_id).await })
            })
            .collect();

        let mut approved_by = Vec::new();
        for handle in handles {
            if let StoreOutcome::Ok(expense) = handle.await.unwrap() {
                approved_by.push(expense.reviewed_by);
            }
        }

        assert_eq!(approved_by.len(), 1);
        let stored = store.get_by_id(1).await;
        assert_eq!(stored.data().unwrap().reviewed_by, approved_by[0]);
    }

    #[tokio::test]
    async fn test_update_status_and_lookup() {
        let store = InMemoryExpenseStore::new();
        let outcome = store
            .update_status(UpdateStatusRequest {
                expense_id: 1,
                status_name: ExpenseStatusName::Rejected,
                reviewed_by: Some(2),
            })
            .await;
        assert_eq!(outcome.data().unwrap().status_name, "Rejected");

        let rejected = store.list_by_status(ExpenseStatusName::Rejected).await;
        assert_eq!(rejected.data().unwrap().len(), 1);

        assert!(store.get_by_id(1).await.data().is_some());
        assert!(store.get_by_id(77).await.is_err());
    }
}
