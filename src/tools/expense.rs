//! The six expense tools offered to the model

use super::{outcome_to_json, parse_arguments, Tool};
use crate::config::Principal;
use crate::error::OrchestrationError;
use crate::models::{CreateExpenseRequest, ExpenseStatusName, StoreOutcome};
use crate::store::ExpenseStore;
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

fn no_parameters() -> Value {
    json!({ "type": "object", "properties": {} })
}

//
// ================= Read tools =================
//

pub struct GetAllExpensesTool {
    store: Arc<dyn ExpenseStore>,
}

impl GetAllExpensesTool {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetAllExpensesTool {
    fn name(&self) -> &'static str {
        "get_all_expenses"
    }

    fn description(&self) -> &'static str {
        "Retrieves all expenses from the database"
    }

    fn parameters(&self) -> Value {
        no_parameters()
    }

    async fn execute(&self, _arguments: &Value) -> Result<StoreOutcome<Value>> {
        outcome_to_json(self.store.list_all().await)
    }
}

#[derive(Debug, Deserialize)]
struct StatusArguments {
    status: String,
}

pub struct GetExpensesByStatusTool {
    store: Arc<dyn ExpenseStore>,
}

impl GetExpensesByStatusTool {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetExpensesByStatusTool {
    fn name(&self) -> &'static str {
        "get_expenses_by_status"
    }

    fn description(&self) -> &'static str {
        "Retrieves expenses filtered by status (Draft, Submitted, Approved, Rejected)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "The expense status to filter by",
                    "enum": ["Draft", "Submitted", "Approved", "Rejected"]
                }
            },
            "required": ["status"]
        })
    }

    async fn execute(&self, arguments: &Value) -> Result<StoreOutcome<Value>> {
        let args: StatusArguments = parse_arguments(arguments)?;
        let status = args
            .status
            .parse::<ExpenseStatusName>()
            .map_err(OrchestrationError::InvalidToolInput)?;

        outcome_to_json(self.store.list_by_status(status).await)
    }
}

pub struct GetPendingExpensesTool {
    store: Arc<dyn ExpenseStore>,
}

impl GetPendingExpensesTool {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetPendingExpensesTool {
    fn name(&self) -> &'static str {
        "get_pending_expenses"
    }

    fn description(&self) -> &'static str {
        "Retrieves all expenses pending approval (status = Submitted)"
    }

    fn parameters(&self) -> Value {
        no_parameters()
    }

    async fn execute(&self, _arguments: &Value) -> Result<StoreOutcome<Value>> {
        outcome_to_json(self.store.list_pending().await)
    }
}

pub struct GetCategoriesTool {
    store: Arc<dyn ExpenseStore>,
}

impl GetCategoriesTool {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetCategoriesTool {
    fn name(&self) -> &'static str {
        "get_categories"
    }

    fn description(&self) -> &'static str {
        "Retrieves all available expense categories"
    }

    fn parameters(&self) -> Value {
        no_parameters()
    }

    async fn execute(&self, _arguments: &Value) -> Result<StoreOutcome<Value>> {
        outcome_to_json(self.store.list_categories().await)
    }
}

//
// ================= Write tools =================
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExpenseArguments {
    amount: f64,
    category_id: i32,
    date: String,
    #[serde(default)]
    description: Option<String>,
}

impl CreateExpenseArguments {
    fn into_request(self, principal: Principal) -> Result<CreateExpenseRequest> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(OrchestrationError::InvalidToolInput(format!(
                "amount must be a positive number, got {}",
                self.amount
            )));
        }

        let expense_date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").map_err(|_| {
            OrchestrationError::InvalidToolInput(format!(
                "date must be in YYYY-MM-DD format, got '{}'",
                self.date
            ))
        })?;

        Ok(CreateExpenseRequest {
            user_id: principal.user_id,
            category_id: self.category_id,
            amount: self.amount,
            expense_date,
            description: self.description.filter(|d| !d.trim().is_empty()),
            submit_now: true,
        })
    }
}

/// Creates and submits an expense on behalf of the configured user
pub struct CreateExpenseTool {
    store: Arc<dyn ExpenseStore>,
    principal: Principal,
}

impl CreateExpenseTool {
    pub fn new(store: Arc<dyn ExpenseStore>, principal: Principal) -> Self {
        Self { store, principal }
    }
}

#[async_trait]
impl Tool for CreateExpenseTool {
    fn name(&self) -> &'static str {
        "create_expense"
    }

    fn description(&self) -> &'static str {
        "Creates a new expense"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "amount": {
                    "type": "number",
                    "description": "The expense amount in pounds (e.g., 25.50)"
                },
                "categoryId": {
                    "type": "integer",
                    "description": "The category ID (1=Travel, 2=Meals, 3=Supplies, 4=Accommodation)"
                },
                "date": {
                    "type": "string",
                    "description": "The expense date in YYYY-MM-DD format"
                },
                "description": {
                    "type": "string",
                    "description": "Description of the expense"
                }
            },
            "required": ["amount", "categoryId", "date"]
        })
    }

    async fn execute(&self, arguments: &Value) -> Result<StoreOutcome<Value>> {
        let args: CreateExpenseArguments = parse_arguments(arguments)?;
        let request = args.into_request(self.principal)?;

        outcome_to_json(self.store.create(request).await)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveArguments {
    expense_id: i32,
}

/// Approves a submitted expense as the configured reviewer
pub struct ApproveExpenseTool {
    store: Arc<dyn ExpenseStore>,
    principal: Principal,
}

impl ApproveExpenseTool {
    pub fn new(store: Arc<dyn ExpenseStore>, principal: Principal) -> Self {
        Self { store, principal }
    }
}

#[async_trait]
impl Tool for ApproveExpenseTool {
    fn name(&self) -> &'static str {
        "approve_expense"
    }

    fn description(&self) -> &'static str {
        "Approves a pending expense"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expenseId": {
                    "type": "integer",
                    "description": "The ID of the expense to approve"
                }
            },
            "required": ["expenseId"]
        })
    }

    async fn execute(&self, arguments: &Value) -> Result<StoreOutcome<Value>> {
        let args: ApproveArguments = parse_arguments(arguments)?;

        outcome_to_json(
            self.store
                .approve(args.expense_id, self.principal.reviewer_id)
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_arguments_validation() {
        let principal = Principal {
            user_id: 7,
            reviewer_id: 8,
        };

        let parsed: CreateExpenseArguments =
            parse_arguments(&json!({"amount": 12.5, "categoryId": 2, "date": "2024-02-29"})).unwrap();
        let request = parsed.into_request(principal).unwrap();
        assert_eq!(request.user_id, 7);
        assert!(request.submit_now);
        assert_eq!(request.expense_date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(request.description, None);

        let negative: CreateExpenseArguments =
            parse_arguments(&json!({"amount": -3, "categoryId": 2, "date": "2024-02-01"})).unwrap();
        assert!(matches!(
            negative.into_request(principal),
            Err(OrchestrationError::InvalidToolInput(_))
        ));

        let bad_date: CreateExpenseArguments =
            parse_arguments(&json!({"amount": 3, "categoryId": 2, "date": "2023-02-29"})).unwrap();
        assert!(bad_date.into_request(principal).is_err());
    }

    #[test]
    fn test_approve_arguments_use_camel_case() {
        let parsed: ApproveArguments = parse_arguments(&json!({"expenseId": 5})).unwrap();
        assert_eq!(parsed.expense_id, 5);

        let snake = parse_arguments::<ApproveArguments>(&json!({"expense_id": 5}));
        assert!(snake.is_err());
    }
}
