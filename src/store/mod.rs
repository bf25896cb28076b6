//! Expense store
//!
//! Every operation reports a [`StoreOutcome`]: reads degrade to the fallback
//! dataset when the backing database is unreachable, writes fail with a
//! diagnostic string.

use crate::models::{
    CreateExpenseRequest, Expense, ExpenseCategory, ExpenseStatus, ExpenseStatusName,
    StoreOutcome, UpdateStatusRequest,
};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub mod fallback;
pub mod memory;
pub mod postgres;

pub use memory::InMemoryExpenseStore;
pub use postgres::PostgresExpenseStore;

#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn list_all(&self) -> StoreOutcome<Vec<Expense>>;
    async fn get_by_id(&self, expense_id: i32) -> StoreOutcome<Expense>;
    async fn list_by_status(&self, status: ExpenseStatusName) -> StoreOutcome<Vec<Expense>>;
    /// Expenses awaiting approval
    async fn list_pending(&self) -> StoreOutcome<Vec<Expense>>;
    async fn create(&self, request: CreateExpenseRequest) -> StoreOutcome<Expense>;
    async fn update_status(&self, request: UpdateStatusRequest) -> StoreOutcome<Expense>;
    async fn approve(&self, expense_id: i32, reviewer_id: i32) -> StoreOutcome<Expense>;
    async fn list_categories(&self) -> StoreOutcome<Vec<ExpenseCategory>>;
    async fn list_statuses(&self) -> StoreOutcome<Vec<ExpenseStatus>>;
    fn is_connected(&self) -> bool;
}

/// Postgres when a database URL is configured, otherwise the in-memory store
pub fn store_from_config(database_url: Option<&str>) -> Result<Arc<dyn ExpenseStore>> {
    match database_url {
        Some(url) => {
            info!("Using Postgres expense store");
            Ok(Arc::new(PostgresExpenseStore::connect_lazy(url)?))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory expense store");
            Ok(Arc::new(InMemoryExpenseStore::new()))
        }
    }
}
