//! Postgres-backed expense store
//!
//! The pool connects lazily and the schema is created on first use.
//! Any connection or query failure clears the connected flag; reads then
//! degrade to the fallback dataset, writes report the diagnostic.
//! Constraint violations are the database answering, so they keep the flag.

use super::{fallback, ExpenseStore};
use crate::error::OrchestrationError;
use crate::models::{
    from_minor_units, to_minor_units, CreateExpenseRequest, Expense, ExpenseCategory,
    ExpenseStatus, ExpenseStatusName, StoreOutcome, UpdateStatusRequest,
};
use crate::Result;
use async_trait::async_trait;
use sqlx::error::{DatabaseError, ErrorKind};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
      user_id INTEGER PRIMARY KEY,
      user_name TEXT NOT NULL,
      email TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expense_categories (
      category_id INTEGER PRIMARY KEY,
      category_name TEXT NOT NULL,
      is_active BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expense_statuses (
      status_id INTEGER PRIMARY KEY,
      status_name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expenses (
      expense_id SERIAL PRIMARY KEY,
      user_id INTEGER NOT NULL REFERENCES users (user_id),
      category_id INTEGER NOT NULL REFERENCES expense_categories (category_id),
      status_id INTEGER NOT NULL REFERENCES expense_statuses (status_id),
      amount_minor BIGINT NOT NULL,
      currency TEXT NOT NULL DEFAULT 'GBP',
      expense_date DATE NOT NULL,
      description TEXT,
      receipt_file TEXT,
      submitted_at TIMESTAMPTZ,
      reviewed_by INTEGER REFERENCES users (user_id),
      reviewed_at TIMESTAMPTZ,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_expenses_status_time
    ON expenses (status_id, created_at)
    "#,
    r#"
    INSERT INTO users (user_id, user_name, email) VALUES
      (1, 'Demo User', 'demo@example.com'),
      (2, 'Demo Manager', 'manager@example.com')
    ON CONFLICT (user_id) DO NOTHING
    "#,
];

const EXPENSE_SELECT: &str = r#"
    SELECT e.expense_id, e.user_id, u.user_name, u.email,
           e.category_id, c.category_name, e.status_id, s.status_name,
           e.amount_minor, e.currency, e.expense_date, e.description, e.receipt_file,
           e.submitted_at, e.reviewed_by, e.reviewed_at, e.created_at
    FROM expenses e
    JOIN users u ON u.user_id = e.user_id
    JOIN expense_categories c ON c.category_id = e.category_id
    JOIN expense_statuses s ON s.status_id = e.status_id
"#;

pub struct PostgresExpenseStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
    connected: AtomicBool,
}

impl PostgresExpenseStore {
    /// Build a store over a lazily connecting pool; no I/O happens here
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(database_url)
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Invalid database URL: {}", e))
            })?;

        info!("Expense store backend: postgres");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
            connected: AtomicBool::new(false),
        }
    }

    async fn ensure_schema(&self) -> std::result::Result<(), sqlx::Error> {
        let pool = &self.pool;

        self.schema_ready
            .get_or_try_init(|| async move {
                for statement in SCHEMA {
                    sqlx::query(*statement).execute(pool).await?;
                }

                for category in fallback::categories() {
                    sqlx::query(
                        "INSERT INTO expense_categories (category_id, category_name, is_active) \
                         VALUES ($1, $2, $3) ON CONFLICT (category_id) DO NOTHING",
                    )
                    .bind(category.category_id)
                    .bind(&category.category_name)
                    .bind(category.is_active)
                    .execute(pool)
                    .await?;
                }

                for status in ExpenseStatusName::ALL {
                    sqlx::query(
                        "INSERT INTO expense_statuses (status_id, status_name) \
                         VALUES ($1, $2) ON CONFLICT (status_id) DO NOTHING",
                    )
                    .bind(status.id())
                    .bind(status.as_str())
                    .execute(pool)
                    .await?;
                }

                Ok::<(), sqlx::Error>(())
            })
            .await?;

        Ok(())
    }

    /// Record a failure and format the diagnostic handed back to callers
    fn failure(&self, location: &str, e: sqlx::Error) -> String {
        self.connected.store(false, Ordering::Relaxed);
        error!(location, error = %e, "Expense store operation failed");
        format!("Error in PostgresExpenseStore::{}: {}", location, e)
    }

    /// The database refused the write; the connection itself is fine
    fn rejected(&self, location: &str, message: String) -> StoreOutcome<Expense> {
        self.connected.store(true, Ordering::Relaxed);
        warn!(location, reason = %message, "Expense write rejected by database");
        StoreOutcome::Err(message)
    }

    fn succeeded<T>(&self, value: T) -> StoreOutcome<T> {
        self.connected.store(true, Ordering::Relaxed);
        StoreOutcome::Ok(value)
    }

    async fn fetch_expenses(
        &self,
        status: Option<ExpenseStatusName>,
    ) -> std::result::Result<Vec<Expense>, sqlx::Error> {
        self.ensure_schema().await?;

        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "{} WHERE s.status_name = $1 ORDER BY e.created_at DESC",
                    EXPENSE_SELECT
                );
                sqlx::query(&sql)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("{} ORDER BY e.created_at DESC", EXPENSE_SELECT);
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        rows.iter().map(map_expense).collect()
    }

    async fn fetch_one(&self, expense_id: i32) -> std::result::Result<Option<Expense>, sqlx::Error> {
        self.ensure_schema().await?;

        let sql = format!("{} WHERE e.expense_id = $1", EXPENSE_SELECT);
        let row = sqlx::query(&sql)
            .bind(expense_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_expense).transpose()
    }

    async fn read_listing(
        &self,
        location: &str,
        status: Option<ExpenseStatusName>,
    ) -> StoreOutcome<Vec<Expense>> {
        match self.fetch_expenses(status).await {
            Ok(expenses) => self.succeeded(expenses),
            Err(e) => {
                let message = self.failure(location, e);
                let placeholder = match status {
                    Some(status) => fallback::expenses_with_status(status),
                    None => fallback::expenses(),
                };
                StoreOutcome::OkWithWarning(placeholder, message)
            }
        }
    }

    /// Run a write that returns the affected expense id, then reload it
    async fn write_and_reload<Fut>(
        &self,
        write: Fut,
    ) -> std::result::Result<Option<Expense>, sqlx::Error>
    where
        Fut: Future<Output = std::result::Result<Option<i32>, sqlx::Error>> + Send,
    {
        self.ensure_schema().await?;
        match write.await? {
            Some(expense_id) => self.fetch_one(expense_id).await,
            None => Ok(None),
        }
    }

    fn write_outcome(
        &self,
        location: &str,
        not_found: String,
        references: &[(&str, String)],
        result: std::result::Result<Option<Expense>, sqlx::Error>,
    ) -> StoreOutcome<Expense> {
        match result {
            Ok(Some(expense)) => self.succeeded(expense),
            Ok(None) => {
                self.connected.store(true, Ordering::Relaxed);
                StoreOutcome::Err(not_found)
            }
            Err(sqlx::Error::Database(db)) if is_rejection(db.as_ref()) => {
                self.rejected(location, rejection_message(db.as_ref(), references))
            }
            Err(e) => StoreOutcome::Err(self.failure(location, e)),
        }
    }

    async fn fetch_categories(&self) -> std::result::Result<Vec<ExpenseCategory>, sqlx::Error> {
        self.ensure_schema().await?;
        let rows = sqlx::query(
            "SELECT category_id, category_name, is_active FROM expense_categories ORDER BY category_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_category).collect()
    }

    async fn fetch_statuses(&self) -> std::result::Result<Vec<ExpenseStatus>, sqlx::Error> {
        self.ensure_schema().await?;
        let rows = sqlx::query("SELECT status_id, status_name FROM expense_statuses ORDER BY status_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(map_status).collect()
    }
}

fn map_category(row: &PgRow) -> std::result::Result<ExpenseCategory, sqlx::Error> {
    Ok(ExpenseCategory {
        category_id: row.try_get("category_id")?,
        category_name: row.try_get("category_name")?,
        is_active: row.try_get("is_active")?,
    })
}

fn map_status(row: &PgRow) -> std::result::Result<ExpenseStatus, sqlx::Error> {
    Ok(ExpenseStatus {
        status_id: row.try_get("status_id")?,
        status_name: row.try_get("status_name")?,
    })
}

fn map_expense(row: &PgRow) -> std::result::Result<Expense, sqlx::Error> {
    let amount_minor: i64 = row.try_get("amount_minor")?;

    Ok(Expense {
        expense_id: row.try_get("expense_id")?,
        user_id: row.try_get("user_id")?,
        user_name: row.try_get("user_name")?,
        email: row.try_get("email")?,
        category_id: row.try_get("category_id")?,
        category_name: row.try_get("category_name")?,
        status_id: row.try_get("status_id")?,
        status_name: row.try_get("status_name")?,
        amount_minor,
        amount: from_minor_units(amount_minor),
        currency: row.try_get("currency")?,
        expense_date: row.try_get("expense_date")?,
        description: row.try_get("description")?,
        receipt_file: row.try_get("receipt_file")?,
        submitted_at: row.try_get("submitted_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewed_at: row.try_get("reviewed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ExpenseStore for PostgresExpenseStore {
    async fn list_all(&self) -> StoreOutcome<Vec<Expense>> {
        self.read_listing("list_all", None).await
    }

    async fn get_by_id(&self, expense_id: i32) -> StoreOutcome<Expense> {
        match self.fetch_one(expense_id).await {
            Ok(Some(expense)) => self.succeeded(expense),
            Ok(None) => StoreOutcome::Err("Expense not found".to_string()),
            Err(e) => StoreOutcome::Err(self.failure("get_by_id", e)),
        }
    }

    async fn list_by_status(&self, status: ExpenseStatusName) -> StoreOutcome<Vec<Expense>> {
        self.read_listing("list_by_status", Some(status)).await
    }

    async fn list_pending(&self) -> StoreOutcome<Vec<Expense>> {
        self.read_listing("list_pending", Some(ExpenseStatusName::Submitted))
            .await
    }

    async fn create(&self, request: CreateExpenseRequest) -> StoreOutcome<Expense> {
        let status = if request.submit_now {
            ExpenseStatusName::Submitted
        } else {
            ExpenseStatusName::Draft
        };
        let references = [
            ("category_id", format!("Unknown category id {}", request.category_id)),
            ("user_id", format!("Unknown user id {}", request.user_id)),
        ];

        let insert = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO expenses
              (user_id, category_id, status_id, amount_minor, currency, expense_date, description, submitted_at)
            VALUES
              ($1, $2, $3, $4, 'GBP', $5, $6, CASE WHEN $7 THEN NOW() ELSE NULL END)
            RETURNING expense_id
            "#,
        )
        .bind(request.user_id)
        .bind(request.category_id)
        .bind(status.id())
        .bind(to_minor_units(request.amount))
        .bind(request.expense_date)
        .bind(request.description)
        .bind(request.submit_now)
        .fetch_optional(&self.pool);

        let result = self.write_and_reload(insert).await;
        self.write_outcome(
            "create",
            "Failed to create expense".to_string(),
            &references,
            result,
        )
    }

    async fn update_status(&self, request: UpdateStatusRequest) -> StoreOutcome<Expense> {
        let references = [(
            "reviewed_by",
            format!("Unknown reviewer id {}", request.reviewed_by.unwrap_or_default()),
        )];
        let update = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE expenses SET
              status_id = $2,
              submitted_at = CASE WHEN $2 = 2 THEN NOW() ELSE submitted_at END,
              reviewed_by = CASE WHEN $2 IN (3, 4) THEN $3 ELSE reviewed_by END,
              reviewed_at = CASE WHEN $2 IN (3, 4) THEN NOW() ELSE reviewed_at END
            WHERE expense_id = $1
            RETURNING expense_id
            "#,
        )
        .bind(request.expense_id)
        .bind(request.status_name.id())
        .bind(request.reviewed_by)
        .fetch_optional(&self.pool);

        let result = self.write_and_reload(update).await;
        self.write_outcome(
            "update_status",
            format!("Expense {} not found", request.expense_id),
            &references,
            result,
        )
    }

    async fn approve(&self, expense_id: i32, reviewer_id: i32) -> StoreOutcome<Expense> {
        let update = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE expenses SET status_id = $3, reviewed_by = $2, reviewed_at = NOW()
            WHERE expense_id = $1 AND status_id = $4
            RETURNING expense_id
            "#,
        )
        .bind(expense_id)
        .bind(reviewer_id)
        .bind(ExpenseStatusName::Approved.id())
        .bind(ExpenseStatusName::Submitted.id())
        .fetch_optional(&self.pool);

        let result = self.write_and_reload(update).await;
        self.write_outcome(
            "approve",
            format!("Expense {} not found or not awaiting approval", expense_id),
            &[("reviewed_by", format!("Unknown reviewer id {}", reviewer_id))],
            result,
        )
    }

    async fn list_categories(&self) -> StoreOutcome<Vec<ExpenseCategory>> {
        match self.fetch_categories().await {
            Ok(categories) => self.succeeded(categories),
            Err(e) => StoreOutcome::OkWithWarning(
                fallback::categories(),
                self.failure("list_categories", e),
            ),
        }
    }

    async fn list_statuses(&self) -> StoreOutcome<Vec<ExpenseStatus>> {
        match self.fetch_statuses().await {
            Ok(statuses) => self.succeeded(statuses),
            Err(e) => {
                StoreOutcome::OkWithWarning(fallback::statuses(), self.failure("list_statuses", e))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

fn is_rejection(db: &dyn DatabaseError) -> bool {
    matches!(
        db.kind(),
        ErrorKind::ForeignKeyViolation
            | ErrorKind::UniqueViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation
    )
}

/// Name the offending reference when the violated constraint is on a known
/// column, otherwise fall back to the database's own message.
fn rejection_message(db: &dyn DatabaseError, references: &[(&str, String)]) -> String {
    db.constraint()
        .and_then(|constraint| {
            references
                .iter()
                .find(|(column, _)| constraint.contains(column))
        })
        .map(|(_, message)| message.clone())
        .unwrap_or_else(|| db.message().to_string())
}
