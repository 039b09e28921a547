//! Durable storage for the single active passcode.
//!
//! Flow Overview:
//! 1) `ensure_schema` creates the `passcodes` table at startup if it is missing.
//! 2) `replace` deletes every row and inserts the new code in one transaction,
//!    serialized by an advisory lock so concurrent replaces cannot leave two rows.
//! 3) `latest` reads the most recent row; readers see either the old or the new
//!    code, never an empty table mid-replace.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use std::fmt;
use tracing::{info_span, Instrument};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));
const REPLACE_LOCK_ID: i64 = 5_000_001;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("passcode storage failed: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone, PartialEq, Eq)]
pub struct PasscodeRecord {
    pub code: String,
    pub set_date: NaiveDate,
}

impl fmt::Debug for PasscodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasscodeRecord")
            .field("code", &"***")
            .field("set_date", &self.set_date)
            .finish()
    }
}

#[async_trait]
pub trait PasscodeStore: Send + Sync {
    /// Atomically make `code` the only stored passcode, dated today.
    async fn replace(&self, code: &str) -> Result<(), StoreError>;

    /// The active passcode, or `None` if none has ever been set.
    async fn latest(&self) -> Result<Option<PasscodeRecord>, StoreError>;

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Clone, Debug)]
pub struct PgPasscodeStore {
    pool: PgPool,
}

impl PgPasscodeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `passcodes` table if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable or the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "CREATE",
            db.statement = SCHEMA_SQL
        );
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PasscodeStore for PgPasscodeStore {
    async fn replace(&self, code: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let lock_query = "SELECT pg_advisory_xact_lock($1)";
        let lock_span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = lock_query
        );
        sqlx::query(lock_query)
            .bind(REPLACE_LOCK_ID)
            .execute(&mut *tx)
            .instrument(lock_span)
            .await?;

        let delete_query = "DELETE FROM passcodes";
        let delete_span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = delete_query
        );
        sqlx::query(delete_query)
            .execute(&mut *tx)
            .instrument(delete_span)
            .await?;

        let insert_query = "INSERT INTO passcodes (code, date) VALUES ($1, CURRENT_DATE)";
        let insert_span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = insert_query
        );
        sqlx::query(insert_query)
            .bind(code)
            .execute(&mut *tx)
            .instrument(insert_span)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn latest(&self) -> Result<Option<PasscodeRecord>, StoreError> {
        let query = "SELECT code, date FROM passcodes ORDER BY date DESC, id DESC LIMIT 1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.map(|row| PasscodeRecord {
            code: row.get("code"),
            set_date: row.get("date"),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}
