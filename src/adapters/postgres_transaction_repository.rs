//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::db::is_unique_violation;
use crate::domain::status::{ReconciliationState, TransactionStatus};
use crate::domain::transaction::{NewTransaction, Observation, StatusUpdate, Transaction};
use crate::ports::{
    ReconciliationRecord, RepositoryError, RepositoryResult, TransactionRepository,
};

const TRANSACTION_ID_CONSTRAINT: &str = "payment_transactions_transaction_id_key";
const SESSION_ID_CONSTRAINT: &str = "payment_transactions_provider_session_id_key";

const COLUMNS: &str = r#"
    id, transaction_id, provider_session_id, amount, currency, status,
    checkout_status, payment_status, invoice_id, partner_id, phone_number,
    description, reference, payment_link_url, created_at, updated_at,
    completed_at, raw_provider_response, webhook_payload,
    reconciliation_state, reconciliation_error, payment_reference
"#;

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one<'q>(
        &self,
        column: &str,
        value: &'q str,
    ) -> RepositoryResult<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM payment_transactions WHERE {} = $1",
            COLUMNS, column
        );
        let row = sqlx::query_as::<Postgres, TransactionRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TransactionRow::into_domain).transpose()
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        self.find_one("transaction_id", transaction_id).await
    }

    async fn find_by_provider_session_id(
        &self,
        session_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        self.find_one("provider_session_id", session_id).await
    }

    async fn create(&self, input: NewTransaction) -> RepositoryResult<Transaction> {
        let tx = Transaction::new(input);
        let sql = format!(
            r#"
            INSERT INTO payment_transactions (
                id, transaction_id, provider_session_id, amount, currency, status,
                checkout_status, payment_status, invoice_id, partner_id, phone_number,
                description, reference, payment_link_url, created_at, updated_at,
                raw_provider_response, reconciliation_state
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {}
            "#,
            COLUMNS
        );

        let result = sqlx::query_as::<Postgres, TransactionRow>(&sql)
            .bind(tx.id)
            .bind(&tx.transaction_id)
            .bind(&tx.provider_session_id)
            .bind(&tx.amount)
            .bind(&tx.currency)
            .bind(tx.status.as_str())
            .bind(&tx.checkout_status)
            .bind(&tx.payment_status)
            .bind(tx.invoice_id)
            .bind(tx.partner_id)
            .bind(&tx.phone_number)
            .bind(&tx.description)
            .bind(&tx.reference)
            .bind(&tx.payment_link_url)
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .bind(&tx.raw_provider_response)
            .bind(tx.reconciliation_state.as_str())
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => row.into_domain(),
            Err(e) if is_unique_violation(&e, TRANSACTION_ID_CONSTRAINT) => {
                Err(RepositoryError::DuplicateTransaction(tx.transaction_id))
            }
            Err(e) if is_unique_violation(&e, SESSION_ID_CONSTRAINT) => {
                Err(RepositoryError::DuplicateSession(
                    tx.provider_session_id.unwrap_or_default(),
                ))
            }
            Err(e) => Err(RepositoryError::from(e)),
        }
    }

    async fn update_status(
        &self,
        transaction_id: &str,
        observation: Observation,
    ) -> RepositoryResult<StatusUpdate> {
        let mut db_tx = self.pool.begin().await?;

        // Row lock serializes concurrent refreshes of the same transaction.
        let sql = format!(
            "SELECT {} FROM payment_transactions WHERE transaction_id = $1 FOR UPDATE",
            COLUMNS
        );
        let mut tx = sqlx::query_as::<Postgres, TransactionRow>(&sql)
            .bind(transaction_id)
            .fetch_optional(&mut *db_tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(transaction_id.to_string()))?
            .into_domain()?;

        let transition = tx.apply(&observation, Utc::now());

        sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = $2,
                checkout_status = $3,
                payment_status = $4,
                updated_at = $5,
                completed_at = $6,
                raw_provider_response = $7,
                webhook_payload = $8
            WHERE id = $1
            "#,
        )
        .bind(tx.id)
        .bind(tx.status.as_str())
        .bind(&tx.checkout_status)
        .bind(&tx.payment_status)
        .bind(tx.updated_at)
        .bind(tx.completed_at)
        .bind(&tx.raw_provider_response)
        .bind(&tx.webhook_payload)
        .execute(&mut *db_tx)
        .await?;

        db_tx.commit().await?;

        Ok(StatusUpdate {
            transaction: tx,
            transition,
        })
    }

    async fn claim_reconciliation(&self, transaction_id: &str) -> RepositoryResult<bool> {
        let claimed = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE payment_transactions
            SET reconciliation_state = 'in_progress', reconciliation_error = NULL
            WHERE transaction_id = $1
              AND reconciliation_state IN ('not_started', 'failed')
            RETURNING id
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed.is_some())
    }

    async fn reclaim_reconciliation(&self, transaction_id: &str) -> RepositoryResult<bool> {
        let claimed = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE payment_transactions
            SET reconciliation_state = 'in_progress', reconciliation_error = NULL
            WHERE transaction_id = $1
              AND reconciliation_state IN ('not_started', 'failed', 'in_progress')
            RETURNING id
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed.is_some())
    }

    async fn finish_reconciliation(
        &self,
        transaction_id: &str,
        record: ReconciliationRecord,
    ) -> RepositoryResult<Transaction> {
        let sql = format!(
            r#"
            UPDATE payment_transactions
            SET reconciliation_state = $2,
                reconciliation_error = $3,
                payment_reference = COALESCE($4, payment_reference),
                updated_at = NOW()
            WHERE transaction_id = $1
            RETURNING {}
            "#,
            COLUMNS
        );
        let row = sqlx::query_as::<Postgres, TransactionRow>(&sql)
            .bind(transaction_id)
            .bind(record.state.as_str())
            .bind(&record.error)
            .bind(&record.payment_reference)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(transaction_id.to_string()))?;

        row.into_domain()
    }

    async fn list_by_invoice(&self, invoice_id: i64) -> RepositoryResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM payment_transactions WHERE invoice_id = $1 ORDER BY created_at DESC",
            COLUMNS
        );
        let rows = sqlx::query_as::<Postgres, TransactionRow>(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    transaction_id: String,
    provider_session_id: Option<String>,
    amount: bigdecimal::BigDecimal,
    currency: String,
    status: String,
    checkout_status: Option<String>,
    payment_status: Option<String>,
    invoice_id: i64,
    partner_id: i64,
    phone_number: String,
    description: Option<String>,
    reference: Option<String>,
    payment_link_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<NaiveDateTime>,
    raw_provider_response: Option<serde_json::Value>,
    webhook_payload: Option<serde_json::Value>,
    reconciliation_state: String,
    reconciliation_error: Option<String>,
    payment_reference: Option<String>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status: TransactionStatus = self
            .status
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("{} ({})", e, self.transaction_id)))?;
        let reconciliation_state: ReconciliationState = self
            .reconciliation_state
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("{} ({})", e, self.transaction_id)))?;

        Ok(Transaction {
            id: self.id,
            transaction_id: self.transaction_id,
            provider_session_id: self.provider_session_id,
            amount: self.amount,
            currency: self.currency,
            status,
            checkout_status: self.checkout_status,
            payment_status: self.payment_status,
            invoice_id: self.invoice_id,
            partner_id: self.partner_id,
            phone_number: self.phone_number,
            description: self.description,
            reference: self.reference,
            payment_link_url: self.payment_link_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            raw_provider_response: self.raw_provider_response,
            webhook_payload: self.webhook_payload,
            reconciliation_state,
            reconciliation_error: self.reconciliation_error,
            payment_reference: self.payment_reference,
        })
    }
}
