//! Postgres implementation of AccountingLedger over the accounting tables.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres, Transaction as DbTransaction};
use std::collections::HashMap;

use crate::domain::ledger::{
    ElevatedCredential, Invoice, InvoicePaymentState, InvoiceState, Journal, JournalKind,
    Partner, PaymentMethodLine, PaymentRequest, ReconcileOutcome, RegisteredPayment,
};
use crate::ports::{AccountingLedger, LedgerError, LedgerResult};

const INVOICE_COLUMNS: &str = "id, name, company_id, partner_id, state, currency, amount_total, amount_residual, payment_state";

#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_invoice(
        db_tx: &mut DbTransaction<'_, Postgres>,
        invoice_id: i64,
    ) -> LedgerResult<Invoice> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE id = $1 FOR UPDATE",
            INVOICE_COLUMNS
        );
        sqlx::query_as::<Postgres, InvoiceRow>(&sql)
            .bind(invoice_id)
            .fetch_optional(&mut **db_tx)
            .await?
            .ok_or(LedgerError::InvoiceNotFound(invoice_id))?
            .into_domain()
    }
}

#[async_trait]
impl AccountingLedger for PostgresLedger {
    async fn find_invoice(&self, invoice_id: i64) -> LedgerResult<Option<Invoice>> {
        let sql = format!("SELECT {} FROM invoices WHERE id = $1", INVOICE_COLUMNS);
        let row = sqlx::query_as::<Postgres, InvoiceRow>(&sql)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(InvoiceRow::into_domain).transpose()
    }

    async fn find_partner(&self, partner_id: i64) -> LedgerResult<Option<Partner>> {
        let row = sqlx::query_as::<_, (i64, String, Option<String>)>(
            "SELECT id, name, phone FROM partners WHERE id = $1",
        )
        .bind(partner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, name, phone)| Partner { id, name, phone }))
    }

    async fn post_invoice(
        &self,
        credential: &ElevatedCredential,
        invoice_id: i64,
    ) -> LedgerResult<Invoice> {
        let mut db_tx = self.pool.begin().await?;
        let mut invoice = Self::lock_invoice(&mut db_tx, invoice_id).await?;

        match invoice.state {
            InvoiceState::Posted => return Ok(invoice),
            InvoiceState::Cancelled => {
                return Err(LedgerError::Rejected(format!(
                    "invoice {} is cancelled",
                    invoice.name
                )))
            }
            InvoiceState::Draft => {}
        }

        sqlx::query("UPDATE invoices SET state = 'posted' WHERE id = $1")
            .bind(invoice_id)
            .execute(&mut *db_tx)
            .await?;
        if invoice.amount_residual > BigDecimal::from(0) {
            sqlx::query("INSERT INTO receivable_lines (invoice_id, amount) VALUES ($1, $2)")
                .bind(invoice_id)
                .bind(&invoice.amount_residual)
                .execute(&mut *db_tx)
                .await?;
        }
        db_tx.commit().await?;

        tracing::info!(invoice = %invoice.name, actor = credential.actor(), "Invoice posted");
        invoice.state = InvoiceState::Posted;
        Ok(invoice)
    }

    async fn journals(&self, company_id: i64) -> LedgerResult<Vec<Journal>> {
        let rows = sqlx::query_as::<_, (i64, i64, String, String, String)>(
            "SELECT id, company_id, code, name, kind FROM journals WHERE company_id = $1 ORDER BY id",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = rows.iter().map(|row| row.0).collect();
        let lines = sqlx::query_as::<_, (i64, i64, String, String)>(
            r#"
            SELECT id, journal_id, name, code FROM payment_method_lines
            WHERE journal_id = ANY($1) AND payment_type = 'inbound'
            ORDER BY id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_journal: HashMap<i64, Vec<PaymentMethodLine>> = HashMap::new();
        for (id, journal_id, name, code) in lines {
            by_journal.entry(journal_id).or_default().push(PaymentMethodLine {
                id,
                journal_id,
                name,
                code,
            });
        }

        rows.into_iter()
            .map(|(id, company_id, code, name, kind)| {
                let kind: JournalKind = kind
                    .parse()
                    .map_err(|e| LedgerError::Corrupt(format!("journal {}: {}", id, e)))?;
                Ok(Journal {
                    id,
                    company_id,
                    code,
                    name,
                    kind,
                    inbound_method_lines: by_journal.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn create_inbound_method_line(
        &self,
        credential: &ElevatedCredential,
        journal_id: i64,
    ) -> LedgerResult<Option<PaymentMethodLine>> {
        let journal_name = sqlx::query_scalar::<_, String>("SELECT name FROM journals WHERE id = $1")
            .bind(journal_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::JournalNotFound(journal_id))?;

        let name = format!("Manual - {}", journal_name);
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO payment_method_lines (journal_id, name, code, payment_type)
            VALUES ($1, $2, 'manual', 'inbound')
            RETURNING id
            "#,
        )
        .bind(journal_id)
        .bind(&name)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(journal_id, actor = credential.actor(), "Inbound payment method line created");
        Ok(Some(PaymentMethodLine {
            id,
            journal_id,
            name,
            code: "manual".to_string(),
        }))
    }

    async fn register_payment(
        &self,
        credential: &ElevatedCredential,
        request: &PaymentRequest,
    ) -> LedgerResult<RegisteredPayment> {
        let mut db_tx = self.pool.begin().await?;
        let invoice = Self::lock_invoice(&mut db_tx, request.invoice_id).await?;

        let existing = sqlx::query_as::<_, (i64, BigDecimal)>(
            "SELECT id, amount FROM payments WHERE invoice_id = $1 AND communication = $2",
        )
        .bind(request.invoice_id)
        .bind(&request.communication)
        .fetch_optional(&mut *db_tx)
        .await?;
        if let Some((id, amount)) = existing {
            return Ok(RegisteredPayment {
                id,
                invoice_id: request.invoice_id,
                amount,
                communication: request.communication.clone(),
                created: false,
            });
        }

        if invoice.state != InvoiceState::Posted {
            return Err(LedgerError::Rejected(format!(
                "invoice {} is not posted",
                invoice.name
            )));
        }

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO payments (
                invoice_id, journal_id, method_line_id, amount, payment_date, communication, posted_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(request.invoice_id)
        .bind(request.journal_id)
        .bind(request.method_line_id)
        .bind(&request.amount)
        .bind(request.payment_date)
        .bind(&request.communication)
        .bind(credential.actor())
        .fetch_one(&mut *db_tx)
        .await?;

        sqlx::query("INSERT INTO receivable_lines (payment_id, amount) VALUES ($1, $2)")
            .bind(id)
            .bind(&request.amount)
            .execute(&mut *db_tx)
            .await?;
        db_tx.commit().await?;

        Ok(RegisteredPayment {
            id,
            invoice_id: request.invoice_id,
            amount: request.amount.clone(),
            communication: request.communication.clone(),
            created: true,
        })
    }

    async fn reconcile(
        &self,
        _credential: &ElevatedCredential,
        invoice_id: i64,
        payment_id: i64,
    ) -> LedgerResult<ReconcileOutcome> {
        let mut db_tx = self.pool.begin().await?;
        let invoice = Self::lock_invoice(&mut db_tx, invoice_id).await?;

        let invoice_lines = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM receivable_lines WHERE invoice_id = $1 AND NOT reconciled",
        )
        .bind(invoice_id)
        .fetch_one(&mut *db_tx)
        .await?;
        let payment_lines = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM receivable_lines WHERE payment_id = $1 AND NOT reconciled",
        )
        .bind(payment_id)
        .fetch_one(&mut *db_tx)
        .await?;

        let outcome = ReconcileOutcome {
            invoice_lines: invoice_lines as usize,
            payment_lines: payment_lines as usize,
        };
        if !outcome.matched_anything() {
            return Ok(outcome);
        }

        let paid = sqlx::query_scalar::<_, BigDecimal>("SELECT amount FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&mut *db_tx)
            .await?
            .ok_or_else(|| LedgerError::Corrupt(format!("payment {} has no record", payment_id)))?;

        let zero = BigDecimal::from(0);
        let residual = &invoice.amount_residual - &paid;
        let residual = if residual < zero { zero.clone() } else { residual };
        let payment_state = InvoicePaymentState::from_amounts(&invoice.amount_total, &residual);

        sqlx::query("UPDATE invoices SET amount_residual = $2, payment_state = $3 WHERE id = $1")
            .bind(invoice_id)
            .bind(&residual)
            .bind(payment_state.as_str())
            .execute(&mut *db_tx)
            .await?;
        sqlx::query(
            r#"
            UPDATE receivable_lines SET reconciled = TRUE
            WHERE NOT reconciled AND (payment_id = $1 OR ($3 AND invoice_id = $2))
            "#,
        )
        .bind(payment_id)
        .bind(invoice_id)
        .bind(residual == zero)
        .execute(&mut *db_tx)
        .await?;
        db_tx.commit().await?;

        Ok(outcome)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    name: String,
    company_id: i64,
    partner_id: i64,
    state: String,
    currency: String,
    amount_total: BigDecimal,
    amount_residual: BigDecimal,
    payment_state: String,
}

impl InvoiceRow {
    fn into_domain(self) -> LedgerResult<Invoice> {
        let state: InvoiceState = self
            .state
            .parse()
            .map_err(|e| LedgerError::Corrupt(format!("invoice {}: {}", self.id, e)))?;
        let payment_state: InvoicePaymentState = self
            .payment_state
            .parse()
            .map_err(|e| LedgerError::Corrupt(format!("invoice {}: {}", self.id, e)))?;

        Ok(Invoice {
            id: self.id,
            name: self.name,
            company_id: self.company_id,
            partner_id: self.partner_id,
            state,
            currency: self.currency,
            amount_total: self.amount_total,
            amount_residual: self.amount_residual,
            payment_state,
        })
    }
}
