//! Typed views of the accounting system's entities.
//!
//! The service never owns these records; it reads them and asks the
//! accounting port to act on them.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::domain::status::UnknownStatus;

/// Identity authorizing privileged writes against the ledger.
///
/// Passed explicitly into every mutating ledger call instead of switching
/// the ambient user of a shared session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevatedCredential {
    actor: String,
}

impl ElevatedCredential {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Draft,
    Posted,
    Cancelled,
}

impl FromStr for InvoiceState {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceState::Draft),
            "posted" => Ok(InvoiceState::Posted),
            "cancelled" | "cancel" => Ok(InvoiceState::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvoicePaymentState {
    NotPaid,
    Partial,
    Paid,
}

impl InvoicePaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoicePaymentState::NotPaid => "not_paid",
            InvoicePaymentState::Partial => "partial",
            InvoicePaymentState::Paid => "paid",
        }
    }

    /// Derives the payment state from what is still owed.
    pub fn from_amounts(total: &BigDecimal, residual: &BigDecimal) -> Self {
        let zero = BigDecimal::from(0);
        if residual <= &zero {
            InvoicePaymentState::Paid
        } else if residual < total {
            InvoicePaymentState::Partial
        } else {
            InvoicePaymentState::NotPaid
        }
    }
}

impl FromStr for InvoicePaymentState {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_paid" => Ok(InvoicePaymentState::NotPaid),
            "partial" => Ok(InvoicePaymentState::Partial),
            "paid" => Ok(InvoicePaymentState::Paid),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Invoice {
    pub id: i64,
    pub name: String,
    pub company_id: i64,
    pub partner_id: i64,
    pub state: InvoiceState,
    pub currency: String,
    #[schema(value_type = String)]
    pub amount_total: BigDecimal,
    #[schema(value_type = String)]
    pub amount_residual: BigDecimal,
    pub payment_state: InvoicePaymentState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partner {
    pub id: i64,
    pub name: String,
    /// Default payer number for invoice-driven checkouts.
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalKind {
    Bank,
    Cash,
    Sale,
    Purchase,
    General,
}

impl JournalKind {
    /// Bank and cash journals can receive customer payments.
    pub fn accepts_payments(&self) -> bool {
        matches!(self, JournalKind::Bank | JournalKind::Cash)
    }
}

impl FromStr for JournalKind {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank" => Ok(JournalKind::Bank),
            "cash" => Ok(JournalKind::Cash),
            "sale" => Ok(JournalKind::Sale),
            "purchase" => Ok(JournalKind::Purchase),
            "general" => Ok(JournalKind::General),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMethodLine {
    pub id: i64,
    pub journal_id: i64,
    pub name: String,
    pub code: String,
}

impl PaymentMethodLine {
    pub fn is_manual(&self) -> bool {
        self.code.eq_ignore_ascii_case("manual") || self.name.to_lowercase().contains("manual")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    pub id: i64,
    pub company_id: i64,
    pub code: String,
    pub name: String,
    pub kind: JournalKind,
    pub inbound_method_lines: Vec<PaymentMethodLine>,
}

impl fmt::Display for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// Instruction to register and post a customer payment on an invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub invoice_id: i64,
    pub amount: BigDecimal,
    pub journal_id: i64,
    pub method_line_id: i64,
    pub payment_date: NaiveDate,
    /// Unique per transaction; the ledger returns the existing payment when
    /// the same communication is registered twice.
    pub communication: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredPayment {
    pub id: i64,
    pub invoice_id: i64,
    pub amount: BigDecimal,
    pub communication: String,
    /// False when the ledger already held a payment for this communication.
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub invoice_lines: usize,
    pub payment_lines: usize,
}

impl ReconcileOutcome {
    pub fn matched_anything(&self) -> bool {
        self.invoice_lines > 0 && self.payment_lines > 0
    }
}
