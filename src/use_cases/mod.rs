pub mod handle_checkout_event;
pub mod initiate_invoice_payment;
pub mod initiate_payment;
pub mod invoice_payments;
pub mod refresh_status;

pub use handle_checkout_event::{CheckoutEventOutcome, HandleCheckoutEvent, WebhookError};
pub use initiate_invoice_payment::{InitiateInvoicePayment, InvoicePaymentOverrides};
pub use initiate_payment::{InitiateError, InitiatePayment, InitiatePaymentInput};
pub use invoice_payments::{InvoicePayments, InvoicePaymentsError, PaymentStats};
pub use refresh_status::{RefreshError, RefreshStatus};
