use bigdecimal::BigDecimal;
use std::fmt;

pub const TRANSACTION_ID_MAX_LEN: usize = 128;
pub const PHONE_NUMBER_MIN_DIGITS: usize = 7;
pub const PHONE_NUMBER_MAX_DIGITS: usize = 15;
pub const DESCRIPTION_MAX_LEN: usize = 255;
pub const REFERENCE_MAX_LEN: usize = 128;
pub const DEFAULT_CURRENCY: &str = "XOF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Unwraps a field that must be present.
pub fn require<T>(field: &'static str, value: Option<T>) -> Result<T, ValidationError> {
    value.ok_or_else(|| ValidationError::new(field, "is required"))
}

pub fn validate_transaction_id(transaction_id: &str) -> ValidationResult {
    validate_required("transaction_id", transaction_id)?;
    validate_max_len("transaction_id", transaction_id, TRANSACTION_ID_MAX_LEN)?;

    if transaction_id.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(ValidationError::new(
            "transaction_id",
            "must not contain whitespace",
        ));
    }

    Ok(())
}

/// An optional leading `+` followed by digits; spaces and dashes are ignored.
pub fn validate_phone_number(phone_number: &str) -> ValidationResult {
    let phone_number = sanitize_string(phone_number);
    validate_required("phone_number", &phone_number)?;

    let digits = phone_number.strip_prefix('+').unwrap_or(&phone_number);
    if !digits
        .chars()
        .all(|ch| ch.is_ascii_digit() || ch == ' ' || ch == '-')
    {
        return Err(ValidationError::new(
            "phone_number",
            "must contain only digits and an optional leading '+'",
        ));
    }

    let count = digits.chars().filter(|ch| ch.is_ascii_digit()).count();
    if !(PHONE_NUMBER_MIN_DIGITS..=PHONE_NUMBER_MAX_DIGITS).contains(&count) {
        return Err(ValidationError::new(
            "phone_number",
            format!(
                "must have between {} and {} digits",
                PHONE_NUMBER_MIN_DIGITS, PHONE_NUMBER_MAX_DIGITS
            ),
        ));
    }

    Ok(())
}

/// ISO 4217 style: three uppercase letters.
pub fn validate_currency(currency: &str) -> ValidationResult {
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            "must be a three-letter uppercase currency code",
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_positive_id(field: &'static str, id: i64) -> ValidationResult {
    if id <= 0 {
        return Err(ValidationError::new(field, "must be a positive integer"));
    }

    Ok(())
}

pub fn validate_http_url(field: &'static str, value: &str) -> ValidationResult {
    match url::Url::parse(value) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
        Ok(_) => Err(ValidationError::new(field, "must be an http(s) URL")),
        Err(e) => Err(ValidationError::new(field, format!("is not a valid URL: {}", e))),
    }
}
