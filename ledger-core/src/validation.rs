//! Input validation shared by the engine and the request layer

use crate::{types::EntryKind, Error, Result};

/// Maximum identifier length (account, option, terminal, card)
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Maximum idempotency key length
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Maximum label length (names, items, descriptions)
pub const MAX_LABEL_LEN: usize = 120;

/// Identifiers end up inside composite index keys, so they are restricted
/// to a separator-free alphabet.
fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

/// Validate an identifier field
pub fn identifier(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::Validation(format!(
            "{} exceeds {} characters",
            field, MAX_IDENTIFIER_LEN
        )));
    }
    if !value.chars().all(is_identifier_char) {
        return Err(Error::Validation(format!(
            "{} contains invalid characters",
            field
        )));
    }
    Ok(())
}

/// Validate a client-generated idempotency key
pub fn idempotency_key(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation("idempotencyKey is required".to_string()));
    }
    if value.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(Error::Validation(format!(
            "idempotencyKey exceeds {} characters",
            MAX_IDEMPOTENCY_KEY_LEN
        )));
    }
    if !value.chars().all(is_identifier_char) {
        return Err(Error::Validation(
            "idempotencyKey contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Validate that a signed amount matches its kind
pub fn signed_amount(kind: EntryKind, amount: i64) -> Result<()> {
    if !kind.accepts(amount) {
        let expected = match kind {
            EntryKind::Recharge => "positive",
            EntryKind::Purchase => "negative",
        };
        return Err(Error::Validation(format!(
            "{} amount must be {}, got {}",
            kind, expected, amount
        )));
    }
    Ok(())
}

/// Validate a price (strictly positive)
pub fn price(value: i64) -> Result<()> {
    if value <= 0 {
        return Err(Error::Validation(format!(
            "price must be positive, got {}",
            value
        )));
    }
    Ok(())
}

/// Validate a free-text label
pub fn label(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be blank", field)));
    }
    if value.chars().count() > MAX_LABEL_LEN {
        return Err(Error::Validation(format!(
            "{} exceeds {} characters",
            field, MAX_LABEL_LEN
        )));
    }
    Ok(())
}
