//! Validation of the structured model reply.
//!
//! This stage never repairs data. A malformed date or amount is always
//! reported as a failure, never silently defaulted.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::ValidationError;
use crate::llm::ModelReply;

/// A model reply whose fields passed date and amount validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRecord {
    /// Payment date as a real calendar date.
    pub payment_date: NaiveDate,
    /// Non-negative payment amount with at most two fraction digits.
    pub amount: Decimal,
}

/// Validate a model reply against calendar and plausibility rules.
///
/// `max_amount` is the configured ceiling above which an amount is treated
/// as implausible rather than merely malformed.
pub fn validate(reply: &ModelReply, max_amount: u64) -> Result<ValidatedRecord, ValidationError> {
    let payment_date = NaiveDate::parse_from_str(reply.payment_date.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::BadDate(reply.payment_date.clone()))?;

    let raw = reply.amount.to_string();
    let amount = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| ValidationError::BadAmount(raw.clone()))?;

    if amount.is_sign_negative() {
        return Err(ValidationError::BadAmount(raw));
    }

    if amount.normalize().scale() > 2 {
        return Err(ValidationError::BadAmount(raw));
    }

    if amount > Decimal::from(max_amount) {
        return Err(ValidationError::ImplausibleValue(raw));
    }

    debug!(date = %payment_date, %amount, "model reply validated");
    Ok(ValidatedRecord {
        payment_date,
        amount,
    })
}
