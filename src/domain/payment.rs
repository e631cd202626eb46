use crate::error::FlowError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum length the gateway accepts for each PCR field.
pub const PCR_MAX_LEN: usize = 12;

/// Currency every consent and payment is denominated in.
pub const CURRENCY: &str = "NZD";

/// Cents are the smallest unit the gateway accepts.
pub const AMOUNT_SCALE: u32 = 2;

/// Represents a positive monetary amount in NZD.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    /// Accepts positive values with at most [`AMOUNT_SCALE`] decimal places.
    ///
    /// Trailing zeros do not count, so `12.500` is fine but `12.505` is not.
    pub fn new(value: Decimal) -> Result<Self, FlowError> {
        if value <= Decimal::ZERO {
            return Err(FlowError::Validation("Amount must be positive".to_string()));
        }
        let value = value.normalize();
        if value.scale() > AMOUNT_SCALE {
            return Err(FlowError::Validation(format!(
                "Amount must have at most {AMOUNT_SCALE} decimal places"
            )));
        }
        Ok(Self(value))
    }

    /// Renders the amount the way the gateway expects it: two decimal places.
    pub fn to_wire(&self) -> String {
        format!("{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = FlowError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Particulars, code and reference shown on the payer's bank statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pcr {
    pub particulars: String,
    pub code: String,
    pub reference: String,
}

impl Pcr {
    pub fn new(
        particulars: impl Into<String>,
        code: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            particulars: particulars.into(),
            code: code.into(),
            reference: reference.into(),
        }
    }

    /// Returns a copy with every field cut to [`PCR_MAX_LEN`] characters.
    pub fn truncated(&self) -> Self {
        Self {
            particulars: truncate_field(&self.particulars),
            code: truncate_field(&self.code),
            reference: truncate_field(&self.reference),
        }
    }
}

/// Keeps the first [`PCR_MAX_LEN`] characters (not bytes) of `value`.
pub fn truncate_field(value: &str) -> String {
    value.chars().take(PCR_MAX_LEN).collect()
}

/// The cart being paid for: what gets bound into the consent and payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: Amount,
    pub pcr: Pcr,
    /// Upper bound for enduring consents. Falls back to `amount` when unset.
    pub maximum_amount: Option<Amount>,
}

impl PaymentRequest {
    pub fn new(amount: Amount, pcr: Pcr) -> Self {
        Self {
            amount,
            pcr,
            maximum_amount: None,
        }
    }

    pub fn with_maximum_amount(mut self, maximum: Amount) -> Self {
        self.maximum_amount = Some(maximum);
        self
    }

    pub fn maximum_amount(&self) -> Amount {
        self.maximum_amount.unwrap_or(self.amount)
    }
}
