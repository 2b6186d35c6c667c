use rust_decimal::Decimal;

use super::Platform;

/// Outcome of one buy or sell attempt.
///
/// Produced once per attempt and never retried internally; retry of the
/// trade decision is the caller's responsibility.
#[derive(Debug, Clone)]
pub struct TradeResult {
    pub success: bool,
    pub platform: Platform,
    /// Transaction signature, present only on success.
    pub tx_signature: Option<String>,
    /// Human-readable failure detail, present only on failure.
    pub error_message: Option<String>,
    /// Realized token quantity (decimal units).
    pub amount: Option<Decimal>,
    /// Realized unit price in SOL per token.
    pub price: Option<Decimal>,
}

impl TradeResult {
    pub fn success(
        platform: Platform,
        tx_signature: String,
        amount: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            success: true,
            platform,
            tx_signature: Some(tx_signature),
            error_message: None,
            amount: Some(amount),
            price: Some(price),
        }
    }

    pub fn failure(platform: Platform, error: impl Into<String>) -> Self {
        Self {
            success: false,
            platform,
            tx_signature: None,
            error_message: Some(error.into()),
            amount: None,
            price: None,
        }
    }
}
