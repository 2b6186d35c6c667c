use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Main error type for the trading bot
#[derive(Error, Debug)]
pub enum MinthawkError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration:\n{}", .0.join("\n"))]
    Validation(Vec<String>),

    // Chain errors
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Curve error: {0}")]
    Curve(#[from] CurveError),

    // Network errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Wallet errors
    #[error("Wallet error: {0}")]
    Wallet(String),

    // Platform errors
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Journal error: {0}")]
    Journal(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for MinthawkError
pub type Result<T> = std::result::Result<T, MinthawkError>;

/// Errors from bonding-curve pricing. Data errors: fatal for the one
/// operation, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurveError {
    #[error("Invalid reserve state: virtual reserves must be positive")]
    InvalidReserveState,

    #[error("Malformed pool account data: {0}")]
    MalformedAccount(String),
}

/// Errors from the RPC boundary. Distinguishes "data absent" from
/// transport failure so callers can decide what is retryable.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("RPC transport error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),

    #[error("Transaction {0} failed to confirm within timeout")]
    ConfirmationTimeout(String),

    #[error("Transaction send failed after {attempts} attempts: {last_error}")]
    SendExhausted { attempts: u32, last_error: String },
}

impl ChainError {
    /// Transport failures are retryable; missing data is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Rpc(_) | ChainError::ConfirmationTimeout(_))
    }
}
