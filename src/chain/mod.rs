pub mod client;
pub mod wallet;

pub use client::SolanaClient;
pub use wallet::Wallet;
