use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use spl_associated_token_account::get_associated_token_address;

use crate::error::{MinthawkError, Result};

/// Signing wallet for the single trading account.
pub struct Wallet {
    keypair: Keypair,
}

impl Wallet {
    /// Build from a base58-encoded 64-byte secret key.
    pub fn from_base58(private_key: &str) -> Result<Self> {
        let bytes = bs58::decode(private_key.trim())
            .into_vec()
            .map_err(|e| MinthawkError::Wallet(format!("invalid base58 private key: {e}")))?;
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| MinthawkError::Wallet(format!("invalid keypair bytes: {e}")))?;
        Ok(Self { keypair })
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// The wallet's associated token account for a mint.
    pub fn associated_token_account(&self, mint: &Pubkey) -> Pubkey {
        get_associated_token_address(&self.pubkey(), mint)
    }
}
