use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use super::FeePlugin;
use crate::error::Result;

/// Constant priority fee plugin.
pub struct FixedFee {
    fixed_fee: u64,
}

impl FixedFee {
    pub fn new(fixed_fee: u64) -> Self {
        Self { fixed_fee }
    }
}

#[async_trait]
impl FeePlugin for FixedFee {
    async fn base_fee(&self, _accounts: &[Pubkey]) -> Result<Option<u64>> {
        if self.fixed_fee == 0 {
            return Ok(None);
        }
        Ok(Some(self.fixed_fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_means_no_fee() {
        assert_eq!(FixedFee::new(0).base_fee(&[]).await.unwrap(), None);
        assert_eq!(
            FixedFee::new(250_000).base_fee(&[]).await.unwrap(),
            Some(250_000)
        );
    }
}
