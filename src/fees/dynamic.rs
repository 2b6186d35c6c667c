use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tracing::error;

use super::FeePlugin;
use crate::chain::SolanaClient;
use crate::error::Result;

/// Dynamic priority fee plugin backed by recent per-block fee samples.
///
/// Returns the 70th-percentile sample for the accounts the trade will
/// touch: high enough to bias toward fast inclusion, below the extreme
/// tail paid during mint storms.
pub struct DynamicFee {
    client: Arc<SolanaClient>,
}

const FEE_PERCENTILE: usize = 70;

impl DynamicFee {
    pub fn new(client: Arc<SolanaClient>) -> Self {
        Self { client }
    }
}

/// Percentile over raw samples; `None` when the window is empty.
pub(crate) fn percentile(samples: &mut Vec<u64>, pct: usize) -> Option<u64> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();
    let idx = (samples.len() - 1) * pct / 100;
    Some(samples[idx])
}

#[async_trait]
impl FeePlugin for DynamicFee {
    async fn base_fee(&self, accounts: &[Pubkey]) -> Result<Option<u64>> {
        match self.client.recent_prioritization_fees(accounts).await {
            Ok(mut samples) => Ok(percentile(&mut samples, FEE_PERCENTILE)),
            Err(e) => {
                // A fee-history miss is not fatal; the manager falls back.
                error!("Failed to fetch recent prioritization fees: {e}");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_empty_window_is_none() {
        assert_eq!(percentile(&mut Vec::new(), FEE_PERCENTILE), None);
    }

    #[test]
    fn percentile_of_single_sample_is_that_sample() {
        assert_eq!(percentile(&mut vec![42], FEE_PERCENTILE), Some(42));
    }

    #[test]
    fn seventieth_percentile_sits_below_the_tail() {
        // 1..=10 sorted, idx = 9 * 70 / 100 = 6 -> 7
        let mut samples = vec![10, 1, 9, 2, 8, 3, 7, 4, 6, 5];
        assert_eq!(percentile(&mut samples, FEE_PERCENTILE), Some(7));
    }

    #[test]
    fn percentile_ignores_input_order() {
        let mut a = vec![5, 1, 3];
        let mut b = vec![3, 5, 1];
        assert_eq!(
            percentile(&mut a, FEE_PERCENTILE),
            percentile(&mut b, FEE_PERCENTILE)
        );
    }
}
