//! Priority fee estimation.
//!
//! Two interchangeable strategies behind one plugin interface: a fixed
//! constant and a dynamic estimate from recent network fee samples. The
//! manager applies the configured markup, clamps to the hard cap, and
//! returns `None` when no strategy yields a fee (the caller then omits the
//! compute-budget price instruction entirely).

mod dynamic;
mod fixed;

pub use dynamic::DynamicFee;
pub use fixed::FixedFee;

use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use crate::config::FeeConfig;
use crate::error::Result;

/// A single fee estimation strategy in micro-lamports per compute unit.
#[async_trait]
pub trait FeePlugin: Send + Sync {
    /// Base fee estimate, or `None` when the plugin has nothing to offer.
    async fn base_fee(&self, accounts: &[Pubkey]) -> Result<Option<u64>>;
}

/// Composes the enabled strategies, applies markup and the hard cap.
pub struct PriorityFeeManager {
    dynamic: Option<Arc<dyn FeePlugin>>,
    fixed: Option<Arc<dyn FeePlugin>>,
    extra_percentage: f64,
    hard_cap: u64,
}

impl PriorityFeeManager {
    pub fn new(
        config: &FeeConfig,
        dynamic: Option<Arc<dyn FeePlugin>>,
        fixed: Option<Arc<dyn FeePlugin>>,
    ) -> Self {
        Self {
            dynamic: config.enable_dynamic.then_some(dynamic).flatten(),
            fixed: config.enable_fixed.then_some(fixed).flatten(),
            extra_percentage: config.extra_percentage,
            hard_cap: config.hard_cap,
        }
    }

    /// Calculate the priority fee for a trade touching `accounts`.
    ///
    /// Dynamic takes priority when it resolves; fixed is the fallback. The
    /// result is never above the hard cap.
    pub async fn calculate_priority_fee(&self, accounts: &[Pubkey]) -> Result<Option<u64>> {
        let base_fee = match self.base_fee(accounts).await? {
            Some(fee) => fee,
            None => return Ok(None),
        };

        let marked_up = (base_fee as f64 * (1.0 + self.extra_percentage)) as u64;

        let final_fee = if marked_up > self.hard_cap {
            warn!(
                calculated = marked_up,
                hard_cap = self.hard_cap,
                "priority fee exceeds hard cap, clamping"
            );
            self.hard_cap
        } else {
            marked_up
        };

        Ok(Some(final_fee))
    }

    async fn base_fee(&self, accounts: &[Pubkey]) -> Result<Option<u64>> {
        if let Some(dynamic) = &self.dynamic {
            if let Some(fee) = dynamic.base_fee(accounts).await? {
                return Ok(Some(fee));
            }
        }

        if let Some(fixed) = &self.fixed {
            return fixed.base_fee(accounts).await;
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubPlugin(Option<u64>);

    #[async_trait]
    impl FeePlugin for StubPlugin {
        async fn base_fee(&self, _accounts: &[Pubkey]) -> Result<Option<u64>> {
            Ok(self.0)
        }
    }

    fn config(dynamic: bool, fixed: bool, extra: f64, cap: u64) -> FeeConfig {
        FeeConfig {
            enable_dynamic: dynamic,
            enable_fixed: fixed,
            fixed_amount: 0,
            extra_percentage: extra,
            hard_cap: cap,
        }
    }

    #[tokio::test]
    async fn no_strategy_enabled_yields_no_fee() {
        let manager = PriorityFeeManager::new(
            &config(false, false, 0.0, 1_000),
            Some(Arc::new(StubPlugin(Some(100)))),
            Some(Arc::new(StubPlugin(Some(100)))),
        );
        assert_eq!(manager.calculate_priority_fee(&[]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn dynamic_takes_priority_over_fixed() {
        // Both plugins resolve; dynamic wins.
        let manager = PriorityFeeManager::new(
            &config(true, true, 0.0, 1_000_000),
            Some(Arc::new(StubPlugin(Some(300)))),
            Some(Arc::new(StubPlugin(Some(100)))),
        );
        assert_eq!(
            manager.calculate_priority_fee(&[]).await.unwrap(),
            Some(300)
        );
    }

    #[tokio::test]
    async fn dynamic_miss_falls_back_to_fixed() {
        let manager = PriorityFeeManager::new(
            &config(true, true, 0.0, 1_000_000),
            Some(Arc::new(StubPlugin(None))),
            Some(Arc::new(StubPlugin(Some(100)))),
        );
        assert_eq!(
            manager.calculate_priority_fee(&[]).await.unwrap(),
            Some(100)
        );
    }

    #[tokio::test]
    async fn markup_is_applied() {
        let manager = PriorityFeeManager::new(
            &config(false, true, 0.5, 1_000_000),
            None,
            Some(Arc::new(StubPlugin(Some(200)))),
        );
        assert_eq!(
            manager.calculate_priority_fee(&[]).await.unwrap(),
            Some(300)
        );
    }

    #[tokio::test]
    async fn output_never_exceeds_hard_cap() {
        for base in [0u64, 100, 499, 500, 501, 10_000, u32::MAX as u64] {
            for extra in [0.0, 0.1, 0.5, 1.0] {
                let manager = PriorityFeeManager::new(
                    &config(false, true, extra, 500),
                    None,
                    Some(Arc::new(StubPlugin(Some(base)))),
                );
                let fee = manager
                    .calculate_priority_fee(&[])
                    .await
                    .unwrap()
                    .unwrap_or(0);
                assert!(fee <= 500, "base={base} extra={extra} fee={fee}");
            }
        }
    }
}
