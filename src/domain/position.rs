use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TokenInfo;

/// Reasons for closing a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    MaxHoldTime,
    Manual,
    Emergency,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::MaxHoldTime => write!(f, "max_hold_time"),
            ExitReason::Manual => write!(f, "manual"),
            ExitReason::Emergency => write!(f, "emergency"),
        }
    }
}

/// One open holding.
///
/// Created on a successful buy. Exactly one task holds mutation rights at a
/// time: the position lives in the active book and must be claimed
/// (removed) before any sell path touches it.
#[derive(Debug, Clone)]
pub struct Position {
    pub token: TokenInfo,
    pub entry_price: Decimal,
    /// Quantity in decimal token units.
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,

    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub max_hold_time: Option<Duration>,

    pub is_active: bool,
    pub exit_reason: Option<ExitReason>,
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
}

impl Position {
    /// Build a position from a successful buy. Threshold percentages are
    /// fractions of the entry price (0.5 = +50% take profit, 0.2 = -20%
    /// stop loss).
    pub fn from_buy(
        token: TokenInfo,
        entry_price: Decimal,
        quantity: Decimal,
        take_profit_pct: Option<Decimal>,
        stop_loss_pct: Option<Decimal>,
        max_hold_time: Option<Duration>,
    ) -> Self {
        let take_profit_price = take_profit_pct.map(|p| entry_price * (Decimal::ONE + p));
        let stop_loss_price = stop_loss_pct.map(|p| entry_price * (Decimal::ONE - p));

        Self {
            token,
            entry_price,
            quantity,
            entry_time: Utc::now(),
            take_profit_price,
            stop_loss_price,
            max_hold_time,
            is_active: true,
            exit_reason: None,
            exit_price: None,
            exit_time: None,
        }
    }

    /// True when at least one exit condition can ever trigger. A position
    /// without any bound would be monitored forever and is rejected before
    /// monitoring starts.
    pub fn has_exit_condition(&self) -> bool {
        self.take_profit_price.is_some()
            || self.stop_loss_price.is_some()
            || self.max_hold_time.is_some()
    }

    /// Evaluate exit conditions against the current price.
    ///
    /// Precedence is fixed: take-profit, then stop-loss, then max hold
    /// time. When a price swing crosses both thresholds between polls the
    /// profit branch wins.
    pub fn should_exit(&self, current_price: Decimal, now: DateTime<Utc>) -> Option<ExitReason> {
        if !self.is_active {
            return None;
        }

        if let Some(tp) = self.take_profit_price {
            if current_price >= tp {
                return Some(ExitReason::TakeProfit);
            }
        }

        if let Some(sl) = self.stop_loss_price {
            if current_price <= sl {
                return Some(ExitReason::StopLoss);
            }
        }

        if let Some(max_hold) = self.max_hold_time {
            let elapsed = (now - self.entry_time).to_std().unwrap_or_default();
            if elapsed >= max_hold {
                return Some(ExitReason::MaxHoldTime);
            }
        }

        None
    }

    pub fn close(&mut self, exit_price: Decimal, reason: ExitReason) {
        self.is_active = false;
        self.exit_price = Some(exit_price);
        self.exit_reason = Some(reason);
        self.exit_time = Some(Utc::now());
    }

    /// Realized or unrealized PnL in SOL at the given price.
    pub fn pnl(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.quantity
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_active {
            "ACTIVE".to_string()
        } else {
            match self.exit_reason {
                Some(reason) => format!("CLOSED ({reason})"),
                None => "CLOSED".to_string(),
            }
        };
        write!(
            f,
            "Position({}: {} @ {} SOL - {})",
            self.token.symbol, self.quantity, self.entry_price, status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Platform;
    use rust_decimal_macros::dec;
    use solana_sdk::pubkey::Pubkey;
    use std::time::Instant;

    fn token() -> TokenInfo {
        TokenInfo {
            name: "Test Token".into(),
            symbol: "TEST".into(),
            uri: String::new(),
            mint: Pubkey::new_unique(),
            platform: Platform::PumpFun,
            bonding_curve: Some(Pubkey::new_unique()),
            associated_bonding_curve: None,
            pool_state: None,
            base_vault: None,
            quote_vault: None,
            user: None,
            creator: None,
            creator_vault: None,
            discovered_at: Instant::now(),
        }
    }

    fn position() -> Position {
        Position::from_buy(
            token(),
            dec!(0.0001),
            dec!(1000),
            Some(dec!(0.5)),
            Some(dec!(0.2)),
            Some(Duration::from_secs(60)),
        )
    }

    #[test]
    fn thresholds_derived_from_entry_price() {
        let pos = position();
        assert_eq!(pos.take_profit_price, Some(dec!(0.00015)));
        assert_eq!(pos.stop_loss_price, Some(dec!(0.00008)));
    }

    #[test]
    fn take_profit_triggers_at_or_above_target() {
        let pos = position();
        let now = Utc::now();
        assert_eq!(
            pos.should_exit(dec!(0.00015), now),
            Some(ExitReason::TakeProfit)
        );
        assert_eq!(pos.should_exit(dec!(0.00012), now), None);
    }

    #[test]
    fn stop_loss_triggers_at_or_below_target() {
        let pos = position();
        assert_eq!(
            pos.should_exit(dec!(0.00008), Utc::now()),
            Some(ExitReason::StopLoss)
        );
    }

    #[test]
    fn take_profit_wins_when_both_thresholds_cross() {
        // A degenerate position where any price satisfies both branches.
        let mut pos = position();
        pos.take_profit_price = Some(dec!(0.0001));
        pos.stop_loss_price = Some(dec!(0.0002));
        assert_eq!(
            pos.should_exit(dec!(0.00015), Utc::now()),
            Some(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn max_hold_time_triggers_after_elapsed() {
        let pos = position();
        let later = pos.entry_time + chrono::Duration::seconds(61);
        assert_eq!(
            pos.should_exit(dec!(0.0001), later),
            Some(ExitReason::MaxHoldTime)
        );
    }

    #[test]
    fn closed_position_never_exits() {
        let mut pos = position();
        pos.close(dec!(0.0002), ExitReason::TakeProfit);
        assert!(!pos.is_active);
        assert_eq!(pos.should_exit(dec!(1.0), Utc::now()), None);
        assert_eq!(pos.exit_reason, Some(ExitReason::TakeProfit));
    }

    #[test]
    fn pnl_scales_with_quantity() {
        let pos = position();
        assert_eq!(pos.pnl(dec!(0.0002)), dec!(0.1));
        assert_eq!(pos.pnl(dec!(0.00005)), dec!(-0.05));
    }

    #[test]
    fn position_without_bounds_has_no_exit_condition() {
        let pos = Position::from_buy(token(), dec!(0.0001), dec!(1000), None, None, None);
        assert!(!pos.has_exit_condition());
    }
}
