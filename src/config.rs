use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;

use crate::domain::Platform;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bot instance name, used for log file naming
    pub name: String,
    /// HTTP RPC endpoint
    pub rpc_endpoint: String,
    /// WebSocket endpoint for subscriptions
    pub wss_endpoint: String,
    /// Wallet private key (base58)
    pub private_key: String,
    /// Launch platform to trade
    #[serde(default = "default_platform")]
    pub platform: Platform,

    pub trade: TradeConfig,
    pub filters: FilterConfig,
    #[serde(default)]
    pub priority_fees: FeeConfig,
    #[serde(default)]
    pub retries: RetryConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_platform() -> Platform {
    Platform::PumpFun
}

/// Exit strategy after a successful buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStrategy {
    /// Fixed-delay sell after `wait_after_buy`
    TimeBased,
    /// Threshold-based exit monitored per position
    TpSl,
    /// Buy and hold; no automatic sell
    Manual,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeConfig {
    /// Amount of SOL to spend per buy
    pub buy_amount: f64,
    /// Slippage tolerance for buys (0.01 = 1%)
    pub buy_slippage: f64,
    /// Slippage tolerance for sells
    pub sell_slippage: f64,
    /// Exit strategy selection (per-run, never combined)
    #[serde(default = "default_exit_strategy")]
    pub exit_strategy: ExitStrategy,
    /// Take profit as a fraction of entry price (0.5 = +50%)
    #[serde(default)]
    pub take_profit_percentage: Option<f64>,
    /// Stop loss as a fraction of entry price (0.2 = -20%)
    #[serde(default)]
    pub stop_loss_percentage: Option<f64>,
    /// Maximum hold time in seconds
    #[serde(default)]
    pub max_hold_time: Option<u64>,
    /// Seconds between price checks while monitoring a position
    #[serde(default = "default_price_check_interval")]
    pub price_check_interval: u64,
    /// Skip the pool read before buying and trust the configured estimate
    #[serde(default)]
    pub extreme_fast_mode: bool,
    /// Token amount estimate used in extreme fast mode (decimal units)
    #[serde(default = "default_extreme_fast_token_amount")]
    pub extreme_fast_token_amount: u64,
}

fn default_exit_strategy() -> ExitStrategy {
    ExitStrategy::TimeBased
}

fn default_price_check_interval() -> u64 {
    10
}

fn default_extreme_fast_token_amount() -> u64 {
    30
}

/// Token discovery filters and feed selection
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Which feed to listen on: logs, blocks, pumpportal
    pub listener_type: ListenerKind,
    /// Substring to match in token name or symbol
    #[serde(default)]
    pub match_string: Option<String>,
    /// Only trade tokens created by this address
    #[serde(default)]
    pub creator_address: Option<String>,
    /// Buy without ever selling
    #[serde(default)]
    pub marry_mode: bool,
    /// Keep trading tokens continuously
    #[serde(default)]
    pub yolo_mode: bool,
    /// Maximum age in seconds a discovery event may reach at dequeue time
    pub max_token_age: f64,
    /// Discovery queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    Logs,
    Blocks,
    Pumpportal,
}

impl std::fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerKind::Logs => write!(f, "logs"),
            ListenerKind::Blocks => write!(f, "blocks"),
            ListenerKind::Pumpportal => write!(f, "pumpportal"),
        }
    }
}

/// Priority fee strategy. Dynamic and fixed are mutually exclusive.
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    #[serde(default)]
    pub enable_dynamic: bool,
    #[serde(default = "default_true")]
    pub enable_fixed: bool,
    /// Fixed fee in micro-lamports per compute unit
    #[serde(default = "default_fixed_amount")]
    pub fixed_amount: u64,
    /// Percentage markup applied on top of the base fee (0.1 = +10%)
    #[serde(default)]
    pub extra_percentage: f64,
    /// Hard cap in micro-lamports per compute unit
    #[serde(default = "default_fee_hard_cap")]
    pub hard_cap: u64,
}

fn default_true() -> bool {
    true
}

fn default_fixed_amount() -> u64 {
    200_000
}

fn default_fee_hard_cap() -> u64 {
    500_000
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            enable_dynamic: false,
            enable_fixed: true,
            fixed_amount: default_fixed_amount(),
            extra_percentage: 0.0,
            hard_cap: default_fee_hard_cap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum transaction submission attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Seconds to let the curve stabilize after creation before buying
    #[serde(default = "default_wait_after_creation")]
    pub wait_after_creation: u64,
    /// Seconds to hold before the time-based sell
    #[serde(default = "default_wait_after_buy")]
    pub wait_after_buy: u64,
    /// Seconds to pause between tokens in continuous mode
    #[serde(default = "default_wait_before_new_token")]
    pub wait_before_new_token: u64,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_wait_after_creation() -> u64 {
    15
}

fn default_wait_after_buy() -> u64 {
    15
}

fn default_wait_before_new_token() -> u64 {
    15
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            wait_after_creation: default_wait_after_creation(),
            wait_after_buy: default_wait_after_buy(),
            wait_before_new_token: default_wait_before_new_token(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum simultaneous buy/sell executions
    #[serde(default = "default_max_trades")]
    pub max_concurrent_trades: usize,
    /// Maximum concurrently monitored positions
    #[serde(default = "default_max_positions")]
    pub max_concurrent_positions: usize,
}

fn default_max_trades() -> usize {
    3
}

fn default_max_positions() -> usize {
    5
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_trades: default_max_trades(),
            max_concurrent_positions: default_max_positions(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    Disabled,
    OnFail,
    AfterSell,
    PostSession,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_mode")]
    pub mode: CleanupMode,
    /// Burn leftover tokens before closing the account
    #[serde(default)]
    pub force_close_with_burn: bool,
    /// Attach a priority fee to cleanup transactions
    #[serde(default)]
    pub with_priority_fee: bool,
}

fn default_cleanup_mode() -> CleanupMode {
    CleanupMode::Disabled
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            mode: default_cleanup_mode(),
            force_close_with_burn: false,
            with_priority_fee: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// Per-sell timeout during emergency liquidation
    #[serde(default = "default_emergency_sell_timeout")]
    pub emergency_sell_timeout: u64,
    /// Longer per-sell timeout for the startup journal replay
    #[serde(default = "default_replay_sell_timeout")]
    pub replay_sell_timeout: u64,
    /// Directory for trade records and the liquidation journal
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_emergency_sell_timeout() -> u64 {
    10
}

fn default_replay_sell_timeout() -> u64 {
    30
}

fn default_data_dir() -> String {
    "trades".to_string()
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            emergency_sell_timeout: default_emergency_sell_timeout(),
            replay_sell_timeout: default_replay_sell_timeout(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Also write logs to a file under logs/
    #[serde(default)]
    pub file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Listener feeds each platform can be decoded from.
fn compatible_listeners(platform: Platform) -> &'static [ListenerKind] {
    match platform {
        Platform::PumpFun => &[
            ListenerKind::Logs,
            ListenerKind::Blocks,
            ListenerKind::Pumpportal,
        ],
        Platform::LetsBonk => &[ListenerKind::Blocks, ListenerKind::Pumpportal],
    }
}

impl TradeConfig {
    pub fn price_check_interval(&self) -> Duration {
        Duration::from_secs(self.price_check_interval)
    }

    pub fn max_hold_duration(&self) -> Option<Duration> {
        self.max_hold_time.map(Duration::from_secs)
    }
}

impl FilterConfig {
    pub fn max_token_age(&self) -> Duration {
        Duration::from_secs_f64(self.max_token_age)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file plus `MINTHAWK__`-prefixed
    /// environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(Path::new("config/default.toml")).required(false))
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("MINTHAWK")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values. All violations are reported at once;
    /// any violation prevents the pipeline from starting.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("name must not be empty".to_string());
        }

        if self.private_key.trim().is_empty() {
            errors.push(
                "private_key must be set (use the MINTHAWK__PRIVATE_KEY environment variable)"
                    .to_string(),
            );
        }

        for (field, value) in [
            ("rpc_endpoint", &self.rpc_endpoint),
            ("wss_endpoint", &self.wss_endpoint),
        ] {
            if url::Url::parse(value).is_err() {
                errors.push(format!("{field} is not a valid URL: {value}"));
            }
        }

        if self.trade.buy_amount <= 0.0 {
            errors.push("trade.buy_amount must be a positive number".to_string());
        }

        for (field, value) in [
            ("trade.buy_slippage", self.trade.buy_slippage),
            ("trade.sell_slippage", self.trade.sell_slippage),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{field} must be between 0 and 1"));
            }
        }

        if !(0.0..=1.0).contains(&self.priority_fees.extra_percentage) {
            errors.push("priority_fees.extra_percentage must be between 0 and 1".to_string());
        }

        // Dynamic and fixed priority fees are mutually exclusive.
        if self.priority_fees.enable_dynamic && self.priority_fees.enable_fixed {
            errors.push(
                "Cannot enable both dynamic and fixed priority fees simultaneously".to_string(),
            );
        }

        if self.retries.max_attempts > 100 {
            errors.push("retries.max_attempts must be between 0 and 100".to_string());
        }

        if self.filters.max_token_age < 0.0 {
            errors.push("filters.max_token_age must be a non-negative number".to_string());
        }

        if self.concurrency.max_concurrent_trades == 0 {
            errors.push("concurrency.max_concurrent_trades must be at least 1".to_string());
        }

        if self.concurrency.max_concurrent_positions == 0 {
            errors.push("concurrency.max_concurrent_positions must be at least 1".to_string());
        }

        // A threshold-monitored position with no exit condition would never
        // terminate on its own.
        if self.trade.exit_strategy == ExitStrategy::TpSl
            && self.trade.take_profit_percentage.is_none()
            && self.trade.stop_loss_percentage.is_none()
            && self.trade.max_hold_time.is_none()
        {
            errors.push(
                "trade.exit_strategy = tp_sl requires take_profit_percentage, \
                 stop_loss_percentage, or max_hold_time"
                    .to_string(),
            );
        }

        if !compatible_listeners(self.platform).contains(&self.filters.listener_type) {
            errors.push(format!(
                "Listener '{}' is not compatible with platform '{}'",
                self.filters.listener_type, self.platform
            ));
        }

        if let Some(creator) = &self.filters.creator_address {
            if Pubkey::from_str(creator).is_err() {
                errors.push(format!(
                    "filters.creator_address is not a valid address: {creator}"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
