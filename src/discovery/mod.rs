pub mod blocks;
pub mod listener;
pub mod logs;
pub mod pumpportal;
pub mod queue;

pub use listener::{make_listener, TokenFilters, TokenListener};
pub use queue::{QueueStats, TokenQueue};
