pub mod shutdown;

pub use shutdown::{install_signal_handlers, ShutdownController, ShutdownToken};
