pub mod api;
pub mod channel;
pub mod config;
pub mod docker;
pub mod error;
pub mod fleet;
pub mod ssh;

pub use channel::{DuplexChannel, Frame};
pub use config::ConfigStore;
pub use error::{DockhandError, Result};
pub use fleet::{CommandExecutor, MachineSnapshot, MachineStatus};
