mod bridge;
mod executor;
mod machine;
mod prober;
mod registry;
mod stream;

pub use executor::CommandExecutor;
pub use machine::{Machine, MachineSnapshot, MachineStatus};
pub use prober::{probe_fleet, MAX_CONCURRENT_PROBES};
pub use registry::Registry;
pub use stream::{stream_command, POLL_INTERVAL};
