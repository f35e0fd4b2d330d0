mod loader;
mod types;

pub use loader::ConfigStore;
pub use types::{CredentialBundle, FleetConfig, HostGroup, KeyAuth, PasswordAuth};
