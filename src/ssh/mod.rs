mod session;

pub use session::{AuthProfile, SshSession, DIAL_TIMEOUT, SSH_PORT};
