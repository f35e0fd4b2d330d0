use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::config::CredentialBundle;
use crate::error::{DockhandError, Result};
use crate::ssh::{AuthProfile, SshSession};

/// Reachability of a machine. Optimistically `online` at creation; flipped
/// to `offline` only by resolution failure or a failed dial or
/// authentication, and back by the next successful dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Online,
    Offline,
}

#[derive(Debug, Default)]
struct MachineState {
    resolved_ip: Option<IpAddr>,
    hostname: String,
    os: String,
    shell: String,
    /// Newline-joined accumulation of discovery and transport errors.
    error: Option<String>,
    offline: bool,
}

/// Serializable point-in-time copy of a machine, handed to API callers so
/// they can never corrupt registry state.
#[derive(Debug, Clone, Serialize)]
pub struct MachineSnapshot {
    pub address: String,
    pub ip: Option<IpAddr>,
    pub status: MachineStatus,
    pub hostname: String,
    pub os: String,
    pub shell: String,
    pub error: Option<String>,
}

/// One remote host: identity, discovered facts, credentials, and the SSH
/// operation surface. Uniquely identified by its configured address string,
/// which stays the registry key verbatim even when resolution yields a
/// different literal IP.
#[derive(Debug)]
pub struct Machine {
    address: String,
    creds: CredentialBundle,
    key_dir: PathBuf,
    state: RwLock<MachineState>,
    /// Auth material is resolved once (key file read and parsed) and reused
    /// by every dial, including concurrent ones during a probe pass.
    auth: OnceCell<Arc<AuthProfile>>,
}

impl Machine {
    #[must_use]
    pub fn new(address: impl Into<String>, creds: CredentialBundle, key_dir: PathBuf) -> Self {
        Self {
            address: address.into(),
            creds,
            key_dir,
            state: RwLock::new(MachineState::default()),
            auth: OnceCell::new(),
        }
    }

    /// Configured address, used verbatim as the registry key.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialBundle {
        &self.creds
    }

    #[must_use]
    pub fn key_dir(&self) -> &std::path::Path {
        &self.key_dir
    }

    #[must_use]
    pub fn status(&self) -> MachineStatus {
        if self.read_state().offline {
            MachineStatus::Offline
        } else {
            MachineStatus::Online
        }
    }

    pub fn mark_offline(&self) {
        self.write_state().offline = true;
    }

    pub fn mark_online(&self) {
        self.write_state().offline = false;
    }

    pub fn set_resolved_ip(&self, ip: IpAddr) {
        self.write_state().resolved_ip = ip.into();
    }

    #[must_use]
    pub fn resolved_ip(&self) -> Option<IpAddr> {
        self.read_state().resolved_ip
    }

    pub fn set_host_facts(&self, hostname: &str, os: &str) {
        let mut state = self.write_state();
        state.hostname = hostname.to_string();
        state.os = os.to_string();
    }

    pub fn set_shell(&self, shell: &str) {
        self.write_state().shell = shell.to_string();
    }

    /// Discovered login shell; empty until the probe succeeds.
    #[must_use]
    pub fn shell(&self) -> String {
        self.read_state().shell.clone()
    }

    /// Append a failure cause. Causes accumulate newline-joined; a later
    /// failure never overwrites an earlier one.
    pub fn record_error(&self, message: &str) {
        let mut state = self.write_state();
        state.error = Some(match state.error.take() {
            Some(existing) => format!("{existing}\n{message}"),
            None => message.to_string(),
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> MachineSnapshot {
        let state = self.read_state();
        MachineSnapshot {
            address: self.address.clone(),
            ip: state.resolved_ip,
            status: if state.offline {
                MachineStatus::Offline
            } else {
                MachineStatus::Online
            },
            hostname: state.hostname.clone(),
            os: state.os.clone(),
            shell: state.shell.clone(),
            error: state.error.clone(),
        }
    }

    /// Open a fresh authenticated transport to this machine.
    ///
    /// Dial or authentication failure marks the machine offline; a
    /// successful dial flips it back online. No transport is ever pooled
    /// across calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be resolved or the dial
    /// or authentication fails.
    pub async fn connect(&self) -> Result<SshSession> {
        let profile = self.auth_profile().await?;
        match SshSession::dial(&self.address, &profile).await {
            Ok(session) => {
                self.mark_online();
                Ok(session)
            }
            Err(e) => {
                if is_transport_failure(&e) {
                    self.mark_offline();
                }
                Err(e)
            }
        }
    }

    /// Run one command over a fresh transport and return its trimmed
    /// combined output. The transport is torn down before returning.
    ///
    /// # Errors
    ///
    /// Returns a transport error (machine marked offline) or a session/
    /// command error (status unchanged).
    pub async fn run_command(&self, command: &str) -> Result<String> {
        let session = self.connect().await?;
        let result = session.run(command).await;
        session.close().await;
        result
    }

    async fn auth_profile(&self) -> Result<Arc<AuthProfile>> {
        self.auth
            .get_or_try_init(|| async {
                AuthProfile::resolve(&self.creds, &self.key_dir).map(Arc::new)
            })
            .await
            .cloned()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, MachineState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, MachineState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Failures of the transport itself: the dial and the authentication
/// exchange. Credential-material problems (an unreadable key file) and
/// command failures say nothing about reachability.
fn is_transport_failure(err: &DockhandError) -> bool {
    matches!(
        err,
        DockhandError::SshConnection { .. } | DockhandError::SshAuth { .. }
    )
}
