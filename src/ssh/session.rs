use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Config, Handle, Handler, Msg};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{load_secret_key, PrivateKey, PublicKey};
use russh::{ChannelMsg, Pty};
use tokio::time::timeout;

use crate::config::CredentialBundle;
use crate::error::{DockhandError, Result};

/// Transport dial timeout. Command execution itself carries no timeout:
/// a hung remote command blocks its calling task until the transport dies.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

pub const SSH_PORT: u16 = 22;

/// Fixed geometry for streaming PTY requests, matching the original wire
/// behavior (xterm 80x40, echo disabled).
const PTY_TERM: &str = "xterm";
const PTY_COLS: u32 = 80;
const PTY_ROWS: u32 = 40;
const PTY_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 0),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
];

/// Fleet hosts are addressed by IP on trusted networks; host keys are not
/// verified, mirroring the system `ssh` invocation the PTY bridge uses.
struct AcceptAllHandler;

impl Handler for AcceptAllHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Resolved authentication material for one machine, built once from its
/// credential bundle and reused across every dial.
pub struct AuthProfile {
    user: String,
    method: AuthMethod,
}

enum AuthMethod {
    Password(String),
    Key(Arc<PrivateKey>),
}

impl AuthProfile {
    /// Resolve a credential bundle into dialable auth material.
    ///
    /// A non-empty private-key reference supersedes password auth; the key
    /// file is read relative to `key_dir` and parsed once here.
    ///
    /// # Errors
    ///
    /// Returns an error if the referenced key file cannot be read or parsed.
    pub fn resolve(creds: &CredentialBundle, key_dir: &Path) -> Result<Self> {
        if creds.uses_key() {
            let key_path = key_dir.join(&creds.key_auth.private_key_file);
            let key = load_secret_key(&key_path, None).map_err(|e| {
                DockhandError::SshKeyInvalid {
                    path: format!("{}: {e}", key_path.display()),
                }
            })?;
            Ok(Self {
                user: creds.key_auth.username.clone(),
                method: AuthMethod::Key(Arc::new(key)),
            })
        } else {
            Ok(Self {
                user: creds.password_auth.username.clone(),
                method: AuthMethod::Password(creds.password_auth.password.clone()),
            })
        }
    }

    /// Username presented to the remote host.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }
}

// Secrets never appear in debug output; only the method kind is named.
impl std::fmt::Debug for AuthProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let method = match self.method {
            AuthMethod::Password(_) => "password",
            AuthMethod::Key(_) => "key",
        };
        f.debug_struct("AuthProfile")
            .field("user", &self.user)
            .field("method", &method)
            .finish()
    }
}

/// One authenticated SSH transport. Short-lived exec channels are opened per
/// command; the transport itself is opened and torn down per call site, never
/// pooled.
pub struct SshSession {
    handle: Handle<AcceptAllHandler>,
    host: String,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl SshSession {
    /// Dial `host:22` and authenticate.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::SshConnection`] on dial failure or timeout
    /// and [`DockhandError::SshAuth`] when the server rejects the
    /// credentials.
    pub async fn dial(host: &str, profile: &AuthProfile) -> Result<Self> {
        let config = Arc::new(Config::default());
        let addr = format!("{host}:{SSH_PORT}");

        let mut handle = timeout(DIAL_TIMEOUT, client::connect(config, &addr, AcceptAllHandler))
            .await
            .map_err(|_| {
                tracing::error!(host = %host, timeout_secs = DIAL_TIMEOUT.as_secs(), "SSH dial timeout");
                DockhandError::SshConnection {
                    host: host.to_string(),
                    reason: format!("connection timeout after {}s", DIAL_TIMEOUT.as_secs()),
                }
            })?
            .map_err(|e| {
                tracing::error!(host = %host, error = %e, "SSH dial failed");
                DockhandError::SshConnection {
                    host: host.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let authenticated = match &profile.method {
            AuthMethod::Password(password) => handle
                .authenticate_password(&profile.user, password)
                .await
                .map_err(|e| DockhandError::SshConnection {
                    host: host.to_string(),
                    reason: e.to_string(),
                })?
                .success(),
            AuthMethod::Key(key) => {
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::clone(key), hash_alg);
                handle
                    .authenticate_publickey(&profile.user, key_with_hash)
                    .await
                    .map_err(|e| DockhandError::SshConnection {
                        host: host.to_string(),
                        reason: e.to_string(),
                    })?
                    .success()
            }
        };

        if !authenticated {
            tracing::error!(host = %host, user = %profile.user, "SSH authentication rejected");
            return Err(DockhandError::SshAuth {
                user: profile.user.clone(),
                host: host.to_string(),
            });
        }

        Ok(Self {
            handle,
            host: host.to_string(),
        })
    }

    /// Run one command and return its trimmed combined stdout/stderr.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be opened, the command cannot
    /// be started, or it exits with non-zero status.
    pub async fn run(&self, command: &str) -> Result<String> {
        let channel = self.open_channel().await?;
        Self::exec_on(channel, command).await
    }

    /// Open a fresh session channel with a PTY attached, for one streamer
    /// tick. The caller runs a command on it with [`Self::exec_on`].
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be opened or the PTY request
    /// is rejected.
    pub async fn open_pty_channel(&self) -> Result<russh::Channel<Msg>> {
        let channel = self.open_channel().await?;
        channel
            .request_pty(
                true, PTY_TERM, PTY_COLS, PTY_ROWS, 0, 0, PTY_MODES,
            )
            .await
            .map_err(|e| DockhandError::SshExec {
                reason: format!("failed to request pty: {e}"),
            })?;
        Ok(channel)
    }

    /// Execute `command` on an already-open channel, collecting stdout and
    /// stderr in arrival order, and fail on non-zero exit status.
    ///
    /// # Errors
    ///
    /// Returns an error if the exec request fails or the command exits
    /// non-zero.
    pub async fn exec_on(mut channel: russh::Channel<Msg>, command: &str) -> Result<String> {
        channel
            .exec(true, command)
            .await
            .map_err(|e| DockhandError::SshExec {
                reason: format!("failed to execute command: {e}"),
            })?;

        let mut combined = Vec::new();
        let mut exit_status = 0u32;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => combined.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                    combined.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExitStatus { exit_status: s }) => exit_status = s,
                None => break,
                // Eof and ExitStatus ordering is not guaranteed; drain until
                // the channel fully closes.
                Some(_) => {}
            }
        }

        let output = String::from_utf8_lossy(&combined).trim().to_string();
        if exit_status != 0 {
            return Err(DockhandError::CommandFailed {
                status: exit_status,
                output,
            });
        }
        Ok(output)
    }

    async fn open_channel(&self) -> Result<russh::Channel<Msg>> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| DockhandError::SshExec {
                reason: format!("failed to open channel: {e}"),
            })
    }

    /// Tear the transport down.
    pub async fn close(self) {
        if let Err(e) = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!(host = %self.host, error = %e, "SSH disconnect failed");
        }
    }
}
