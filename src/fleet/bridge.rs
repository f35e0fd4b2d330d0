use std::io::{Read, Write};

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, PtySize};
use tracing::debug;

use crate::channel::{error_frame, DuplexChannel, Frame};
use crate::error::{DockhandError, Result};
use crate::fleet::machine::Machine;

const PTY_ROWS: u16 = 40;
const PTY_COLS: u16 = 80;
const PUMP_BUF: usize = 1024;

/// Bridge an interactive remote session onto a duplex channel.
///
/// Spawns the system `ssh` client under a local PTY (a PTY combines stdout
/// and stderr and gives the remote a real terminal), then runs two pumps
/// for the subprocess's lifetime: channel frames into the PTY, and PTY
/// output out as binary frames. Either pump dies alone on its first I/O
/// error; a pump ending because the subscriber disconnected kills the
/// subprocess. The subprocess exiting is the authoritative end of the
/// session, after which the channel is closed.
///
/// # Errors
///
/// Returns an error if the PTY cannot be allocated or the subprocess fails
/// to spawn. Pump failures never propagate past the bridge.
pub async fn exec_command(
    machine: &Machine,
    channel: DuplexChannel,
    command: &str,
) -> Result<()> {
    let argv = build_ssh_argv(machine, command);
    let (mut source, sink) = channel.split();

    let pty = native_pty_system();
    let pair = pty
        .openpty(PtySize {
            rows: PTY_ROWS,
            cols: PTY_COLS,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| DockhandError::Bridge {
            reason: format!("failed to allocate pty: {e}"),
        })?;

    let mut builder = CommandBuilder::new(&argv[0]);
    builder.args(&argv[1..]);
    let mut child = match pair.slave.spawn_command(builder) {
        Ok(child) => child,
        Err(e) => {
            let reason = format!("failed to spawn ssh client: {e}");
            let _ = sink.send(error_frame(&reason)).await;
            return Err(DockhandError::Bridge { reason });
        }
    };
    // The slave end belongs to the child now.
    drop(pair.slave);

    let mut pty_reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| DockhandError::Bridge {
            reason: format!("failed to open pty reader: {e}"),
        })?;
    let mut pty_writer = pair
        .master
        .take_writer()
        .map_err(|e| DockhandError::Bridge {
            reason: format!("failed to open pty writer: {e}"),
        })?;

    // Each pump carries its own killer: a pump ending because the
    // subscriber is gone must terminate the subprocess, or `child.wait()`
    // below never returns and the remote session runs forever.
    let mut inbound_killer = child.clone_killer();
    let mut outbound_killer = child.clone_killer();

    // Inbound pump: subscriber frames into the terminal.
    tokio::task::spawn_blocking(move || {
        while let Some(frame) = source.blocking_recv() {
            let payload = frame.into_payload();
            if payload.is_empty() {
                continue;
            }
            if let Err(e) = pty_writer.write_all(&payload) {
                debug!(error = %e, "PTY write pump ended");
                break;
            }
        }
        let _ = inbound_killer.kill();
    });

    // Outbound pump: terminal output to the subscriber.
    let out_sink = sink.clone();
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; PUMP_BUF];
        loop {
            match pty_reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if out_sink.blocking_send(Frame::Binary(buf[..n].to_vec())).is_err() {
                        let _ = outbound_killer.kill();
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "PTY read pump ended");
                    break;
                }
            }
        }
    });

    // Subprocess exit is the authoritative end-of-session signal.
    let status = tokio::task::spawn_blocking(move || child.wait())
        .await
        .map_err(|e| DockhandError::Bridge {
            reason: format!("wait task failed: {e}"),
        })?
        .map_err(|e| DockhandError::Bridge {
            reason: format!("failed to reap ssh client: {e}"),
        })?;

    debug!(address = machine.address(), status = %status, "Bridge session ended");

    // Dropping the master EOFs the read pump; dropping the sink closes the
    // channel once the pump's clone is gone.
    drop(pair.master);
    drop(sink);
    Ok(())
}

/// Argument vector for the local SSH client: `sshpass` helper when password
/// auth is configured, direct key-based `ssh -i` otherwise. Host-key
/// checking is off and known-hosts persistence disabled; fleet hosts are
/// reinstalled and re-keyed routinely.
fn build_ssh_argv(machine: &Machine, command: &str) -> Vec<String> {
    let creds = machine.credentials();
    let mut argv = Vec::new();

    if !creds.uses_key() {
        argv.extend([
            "sshpass".to_string(),
            "-p".to_string(),
            creds.password_auth.password.clone(),
        ]);
    }

    argv.extend([
        "ssh".to_string(),
        "-tt".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
    ]);

    if creds.uses_key() {
        argv.extend([
            "-i".to_string(),
            machine
                .key_dir()
                .join(&creds.key_auth.private_key_file)
                .display()
                .to_string(),
        ]);
    }

    argv.push(format!("{}@{}", creds.username(), machine.address()));
    argv.push(command.to_string());
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CredentialBundle, KeyAuth, PasswordAuth};
    use std::path::PathBuf;

    fn password_machine() -> Machine {
        Machine::new(
            "10.0.0.5",
            CredentialBundle {
                password_auth: PasswordAuth {
                    username: "ops".to_string(),
                    password: "hunter2".to_string(),
                },
                key_auth: KeyAuth::default(),
            },
            PathBuf::from("/data"),
        )
    }

    fn key_machine() -> Machine {
        Machine::new(
            "10.0.0.5",
            CredentialBundle {
                password_auth: PasswordAuth::default(),
                key_auth: KeyAuth {
                    username: "deploy".to_string(),
                    private_key_file: "id_ed25519".to_string(),
                },
            },
            PathBuf::from("/data"),
        )
    }

    // ============== Argument Construction ==============

    #[test]
    fn test_password_auth_uses_sshpass_helper() {
        let argv = build_ssh_argv(&password_machine(), "docker exec -it abc123 sh");
        assert_eq!(
            argv,
            vec![
                "sshpass",
                "-p",
                "hunter2",
                "ssh",
                "-tt",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "ops@10.0.0.5",
                "docker exec -it abc123 sh",
            ]
        );
    }

    #[test]
    fn test_key_auth_uses_direct_ssh_with_identity() {
        let argv = build_ssh_argv(&key_machine(), "docker logs --follow abc123");
        assert_eq!(
            argv,
            vec![
                "ssh",
                "-tt",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-i",
                "/data/id_ed25519",
                "deploy@10.0.0.5",
                "docker logs --follow abc123",
            ]
        );
    }

    #[test]
    fn test_remote_command_is_single_argument() {
        let argv = build_ssh_argv(&password_machine(), "docker logs --follow abc123");
        assert_eq!(argv.last().unwrap(), "docker logs --follow abc123");
    }

    // ============== Subprocess Lifecycle ==============

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subscriber_disconnect_reaps_subprocess() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        use crate::channel::DuplexChannel;

        // A stand-in ssh client that would outlive any reasonable session.
        let dir = tempfile::tempdir().unwrap();
        let fake_ssh = dir.path().join("ssh");
        std::fs::write(&fake_ssh, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&fake_ssh, std::fs::Permissions::from_mode(0o755)).unwrap();
        let path = std::env::var("PATH").unwrap_or_default();
        std::env::set_var("PATH", format!("{}:{path}", dir.path().display()));

        let machine = key_machine();
        let (near, far) = DuplexChannel::pair(4);
        // The subscriber is already gone when the session starts.
        drop(near);

        let bridged = tokio::time::timeout(
            Duration::from_secs(5),
            exec_command(&machine, far, "docker logs --follow abc123"),
        )
        .await;
        // Without reaping, the bridge stays blocked on the child forever.
        assert!(bridged.expect("bridge leaked its subprocess").is_ok());
    }
}
