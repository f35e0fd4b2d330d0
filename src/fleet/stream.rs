use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::channel::{DuplexChannel, Frame, FrameSink};
use crate::error::Result;
use crate::fleet::machine::Machine;
use crate::ssh::SshSession;

/// Interval between poll ticks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Re-run `command` on a fixed interval and forward each result to the
/// subscriber.
///
/// The transport is established up front: failure there emits one error
/// frame, marks the machine offline, and returns without starting the loop.
/// On success a background loop runs until a fatal per-tick error (session
/// or PTY failure), a failed keep-alive ping (subscriber gone), or channel
/// closure; plain command failures are reported and the loop continues.
/// Loop termination closes the channel exactly once.
///
/// # Errors
///
/// Returns the dial error when the up-front transport cannot be
/// established.
pub async fn stream_command(
    machine: Arc<Machine>,
    channel: DuplexChannel,
    command: String,
) -> Result<()> {
    let (_source, sink) = channel.split();

    let session = match machine.connect().await {
        Ok(session) => session,
        Err(e) => {
            sink.send_error(&e.to_string()).await;
            return Err(e);
        }
    };

    tokio::spawn(poll_loop(machine, session, sink, command));
    Ok(())
}

/// Outcome of one poll tick.
enum Tick {
    /// Command output to forward.
    Output(String),
    /// The command failed; reported, the loop continues.
    CommandFailed(String),
    /// The session or its PTY failed; reported, the loop ends.
    Fatal(String),
}

trait TickSource {
    async fn next(&self) -> Tick;
}

/// Live ticks: a fresh session channel with a PTY per tick, then the
/// command on it.
struct SessionTicks<'a> {
    session: &'a SshSession,
    command: &'a str,
}

impl TickSource for SessionTicks<'_> {
    async fn next(&self) -> Tick {
        let channel = match self.session.open_pty_channel().await {
            Ok(channel) => channel,
            Err(e) => return Tick::Fatal(e.to_string()),
        };
        match SshSession::exec_on(channel, self.command).await {
            Ok(output) => Tick::Output(output),
            Err(e) => Tick::CommandFailed(e.to_string()),
        }
    }
}

/// Drive ticks to the subscriber until a fatal tick or the subscriber
/// disconnects. Consumes the sink, so returning closes the channel once no
/// other clone is held.
async fn pump_ticks<T: TickSource>(sink: FrameSink, ticks: &T) {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        // The keep-alive doubles as subscriber liveness detection.
        if sink.send(Frame::Ping).await.is_err() {
            break;
        }

        match ticks.next().await {
            Tick::Output(output) => {
                if sink.send(Frame::Text(output)).await.is_err() {
                    break;
                }
            }
            Tick::CommandFailed(message) => sink.send_error(&message).await,
            Tick::Fatal(message) => {
                sink.send_error(&message).await;
                break;
            }
        }
    }
}

async fn poll_loop(machine: Arc<Machine>, session: SshSession, sink: FrameSink, command: String) {
    pump_ticks(
        sink,
        &SessionTicks {
            session: &session,
            command: &command,
        },
    )
    .await;
    session.close().await;
    debug!(address = machine.address(), command = %command, "Poll stream closed");
}
