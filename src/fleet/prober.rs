use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::HostGroup;
use crate::docker;
use crate::fleet::machine::Machine;
use crate::fleet::registry::Registry;
use crate::ssh::SSH_PORT;

/// Cap on concurrent in-flight probes, bounded globally across all host
/// groups rather than per group.
pub const MAX_CONCURRENT_PROBES: usize = 10;

/// Turn configuration into live registry entries.
///
/// Clears the registry, then fans out one probe task per configured address
/// under a counting semaphore. Each probe resolves its address, registers
/// the machine immediately so partially-probed hosts are visible, and then
/// runs discovery diagnostics over SSH. Discovery failure degrades facts;
/// it never removes the machine.
pub async fn probe_fleet(registry: &Arc<Registry>, groups: &[HostGroup], key_dir: &Path) {
    registry.clear();

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_PROBES));
    let mut probes = JoinSet::new();

    for group in groups {
        let creds = group.credentials();
        for address in &group.ips {
            let machine = Arc::new(Machine::new(
                address.clone(),
                creds.clone(),
                key_dir.to_path_buf(),
            ));
            let registry = Arc::clone(registry);
            let semaphore = Arc::clone(&semaphore);
            probes.spawn(async move {
                // The semaphore is never closed; acquisition only fails
                // if it were.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                probe_machine(&registry, &machine).await;
            });
        }
    }

    let total = probes.len();
    while probes.join_next().await.is_some() {}
    info!(
        machines = registry.len(),
        probed = total,
        "Fleet probe pass complete"
    );
}

async fn probe_machine(registry: &Registry, machine: &Arc<Machine>) {
    // Visible to the rest of the system before diagnostics run.
    registry.insert(Arc::clone(machine));

    let address = machine.address().to_string();
    match resolve_address(&address).await {
        Some(ip) => machine.set_resolved_ip(ip),
        None => {
            machine.mark_offline();
            let message = format!("unable to parse {address} as valid ip");
            warn!(address = %address, "{message}");
            machine.record_error(&message);
            return;
        }
    }

    discover_host_facts(machine).await;
    discover_shell(machine).await;
    debug!(address = %address, status = ?machine.status(), "Probe finished");
}

/// Literal IPs never touch DNS; anything else must resolve before a dial
/// is attempted.
async fn resolve_address(address: &str) -> Option<IpAddr> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Some(ip);
    }
    tokio::net::lookup_host(format!("{address}:{SSH_PORT}"))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|sock| sock.ip())
}

async fn discover_host_facts(machine: &Arc<Machine>) {
    match machine.run_command(docker::HOSTNAME_AND_OS).await {
        Ok(data) => match parse_host_facts(&data) {
            Some((hostname, os)) => machine.set_host_facts(&hostname, &os),
            None => {
                machine
                    .record_error(&format!("unable to determine os or hostname from {data}"));
            }
        },
        Err(e) => machine.record_error(&e.to_string()),
    }
}

async fn discover_shell(machine: &Arc<Machine>) {
    match machine.run_command(docker::LOGIN_SHELL).await {
        Ok(shell) => machine.set_shell(shell.trim()),
        Err(e) => machine.record_error(&e.to_string()),
    }
}

/// `hostnamectl` filtered output: exactly one hostname line and one OS line.
fn parse_host_facts(data: &str) -> Option<(String, String)> {
    let lines: Vec<&str> = data.split('\n').collect();
    if lines.len() != 2 {
        return None;
    }
    Some((lines[0].trim().to_string(), lines[1].trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============== Address Resolution ==============

    #[tokio::test]
    async fn test_literal_ipv4_never_touches_dns() {
        let ip = resolve_address("10.0.0.5").await;
        assert_eq!(ip, Some("10.0.0.5".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_literal_ipv6_never_touches_dns() {
        let ip = resolve_address("::1").await;
        assert_eq!(ip, Some("::1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_unresolvable_hostname_is_none() {
        // RFC 2606 reserves .invalid to never resolve.
        assert_eq!(resolve_address("no-such-host.invalid").await, None);
    }

    // ============== Host Fact Parsing ==============

    #[test]
    fn test_parse_host_facts_two_lines() {
        let parsed = parse_host_facts(" edge-node\n Debian GNU/Linux 12 (bookworm)");
        assert_eq!(
            parsed,
            Some((
                "edge-node".to_string(),
                "Debian GNU/Linux 12 (bookworm)".to_string()
            ))
        );
    }

    #[test]
    fn test_parse_host_facts_wrong_shape() {
        assert_eq!(parse_host_facts("just-one-line"), None);
        assert_eq!(parse_host_facts("a\nb\nc"), None);
        assert_eq!(parse_host_facts(""), None);
    }
}
