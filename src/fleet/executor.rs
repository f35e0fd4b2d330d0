use std::sync::Arc;

use tracing::info;

use crate::channel::DuplexChannel;
use crate::config::ConfigStore;
use crate::docker::{self, ContainerRecord, ImageRecord};
use crate::error::Result;
use crate::fleet::bridge;
use crate::fleet::machine::{Machine, MachineSnapshot};
use crate::fleet::prober::probe_fleet;
use crate::fleet::registry::Registry;
use crate::fleet::stream::stream_command;

/// Façade over the fleet: owns the configuration store and the registry,
/// drives the prober, and exposes the verbs the request layer consumes.
pub struct CommandExecutor {
    config: ConfigStore,
    registry: Arc<Registry>,
}

impl CommandExecutor {
    /// Build the executor and run the initial fleet probe.
    pub async fn new(config: ConfigStore) -> Self {
        let executor = Self {
            config,
            registry: Arc::new(Registry::new()),
        };
        executor.rebuild_fleet().await;
        executor
    }

    /// Re-read the configuration from disk and rebuild the fleet.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be reloaded; the
    /// running fleet is left untouched in that case.
    pub async fn reload_config(&self) -> Result<()> {
        self.config.reload()?;
        self.rebuild_fleet().await;
        Ok(())
    }

    /// Persist new raw configuration bytes and rebuild the fleet.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be persisted or parsed; the
    /// running fleet is left untouched in that case.
    pub async fn update_config(&self, data: &[u8]) -> Result<()> {
        self.config.update(data)?;
        self.rebuild_fleet().await;
        Ok(())
    }

    /// Raw configuration file contents, for display and editing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn raw_config(&self) -> Result<String> {
        self.config.raw()
    }

    async fn rebuild_fleet(&self) {
        let groups = self.config.get().groups();
        info!(groups = groups.len(), "Rebuilding fleet from configuration");
        probe_fleet(&self.registry, &groups, self.config.key_dir()).await;
    }

    /// Snapshots of every machine in the fleet.
    #[must_use]
    pub fn list_machines(&self) -> Vec<MachineSnapshot> {
        self.registry.snapshots()
    }

    /// All containers on one machine, malformed listing lines dropped.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown address or a failed remote command.
    pub async fn list_containers(&self, address: &str) -> Result<Vec<ContainerRecord>> {
        let out = self.machine(address)?.run_command(docker::LIST_CONTAINERS).await?;
        Ok(docker::decode_records(&out))
    }

    /// All images on one machine, malformed listing lines dropped.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown address or a failed remote command.
    pub async fn list_images(&self, address: &str) -> Result<Vec<ImageRecord>> {
        let out = self.machine(address)?.run_command(docker::LIST_IMAGES).await?;
        Ok(docker::decode_records(&out))
    }

    /// Run `docker <action> <container-id>` and return its trimmed output.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown address or a failed remote command.
    pub async fn perform_action(
        &self,
        address: &str,
        container_id: &str,
        action: &str,
    ) -> Result<String> {
        self.machine(address)?
            .run_command(&docker::container_action(action, container_id))
            .await
    }

    /// Start a detached container from an image reference.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown address or a failed remote command.
    pub async fn create_container(
        &self,
        address: &str,
        image: &str,
        args: &str,
    ) -> Result<String> {
        self.machine(address)?
            .run_command(&docker::create_container(image, args))
            .await
    }

    /// Poll `docker container inspect` to the subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown address or an up-front dial failure.
    pub async fn stream_container(
        &self,
        address: &str,
        container_id: &str,
        channel: DuplexChannel,
    ) -> Result<()> {
        let machine = self.machine(address)?;
        stream_command(machine, channel, docker::inspect_container(container_id)).await
    }

    /// Poll `docker image inspect` to the subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown address or an up-front dial failure.
    pub async fn stream_image(
        &self,
        address: &str,
        image_id: &str,
        channel: DuplexChannel,
    ) -> Result<()> {
        let machine = self.machine(address)?;
        stream_command(machine, channel, docker::inspect_image(image_id)).await
    }

    /// Interactive login shell on the machine itself, using the shell the
    /// probe discovered.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown address or a bridge setup failure.
    pub async fn exec_into_machine(&self, address: &str, channel: DuplexChannel) -> Result<()> {
        let machine = self.machine(address)?;
        let shell = machine.shell();
        bridge::exec_command(&machine, channel, &shell).await
    }

    /// Interactive `docker exec` shell inside a container.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown address or a bridge setup failure.
    pub async fn exec_into_container(
        &self,
        address: &str,
        container_id: &str,
        channel: DuplexChannel,
    ) -> Result<()> {
        let machine = self.machine(address)?;
        bridge::exec_command(&machine, channel, &docker::exec_shell(container_id)).await
    }

    /// Follow a container's logs over the bridge.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown address or a bridge setup failure.
    pub async fn stream_container_logs(
        &self,
        address: &str,
        container_id: &str,
        channel: DuplexChannel,
    ) -> Result<()> {
        let machine = self.machine(address)?;
        bridge::exec_command(&machine, channel, &docker::follow_logs(container_id)).await
    }

    fn machine(&self, address: &str) -> Result<Arc<Machine>> {
        self.registry.get(address)
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DockhandError;

    async fn executor_with(yaml: &str) -> (CommandExecutor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), yaml).unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        (CommandExecutor::new(store).await, dir)
    }

    // ============== Fleet Construction ==============

    #[tokio::test]
    async fn test_probe_registers_every_configured_address() {
        let (executor, _dir) = executor_with(
            "
configList:
  - sshConfig:
      passwordAuth: { username: ops, password: x }
      ips: [192.0.2.10, 192.0.2.11]
  - sshConfig:
      passwordAuth: { username: root, password: y }
      ips: [192.0.2.12]
",
        )
        .await;
        // Diagnostics fail against TEST-NET but every entry must exist.
        assert_eq!(executor.registry().len(), 3);
        let machines = executor.list_machines();
        assert_eq!(machines.len(), 3);
    }

    #[tokio::test]
    async fn test_unresolvable_address_is_offline_with_exact_error() {
        let (executor, _dir) = executor_with(
            "
configList:
  - sshConfig:
      passwordAuth: { username: ops, password: x }
      ips: [bad-host.invalid]
",
        )
        .await;
        let machines = executor.list_machines();
        assert_eq!(machines.len(), 1);
        let m = &machines[0];
        assert_eq!(m.address, "bad-host.invalid");
        assert_eq!(m.status, crate::fleet::MachineStatus::Offline);
        assert_eq!(
            m.error.as_deref(),
            Some("unable to parse bad-host.invalid as valid ip")
        );
        // Discovery fields stay at their zero value.
        assert!(m.hostname.is_empty());
        assert!(m.os.is_empty());
        assert!(m.shell.is_empty());
        assert!(m.ip.is_none());
    }

    // ============== Verb Dispatch ==============

    #[tokio::test]
    async fn test_verbs_against_unknown_address_are_not_found() {
        let (executor, _dir) = executor_with("").await;
        let err = executor.list_containers("10.9.9.9").await.unwrap_err();
        assert!(matches!(err, DockhandError::UnknownMachine { .. }));
        let err = executor
            .perform_action("10.9.9.9", "abc", "stop")
            .await
            .unwrap_err();
        assert!(matches!(err, DockhandError::UnknownMachine { .. }));
    }

    // ============== Reload ==============

    #[tokio::test]
    async fn test_reload_replaces_fleet_generation() {
        let (executor, dir) = executor_with(
            "
configList:
  - sshConfig:
      passwordAuth: { username: ops, password: x }
      ips: [192.0.2.10]
",
        )
        .await;
        assert_eq!(executor.registry().len(), 1);

        std::fs::write(
            dir.path().join("config.yaml"),
            "
configList:
  - sshConfig:
      passwordAuth: { username: ops, password: x }
      ips: [192.0.2.20, 192.0.2.21]
",
        )
        .unwrap();
        executor.reload_config().await.unwrap();

        let addresses: Vec<String> = executor
            .list_machines()
            .into_iter()
            .map(|m| m.address)
            .collect();
        assert_eq!(addresses, vec!["192.0.2.20", "192.0.2.21"]);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_running_fleet() {
        let (executor, dir) = executor_with(
            "
configList:
  - sshConfig:
      passwordAuth: { username: ops, password: x }
      ips: [192.0.2.10]
",
        )
        .await;
        std::fs::write(dir.path().join("config.yaml"), "configList: [ {{{").unwrap();
        assert!(executor.reload_config().await.is_err());
        assert_eq!(executor.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_update_config_persists_and_rebuilds() {
        let (executor, _dir) = executor_with("").await;
        assert!(executor.list_machines().is_empty());

        executor
            .update_config(
                b"
configList:
  - sshConfig:
      passwordAuth: { username: ops, password: x }
      ips: [192.0.2.30]
",
            )
            .await
            .unwrap();
        assert_eq!(executor.registry().len(), 1);
        assert!(executor.raw_config().unwrap().contains("192.0.2.30"));
    }
}
