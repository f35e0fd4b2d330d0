use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{info, warn};

use crate::config::types::FleetConfig;
use crate::error::{DockhandError, Result};

const CONFIG_FILE: &str = "config.yaml";

/// Owner of the on-disk fleet configuration.
///
/// All state is held by this explicitly constructed object; there is no
/// process-wide configuration. Private-key references in the configuration
/// resolve relative to the store's directory.
#[derive(Debug)]
pub struct ConfigStore {
    dir: PathBuf,
    current: RwLock<FleetConfig>,
}

impl ConfigStore {
    /// Open the store rooted at `dir`, creating an empty `config.yaml` when
    /// none exists, and load the current document.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is unusable or the existing
    /// document fails to parse or validate.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            std::fs::create_dir_all(&dir)?;
            write_private(&path, b"")?;
            info!(path = %path.display(), "Created empty fleet configuration");
        }

        let store = Self {
            dir,
            current: RwLock::new(FleetConfig::default()),
        };
        store.reload()?;
        Ok(store)
    }

    /// Directory that key-file references resolve against.
    #[must_use]
    pub fn key_dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Copy of the current configuration.
    pub fn get(&self) -> FleetConfig {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Raw bytes of the configuration file, for display and editing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn raw(&self) -> Result<String> {
        Ok(std::fs::read_to_string(self.config_path())?)
    }

    /// Re-read the configuration from disk.
    ///
    /// A malformed document fails this reload and leaves the previously
    /// loaded configuration in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn reload(&self) -> Result<()> {
        let path = self.config_path();
        if !path.exists() {
            return Err(DockhandError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        warn_on_loose_permissions(&path);

        let content = std::fs::read_to_string(&path)?;
        let parsed = parse_config(&content)?;
        validate_config(&parsed)?;

        *self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = parsed;
        Ok(())
    }

    /// Replace the configuration with raw bytes: persist, then re-parse.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be written or the new document
    /// fails to parse or validate.
    pub fn update(&self, data: &[u8]) -> Result<()> {
        write_private(&self.config_path(), data)?;
        self.reload()
    }
}

fn parse_config(content: &str) -> Result<FleetConfig> {
    // An empty document is a valid, empty fleet.
    if content.trim().is_empty() {
        return Ok(FleetConfig::default());
    }
    Ok(serde_saphyr::from_str(content)?)
}

fn validate_config(config: &FleetConfig) -> Result<()> {
    for (idx, group) in config.groups().iter().enumerate() {
        if group.ips.is_empty() {
            return Err(DockhandError::ConfigInvalid {
                field: format!("configList[{idx}].sshConfig.ips"),
                reason: "host group has no addresses".to_string(),
            });
        }
        if !group.credentials().is_usable() {
            return Err(DockhandError::ConfigInvalid {
                field: format!("configList[{idx}].sshConfig"),
                reason: "host group has neither password nor key credentials".to_string(),
            });
        }
    }
    Ok(())
}

/// Write the file with owner-only permissions; it carries credentials.
fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(unix)]
fn warn_on_loose_permissions(path: &Path) {
    use std::os::unix::fs::MetadataExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.mode() & 0o777;
        if mode & 0o037 != 0 {
            warn!(
                config_path = %path.display(),
                permissions = format!("{mode:04o}"),
                "Fleet configuration contains credentials and has permissive permissions. \
                 Consider: chmod 600 {}",
                path.display()
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_on_loose_permissions(_path: &Path) {}
