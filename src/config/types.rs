use serde::{Deserialize, Serialize};

/// Password authentication credentials for a host group.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PasswordAuth {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

/// Key authentication credentials for a host group.
///
/// `private_key_file` is a path relative to the configuration directory.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KeyAuth {
    #[serde(default)]
    pub username: String,

    #[serde(default, rename = "privateKeyFile")]
    pub private_key_file: String,
}

/// One host group: a credential bundle shared by a list of addresses.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HostGroup {
    #[serde(default, rename = "passwordAuth")]
    pub password_auth: PasswordAuth,

    #[serde(default, rename = "sshAuth")]
    pub ssh_auth: KeyAuth,

    /// Host addresses: literal IPs or resolvable hostnames.
    #[serde(default)]
    pub ips: Vec<String>,
}

impl HostGroup {
    /// Credentials shared by every machine in this group.
    #[must_use]
    pub fn credentials(&self) -> CredentialBundle {
        CredentialBundle {
            password_auth: self.password_auth.clone(),
            key_auth: self.ssh_auth.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct GroupEntry {
    #[serde(rename = "sshConfig")]
    pub ssh_config: HostGroup,
}

/// Top-level fleet configuration document.
///
/// The on-disk layout is kept compatible with existing deployments:
///
/// ```yaml
/// configList:
///   - sshConfig:
///       passwordAuth: { username: ops, password: secret }
///       sshAuth: { username: ops, privateKeyFile: id_ed25519 }
///       ips: [10.0.0.5, edge-node.local]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FleetConfig {
    #[serde(default, rename = "configList")]
    pub(crate) entries: Vec<GroupEntry>,
}

impl FleetConfig {
    /// Host groups in configuration order.
    #[must_use]
    pub fn groups(&self) -> Vec<HostGroup> {
        self.entries.iter().map(|e| e.ssh_config.clone()).collect()
    }
}

/// Credentials carried by one machine.
///
/// Both auth shapes may be present in the schema; a non-empty key path
/// supersedes password auth when establishing a transport.
#[derive(Debug, Clone, Default)]
pub struct CredentialBundle {
    pub password_auth: PasswordAuth,
    pub key_auth: KeyAuth,
}

impl CredentialBundle {
    /// Whether key authentication takes precedence.
    #[must_use]
    pub fn uses_key(&self) -> bool {
        !self.key_auth.private_key_file.is_empty()
    }

    /// Username of the effective auth method.
    #[must_use]
    pub fn username(&self) -> &str {
        if self.uses_key() {
            &self.key_auth.username
        } else {
            &self.password_auth.username
        }
    }

    /// Whether either auth method is usable at all.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.uses_key() || !self.password_auth.username.is_empty()
    }
}
