//! Docker CLI surface
//!
//! All container and image operations are plain shell commands executed on
//! the remote host; nothing here talks to the Docker daemon API. The command
//! strings are reproduced verbatim for compatibility with every Docker CLI
//! version the fleet runs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// `docker container ls` line format: one JSON record per line.
pub const LIST_CONTAINERS: &str = r#"docker container ls --all --format "{{json . }}" --no-trunc"#;

/// `docker image ls` line format: one JSON record per line.
pub const LIST_IMAGES: &str = r#"docker image ls --all --format "{{json . }}" --no-trunc"#;

/// Discovers hostname and OS in exactly two output lines.
pub const HOSTNAME_AND_OS: &str =
    r#"hostnamectl | grep -Ei "Static hostname|Operating System" | cut -f2 -d ":""#;

/// Discovers the login shell of the SSH user.
pub const LOGIN_SHELL: &str = "echo $SHELL";

/// `docker container inspect <id>`, polled by the container stream.
#[must_use]
pub fn inspect_container(container_id: &str) -> String {
    format!("docker container inspect {container_id}")
}

/// `docker image inspect <id>`, polled by the image stream.
#[must_use]
pub fn inspect_image(image_id: &str) -> String {
    format!("docker image inspect {image_id}")
}

/// `docker <action> <id>` for lifecycle verbs (start, stop, pause, rm, ...).
#[must_use]
pub fn container_action(action: &str, container_id: &str) -> String {
    format!("docker {action} {container_id}")
}

/// Detached `docker run` resolving the image reference to its first repo tag.
#[must_use]
pub fn create_container(image: &str, args: &str) -> String {
    format!(r#"docker run -d {args} $(docker inspect {image} --format "{{{{ index .RepoTags 0 }}}}")"#)
}

/// Interactive shell inside a running container.
#[must_use]
pub fn exec_shell(container_id: &str) -> String {
    format!("docker exec -it {container_id} sh")
}

/// Follow a container's log output.
#[must_use]
pub fn follow_logs(container_id: &str) -> String {
    format!("docker logs --follow {container_id}")
}

/// One line of `docker container ls` JSON output, mirrored field for field.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ContainerRecord {
    #[serde(default, rename = "Command")]
    pub command: String,
    #[serde(default, rename = "CreatedAt")]
    pub created_at: String,
    #[serde(default, rename = "ID")]
    pub id: String,
    #[serde(default, rename = "Image")]
    pub image: String,
    #[serde(default, rename = "Labels")]
    pub labels: String,
    #[serde(default, rename = "LocalVolumes")]
    pub local_volumes: String,
    #[serde(default, rename = "Mounts")]
    pub mounts: String,
    #[serde(default, rename = "Names")]
    pub names: String,
    #[serde(default, rename = "Networks")]
    pub networks: String,
    #[serde(default, rename = "Ports")]
    pub ports: String,
    #[serde(default, rename = "RunningFor")]
    pub running_for: String,
    #[serde(default, rename = "Size")]
    pub size: String,
    #[serde(default, rename = "State")]
    pub state: String,
    #[serde(default, rename = "Status")]
    pub status: String,
}

/// One line of `docker image ls` JSON output, mirrored field for field.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ImageRecord {
    #[serde(default, rename = "Containers")]
    pub containers: String,
    #[serde(default, rename = "CreatedAt")]
    pub created_at: String,
    #[serde(default, rename = "CreatedSince")]
    pub created_since: String,
    #[serde(default, rename = "Digest")]
    pub digest: String,
    #[serde(default, rename = "ID")]
    pub id: String,
    #[serde(default, rename = "Repository")]
    pub repository: String,
    #[serde(default, rename = "SharedSize")]
    pub shared_size: String,
    #[serde(default, rename = "Size")]
    pub size: String,
    #[serde(default, rename = "Tag")]
    pub tag: String,
    #[serde(default, rename = "UniqueSize")]
    pub unique_size: String,
    #[serde(default, rename = "VirtualSize")]
    pub virtual_size: String,
}

/// Decode newline-delimited JSON records, silently dropping lines that fail
/// to decode. A trailing shell prompt, warning line, or truncated record
/// never fails the whole listing.
#[must_use]
pub fn decode_records<T: DeserializeOwned>(output: &str) -> Vec<T> {
    output
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}
