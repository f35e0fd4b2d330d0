use thiserror::Error;

#[derive(Error, Debug)]
pub enum DockhandError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid { field: String, reason: String },

    // Fleet errors
    #[error("Unknown machine: {address}")]
    UnknownMachine { address: String },

    #[error("unable to parse {address} as valid ip")]
    AddressUnresolvable { address: String },

    // SSH transport errors
    #[error("SSH connection failed to {host}: {reason}")]
    SshConnection { host: String, reason: String },

    #[error("SSH authentication failed for {user}@{host}")]
    SshAuth { user: String, host: String },

    #[error("SSH key invalid format: {path}")]
    SshKeyInvalid { path: String },

    // Session/command errors
    #[error("SSH command execution failed: {reason}")]
    SshExec { reason: String },

    #[error("remote command exited with status {status}: {output}")]
    CommandFailed { status: u32, output: String },

    // Streaming/bridge errors
    #[error("stream channel closed by subscriber")]
    SubscriberGone,

    #[error("PTY bridge error: {reason}")]
    Bridge { reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

pub type Result<T> = std::result::Result<T, DockhandError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ============== Configuration Errors ==============

    #[test]
    fn test_config_error_display() {
        let err = DockhandError::Config("test error".to_string());
        assert_eq!(format!("{err}"), "Configuration error: test error");
    }

    #[test]
    fn test_config_not_found_display() {
        let err = DockhandError::ConfigNotFound {
            path: "/data/config.yaml".to_string(),
        };
        assert!(format!("{err}").contains("/data/config.yaml"));
    }

    #[test]
    fn test_config_invalid_display() {
        let err = DockhandError::ConfigInvalid {
            field: "configList".to_string(),
            reason: "cannot be empty".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("configList"));
        assert!(msg.contains("cannot be empty"));
    }

    // ============== Fleet Errors ==============

    #[test]
    fn test_unknown_machine_display() {
        let err = DockhandError::UnknownMachine {
            address: "10.0.0.99".to_string(),
        };
        assert!(format!("{err}").contains("10.0.0.99"));
    }

    #[test]
    fn test_address_unresolvable_matches_wire_message() {
        // The probe records this exact string on the machine; clients display it.
        let err = DockhandError::AddressUnresolvable {
            address: "bad-host".to_string(),
        };
        assert_eq!(format!("{err}"), "unable to parse bad-host as valid ip");
    }

    // ============== SSH Errors ==============

    #[test]
    fn test_ssh_connection_display() {
        let err = DockhandError::SshConnection {
            host: "10.0.0.5".to_string(),
            reason: "connection refused".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("10.0.0.5"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_ssh_auth_display() {
        let err = DockhandError::SshAuth {
            user: "ops".to_string(),
            host: "10.0.0.5".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("ops"));
        assert!(msg.contains("10.0.0.5"));
    }

    #[test]
    fn test_command_failed_display() {
        let err = DockhandError::CommandFailed {
            status: 127,
            output: "docker: command not found".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("127"));
        assert!(msg.contains("command not found"));
    }

    // ============== From Implementations ==============

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DockhandError = io_err.into();
        assert!(format!("{err}").contains("file not found"));
    }

    #[test]
    fn test_json_error_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope }").unwrap_err();
        let err: DockhandError = json_err.into();
        assert!(format!("{err}").contains("JSON"));
    }

    // ============== Result Type ==============

    #[test]
    fn test_result_type_alias() {
        let ok: Result<i32> = Ok(42);
        let bad: Result<i32> = Err(DockhandError::SubscriberGone);
        assert!(ok.is_ok());
        assert!(bad.is_err());
    }
}
