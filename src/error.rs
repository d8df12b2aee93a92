use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaestroError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tool '{tool_name}' failed: {cause}")]
    ToolExecution { tool_name: String, cause: String },

    #[error("External call failed: {}", external_message(.message, .status))]
    ExternalCall { message: String, status: Option<u16> },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T, E = MaestroError> = std::result::Result<T, E>;

fn external_message(message: &str, status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("{message} (status {code})"),
        None => message.to_string(),
    }
}

impl MaestroError {
    /// The message recorded on a failed Job or Delegation.
    ///
    /// Tool failures keep only their cause so the stored error reads exactly
    /// as the tool reported it.
    pub fn reason(&self) -> String {
        match self {
            MaestroError::ToolExecution { cause, .. } => cause.clone(),
            MaestroError::ExternalCall { message, status } => external_message(message, status),
            MaestroError::NotFound(msg)
            | MaestroError::Validation(msg)
            | MaestroError::InvalidState(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn timeout() -> Self {
        MaestroError::ExternalCall {
            message: "timeout".into(),
            status: None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MaestroError::ExternalCall { message, status: None } if message == "timeout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_reason_is_bare_cause() {
        let err = MaestroError::ToolExecution {
            tool_name: "codegen/develop-logic".into(),
            cause: "boom".into(),
        };
        assert_eq!(err.reason(), "boom");
        assert_eq!(err.to_string(), "Tool 'codegen/develop-logic' failed: boom");
    }

    #[test]
    fn external_call_display_includes_status() {
        let err = MaestroError::ExternalCall {
            message: "Internal Server Error".into(),
            status: Some(500),
        };
        assert_eq!(
            err.to_string(),
            "External call failed: Internal Server Error (status 500)"
        );
        assert_eq!(err.reason(), "Internal Server Error (status 500)");
    }

    #[test]
    fn timeout_is_distinguished_from_transport() {
        assert!(MaestroError::timeout().is_timeout());
        assert_eq!(MaestroError::timeout().reason(), "timeout");

        let refused = MaestroError::ExternalCall {
            message: "connection refused".into(),
            status: None,
        };
        assert!(!refused.is_timeout());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MaestroError>();
    }
}
