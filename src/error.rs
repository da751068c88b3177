use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetFnError {
    #[error("The '{0}' is undefined.")]
    UndefinedFunction(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Port {port} on {host} is already in use")]
    PortUnavailable { host: String, port: u16 },

    #[error("Function error: {0}")]
    FunctionError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timeout waiting for call to complete")]
    TimeoutError,

    #[error("Bootstrap error: {0}")]
    BootstrapError(String),
}

impl NetFnError {
    /// Transport and decoding failures. These end the affected call and are never retried.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            NetFnError::ConnectionError(_)
                | NetFnError::IoError(_)
                | NetFnError::JsonError(_)
                | NetFnError::InvalidMessage(_)
                | NetFnError::ConnectionClosed
        )
    }

    /// Short machine-readable name, used as `error_type` in log entries.
    pub fn kind(&self) -> &'static str {
        match self {
            NetFnError::UndefinedFunction(_) => "undefined_function",
            NetFnError::ConnectionError(_) => "connection_error",
            NetFnError::IoError(_) => "io_error",
            NetFnError::JsonError(_) => "json_error",
            NetFnError::InvalidMessage(_) => "invalid_message",
            NetFnError::ConnectionClosed => "connection_closed",
            NetFnError::PortUnavailable { .. } => "port_unavailable",
            NetFnError::FunctionError(_) => "function_error",
            NetFnError::InvalidArgument(_) => "invalid_argument",
            NetFnError::TimeoutError => "timeout",
            NetFnError::BootstrapError(_) => "bootstrap_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, NetFnError>;
