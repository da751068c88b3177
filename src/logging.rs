//! Structured logging with per-connection correlation IDs.
//!
//! Provides JSON-formatted logs with pluggable output handlers. The default
//! handler of a [`Node`](crate::Node) forwards entries to `tracing`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Log levels for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Standard log events for remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    // Server lifecycle
    ServerListen,
    ServerStop,

    // Connection
    ConnectionOpen,
    ConnectionClose,
    ConnectionError,

    // Requests
    RequestStart,
    RequestEnd,
    RequestError,
    UndefinedFunction,

    // Callbacks
    CallbackInvoked,
    CallbackDropped,

    // Port / process
    PortProbe,
    PortUnavailable,
    ProcessSpawn,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// Structured log entry with all context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub event: String,
    pub level: String,
    pub message: String,
    pub timestamp: f64,

    // Correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,

    // Context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    // Timing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,

    // Status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    // Custom metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl LogEntry {
    /// Convert to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Type alias for log handler function.
pub type LogHandler = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Structured logger with pluggable handlers.
///
/// # Example
///
/// ```rust,no_run
/// use netfn::{StructuredLogger, LogEvent, LogLevel, LogOptions};
/// use std::sync::Arc;
///
/// let logger = StructuredLogger::new(
///     Some(Arc::new(|entry| {
///         println!("{}", entry.to_json());
///     })),
///     LogLevel::Info,
///     Some("node-1".to_string()),
/// );
///
/// logger.info(LogEvent::ServerListen, "listening", LogOptions::default());
/// ```
#[derive(Clone)]
pub struct StructuredLogger {
    handler: Option<LogHandler>,
    level: LogLevel,
    node_id: Option<String>,
}

impl StructuredLogger {
    /// Create a new structured logger.
    pub fn new(handler: Option<LogHandler>, level: LogLevel, node_id: Option<String>) -> Self {
        Self {
            handler,
            level,
            node_id,
        }
    }

    /// Logger that drops everything.
    pub fn disabled() -> Self {
        Self::new(None, LogLevel::Error, None)
    }

    /// Set or update the log handler.
    pub fn set_handler(&mut self, handler: LogHandler) {
        self.handler = Some(handler);
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    /// Set default context for all log entries.
    pub fn set_node_id(&mut self, node_id: Option<String>) {
        if node_id.is_some() {
            self.node_id = node_id;
        }
    }

    /// Check if this level should be logged.
    fn should_log(&self, level: LogLevel) -> bool {
        level as u8 >= self.level as u8
    }

    /// Log an event with structured data.
    pub fn log(&self, event: LogEvent, message: &str, level: LogLevel, options: LogOptions) {
        if self.handler.is_none() || !self.should_log(level) {
            return;
        }

        let entry = LogEntry {
            event: event.to_string(),
            level: level.to_string(),
            message: message.to_string(),
            timestamp: current_timestamp(),
            node_id: self.node_id.clone(),
            connection_id: options.connection_id,
            peer: options.peer,
            function: options.function,
            token: options.token,
            duration_ms: options.duration_ms,
            success: options.success,
            error: options.error,
            error_type: options.error_type,
            metadata: options.metadata,
        };

        if let Some(ref handler) = self.handler {
            handler(&entry);
        }
    }

    /// Log at DEBUG level.
    pub fn debug(&self, event: LogEvent, message: &str, options: LogOptions) {
        self.log(event, message, LogLevel::Debug, options);
    }

    /// Log at INFO level.
    pub fn info(&self, event: LogEvent, message: &str, options: LogOptions) {
        self.log(event, message, LogLevel::Info, options);
    }

    /// Log at WARN level.
    pub fn warn(&self, event: LogEvent, message: &str, options: LogOptions) {
        self.log(event, message, LogLevel::Warn, options);
    }

    /// Log at ERROR level.
    pub fn error(&self, event: LogEvent, message: &str, options: LogOptions) {
        self.log(event, message, LogLevel::Error, options);
    }

    // Convenience methods for common events

    /// Log the dispatcher accepting connections.
    pub fn server_listen(&self, host: &str, port: u16, functions: &[&str]) {
        self.info(
            LogEvent::ServerListen,
            &format!("netfn service listening on {}:{}", host, port),
            LogOptions {
                metadata: Some(serde_json::json!({
                    "hostname": host,
                    "port": port,
                    "pid": std::process::id(),
                    "functions": functions,
                })),
                ..Default::default()
            },
        );
    }

    pub fn server_stop(&self, port: u16) {
        self.info(
            LogEvent::ServerStop,
            &format!("netfn service on port {} stopped", port),
            LogOptions::default(),
        );
    }

    pub fn connection_open(&self, connection_id: &str, peer: &str) {
        self.debug(
            LogEvent::ConnectionOpen,
            &format!("Connection opened with {}", peer),
            LogOptions {
                connection_id: Some(connection_id.to_string()),
                peer: Some(peer.to_string()),
                ..Default::default()
            },
        );
    }

    pub fn connection_close(&self, connection_id: &str, peer: &str) {
        self.debug(
            LogEvent::ConnectionClose,
            &format!("Connection with {} closed", peer),
            LogOptions {
                connection_id: Some(connection_id.to_string()),
                peer: Some(peer.to_string()),
                ..Default::default()
            },
        );
    }

    /// Transport failure; the affected call is abandoned.
    pub fn connection_error(
        &self,
        connection_id: Option<&str>,
        peer: &str,
        error: &crate::NetFnError,
    ) {
        self.error(
            LogEvent::ConnectionError,
            &format!("Connection error with {}: {}", peer, error),
            LogOptions {
                connection_id: connection_id.map(str::to_string),
                peer: Some(peer.to_string()),
                error: Some(error.to_string()),
                error_type: Some(error.kind().to_string()),
                success: Some(false),
                ..Default::default()
            },
        );
    }

    /// Log request start.
    pub fn request_start(&self, connection_id: &str, function: &str, args: usize) {
        self.debug(
            LogEvent::RequestStart,
            &format!("Calling {}", function),
            LogOptions {
                connection_id: Some(connection_id.to_string()),
                function: Some(function.to_string()),
                metadata: Some(serde_json::json!({ "args": args })),
                ..Default::default()
            },
        );
    }

    /// Log request completion.
    pub fn request_end(
        &self,
        connection_id: &str,
        function: &str,
        duration_ms: f64,
        error: Option<&crate::NetFnError>,
    ) {
        let success = error.is_none();
        let event = if success {
            LogEvent::RequestEnd
        } else {
            LogEvent::RequestError
        };
        let level = if success {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        self.log(
            event,
            &format!(
                "{} {}",
                if success { "Completed" } else { "Failed" },
                function
            ),
            level,
            LogOptions {
                connection_id: Some(connection_id.to_string()),
                function: Some(function.to_string()),
                duration_ms: Some(duration_ms),
                success: Some(success),
                error: error.map(|e| e.to_string()),
                error_type: error.map(|e| e.kind().to_string()),
                ..Default::default()
            },
        );
    }

    pub fn undefined_function(&self, connection_id: &str, key: &str) {
        self.error(
            LogEvent::UndefinedFunction,
            &format!("The '{}' is undefined.", key),
            LogOptions {
                connection_id: Some(connection_id.to_string()),
                function: Some(key.to_string()),
                error_type: Some("undefined_function".to_string()),
                success: Some(false),
                ..Default::default()
            },
        );
    }

    pub fn callback_invoked(&self, connection_id: &str, token: &str) {
        self.debug(
            LogEvent::CallbackInvoked,
            &format!("Invoking callback {}", token),
            LogOptions {
                connection_id: Some(connection_id.to_string()),
                token: Some(token.to_string()),
                ..Default::default()
            },
        );
    }

    /// A peer referenced a token that is not (or no longer) outstanding.
    pub fn callback_dropped(&self, connection_id: &str, token: &str) {
        self.debug(
            LogEvent::CallbackDropped,
            &format!("Ignoring unknown callback {}", token),
            LogOptions {
                connection_id: Some(connection_id.to_string()),
                token: Some(token.to_string()),
                ..Default::default()
            },
        );
    }

    pub fn port_probe(&self, host: &str, port: u16, free: bool) {
        self.debug(
            LogEvent::PortProbe,
            &format!("Port {}:{} is {}", host, port, if free { "free" } else { "in use" }),
            LogOptions {
                metadata: Some(serde_json::json!({ "hostname": host, "port": port, "free": free })),
                ..Default::default()
            },
        );
    }

    pub fn port_unavailable(&self, host: &str, port: u16) {
        self.warn(
            LogEvent::PortUnavailable,
            &format!("Port {}:{} is already in use", host, port),
            LogOptions {
                metadata: Some(serde_json::json!({ "hostname": host, "port": port })),
                ..Default::default()
            },
        );
    }

    /// Log a detached server process launch.
    pub fn process_spawn(&self, program: &str, pid: Option<u32>, port: u16) {
        self.info(
            LogEvent::ProcessSpawn,
            &format!("Spawned {} for port {}", program, port),
            LogOptions {
                metadata: Some(serde_json::json!({ "program": program, "pid": pid, "port": port })),
                ..Default::default()
            },
        );
    }
}

impl fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredLogger")
            .field("level", &self.level)
            .field("node_id", &self.node_id)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Options for log entries.
#[derive(Default)]
pub struct LogOptions {
    pub connection_id: Option<String>,
    pub peer: Option<String>,
    pub function: Option<String>,
    pub token: Option<String>,
    pub duration_ms: Option<f64>,
    pub success: Option<bool>,
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Default handler that prints JSON to stdout.
pub fn default_json_handler(entry: &LogEntry) {
    println!("{}", entry.to_json());
}

/// Default handler that prints human-readable output.
pub fn default_pretty_handler(entry: &LogEntry) {
    let timestamp = entry.timestamp as u64;
    let time_str = format!(
        "{:02}:{:02}:{:02}",
        (timestamp / 3600) % 24,
        (timestamp / 60) % 60,
        timestamp % 60
    );
    let level = format!("{:<5}", entry.level.to_uppercase());
    let prefix = format!("[{}] [{}]", time_str, level);

    let mut parts = vec![prefix, entry.event.clone(), entry.message.clone()];

    if let Some(ref conn_id) = entry.connection_id {
        parts.push(format!("conn={}", &conn_id[..conn_id.len().min(8)]));
    }
    if let Some(ref func) = entry.function {
        parts.push(format!("fn={}", func));
    }
    if let Some(ref token) = entry.token {
        parts.push(format!("token={}", token));
    }
    if let Some(duration) = entry.duration_ms {
        parts.push(format!("{:.1}ms", duration));
    }
    if let Some(ref err) = entry.error {
        parts.push(format!("error={}", err));
    }

    println!("{}", parts.join(" "));
}

/// Handler that re-emits entries as `tracing` events under the `netfn` target.
pub fn tracing_handler(entry: &LogEntry) {
    let fields = entry.to_json();
    let (event, message) = (&entry.event, &entry.message);
    match entry.level.as_str() {
        "debug" => tracing::debug!(target: "netfn", %event, %fields, "{}", message),
        "info" => tracing::info!(target: "netfn", %event, %fields, "{}", message),
        "warn" => tracing::warn!(target: "netfn", %event, %fields, "{}", message),
        _ => tracing::error!(target: "netfn", %event, %fields, "{}", message),
    }
}

fn current_timestamp() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
