use crate::callbacks::CallbackTable;
use crate::logging::{tracing_handler, LogHandler, LogLevel, StructuredLogger};
use crate::metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default host for [`Node::connect`] and [`Node::listen`].
pub const DEFAULT_HOST: &str = "localhost";

/// Largest frame accepted or sent, 8 MiB.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Upper bound on how long a client call waits for completion.
    /// `None` (the default) waits indefinitely.
    pub call_timeout: Option<Duration>,
    /// How long a port probe waits on an established but silent connection.
    pub probe_timeout: Duration,
    pub max_frame_length: usize,
    pub enable_metrics: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            call_timeout: None,
            probe_timeout: Duration::from_secs(2),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            enable_metrics: true,
        }
    }
}

struct NodeInner {
    id: String,
    callbacks: CallbackTable,
    logger: StructuredLogger,
    metrics: Metrics,
    options: NodeOptions,
}

/// Per-process networking context.
///
/// Owns the callback table shared by every stub and dispatcher created from it, so
/// a process that both calls and serves uses one token space. Clone freely; clones
/// share state.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    pub fn new() -> Self {
        NodeBuilder::new().build()
    }

    pub fn builder() -> NodeBuilder {
        NodeBuilder::new()
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn callbacks(&self) -> &CallbackTable {
        &self.inner.callbacks
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.inner.logger
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub fn options(&self) -> &NodeOptions {
        &self.inner.options
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("callbacks", &self.inner.callbacks)
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Builder for [`Node`].
///
/// ```rust,no_run
/// use netfn::{Node, LogLevel};
/// use std::time::Duration;
///
/// let node = Node::builder()
///     .call_timeout(Duration::from_secs(30))
///     .log_level(LogLevel::Debug)
///     .build();
/// ```
pub struct NodeBuilder {
    id: Option<String>,
    options: NodeOptions,
    log_handler: Option<LogHandler>,
    log_level: LogLevel,
}

impl NodeBuilder {
    pub fn new() -> Self {
        let handler: LogHandler = Arc::new(tracing_handler);
        Self {
            id: None,
            options: NodeOptions::default(),
            log_handler: Some(handler),
            log_level: LogLevel::Info,
        }
    }

    /// Identifier attached to every log entry. Defaults to a random UUID.
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn options(mut self, options: NodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.options.call_timeout = Some(timeout);
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.options.probe_timeout = timeout;
        self
    }

    pub fn max_frame_length(mut self, len: usize) -> Self {
        self.options.max_frame_length = len;
        self
    }

    pub fn enable_metrics(mut self, enabled: bool) -> Self {
        self.options.enable_metrics = enabled;
        self
    }

    pub fn log_handler(mut self, handler: LogHandler) -> Self {
        self.log_handler = Some(handler);
        self
    }

    /// Drop all log output.
    pub fn silent(mut self) -> Self {
        self.log_handler = None;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn build(self) -> Node {
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let logger = StructuredLogger::new(self.log_handler, self.log_level, Some(id.clone()));
        let metrics = if self.options.enable_metrics {
            Metrics::new()
        } else {
            Metrics::disabled()
        };

        Node {
            inner: Arc::new(NodeInner {
                id,
                callbacks: CallbackTable::new(),
                logger,
                metrics,
                options: self.options,
            }),
        }
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
