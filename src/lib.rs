//! netfn - call functions in another process over TCP
//!
//! One process serves a set of named functions; another calls them through stubs as
//! if they were local. Functions can be passed as arguments in either direction: the
//! receiver gets a proxy, and invoking it runs the original back on the sender.
//!
//! Each call uses its own connection, carrying length-prefixed JSON frames.
//!
//! # Example
//!
//! ## Server
//! ```rust,no_run
//! use netfn::{ArgsExtractor, Callable, Node};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> netfn::Result<()> {
//!     let double = Callable::new("double", |args| async move {
//!         let args = ArgsExtractor::new(args);
//!         let n: i64 = args.get(0)?;
//!         args.callback(1)?.call(vec![json!(n * 2).into()]).await
//!     });
//!
//!     let node = Node::new();
//!     let server = node.listen(double, 8021, "localhost").await?;
//!     server.run_until_ctrl_c().await
//! }
//! ```
//!
//! ## Client
//! ```rust,no_run
//! use netfn::{call, Callable, Node, Outcome};
//!
//! #[tokio::main]
//! async fn main() -> netfn::Result<()> {
//!     let node = Node::new();
//!     // Only the name matters on the client side.
//!     let double = Callable::from_sync("double", |_| Ok(Outcome::Pending));
//!     let proxies = node.connect(double, 8021, "localhost");
//!     let stub = proxies.single().expect("single function");
//!
//!     let print = Callable::from_sync("print", |args| {
//!         println!("result: {:?}", args[0].as_value());
//!         Ok(Outcome::Pending)
//!     });
//!     call!(stub, (10, print)).await?.outcome().await?;
//!     Ok(())
//! }
//! ```

mod bootstrap;
mod call_macro;
mod callbacks;
mod client;
mod connection;
mod error;
mod function;
mod logging;
mod message;
mod metrics;
mod node;
mod probe;
mod registry;
mod server;

#[cfg(test)]
mod test_utils;

pub use bootstrap::{
    run_bootstrapped, BootstrapConfig, BootstrapOutcome, DetachedServer, LaunchSpec, BOOTSTRAP_ENV,
};
pub use call_macro::{ArgsExtractor, CallArgs, IntoArg};
pub use callbacks::{CallbackTable, CallbackToken};
pub use client::{Completion, PendingCall, Proxies, Stub};
pub use error::{NetFnError, Result};
pub use function::{Arg, Callable, Function, Outcome, SyncFunction};
pub use logging::{
    default_json_handler, default_pretty_handler, tracing_handler, LogEntry, LogEvent, LogHandler,
    LogLevel, LogOptions, StructuredLogger,
};
pub use message::{encode_args, decode_args, CallbackRef, Invocation, Message, WireArg};
pub use metrics::{Metrics, MetricsSnapshot};
pub use node::{Node, NodeBuilder, NodeOptions, DEFAULT_HOST, DEFAULT_MAX_FRAME_LENGTH};
pub use probe::{find_free_port, probe, probe_port, PortStatus, DEFAULT_PROBE_TIMEOUT};
pub use registry::{normalize, FunctionRegistry, RegistrySource, ANONYMOUS};
pub use server::{DispatchError, ServerHandle};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
