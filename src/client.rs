//! Client stubs: local proxies for functions exposed by a remote dispatcher.

use crate::connection::{self, FrameReader, Outbound};
use crate::error::{NetFnError, Result};
use crate::function::Arg;
use crate::message::{decode_args, Invocation, Message};
use crate::node::Node;
use crate::registry::{normalize, RegistrySource, ANONYMOUS};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How a call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The remote function returned a value.
    Returned(Value),
    /// The connection closed without a result frame.
    Closed,
}

impl Completion {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Completion::Returned(v) => Some(v),
            Completion::Closed => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Completion::Returned(v) => Some(v),
            Completion::Closed => None,
        }
    }
}

/// A call in flight. Callbacks keep being delivered while it runs, whether or not
/// anyone awaits [`outcome`](Self::outcome).
pub struct PendingCall {
    connection_id: String,
    task: JoinHandle<Result<Completion>>,
    timeout: Option<Duration>,
}

impl PendingCall {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Wait for the call to finish, bounded by the node's call timeout if one is set.
    pub async fn outcome(self) -> Result<Completion> {
        let mut task = self.task;
        let joined = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    return Err(NetFnError::TimeoutError);
                }
            },
            None => task.await,
        };
        joined.map_err(|e| NetFnError::ConnectionError(format!("call task failed: {}", e)))?
    }
}

/// Proxy for one remote function.
#[derive(Debug, Clone)]
pub struct Stub {
    node: Node,
    name: String,
    host: String,
    port: u16,
}

impl Stub {
    pub fn new(node: &Node, name: &str, port: u16, host: &str) -> Self {
        Self {
            node: node.clone(),
            name: name.to_string(),
            host: host.to_string(),
            port,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a connection and send the request.
    ///
    /// Returns once the request is queued. Functions among `args` are reserved in the
    /// node's callback table. The write side is closed as soon as none of the functions
    /// sent on this connection can still be invoked; other calls on the node do not
    /// hold it open.
    pub async fn call(&self, args: Vec<Arg>) -> Result<PendingCall> {
        let connection_id = Uuid::new_v4().to_string();
        let peer = format!("{}:{}", self.host, self.port);

        let stream = match TcpStream::connect((self.host.as_str(), self.port)).await {
            Ok(stream) => stream,
            Err(e) => {
                let e = NetFnError::from(e);
                self.node.logger().connection_error(Some(&connection_id), &peer, &e);
                self.node.metrics().record_connection_error().await;
                return Err(e);
            }
        };

        let (reader, outbound) = connection::open(stream, &self.node, &connection_id);
        self.node.logger().request_start(&connection_id, &self.name, args.len());

        let args = outbound.encode_args(self.node.callbacks(), args);
        outbound.send(Message::request(&self.name, args))?;
        if !outbound.has_outstanding(self.node.callbacks()) {
            outbound.shutdown();
        }

        let task = tokio::spawn(drive_call(
            self.node.clone(),
            connection_id.clone(),
            self.name.clone(),
            peer,
            reader,
            outbound,
        ));

        Ok(PendingCall {
            connection_id,
            task,
            timeout: self.node.options().call_timeout,
        })
    }

    /// [`call`](Self::call) and wait for the outcome.
    pub async fn invoke(&self, args: Vec<Arg>) -> Result<Completion> {
        self.call(args).await?.outcome().await
    }
}

async fn drive_call(
    node: Node,
    connection_id: String,
    function: String,
    peer: String,
    mut reader: FrameReader,
    outbound: Outbound,
) -> Result<Completion> {
    let start = node.metrics().start_request().await;
    let completion = read_replies(&node, &connection_id, &mut reader, &outbound).await;

    let duration = node.metrics().end_request(start, completion.is_ok()).await;
    match &completion {
        Ok(_) => node.logger().request_end(&connection_id, &function, duration, None),
        Err(e) => {
            node.logger().request_end(&connection_id, &function, duration, Some(e));
            if e.is_connection_error() {
                node.logger().connection_error(Some(&connection_id), &peer, e);
                node.metrics().record_connection_error().await;
            }
        }
    }
    outbound.shutdown();
    completion
}

async fn read_replies(
    node: &Node,
    connection_id: &str,
    reader: &mut FrameReader,
    outbound: &Outbound,
) -> Result<Completion> {
    while let Some(message) = reader.next_message().await {
        match message? {
            Message::Result { result } => return Ok(Completion::Returned(result)),
            Message::Invoke { invocations } => {
                deliver(node, connection_id, outbound, invocations).await?;
                if !outbound.has_outstanding(node.callbacks()) {
                    outbound.shutdown();
                }
            }
            Message::Request { key, .. } => {
                tracing::debug!(
                    connection_id,
                    key = %key,
                    "ignoring request frame on a client connection"
                );
            }
        }
    }
    Ok(Completion::Closed)
}

/// Run every callback named in an invoke frame. Unknown or already consumed tokens
/// are skipped.
async fn deliver(
    node: &Node,
    connection_id: &str,
    outbound: &Outbound,
    invocations: Vec<Invocation>,
) -> Result<()> {
    for Invocation(token, args) in invocations {
        let Some(callback) = connection::take_callback(node, connection_id, &token).await else {
            continue;
        };
        let args = decode_args(args, |t| connection::remote_proxy(t, outbound, node));
        callback.call(args).await?;
    }
    Ok(())
}

/// Stubs for every function of a registry.
#[derive(Debug, Clone)]
pub enum Proxies {
    /// The registry was a single function.
    Anonymous(Stub),
    Named(Vec<(String, Stub)>),
}

impl Proxies {
    pub fn get(&self, name: &str) -> Option<&Stub> {
        match self {
            Proxies::Anonymous(stub) => (name == ANONYMOUS).then_some(stub),
            Proxies::Named(stubs) => stubs.iter().find(|(n, _)| n == name).map(|(_, s)| s),
        }
    }

    /// The stub of a single-function registry.
    pub fn single(&self) -> Option<&Stub> {
        match self {
            Proxies::Anonymous(stub) => Some(stub),
            Proxies::Named(_) => None,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            Proxies::Anonymous(_) => vec![ANONYMOUS],
            Proxies::Named(stubs) => stubs.iter().map(|(n, _)| n.as_str()).collect(),
        }
    }

    /// Call the stub named `name`.
    pub async fn call(&self, name: &str, args: Vec<Arg>) -> Result<PendingCall> {
        let stub = self
            .get(name)
            .ok_or_else(|| NetFnError::UndefinedFunction(name.to_string()))?;
        stub.call(args).await
    }
}

impl Node {
    /// Build stubs for the functions described by `source`, served on `host:port`.
    ///
    /// Only names are taken from `source`; the local function bodies are never run.
    pub fn connect(&self, source: impl Into<RegistrySource>, port: u16, host: &str) -> Proxies {
        let registry = normalize(source);
        if registry.is_anonymous() {
            return Proxies::Anonymous(Stub::new(self, ANONYMOUS, port, host));
        }
        Proxies::Named(
            registry
                .names()
                .map(|name| (name.to_string(), Stub::new(self, name, port, host)))
                .collect(),
        )
    }
}
