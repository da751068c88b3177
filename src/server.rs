//! Server dispatcher: accepts connections and runs the functions they ask for.

use crate::callbacks::CallbackToken;
use crate::connection::{self, remote_proxy, take_callback, FrameReader, Outbound};
use crate::error::{NetFnError, Result};
use crate::function::{Callable, Outcome};
use crate::message::{decode_args, Invocation, Message, WireArg};
use crate::node::Node;
use crate::registry::{normalize, FunctionRegistry, RegistrySource};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A failure that ended one connection. The server keeps running.
#[derive(Debug)]
pub struct DispatchError {
    pub connection_id: String,
    pub peer: String,
    pub error: NetFnError,
}

/// Running dispatcher.
pub struct ServerHandle {
    node: Node,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    errors: Mutex<mpsc::UnboundedReceiver<DispatchError>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Next connection-ending failure, in the order they happened.
    ///
    /// Returns `None` once the server has stopped and every error was taken.
    pub async fn next_error(&self) -> Option<DispatchError> {
        self.errors.lock().await.recv().await
    }

    /// Stop accepting and drop every open connection.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
        self.node.logger().server_stop(self.local_addr.port());
    }

    /// Serve until ctrl-c, then shut down.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        self.shutdown().await;
        Ok(())
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Node {
    /// Serve the functions described by `source` on `host:port`.
    ///
    /// Fails with [`NetFnError::PortUnavailable`] if something already answers on the
    /// port. Port `0` skips the probe and binds an ephemeral port.
    pub async fn listen(
        &self,
        source: impl Into<RegistrySource>,
        port: u16,
        host: &str,
    ) -> Result<ServerHandle> {
        self.listen_with(source, port, host, |_| {}).await
    }

    /// [`listen`](Self::listen), calling `on_ready` with the bound address once the
    /// server accepts connections.
    pub async fn listen_with<F>(
        &self,
        source: impl Into<RegistrySource>,
        port: u16,
        host: &str,
        on_ready: F,
    ) -> Result<ServerHandle>
    where
        F: FnOnce(SocketAddr),
    {
        let registry = Arc::new(normalize(source));

        if port != 0 && !self.probe_port(port, host).await {
            self.logger().port_unavailable(host, port);
            return Err(NetFnError::PortUnavailable {
                host: host.to_string(),
                port,
            });
        }

        let listener = TcpListener::bind((host, port)).await?;
        let local_addr = listener.local_addr()?;
        let names: Vec<&str> = registry.names().collect();
        self.logger().server_listen(host, local_addr.port(), &names);

        let cancel = CancellationToken::new();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(accept_loop(
            listener,
            self.clone(),
            registry,
            errors_tx,
            cancel.clone(),
        ));

        on_ready(local_addr);

        Ok(ServerHandle {
            node: self.clone(),
            local_addr,
            cancel,
            task,
            errors: Mutex::new(errors_rx),
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    node: Node,
    registry: Arc<FunctionRegistry>,
    errors: mpsc::UnboundedSender<DispatchError>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tokio::spawn(handle_connection(
                        stream,
                        addr.to_string(),
                        node.clone(),
                        Arc::clone(&registry),
                        errors.clone(),
                        cancel.child_token(),
                    ));
                }
                Err(e) => {
                    node.logger().connection_error(None, "listener", &NetFnError::from(e));
                    node.metrics().record_connection_error().await;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: String,
    node: Node,
    registry: Arc<FunctionRegistry>,
    errors: mpsc::UnboundedSender<DispatchError>,
    cancel: CancellationToken,
) {
    let connection_id = Uuid::new_v4().to_string();
    node.metrics().record_connection_open().await;
    node.logger().connection_open(&connection_id, &peer);

    let (mut reader, outbound) = connection::open(stream, &node, &connection_id);
    let dispatcher = Dispatcher {
        node: &node,
        registry: &registry,
        connection_id: &connection_id,
        outbound: &outbound,
    };

    let result = tokio::select! {
        result = dispatcher.run(&mut reader) => result,
        _ = cancel.cancelled() => Ok(()),
    };
    outbound.shutdown();

    if let Err(error) = result {
        if error.is_connection_error() {
            node.logger().connection_error(Some(&connection_id), &peer, &error);
            node.metrics().record_connection_error().await;
        }
        let _ = errors.send(DispatchError {
            connection_id: connection_id.clone(),
            peer: peer.clone(),
            error,
        });
    }

    node.metrics().record_connection_close().await;
    node.logger().connection_close(&connection_id, &peer);
}

/// What to do with the connection after handling a frame.
#[derive(Debug, PartialEq)]
enum Disposition {
    /// Send the value back and close.
    Reply(Value),
    Close,
    /// The function holds a callback; wait for the peer's traffic.
    AwaitCallback,
}

struct Dispatcher<'a> {
    node: &'a Node,
    registry: &'a FunctionRegistry,
    connection_id: &'a str,
    outbound: &'a Outbound,
}

impl Dispatcher<'_> {
    /// Handle frames in order until one of them ends the connection or the peer closes.
    async fn run(&self, reader: &mut FrameReader) -> Result<()> {
        while let Some(message) = reader.next_message().await {
            let disposition = match message? {
                Message::Request { key, args } => {
                    let callable = self.resolve(&key).await?;
                    Some(self.invoke(&key, callable, args).await?)
                }
                Message::Invoke { invocations } => self.invoke_callbacks(invocations).await?,
                Message::Result { .. } => {
                    tracing::debug!(
                        connection_id = self.connection_id,
                        "ignoring result frame on a server connection"
                    );
                    None
                }
            };

            match disposition {
                Some(Disposition::Reply(result)) => {
                    self.outbound.send(Message::result(result))?;
                    return Ok(());
                }
                Some(Disposition::Close) => return Ok(()),
                Some(Disposition::AwaitCallback) | None => {}
            }
        }
        Ok(())
    }

    /// Look `key` up in the registry, then among outstanding callback tokens.
    async fn resolve(&self, key: &str) -> Result<Callable> {
        if let Some(callable) = self.registry.get(key) {
            return Ok(callable.clone());
        }
        let token = CallbackToken::parse(key);
        if let Some(callable) = token.and_then(|t| self.node.callbacks().consume(&t)) {
            return Ok(callable);
        }

        self.node.logger().undefined_function(self.connection_id, key);
        self.node.metrics().record_undefined_function().await;
        Err(NetFnError::UndefinedFunction(key.to_string()))
    }

    async fn invoke(
        &self,
        name: &str,
        callable: Callable,
        args: Vec<WireArg>,
    ) -> Result<Disposition> {
        let had_callback = args.iter().any(|a| matches!(a, WireArg::Callback(_)));
        let args = decode_args(args, |t| remote_proxy(t, self.outbound, self.node));

        self.node.logger().request_start(self.connection_id, name, args.len());
        let start = self.node.metrics().start_request().await;
        let outcome = callable.call(args).await;
        let duration = self.node.metrics().end_request(start, outcome.is_ok()).await;
        self.node
            .logger()
            .request_end(self.connection_id, name, duration, outcome.as_ref().err());

        Ok(match outcome? {
            Outcome::Value(v) => Disposition::Reply(v),
            Outcome::Pending if had_callback => Disposition::AwaitCallback,
            Outcome::Pending => Disposition::Close,
        })
    }

    /// Returns `None` when no token in the frame was known.
    async fn invoke_callbacks(&self, invocations: Vec<Invocation>) -> Result<Option<Disposition>> {
        let mut disposition = None;
        for Invocation(token, args) in invocations {
            let Some(callable) = take_callback(self.node, self.connection_id, &token).await else {
                continue;
            };
            match self.invoke(token.as_str(), callable, args).await? {
                Disposition::Reply(v) => return Ok(Some(Disposition::Reply(v))),
                Disposition::AwaitCallback => disposition = Some(Disposition::AwaitCallback),
                Disposition::Close => {
                    disposition.get_or_insert(Disposition::Close);
                }
            }
        }
        Ok(disposition)
    }
}
