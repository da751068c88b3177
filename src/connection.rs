//! Length-delimited framing over a TCP stream, and the proxies that send callback
//! invocations back over it.
//!
//! Every frame is a 4-byte big-endian length followed by one JSON [`Message`].
//! Writes go through a dedicated task so proxies can send from anywhere without
//! holding the socket.

use crate::callbacks::{CallbackTable, CallbackToken};
use crate::error::{NetFnError, Result};
use crate::function::{Arg, Callable, Function, Outcome};
use crate::message::{encode_args, Message, WireArg};
use crate::node::Node;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

fn codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(max_frame_length)
        .new_codec()
}

/// Split `stream` into a frame reader and an [`Outbound`] handle backed by a writer task.
pub(crate) fn open(stream: TcpStream, node: &Node, connection_id: &str) -> (FrameReader, Outbound) {
    let max = node.options().max_frame_length;
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (read_half, write_half) = stream.into_split();

    let reader = FrameReader {
        inner: FramedRead::new(read_half, codec(max)),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let sink = FramedWrite::new(write_half, codec(max));
    tokio::spawn(write_loop(
        sink,
        rx,
        node.clone(),
        connection_id.to_string(),
        peer,
    ));

    let outbound = Outbound {
        tx,
        reserved: Arc::new(Mutex::new(HashSet::new())),
    };
    (reader, outbound)
}

pub(crate) struct FrameReader {
    inner: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
}

impl FrameReader {
    /// Next decoded message; `None` once the peer has closed its side.
    pub async fn next_message(&mut self) -> Option<Result<Message>> {
        let frame = self.inner.next().await?;
        Some(
            frame
                .map_err(NetFnError::from)
                .and_then(|bytes| Message::unpack(&bytes)),
        )
    }
}

enum Command {
    Send(Message),
    Shutdown,
}

/// Write side of a connection.
///
/// Frames are written in the order they are sent. [`shutdown`](Self::shutdown)
/// flushes what is queued and then closes the write half; anything sent afterwards
/// fails with [`NetFnError::ConnectionClosed`].
///
/// Also remembers the tokens of functions sent on this connection, so a call can
/// tell when its own callbacks are spent regardless of other calls on the node.
#[derive(Clone)]
pub(crate) struct Outbound {
    tx: mpsc::UnboundedSender<Command>,
    reserved: Arc<Mutex<HashSet<CallbackToken>>>,
}

impl Outbound {
    /// [`encode_args`] into `table`, recording the reserved tokens for this connection.
    pub fn encode_args(&self, table: &CallbackTable, args: Vec<Arg>) -> Vec<WireArg> {
        let wire = encode_args(table, args);
        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
        reserved.extend(wire.iter().filter_map(|arg| match arg {
            WireArg::Callback(r) => Some(r.token.clone()),
            WireArg::Literal(_) => None,
        }));
        wire
    }

    /// Whether a function sent on this connection can still be invoked.
    pub fn has_outstanding(&self, table: &CallbackTable) -> bool {
        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
        reserved.retain(|token| table.contains(token));
        !reserved.is_empty()
    }

    pub fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(Command::Send(message))
            .map_err(|_| NetFnError::ConnectionClosed)
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    node: Node,
    connection_id: String,
    peer: String,
) {
    while let Some(command) = rx.recv().await {
        let message = match command {
            Command::Send(message) => message,
            Command::Shutdown => break,
        };

        let packed = match message.pack() {
            Ok(packed) => packed,
            Err(e) => {
                node.logger().connection_error(Some(&connection_id), &peer, &e);
                continue;
            }
        };

        if let Err(e) = sink.send(Bytes::from(packed)).await {
            let e = NetFnError::from(e);
            node.logger().connection_error(Some(&connection_id), &peer, &e);
            node.metrics().record_connection_error().await;
            break;
        }
    }

    rx.close();
    let _ = SinkExt::<Bytes>::close(&mut sink).await;
}

/// Consume `token` from the node's callback table, logging and counting the delivery.
pub(crate) async fn take_callback(
    node: &Node,
    connection_id: &str,
    token: &CallbackToken,
) -> Option<Callable> {
    match node.callbacks().consume(token) {
        Some(callable) => {
            node.logger().callback_invoked(connection_id, token.as_str());
            node.metrics().record_callback_delivered().await;
            Some(callable)
        }
        None => {
            node.logger().callback_dropped(connection_id, token.as_str());
            node.metrics().record_callback_dropped().await;
            None
        }
    }
}

/// Local stand-in for a function the peer passed by token.
struct RemoteCallback {
    token: CallbackToken,
    outbound: Outbound,
    node: Node,
}

#[async_trait]
impl Function for RemoteCallback {
    async fn call(&self, args: Vec<Arg>) -> Result<Outcome> {
        let args = self.outbound.encode_args(self.node.callbacks(), args);
        self.outbound.send(Message::invoke(self.token.clone(), args))?;
        Ok(Outcome::Pending)
    }
}

/// Build a callable that, when invoked, sends an invoke frame for `token` on `outbound`.
pub(crate) fn remote_proxy(token: CallbackToken, outbound: &Outbound, node: &Node) -> Callable {
    let name = token.to_string();
    Callable::from_function(
        Some(&name),
        RemoteCallback {
            token,
            outbound: outbound.clone(),
            node: node.clone(),
        },
    )
}
