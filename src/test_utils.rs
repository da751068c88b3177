//! Test utilities shared by the unit tests.

use crate::function::{Arg, Callable, Outcome};
use crate::logging::{LogEntry, LogLevel};
use crate::node::Node;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Node that logs nothing.
pub fn silent_node() -> Node {
    Node::builder().silent().build()
}

/// Node whose log entries (debug and up) are captured.
pub fn capturing_node() -> (Node, Arc<Mutex<Vec<LogEntry>>>) {
    let logs = Arc::new(Mutex::new(Vec::new()));
    let logs_clone = Arc::clone(&logs);
    let node = Node::builder()
        .log_level(LogLevel::Debug)
        .log_handler(Arc::new(move |entry: &LogEntry| {
            logs_clone.lock().unwrap().push(entry.clone());
        }))
        .build();
    (node, logs)
}

/// `double(n, cb)`: calls `cb(n * 2)` and returns nothing.
pub fn double_fn() -> Callable {
    Callable::new("double", |args: Vec<Arg>| async move {
        let n = args[0].as_value().and_then(Value::as_i64).unwrap_or(0);
        match args.get(1).and_then(Arg::as_function) {
            Some(cb) => cb.call(vec![json!(n * 2).into()]).await,
            None => Ok(Outcome::Pending),
        }
    })
}

/// `add(a, b)`: returns `a + b`.
pub fn add_fn() -> Callable {
    Callable::from_sync("add", |args| {
        let a = args[0].as_value().and_then(Value::as_i64).unwrap_or(0);
        let b = args[1].as_value().and_then(Value::as_i64).unwrap_or(0);
        Ok(json!(a + b).into())
    })
}

pub async fn raw_accept(listener: &TcpListener) -> TcpStream {
    listener.accept().await.unwrap().0
}

/// Write one length-prefixed JSON frame.
pub async fn write_frame(stream: &mut TcpStream, value: &Value) {
    let body = serde_json::to_vec(value).unwrap();
    stream.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
    stream.write_all(&body).await.unwrap();
}

/// Read one length-prefixed JSON frame; `None` on a clean end of stream.
pub async fn read_frame(stream: &mut TcpStream) -> Option<Value> {
    let mut len = [0u8; 4];
    match stream.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return None,
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => return None,
        Err(e) => panic!("read failed: {}", e),
    }
    let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut body).await.unwrap();
    Some(serde_json::from_slice(&body).unwrap())
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout: Duration) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(format!("Condition not met within {:?}", timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_fn() {
        let outcome = add_fn().call(vec![json!(2).into(), json!(3).into()]).await.unwrap();
        assert_eq!(outcome, Outcome::Value(json!(5)));
    }

    #[tokio::test]
    async fn test_double_fn_calls_back() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let cb = Callable::from_sync("cb", move |args| {
            *sink.lock().unwrap() = args[0].as_value().cloned();
            Ok(Outcome::Pending)
        });

        let outcome = double_fn().call(vec![json!(10).into(), cb.into()]).await.unwrap();
        assert_eq!(outcome, Outcome::Pending);
        assert_eq!(*seen.lock().unwrap(), Some(json!(20)));
    }

    #[tokio::test]
    async fn test_wait_for_condition_times_out() {
        let result = wait_for_condition(|| async { false }, Duration::from_millis(30)).await;
        assert!(result.is_err());
    }
}
