//! Serves `double` and `add` on port 8021.
//!
//! cargo run --example double_server
//! Then, in another terminal: cargo run --example double_client

use netfn::{ArgsExtractor, Callable, Node};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> netfn::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let double = Callable::new("double", |args| async move {
        let args = ArgsExtractor::new(args);
        let n: i64 = args.get(0)?;
        args.callback(1)?.call(vec![json!(n * 2).into()]).await
    });

    let add = Callable::from_sync("add", |args| {
        let args = ArgsExtractor::new(args);
        let a: i64 = args.get(0)?;
        let b: i64 = args.get(1)?;
        Ok(json!(a + b).into())
    });

    let node = Node::new();
    let server = node
        .listen_with(vec![double, add], 8021, "localhost", |addr| {
            println!("serving on {}", addr);
        })
        .await?;

    server.run_until_ctrl_c().await
}
