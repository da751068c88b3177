//! Detached server bootstrap.
//!
//! cargo run --example bootstrap
//!
//! The example relaunches itself as a detached server exposing only `add`, waits for
//! it to listen, calls it, then stops it. When started with `NETFN_BOOTSTRAP` set it
//! acts as that server.

use netfn::{
    run_bootstrapped, BootstrapConfig, BootstrapOutcome, Callable, Completion, LaunchSpec, Node,
};
use serde_json::json;
use std::time::Duration;

fn catalog() -> Vec<Callable> {
    let add = Callable::from_sync("add", |args| {
        let a = args[0].as_value().and_then(|v| v.as_i64()).unwrap_or(0);
        let b = args[1].as_value().and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(json!(a + b).into())
    });
    let multiply = Callable::from_sync("multiply", |args| {
        let a = args[0].as_value().and_then(|v| v.as_i64()).unwrap_or(0);
        let b = args[1].as_value().and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(json!(a * b).into())
    });
    vec![add, multiply]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if BootstrapConfig::from_env()?.is_some() {
        run_bootstrapped(catalog()).await;
        return Ok(());
    }

    tracing_subscriber::fmt::init();

    let node = Node::new();
    let port = netfn::find_free_port().ok_or("no free port")?;
    let config = BootstrapConfig::new(port)
        .with_host("127.0.0.1")
        .with_entry_points(["add"]);

    let mut server = match node.bootstrap_detached(LaunchSpec::current_exe(config)?).await? {
        BootstrapOutcome::Spawned(server) => server,
        BootstrapOutcome::PortInUse => {
            println!("port {} is already served", port);
            return Ok(());
        }
    };
    println!("spawned pid {:?} on port {}", server.pid(), port);
    server.wait_ready(Duration::from_secs(10)).await?;

    let proxies = node.connect(catalog(), port, "127.0.0.1");
    let sum = proxies
        .call("add", vec![json!(20).into(), json!(22).into()])
        .await?
        .outcome()
        .await?;
    println!("add(20, 22) = {:?}", sum.value());

    // Not exposed by the bootstrapped server: the connection closes without a result.
    let product = proxies
        .call("multiply", vec![json!(6).into(), json!(7).into()])
        .await?
        .outcome()
        .await?;
    assert_eq!(product, Completion::Closed);

    server.kill().await?;
    Ok(())
}
