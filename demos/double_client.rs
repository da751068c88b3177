//! Calls the functions served by the `double_server` example.

use netfn::{call, Callable, Completion, Node, Outcome};
use tokio::sync::oneshot;
use std::sync::Mutex;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let node = Node::new();
    // Client-side functions only provide names.
    let names = vec![
        Callable::from_sync("double", |_| Ok(Outcome::Pending)),
        Callable::from_sync("add", |_| Ok(Outcome::Pending)),
    ];
    let proxies = node.connect(names, 8021, "localhost");

    match call!(proxies, add(2, 3)).await?.outcome().await? {
        Completion::Returned(sum) => println!("add(2, 3) = {}", sum),
        Completion::Closed => println!("add(2, 3) returned nothing"),
    }

    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let on_result = Callable::from_sync("on_result", move |args| {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(args[0].as_value().cloned());
        }
        Ok(Outcome::Pending)
    });

    let pending = call!(proxies, double(10, on_result)).await?;
    println!("double(10) = {:?}", rx.await?);
    pending.outcome().await?;

    let snapshot = node.metrics().snapshot().await;
    println!(
        "{} calls, {} callbacks delivered, avg {:.2}ms",
        snapshot.requests_total, snapshot.callbacks_delivered, snapshot.latency_avg_ms
    );
    Ok(())
}
