use bytes::Bytes;
use duplex_rpc::{
    InProcessWindow, MessagePort, Methods, PortChannel, RpcServer, Value, WindowChannel, args,
    remote, transfer, wrap,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// A counter object handed out by `open`, living only on the exposing side.
fn counter(start: i64) -> Methods {
    let value = Arc::new(Mutex::new(start));
    let read = value.clone();
    Methods::new()
        .method_sync("increment", move |args| {
            let step = args.first().and_then(Value::as_i64).unwrap_or(1);
            let mut value = value.lock();
            *value += step;
            Ok(*value)
        })
        .method_sync("getValue", move |_| Ok(*read.lock()))
}

fn service() -> Methods {
    Methods::new()
        .method_sync("open", |args| {
            let start = args.first().and_then(Value::as_i64).unwrap_or_default();
            Ok(remote(counter(start)))
        })
        .method_sync("registry", |_| {
            Ok(remote(Methods::new().method_sync("open", |args| {
                let start = args.first().and_then(Value::as_i64).unwrap_or_default();
                Ok(remote(counter(start)))
            })))
        })
        .method_sync("checksum", |args| {
            let data = args.first().and_then(Value::as_bytes).cloned().unwrap_or_default();
            Ok(data.iter().map(|b| i64::from(*b)).sum::<i64>())
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Remote objects over a message port ===\n");
    let (caller, callee) = MessagePort::pair("demo");
    let server = RpcServer::new(service());
    let handle = server.expose(Arc::new(PortChannel::new(callee).with_name("callee")));
    let api = wrap(Arc::new(PortChannel::new(caller).with_name("caller")));

    let counter = api.call_method("open", args![10]).await?.into_object()?;
    println!("open(10) -> {:?}", counter.scope());
    counter.call_method("increment", args![5]).await?;
    let value: i64 = counter.get("getValue").ok_or("reserved")?.call_as(args![]).await?;
    println!("counter.getValue() = {}", value);

    let registry = api.call_method("registry", args![]).await?.into_object()?;
    let nested = registry.call_method("open", args![100]).await?.into_object()?;
    let value: i64 = nested.get("increment").ok_or("reserved")?.call_as(args![]).await?;
    println!("registry.open(100).increment() = {}", value);
    println!("live references: {:?}", handle.live_references());

    for id in handle.live_references() {
        handle.release(&id);
    }
    match counter.call_method("getValue", args![]).await {
        Ok(value) => println!("unexpected success after release: {:?}", value),
        Err(e) => println!("after release: {}", e),
    }

    println!("\n=== Transferables ===\n");
    let frame = Bytes::from(vec![1u8; 64 * 1024]);
    let sum: i64 = api
        .get("checksum")
        .ok_or("reserved")?
        .call_as(vec![transfer(frame)])
        .await?;
    println!("checksum of a 64 KiB frame moved without copying = {}", sum);

    println!("\n=== Same service across windows ===\n");
    let (opener, popup) = InProcessWindow::pair("https://app.example", "https://popup.example");
    server.expose(Arc::new(WindowChannel::new(popup).with_name("popup")));
    let popup_api = wrap(Arc::new(WindowChannel::new(opener).with_name("opener")));

    let counter = popup_api.call_method("open", args![1]).await?.into_object()?;
    let value: i64 = counter.get("increment").ok_or("reserved")?.call_as(args![41]).await?;
    println!("popup counter = {}", value);

    Ok(())
}
