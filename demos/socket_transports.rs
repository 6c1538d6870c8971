use duplex_rpc::{
    Channel, MemorySocket, Methods, PrettyJsonCodec, SocketChannel, SocketLike, TcpConfig,
    TcpSocket, TcpSocketListener, Value, args, expose, wrap,
};
use std::sync::Arc;
use std::time::Instant;

const ITERATIONS: usize = 1000;

fn service() -> Methods {
    Methods::new()
        .method_sync("ping", |_| Ok("pong"))
        .method_sync("sum", |args| {
            Ok(args.iter().filter_map(Value::as_i64).sum::<i64>())
        })
}

async fn bench(
    label: &str,
    calling: Arc<dyn Channel>,
    exposing: Arc<dyn Channel>,
) -> Result<(), Box<dyn std::error::Error>> {
    let _server = expose(service(), exposing);
    let api = wrap(calling.clone());
    let ping = api.get("ping").ok_or("reserved")?;

    let start = Instant::now();
    for _ in 0..ITERATIONS {
        ping.call(args![]).await?;
    }
    let elapsed = start.elapsed();

    let total: i64 = api.get("sum").ok_or("reserved")?.call_as(args![1, 2, 3, 4]).await?;
    println!(
        "[{}] {} calls in {:?} ({:.1} us/call), sum = {}",
        label,
        ITERATIONS,
        elapsed,
        elapsed.as_micros() as f64 / ITERATIONS as f64,
        total
    );
    if let Some(stats) = calling.stats() {
        println!("{}", stats);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let (a, b) = MemorySocket::pair("memory");
    bench(
        "memory",
        Arc::new(SocketChannel::new(a)),
        Arc::new(SocketChannel::new(b)),
    )
    .await?;

    // Either side may pick its own text codec as long as both speak JSON.
    let (a, b) = MemorySocket::pair("pretty");
    bench(
        "memory/pretty",
        Arc::new(SocketChannel::with_codec(a, PrettyJsonCodec)),
        Arc::new(SocketChannel::new(b)),
    )
    .await?;

    // Garbage on the wire is dropped by the receiving adapter.
    let (a, b) = MemorySocket::pair("noisy");
    a.send_text("definitely not json".to_string()).await?;
    let receiver = Arc::new(SocketChannel::new(b));
    bench("memory/noisy", Arc::new(SocketChannel::new(a)), receiver.clone()).await?;
    if let Some(stats) = receiver.stats() {
        println!("noisy receiver dropped {} frame(s)\n", stats.messages_dropped);
    }

    let listener = TcpSocketListener::bind("127.0.0.1:0".parse()?, TcpConfig::default()).await?;
    let addr = listener.local_addr()?;
    let connect = tokio::spawn(async move { TcpSocket::connect(addr, TcpConfig::default()).await });
    let server_side = listener.accept().await?;
    let client_side = connect.await??;
    bench(
        "tcp",
        Arc::new(SocketChannel::new(client_side).with_name("tcp-client")),
        Arc::new(SocketChannel::new(server_side).with_name("tcp-server")),
    )
    .await?;

    Ok(())
}
