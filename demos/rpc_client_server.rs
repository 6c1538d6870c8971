use duplex_rpc::{
    Channel, Methods, SocketChannel, TcpConfig, TcpSocket, TcpSocketListener, Value, args, expose,
    wrap,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EchoResponse {
    message: String,
    length: usize,
}

const ADDR: &str = "127.0.0.1:47100";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(|s| s.as_str()).unwrap_or("server");

    match mode {
        "server" => run_server().await?,
        "client" => run_client().await?,
        _ => {
            eprintln!("Usage: cargo run --example rpc_client_server -- [server|client]");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn service() -> Methods {
    Methods::new()
        .typed("add", |(a, b): (i64, i64)| async move {
            println!("[Server] add({}, {})", a, b);
            Ok::<_, Value>(a + b)
        })
        .typed("echo", |(message,): (String,)| async move {
            println!("[Server] echo(\"{}\")", message);
            let length = message.len();
            Ok::<_, Value>(EchoResponse { message, length })
        })
        .namespace(
            "math",
            Methods::new().method_sync("divide", |args| {
                let a = args.first().and_then(Value::as_f64).unwrap_or_default();
                let b = args.get(1).and_then(Value::as_f64).unwrap_or_default();
                if b == 0.0 {
                    return Err(Value::named_error("RangeError", "division by zero"));
                }
                Ok(a / b)
            }),
        )
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = ADDR.parse()?;
    let listener = TcpSocketListener::bind(addr, TcpConfig::default()).await?;
    println!("[Server] Listening on {}", listener.local_addr()?);

    loop {
        let socket = listener.accept().await?;
        println!("[Server] Accepted {}", socket.peer_addr());
        let channel: Arc<dyn Channel> = Arc::new(SocketChannel::new(socket).with_name("tcp-server"));
        expose(service(), channel);
    }
}

async fn run_client() -> Result<(), Box<dyn std::error::Error>> {
    println!("[Client] Connecting to {}", ADDR);
    let socket = TcpSocket::connect(ADDR.parse()?, TcpConfig::default()).await?;
    let api = wrap(Arc::new(SocketChannel::new(socket).with_name("tcp-client")));
    println!("[Client] Connected!\n");

    let sum: i64 = api.get("add").ok_or("reserved")?.call_as(args![10, 32]).await?;
    println!("[Client] add(10, 32) = {}", sum);

    let echo: EchoResponse = api
        .get("echo")
        .ok_or("reserved")?
        .call_as(args!["Hello, duplex-rpc!"])
        .await?;
    println!("[Client] echo -> {:?}", echo);

    let divide = api.get("math").and_then(|m| m.get("divide")).ok_or("reserved")?;
    let quotient: f64 = divide.call_as(args![1.0, 4.0]).await?;
    println!("[Client] math.divide(1, 4) = {}", quotient);

    match divide.call(args![1.0, 0.0]).await {
        Ok(value) => println!("[Client] unexpected success: {:?}", value),
        Err(e) => println!("[Client] math.divide(1, 0) failed: {}", e),
    }

    match api.call_method("nope", args![]).await {
        Ok(value) => println!("[Client] unexpected success: {:?}", value),
        Err(e) => println!("[Client] nope() failed: {}", e),
    }

    println!("\n[Client] Done");
    Ok(())
}
