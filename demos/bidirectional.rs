//! Bidirectional example: both peers expose services and call each other
//!
//! Run with: `cargo run --example bidirectional`

use rpclink::{service, LineTransport, Link, LinkMetrics, Rpc, RpcError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LogParams {
    level: String,
    message: String,
}

#[derive(Default)]
struct Stats {
    greeted: AtomicU64,
}

#[service]
impl Stats {
    pub async fn greeted(&self, _link: Link, _: ()) -> Result<u64, RpcError> {
        Ok(self.greeted.load(Ordering::SeqCst))
    }
}

struct Server {
    stats: Arc<Stats>,
}

#[service]
impl Server {
    /// Asks the caller for its name before answering.
    pub async fn greet(&self, link: Link, _: ()) -> Result<String, RpcError> {
        let name: String = link
            .request("Whoami", ())
            .await
            .map_err(|e| e.to_rpc_error())?;
        self.stats.greeted.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Hello, {name}!"))
    }

    pub async fn log(&self, _link: Link, params: LogParams) {
        println!("[SERVER] [{}] {}", params.level, params.message);
    }

    #[subservice]
    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }
}

struct Client {
    name: String,
}

#[service]
impl Client {
    pub async fn whoami(&self, _link: Link, _: ()) -> Result<String, RpcError> {
        Ok(self.name.clone())
    }
}

async fn start_server(listener: TcpListener) -> rpclink::Result<()> {
    let rpc = Rpc::new();
    rpc.register(Server {
        stats: Arc::new(Stats::default()),
    })?;
    println!("[SERVER] Methods:\n{}", rpc.describe());
    let metrics = Arc::new(LinkMetrics::new("bidirectional-server"));

    loop {
        let (stream, addr) = listener.accept().await?;
        let link = rpc
            .link(LineTransport::new(stream))
            .user_context(addr)
            .metrics(Arc::clone(&metrics))
            .attach()?;
        tokio::spawn(async move {
            if let Err(e) = link.run().await {
                eprintln!("[SERVER] Link {} from {} ended: {}", link.id(), addr, e);
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = start_server(listener).await {
            eprintln!("[SERVER] Error: {}", e);
        }
    });
    println!("[SERVER] Listening on {}", addr);

    let rpc = Rpc::new();
    rpc.register(Client {
        name: "demo-client".to_string(),
    })?;
    let link = rpc.attach(LineTransport::new(TcpStream::connect(addr).await?), ());
    let run = {
        let link = link.clone();
        tokio::spawn(async move { link.run().await })
    };

    link.notify(
        "Log",
        LogParams {
            level: "info".to_string(),
            message: "client connected".to_string(),
        },
    )
    .await?;

    for _ in 0..3 {
        let greeting: String = link.request("Greet", ()).await?;
        println!("[CLIENT] {}", greeting);
    }

    let greeted: u64 = link.request("stats.greeted", ()).await?;
    println!("[CLIENT] Server has greeted {} time(s)", greeted);

    match link.request::<_, ()>("Missing.Method", ()).await {
        Err(e) => println!("[CLIENT] Expected failure: {}", e),
        Ok(()) => println!("[CLIENT] Unexpected success"),
    }

    link.close().await;
    run.await??;
    println!("[CLIENT] Done");
    Ok(())
}
