//! Links over WebSocket framing

use futures::StreamExt;
use rpclink_engine::{Error, Link, Rpc, RpcError, ServiceBuilder, WsTransport};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn ws_links(left: &Rpc, right: &Rpc) -> (Link, Link) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
    let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;

    let left = left.attach(WsTransport::new(client), ());
    let right = right.attach(WsTransport::new(server), ());
    for link in [left.clone(), right.clone()] {
        tokio::spawn(async move { link.run().await });
    }
    (left, right)
}

#[tokio::test]
async fn test_requests_both_ways_over_websocket() {
    let left_rpc = Rpc::new();
    let mut ping = ServiceBuilder::new("Client");
    ping.request("Ping", |_l: Link, _: ()| async { Ok::<_, RpcError>("pong") })
        .unwrap();
    left_rpc.register_node(ping.build());

    let right_rpc = Rpc::new();
    let mut math = ServiceBuilder::new("Math");
    math.request("Mul", |_l: Link, (a, b): (i64, i64)| async move {
        Ok::<_, RpcError>(a * b)
    })
    .unwrap();
    let mut root = ServiceBuilder::new("Server");
    root.node("Math", math.build()).unwrap();
    right_rpc.register_node(root.build());

    let (left, right) = ws_links(&left_rpc, &right_rpc).await;

    let product: i64 = timeout(TIMEOUT, left.request("Math.Mul", (6, 7)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product, 42);

    let pong: String = timeout(TIMEOUT, right.request("ping", ()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pong, "pong");
}

#[tokio::test]
async fn test_websocket_close_fails_pending() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
    let mut server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;

    let link = Rpc::new().attach(WsTransport::new(client), ());
    let run = {
        let link = link.clone();
        tokio::spawn(async move { link.run().await })
    };

    let pending = {
        let link = link.clone();
        tokio::spawn(async move { link.request::<_, i64>("Never", ()).await })
    };

    let frame = timeout(TIMEOUT, server.next()).await.unwrap().unwrap().unwrap();
    assert!(frame.to_text().unwrap().contains("\"Never\""));
    server.close(None).await.unwrap();

    let outcome = timeout(TIMEOUT, pending).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(Error::ConnectionClosed)));
    assert!(timeout(TIMEOUT, run).await.unwrap().unwrap().is_ok());
}
