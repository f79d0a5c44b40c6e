//! Shared helpers for link integration tests

#![allow(dead_code)]

use rpclink_engine::{LineTransport, Link, Rpc};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Two links connected back to back, both running
pub struct Pair {
    pub left: Link,
    pub right: Link,
    pub left_run: JoinHandle<rpclink_core::Result<()>>,
    pub right_run: JoinHandle<rpclink_core::Result<()>>,
}

pub fn linked_pair(left: &Rpc, right: &Rpc) -> Pair {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let left = left.attach(LineTransport::new(a), ());
    let right = right.attach(LineTransport::new(b), ());
    Pair {
        left_run: spawn_run(&left),
        right_run: spawn_run(&right),
        left,
        right,
    }
}

pub fn spawn_run(link: &Link) -> JoinHandle<rpclink_core::Result<()>> {
    let link = link.clone();
    tokio::spawn(async move { link.run().await })
}

/// The far end of a link, speaking raw JSON lines
pub struct RawPeer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl RawPeer {
    /// A running link attached to `rpc`, plus the raw end facing it
    pub fn attach(rpc: &Rpc) -> (Link, JoinHandle<rpclink_core::Result<()>>, RawPeer) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let link = rpc.attach(LineTransport::new(a), ());
        let run = spawn_run(&link);
        let (reader, writer) = tokio::io::split(b);
        let peer = RawPeer {
            reader: BufReader::new(reader),
            writer,
        };
        (link, run, peer)
    }

    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn recv(&mut self) -> Value {
        let mut line = String::new();
        tokio::time::timeout(TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for an envelope")
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    /// Assert nothing arrives within a short window
    pub async fn expect_silence(&mut self) {
        let mut line = String::new();
        let read =
            tokio::time::timeout(Duration::from_millis(150), self.reader.read_line(&mut line))
                .await;
        assert!(read.is_err(), "unexpected envelope: {line}");
    }

    /// Close the write direction, as a disconnecting peer would
    pub async fn hang_up(mut self) {
        self.writer.shutdown().await.unwrap();
    }
}
