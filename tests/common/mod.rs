//! Fake upstream devices and connectors shared by the integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use limelight_proxy::http::response::{Body, Response};
use limelight_proxy::proxy::{Connector, HandlerConfig, RelayMode, UpstreamTarget};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// What the fake upstream saw on its single connection.
#[derive(Debug)]
pub struct Captured {
    /// Request head, including the blank line.
    pub head: String,
    pub body: Vec<u8>,
    /// The proxy closed its side after the response was sent.
    pub saw_eof: bool,
}

impl Captured {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }
}

/// Accepts one connection, records the request, replies with `parts`
/// written one after another, then waits for the proxy to hang up.
pub async fn spawn_upstream(parts: Vec<Vec<u8>>) -> (u16, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let (head, body) = read_request(&mut socket).await;

        for part in parts {
            socket.write_all(&part).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut rest = [0u8; 64];
        let saw_eof = matches!(
            tokio::time::timeout(Duration::from_secs(2), socket.read(&mut rest)).await,
            Ok(Ok(0)) | Ok(Err(_))
        );

        Captured { head, body, saw_eof }
    });

    (port, handle)
}

/// Convenience for a single-part response.
pub async fn spawn_upstream_once(response: &[u8]) -> (u16, JoinHandle<Captured>) {
    spawn_upstream(vec![response.to_vec()]).await
}

/// Upstream that sends the head and the first chunk, then keeps the socket
/// open until the proxy drops it. Reports through `closed` once it does.
pub async fn spawn_endless_upstream(head: &'static [u8], chunk: &'static [u8]) -> (u16, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket.write_all(head).await.unwrap();
        socket.write_all(chunk).await.unwrap();

        let mut rest = [0u8; 64];
        if let Ok(0) | Err(_) = socket.read(&mut rest).await {
            let _ = tx.send(());
        }
    });

    (port, rx)
}

/// Upstream that accepts and then never answers.
pub async fn spawn_silent_upstream() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    port
}

async fn read_request(socket: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut temp = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut temp).await.unwrap();
        assert!(n > 0, "proxy closed before sending a full request");
        buf.extend_from_slice(&temp[..n]);
    };

    let head = String::from_utf8(buf[..head_end].to_vec()).unwrap();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| v.trim().parse::<usize>().unwrap())
        })
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut temp).await.unwrap();
        assert!(n > 0, "proxy closed before sending the full body");
        body.extend_from_slice(&temp[..n]);
    }

    (head, body)
}

/// Counts connection attempts, then connects over TCP.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    pub attempts: Arc<AtomicUsize>,
}

impl RecordingConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for RecordingConnector {
    type Stream = TcpStream;

    fn connect(&self, host: &str, port: u16) -> impl Future<Output = io::Result<TcpStream>> + Send {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let addr = format!("{}:{}", host, port);
        async move { TcpStream::connect(addr).await }
    }
}

/// Never completes a connection, like a host that drops SYNs.
#[derive(Clone, Copy, Default)]
pub struct BlackholeConnector;

impl Connector for BlackholeConnector {
    type Stream = TcpStream;

    fn connect(&self, _host: &str, _port: u16) -> impl Future<Output = io::Result<TcpStream>> + Send {
        std::future::pending()
    }
}

pub fn local_config(port: u16, mode: RelayMode) -> HandlerConfig {
    HandlerConfig::new(UpstreamTarget::new("127.0.0.1", port), mode)
}

/// Drain a response body into memory.
pub async fn body_bytes(response: Response) -> Vec<u8> {
    match response.body {
        Body::Buffered(bytes) => bytes.to_vec(),
        Body::Streamed(mut stream) => {
            let mut out = Vec::new();
            while let Some(chunk) = stream.next().await {
                out.extend_from_slice(&chunk.unwrap());
            }
            out
        }
    }
}

pub fn assert_cors(response: &Response) {
    assert_eq!(response.headers.get("Access-Control-Allow-Origin"), Some("*"));
    assert_eq!(
        response.headers.get("Access-Control-Allow-Methods"),
        Some("GET, POST, PUT, DELETE, OPTIONS")
    );
    assert_eq!(response.headers.get("Access-Control-Allow-Headers"), Some("*"));
}
