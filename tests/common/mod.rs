//! In-process fake of the chat backend for integration tests.
//!
//! A bare `TcpListener` that answers canned responses per (method, path)
//! and records every request it sees.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use parlanchina_client::{ChatClient, ClientConfig};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path including any query string.
    pub target: String,
    pub body: String,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("")
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, String),
    /// Chunked body written piece by piece.
    Chunks(Vec<Vec<u8>>),
    Status(u16),
}

#[derive(Debug, Clone)]
struct Route {
    method: String,
    path: String,
    reply: Reply,
}

#[derive(Default)]
pub struct Routes(Vec<Route>);

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: &str, path: &str, reply: Reply) -> Self {
        self.0.push(Route { method: method.to_string(), path: path.to_string(), reply });
        self
    }

    pub fn json(self, method: &str, path: &str, body: serde_json::Value) -> Self {
        self.on(method, path, Reply::Json(200, body.to_string()))
    }

    /// NDJSON stream split into the given text pieces.
    pub fn stream(self, path: &str, pieces: &[&str]) -> Self {
        let chunks = pieces.iter().map(|p| p.as_bytes().to_vec()).collect();
        self.on("GET", path, Reply::Chunks(chunks))
    }
}

pub struct FakeBackend {
    pub base_url: String,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeBackend {
    pub async fn start(routes: Routes) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake backend");
        let addr = listener.local_addr().expect("local addr");
        let log = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes.0);

        let task_log = log.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let log = task_log.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, &routes, &log).await;
                });
            }
        });

        Self { base_url: format!("http://{addr}"), log }
    }

    pub fn client(&self) -> ChatClient {
        ChatClient::new(ClientConfig::new(&self.base_url).model("test-model")).expect("client")
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    /// Requests matching `method` and path (query ignored).
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path() == path)
            .collect()
    }
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<Recorded>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("").to_string();
    let target = request_line.next().unwrap_or("/").to_string();
    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    Ok(Some(Recorded { method, target, body }))
}

async fn handle(
    mut stream: TcpStream,
    routes: &[Route],
    log: &Mutex<Vec<Recorded>>,
) -> std::io::Result<()> {
    let Some(request) = read_request(&mut stream).await? else {
        return Ok(());
    };
    let reply = routes
        .iter()
        .find(|r| r.method == request.method && r.path == request.path())
        .map(|r| r.reply.clone())
        .unwrap_or(Reply::Status(404));
    log.lock().unwrap().push(request);

    match reply {
        Reply::Json(status, body) => {
            let head = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).await?;
            stream.write_all(body.as_bytes()).await?;
        }
        Reply::Status(status) => {
            let head = format!("HTTP/1.1 {status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            stream.write_all(head.as_bytes()).await?;
        }
        Reply::Chunks(chunks) => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
            stream.write_all(head.as_bytes()).await?;
            for chunk in chunks {
                stream.write_all(format!("{:X}\r\n", chunk.len()).as_bytes()).await?;
                stream.write_all(&chunk).await?;
                stream.write_all(b"\r\n").await?;
                stream.flush().await?;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            stream.write_all(b"0\r\n\r\n").await?;
        }
    }
    stream.flush().await?;
    stream.shutdown().await
}
