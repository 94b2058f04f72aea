//! Minimal in-process HTTP server for tests.
//!
//! Speaks just enough HTTP/1.1 for reqwest: reads the request head, answers with
//! whatever the handler returns and closes the connection.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Handler = dyn Fn(&str, &str) -> Reply + Send + Sync;

pub struct Reply {
    status: u16,
    location: Option<String>,
    body: Vec<u8>,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            location: None,
            body: Vec::new(),
        }
    }

    pub fn body(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            location: None,
            body: body.into(),
        }
    }

    pub fn redirect(to: impl Into<String>) -> Self {
        Self {
            status: 302,
            location: Some(to.into()),
            body: Vec::new(),
        }
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// `"METHOD /path"` for every request served so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

pub async fn spawn<F>(handler: F) -> MockServer
where
    F: Fn(&str, &str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler: Arc<Handler> = Arc::new(handler);

    let log = Arc::clone(&requests);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let _ = serve(stream, handler, log).await;
            });
        }
    });

    MockServer { addr, requests }
}

/// Accepts connections and never answers.
pub async fn spawn_silent() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

async fn serve(
    mut stream: TcpStream,
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&head);
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    log.lock().push(format!("{} {}", method, path));

    let reply = handler(&method, &path);
    let location = reply
        .location
        .map(|to| format!("Location: {}\r\n", to))
        .unwrap_or_default();
    let mut response = format!(
        "HTTP/1.1 {} Mock\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        location,
        reply.body.len()
    )
    .into_bytes();
    if method != "HEAD" {
        response.extend_from_slice(&reply.body);
    }
    stream.write_all(&response).await?;
    stream.shutdown().await
}
