//! In-process servers shared by the unit tests: a minimal hub that speaks
//! the JSON hub protocol over a real WebSocket, and a one-shot HTTP responder.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, accept_async, accept_hdr_async};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::Message as WsMessage;

pub const RS: char = '\u{1e}';

/// Handshake acceptance record.
pub fn accepted() -> String {
    format!("{{}}{RS}")
}

pub fn invocation(target: &str, arguments: serde_json::Value) -> String {
    format!(
        "{}{RS}",
        serde_json::json!({ "type": 1, "target": target, "arguments": arguments })
    )
}

/// What the hub saw from one client session.
#[derive(Debug, Default)]
pub struct HubSession {
    pub uri: String,
    pub authorization: Option<String>,
    pub frames: Vec<String>,
}

pub struct MockHub {
    pub url: String,
    pub session: JoinHandle<HubSession>,
}

/// Accepts one client, answers its handshake with `handshake`, pushes
/// `frames`, then records text frames until the client goes away.
pub async fn spawn_hub(handshake: String, frames: Vec<String>) -> MockHub {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind hub");
    let addr = listener.local_addr().expect("hub addr");
    let session = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept hub client");
        serve_hub(stream, handshake, frames).await
    });
    MockHub {
        url: format!("http://{addr}/update"),
        session,
    }
}

pub async fn serve_hub(stream: TcpStream, handshake: String, frames: Vec<String>) -> HubSession {
    let seen = Arc::new(Mutex::new((String::new(), None::<String>)));
    let capture = seen.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let authorization = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *capture.lock().unwrap() = (req.uri().to_string(), authorization);
        Ok(resp)
    };
    let mut ws = accept_hdr_async(stream, callback)
        .await
        .expect("websocket handshake");

    let (uri, authorization) = seen.lock().unwrap().clone();
    let mut session = HubSession {
        uri,
        authorization,
        frames: Vec::new(),
    };

    if let Some(Ok(WsMessage::Text(text))) = ws.next().await {
        session.frames.push(text.as_str().to_string());
    }
    let _ = ws.send(WsMessage::text(handshake)).await;
    for frame in frames {
        let _ = ws.send(WsMessage::text(frame)).await;
    }
    while let Some(Ok(msg)) = ws.next().await {
        if let WsMessage::Text(text) = msg {
            session.frames.push(text.as_str().to_string());
        }
    }
    session
}

pub struct ScriptedHub {
    pub url: String,
    pub task: JoinHandle<()>,
}

/// Accepts one client and hands the upgraded socket to `script`, for hubs
/// that misbehave in ways `serve_hub` does not.
pub async fn spawn_scripted_hub<F, Fut>(script: F) -> ScriptedHub
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind hub");
    let addr = listener.local_addr().expect("hub addr");
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept hub client");
        let ws = accept_async(stream).await.expect("websocket handshake");
        script(ws).await;
    });
    ScriptedHub {
        url: format!("http://{addr}/update"),
        task,
    }
}

/// Reads frames until the client goes away.
pub async fn drain(ws: &mut WebSocketStream<TcpStream>) {
    while let Some(Ok(_)) = ws.next().await {}
}

/// Log lines written while a `capture_logs` guard is alive.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Captures debug-level logs on the current thread, which covers every task
/// of a current-thread test runtime.
pub fn capture_logs() -> (tracing::subscriber::DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}

#[derive(Debug)]
pub struct HttpRequest {
    pub request_line: String,
    pub head: String,
    pub body: String,
}

/// Answers a single HTTP request with `status` and a JSON `body`.
pub async fn respond_once(listener: &TcpListener, status: &str, body: &str) -> HttpRequest {
    let (mut stream, _) = listener.accept().await.expect("accept http client");
    let request = read_request(&mut stream).await;
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream
        .write_all(response.as_bytes())
        .await
        .expect("write http response");
    let _ = stream.shutdown().await;
    request
}

async fn read_request(stream: &mut TcpStream) -> HttpRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.expect("read request");
        assert!(n > 0, "connection closed before the request head");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.expect("read request body");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let end = (header_end + content_length).min(buf.len());
    HttpRequest {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&buf[header_end..end]).to_string(),
        head,
    }
}
