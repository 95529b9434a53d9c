//! Hub connection
//!
//! `HubConnection` owns one WebSocket session to a hub at a time:
//! - negotiate (unless skipped) and open the socket, each bounded by the
//!   connect timeout
//! - exchange the protocol handshake
//! - run a writer task fed by an mpsc channel, a keep-alive task that pings
//!   the server, and a reader task that dispatches invocations to the
//!   `HandlerTable`
//!
//! The reader ends the session on a close message, socket close, transport
//! or protocol error, or when the server stays silent past the server
//! timeout. `on_closed` callbacks fire exactly once per session. There is no
//! automatic reconnect; call `start` again from a closed callback if needed.
//!
//! A `start` that fails or is cancelled leaves the connection
//! `Disconnected`. Internal locks are never held across an `.await`. Lock
//! order is session, then state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::http::header::AUTHORIZATION;
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::config::HubSettings;
use crate::hub::handlers::HandlerTable;
use crate::hub::negotiate::{negotiate, parse_hub_url, websocket_url};
use crate::hub::protocol::{self, HubMessage};
use crate::utils::HubError;

pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ClosedCallback = Arc<dyn Fn(Option<&HubError>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone)]
pub struct HubConnectionBuilder {
    url: String,
    skip_negotiation: bool,
    access_token: Option<String>,
    keep_alive_interval: Duration,
    server_timeout: Duration,
    handshake_timeout: Duration,
    connect_timeout: Duration,
    stop_timeout: Duration,
}

impl HubConnectionBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            skip_negotiation: false,
            access_token: None,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &HubSettings) -> Self {
        Self::new(settings.url.clone())
            .skip_negotiation(settings.skip_negotiation)
            .access_token(settings.access_token.clone())
            .keep_alive_interval(settings.keep_alive_interval())
            .server_timeout(settings.server_timeout())
            .handshake_timeout(settings.handshake_timeout())
            .connect_timeout(settings.connect_timeout())
    }

    /// Connect straight to the WebSocket endpoint without `/negotiate`.
    pub fn skip_negotiation(mut self, skip: bool) -> Self {
        self.skip_negotiation = skip;
        self
    }

    pub fn access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Bounds negotiation and, separately, opening the socket.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// How long `stop` waits for the server to acknowledge the close.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HubConnection, HubError> {
        let url = parse_hub_url(&self.url)?;
        Ok(HubConnection {
            inner: Arc::new(Inner {
                options: ConnectionOptions {
                    url,
                    skip_negotiation: self.skip_negotiation,
                    access_token: self.access_token,
                    keep_alive_interval: self.keep_alive_interval,
                    server_timeout: self.server_timeout,
                    handshake_timeout: self.handshake_timeout,
                    connect_timeout: self.connect_timeout,
                    stop_timeout: self.stop_timeout,
                },
                http: reqwest::Client::new(),
                handlers: HandlerTable::new(),
                state: Mutex::new(HubConnectionState::Disconnected),
                session: Mutex::new(None),
                connection_id: Mutex::new(None),
                closed_callbacks: Mutex::new(Vec::new()),
            }),
        })
    }
}

#[derive(Debug)]
struct ConnectionOptions {
    url: Url,
    skip_negotiation: bool,
    access_token: Option<String>,
    keep_alive_interval: Duration,
    server_timeout: Duration,
    handshake_timeout: Duration,
    connect_timeout: Duration,
    stop_timeout: Duration,
}

struct Session {
    outgoing: UnboundedSender<WsMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    keep_alive: JoinHandle<()>,
}

struct Inner {
    options: ConnectionOptions,
    http: reqwest::Client,
    handlers: HandlerTable,
    state: Mutex<HubConnectionState>,
    session: Mutex<Option<Session>>,
    connection_id: Mutex<Option<String>>,
    closed_callbacks: Mutex<Vec<ClosedCallback>>,
}

enum Flow {
    Continue,
    Close(Option<HubError>),
}

/// Why a reader stopped.
struct SessionEnd {
    error: Option<HubError>,
    /// The peer or the transport already closed the socket; no close frame
    /// is sent back.
    socket_closed: bool,
}

impl SessionEnd {
    fn open(error: Option<HubError>) -> Self {
        Self {
            error,
            socket_closed: false,
        }
    }

    fn closed(error: Option<HubError>) -> Self {
        Self {
            error,
            socket_closed: true,
        }
    }
}

/// Puts a connection left in `Connecting` back to `Disconnected` when
/// `start` fails or its future is dropped before connecting finished.
struct ConnectingGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl ConnectingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock(&self.inner.state);
        if *state == HubConnectionState::Connecting {
            *state = HubConnectionState::Disconnected;
        }
    }
}

/// A cloneable handle to one hub connection.
#[derive(Clone)]
pub struct HubConnection {
    inner: Arc<Inner>,
}

impl HubConnection {
    pub fn builder(url: impl Into<String>) -> HubConnectionBuilder {
        HubConnectionBuilder::new(url)
    }

    pub fn url(&self) -> &Url {
        &self.inner.options.url
    }

    pub fn state(&self) -> HubConnectionState {
        *lock(&self.inner.state)
    }

    /// The id assigned during negotiation, while connected.
    pub fn connection_id(&self) -> Option<String> {
        lock(&self.inner.connection_id).clone()
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.inner.handlers
    }

    /// Registers a handler for a server invocation carrying one argument.
    pub fn on<T, F>(&self, target: &str, handler: F)
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.inner.handlers.on(target, handler);
    }

    pub fn on_raw<F>(&self, target: &str, handler: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.handlers.on_raw(target, handler);
    }

    pub fn remove(&self, target: &str) {
        self.inner.handlers.remove(target);
    }

    /// Registers a callback run whenever a session ends, with the error that
    /// ended it (if any).
    pub fn on_closed<F>(&self, callback: F)
    where
        F: Fn(Option<&HubError>) + Send + Sync + 'static,
    {
        lock(&self.inner.closed_callbacks).push(Arc::new(callback));
    }

    pub async fn start(&self) -> Result<(), HubError> {
        {
            let mut state = lock(&self.inner.state);
            if *state != HubConnectionState::Disconnected {
                return Err(HubError::InvalidState {
                    action: "start",
                    state: *state,
                });
            }
            *state = HubConnectionState::Connecting;
        }

        let guard = ConnectingGuard {
            inner: self.inner.as_ref(),
            armed: true,
        };
        info!("Starting hub connection to {}", self.inner.options.url);
        match self.connect().await {
            Ok(()) => {
                guard.disarm();
                Ok(())
            }
            Err(e) => {
                warn!("Hub connection failed to start: {e}");
                Err(e)
            }
        }
    }

    pub async fn stop(&self) -> Result<(), HubError> {
        let session = {
            let mut slot = lock(&self.inner.session);
            let mut state = lock(&self.inner.state);
            match *state {
                HubConnectionState::Disconnected | HubConnectionState::Disconnecting => {
                    return Ok(());
                }
                HubConnectionState::Connecting => {
                    return Err(HubError::InvalidState {
                        action: "stop",
                        state: *state,
                    });
                }
                HubConnectionState::Connected => {}
            }
            *state = HubConnectionState::Disconnecting;
            slot.take()
        };

        info!("Stopping hub connection");
        let Some(session) = session else {
            self.inner.finish_close(None);
            return Ok(());
        };

        session.keep_alive.abort();
        let _ = session.outgoing.send(WsMessage::Close(None));

        // the reader finishes the close once the server acknowledges it
        let stop_timeout = self.inner.options.stop_timeout;
        let mut reader = session.reader;
        if timeout(stop_timeout, &mut reader).await.is_err() {
            warn!("Hub did not acknowledge close within {stop_timeout:?}");
            reader.abort();
            session.writer.abort();
            self.inner.finish_close(None);
        }
        Ok(())
    }

    /// Fire-and-forget invocation of a hub method.
    pub fn send(&self, target: &str, arguments: Vec<Value>) -> Result<(), HubError> {
        let record = protocol::write_message(&HubMessage::Invocation {
            invocation_id: None,
            target: target.to_string(),
            arguments,
        })?;
        let slot = lock(&self.inner.session);
        let session = slot.as_ref().ok_or(HubError::NotConnected)?;
        session
            .outgoing
            .send(WsMessage::text(record))
            .map_err(|_| HubError::NotConnected)
    }

    /// Socket URL, access token and connection id for the next session.
    async fn resolve_endpoint(&self) -> Result<(Url, Option<String>, Option<String>), HubError> {
        let options = &self.inner.options;
        if options.skip_negotiation {
            return Ok((
                websocket_url(&options.url, None)?,
                options.access_token.clone(),
                None,
            ));
        }
        let negotiated = negotiate(
            &self.inner.http,
            &options.url,
            options.access_token.as_deref(),
        )
        .await?;
        Ok((
            websocket_url(&negotiated.url, negotiated.connection_token.as_deref())?,
            negotiated.access_token,
            negotiated.connection_id,
        ))
    }

    async fn connect(&self) -> Result<(), HubError> {
        let options = &self.inner.options;
        let connect_timeout = options.connect_timeout;
        let (ws_url, access_token, connection_id) =
            timeout(connect_timeout, self.resolve_endpoint())
                .await
                .map_err(|_| HubError::ConnectTimeout(connect_timeout))??;

        let mut request = ws_url.as_str().into_client_request()?;
        if let Some(token) = &access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| HubError::InvalidHeader(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        debug!("Opening websocket to {}{}", ws_url.origin().ascii_serialization(), ws_url.path());
        let (socket, _) = timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| HubError::ConnectTimeout(connect_timeout))??;
        let (mut sink, mut stream) = socket.split();

        sink.send(WsMessage::text(protocol::handshake_request()))
            .await?;
        let pending = timeout(options.handshake_timeout, read_handshake(&mut stream))
            .await
            .map_err(|_| HubError::HandshakeTimeout(options.handshake_timeout))??;

        let (outgoing, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(sink, rx));
        let keep_alive = tokio::spawn(keep_alive_loop(
            outgoing.clone(),
            options.keep_alive_interval,
        ));

        // store the session before the reader can observe a close
        let mut slot = lock(&self.inner.session);
        *lock(&self.inner.connection_id) = connection_id;
        *lock(&self.inner.state) = HubConnectionState::Connected;
        let reader = tokio::spawn(read_loop(self.inner.clone(), stream, pending));
        *slot = Some(Session {
            outgoing,
            reader,
            writer,
            keep_alive,
        });
        drop(slot);

        info!("Hub connection started");
        Ok(())
    }
}

impl std::fmt::Debug for HubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConnection")
            .field("url", &self.inner.options.url.as_str())
            .field("state", &self.state())
            .field("handlers", &self.inner.handlers)
            .finish()
    }
}

impl Inner {
    fn handle_message(&self, message: HubMessage) -> Flow {
        match message {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                if let Some(id) = invocation_id {
                    debug!("Invocation {id} of {target} expects a result; none will be sent");
                }
                match self.handlers.dispatch(&target, &arguments) {
                    Ok(count) => debug!("Dispatched {target} to {count} handler(s)"),
                    Err(HubError::NoHandler(_)) => {
                        warn!("No handler registered for {target}")
                    }
                    Err(e) => error!("Handler for {target} failed: {e}"),
                }
                Flow::Continue
            }
            HubMessage::Ping => Flow::Continue,
            HubMessage::Close {
                error,
                allow_reconnect,
            } => {
                debug!(allow_reconnect, "Server sent close message");
                Flow::Close(error.map(HubError::ServerClosed))
            }
            HubMessage::StreamItem { invocation_id, .. }
            | HubMessage::Completion { invocation_id, .. } => {
                debug!("Ignoring result for unknown invocation {invocation_id}");
                Flow::Continue
            }
            HubMessage::Other(kind) => {
                debug!("Ignoring message of type {kind}");
                Flow::Continue
            }
        }
    }

    /// Called by the reader when its session ends.
    fn connection_closed(&self, end: SessionEnd) {
        let session = lock(&self.session).take();
        if let Some(session) = session {
            session.keep_alive.abort();
            if !end.socket_closed {
                let _ = session.outgoing.send(WsMessage::Close(None));
            }
        }
        self.finish_close(end.error);
    }

    fn finish_close(&self, error: Option<HubError>) {
        *lock(&self.state) = HubConnectionState::Disconnected;
        *lock(&self.connection_id) = None;

        match &error {
            Some(e) => warn!("Hub connection closed: {e}"),
            None => info!("Hub connection closed"),
        }

        let callbacks = lock(&self.closed_callbacks).clone();
        for callback in callbacks {
            callback(error.as_ref());
        }
    }
}

async fn read_handshake(stream: &mut SplitStream<WsStream>) -> Result<Vec<HubMessage>, HubError> {
    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                let mut records = protocol::split_records(text.as_str())?.into_iter();
                let Some(first) = records.next() else {
                    continue;
                };
                protocol::parse_handshake_response(first)?;
                // anything after the handshake response is a regular message
                return records.map(protocol::parse_message).collect();
            }
            Some(Ok(WsMessage::Close(_))) | None => return Err(HubError::ClosedDuringHandshake),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn read_loop(inner: Arc<Inner>, mut stream: SplitStream<WsStream>, pending: Vec<HubMessage>) {
    let end = receive(&inner, &mut stream, pending).await;
    inner.connection_closed(end);
}

async fn receive(
    inner: &Inner,
    stream: &mut SplitStream<WsStream>,
    pending: Vec<HubMessage>,
) -> SessionEnd {
    for message in pending {
        if let Flow::Close(error) = inner.handle_message(message) {
            return SessionEnd::open(error);
        }
    }

    let server_timeout = inner.options.server_timeout;
    loop {
        let frame = match timeout(server_timeout, stream.next()).await {
            Err(_) => return SessionEnd::open(Some(HubError::ServerTimeout(server_timeout))),
            Ok(None) => return SessionEnd::closed(None),
            Ok(Some(Err(tungstenite::Error::ConnectionClosed))) => {
                return SessionEnd::closed(None);
            }
            Ok(Some(Err(e))) => return SessionEnd::closed(Some(e.into())),
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            WsMessage::Text(text) => {
                let messages = match protocol::parse_messages(text.as_str()) {
                    Ok(messages) => messages,
                    Err(e) => return SessionEnd::open(Some(e)),
                };
                for message in messages {
                    if let Flow::Close(error) = inner.handle_message(message) {
                        return SessionEnd::open(error);
                    }
                }
            }
            WsMessage::Close(frame) => {
                debug!(?frame, "Socket closed");
                return SessionEnd::closed(None);
            }
            WsMessage::Binary(_) => warn!("Ignoring binary frame on a text protocol connection"),
            _ => {}
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut outgoing: UnboundedReceiver<WsMessage>,
) {
    while let Some(msg) = outgoing.recv().await {
        let closing = matches!(msg, WsMessage::Close(_));
        if let Err(e) = sink.send(msg).await {
            warn!("Failed to send frame to hub: {e}");
            break;
        }
        if closing {
            break;
        }
    }
    debug!("Send loop closed");
}

async fn keep_alive_loop(outgoing: UnboundedSender<WsMessage>, period: Duration) {
    let ping = match protocol::write_message(&HubMessage::Ping) {
        Ok(ping) => ping,
        Err(e) => {
            error!("Failed to encode ping: {e}");
            return;
        }
    };
    // interval_at panics on a zero period
    let period = period.max(Duration::from_millis(10));
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        if outgoing.send(WsMessage::text(ping.clone())).is_err() {
            break;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
