//! Single relay connection
//!
//! One logical connection to one relay endpoint over a WebSocket. The
//! connection reports transport failures as return values, never as
//! panics or errors crossing this boundary: `connect` fails closed,
//! `send` answers whether the frame was handed to the socket, and
//! `close` is always safe to call again.
//!
//! Inbound text frames flow into an unbounded channel created at connect
//! time; the channel closes exactly once, when the connection closes
//! (locally or because the relay went away). There is no per-connection
//! retry; the caller decides whether to reconnect.

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// A connection to one relay endpoint. Cloning shares the underlying
/// transport; the pool that created it owns its lifecycle.
#[derive(Clone)]
pub struct RelayConnection {
    url: String,
    connect_timeout: Duration,
    open: Arc<AtomicBool>,
    sink: Arc<Mutex<Option<WsSink>>>,
    inbound: Arc<Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
    reader: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RelayConnection {
    /// Create a connection for the given endpoint (does not connect).
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            open: Arc::new(AtomicBool::new(false)),
            sink: Arc::new(Mutex::new(None)),
            inbound: Arc::new(Mutex::new(None)),
            reader: Arc::new(Mutex::new(None)),
        }
    }

    /// Relay endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the connection is currently open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Open the transport. Returns false on any failure or timeout.
    pub async fn connect(&self) -> bool {
        if self.is_open() {
            return true;
        }

        let stream = match timeout(self.connect_timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                warn!("failed to connect to {}: {}", self.url, e);
                return false;
            }
            Err(_) => {
                warn!(
                    "connect to {} timed out after {:?}",
                    self.url, self.connect_timeout
                );
                return false;
            }
        };

        let (sink, mut read) = stream.split();
        *self.sink.lock().await = Some(sink);

        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound.lock().await = Some(rx);

        let url = self.url.clone();
        let open = Arc::clone(&self.open);
        let pong_sink = Arc::clone(&self.sink);
        let reader = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        let mut sink = pong_sink.lock().await;
                        if let Some(sink) = sink.as_mut() {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("relay {} closed the connection", url);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("websocket error from {}: {}", url, e);
                        break;
                    }
                }
            }
            open.store(false, Ordering::SeqCst);
        });
        *self.reader.lock().await = Some(reader);

        self.open.store(true, Ordering::SeqCst);
        info!("connected to relay {}", self.url);
        true
    }

    /// Take the inbound frame channel. Yields `Some` once per connect.
    pub async fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.inbound.lock().await.take()
    }

    /// Send a text frame. Returns false when the connection is not open or
    /// the socket refuses the frame.
    pub async fn send(&self, message: &str) -> bool {
        if !self.is_open() {
            return false;
        }

        let mut sink = self.sink.lock().await;
        match sink.as_mut() {
            Some(sink) => match sink.send(Message::Text(message.to_string())).await {
                Ok(()) => true,
                Err(e) => {
                    debug!("send to {} failed: {}", self.url, e);
                    false
                }
            },
            None => false,
        }
    }

    /// Close the connection. Idempotent.
    pub async fn close(&self) {
        let was_open = self.open.swap(false, Ordering::SeqCst);

        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }

        if was_open {
            info!("closed connection to {}", self.url);
        }
    }
}
