//! One logical WebSocket connection to the poker server.
//!
//! A session owns two background pumps: a writer draining an outbound queue
//! into the socket, and a reader decoding frames into an inbound queue.
//! [`Session::send`] is fire-and-forget and [`Session::receive`] always
//! takes a bound. Dropping a session aborts both pumps, so the transport is
//! released even if the owning task is cancelled mid-wait.

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, info, warn};
use std::{
    fmt, io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    net::TcpStream,
    sync::{Mutex as AsyncMutex, mpsc},
    task::JoinHandle,
    time,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};

use super::{
    codec,
    errors::{NetError, Result},
    messages::Envelope,
};

/// How long [`Session::close`] waits for the close frame to flush.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Inbound = Result<Envelope>;

pub struct Session {
    endpoint: String,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: AsyncMutex<mpsc::UnboundedReceiver<Inbound>>,
    /// Cleared by either pump when the transport fails or the peer closes.
    connected: Arc<AtomicBool>,
    /// Set once by [`Session::close`].
    closed: AtomicBool,
    reader: JoinHandle<()>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Connect to `endpoint`, bounding the handshake by `connect_timeout`.
    ///
    /// # Errors
    ///
    /// - [`NetError::ConnectionRefused`] if nothing listens at the endpoint
    /// - [`NetError::ConnectionTimeout`] if the handshake does not finish in time
    /// - [`NetError::Transport`] for anything else (bad URL, failed upgrade)
    pub async fn open(endpoint: &str, connect_timeout: Duration) -> Result<Self> {
        debug!("Connecting to {endpoint}");
        let stream = match time::timeout(connect_timeout, connect_async(endpoint)).await {
            Err(_) => {
                return Err(NetError::ConnectionTimeout {
                    endpoint: endpoint.to_string(),
                    timeout: connect_timeout,
                });
            }
            Ok(Err(tungstenite::Error::Io(error)))
                if error.kind() == io::ErrorKind::ConnectionRefused =>
            {
                return Err(NetError::ConnectionRefused {
                    endpoint: endpoint.to_string(),
                });
            }
            Ok(Err(error)) => return Err(error.into()),
            Ok(Ok((stream, _response))) => stream,
        };
        info!("Connected to {endpoint}");
        Ok(Self::from_stream(endpoint, stream))
    }

    fn from_stream(endpoint: &str, stream: WsStream) -> Self {
        let (sink, stream) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            stream,
            inbound_tx,
            connected.clone(),
            endpoint.to_string(),
        ));
        let writer = tokio::spawn(write_loop(sink, outbound_rx, connected.clone()));

        Self {
            endpoint: endpoint.to_string(),
            outbound: outbound_tx,
            inbound: AsyncMutex::new(inbound_rx),
            connected,
            closed: AtomicBool::new(false),
            reader,
            writer: Mutex::new(Some(writer)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the session can still send. Once false, never true again.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.connected.load(Ordering::Acquire)
    }

    /// Whether [`Session::close`] has been called on this side.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue an envelope for sending. No acknowledgment is awaited.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NotConnected`] if the session is closed or lost.
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        if !self.is_connected() {
            return Err(NetError::NotConnected);
        }
        let text = codec::encode(envelope)?;
        debug!("-> {} {}", self.endpoint, envelope);
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| NetError::NotConnected)
    }

    /// Wait up to `wait` for the next envelope.
    ///
    /// A timeout leaves the session connected and usable. A malformed frame
    /// is reported as [`NetError::MalformedMessage`] and the session stays
    /// usable as well; the next call returns the following frame.
    ///
    /// # Errors
    ///
    /// - [`NetError::ReceiveTimeout`] if nothing arrived in time
    /// - [`NetError::MalformedMessage`] for an undecodable frame
    /// - [`NetError::ConnectionClosed`] once the peer closed or [`Session::close`] ran
    /// - [`NetError::Transport`] if the socket failed
    pub async fn receive(&self, wait: Duration) -> Result<Envelope> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetError::ConnectionClosed);
        }
        let next = time::timeout(wait, async { self.inbound.lock().await.recv().await }).await;
        match next {
            Err(_) => Err(NetError::ReceiveTimeout(wait)),
            Ok(Some(Ok(envelope))) => {
                debug!("<- {} {}", self.endpoint, envelope);
                Ok(envelope)
            }
            Ok(Some(Err(error))) => {
                if error.is_connection_loss() {
                    self.connected.store(false, Ordering::Release);
                }
                Err(error)
            }
            Ok(None) => {
                self.connected.store(false, Ordering::Release);
                Err(NetError::ConnectionClosed)
            }
        }
    }

    /// Close the connection. Safe to call any number of times; only the
    /// first call does anything.
    ///
    /// Any `receive` in flight on another task returns
    /// [`NetError::ConnectionClosed`] promptly.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.connected.store(false, Ordering::Release);
        self.reader.abort();

        let _ = self.outbound.send(Message::Close(None));
        let writer = match self.writer.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut writer) = writer
            && time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err()
        {
            warn!("Close frame to {} did not flush in time", self.endpoint);
            writer.abort();
        }
        info!("Closed connection to {}", self.endpoint);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
        let writer = match self.writer.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(writer) = writer {
            writer.abort();
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    inbound: mpsc::UnboundedSender<Inbound>,
    connected: Arc<AtomicBool>,
    endpoint: String,
) {
    while let Some(frame) = stream.next().await {
        let item = match frame {
            Ok(Message::Text(text)) => codec::decode(text.as_bytes()),
            Ok(Message::Binary(bytes)) => codec::decode(&bytes),
            Ok(Message::Close(frame)) => {
                debug!("{endpoint} sent close: {frame:?}");
                break;
            }
            Ok(_) => continue,
            Err(error) => {
                let _ = inbound.send(Err(error.into()));
                break;
            }
        };
        if inbound.send(item).is_err() {
            break;
        }
    }
    connected.store(false, Ordering::Release);
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    connected: Arc<AtomicBool>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(error) = sink.send(message).await {
            warn!("WebSocket send failed: {error}");
            connected.store(false, Ordering::Release);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}
