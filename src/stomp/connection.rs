//! Connection Layer: one STOMP session over TCP or TLS.
//! A background task owns the framed socket. It routes MESSAGE frames to
//! subscriptions, resolves receipts and keeps heart-beats flowing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use super::codec::StompCodec;
use super::errors::StompError;
use super::frame::*;
use super::subscription::{Message, SubscribeOptions, Subscription};
use super::tls;

const OUTBOUND_CAPACITY: usize = 256;

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

type StompFramed = Framed<Box<dyn AsyncStream>, StompCodec>;

// ========================================
// OPTIONS
// ========================================

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub use_tls: bool,
    /// Covers TCP connect, TLS handshake and the CONNECTED answer.
    pub connect_timeout: Duration,
    /// Desired `(outgoing, incoming)` heart-beat in milliseconds.
    pub heartbeat: (u64, u64),
    pub receipt_timeout: Duration,
    pub virtual_host: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            login: None,
            passcode: None,
            use_tls: false,
            connect_timeout: Duration::from_secs(10),
            heartbeat: (10_000, 10_000),
            receipt_timeout: Duration::from_secs(5),
            virtual_host: None,
        }
    }
}

// ========================================
// SHARED ROUTING STATE
// ========================================

struct Shared {
    subscriptions: DashMap<String, mpsc::UnboundedSender<Message>>,
    receipts: DashMap<String, oneshot::Sender<Result<(), StompError>>>,
    next_id: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            receipts: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Drops every subscription sender (ending the streams) and fails pending receipts.
    fn close(&self) {
        self.subscriptions.clear();
        let pending: Vec<String> = self.receipts.iter().map(|e| e.key().clone()).collect();
        for id in pending {
            if let Some((_, waiter)) = self.receipts.remove(&id) {
                let _ = waiter.send(Err(StompError::Closed));
            }
        }
    }
}

// ========================================
// CONNECTION
// ========================================

pub struct StompConnection {
    peer: String,
    server: Option<String>,
    heartbeat: (u64, u64),
    receipt_timeout: Duration,
    outbound_tx: mpsc::Sender<StompItem>,
    shared: Arc<Shared>,
    closed_rx: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl StompConnection {
    pub async fn connect(host: &str, port: u16, options: &ConnectOptions) -> Result<Self, StompError> {
        let peer = format!("{}:{}", host, port);

        let (framed, connected) = timeout(options.connect_timeout, handshake(host, port, options))
            .await
            .map_err(|_| StompError::Timeout(options.connect_timeout, "CONNECTED"))??;

        let server_heartbeat = connected
            .get_header(HDR_HEART_BEAT)
            .map(parse_heartbeat)
            .unwrap_or((0, 0));
        let heartbeat = negotiate_heartbeat(options.heartbeat, server_heartbeat);
        let server = connected.get_header("server").map(str::to_string);

        info!(
            "Connected to broker {} (server: {}, heart-beat: {:?})",
            peer,
            server.as_deref().unwrap_or("unknown"),
            heartbeat
        );

        let shared = Arc::new(Shared::new());
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (closed_tx, closed_rx) = watch::channel(false);

        let task = tokio::spawn(run_connection(
            framed,
            outbound_rx,
            shared.clone(),
            closed_tx,
            heartbeat,
            peer.clone(),
        ));

        Ok(Self {
            peer,
            server,
            heartbeat,
            receipt_timeout: options.receipt_timeout,
            outbound_tx,
            shared,
            closed_rx,
            task,
        })
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn heartbeat(&self) -> (u64, u64) {
        self.heartbeat
    }

    pub fn is_connected(&self) -> bool {
        !*self.closed_rx.borrow()
    }

    /// Resolves once the background task has given up the socket.
    pub async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// SEND with a receipt; an ERROR answer (e.g. permission denied) surfaces here.
    pub async fn send(
        &self,
        destination: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<(), StompError> {
        let frame = Frame::new(Command::Send)
            .header(HDR_DESTINATION, destination)
            .headers(headers.iter().cloned())
            .body(body);
        self.request(frame).await
    }

    pub async fn subscribe(
        &self,
        destination: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription, StompError> {
        let id = self.shared.next_id("sub");
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscriptions.insert(id.clone(), tx);

        let frame = Frame::new(Command::Subscribe)
            .header(HDR_ID, id.clone())
            .header(HDR_DESTINATION, destination)
            .header(HDR_ACK, options.ack.as_str())
            .headers(options.headers);

        if let Err(err) = self.request(frame).await {
            self.shared.subscriptions.remove(&id);
            return Err(err);
        }

        debug!("Subscribed '{}' to {}", id, destination);
        Ok(Subscription::new(id, destination, rx))
    }

    /// ACK for `client-individual` subscriptions. No receipt is requested.
    pub async fn ack(&self, message: &Message) -> Result<(), StompError> {
        let ack_id = message
            .ack_id
            .as_deref()
            .ok_or_else(|| StompError::Invalid("message carries no ack header".into()))?;
        self.push(Frame::new(Command::Ack).header(HDR_ID, ack_id)).await
    }

    pub async fn disconnect(&self) -> Result<(), StompError> {
        if !self.is_connected() {
            return Ok(());
        }
        match self.request(Frame::new(Command::Disconnect)).await {
            Ok(()) | Err(StompError::Closed) => {
                debug!("Disconnected from {}", self.peer);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn push(&self, frame: Frame) -> Result<(), StompError> {
        self.outbound_tx
            .send(StompItem::Frame(frame))
            .await
            .map_err(|_| StompError::Closed)
    }

    async fn request(&self, frame: Frame) -> Result<(), StompError> {
        let receipt = self.shared.next_id("rcpt");
        let (tx, rx) = oneshot::channel();
        self.shared.receipts.insert(receipt.clone(), tx);

        if let Err(err) = self.push(frame.header(HDR_RECEIPT, receipt.clone())).await {
            self.shared.receipts.remove(&receipt);
            return Err(err);
        }

        match timeout(self.receipt_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StompError::Closed),
            Err(_) => {
                self.shared.receipts.remove(&receipt);
                Err(StompError::Timeout(self.receipt_timeout, "RECEIPT"))
            }
        }
    }
}

impl Drop for StompConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ========================================
// HANDSHAKE
// ========================================

async fn open_stream(host: &str, port: u16, use_tls: bool) -> Result<Box<dyn AsyncStream>, StompError> {
    let tcp = TcpStream::connect((host, port)).await?;
    tcp.set_nodelay(true)?;
    if use_tls {
        Ok(Box::new(tls::wrap(tcp, host).await?))
    } else {
        Ok(Box::new(tcp))
    }
}

async fn handshake(
    host: &str,
    port: u16,
    options: &ConnectOptions,
) -> Result<(StompFramed, Frame), StompError> {
    let stream = open_stream(host, port, options.use_tls).await?;
    let mut framed = Framed::new(stream, StompCodec::new());

    let mut connect = Frame::new(Command::Connect)
        .header(HDR_ACCEPT_VERSION, STOMP_VERSION)
        .header(HDR_HOST, options.virtual_host.as_deref().unwrap_or(host))
        .header(
            HDR_HEART_BEAT,
            format!("{},{}", options.heartbeat.0, options.heartbeat.1),
        );
    if let Some(login) = &options.login {
        connect = connect.header(HDR_LOGIN, login.as_str());
    }
    if let Some(passcode) = &options.passcode {
        connect = connect.header(HDR_PASSCODE, passcode.as_str());
    }

    framed.send(StompItem::Frame(connect)).await?;

    loop {
        match framed.next().await {
            Some(Ok(StompItem::Heartbeat)) => continue,
            Some(Ok(StompItem::Frame(frame))) => {
                return match frame.command {
                    Command::Connected => Ok((framed, frame)),
                    Command::Error => Err(broker_error(&frame)),
                    other => Err(StompError::Invalid(format!(
                        "expected CONNECTED, got {}",
                        other
                    ))),
                };
            }
            Some(Err(err)) => return Err(err),
            None => return Err(StompError::Closed),
        }
    }
}

fn broker_error(frame: &Frame) -> StompError {
    StompError::Broker {
        message: frame
            .get_header(HDR_MESSAGE)
            .unwrap_or("ERROR frame without message")
            .to_string(),
        details: frame.body_text(),
    }
}

// ========================================
// BACKGROUND I/O
// ========================================

/// Ends every subscription and flips the closed flag however the task exits,
/// including a panic or an abort.
struct Teardown {
    shared: Arc<Shared>,
    closed_tx: watch::Sender<bool>,
    peer: String,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.shared.close();
        let _ = self.closed_tx.send(true);
        info!("Disconnected from broker {}", self.peer);
    }
}

async fn run_connection(
    framed: StompFramed,
    mut outbound_rx: mpsc::Receiver<StompItem>,
    shared: Arc<Shared>,
    closed_tx: watch::Sender<bool>,
    heartbeat: (u64, u64),
    peer: String,
) {
    let _teardown = Teardown {
        shared: shared.clone(),
        closed_tx,
        peer: peer.clone(),
    };
    let (mut sink, mut stream) = framed.split::<StompItem>();
    let (outgoing, incoming) = heartbeat;

    let mut beat = tokio::time::interval(Duration::from_millis(outgoing.max(1)));
    beat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    beat.tick().await;

    // Twice the negotiated interval before the link counts as dead.
    let read_grace = (incoming > 0).then(|| Duration::from_millis(incoming * 2));
    let mut last_inbound = Instant::now();

    loop {
        let read_deadline = read_grace.map(|grace| last_inbound + grace);

        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(item)) => {
                        last_inbound = Instant::now();
                        dispatch(item, &shared, &peer);
                    }
                    Some(Err(err)) => {
                        warn!("Broker {}: {}", peer, err);
                        break;
                    }
                    None => {
                        debug!("Broker {} closed the connection", peer);
                        break;
                    }
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(item) => {
                        if let Err(err) = sink.send(item).await {
                            warn!("Write to {} failed: {}", peer, err);
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = beat.tick(), if outgoing > 0 => {
                if sink.send(StompItem::Heartbeat).await.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep_until(read_deadline.unwrap_or_else(Instant::now)), if read_deadline.is_some() => {
                warn!("Broker {} missed heart-beats for {:?}, dropping connection", peer, read_grace);
                break;
            }
        }
    }
}

fn dispatch(item: StompItem, shared: &Shared, peer: &str) {
    let frame = match item {
        StompItem::Heartbeat => return,
        StompItem::Frame(frame) => frame,
    };

    match frame.command {
        Command::Message => {
            let sub_id = frame.get_header(HDR_SUBSCRIPTION).unwrap_or_default().to_string();
            match shared.subscriptions.get(&sub_id) {
                Some(tx) => {
                    if tx.send(Message::from_frame(frame)).is_err() {
                        debug!("Subscription '{}' receiver dropped", sub_id);
                    }
                }
                None => debug!("Dropping MESSAGE for unknown subscription '{}'", sub_id),
            }
        }
        Command::Receipt => {
            if let Some(id) = frame.get_header(HDR_RECEIPT_ID) {
                if let Some((_, waiter)) = shared.receipts.remove(id) {
                    let _ = waiter.send(Ok(()));
                }
            }
        }
        Command::Error => {
            let err = broker_error(&frame);
            let waiter = frame
                .get_header(HDR_RECEIPT_ID)
                .and_then(|id| shared.receipts.remove(id));
            match waiter {
                Some((_, waiter)) => {
                    let _ = waiter.send(Err(err));
                }
                None => {
                    error!(headers = ?frame.headers, "ERROR frame from {}: {}", peer, err);
                    error!("  Possible causes: permission denied on the destination, statistics plugin not responding, invalid destination format");
                }
            }
        }
        other => debug!("Ignoring {} frame from {}", other, peer),
    }
}
