use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::metrics;
use crate::payload::Payload;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Connection lifecycle. `Connecting` covers the window between the dial and
/// the transport confirming establishment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
}

/// Consumer hooks invoked by the channel. All default to no-ops so callers
/// register only what they care about.
pub trait ChannelEvents: Send + Sync {
    fn on_message(&self, _payload: Payload) {}
    fn on_open(&self) {}
    fn on_error(&self, _error: &ChannelError) {}
    fn on_close(&self) {}
}

/// Events sink that ignores everything.
#[derive(Default)]
pub struct NoopEvents;

impl ChannelEvents for NoopEvents {}

struct LiveConnection {
    address: String,
    writer: WsWriter,
    reader_task: JoinHandle<()>,
    epoch: u64,
}

struct Shared {
    events: Arc<dyn ChannelEvents>,
    state_tx: watch::Sender<ChannelState>,
    error_tx: watch::Sender<Option<ChannelError>>,
    conn: Mutex<Option<LiveConnection>>,
    epoch: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        self.state_tx.send_replace(state);
    }

    /// Settle observable state after a reader loop ends. A reader whose epoch
    /// has been superseded must not touch anything: a newer connection owns
    /// the observables.
    async fn settle_after_close(&self, epoch: u64, failure: Option<ChannelError>) {
        let mut conn = self.conn.lock().await;
        let current = conn
            .as_ref()
            .map(|live| live.epoch == epoch)
            .unwrap_or(false);
        if !current {
            return;
        }
        *conn = None;
        drop(conn);

        if let Some(error) = failure {
            warn!(target: "score-channel", %error, "connection lost");
            metrics::record_transport_error();
            self.error_tx.send_replace(Some(error.clone()));
            self.events.on_error(&error);
        } else {
            debug!(target: "score-channel", "connection closed by remote");
        }
        self.set_state(ChannelState::Idle);
        metrics::record_closed();
        self.events.on_close();
    }
}

/// Duplex channel to the scoring service. Owns at most one live connection;
/// a new `connect` displaces the previous one. Dropping the channel aborts
/// the reader task, so the connection never outlives its owner.
pub struct ScoreChannel {
    cfg: ChannelConfig,
    shared: Arc<Shared>,
}

impl ScoreChannel {
    pub fn new(cfg: ChannelConfig, events: Arc<dyn ChannelEvents>) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Idle);
        let (error_tx, _) = watch::channel(None::<ChannelError>);
        Self {
            cfg,
            shared: Arc::new(Shared {
                events,
                state_tx,
                error_tx,
                conn: Mutex::new(None),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn with_defaults(events: Arc<dyn ChannelEvents>) -> Self {
        Self::new(ChannelConfig::default(), events)
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Observable over lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state_tx.subscribe()
    }

    pub fn last_error(&self) -> Option<ChannelError> {
        self.shared.error_tx.borrow().clone()
    }

    /// Observable over the last transport error.
    pub fn watch_errors(&self) -> watch::Receiver<Option<ChannelError>> {
        self.shared.error_tx.subscribe()
    }

    /// Address of the live connection, if any.
    pub async fn address(&self) -> Option<String> {
        self.shared
            .conn
            .lock()
            .await
            .as_ref()
            .map(|live| live.address.clone())
    }

    /// Establish a connection to `address`, displacing any live one first.
    ///
    /// Failures (bad address, refused dial, timeout) populate the last-error
    /// observable and invoke `on_error`; they are not returned and the state
    /// settles back to `Idle`. There is no retry policy at this layer.
    pub async fn connect(&self, address: impl Into<String>) {
        let address = address.into();
        let mut conn = self.shared.conn.lock().await;
        if let Some(live) = conn.take() {
            debug!(target: "score-channel", address = %live.address, "displacing live connection");
            Self::teardown(live).await;
            metrics::record_closed();
            self.shared.events.on_close();
        }
        self.shared.set_state(ChannelState::Connecting);

        let url = match Url::parse(&address) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => url,
            Ok(url) => {
                self.fail(ChannelError::InvalidAddress(format!(
                    "scheme must be ws or wss, got {}",
                    url.scheme()
                )));
                return;
            }
            Err(error) => {
                self.fail(ChannelError::InvalidAddress(error.to_string()));
                return;
            }
        };

        info!(target: "score-channel", address = %address, "connecting");
        let stream = match timeout(self.cfg.connect_timeout(), connect_async(url.as_str())).await {
            Err(_) => {
                self.fail(ChannelError::ConnectTimeout);
                return;
            }
            Ok(Err(error)) => {
                self.fail(ChannelError::Transport(error.to_string()));
                return;
            }
            Ok(Ok((stream, _response))) => stream,
        };

        let (writer, reader) = stream.split();
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let reader_task = tokio::spawn(Self::read_loop(Arc::clone(&self.shared), reader, epoch));
        *conn = Some(LiveConnection {
            address: address.clone(),
            writer,
            reader_task,
            epoch,
        });
        // Publish `Connected` before releasing the lock: the reader settles
        // under the same lock, so an instant remote close cannot reorder the
        // transitions.
        self.shared.set_state(ChannelState::Connected);
        drop(conn);
        metrics::record_connected();
        info!(target: "score-channel", address = %address, "connection established");
        self.shared.events.on_open();
    }

    /// Close the live connection. No-op when idle.
    pub async fn disconnect(&self) {
        let mut conn = self.shared.conn.lock().await;
        let Some(live) = conn.take() else {
            return;
        };
        debug!(target: "score-channel", address = %live.address, "disconnecting");
        Self::teardown(live).await;
        drop(conn);

        self.shared.set_state(ChannelState::Idle);
        metrics::record_closed();
        self.shared.events.on_close();
    }

    /// Queue one text frame on the live connection.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        let mut conn = self.shared.conn.lock().await;
        let live = conn.as_mut().ok_or(ChannelError::NotConnected)?;
        live.writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| ChannelError::Transport(error.to_string()))
    }

    fn fail(&self, error: ChannelError) {
        warn!(target: "score-channel", %error, "connection attempt failed");
        metrics::record_transport_error();
        self.shared.error_tx.send_replace(Some(error.clone()));
        self.shared.events.on_error(&error);
        self.shared.set_state(ChannelState::Idle);
    }

    async fn teardown(mut live: LiveConnection) {
        let _ = live.writer.send(Message::Close(None)).await;
        live.reader_task.abort();
    }

    async fn read_loop(shared: Arc<Shared>, mut reader: WsReader, epoch: u64) {
        let mut failure = None;
        while let Some(frame) = reader.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    metrics::record_message();
                    shared.events.on_message(Payload::decode(&text));
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {}
                Err(error) => {
                    failure = Some(ChannelError::Transport(error.to_string()));
                    break;
                }
            }
        }
        shared.settle_after_close(epoch, failure).await;
    }
}

impl Drop for ScoreChannel {
    fn drop(&mut self) {
        if let Ok(mut conn) = self.shared.conn.try_lock() {
            if let Some(live) = conn.take() {
                live.reader_task.abort();
            }
        }
        self.shared.state_tx.send_replace(ChannelState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::sleep;
    use tokio_tungstenite::accept_async;

    #[derive(Default)]
    struct Recorder {
        messages: StdMutex<Vec<Payload>>,
        opens: AtomicUsize,
        closes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl Recorder {
        fn messages(&self) -> Vec<Payload> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl ChannelEvents for Recorder {
        fn on_message(&self, payload: Payload) {
            self.messages.lock().unwrap().push(payload);
        }

        fn on_open(&self) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _error: &ChannelError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestServer {
        addr: String,
        open: Arc<AtomicUsize>,
        accepted: Arc<AtomicUsize>,
    }

    impl TestServer {
        /// Accepts connections, sends the scripted messages on each, then
        /// either closes or keeps reading until the peer goes away.
        async fn start(messages: Vec<String>, close_after: bool) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = format!("ws://{}", listener.local_addr().unwrap());
            let open = Arc::new(AtomicUsize::new(0));
            let accepted = Arc::new(AtomicUsize::new(0));

            let open_outer = Arc::clone(&open);
            let accepted_outer = Arc::clone(&accepted);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    accepted_outer.fetch_add(1, Ordering::SeqCst);
                    open_outer.fetch_add(1, Ordering::SeqCst);
                    let open = Arc::clone(&open_outer);
                    let messages = messages.clone();
                    tokio::spawn(async move {
                        if let Ok(mut ws) = accept_async(stream).await {
                            for message in messages {
                                let _ = ws.send(Message::Text(message)).await;
                            }
                            if close_after {
                                let _ = ws.close(None).await;
                            } else {
                                while let Some(frame) = ws.next().await {
                                    match frame {
                                        Ok(Message::Close(_)) | Err(_) => break,
                                        _ => {}
                                    }
                                }
                            }
                        }
                        open.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });

            Self {
                addr,
                open,
                accepted,
            }
        }

        fn open_connections(&self) -> usize {
            self.open.load(Ordering::SeqCst)
        }
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !cond() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn forwards_decoded_and_raw_payloads() {
        let server = TestServer::start(
            vec![r#"{"credibility": 73}"#.to_string(), "plain text".to_string()],
            false,
        )
        .await;
        let recorder = Arc::new(Recorder::default());
        let channel = ScoreChannel::with_defaults(recorder.clone());

        channel.connect(server.addr.clone()).await;
        assert!(channel.is_connected());

        wait_for(|| recorder.messages().len() == 2).await;
        assert_eq!(
            recorder.messages(),
            vec![
                Payload::Json(json!({ "credibility": 73 })),
                Payload::Text("plain text".to_string()),
            ]
        );
        assert_eq!(recorder.opens.load(Ordering::SeqCst), 1);
        assert!(channel.last_error().is_none());
    }

    #[tokio::test]
    async fn remote_close_settles_to_idle() {
        let server = TestServer::start(vec!["bye".to_string()], true).await;
        let recorder = Arc::new(Recorder::default());
        let channel = ScoreChannel::with_defaults(recorder.clone());

        channel.connect(server.addr.clone()).await;
        wait_for(|| !channel.is_connected()).await;

        assert_eq!(channel.state(), ChannelState::Idle);
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert!(channel.last_error().is_none());
        assert!(channel.address().await.is_none());
    }

    #[tokio::test]
    async fn second_connect_displaces_first() {
        let first = TestServer::start(vec![], false).await;
        let second = TestServer::start(vec![], false).await;
        let channel = ScoreChannel::with_defaults(Arc::new(NoopEvents));

        channel.connect(first.addr.clone()).await;
        wait_for(|| first.open_connections() == 1).await;

        channel.connect(second.addr.clone()).await;
        wait_for(|| first.open_connections() == 0).await;
        wait_for(|| second.open_connections() == 1).await;

        assert!(channel.is_connected());
        assert_eq!(channel.address().await, Some(second.addr.clone()));
        assert_eq!(first.accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let server = TestServer::start(vec![], false).await;
        let recorder = Arc::new(Recorder::default());
        let channel = ScoreChannel::with_defaults(recorder.clone());

        channel.connect(server.addr.clone()).await;
        channel.disconnect().await;
        let closes_after_first = recorder.closes.load(Ordering::SeqCst);
        let state_after_first = channel.state();

        channel.disconnect().await;
        assert_eq!(recorder.closes.load(Ordering::SeqCst), closes_after_first);
        assert_eq!(channel.state(), state_after_first);
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(channel.address().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_without_connection_is_a_noop() {
        let recorder = Arc::new(Recorder::default());
        let channel = ScoreChannel::with_defaults(recorder.clone());

        channel.disconnect().await;
        assert_eq!(channel.state(), ChannelState::Idle);
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_non_websocket_scheme() {
        let recorder = Arc::new(Recorder::default());
        let channel = ScoreChannel::with_defaults(recorder.clone());

        channel.connect("http://127.0.0.1:9").await;
        assert_eq!(channel.state(), ChannelState::Idle);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
        assert!(matches!(
            channel.last_error(),
            Some(ChannelError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn refused_dial_populates_last_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let recorder = Arc::new(Recorder::default());
        let channel = ScoreChannel::with_defaults(recorder.clone());
        channel.connect(addr).await;

        assert_eq!(channel.state(), ChannelState::Idle);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
        assert!(matches!(
            channel.last_error(),
            Some(ChannelError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn connecting_state_is_observable() {
        // Server that delays the handshake so `Connecting` has a window.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            sleep(Duration::from_millis(300)).await;
            if let Ok((stream, _)) = listener.accept().await {
                if let Ok(mut ws) = accept_async(stream).await {
                    while let Some(frame) = ws.next().await {
                        match frame {
                            Ok(Message::Close(_)) | Err(_) => break,
                            _ => {}
                        }
                    }
                }
            }
        });

        let channel = Arc::new(ScoreChannel::with_defaults(Arc::new(NoopEvents)));
        let connecting = Arc::clone(&channel);
        let task = tokio::spawn(async move { connecting.connect(addr).await });

        wait_for(|| channel.state() == ChannelState::Connecting).await;
        task.await.unwrap();
        assert_eq!(channel.state(), ChannelState::Connected);
    }

    #[tokio::test]
    async fn watch_receivers_see_failures() {
        let channel = ScoreChannel::with_defaults(Arc::new(NoopEvents));
        let mut errors_rx = channel.watch_errors();
        assert!(errors_rx.borrow().is_none());

        channel.connect("http://127.0.0.1:9").await;
        errors_rx.changed().await.unwrap();
        assert!(matches!(
            *errors_rx.borrow(),
            Some(ChannelError::InvalidAddress(_))
        ));
        assert_eq!(*channel.watch_state().borrow(), ChannelState::Idle);
    }

    #[tokio::test]
    async fn send_text_requires_connection() {
        let channel = ScoreChannel::with_defaults(Arc::new(NoopEvents));
        assert_eq!(
            channel.send_text("hello").await,
            Err(ChannelError::NotConnected)
        );
    }

    #[tokio::test]
    async fn drop_closes_the_connection() {
        let server = TestServer::start(vec![], false).await;
        {
            let channel = ScoreChannel::with_defaults(Arc::new(NoopEvents));
            channel.connect(server.addr.clone()).await;
            wait_for(|| server.open_connections() == 1).await;
        }
        wait_for(|| server.open_connections() == 0).await;
    }
}
