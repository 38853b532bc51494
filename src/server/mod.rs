//! STOMP-over-WebSocket server built on axum.
//!
//! Each HTTP request on the configured path is upgraded to a WebSocket
//! (sub-protocols `v12.stomp`, `v11.stomp`, `v10.stomp`) and served by one
//! [`StompConnection`]. The socket is split: the connection task reads
//! inbound text while a writer task drains the connection's [`PushQueues`]
//! into the sink. Once the connection ends the writer flushes whatever is
//! still queued and sends a close frame carrying the close reason.

mod error;

use std::{
    future::ready,
    io,
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::Arc,
};

use axum::{
    Router,
    extract::{
        ConnectInfo,
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
pub use error::ServerError;
use futures::{FutureExt, SinkExt, StreamExt, stream::SplitSink};
use log::{error, info};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::{EngineConfig, ServerConfig},
    connection::{CloseReason, CloseSignal, StompConnection},
    frame::Outbound,
    handler::EventDispatcher,
    metrics::{self, Direction},
    panic::format_panic,
    push::PushQueues,
    registry::{ChannelRegistry, SessionId},
    session::StompSession,
};

/// WebSocket sub-protocols accepted during the upgrade.
pub const SUBPROTOCOLS: [&str; 3] = ["v12.stomp", "v11.stomp", "v10.stomp"];

#[derive(Clone)]
struct ServerState {
    registry: Arc<ChannelRegistry>,
    dispatcher: Arc<dyn EventDispatcher>,
    engine: EngineConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Accepts WebSocket clients and runs one STOMP session per socket.
pub struct StompServer {
    config: ServerConfig,
    state: ServerState,
}

impl StompServer {
    /// Create a server with a fresh registry and default configuration.
    #[must_use]
    pub fn new(dispatcher: Arc<dyn EventDispatcher>) -> Self {
        let config = ServerConfig::default();
        Self {
            state: ServerState {
                registry: Arc::new(ChannelRegistry::new()),
                dispatcher,
                engine: config.engine,
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            },
            config,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.state.engine = config.engine;
        self.config = config;
        self
    }

    /// Share an existing registry, e.g. one a dispatcher also publishes to.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ChannelRegistry>) -> Self {
        self.state.registry = registry;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ChannelRegistry> { &self.state.registry }

    #[must_use]
    pub fn config(&self) -> &ServerConfig { &self.config }

    /// Token that stops the server and every open connection when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken { self.state.shutdown.clone() }

    /// Bind the configured address and serve until shut down.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound and
    /// [`ServerError::Io`] if serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr = self.config.bind;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve_with_listener(listener).await
    }

    /// Serve on an already bound listener until shut down.
    ///
    /// Open connections are closed with [`CloseReason::Shutdown`] and
    /// awaited before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if serving fails.
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let Self { config, state } = self;
        info!(
            "listening: addr={:?}, path={}",
            listener.local_addr().ok(),
            config.path
        );
        let shutdown = state.shutdown.clone();
        let tracker = state.tracker.clone();
        let app = Router::new()
            .route(&config.path, get(upgrade))
            .with_state(state);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

        tracker.close();
        tracker.wait().await;
        info!("server stopped");
        Ok(())
    }
}

async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<ServerState>,
) -> Response {
    ws.protocols(SUBPROTOCOLS).on_upgrade(move |socket| {
        let tracker = state.tracker.clone();
        tracker.track_future(serve_socket(socket, peer, state))
    })
}

async fn serve_socket(socket: WebSocket, peer: SocketAddr, state: ServerState) {
    let (queues, handle) = match PushQueues::<Outbound>::builder()
        .high_capacity(state.engine.high_capacity)
        .low_capacity(state.engine.low_capacity)
        .build()
    {
        Ok(pair) => pair,
        Err(e) => {
            error!("rejecting connection: peer={peer}, error={e}");
            return;
        }
    };
    let session = StompSession::new(
        SessionId::next(),
        Arc::clone(&state.registry),
        Arc::clone(&state.dispatcher),
        handle,
    )
    .with_config(state.engine)
    .with_close_signal(CloseSignal::child_of(&state.shutdown));
    let connection = StompConnection::new(session).with_peer(peer);

    let (sink, stream) = socket.split();
    let (done_tx, done_rx) = oneshot::channel();
    let writer = tokio::spawn(write_outbound(sink, queues, done_rx));

    let inbound = stream
        .take_while(|msg| ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => Some(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
                ),
                Ok(_) => None,
                Err(e) => Some(Err(io::Error::other(e))),
            })
        });
    let inbound = std::pin::pin!(inbound);

    let reason = match AssertUnwindSafe(connection.run(inbound)).catch_unwind().await {
        Ok(reason) => reason,
        Err(panic) => {
            let panic_msg = format_panic(&*panic);
            error!("connection task panicked: panic={panic_msg}, peer={peer}");
            CloseReason::HandlerFailed(panic_msg.to_string())
        }
    };
    let _ = done_tx.send(reason);
    let _ = writer.await;
}

async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut queues: PushQueues<Outbound>,
    mut done: oneshot::Receiver<CloseReason>,
) {
    let reason = loop {
        tokio::select! {
            biased;

            item = queues.recv() => match item {
                Some((_, item)) => {
                    if send_item(&mut sink, item).await.is_err() {
                        return;
                    }
                }
                None => break (&mut done).await.ok(),
            },
            reason = &mut done => break reason.ok(),
        }
    };

    queues.close();
    for item in queues.drain() {
        if send_item(&mut sink, item).await.is_err() {
            return;
        }
    }
    let frame = reason.map(|reason| CloseFrame {
        code: reason.close_code(),
        reason: Utf8Bytes::from_static(reason.label()),
    });
    let _ = sink.send(Message::Close(frame)).await;
}

async fn send_item(
    sink: &mut SplitSink<WebSocket, Message>,
    item: Outbound,
) -> Result<(), axum::Error> {
    metrics::inc_frames(Direction::Outbound);
    sink.send(Message::Text(item.into_text().into())).await
}
