use crate::handlers::entity::GatewayState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use nearcast_core::store::next_connection_id;
use nearcast_core::{ClientChannel, ConnectionId, Entity, UserFilter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Depth of the per-connection outbound queue; newest messages are dropped
/// once it is full.
const OUTBOUND_QUEUE_DEPTH: usize = 100;

/// Server ping cadence on the data socket.
const PING_PERIOD: tokio::time::Duration = tokio::time::Duration::from_secs(54);

/// The outbound half of one data socket. `write` is called by the plane
/// fan-out under a read lock, so it only ever enqueues; the writer task
/// drains the queue onto the socket.
pub struct WsChannel {
    id: ConnectionId,
    entity: Arc<Entity>,
    tx: mpsc::Sender<Vec<u8>>,
    dropped: AtomicU64,
}

impl WsChannel {
    fn new(entity: Arc<Entity>) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        (
            Arc::new(WsChannel {
                id: next_connection_id(),
                entity,
                tx,
                dropped: AtomicU64::new(0),
            }),
            rx,
        )
    }

    /// Messages dropped on queue overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ClientChannel for WsChannel {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn entity(&self) -> Arc<Entity> {
        self.entity.clone()
    }

    fn write(&self, payload: &[u8]) {
        if self.tx.try_send(payload.to_vec()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("data socket queue full, message dropped");
        }
    }
}

/// GET /api/v1/entity/{tokenid}/data — upgrade to the data WebSocket.
pub async fn data_socket(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let entity = match state.endpoint.get_entity(&token).await {
        Ok(entity) => entity,
        Err(e) => {
            warn!("data socket rejected: {e}");
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    info!("opening data channel for token={token}");
    ws.on_upgrade(move |socket| handle_data_socket(socket, entity, token))
        .into_response()
}

async fn handle_data_socket(socket: WebSocket, entity: Arc<Entity>, token: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (channel, mut outbound) = WsChannel::new(entity.clone());
    let conn: Arc<dyn ClientChannel> = channel.clone();

    // one driver per session; a second data socket on the same token has
    // no driver to feed and is closed immediately
    let Some(_driver) = entity.subscription().start(conn) else {
        warn!("data socket already open for token={token}");
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    };

    // Writer: drain the outbound queue, batching whatever is pending into
    // a single JSON array frame, and ping on a timer.
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_PERIOD);
        ping.tick().await; // immediate first tick
        loop {
            tokio::select! {
                maybe = outbound.recv() => {
                    let Some(first) = maybe else { break };
                    let mut frame = Vec::with_capacity(first.len() + 2);
                    frame.push(b'[');
                    frame.extend_from_slice(&first);
                    while let Ok(next) = outbound.try_recv() {
                        frame.push(b',');
                        frame.extend_from_slice(&next);
                    }
                    frame.push(b']');
                    let text = String::from_utf8_lossy(&frame).into_owned();
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: each inbound text frame is a UserFilter for the driver.
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<UserFilter>(&text) {
                Ok(filter) => entity.subscription().set_user_filter(filter),
                Err(e) => debug!("ignoring unparseable filter: {e}"),
            },
            Ok(Message::Close(_)) => {
                debug!("client closed data socket for token={token}");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("data socket error for token={token}: {e}");
                break;
            }
        }
    }

    // socket gone: stop the driver (which releases both planes) and the
    // writer with it
    entity.subscription().stop();
    writer.abort();
    if channel.dropped() > 0 {
        debug!(
            "data socket for token={token} dropped {} messages on overflow",
            channel.dropped()
        );
    }
    info!("closed data channel for token={token}");
}
