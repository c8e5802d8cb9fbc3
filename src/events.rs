use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Progress of a running analysis, pushed to UI clients via WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    SourceStarted {
        request_id: Uuid,
        source: String,
        ticker: String,
    },
    SourceFinished {
        request_id: Uuid,
        source: String,
        headlines: usize,
        error: Option<String>,
    },
    SummaryStarted {
        request_id: Uuid,
        ticker: String,
        headlines: usize,
    },
    AnalysisComplete {
        request_id: Uuid,
        ticker: String,
        has_summary: bool,
    },
}

pub type EventSender = broadcast::Sender<ProgressEvent>;

pub fn new_event_channel() -> EventSender {
    let (tx, _) = broadcast::channel(64);
    tx
}

/// Send an event if anyone is listening.
pub fn emit(tx: Option<&EventSender>, event: ProgressEvent) {
    if let Some(tx) = tx {
        // Err only means no subscribers.
        let _ = tx.send(event);
    }
}

/// Axum handler: upgrade HTTP to WebSocket, then forward events.
pub async fn ws_handler(ws: WebSocketUpgrade, State(tx): State<EventSender>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, tx))
}

async fn handle_ws(mut socket: WebSocket, tx: EventSender) {
    let mut rx = tx.subscribe();
    debug!("Progress WebSocket client connected");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let json = match serde_json::to_string(&ev) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize progress event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Progress WS client lagged, skipped {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
    debug!("Progress WebSocket client disconnected");
}
