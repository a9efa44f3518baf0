use crate::extractors::bearer_token;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::*;
use realtime::hub::Hub;
use realtime::message::{ClientEvent, EventType, Outbox, ServerEvent};
use realtime::session::{Session, SessionId};
use serde::Deserialize;
use service::AppState;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectParams {
    token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the credential token
/// may also travel as `?token=`. The query string wins when both are present.
fn credential_token<'a>(params: &'a ConnectParams, headers: &'a HeaderMap) -> Option<&'a str> {
    params
        .token
        .as_deref()
        .filter(|token| !token.is_empty())
        .or_else(|| bearer_token(headers))
}

/// Authenticates the connection before upgrading it, so a bad token is refused
/// with a plain 401 instead of an opened and immediately closed socket.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> Response {
    let Some(token) = credential_token(&params, &headers) else {
        debug!("Refusing WebSocket connection without a credential token");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    };

    let (outbox, outbox_rx) = mpsc::unbounded_channel();
    let hub = app_state.hub.clone();
    let session = match hub.connect(token, outbox).await {
        Ok(session) => session,
        Err(e) => {
            debug!("Refusing WebSocket connection: {e}");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };
    info!(
        "Session {} connected for user {}",
        session.id, session.user_id
    );

    let failed_hub = hub.clone();
    let failed_session_id = session.id.clone();
    ws.on_failed_upgrade(move |e| {
        warn!("WebSocket upgrade for session {failed_session_id} failed: {e}");
        tokio::spawn(async move { failed_hub.disconnect(&failed_session_id).await });
    })
    .on_upgrade(move |socket| serve_session(socket, hub, session, outbox_rx))
}

/// Pumps one connection until either side ends it. The reader dispatches
/// inbound frames; the writer drains the session's outbox onto the socket and
/// stops once the session is terminated, discarding anything still queued.
async fn serve_session(
    socket: WebSocket,
    hub: Arc<Hub>,
    session: Session,
    mut outbox_rx: UnboundedReceiver<ServerEvent>,
) {
    let (mut sink, mut stream) = socket.split();
    let session_id = session.id.clone();
    let cancel = session.cancellation();

    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Deliveries still queued are cancelled; only the logout notice goes out
                    let mut dropped = 0;
                    while let Ok(event) = outbox_rx.try_recv() {
                        if matches!(event, ServerEvent::ForceLogout { .. }) {
                            let _ = write_event(&mut sink, &event).await;
                        } else {
                            dropped += 1;
                        }
                    }
                    if dropped > 0 {
                        debug!("Dropped {dropped} queued event(s) for a terminated session");
                    }
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
                event = outbox_rx.recv() => match event {
                    Some(event) => {
                        if write_event(&mut sink, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    let reader_hub = hub.clone();
    let reader_session_id = session_id.clone();
    let outbox = session.outbox().clone();
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(frame) => {
                    if handle_frame(&reader_hub, &reader_session_id, &outbox, frame)
                        .await
                        .is_break()
                    {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Read from session {reader_session_id} failed: {e}");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    hub.disconnect(&session_id).await;
    info!("Session {session_id} closed");
}

async fn write_event(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sink.send(WsMessage::Text(json)).await,
        Err(e) => {
            error!("Failed to serialize {} event: {e}", event.event_type());
            Ok(())
        }
    }
}

/// Handles one inbound frame. Every frame, protocol-level pings and pongs
/// included, counts as activity for the idle timeout.
pub(crate) async fn handle_frame(
    hub: &Hub,
    session_id: &SessionId,
    outbox: &Outbox,
    frame: WsMessage,
) -> ControlFlow<()> {
    if hub.registry().touch(session_id).is_err() {
        debug!("Session {session_id} ended while reading");
        return ControlFlow::Break(());
    }

    match frame {
        WsMessage::Text(text) => handle_text(hub, session_id, outbox, &text).await,
        WsMessage::Binary(_) => {
            let _ = outbox.send(ServerEvent::Error {
                code: "invalid_frame".to_string(),
                message: "Only text frames are accepted".to_string(),
            });
        }
        WsMessage::Close(_) => return ControlFlow::Break(()),
        // Pings are answered by the protocol layer
        WsMessage::Ping(_) | WsMessage::Pong(_) => {}
    }
    ControlFlow::Continue(())
}

/// Decodes and dispatches one text frame. The reply, or an `error` frame, goes
/// through the session's outbox so it stays ordered with fanout to the same
/// session. A bad frame never closes the connection.
pub(crate) async fn handle_text(hub: &Hub, session_id: &SessionId, outbox: &Outbox, text: &str) {
    let reply = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => match hub.dispatch(session_id, event).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!("Request from session {session_id} refused: {e}");
                ServerEvent::from(&e)
            }
        },
        Err(e) => ServerEvent::Error {
            code: "invalid_event".to_string(),
            message: e.to_string(),
        },
    };

    if outbox.send(reply).is_err() {
        trace!("Session {session_id} closed before its reply was sent");
    }
}
