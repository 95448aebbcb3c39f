//! WebSocket transport glue: wires an Axum `WebSocket` to the Connection
//! Manager's session/reader/writer model (`spec.md` §4.7 [EXPANSION]).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::realtime::message::{InboundMessage, OutboundMessage, parse_inbound};
use crate::realtime::ConnectionManager;

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Drive one accepted WebSocket connection end-to-end: register the
/// session, spawn its writer task, and run the reader loop until the
/// transport closes.
pub async fn handle_socket(socket: WebSocket, client_id: String, connections: Arc<ConnectionManager>) {
    let session = match connections.connect(&client_id, None) {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(client_id, error = %err, "websocket connect rejected");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let writer_session = Arc::clone(&session);
    let writer_task = tokio::spawn(async move {
        loop {
            writer_session.notified().await;

            if writer_session.take_ping_request() && sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                return;
            }

            for frame in writer_session.drain_outbound() {
                if sink.send(Message::Text(frame.to_json().into())).await.is_err() {
                    return;
                }
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        let now = now_millis();
        session.touch(now);

        match message {
            Message::Text(text) => handle_inbound(&connections, &client_id, &session, &text, now),
            Message::Pong(_) => session.record_pong(now),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Binary(_) => {}
        }
    }

    writer_task.abort();
    connections.disconnect(&client_id);
}

fn handle_inbound(
    connections: &Arc<ConnectionManager>,
    client_id: &str,
    session: &crate::realtime::Session,
    text: &str,
    now: i64,
) {
    match parse_inbound(text) {
        Ok(InboundMessage::Subscribe { topic }) => {
            if let Err(err) = connections.subscribe(client_id, &topic) {
                tracing::warn!(client_id, topic, error = %err, "subscribe failed");
            }
        }
        Ok(InboundMessage::Unsubscribe { topic }) => {
            if let Err(err) = connections.unsubscribe(client_id, &topic) {
                tracing::warn!(client_id, topic, error = %err, "unsubscribe failed");
            }
        }
        Ok(InboundMessage::Ping) => {
            session.enqueue(OutboundMessage::Pong { timestamp: now });
        }
        Ok(InboundMessage::GetStats) => {
            let stats = connections.stats();
            session.enqueue(OutboundMessage::Data {
                topic: "stats".to_string(),
                payload: serde_json::json!({
                    "session_count": stats.session_count,
                    "topic_count": stats.topic_count,
                }),
                timestamp: now,
            });
        }
        Err(err) => {
            session.enqueue(OutboundMessage::from_parse_error(err, now));
        }
    }
}
