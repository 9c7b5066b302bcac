//! WebSocket push transport speaking the JSON hub protocol.

use futures_util::stream;
use futures_util::{SinkExt, StreamExt};
use jobs_core::{HANDSHAKE_FRAME, HubMessage, PING_FRAME, ProgressUpdate, decode_frame};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::connection::{ConnectionError, EventStream, OpenFuture, PushTransport};

const CLOSED_BY_SERVER: &str = "closed by server";

/// Opens the push channel as a WebSocket to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl PushTransport for WebSocketTransport {
    fn open(&self) -> OpenFuture {
        let url = self.url.clone();
        Box::pin(async move {
            let (socket, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| ConnectionError::Open(e.to_string()))?;
            let (mut sink, read) = socket.split();
            sink.send(Message::text(HANDSHAKE_FRAME.to_string()))
                .await
                .map_err(|e| ConnectionError::Open(format!("handshake failed: {}", e)))?;
            tracing::debug!(url = %url, "Hub connection opened");

            // Writes back to the server; ends once the event stream is dropped.
            let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
            tokio::spawn(async move {
                while let Some(frame) = outgoing_rx.recv().await {
                    if let Err(e) = sink.send(Message::text(frame)).await {
                        tracing::debug!("Hub write failed: {}", e);
                        break;
                    }
                }
                let _ = sink.close().await;
            });

            let updates = read.flat_map(move |message| {
                let items = match message {
                    Ok(Message::Text(text)) => frame_items(text.as_str(), &outgoing_tx),
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|reason| !reason.is_empty())
                            .unwrap_or_else(|| CLOSED_BY_SERVER.to_string());
                        vec![Err(ConnectionError::Closed(reason))]
                    }
                    Ok(_) => Vec::new(),
                    Err(e) => vec![Err(ConnectionError::Protocol(e.to_string()))],
                };
                stream::iter(items)
            });

            Ok(Box::pin(updates) as EventStream)
        })
    }
}

/// Turn one text frame into stream items, answering pings on `outgoing`.
///
/// Malformed records are skipped.
fn frame_items(
    text: &str,
    outgoing: &mpsc::UnboundedSender<String>,
) -> Vec<Result<ProgressUpdate, ConnectionError>> {
    let mut items = Vec::new();
    for message in decode_frame(text) {
        match message {
            Ok(HubMessage::Progress(update)) => items.push(Ok(update)),
            Ok(HubMessage::Ping) => {
                let _ = outgoing.send(PING_FRAME.to_string());
            }
            Ok(HubMessage::Close { error }) => {
                let reason = error.unwrap_or_else(|| CLOSED_BY_SERVER.to_string());
                items.push(Err(ConnectionError::Closed(reason)));
                break;
            }
            Ok(HubMessage::Ignored) => {}
            Err(e) => tracing::warn!("Skipping malformed hub record: {}", e),
        }
    }
    items
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use jobs_core::JobStatus;

    #[test]
    fn decodes_batched_records_and_answers_pings() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let text = concat!(
            "{}\u{1e}",
            r#"{"type":1,"target":"UpdateJobProgress","arguments":[{"jobID":"a","status":2,"progress":10}]}"#,
            "\u{1e}",
            r#"{"type":6}"#,
            "\u{1e}",
            "not json",
            "\u{1e}",
            r#"{"type":1,"target":"UpdateJobProgress","arguments":[{"jobID":"b","status":3,"progress":100}]}"#,
            "\u{1e}",
        );

        let items = frame_items(text, &tx);
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_ref().unwrap(),
            &ProgressUpdate::new("a", JobStatus::Running, 10)
        );
        assert_eq!(
            items[1].as_ref().unwrap(),
            &ProgressUpdate::new("b", JobStatus::Completed, 100)
        );
        assert_eq!(rx.try_recv().unwrap(), PING_FRAME);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_records_end_the_frame() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let text = concat!(
            r#"{"type":7,"error":"Server shutting down"}"#,
            "\u{1e}",
            r#"{"type":1,"target":"UpdateJobProgress","arguments":[{"jobID":"a","status":2,"progress":10}]}"#,
            "\u{1e}",
        );

        let items = frame_items(text, &tx);
        assert_eq!(items.len(), 1);
        assert!(matches!(
            &items[0],
            Err(ConnectionError::Closed(reason)) if reason == "Server shutting down"
        ));

        let items = frame_items("{\"type\":7}\u{1e}", &tx);
        assert!(matches!(
            &items[0],
            Err(ConnectionError::Closed(reason)) if reason == CLOSED_BY_SERVER
        ));
    }
}
