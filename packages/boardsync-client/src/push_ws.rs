/// Push channel reader over WebSocket.
///
/// Speaks either plain JSON frames (`{"event": ..., "data": ...}`) or the
/// Socket.IO v4 text protocol the ticket store uses, and forwards decoded
/// frames to the board session. Drops and failed connects are retried with
/// capped exponential backoff until shutdown.
use std::time::Duration;

use boardsync_core::PushFrame;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::error::ClientError;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// What to do with one inbound text message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(PushFrame),
    /// Protocol message to send back (handshake, pong, join).
    Reply(String),
    Close,
    Ignore,
}

pub fn parse_text(text: &str) -> Inbound {
    let text = text.trim();
    if text.starts_with('{') {
        return match serde_json::from_str::<PushFrame>(text) {
            Ok(frame) => Inbound::Event(frame),
            Err(e) => {
                log::warn!("[boardsync.push_ws] Unreadable JSON frame: {}", e);
                Inbound::Ignore
            }
        };
    }

    // engine.io packet type, then socket.io packet type for messages.
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some('0'), _) => Inbound::Reply("40".to_string()),
        (Some('1'), _) => Inbound::Close,
        (Some('2'), _) => Inbound::Reply("3".to_string()),
        (Some('4'), Some('0')) => Inbound::Reply(r#"42["join"]"#.to_string()),
        (Some('4'), Some('1')) => Inbound::Close,
        (Some('4'), Some('2')) => parse_event(&text[2..]),
        (Some('4'), Some('4')) => {
            log::warn!("[boardsync.push_ws] Namespace connect refused: {}", &text[2..]);
            Inbound::Close
        }
        _ => Inbound::Ignore,
    }
}

/// `[/ns,][ack]["name", payload]`
fn parse_event(body: &str) -> Inbound {
    let body = match body.strip_prefix('/') {
        Some(rest) => match rest.find(',') {
            Some(i) => &rest[i + 1..],
            None => return Inbound::Ignore,
        },
        None => body,
    };
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());

    let mut parts = match serde_json::from_str::<Vec<Value>>(body) {
        Ok(parts) => parts.into_iter(),
        Err(e) => {
            log::warn!("[boardsync.push_ws] Unreadable event packet: {}", e);
            return Inbound::Ignore;
        }
    };
    match parts.next() {
        Some(Value::String(name)) => {
            Inbound::Event(PushFrame::new(name, parts.next().unwrap_or(Value::Null)))
        }
        _ => Inbound::Ignore,
    }
}

pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

enum Ended {
    /// The connection was up and then closed by the peer.
    Closed,
    Shutdown,
}

/// Read pushes from `url` into `frames` until `shutdown` flips or the
/// session side hangs up.
pub async fn run_push_reader(
    url: String,
    frames: mpsc::Sender<PushFrame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        if *shutdown.borrow() || frames.is_closed() {
            break;
        }
        match read_connection(&url, &frames, &mut shutdown).await {
            Ok(Ended::Shutdown) => break,
            Ok(Ended::Closed) => {
                log::info!("[boardsync.push_ws] Connection to {} closed", url);
                backoff = INITIAL_BACKOFF;
            }
            Err(e) => {
                log::warn!(
                    "[boardsync.push_ws] Connection to {} failed: {} (retrying in {:?})",
                    url,
                    e,
                    backoff
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => break,
        }
        backoff = next_backoff(backoff);
    }
    log::info!("[boardsync.push_ws] Push reader stopped");
}

async fn read_connection(
    url: &str,
    frames: &mpsc::Sender<PushFrame>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Ended, ClientError> {
    let (ws_stream, _) = tokio::select! {
        result = tokio_tungstenite::connect_async(url) => result?,
        _ = shutdown.changed() => return Ok(Ended::Shutdown),
    };
    log::info!("[boardsync.push_ws] Connected to {}", url);
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return Ok(Ended::Shutdown);
            }
            msg = ws_rx.next() => {
                let Some(msg) = msg else {
                    return Ok(Ended::Closed);
                };
                let text = match msg? {
                    Message::Text(t) => t.to_string(),
                    Message::Ping(data) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                        continue;
                    }
                    Message::Close(_) => return Ok(Ended::Closed),
                    _ => continue,
                };
                match parse_text(&text) {
                    Inbound::Event(frame) => {
                        if frames.send(frame).await.is_err() {
                            return Ok(Ended::Shutdown);
                        }
                    }
                    Inbound::Reply(reply) => ws_tx.send(Message::Text(reply.into())).await?,
                    Inbound::Close => return Ok(Ended::Closed),
                    Inbound::Ignore => {}
                }
            }
        }
    }
}
