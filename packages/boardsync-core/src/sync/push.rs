/// Push reconciler: folds server-originated events into the page cache.
///
/// Created and updated cards are upserted (last event wins, no field merge
/// with local optimistic state). Deletes remove by id. Reorders go through
/// the reorder buffer. Payloads may arrive bare or wrapped in a
/// `{ event_version, data }` envelope. Anything undecodable is logged and
/// dropped; the cache is never touched by a malformed event.
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use super::reorder_buffer::ReorderBuffer;
use crate::cache::PageCache;
use crate::types::{Card, CardId, PositionUpdate};

/// A raw event as read off the push channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushFrame {
    pub event: String,
    #[serde(default, alias = "payload")]
    pub data: Value,
}

impl PushFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Created(Card),
    Updated(Card),
    Deleted { id: CardId },
    Reordered(Vec<PositionUpdate>),
}

impl PushEvent {
    /// The card this event takes off the board, if any. An update carrying
    /// the deleted flag counts.
    pub fn removed_id(&self) -> Option<CardId> {
        match self {
            PushEvent::Deleted { id } => Some(*id),
            PushEvent::Created(card) | PushEvent::Updated(card) if card.deleted => Some(card.id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PushError {
    #[error("Unknown push event '{0}'")]
    UnknownEvent(String),

    #[error("Malformed '{event}' payload: {reason}")]
    Malformed { event: String, reason: String },
}

/// What a frame did to the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Applied to the cache right away.
    Applied { changed: bool },
    /// Queued in the reorder buffer.
    Buffered { pending: usize },
    Dropped,
}

/// Strip the versioned envelope if present.
pub fn unwrap_envelope(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) if map.contains_key("event_version") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Decode a named event. English and ticket-store names are both accepted.
pub fn decode_push(event: &str, payload: Value) -> Result<PushEvent, PushError> {
    let payload = unwrap_envelope(payload);
    match event {
        "card_created" | "tarjeta_creada" => decode_card(event, payload).map(PushEvent::Created),
        "card_updated" | "tarjeta_actualizada" => {
            decode_card(event, payload).map(PushEvent::Updated)
        }
        "card_deleted" | "tarjeta_eliminada" => {
            decode_id(event, &payload).map(|id| PushEvent::Deleted { id })
        }
        "cards_reordered" | "tarjetas_reordenadas" => {
            decode_items(event, payload).map(PushEvent::Reordered)
        }
        other => Err(PushError::UnknownEvent(other.to_string())),
    }
}

fn malformed(event: &str, reason: impl Into<String>) -> PushError {
    PushError::Malformed {
        event: event.to_string(),
        reason: reason.into(),
    }
}

fn decode_card(event: &str, payload: Value) -> Result<Card, PushError> {
    if payload.get("id").and_then(Value::as_i64).is_none() {
        return Err(malformed(event, "missing id"));
    }
    serde_json::from_value(payload).map_err(|e| malformed(event, e.to_string()))
}

fn decode_id(event: &str, payload: &Value) -> Result<CardId, PushError> {
    let id = match payload {
        Value::Number(n) => n.as_i64(),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("card_id"))
            .and_then(Value::as_i64),
        _ => None,
    };
    id.ok_or_else(|| malformed(event, "missing id"))
}

/// Items come as `{ items: [...] }` or a bare array. Single bad items are
/// skipped; a payload with no usable item at all is malformed.
fn decode_items(event: &str, payload: Value) -> Result<Vec<PositionUpdate>, PushError> {
    let raw = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => return Err(malformed(event, "missing items")),
        },
        _ => return Err(malformed(event, "missing items")),
    };

    let total = raw.len();
    let items: Vec<PositionUpdate> = raw
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if items.len() < total {
        log::warn!(
            "[boardsync.push] Skipped {} malformed item(s) in '{}'",
            total - items.len(),
            event
        );
        if items.is_empty() {
            return Err(malformed(event, "no valid items"));
        }
    }
    Ok(items)
}

/// Counts what it has applied and dropped; holds no cache state itself.
#[derive(Debug, Default)]
pub struct PushReconciler {
    applied: u64,
    dropped: u64,
}

impl PushReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn handle(
        &mut self,
        cache: &mut PageCache,
        buffer: &mut ReorderBuffer,
        frame: PushFrame,
        now: Instant,
    ) -> PushOutcome {
        match self.decode(frame) {
            Some(event) => self.apply(cache, buffer, event, now),
            None => PushOutcome::Dropped,
        }
    }

    /// Decode a frame, counting it as applied or dropped.
    pub fn decode(&mut self, frame: PushFrame) -> Option<PushEvent> {
        match decode_push(&frame.event, frame.data) {
            Ok(event) => {
                self.applied += 1;
                Some(event)
            }
            Err(e @ PushError::UnknownEvent(_)) => {
                log::debug!("[boardsync.push] Ignoring event: {}", e);
                self.dropped += 1;
                None
            }
            Err(e) => {
                log::warn!("[boardsync.push] Dropping event: {}", e);
                self.dropped += 1;
                None
            }
        }
    }

    pub fn apply(
        &mut self,
        cache: &mut PageCache,
        buffer: &mut ReorderBuffer,
        event: PushEvent,
        now: Instant,
    ) -> PushOutcome {
        match event {
            PushEvent::Created(card) | PushEvent::Updated(card) => PushOutcome::Applied {
                changed: cache.upsert(card),
            },
            PushEvent::Deleted { id } => PushOutcome::Applied {
                changed: cache.remove(id).is_some(),
            },
            PushEvent::Reordered(items) => {
                buffer.push(items, now);
                PushOutcome::Buffered {
                    pending: buffer.pending_len(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (PageCache, ReorderBuffer, PushReconciler) {
        let mut cache = PageCache::new();
        cache.upsert_many(vec![Card::new(1, "todo", 0), Card::new(2, "todo", 1)]);
        (
            cache,
            ReorderBuffer::new(Duration::from_millis(150)),
            PushReconciler::new(),
        )
    }

    #[test]
    fn test_decode_spanish_and_english_names() {
        let card = json!({"id": 3, "columna": "done", "posicion": 0, "titulo": "x"});
        assert!(matches!(
            decode_push("tarjeta_creada", card.clone()),
            Ok(PushEvent::Created(c)) if c.id == 3 && c.column == "done"
        ));
        assert!(matches!(
            decode_push("card_updated", card),
            Ok(PushEvent::Updated(_))
        ));
        assert_eq!(
            decode_push("tarjeta_eliminada", json!({"id": 3, "eliminado": true})),
            Ok(PushEvent::Deleted { id: 3 })
        );
    }

    #[test]
    fn test_envelope_and_bare_payload_decode_alike() {
        let bare = json!({"items": [{"id": 1, "columna": "todo", "posicion": 1}]});
        let wrapped = json!({"event_version": 2, "data": bare.clone()});
        assert_eq!(
            decode_push("cards_reordered", bare).unwrap(),
            decode_push("cards_reordered", wrapped).unwrap()
        );
    }

    #[test]
    fn test_reorder_accepts_bare_array_and_english_fields() {
        let items = json!([{"card_id": 1, "column": "done", "position": 4}]);
        assert_eq!(
            decode_push("tarjetas_reordenadas", items).unwrap(),
            PushEvent::Reordered(vec![PositionUpdate::new(1, "done", 4)])
        );
    }

    #[test]
    fn test_reorder_skips_bad_items() {
        let items = json!({"items": [{"columna": "done"}, {"id": 2, "columna": "done", "posicion": 0}]});
        assert_eq!(
            decode_push("cards_reordered", items).unwrap(),
            PushEvent::Reordered(vec![PositionUpdate::new(2, "done", 0)])
        );
        assert!(matches!(
            decode_push("cards_reordered", json!({"items": [{"columna": "done"}]})),
            Err(PushError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_id_is_dropped_without_touching_cache() {
        let (mut cache, mut buffer, mut rec) = setup();
        let before = cache.version();
        for frame in [
            PushFrame::new("card_updated", json!({"columna": "done"})),
            PushFrame::new("card_deleted", json!({})),
            PushFrame::new("card_created", json!("nope")),
            PushFrame::new("card_moved", json!({"id": 1})),
        ] {
            assert_eq!(
                rec.handle(&mut cache, &mut buffer, frame, Instant::now()),
                PushOutcome::Dropped
            );
        }
        assert_eq!(rec.dropped(), 4);
        assert_eq!(cache.version(), before);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_repeated_update_is_idempotent() {
        let (mut cache, mut buffer, mut rec) = setup();
        let frame = PushFrame::new(
            "tarjeta_actualizada",
            json!({"id": 2, "columna": "todo", "posicion": 1, "titulo": "renamed"}),
        );
        let first = rec.handle(&mut cache, &mut buffer, frame.clone(), Instant::now());
        let view = cache.view(&[]);
        let second = rec.handle(&mut cache, &mut buffer, frame, Instant::now());
        assert_eq!(first, PushOutcome::Applied { changed: true });
        assert_eq!(second, PushOutcome::Applied { changed: false });
        assert_eq!(cache.view(&[]), view);
    }

    #[test]
    fn test_created_for_known_card_is_harmless() {
        let (mut cache, mut buffer, mut rec) = setup();
        let frame = PushFrame::new("card_created", json!({"id": 1, "columna": "todo", "posicion": 0}));
        rec.handle(&mut cache, &mut buffer, frame, Instant::now());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.column_ids("todo"), vec![1, 2]);
    }

    #[test]
    fn test_delete_of_unknown_card_is_noop() {
        let (mut cache, mut buffer, mut rec) = setup();
        let outcome = rec.handle(
            &mut cache,
            &mut buffer,
            PushFrame::new("card_deleted", json!({"id": 99})),
            Instant::now(),
        );
        assert_eq!(outcome, PushOutcome::Applied { changed: false });
    }

    #[test]
    fn test_soft_deleted_update_removes_card() {
        let (mut cache, mut buffer, mut rec) = setup();
        rec.handle(
            &mut cache,
            &mut buffer,
            PushFrame::new(
                "card_updated",
                json!({"id": 1, "columna": "todo", "posicion": 0, "eliminado": true}),
            ),
            Instant::now(),
        );
        assert!(!cache.contains(1));
    }

    #[test]
    fn test_removed_id_for_deletes_and_soft_deletes() {
        let mut rec = PushReconciler::new();
        let deleted = rec
            .decode(PushFrame::new("tarjeta_eliminada", json!({"id": 4})))
            .unwrap();
        assert_eq!(deleted.removed_id(), Some(4));

        let soft = rec
            .decode(PushFrame::new(
                "tarjeta_actualizada",
                json!({"id": 7, "columna": "todo", "posicion": 0, "eliminado": true}),
            ))
            .unwrap();
        assert_eq!(soft.removed_id(), Some(7));

        let live = rec
            .decode(PushFrame::new("card_updated", json!({"id": 7, "columna": "todo", "posicion": 0})))
            .unwrap();
        assert_eq!(live.removed_id(), None);

        assert!(rec.decode(PushFrame::new("status", json!({}))).is_none());
        assert_eq!((rec.applied(), rec.dropped()), (3, 1));
    }

    #[test]
    fn test_reorder_is_buffered_not_applied() {
        let (mut cache, mut buffer, mut rec) = setup();
        let before = cache.version();
        let outcome = rec.handle(
            &mut cache,
            &mut buffer,
            PushFrame::new(
                "cards_reordered",
                json!({"items": [{"id": 1, "columna": "todo", "posicion": 1}, {"id": 2, "columna": "todo", "posicion": 0}]}),
            ),
            Instant::now(),
        );
        assert_eq!(outcome, PushOutcome::Buffered { pending: 2 });
        assert_eq!(cache.version(), before);
        buffer.flush(&mut cache);
        assert_eq!(cache.column_ids("todo"), vec![2, 1]);
    }

    #[test]
    fn test_frame_accepts_payload_alias() {
        let frame: PushFrame =
            serde_json::from_value(json!({"event": "card_deleted", "payload": {"id": 1}})).unwrap();
        assert_eq!(frame.data, json!({"id": 1}));
    }
}
