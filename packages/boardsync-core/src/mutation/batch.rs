//! Batch writer: one network call per gesture.
//!
//! A successful write needs no follow-up, the optimistic patch already shows
//! the end state. A failed write is reported to the caller, who rolls back;
//! it is never retried here.
use std::sync::Arc;

use crate::api::BoardApi;
use crate::error::EngineError;
use crate::types::{CardId, PositionUpdate};

pub struct BatchWriter<A> {
    api: Arc<A>,
}

impl<A> Clone for BatchWriter<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
        }
    }
}

impl<A: BoardApi> BatchWriter<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    /// Ship every update of one gesture in a single request.
    pub async fn send(&self, updates: Vec<PositionUpdate>) -> Result<(), EngineError> {
        if updates.is_empty() {
            return Ok(());
        }
        log::debug!(
            "[boardsync.batch] Writing {} position update(s)",
            updates.len()
        );
        self.api.put_positions(&updates).await.map_err(|e| {
            log::warn!("[boardsync.batch] Batch write failed: {}", e);
            EngineError::BatchWrite(e)
        })
    }

    pub async fn delete(&self, card_id: CardId) -> Result<(), EngineError> {
        self.api.delete_card(card_id).await.map_err(|e| {
            log::warn!("[boardsync.batch] Delete of card {} failed: {}", card_id, e);
            EngineError::Delete { card_id, source: e }
        })
    }
}
