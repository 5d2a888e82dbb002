//! Optimistic mutations with value-level rollback.
//!
//! `begin` patches the cache right away and keeps, per touched card, the value
//! it had before and the value the patch wrote. Rollback walks the touched
//! cards in reverse and restores a card only while it still holds the patched
//! value, so anything a push or page merge wrote in the meantime survives.
use std::collections::{HashMap, HashSet};

use crate::cache::PageCache;
use crate::error::EngineError;
use crate::types::{Card, CardId, PositionUpdate};

#[derive(Debug, Clone, PartialEq)]
enum Applied {
    Upserted(Card),
    Removed,
}

#[derive(Debug, Clone)]
struct Touched {
    card_id: CardId,
    before: Card,
    applied: Applied,
}

/// Snapshot of one in-flight optimistic mutation.
#[derive(Debug)]
pub struct MutationHandle {
    id: u64,
    touched: Vec<Touched>,
}

impl MutationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Touched card ids, first-touch order, without repeats.
    pub fn card_ids(&self) -> Vec<CardId> {
        let mut ids: Vec<CardId> = Vec::with_capacity(self.touched.len());
        for t in &self.touched {
            if !ids.contains(&t.card_id) {
                ids.push(t.card_id);
            }
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    /// Cards this mutation removed from the cache.
    pub fn removed_ids(&self) -> Vec<CardId> {
        self.touched
            .iter()
            .filter(|t| t.applied == Applied::Removed)
            .map(|t| t.card_id)
            .collect()
    }
}

/// What rollback did with each touched card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub restored: Vec<CardId>,
    /// Overwritten by a newer event after the patch; left as is.
    pub kept_newer: Vec<CardId>,
    /// Deleted after the patch; deletion wins.
    pub deleted_meanwhile: Vec<CardId>,
}

enum Verdict {
    Restore,
    KeepNewer,
    StayDeleted,
}

#[derive(Debug, Default)]
pub struct OptimisticMutator {
    next_id: u64,
    /// mutation id -> cards it holds
    in_flight: HashMap<u64, Vec<CardId>>,
    /// Cards removed by an in-flight delete.
    pending_deletes: HashSet<CardId>,
    /// Pending deletes the server has since reported deleted.
    deleted_remotely: HashSet<CardId>,
}

impl OptimisticMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply position updates to the cache in one pass and return the
    /// rollback handle. Fails without touching the cache when a card is not
    /// loaded or is already held by another in-flight mutation.
    pub fn begin(
        &mut self,
        cache: &mut PageCache,
        updates: &[PositionUpdate],
    ) -> Result<MutationHandle, EngineError> {
        self.ensure_free(updates.iter().map(|u| u.card_id))?;

        let mut working: HashMap<CardId, Card> = HashMap::new();
        let mut touched = Vec::with_capacity(updates.len());
        for update in updates {
            let before = match working.get(&update.card_id) {
                Some(card) => card.clone(),
                None => cache
                    .get(update.card_id)
                    .cloned()
                    .ok_or(EngineError::CardNotFound(update.card_id))?,
            };
            let after = before.placed(&update.column, update.position);
            working.insert(update.card_id, after.clone());
            touched.push(Touched {
                card_id: update.card_id,
                before,
                applied: Applied::Upserted(after),
            });
        }

        cache.upsert_many(touched.iter().filter_map(|t| match &t.applied {
            Applied::Upserted(card) => Some(card.clone()),
            Applied::Removed => None,
        }));
        Ok(self.register(touched))
    }

    /// Remove a card optimistically.
    pub fn begin_delete(
        &mut self,
        cache: &mut PageCache,
        card_id: CardId,
    ) -> Result<MutationHandle, EngineError> {
        self.ensure_free([card_id])?;
        let before = cache
            .remove(card_id)
            .ok_or(EngineError::CardNotFound(card_id))?;
        self.pending_deletes.insert(card_id);
        Ok(self.register(vec![Touched {
            card_id,
            before,
            applied: Applied::Removed,
        }]))
    }

    /// The write landed; forget the snapshot.
    pub fn commit(&mut self, handle: MutationHandle) {
        self.release(&handle);
    }

    /// The write failed; put touched cards back, newest touch first.
    pub fn rollback(&mut self, cache: &mut PageCache, handle: MutationHandle) -> RollbackReport {
        let remote: HashSet<CardId> = handle
            .removed_ids()
            .into_iter()
            .filter(|id| self.deleted_remotely.contains(id))
            .collect();
        self.release(&handle);
        let mut report = RollbackReport::default();

        for touched in handle.touched.into_iter().rev() {
            let verdict = match (&touched.applied, cache.get(touched.card_id)) {
                (Applied::Upserted(applied), Some(current)) if current == applied => {
                    Verdict::Restore
                }
                (Applied::Upserted(_), Some(_)) => Verdict::KeepNewer,
                (Applied::Upserted(_), None) => Verdict::StayDeleted,
                (Applied::Removed, None) if remote.contains(&touched.card_id) => {
                    Verdict::StayDeleted
                }
                (Applied::Removed, None) => Verdict::Restore,
                (Applied::Removed, Some(_)) => Verdict::KeepNewer,
            };
            match verdict {
                Verdict::Restore => {
                    report.restored.push(touched.card_id);
                    cache.upsert(touched.before);
                }
                Verdict::KeepNewer => {
                    log::debug!(
                        "[boardsync.optimistic] Card {} changed since patch, keeping newer value",
                        touched.card_id
                    );
                    report.kept_newer.push(touched.card_id);
                }
                Verdict::StayDeleted => {
                    log::debug!(
                        "[boardsync.optimistic] Card {} deleted since patch, skipping rollback",
                        touched.card_id
                    );
                    report.deleted_meanwhile.push(touched.card_id);
                }
            }
        }
        report
    }

    pub fn is_in_flight(&self, card_id: CardId) -> bool {
        self.in_flight.values().any(|ids| ids.contains(&card_id))
    }

    /// Whether an in-flight delete removed this card.
    pub fn is_pending_delete(&self, card_id: CardId) -> bool {
        self.pending_deletes.contains(&card_id)
    }

    /// The server reported `card_id` deleted. A pending delete of that card
    /// must not bring it back on rollback. Returns whether one was pending.
    pub fn note_deleted(&mut self, card_id: CardId) -> bool {
        if !self.pending_deletes.contains(&card_id) {
            return false;
        }
        log::debug!(
            "[boardsync.optimistic] Card {} deleted remotely while our delete is in flight",
            card_id
        );
        self.deleted_remotely.insert(card_id);
        true
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn ensure_free(&self, ids: impl IntoIterator<Item = CardId>) -> Result<(), EngineError> {
        for id in ids {
            if self.is_in_flight(id) {
                return Err(EngineError::WriteInFlight(id));
            }
        }
        Ok(())
    }

    fn release(&mut self, handle: &MutationHandle) {
        self.in_flight.remove(&handle.id);
        for id in handle.removed_ids() {
            self.pending_deletes.remove(&id);
            self.deleted_remotely.remove(&id);
        }
    }

    fn register(&mut self, touched: Vec<Touched>) -> MutationHandle {
        let id = self.next_id;
        self.next_id += 1;
        let handle = MutationHandle { id, touched };
        self.in_flight.insert(id, handle.card_ids());
        handle
    }
}
