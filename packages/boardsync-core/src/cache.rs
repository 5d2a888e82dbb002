//! Page cache: the single owned store behind the merged view.
//!
//! Cards are keyed by id. Each card keeps the slot of its first arrival so
//! the flattened order is insertion-stable, while its data always reflects
//! the last upsert. Per-column groupings are memoized and dropped on every
//! mutation, then rebuilt on the next read, so a burst of events costs one
//! regroup instead of one per event.
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};

use crate::position::compare_position;
use crate::types::{BoardView, Card, CardId, ColumnDef, ColumnView, PositionUpdate};

#[derive(Debug, Clone)]
struct Entry {
    card: Card,
    /// First-arrival slot, kept across upserts of the same id.
    seq: u64,
}

#[derive(Debug, Clone, Default)]
struct Grouping {
    flat: Vec<CardId>,
    by_column: BTreeMap<String, Vec<CardId>>,
}

#[derive(Debug, Default)]
pub struct PageCache {
    entries: HashMap<CardId, Entry>,
    next_seq: u64,
    /// Monotonic counter, bumped once per mutation pass that changed something.
    version: u64,
    grouping: OnceCell<Grouping>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains(&self, id: CardId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: CardId) -> Option<&Card> {
        self.entries.get(&id).map(|e| &e.card)
    }

    /// Insert or replace a card by id. A card flagged deleted is removed
    /// instead. Returns whether anything changed; repeating the same upsert
    /// is a no-op.
    pub fn upsert(&mut self, card: Card) -> bool {
        let changed = self.upsert_entry(card);
        if changed {
            self.touch();
        }
        changed
    }

    /// Upsert many cards as one mutation pass.
    pub fn upsert_many(&mut self, cards: impl IntoIterator<Item = Card>) -> usize {
        let mut changed = 0;
        for card in cards {
            if self.upsert_entry(card) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.touch();
        }
        changed
    }

    /// Remove a card. Unknown ids are a no-op: pushes may arrive after a
    /// local delete already took the card out.
    pub fn remove(&mut self, id: CardId) -> Option<Card> {
        let removed = self.entries.remove(&id).map(|e| e.card);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Apply position updates in one pass, in order (a later update for the
    /// same card wins). Updates for cards not in the cache are skipped.
    pub fn apply_positions(&mut self, updates: &[PositionUpdate]) -> usize {
        let mut changed = 0;
        for update in updates {
            let Some(entry) = self.entries.get_mut(&update.card_id) else {
                log::debug!(
                    "[boardsync.cache] Skipping position update for unloaded card {}",
                    update.card_id
                );
                continue;
            };
            if !entry.card.is_at(&update.column, update.position) {
                entry.card.column = update.column.clone();
                entry.card.position = update.position;
                changed += 1;
            }
        }
        if changed > 0 {
            self.touch();
        }
        changed
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.touch();
        }
    }

    /// Cards of one column, ordered by position.
    pub fn get_column(&self, key: &str) -> Vec<&Card> {
        self.grouping()
            .by_column
            .get(key)
            .map(|ids| self.resolve(ids))
            .unwrap_or_default()
    }

    /// Card ids of one column, ordered by position.
    pub fn column_ids(&self, key: &str) -> Vec<CardId> {
        self.grouping()
            .by_column
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Every column key that currently holds at least one card.
    pub fn column_keys(&self) -> Vec<String> {
        self.grouping().by_column.keys().cloned().collect()
    }

    /// All cards in first-arrival order.
    pub fn flatten(&self) -> Vec<&Card> {
        self.resolve(&self.grouping().flat)
    }

    /// Render the merged view. Columns follow the reference data order;
    /// keys seen on cards but missing from `columns` come last, by key.
    pub fn view(&self, columns: &[ColumnDef]) -> BoardView {
        let mut defs: Vec<&ColumnDef> = columns.iter().collect();
        defs.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.key.cmp(&b.key)));

        let mut out: Vec<ColumnView> = defs
            .iter()
            .map(|def| ColumnView {
                key: def.key.clone(),
                title: def.title.clone(),
                cards: self.get_column(&def.key).into_iter().cloned().collect(),
            })
            .collect();

        for key in self.column_keys() {
            if !columns.iter().any(|def| def.key == key) {
                out.push(ColumnView {
                    title: key.clone(),
                    cards: self.get_column(&key).into_iter().cloned().collect(),
                    key,
                });
            }
        }

        BoardView {
            version: self.version,
            columns: out,
        }
    }

    fn upsert_entry(&mut self, card: Card) -> bool {
        if card.deleted {
            return self.entries.remove(&card.id).is_some();
        }
        match self.entries.get_mut(&card.id) {
            Some(entry) if entry.card == card => false,
            Some(entry) => {
                entry.card = card;
                true
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.insert(card.id, Entry { card, seq });
                true
            }
        }
    }

    fn touch(&mut self) {
        self.version += 1;
        self.grouping.take();
    }

    fn grouping(&self) -> &Grouping {
        self.grouping.get_or_init(|| self.build_grouping())
    }

    fn build_grouping(&self) -> Grouping {
        let mut all: Vec<&Entry> = self.entries.values().collect();
        all.sort_by_key(|e| e.seq);

        let mut by_column: BTreeMap<String, Vec<&Card>> = BTreeMap::new();
        for entry in &all {
            by_column
                .entry(entry.card.column.clone())
                .or_default()
                .push(&entry.card);
        }

        Grouping {
            flat: all.iter().map(|e| e.card.id).collect(),
            by_column: by_column
                .into_iter()
                .map(|(key, mut cards)| {
                    cards.sort_by(|a, b| compare_position(a, b));
                    (key, cards.iter().map(|c| c.id).collect())
                })
                .collect(),
        }
    }

    fn resolve(&self, ids: &[CardId]) -> Vec<&Card> {
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }
}
