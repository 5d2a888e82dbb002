//! Reorder planner: turns a finished drag into position updates.
//!
//! The dragged card is taken out of its column, put back at the drop index
//! of the destination column, and every column whose membership or order
//! changed is renumbered densely. Only cards whose (column, position)
//! actually changed are emitted, so appending to a dense column yields a
//! single update.
use serde::{Deserialize, Serialize};

use crate::cache::PageCache;
use crate::error::EngineError;
use crate::position;
use crate::types::{CardId, PositionUpdate};

/// "Drag ended: move card X to column C before card Y" as reported by the
/// rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragOutcome {
    pub card_id: CardId,
    pub source_column: String,
    pub dest_column: String,
    /// Card the dragged card should land before; `None` drops at the end.
    #[serde(default)]
    pub before_card: Option<CardId>,
    /// Drop index in the destination column with the dragged card removed.
    /// Used when `before_card` is absent or no longer in that column.
    #[serde(default)]
    pub dest_index: Option<usize>,
}

impl DragOutcome {
    pub fn to_end(card_id: CardId, source: &str, dest: &str) -> Self {
        Self {
            card_id,
            source_column: source.to_string(),
            dest_column: dest.to_string(),
            before_card: None,
            dest_index: None,
        }
    }

    pub fn to_index(card_id: CardId, source: &str, dest: &str, index: usize) -> Self {
        Self {
            dest_index: Some(index),
            ..Self::to_end(card_id, source, dest)
        }
    }

    pub fn before(card_id: CardId, source: &str, dest: &str, before: CardId) -> Self {
        Self {
            before_card: Some(before),
            ..Self::to_end(card_id, source, dest)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    pub card_id: CardId,
    /// Column the card was actually in when the plan was made.
    pub source_column: String,
    pub dest_column: String,
    /// Resolved index in the destination column.
    pub dest_index: usize,
    pub updates: Vec<PositionUpdate>,
}

impl ReorderPlan {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn crosses_columns(&self) -> bool {
        self.source_column != self.dest_column
    }
}

/// Plan a move against the current cache contents.
///
/// The card's current column in the cache is authoritative; the gesture's
/// source column is only a hint. A stale drop target is clamped into
/// `0..=len` instead of failing.
pub fn plan_reorder(cache: &PageCache, drag: &DragOutcome) -> Result<ReorderPlan, EngineError> {
    let card = cache
        .get(drag.card_id)
        .ok_or(EngineError::CardNotFound(drag.card_id))?;
    let source_column = card.column.clone();
    if source_column != drag.source_column {
        log::debug!(
            "[boardsync.reorder] Card {} moved to '{}' during drag (gesture saw '{}')",
            drag.card_id,
            source_column,
            drag.source_column
        );
    }

    let mut source_ids = cache.column_ids(&source_column);
    source_ids.retain(|id| *id != drag.card_id);

    let same_column = source_column == drag.dest_column;
    let mut dest_ids = if same_column {
        source_ids.clone()
    } else {
        cache.column_ids(&drag.dest_column)
    };

    let dest_index = resolve_index(&dest_ids, drag);
    dest_ids.insert(dest_index, drag.card_id);

    let mut updates = diff_ranks(cache, &drag.dest_column, &dest_ids);
    if !same_column {
        updates.extend(diff_ranks(cache, &source_column, &source_ids));
    }

    Ok(ReorderPlan {
        card_id: drag.card_id,
        source_column,
        dest_column: drag.dest_column.clone(),
        dest_index,
        updates,
    })
}

fn resolve_index(dest_ids: &[CardId], drag: &DragOutcome) -> usize {
    let by_anchor = drag
        .before_card
        .filter(|anchor| *anchor != drag.card_id)
        .and_then(|anchor| dest_ids.iter().position(|id| *id == anchor));
    match by_anchor.or(drag.dest_index) {
        Some(index) => index.min(dest_ids.len()),
        None => dest_ids.len(),
    }
}

fn diff_ranks(cache: &PageCache, column: &str, ordered: &[CardId]) -> Vec<PositionUpdate> {
    position::renumber(ordered)
        .into_iter()
        .filter(|(id, rank)| {
            cache
                .get(*id)
                .map_or(true, |card| !card.is_at(column, *rank))
        })
        .map(|(id, rank)| PositionUpdate::new(id, column, rank))
        .collect()
}
