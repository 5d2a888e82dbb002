//! Position model: how a card's rank inside a column is represented.
//!
//! Positions are plain integers. Only relative order matters; gaps are
//! tolerated between renumbers. Moves never produce fractional ranks: when a
//! card lands between two neighbours without room, the column is renumbered
//! densely (`0..n-1`) instead.
use std::cmp::Ordering;

use crate::types::{Card, CardId, Position};

/// Order two cards of the same column. Equal positions fall back to id so
/// the order is total and stable across clients.
pub fn compare_position(a: &Card, b: &Card) -> Ordering {
    a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id))
}

/// Position for a card appended after every card in the column.
pub fn next_position(column_cards: &[&Card]) -> Position {
    column_cards
        .iter()
        .map(|c| c.position)
        .max()
        .map_or(0, |max| max + 1)
}

/// Outcome of asking for a slot at a given index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// This position is strictly between the neighbours; only the inserted
    /// card needs a new rank.
    Free(Position),
    /// No integer fits between the neighbours; the column must be renumbered.
    Renumber,
}

/// Find a position for a card inserted at `index` of an ordered column.
///
/// `index` is clamped to `0..=len`. Appending always finds room. Prepending
/// finds room while the head sits above zero.
pub fn insert_at(column_cards: &[&Card], index: usize) -> Slot {
    let index = index.min(column_cards.len());
    let prev = index.checked_sub(1).and_then(|i| column_cards.get(i));
    let next = column_cards.get(index);
    match (prev, next) {
        (None, None) => Slot::Free(0),
        (Some(_), None) => Slot::Free(next_position(column_cards)),
        (None, Some(next)) if next.position > 0 => Slot::Free(next.position - 1),
        (Some(prev), Some(next)) if next.position - prev.position > 1 => {
            Slot::Free(prev.position + 1)
        }
        _ => Slot::Renumber,
    }
}

/// Dense `0..n-1` ranks for cards in their final order.
pub fn renumber(ordered: &[CardId]) -> Vec<(CardId, Position)> {
    ordered
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i as Position))
        .collect()
}

/// True when the column's positions are exactly `0..n-1` in order.
pub fn is_dense(column_cards: &[&Card]) -> bool {
    column_cards
        .iter()
        .enumerate()
        .all(|(i, c)| c.position == i as Position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cards(positions: &[Position]) -> Vec<Card> {
        positions
            .iter()
            .enumerate()
            .map(|(i, p)| Card::new(i as CardId + 1, "todo", *p))
            .collect()
    }

    fn refs(cards: &[Card]) -> Vec<&Card> {
        cards.iter().collect()
    }

    #[test]
    fn test_compare_breaks_ties_by_id() {
        let a = Card::new(2, "todo", 1);
        let b = Card::new(1, "todo", 1);
        let c = Card::new(3, "todo", 0);
        assert_eq!(compare_position(&a, &b), Ordering::Greater);
        assert_eq!(compare_position(&c, &b), Ordering::Less);
    }

    #[test]
    fn test_next_position() {
        assert_eq!(next_position(&[]), 0);
        let col = cards(&[0, 4, 2]);
        assert_eq!(next_position(&refs(&col)), 5);
    }

    #[test]
    fn test_insert_at_edges() {
        let col = cards(&[0, 1, 2]);
        assert_eq!(insert_at(&refs(&col), 3), Slot::Free(3));
        assert_eq!(insert_at(&refs(&col), 99), Slot::Free(3));
        assert_eq!(insert_at(&refs(&col), 0), Slot::Renumber);
        assert_eq!(insert_at(&[], 0), Slot::Free(0));

        let shifted = cards(&[3, 4]);
        assert_eq!(insert_at(&refs(&shifted), 0), Slot::Free(2));
    }

    #[test]
    fn test_insert_at_between_neighbours() {
        let gapped = cards(&[0, 5, 6]);
        assert_eq!(insert_at(&refs(&gapped), 1), Slot::Free(1));
        assert_eq!(insert_at(&refs(&gapped), 2), Slot::Renumber);
    }

    #[test]
    fn test_renumber_is_dense() {
        let ranks = renumber(&[9, 4, 7]);
        assert_eq!(ranks, vec![(9, 0), (4, 1), (7, 2)]);
    }

    #[test]
    fn test_is_dense() {
        assert!(is_dense(&refs(&cards(&[0, 1, 2]))));
        assert!(!is_dense(&refs(&cards(&[0, 2]))));
        assert!(is_dense(&[]));
    }
}
