use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Server-assigned card identity.
pub type CardId = i64;

/// Rank of a card within its column.
pub type Position = i64;

/// A workflow ticket as seen by the ordering engine.
///
/// Only `id`, `column`, `position` and the soft-delete flag matter here.
/// Every other field the server sends is kept in `fields` and written back
/// untouched. Wire names follow the ticket store (`columna`, `posicion`,
/// `eliminado`); the English names are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    #[serde(rename = "columna", alias = "column")]
    pub column: String,
    #[serde(
        rename = "posicion",
        alias = "position",
        default,
        deserialize_with = "position_or_zero"
    )]
    pub position: Position,
    #[serde(
        rename = "eliminado",
        alias = "deleted",
        default,
        deserialize_with = "flag_or_false",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub deleted: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Card {
    pub fn new(id: CardId, column: impl Into<String>, position: Position) -> Self {
        Self {
            id,
            column: column.into(),
            position,
            deleted: false,
            fields: Map::new(),
        }
    }

    /// Builder-style helper for attaching an opaque business field.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Copy of this card placed at `column`/`position`, payload untouched.
    pub fn placed(&self, column: &str, position: Position) -> Self {
        let mut card = self.clone();
        card.column = column.to_string();
        card.position = position;
        card
    }

    pub fn is_at(&self, column: &str, position: Position) -> bool {
        self.column == column && self.position == position
    }
}

fn position_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<Position, D::Error> {
    Ok(Option::<Position>::deserialize(d)?.unwrap_or(0))
}

fn flag_or_false<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(false))
}

/// `{ card_id, column, position }`: the unit shipped in a batch write and
/// carried by reorder push events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    #[serde(rename = "id", alias = "card_id")]
    pub card_id: CardId,
    #[serde(rename = "columna", alias = "column")]
    pub column: String,
    #[serde(rename = "posicion", alias = "position")]
    pub position: Position,
}

impl PositionUpdate {
    pub fn new(card_id: CardId, column: impl Into<String>, position: Position) -> Self {
        Self {
            card_id,
            column: column.into(),
            position,
        }
    }
}

/// Body of `PUT /api/tarjetas/batch/positions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionBatch {
    pub items: Vec<PositionUpdate>,
}

/// Workflow column reference data (`GET /api/columnas`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wip_limit: Option<u32>,
    #[serde(default)]
    pub is_done_column: bool,
}

impl ColumnDef {
    pub fn new(key: &str, title: &str, position: i64) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            position,
            wip_limit: None,
            is_done_column: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub pages: u32,
    pub has_next: bool,
    #[serde(default)]
    pub has_prev: bool,
}

/// One bounded slice of cards returned by a board fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(alias = "tarjetas")]
    pub cards: Vec<Card>,
    pub pagination: Pagination,
}

/// A column of the merged view, ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnView {
    pub key: String,
    pub title: String,
    pub cards: Vec<Card>,
}

/// De-duplicated, column-partitioned aggregate of every fetched page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub version: u64,
    pub columns: Vec<ColumnView>,
}

impl BoardView {
    pub fn column(&self, key: &str) -> Option<&ColumnView> {
        self.columns.iter().find(|c| c.key == key)
    }

    /// Card ids of `key` in rendered order (empty when the column is unknown).
    pub fn ids(&self, key: &str) -> Vec<CardId> {
        self.column(key)
            .map(|c| c.cards.iter().map(|card| card.id).collect())
            .unwrap_or_default()
    }
}
