use std::future::Future;

use crate::error::ApiError;
use crate::query::BoardQuery;
use crate::types::{CardId, ColumnDef, Page, PositionUpdate};

/// The authoritative ticket store, as seen by a board session.
/// Implementations: `HttpBoardApi` (boardsync-client); tests use an in-memory store.
pub trait BoardApi: Send + Sync + 'static {
    /// `GET /api/tarjetas?<filters>&page=N&per_page=M`
    fn fetch_page(
        &self,
        query: &BoardQuery,
        page: u32,
        per_page: u32,
    ) -> impl Future<Output = Result<Page, ApiError>> + Send;

    /// `PUT /api/tarjetas/batch/positions` with `{ items }`.
    fn put_positions(
        &self,
        items: &[PositionUpdate],
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `DELETE /api/tarjetas/{id}` (soft delete).
    fn delete_card(&self, card_id: CardId) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `GET /api/columnas`
    fn fetch_columns(&self) -> impl Future<Output = Result<Vec<ColumnDef>, ApiError>> + Send;
}
