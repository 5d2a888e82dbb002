//! Boardsync core: client-side ordering and consistency engine for a
//! paginated kanban board.
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod mutation;
pub mod position;
pub mod query;
pub mod session;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use api::BoardApi;
pub use cache::PageCache;
pub use config::EngineConfig;
pub use error::{ApiError, EngineError, ErrorEnvelope};
pub use mutation::reorder::{plan_reorder, DragOutcome, ReorderPlan};
pub use query::{BoardQuery, QueryKey};
pub use session::{spawn_session, SessionEvent, SessionHandle};
pub use sync::push::PushFrame;
pub use types::{BoardView, Card, CardId, ColumnDef, Page, Position, PositionUpdate};
