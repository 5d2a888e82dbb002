pub mod batch;
pub mod optimistic;
pub mod reorder;
