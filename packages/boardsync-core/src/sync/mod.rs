pub mod pagination;
pub mod push;
pub mod reorder_buffer;
