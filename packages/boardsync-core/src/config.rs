//! Engine tuning shared by every board session.
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The ticket store caps `per_page` at this value.
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Quiet period before a burst of remote reorders is applied.
    #[serde(default = "default_reorder_debounce_ms")]
    pub reorder_debounce_ms: u64,
    /// Delay after a page lands before the next one is fetched automatically.
    #[serde(default = "default_page_idle_ms")]
    pub page_idle_ms: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_true")]
    pub auto_paginate: bool,
    /// Capacity of the session event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_reorder_debounce_ms() -> u64 {
    150
}

fn default_page_idle_ms() -> u64 {
    250
}

fn default_per_page() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reorder_debounce_ms: default_reorder_debounce_ms(),
            page_idle_ms: default_page_idle_ms(),
            per_page: default_per_page(),
            auto_paginate: default_true(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn reorder_debounce(&self) -> Duration {
        Duration::from_millis(self.reorder_debounce_ms)
    }

    pub fn page_idle(&self) -> Duration {
        Duration::from_millis(self.page_idle_ms)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    pub fn event_capacity(&self) -> usize {
        self.event_capacity.max(1)
    }
}
