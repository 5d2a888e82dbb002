//! Pagination driver: fills the merged view for the active query, one page
//! at a time.
//!
//! At most one fetch is outstanding. After a page lands, the next one is
//! requested once an idle delay has passed. Every request carries the
//! generation of the query it was made for; a result from an older
//! generation is discarded. A failed page is not retried automatically, the
//! next explicit fetch asks for the same page again.
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::PageCache;
use crate::config::EngineConfig;
use crate::error::{ApiError, EngineError};
use crate::query::BoardQuery;
use crate::types::Page;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: u64,
    pub query: BoardQuery,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Merged {
        page: u32,
        /// Cards that were new or changed by this page.
        changed: usize,
        has_next: bool,
    },
    /// Result for a query that is no longer active; nothing was merged.
    Stale,
    Failed { page: u32, error: EngineError },
}

#[derive(Debug)]
pub struct PaginationDriver {
    query: BoardQuery,
    generation: u64,
    per_page: u32,
    idle: Duration,
    auto: bool,
    next_page: u32,
    has_next: bool,
    in_flight: Option<u32>,
    idle_deadline: Option<Instant>,
    failed_page: Option<u32>,
}

impl PaginationDriver {
    pub fn new(query: BoardQuery, config: &EngineConfig) -> Self {
        Self {
            query,
            generation: 0,
            per_page: config.per_page(),
            idle: config.page_idle(),
            auto: config.auto_paginate,
            next_page: 1,
            has_next: true,
            in_flight: None,
            idle_deadline: None,
            failed_page: None,
        }
    }

    pub fn query(&self) -> &BoardQuery {
        &self.query
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Page that last failed, while the board is only partially loaded.
    pub fn failed_page(&self) -> Option<u32> {
        self.failed_page
    }

    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }

    /// Switch to a new filter set. The fetch in flight, if any, becomes
    /// stale and paging restarts at page 1.
    pub fn set_query(&mut self, query: BoardQuery) {
        self.generation += 1;
        log::debug!(
            "[boardsync.pagination] Query changed to {} (generation {})",
            query.key(),
            self.generation
        );
        self.query = query;
        self.next_page = 1;
        self.has_next = true;
        self.in_flight = None;
        self.idle_deadline = None;
        self.failed_page = None;
    }

    /// Next page to fetch, or `None` while one is outstanding or the query
    /// is exhausted.
    pub fn next_request(&mut self) -> Option<PageRequest> {
        if self.in_flight.is_some() || !self.has_next {
            return None;
        }
        self.idle_deadline = None;
        self.in_flight = Some(self.next_page);
        Some(PageRequest {
            generation: self.generation,
            query: self.query.clone(),
            page: self.next_page,
            per_page: self.per_page,
        })
    }

    /// The idle delay elapsed: hand out the next request.
    pub fn take_idle_due(&mut self, now: Instant) -> Option<PageRequest> {
        match self.idle_deadline {
            Some(deadline) if deadline <= now => {
                self.idle_deadline = None;
                self.next_request()
            }
            _ => None,
        }
    }

    /// Merge a finished fetch. Cards are upserted by id, so a card seen on
    /// two pages keeps its first slot and takes the later page's data.
    pub fn complete(
        &mut self,
        cache: &mut PageCache,
        request: &PageRequest,
        result: Result<Page, ApiError>,
        now: Instant,
    ) -> PageOutcome {
        if request.generation != self.generation {
            log::debug!(
                "[boardsync.pagination] Discarding page {} of stale query {}",
                request.page,
                request.query.key()
            );
            return PageOutcome::Stale;
        }
        self.in_flight = None;

        match result {
            Ok(page) => {
                let has_next = page.pagination.has_next;
                let changed = cache.upsert_many(page.cards);
                self.next_page = request.page + 1;
                self.has_next = has_next;
                self.failed_page = None;
                if has_next && self.auto {
                    self.idle_deadline = Some(now + self.idle);
                }
                log::debug!(
                    "[boardsync.pagination] Merged page {} ({} card(s) changed, has_next={})",
                    request.page,
                    changed,
                    has_next
                );
                PageOutcome::Merged {
                    page: request.page,
                    changed,
                    has_next,
                }
            }
            Err(e) => {
                log::warn!(
                    "[boardsync.pagination] Page {} failed, board partially loaded: {}",
                    request.page,
                    e
                );
                self.failed_page = Some(request.page);
                PageOutcome::Failed {
                    page: request.page,
                    error: EngineError::PageFetch {
                        page: request.page,
                        source: e,
                    },
                }
            }
        }
    }
}
