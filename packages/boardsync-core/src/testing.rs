//! In-memory ticket store for tests.
//!
//! Fetches and writes can be held behind semaphore gates so a test can
//! interleave pushes and commands with a request that is still in flight.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Semaphore;

use crate::api::BoardApi;
use crate::error::{ApiError, ErrorEnvelope};
use crate::query::{BoardQuery, QueryKey};
use crate::types::{Card, CardId, ColumnDef, Page, Pagination, PositionUpdate};

pub fn page(number: u32, cards: Vec<Card>, has_next: bool) -> Page {
    Page {
        pagination: Pagination {
            page: number,
            per_page: cards.len() as u32,
            total: 0,
            pages: 0,
            has_next,
            has_prev: number > 1,
        },
        cards,
    }
}

pub struct MemoryApi {
    pages: Mutex<HashMap<(QueryKey, u32), Page>>,
    columns: Mutex<Vec<ColumnDef>>,
    failing_pages: Mutex<HashSet<u32>>,
    fail_writes: AtomicBool,
    writes: Mutex<Vec<Vec<PositionUpdate>>>,
    write_attempts: AtomicUsize,
    deletes: Mutex<Vec<CardId>>,
    fetches: Mutex<Vec<(QueryKey, u32)>>,
    active_fetches: AtomicUsize,
    max_active_fetches: AtomicUsize,
    page_gate: Semaphore,
    write_gate: Semaphore,
}

fn rejected(status: u16, message: &str) -> ApiError {
    ApiError::Rejected {
        status,
        envelope: ErrorEnvelope::from_body(status, message),
    }
}

impl MemoryApi {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            columns: Mutex::new(Vec::new()),
            failing_pages: Mutex::new(HashSet::new()),
            fail_writes: AtomicBool::new(false),
            writes: Mutex::new(Vec::new()),
            write_attempts: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            active_fetches: AtomicUsize::new(0),
            max_active_fetches: AtomicUsize::new(0),
            page_gate: Semaphore::new(Semaphore::MAX_PERMITS),
            write_gate: Semaphore::new(Semaphore::MAX_PERMITS),
        }
    }

    /// Page fetches block until `release_pages` hands out permits.
    pub fn holding_pages(mut self) -> Self {
        self.page_gate = Semaphore::new(0);
        self
    }

    /// Writes and deletes block until `release_writes` hands out permits.
    pub fn holding_writes(mut self) -> Self {
        self.write_gate = Semaphore::new(0);
        self
    }

    pub fn with_page(self, query: &BoardQuery, page: Page) -> Self {
        self.set_page(query, page);
        self
    }

    pub fn with_columns(self, columns: Vec<ColumnDef>) -> Self {
        *self.columns.lock().unwrap() = columns;
        self
    }

    pub fn set_page(&self, query: &BoardQuery, page: Page) {
        self.pages
            .lock()
            .unwrap()
            .insert((query.key(), page.pagination.page), page);
    }

    pub fn fail_page(&self, number: u32, fail: bool) {
        let mut failing = self.failing_pages.lock().unwrap();
        if fail {
            failing.insert(number);
        } else {
            failing.remove(&number);
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn release_pages(&self, n: usize) {
        self.page_gate.add_permits(n);
    }

    pub fn release_writes(&self, n: usize) {
        self.write_gate.add_permits(n);
    }

    /// Successful batch writes, in order.
    pub fn writes(&self) -> Vec<Vec<PositionUpdate>> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> Vec<CardId> {
        self.deletes.lock().unwrap().clone()
    }

    /// Page numbers requested, in order, per query key.
    pub fn fetched_pages(&self, query: &BoardQuery) -> Vec<u32> {
        let key = query.key();
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, p)| *p)
            .collect()
    }

    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_active_fetches.load(Ordering::SeqCst)
    }

    async fn pass(gate: &Semaphore) -> Result<(), ApiError> {
        let permit = gate
            .acquire()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

impl BoardApi for MemoryApi {
    async fn fetch_page(
        &self,
        query: &BoardQuery,
        page: u32,
        _per_page: u32,
    ) -> Result<Page, ApiError> {
        let key = query.key();
        self.fetches.lock().unwrap().push((key.clone(), page));
        let active = self.active_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_fetches.fetch_max(active, Ordering::SeqCst);

        let gated = Self::pass(&self.page_gate).await;
        self.active_fetches.fetch_sub(1, Ordering::SeqCst);
        gated?;

        if self.failing_pages.lock().unwrap().contains(&page) {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        self.pages
            .lock()
            .unwrap()
            .get(&(key, page))
            .cloned()
            .ok_or_else(|| rejected(404, "page not found"))
    }

    async fn put_positions(&self, items: &[PositionUpdate]) -> Result<(), ApiError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        Self::pass(&self.write_gate).await?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(rejected(
                400,
                r#"{"code":"bad_request","message":"Límite WIP alcanzado","details":null}"#,
            ));
        }
        self.writes.lock().unwrap().push(items.to_vec());
        Ok(())
    }

    async fn delete_card(&self, card_id: CardId) -> Result<(), ApiError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        Self::pass(&self.write_gate).await?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(rejected(404, r#"{"detail":"Tarjeta no encontrada"}"#));
        }
        self.deletes.lock().unwrap().push(card_id);
        Ok(())
    }

    async fn fetch_columns(&self) -> Result<Vec<ColumnDef>, ApiError> {
        Ok(self.columns.lock().unwrap().clone())
    }
}
