//! Board session: the single writer behind one board.
//!
//! One task owns the page cache and everything that mutates it. Commands,
//! push frames, network completions and the two timers (reorder buffer,
//! pagination idle) are all handled on that task in arrival order, so no
//! lock guards the cache. Network calls run on spawned tasks and report back
//! over an internal channel.
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::api::BoardApi;
use crate::cache::PageCache;
use crate::config::EngineConfig;
use crate::error::{ApiError, EngineError};
use crate::mutation::batch::BatchWriter;
use crate::mutation::optimistic::{MutationHandle, OptimisticMutator, RollbackReport};
use crate::mutation::reorder::{plan_reorder, DragOutcome, ReorderPlan};
use crate::query::BoardQuery;
use crate::sync::pagination::{PageOutcome, PageRequest, PaginationDriver};
use crate::sync::push::{PushFrame, PushReconciler};
use crate::sync::reorder_buffer::ReorderBuffer;
use crate::types::{BoardView, CardId, ColumnDef, Page, PositionUpdate};

const COMMAND_CAPACITY: usize = 64;

/// Notifications for the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The merged view changed; take a new snapshot.
    CacheChanged { version: u64 },
    WriteConfirmed {
        mutation: u64,
        card_ids: Vec<CardId>,
    },
    /// A write failed and its optimistic patch was rolled back.
    WriteFailed {
        mutation: u64,
        card_ids: Vec<CardId>,
        error: EngineError,
        report: RollbackReport,
    },
    PageLoaded { page: u32, has_next: bool },
    /// The board is partially loaded; `fetch_next` retries this page.
    PageFailed { page: u32, error: EngineError },
    ColumnsLoaded { count: usize },
}

enum SessionCommand {
    MoveCard {
        drag: DragOutcome,
        reply: oneshot::Sender<Result<ReorderPlan, EngineError>>,
    },
    DeleteCard {
        card_id: CardId,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    SetQuery(BoardQuery),
    FetchNext {
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<BoardView>,
    },
    Shutdown,
}

enum Completion {
    Write {
        generation: u64,
        handle: MutationHandle,
        result: Result<(), EngineError>,
    },
    Page {
        request: PageRequest,
        result: Result<Page, ApiError>,
    },
    Columns(Result<Vec<ColumnDef>, ApiError>),
}

/// Cheap, cloneable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Plan and apply a drag optimistically. Returns once the patch is
    /// visible; the batch write resolves later as a `WriteConfirmed` or
    /// `WriteFailed` event.
    pub async fn move_card(&self, drag: DragOutcome) -> Result<ReorderPlan, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::MoveCard { drag, reply }).await?;
        rx.await.map_err(|_| EngineError::SessionClosed)?
    }

    /// Remove a card optimistically and ask the store to soft-delete it.
    pub async fn delete_card(&self, card_id: CardId) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::DeleteCard { card_id, reply })
            .await?;
        rx.await.map_err(|_| EngineError::SessionClosed)?
    }

    /// Switch filter set. The merged view restarts empty for the new query.
    pub async fn set_query(&self, query: BoardQuery) -> Result<(), EngineError> {
        self.send(SessionCommand::SetQuery(query)).await
    }

    /// Fetch the next page now. Returns false while a fetch is outstanding
    /// or the query is exhausted.
    pub async fn fetch_next(&self) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::FetchNext { reply }).await?;
        rx.await.map_err(|_| EngineError::SessionClosed)
    }

    pub async fn snapshot(&self) -> Result<BoardView, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| EngineError::SessionClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }

    async fn send(&self, command: SessionCommand) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::SessionClosed)
    }
}

/// Start a session task for `query`. Push frames are read from `push_rx`
/// until it closes; the session keeps running without pushes after that.
pub fn spawn_session<A: BoardApi>(
    api: Arc<A>,
    config: EngineConfig,
    query: BoardQuery,
    push_rx: mpsc::Receiver<PushFrame>,
) -> (SessionHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (events_tx, _) = broadcast::channel(config.event_capacity());
    let (completions_tx, completions_rx) = mpsc::unbounded_channel();

    let session = Session {
        writer: BatchWriter::new(api.clone()),
        api,
        cache: PageCache::new(),
        columns: Vec::new(),
        mutator: OptimisticMutator::new(),
        reconciler: PushReconciler::new(),
        buffer: ReorderBuffer::new(config.reorder_debounce()),
        pagination: PaginationDriver::new(query, &config),
        events: events_tx.clone(),
        completions: completions_tx,
        published_version: 0,
    };
    let task = tokio::spawn(session.run(commands_rx, push_rx, completions_rx));

    (
        SessionHandle {
            commands: commands_tx,
            events: events_tx,
        },
        task,
    )
}

struct Session<A> {
    api: Arc<A>,
    writer: BatchWriter<A>,
    cache: PageCache,
    columns: Vec<ColumnDef>,
    mutator: OptimisticMutator,
    reconciler: PushReconciler,
    buffer: ReorderBuffer,
    pagination: PaginationDriver,
    events: broadcast::Sender<SessionEvent>,
    completions: mpsc::UnboundedSender<Completion>,
    published_version: u64,
}

impl<A: BoardApi> Session<A> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut push_rx: mpsc::Receiver<PushFrame>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        log::info!(
            "[boardsync.session] Session started for query {}",
            self.pagination.query().key()
        );
        self.load_columns();
        self.fetch_next();

        let mut push_open = true;
        loop {
            let reorder_at = self.buffer.deadline();
            let page_at = self.pagination.idle_deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                frame = push_rx.recv(), if push_open => match frame {
                    Some(frame) => self.on_push(frame),
                    None => {
                        log::info!("[boardsync.session] Push channel closed");
                        push_open = false;
                    }
                },
                Some(done) = completions.recv() => self.on_completion(done),
                _ = sleep_until(reorder_at.unwrap_or_else(Instant::now)), if reorder_at.is_some() => {
                    self.buffer.flush(&mut self.cache);
                }
                _ = sleep_until(page_at.unwrap_or_else(Instant::now)), if page_at.is_some() => {
                    if let Some(request) = self.pagination.take_idle_due(Instant::now()) {
                        self.spawn_fetch(request);
                    }
                }
            }

            self.publish_cache_change();
        }

        log::info!(
            "[boardsync.session] Session stopped ({} push event(s) applied, {} dropped)",
            self.reconciler.applied(),
            self.reconciler.dropped()
        );
    }

    fn on_push(&mut self, frame: PushFrame) {
        let Some(event) = self.reconciler.decode(frame) else {
            return;
        };
        if let Some(id) = event.removed_id() {
            self.mutator.note_deleted(id);
        }
        self.reconciler
            .apply(&mut self.cache, &mut self.buffer, event, Instant::now());
    }

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::MoveCard { drag, reply } => {
                let _ = reply.send(self.move_card(drag));
            }
            SessionCommand::DeleteCard { card_id, reply } => {
                let _ = reply.send(self.delete_card(card_id));
            }
            SessionCommand::SetQuery(query) => self.set_query(query),
            SessionCommand::FetchNext { reply } => {
                let _ = reply.send(self.fetch_next());
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.cache.view(&self.columns));
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn move_card(&mut self, drag: DragOutcome) -> Result<ReorderPlan, EngineError> {
        let plan = plan_reorder(&self.cache, &drag)?;
        if plan.is_noop() {
            return Ok(plan);
        }
        if plan.crosses_columns() {
            self.check_wip(&plan.dest_column)?;
        }
        let handle = self.mutator.begin(&mut self.cache, &plan.updates)?;
        self.spawn_write(handle, plan.updates.clone());
        Ok(plan)
    }

    fn delete_card(&mut self, card_id: CardId) -> Result<(), EngineError> {
        let handle = self.mutator.begin_delete(&mut self.cache, card_id)?;
        let writer = self.writer.clone();
        let completions = self.completions.clone();
        let generation = self.pagination.generation();
        tokio::spawn(async move {
            let result = writer.delete(card_id).await;
            let _ = completions.send(Completion::Write {
                generation,
                handle,
                result,
            });
        });
        Ok(())
    }

    /// A `wip_limit` of zero or none means unlimited. Only loaded cards count.
    fn check_wip(&self, column: &str) -> Result<(), EngineError> {
        let limit = self
            .columns
            .iter()
            .find(|def| def.key == column)
            .and_then(|def| def.wip_limit)
            .filter(|limit| *limit > 0);
        match limit {
            Some(limit) if self.cache.column_ids(column).len() >= limit as usize => {
                Err(EngineError::WipLimitReached {
                    column: column.to_string(),
                    limit,
                })
            }
            _ => Ok(()),
        }
    }

    fn set_query(&mut self, query: BoardQuery) {
        if &query == self.pagination.query() {
            return;
        }
        self.pagination.set_query(query);
        self.buffer.clear();
        self.cache.clear();
        self.fetch_next();
    }

    fn fetch_next(&mut self) -> bool {
        match self.pagination.next_request() {
            Some(request) => {
                self.spawn_fetch(request);
                true
            }
            None => false,
        }
    }

    fn spawn_write(&self, handle: MutationHandle, updates: Vec<PositionUpdate>) {
        let writer = self.writer.clone();
        let completions = self.completions.clone();
        let generation = self.pagination.generation();
        tokio::spawn(async move {
            let result = writer.send(updates).await;
            let _ = completions.send(Completion::Write {
                generation,
                handle,
                result,
            });
        });
    }

    fn spawn_fetch(&self, request: PageRequest) {
        let api = self.api.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = api
                .fetch_page(&request.query, request.page, request.per_page)
                .await;
            let _ = completions.send(Completion::Page { request, result });
        });
    }

    fn load_columns(&self) {
        let api = self.api.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = api.fetch_columns().await;
            let _ = completions.send(Completion::Columns(result));
        });
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Write {
                generation,
                handle,
                result,
            } => self.on_write(generation, handle, result),
            Completion::Page { request, result } => {
                // A card we are deleting must not reappear from a page
                // fetched before the store saw the delete.
                let result = result.map(|mut page| {
                    page.cards
                        .retain(|card| !self.mutator.is_pending_delete(card.id));
                    page
                });
                match self
                    .pagination
                    .complete(&mut self.cache, &request, result, Instant::now())
                {
                    PageOutcome::Merged { page, has_next, .. } => {
                        self.emit(SessionEvent::PageLoaded { page, has_next });
                    }
                    PageOutcome::Failed { page, error } => {
                        self.emit(SessionEvent::PageFailed { page, error });
                    }
                    PageOutcome::Stale => {}
                }
            }
            Completion::Columns(Ok(columns)) => {
                let count = columns.len();
                self.columns = columns;
                self.emit(SessionEvent::ColumnsLoaded { count });
            }
            Completion::Columns(Err(e)) => {
                log::warn!("[boardsync.session] Could not load columns: {}", e);
            }
        }
    }

    fn on_write(
        &mut self,
        generation: u64,
        handle: MutationHandle,
        result: Result<(), EngineError>,
    ) {
        let mutation = handle.id();
        let card_ids = handle.card_ids();

        if generation != self.pagination.generation() {
            // The cache was rebuilt for another query; nothing to restore.
            self.mutator.commit(handle);
            if let Err(e) = &result {
                log::warn!(
                    "[boardsync.session] Write {} failed after query change: {}",
                    mutation,
                    e
                );
            }
            return;
        }

        match result {
            Ok(()) => {
                for id in handle.removed_ids() {
                    self.cache.remove(id);
                }
                self.mutator.commit(handle);
                self.emit(SessionEvent::WriteConfirmed { mutation, card_ids });
            }
            Err(error) => {
                let report = self.mutator.rollback(&mut self.cache, handle);
                log::info!(
                    "[boardsync.session] Rolled back write {} ({} restored, {} kept newer)",
                    mutation,
                    report.restored.len(),
                    report.kept_newer.len()
                );
                self.emit(SessionEvent::WriteFailed {
                    mutation,
                    card_ids,
                    error,
                    report,
                });
            }
        }
    }

    fn publish_cache_change(&mut self) {
        let version = self.cache.version();
        if version != self.published_version {
            self.published_version = version;
            self.emit(SessionEvent::CacheChanged { version });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
