//! Boardsync client: wires a board session to the ticket store's REST API
//! and push channel.
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod push_ws;

use std::sync::Arc;

use boardsync_core::{spawn_session, BoardApi, BoardQuery, PushFrame, SessionHandle};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub use config::{default_config_path, load_config, ClientConfig};
pub use error::ClientError;
pub use http::HttpBoardApi;

const PUSH_CAPACITY: usize = 256;

/// A running board: the session task plus, when enabled, the push reader
/// feeding it.
pub struct BoardClient {
    id: Uuid,
    session: SessionHandle,
    session_task: JoinHandle<()>,
    push_task: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl BoardClient {
    /// Start against the HTTP ticket store named in `config`.
    pub fn start(config: ClientConfig, query: BoardQuery) -> Result<Self, ClientError> {
        let api = HttpBoardApi::new(&config.server_url, config.request_timeout())?;
        Ok(Self::start_with(Arc::new(api), config, query))
    }

    /// Start with any store implementation.
    pub fn start_with<A: BoardApi>(api: Arc<A>, config: ClientConfig, query: BoardQuery) -> Self {
        let id = Uuid::new_v4();
        let (push_tx, push_rx) = mpsc::channel::<PushFrame>(PUSH_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (session, session_task) = spawn_session(api, config.engine.clone(), query, push_rx);

        let push_task = match config.resolved_push_url() {
            Some(url) => {
                log::info!("[boardsync.client] Client {} reading pushes from {}", id, url);
                Some(tokio::spawn(push_ws::run_push_reader(
                    url,
                    push_tx,
                    shutdown_rx,
                )))
            }
            None => {
                log::info!("[boardsync.client] Client {} running without pushes", id);
                None
            }
        };

        Self {
            id,
            session,
            session_task,
            push_task,
            shutdown_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Stop the push reader and the session, and wait for both.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.session.shutdown().await;
        if let Err(e) = self.session_task.await {
            log::warn!("[boardsync.client] Session task ended abnormally: {}", e);
        }
        if let Some(task) = self.push_task {
            if let Err(e) = task.await {
                log::warn!("[boardsync.client] Push task ended abnormally: {}", e);
            }
        }
        log::info!("[boardsync.client] Client {} stopped", self.id);
    }
}
