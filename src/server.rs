//! The engine: component wiring, tool dispatch, health, and graceful
//! shutdown.
//!
//! The transport layer (out of scope here) drives the engine through
//! `invoke(tool, params)` and `cancel(request_id)`. Responses are JSON
//! envelopes with a `status` discriminator and an ISO-8601 timestamp.

use crate::config::Settings;
use crate::lock::LockManager;
use crate::ops::{self, OpState};
use crate::path::PathValidator;
use crate::persistence::StatePersistence;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syncpoint_types::{ErrorCode, StatusRequest};
use syncpoint_watcher::{spawn_watcher, HashRegistry, VersionCache, WatcherConfig, WatcherHandle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tool names exposed upward to the transport.
pub const TOOLS: &[&str] = &[
    "read",
    "write",
    "update",
    "delete",
    "rename",
    "append",
    "list",
    "status",
    "batch_read",
    "batch_write",
    "batch_update",
];

/// The coordination engine. One per process.
pub struct Engine {
    state: Arc<OpState>,
    watcher: Mutex<Option<WatcherHandle>>,
    persistence_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    cancels: Mutex<HashMap<String, CancellationToken>>,
}

impl Engine {
    /// Build and start the engine: load persisted state, then start the
    /// watcher and the persistence writer. Must complete before the first
    /// request is admitted.
    pub async fn start(settings: Settings) -> io::Result<Self> {
        let registry = Arc::new(HashRegistry::new());
        let versions = Arc::new(VersionCache::new());
        let locks = Arc::new(LockManager::new(settings.persistence.ttl_multiplier));
        let validator = PathValidator::new(&settings.crud);

        let persistence = Arc::new(StatePersistence::new(
            Arc::clone(&registry),
            Arc::clone(&locks),
            &settings.persistence,
            settings.crud.max_file_size_bytes,
        )?);
        persistence.load().await;

        let shutdown = CancellationToken::new();
        let persistence_task = Arc::clone(&persistence).spawn_writer(shutdown.clone());

        let watcher = spawn_watcher(
            WatcherConfig {
                enabled: settings.watcher.enabled,
                debounce_ms: settings.watcher.debounce_ms,
                max_file_size_bytes: settings.crud.max_file_size_bytes,
            },
            validator.base_directories().to_vec(),
            Arc::clone(&registry),
        );

        info!(
            bases = validator.base_directories().len(),
            persistence = settings.persistence.enabled,
            watcher = settings.watcher.enabled,
            "engine started"
        );

        Ok(Self {
            state: Arc::new(OpState {
                settings,
                validator,
                locks,
                registry,
                versions,
                persistence,
                transport: "embedded".to_string(),
                started_at: std::time::Instant::now(),
            }),
            watcher: Mutex::new(Some(watcher)),
            persistence_task: Mutex::new(Some(persistence_task)),
            shutdown,
            cancels: Mutex::new(HashMap::new()),
        })
    }

    /// Dispatch one tool request. `request_id`, when provided, registers the
    /// request for `cancel`.
    pub async fn invoke(
        &self,
        tool: &str,
        params: Value,
        request_id: Option<&str>,
    ) -> Value {
        let cancel = CancellationToken::new();
        if let Some(id) = request_id {
            self.cancels
                .lock()
                .expect("cancel map poisoned")
                .insert(id.to_string(), cancel.clone());
        }

        let response = self.dispatch(tool, params, &cancel).await;

        if let Some(id) = request_id {
            self.cancels.lock().expect("cancel map poisoned").remove(id);
        }
        response
    }

    /// Cancel an in-flight request. Only waits queued for a lock are
    /// affected; granted holders run to release.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self
            .cancels
            .lock()
            .expect("cancel map poisoned")
            .get(request_id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Readiness view for the supervisor.
    pub fn health(&self) -> Value {
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": self.state.started_at.elapsed().as_secs_f64(),
        })
    }

    /// Access to the shared operation state, mainly for tests and embedding.
    pub fn state(&self) -> &Arc<OpState> {
        &self.state
    }

    async fn dispatch(&self, tool: &str, params: Value, cancel: &CancellationToken) -> Value {
        let state = &self.state;
        match tool {
            "read" => match serde_json::from_value(params) {
                Ok(req) => to_value(ops::read::read(state, req, cancel).await),
                Err(e) => bad_request(tool, &e),
            },
            "write" => match serde_json::from_value(params) {
                Ok(req) => to_value(ops::write::write(state, req, cancel).await),
                Err(e) => bad_request(tool, &e),
            },
            "update" => match serde_json::from_value(params) {
                Ok(req) => to_value(ops::update::update(state, req, cancel).await),
                Err(e) => bad_request(tool, &e),
            },
            "delete" => match serde_json::from_value(params) {
                Ok(req) => to_value(ops::delete::delete(state, req, cancel).await),
                Err(e) => bad_request(tool, &e),
            },
            "rename" => match serde_json::from_value(params) {
                Ok(req) => to_value(ops::rename::rename(state, req, cancel).await),
                Err(e) => bad_request(tool, &e),
            },
            "append" => match serde_json::from_value(params) {
                Ok(req) => to_value(ops::append::append(state, req, cancel).await),
                Err(e) => bad_request(tool, &e),
            },
            "list" => match serde_json::from_value(params) {
                Ok(req) => to_value(ops::list::list(state, req).await),
                Err(e) => bad_request(tool, &e),
            },
            "status" => {
                let req: StatusRequest = serde_json::from_value(params).unwrap_or_default();
                to_value(ops::status::status(state, req).await)
            }
            "batch_read" => match serde_json::from_value(params) {
                Ok(req) => to_value(ops::batch::batch_read(state, req, cancel).await),
                Err(e) => bad_request(tool, &e),
            },
            "batch_write" => match serde_json::from_value(params) {
                Ok(req) => to_value(ops::batch::batch_write(state, req, cancel).await),
                Err(e) => bad_request(tool, &e),
            },
            "batch_update" => match serde_json::from_value(params) {
                Ok(req) => to_value(ops::batch::batch_update(state, req, cancel).await),
                Err(e) => bad_request(tool, &e),
            },
            other => json!({
                "status": "error",
                "error_code": ErrorCode::ServerError,
                "message": format!("unknown tool: {}", other),
                "timestamp": ops::timestamp(),
            }),
        }
    }

    /// Graceful shutdown: refuse new waiters, let holders finish, flush the
    /// persistence buffer, stop the watcher. In that order.
    pub async fn shutdown(&self) {
        info!("shutting down: refusing new waiters");
        self.state.locks.refuse_new_waiters();

        let drain_deadline = tokio::time::Instant::now() + Duration::from_secs(30);
        while self.state.locks.has_activity() {
            if tokio::time::Instant::now() >= drain_deadline {
                warn!("shutdown drain timed out with activity remaining");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.shutdown.cancel();
        let task = self.persistence_task.lock().expect("task slot poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.state.persistence.save_now().await;

        let watcher = self.watcher.lock().expect("watcher slot poisoned").take();
        if let Some(watcher) = watcher {
            watcher.stop().await;
        }
        info!("engine stopped");
    }
}

fn to_value<T: serde::Serialize>(outcome: T) -> Value {
    serde_json::to_value(outcome).unwrap_or_else(|e| {
        json!({
            "status": "error",
            "error_code": ErrorCode::ServerError,
            "message": format!("failed to serialize response: {}", e),
            "timestamp": ops::timestamp(),
        })
    })
}

fn bad_request(tool: &str, err: &serde_json::Error) -> Value {
    json!({
        "status": "error",
        "error_code": ErrorCode::ServerError,
        "message": format!("invalid parameters for {}: {}", tool, err),
        "timestamp": ops::timestamp(),
    })
}
