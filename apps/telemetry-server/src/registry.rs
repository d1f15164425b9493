// [[RARO]]/apps/telemetry-server/src/registry.rs
// Purpose: Agent Registry. Maps session ids to human-readable agent names.
// Architecture: Lookup Layer
// Dependencies: DashMap, notify

use dashmap::DashMap;
use notify::{Event as FsEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TelemetryError;

/// Sub-agent types whose `source_app` is used directly as the display name.
pub const SUB_AGENT_TYPES: &[&str] = &[
    "artist",
    "intern",
    "engineer",
    "pentester",
    "architect",
    "designer",
    "qatester",
    "researcher",
];

pub struct AgentRegistry {
    path: PathBuf,
    sessions: DashMap<String, String>,
}

impl AgentRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let registry = Self {
            path: path.into(),
            sessions: DashMap::new(),
        };

        if let Err(e) = registry.reload() {
            tracing::warn!("Agent session map unavailable ({}). Agent names fall back to defaults.", e);
        }

        registry
    }

    /// Look up the agent name recorded for a session.
    pub fn agent_for_session(&self, session_id: &str) -> Option<String> {
        self.sessions.get(session_id).map(|name| name.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Replace the whole table with the file's current content.
    ///
    /// On a read or parse failure the previous table is kept.
    pub fn reload(&self) -> Result<usize, TelemetryError> {
        let data = fs::read_to_string(&self.path).map_err(|e| TelemetryError::io(&self.path, e))?;
        let table: HashMap<String, serde_json::Value> =
            serde_json::from_str(&data).map_err(|e| TelemetryError::json(&self.path, e))?;

        self.sessions.clear();
        for (session_id, name) in table {
            if let Some(name) = name.as_str() {
                self.sessions.insert(session_id, name.to_string());
            }
        }

        tracing::info!("Loaded {} agent sessions from {}", self.sessions.len(), self.path.display());
        Ok(self.sessions.len())
    }

    /// Hot-reload the table whenever the file changes.
    ///
    /// The parent directory is watched so the file may be created or replaced
    /// atomically after startup.
    pub async fn watch(self: Arc<Self>, shutdown: CancellationToken) {
        let Some(parent) = self.path.parent().map(Path::to_path_buf) else {
            return;
        };
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let (tx, mut rx) = mpsc::channel::<()>(16);
        let watcher = RecommendedWatcher::new(
            move |res: Result<FsEvent, notify::Error>| {
                if let Ok(event) = res {
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_file && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        let _ = tx.try_send(());
                    }
                }
            },
            notify::Config::default(),
        )
        .and_then(|mut w| w.watch(&parent, RecursiveMode::NonRecursive).map(|_| w));

        let _watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!("{}", TelemetryError::watch(&parent, e));
                return;
            }
        };

        tracing::info!("Watching {} for agent session changes", self.path.display());

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    if msg.is_none() {
                        break;
                    }
                    // Editors write in bursts; settle before reading.
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    while rx.try_recv().is_ok() {}

                    if let Err(e) = self.reload() {
                        tracing::error!("Failed to reload agent sessions: {}", e);
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }
}
