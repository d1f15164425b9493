// [[RARO]]/apps/telemetry-server/src/tail.rs
// Purpose: Tails session transcripts, emitting only bytes appended since the last read.
// Architecture: Ingestion Layer
// Dependencies: notify, tokio, Normalizer, EventHub

use notify::{Event as FsEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TelemetryError;
use crate::events::Event;
use crate::fs_manager::{self, ReadDelta};
use crate::hub::EventHub;
use crate::normalizer::Normalizer;
use crate::observability::IngestStats;
use crate::transcript;

pub const SESSION_EXTENSION: &str = "jsonl";

/// Ingestion progress for one transcript.
#[derive(Debug)]
pub struct FileCursor {
    pub path: PathBuf,
    pub byte_offset: u64,
    /// Bytes after the last newline, waiting for the rest of their line
    fragment: Vec<u8>,
}

impl FileCursor {
    pub fn new(path: PathBuf, byte_offset: u64) -> Self {
        Self {
            path,
            byte_offset,
            fragment: Vec::new(),
        }
    }

    /// Feed freshly read bytes and take every line they complete.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        self.fragment.extend_from_slice(bytes);

        let Some(last_newline) = self.fragment.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.fragment.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.fragment, rest);

        complete
            .split(|b| *b == b'\n')
            .map(|line| String::from_utf8_lossy(line).trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }

    fn reset(&mut self) {
        self.byte_offset = 0;
        self.fragment.clear();
    }
}

#[derive(Debug)]
enum FileSignal {
    Created(PathBuf),
    Changed(PathBuf),
}

pub struct TailIngestor {
    dir: PathBuf,
    cursors: HashMap<PathBuf, FileCursor>,
    normalizer: Normalizer,
    hub: Arc<EventHub>,
    stats: Arc<IngestStats>,
}

impl TailIngestor {
    pub fn new(
        dir: impl Into<PathBuf>,
        normalizer: Normalizer,
        hub: Arc<EventHub>,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            dir: dir.into(),
            cursors: HashMap::new(),
            normalizer,
            hub,
            stats,
        }
    }

    pub fn watched_files(&self) -> usize {
        self.cursors.len()
    }

    /// Start tracking the `limit` most recently modified transcripts from
    /// their current end.
    pub fn discover(&mut self, limit: usize) -> usize {
        let files = match fs_manager::recent_files(&self.dir, SESSION_EXTENSION, limit) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Session directory {} unavailable: {}", self.dir.display(), e);
                return 0;
            }
        };

        tracing::info!("Found {} recent session files in {}", files.len(), self.dir.display());
        files
            .into_iter()
            .filter(|path| self.track_from_end(path))
            .count()
    }

    /// Track a file from its current length, so pre-existing content is not replayed.
    pub fn track_from_end(&mut self, path: &Path) -> bool {
        if self.cursors.contains_key(path) {
            return false;
        }
        match std::fs::metadata(path) {
            Ok(meta) => {
                tracing::debug!("Watching {} from offset {}", path.display(), meta.len());
                self.cursors
                    .insert(path.to_path_buf(), FileCursor::new(path.to_path_buf(), meta.len()));
                true
            }
            Err(e) => {
                tracing::warn!("Cannot watch {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Track a file that appeared after startup; all of its content is new.
    pub fn track_from_start(&mut self, path: &Path) -> bool {
        if self.cursors.contains_key(path) {
            return false;
        }
        tracing::info!("New session file: {}", path.display());
        self.cursors
            .insert(path.to_path_buf(), FileCursor::new(path.to_path_buf(), 0));
        true
    }

    /// Read whatever was appended to a tracked file and publish the resulting events.
    pub async fn ingest(&mut self, path: &Path) -> Vec<Event> {
        let Some(cursor) = self.cursors.get_mut(path) else {
            return Vec::new();
        };

        let mut delta = fs_manager::read_delta(path, cursor.byte_offset).await;
        if let Ok(ReadDelta::Truncated { len }) = delta {
            tracing::warn!(
                "{} shrank from {} to {} bytes, reading from the start",
                cursor.path.display(),
                cursor.byte_offset,
                len
            );
            cursor.reset();
            delta = fs_manager::read_delta(path, 0).await;
        }

        let lines = match delta {
            Ok(ReadDelta::Appended { bytes, new_offset }) => {
                cursor.byte_offset = new_offset;
                cursor.push_bytes(&bytes)
            }
            Ok(_) => return Vec::new(),
            Err(e) => {
                // Transient: the next notification or poll retries from the same offset.
                tracing::debug!("Read of {} failed: {}", path.display(), e);
                self.stats.record_read_error();
                return Vec::new();
            }
        };

        let mut batch = Vec::new();
        for line in &lines {
            match transcript::parse_line(line) {
                Ok(entry) => {
                    self.stats.record_line(false);
                    batch.extend(self.normalizer.normalize(entry));
                }
                Err(_) => self.stats.record_line(true),
            }
        }

        self.hub.publish_events(batch)
    }

    /// Check every tracked file for growth the watcher may have missed.
    pub async fn poll_all(&mut self) -> usize {
        let paths: Vec<PathBuf> = self.cursors.keys().cloned().collect();
        let mut emitted = 0;
        for path in paths {
            let grown = match std::fs::metadata(&path) {
                Ok(meta) => self
                    .cursors
                    .get(&path)
                    .map(|c| meta.len() != c.byte_offset)
                    .unwrap_or(false),
                Err(_) => false,
            };
            if grown {
                emitted += self.ingest(&path).await.len();
            }
        }
        emitted
    }

    async fn handle_signal(&mut self, signal: FileSignal) {
        let path = match signal {
            FileSignal::Created(path) => {
                self.track_from_start(&path);
                path
            }
            FileSignal::Changed(path) => {
                if !self.cursors.contains_key(&path) {
                    // Existing file we were not tailing: pick it up from now on.
                    self.track_from_end(&path);
                    return;
                }
                path
            }
        };
        self.ingest(&path).await;
    }

    /// Run until shutdown: directory notifications drive reads, with a
    /// periodic poll as a safety net.
    pub async fn run(mut self, recent_files: usize, poll_interval: Duration, shutdown: CancellationToken) {
        tracing::info!("Starting transcript ingestion from {}", self.dir.display());
        self.discover(recent_files);
        tracing::info!("Tailing {} session file(s)", self.watched_files());

        let (tx, mut rx) = mpsc::unbounded_channel::<FileSignal>();
        let _watcher = match watch_directory(&self.dir, tx) {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::error!("{}. Falling back to polling only.", e);
                None
            }
        };

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(signal) = rx.recv() => self.handle_signal(signal).await,
                _ = ticker.tick() => {
                    self.poll_all().await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Transcript ingestion stopped");
                    break;
                }
            }
        }
    }
}

fn watch_directory(
    dir: &Path,
    tx: mpsc::UnboundedSender<FileSignal>,
) -> Result<RecommendedWatcher, TelemetryError> {
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<FsEvent, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Session directory watch error: {}", e);
                    return;
                }
            };
            for path in event.paths {
                if !fs_manager::has_extension(&path, SESSION_EXTENSION) {
                    continue;
                }
                let signal = match event.kind {
                    EventKind::Create(_) => FileSignal::Created(path),
                    EventKind::Modify(_) => FileSignal::Changed(path),
                    _ => continue,
                };
                let _ = tx.send(signal);
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| TelemetryError::watch(dir, e))?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| TelemetryError::watch(dir, e))?;

    tracing::info!("Watching {} for new sessions", dir.display());
    Ok(watcher)
}
