// [[RARO]]/apps/telemetry-server/src/tasks/mod.rs
// Purpose: Tracks background task output files and derives their status.
// Architecture: Task Engine
// Dependencies: dashmap, notify, tokio

pub mod describe;
pub mod enrich;
pub mod parse;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use notify::{Event as FsEvent, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::TelemetryConfig;
use crate::error::{EnrichError, TelemetryError};
use crate::events::truncate_chars;
use crate::fs_manager;
use crate::hub::EventHub;
use crate::models::{BackgroundTask, TaskStatus};
use crate::observability::IngestStats;

use enrich::{DescriptionCache, DescriptionEnricher};
use parse::FileTimes;

pub const OUTPUT_EXTENSION: &str = "output";

/// Previews this short are not worth an enrichment request.
const MIN_ENRICH_PREVIEW_CHARS: usize = 50;
const ENRICH_SAMPLE_CHARS: usize = 1000;

/// Running while the file was written within `idle`; afterwards failed or
/// completed depending on whether an error was seen. A missing mtime means failed.
pub fn classify_status(
    modified: Option<SystemTime>,
    now: SystemTime,
    idle: Duration,
    has_error: bool,
) -> TaskStatus {
    let Some(modified) = modified else {
        return TaskStatus::Failed;
    };
    // Clock skew can put mtime in the future; treat that as fresh.
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    if age < idle {
        TaskStatus::Running
    } else if has_error {
        TaskStatus::Failed
    } else {
        TaskStatus::Completed
    }
}

pub struct TaskEngine {
    tasks_dir: PathBuf,
    idle_threshold: Duration,
    scan_interval: Duration,
    enrich_timeout: Duration,
    tasks: DashMap<String, BackgroundTask>,
    descriptions: DescriptionCache,
    enricher: Option<Arc<dyn DescriptionEnricher>>,
    hub: Arc<EventHub>,
    stats: Arc<IngestStats>,
}

impl TaskEngine {
    pub fn new(
        config: &TelemetryConfig,
        hub: Arc<EventHub>,
        stats: Arc<IngestStats>,
        enricher: Option<Arc<dyn DescriptionEnricher>>,
    ) -> Self {
        Self {
            tasks_dir: config.tasks_dir.clone(),
            idle_threshold: config.idle_threshold,
            scan_interval: config.scan_interval,
            enrich_timeout: config.enrichment.timeout,
            tasks: DashMap::new(),
            descriptions: DescriptionCache::default(),
            enricher,
            hub,
            stats,
        }
    }

    pub fn task_path(&self, task_id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{}.{}", task_id, OUTPUT_EXTENSION))
    }

    /// Re-read one task file, update the in-memory record and notify
    /// subscribers when something visible changed. Reads synchronously; async
    /// callers go through `blocking`.
    pub fn scan_task(self: &Arc<Self>, task_id: &str) -> Option<BackgroundTask> {
        let path = self.task_path(task_id);
        if fs::symlink_metadata(&path).is_err() {
            self.forget(task_id);
            return None;
        }

        let resolved = match fs_manager::resolve_output_file(&path) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("Task {} output unavailable: {}", task_id, e);
                return None;
            }
        };

        let content = match fs::read(&resolved) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!("Failed to read {}: {}", resolved.display(), e);
                self.stats.record_read_error();
                return None;
            }
        };

        let meta = fs::metadata(&resolved).ok();
        let now = SystemTime::now();
        let times = meta
            .as_ref()
            .and_then(|m| fs_manager::file_times(m).ok())
            .map(|(created, modified)| FileTimes { created, modified })
            .unwrap_or_else(|| {
                let now_ms = fs_manager::system_time_millis(now);
                FileTimes {
                    created: now_ms,
                    modified: now_ms,
                }
            });

        let parsed = parse::parse_output(task_id, &content, times);
        let status = classify_status(
            meta.as_ref().and_then(|m| m.modified().ok()),
            now,
            self.idle_threshold,
            parsed.error.is_some(),
        );

        let mut task = BackgroundTask {
            task_id: task_id.to_string(),
            session_id: parsed.session_id,
            agent_id: parsed.agent_id,
            status,
            started_at: parsed.started_at,
            completed_at: (status != TaskStatus::Running).then_some(parsed.last_activity),
            last_activity: parsed.last_activity,
            description: parsed.description,
            prompt: parsed.prompt,
            result: parsed.result,
            error: parsed.error,
            event_count: parsed.event_count,
            output_file: resolved.display().to_string(),
            output_preview: parsed.preview,
            task_type: parsed.task_type,
        };

        // The cache is read under the map entry so a concurrent
        // apply_enrichment is either seen here or applied after this insert.
        let entry = self.tasks.entry(task_id.to_string());
        let enriched = self.descriptions.get(task_id);
        if let Some(description) = &enriched {
            task.description = description.clone();
        }
        let changed = match &entry {
            Entry::Occupied(slot) => slot.get().differs_for_subscribers(&task),
            Entry::Vacant(_) => true,
        };
        let stored = entry.insert(task);
        if changed {
            tracing::debug!("Task {} is {:?} ({} lines)", task_id, stored.status, stored.event_count);
            self.hub.publish_task(&stored);
        }
        let task = stored.clone();
        drop(stored);

        if enriched.is_none() {
            self.request_enrichment(task_id, &task.output_preview);
        }

        Some(task)
    }

    /// Start the one enrichment request a task is allowed, if it qualifies.
    fn request_enrichment(self: &Arc<Self>, task_id: &str, preview: &str) {
        let Some(enricher) = self.enricher.clone() else {
            return;
        };
        if preview.chars().count() <= MIN_ENRICH_PREVIEW_CHARS || !self.descriptions.try_begin(task_id) {
            return;
        }

        let engine = Arc::clone(self);
        let task_id = task_id.to_string();
        let sample = truncate_chars(preview, ENRICH_SAMPLE_CHARS);
        let timeout = self.enrich_timeout;

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, enricher.describe(&task_id, &sample)).await {
                Ok(result) => result,
                Err(_) => Err(EnrichError::Timeout(timeout.as_millis() as u64)),
            };
            engine.apply_enrichment(&task_id, outcome);
        });
    }

    /// Record an enrichment outcome. A description replaces the heuristic one
    /// and is pushed to subscribers; failures leave the heuristic in place.
    pub fn apply_enrichment(&self, task_id: &str, outcome: Result<String, EnrichError>) {
        self.stats.record_enrichment(outcome.is_err());

        let description = match outcome {
            Ok(d) => d,
            Err(e) => {
                match e {
                    EnrichError::Timeout(_) | EnrichError::Http(_) => {
                        tracing::warn!("Description for task {} unavailable: {}", task_id, e)
                    }
                    _ => tracing::debug!("Description for task {} unavailable: {}", task_id, e),
                }
                self.descriptions.complete(task_id, None);
                return;
            }
        };

        if !self.descriptions.complete(task_id, Some(description.clone())) {
            return;
        }

        // Published under the entry lock so a scan cannot broadcast the
        // heuristic description after this one.
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.description = description;
            tracing::info!("Task {} described as {:?}", task_id, task.description);
            self.hub.publish_task(&task);
        }
    }

    fn forget(&self, task_id: &str) {
        if self.tasks.remove(task_id).is_some() {
            tracing::debug!("Task {} output removed", task_id);
        }
        self.descriptions.forget(task_id);
    }

    /// Scan every task file and drop tasks whose file is gone.
    pub fn scan_all(self: &Arc<Self>) -> usize {
        let entries = match fs::read_dir(&self.tasks_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Tasks directory {} unavailable: {}", self.tasks_dir.display(), e);
                return self.tasks.len();
            }
        };

        let present: HashSet<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| task_id_for(&entry.path()))
            .collect();

        for task_id in &present {
            self.scan_task(task_id);
        }

        let stale: Vec<String> = self
            .tasks
            .iter()
            .map(|t| t.key().clone())
            .filter(|id| !present.contains(id))
            .collect();
        for task_id in stale {
            self.forget(&task_id);
        }

        self.tasks.len()
    }

    /// Re-evaluate every task still marked running.
    pub fn refresh_running(self: &Arc<Self>) {
        let running: Vec<String> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .map(|t| t.key().clone())
            .collect();
        for task_id in running {
            self.scan_task(&task_id);
        }
    }

    /// Run a synchronous scan on the blocking pool.
    async fn blocking<T, F>(self: &Arc<Self>, scan: F) -> Option<T>
    where
        F: FnOnce(&Arc<Self>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(self);
        match tokio::task::spawn_blocking(move || scan(&engine)).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Task scan aborted: {}", e);
                None
            }
        }
    }

    /// All tasks, newest first. Always rescans so missed notifications do not matter.
    pub async fn all_tasks(self: &Arc<Self>) -> Vec<BackgroundTask> {
        self.blocking(|engine| engine.scan_all()).await;
        let mut tasks: Vec<BackgroundTask> = self.tasks.iter().map(|t| t.value().clone()).collect();
        tasks.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        tasks
    }

    pub async fn task(self: &Arc<Self>, task_id: &str) -> Option<BackgroundTask> {
        let task_id = task_id.to_string();
        self.blocking(move |engine| engine.scan_task(&task_id)).await.flatten()
    }

    /// Full, untruncated output of a known task.
    pub async fn task_output(&self, task_id: &str) -> Option<String> {
        let output_file = self.tasks.get(task_id)?.output_file.clone();
        match tokio::fs::read(&output_file).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                tracing::debug!("Failed to read output of task {}: {}", task_id, e);
                None
            }
        }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Watch the task directory until shutdown. Notifications trigger
    /// single-task scans; a timer re-evaluates running tasks.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!("Starting background task watcher on {}", self.tasks_dir.display());
        if self.enricher.is_none() {
            tracing::info!("No API key configured, task names come from pattern matching");
        }

        let found = self.blocking(|engine| engine.scan_all()).await.unwrap_or(0);
        tracing::info!("Found {} background task(s)", found);

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let watcher = match watch_tasks(&self.tasks_dir, tx) {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::warn!("{}. Rescanning the directory on every tick instead.", e);
                None
            }
        };

        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(task_id) = rx.recv() => {
                    self.blocking(move |engine| engine.scan_task(&task_id)).await;
                }
                _ = ticker.tick() => {
                    if watcher.is_some() {
                        self.blocking(|engine| engine.refresh_running()).await;
                    } else {
                        self.blocking(|engine| engine.scan_all()).await;
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Background task watcher stopped");
                    break;
                }
            }
        }
    }
}

fn task_id_for(path: &Path) -> Option<String> {
    if !fs_manager::has_extension(path, OUTPUT_EXTENSION) {
        return None;
    }
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

fn watch_tasks(dir: &Path, tx: mpsc::UnboundedSender<String>) -> Result<RecommendedWatcher, TelemetryError> {
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<FsEvent, notify::Error>| match res {
            Ok(event) => {
                for task_id in event.paths.iter().filter_map(|p| task_id_for(p)) {
                    let _ = tx.send(task_id);
                }
            }
            Err(e) => tracing::warn!("Task directory watch error: {}", e),
        },
        notify::Config::default(),
    )
    .map_err(|e| TelemetryError::watch(dir, e))?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| TelemetryError::watch(dir, e))?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StreamMessage;
    use crate::models::TaskType;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const BUILD_LOG: &str = "Compiling telemetry v0.1.0 with a long enough line of output\nFinished release profile\n";

    struct GatedEnricher {
        calls: AtomicUsize,
        gate: Notify,
        reply: Option<&'static str>,
    }

    impl GatedEnricher {
        fn new(reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                reply,
            })
        }
    }

    #[async_trait]
    impl DescriptionEnricher for GatedEnricher {
        async fn describe(&self, _task_id: &str, _sample: &str) -> Result<String, EnrichError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.reply.map(str::to_string).ok_or(EnrichError::Unusable)
        }
    }

    fn engine(dir: &Path, enricher: Option<Arc<dyn DescriptionEnricher>>) -> (Arc<TaskEngine>, Arc<EventHub>) {
        engine_with_timeout(dir, enricher, Duration::from_secs(5))
    }

    fn engine_with_timeout(
        dir: &Path,
        enricher: Option<Arc<dyn DescriptionEnricher>>,
        enrich_timeout: Duration,
    ) -> (Arc<TaskEngine>, Arc<EventHub>) {
        let mut config = TelemetryConfig::for_paths(dir.join("projects"), dir.to_path_buf(), dir.join("agents.json"));
        config.idle_threshold = Duration::from_secs(30);
        config.enrichment.timeout = enrich_timeout;
        let stats = Arc::new(IngestStats::default());
        let hub = Arc::new(EventHub::new(100, 50, 64, stats.clone()));
        (Arc::new(TaskEngine::new(&config, hub.clone(), stats, enricher)), hub)
    }

    fn age(path: &Path, secs: u64) {
        let file = fs::OpenOptions::new().append(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs)).unwrap();
    }

    async fn settle<F: Fn() -> bool>(done: F) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn status_follows_idle_threshold() {
        let now = SystemTime::now();
        let idle = Duration::from_secs(30);
        let fresh = Some(now - Duration::from_secs(5));
        let stale = Some(now - Duration::from_secs(31));

        assert_eq!(classify_status(fresh, now, idle, true), TaskStatus::Running);
        assert_eq!(classify_status(stale, now, idle, false), TaskStatus::Completed);
        assert_eq!(classify_status(stale, now, idle, true), TaskStatus::Failed);
        assert_eq!(classify_status(None, now, idle, false), TaskStatus::Failed);
        assert_eq!(
            classify_status(Some(now + Duration::from_secs(60)), now, idle, false),
            TaskStatus::Running
        );
    }

    #[tokio::test]
    async fn status_is_reversible() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(dir.path(), None);
        let path = engine.task_path("abc");
        fs::write(&path, "npm run build\n").unwrap();

        assert_eq!(engine.scan_task("abc").unwrap().status, TaskStatus::Running);

        age(&path, 60);
        let idle = engine.scan_task("abc").unwrap();
        assert_eq!(idle.status, TaskStatus::Completed);
        assert!(idle.completed_at.is_some());

        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "rebuilding").unwrap();
        drop(f);
        let resumed = engine.scan_task("abc").unwrap();
        assert_eq!(resumed.status, TaskStatus::Running);
        assert!(resumed.completed_at.is_none());
        assert_eq!(resumed.event_count, 2);
    }

    #[tokio::test]
    async fn idle_task_with_error_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(dir.path(), None);
        let path = engine.task_path("bad");
        fs::write(&path, "starting job\nError: connection refused\n").unwrap();
        age(&path, 120);

        let task = engine.scan_task("bad").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("Error: connection refused"));
        assert_eq!(task.task_type, TaskType::Plain);
    }

    #[tokio::test]
    async fn updates_are_published_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, hub) = engine(dir.path(), None);
        let mut sub = hub.subscribe();
        fs::write(engine.task_path("t1"), "git push origin main\n").unwrap();

        engine.scan_task("t1");
        engine.scan_task("t1");
        match sub.receiver.try_recv().unwrap() {
            StreamMessage::TaskUpdate(task) => assert_eq!(task.description, "Git Push"),
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn enrichment_runs_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = GatedEnricher::new(Some("Compiling Telemetry Release"));
        let (engine, _) = engine(dir.path(), Some(enricher.clone()));
        fs::write(engine.task_path("t1"), BUILD_LOG).unwrap();

        let first = engine.scan_task("t1").unwrap();
        engine.scan_task("t1");
        settle(|| enricher.calls.load(Ordering::SeqCst) == 1).await;
        assert!(engine.descriptions.is_pending("t1"));
        assert_ne!(first.description, "Compiling Telemetry Release");

        enricher.gate.notify_one();
        settle(|| !engine.descriptions.is_pending("t1")).await;

        let task = engine.scan_task("t1").unwrap();
        assert_eq!(task.description, "Compiling Telemetry Release");
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_enrichment_keeps_heuristic_and_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = GatedEnricher::new(None);
        let (engine, _) = engine(dir.path(), Some(enricher.clone()));
        fs::write(engine.task_path("t1"), BUILD_LOG).unwrap();

        let heuristic = engine.scan_task("t1").unwrap().description;
        enricher.gate.notify_one();
        settle(|| enricher.calls.load(Ordering::SeqCst) == 1 && !engine.descriptions.is_pending("t1")).await;

        assert_eq!(engine.scan_task("t1").unwrap().description, heuristic);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn enrichment_timeout_keeps_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = GatedEnricher::new(Some("Never Delivered"));
        let (engine, _) = engine_with_timeout(dir.path(), Some(enricher.clone()), Duration::from_millis(10));
        fs::write(engine.task_path("t1"), BUILD_LOG).unwrap();

        let heuristic = engine.scan_task("t1").unwrap().description;
        settle(|| !engine.descriptions.is_pending("t1")).await;

        assert_eq!(engine.stats.snapshot().enrichment_failures, 1);
        assert_eq!(engine.scan_task("t1").unwrap().description, heuristic);
        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.scan_task("t1");
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_scans_never_revert_the_enriched_description() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = GatedEnricher::new(Some("Compiling Telemetry Release"));
        let (engine, hub) = engine(dir.path(), Some(enricher.clone()));
        let mut sub = hub.subscribe();
        fs::write(engine.task_path("t1"), BUILD_LOG).unwrap();

        engine.scan_task("t1");
        settle(|| enricher.calls.load(Ordering::SeqCst) == 1).await;

        let scanner = {
            let engine = engine.clone();
            tokio::task::spawn_blocking(move || {
                for _ in 0..500 {
                    engine.scan_task("t1");
                }
            })
        };
        enricher.gate.notify_one();
        scanner.await.unwrap();
        settle(|| !engine.descriptions.is_pending("t1")).await;

        let mut last = None;
        while let Ok(message) = sub.receiver.try_recv() {
            if let StreamMessage::TaskUpdate(task) = message {
                last = Some(task.description);
            }
        }
        assert_eq!(last.as_deref(), Some("Compiling Telemetry Release"));
        assert_eq!(engine.scan_task("t1").unwrap().description, "Compiling Telemetry Release");
    }

    #[tokio::test]
    async fn short_previews_are_not_enriched() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = GatedEnricher::new(Some("Anything"));
        let (engine, _) = engine(dir.path(), Some(enricher.clone()));
        fs::write(engine.task_path("t1"), "short output\n").unwrap();

        engine.scan_task("t1");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn removed_files_are_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = GatedEnricher::new(Some("Build"));
        let (engine, _) = engine(dir.path(), Some(enricher.clone()));
        fs::write(engine.task_path("keep"), "curl https://example.com\n").unwrap();
        fs::write(engine.task_path("gone"), BUILD_LOG).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(engine.scan_all(), 2);
        assert!(engine.descriptions.is_pending("gone"));

        fs::remove_file(engine.task_path("gone")).unwrap();
        let tasks = engine.all_tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_id, "keep");
        assert!(!engine.descriptions.is_pending("gone"));
        assert!(engine.task_output("gone").await.is_none());
    }

    #[tokio::test]
    async fn all_tasks_are_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(dir.path(), None);
        let older = "{\"type\":\"user\",\"timestamp\":\"2026-01-01T00:00:00Z\",\"message\":{\"content\":\"old\"}}\n";
        let newer = "{\"type\":\"user\",\"timestamp\":\"2026-02-01T00:00:00Z\",\"message\":{\"content\":\"new\"}}\n";
        fs::write(engine.task_path("old"), older).unwrap();
        fs::write(engine.task_path("new"), newer).unwrap();

        let ids: Vec<String> = engine.all_tasks().await.into_iter().map(|t| t.task_id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_output_is_followed() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(dir.path(), None);
        let real = dir.path().join("real.log");
        fs::write(&real, "first line of output\nsecond line\n").unwrap();
        std::os::unix::fs::symlink("real.log", engine.task_path("ln")).unwrap();

        let task = engine.scan_task("ln").unwrap();
        assert_eq!(task.output_file, real.display().to_string());
        assert_eq!(
            engine.task_output("ln").await.as_deref(),
            Some("first line of output\nsecond line\n")
        );
    }
}
