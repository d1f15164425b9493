// [[RARO]]/apps/telemetry-server/src/runtime.rs
// Purpose: Wires the ingestion pipeline, task engine and fan-out together.
// Architecture: Domain Logic Layer
// Dependencies: tokio, tokio-util

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TelemetryConfig;
use crate::hub::EventHub;
use crate::normalizer::{AgentNames, Normalizer};
use crate::observability::{IngestStats, Metrics};
use crate::registry::AgentRegistry;
use crate::tail::TailIngestor;
use crate::tasks::enrich::{AnthropicEnricher, DescriptionEnricher};
use crate::tasks::TaskEngine;

/// Shared state behind every handler and background loop.
pub struct TelemetryRuntime {
    pub config: TelemetryConfig,
    pub hub: Arc<EventHub>,
    pub tasks: Arc<TaskEngine>,
    pub registry: Arc<AgentRegistry>,
    pub stats: Arc<IngestStats>,
}

impl TelemetryRuntime {
    pub fn new(config: TelemetryConfig) -> Self {
        let enricher = AnthropicEnricher::from_config(&config.enrichment)
            .map(|e| Arc::new(e) as Arc<dyn DescriptionEnricher>);
        Self::with_enricher(config, enricher)
    }

    pub fn with_enricher(
        config: TelemetryConfig,
        enricher: Option<Arc<dyn DescriptionEnricher>>,
    ) -> Self {
        let stats = Arc::new(IngestStats::default());
        let hub = Arc::new(EventHub::new(
            config.max_events,
            config.snapshot_size,
            config.subscriber_buffer,
            stats.clone(),
        ));
        let registry = Arc::new(AgentRegistry::new(config.agent_sessions_file.clone()));
        let tasks = Arc::new(TaskEngine::new(&config, hub.clone(), stats.clone(), enricher));

        TelemetryRuntime {
            config,
            hub,
            tasks,
            registry,
            stats,
        }
    }

    fn ingestor(&self) -> TailIngestor {
        let names = AgentNames {
            principal: self.config.principal_name.clone(),
            assistant: self.config.assistant_name.clone(),
        };
        TailIngestor::new(
            self.config.projects_dir.clone(),
            Normalizer::new(self.registry.clone(), names),
            self.hub.clone(),
            self.stats.clone(),
        )
    }

    /// Spawn the background loops. They all stop when `shutdown` is cancelled.
    pub fn start(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        tracing::info!(
            "Telemetry pipeline starting (sessions: {}, tasks: {})",
            self.config.projects_dir.display(),
            self.config.tasks_dir.display()
        );

        let ingest = self
            .ingestor()
            .run(self.config.recent_files, self.config.scan_interval, shutdown.clone());

        vec![
            tokio::spawn(ingest),
            tokio::spawn(self.tasks.clone().run(shutdown.clone())),
            tokio::spawn(self.registry.clone().watch(shutdown)),
        ]
    }

    pub fn metrics(&self) -> Metrics {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StreamMessage;
    use std::fs;
    use std::io::Write;
    use std::time::Duration;

    #[tokio::test]
    async fn pipeline_streams_appended_transcript_lines() {
        let dir = tempfile::tempdir().unwrap();
        let projects = dir.path().join("projects");
        let tasks = dir.path().join("tasks");
        fs::create_dir_all(&projects).unwrap();
        fs::create_dir_all(&tasks).unwrap();
        let session = projects.join("s1.jsonl");
        fs::write(&session, "").unwrap();

        let mut config = TelemetryConfig::for_paths(projects, tasks, dir.path().join("agents.json"));
        config.scan_interval = Duration::from_millis(20);
        let runtime = TelemetryRuntime::with_enricher(config, None);

        let shutdown = CancellationToken::new();
        let handles = runtime.start(shutdown.clone());
        let mut sub = runtime.hub.subscribe();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut f = fs::OpenOptions::new().append(true).open(&session).unwrap();
        writeln!(
            f,
            r#"{{"type":"user","sessionId":"s1","message":{{"role":"user","content":"ship it"}}}}"#
        )
        .unwrap();
        drop(f);

        let message = tokio::time::timeout(Duration::from_secs(5), sub.receiver.recv())
            .await
            .unwrap()
            .unwrap();
        match message {
            StreamMessage::Event(event) => {
                assert_eq!(event.payload["prompt"], "ship it");
                assert_eq!(event.agent_name, "User");
            }
            other => panic!("unexpected message: {:?}", other),
        }

        shutdown.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        }
        assert_eq!(runtime.metrics().events_emitted, 1);
    }
}
