// [[RARO]]/apps/telemetry-server/src/config.rs
// Purpose: Environment-driven configuration for the telemetry server.
// Architecture: Application Boot
// Dependencies: std::env, dirs

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub port: u16,
    /// Directory holding the session transcript `*.jsonl` files
    pub projects_dir: PathBuf,
    /// Directory holding `<task_id>.output` files
    pub tasks_dir: PathBuf,
    /// JSON object mapping session ids to agent names
    pub agent_sessions_file: PathBuf,
    pub max_events: usize,
    pub snapshot_size: usize,
    /// How many recent transcripts are tailed at startup
    pub recent_files: usize,
    pub idle_threshold: Duration,
    pub scan_interval: Duration,
    /// Per-subscriber queue depth before the subscriber is dropped
    pub subscriber_buffer: usize,
    pub principal_name: String,
    pub assistant_name: String,
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl TelemetryConfig {
    /// Defaults for explicit directories, with enrichment disabled.
    pub fn for_paths(
        projects_dir: PathBuf,
        tasks_dir: PathBuf,
        agent_sessions_file: PathBuf,
    ) -> Self {
        TelemetryConfig {
            port: 4000,
            projects_dir,
            tasks_dir,
            agent_sessions_file,
            max_events: 1000,
            snapshot_size: 50,
            recent_files: 20,
            idle_threshold: Duration::from_secs(30),
            scan_interval: Duration::from_millis(2000),
            subscriber_buffer: 256,
            principal_name: "User".to_string(),
            assistant_name: "PAI".to_string(),
            enrichment: EnrichmentConfig {
                api_key: None,
                model: "claude-3-5-haiku-latest".to_string(),
                endpoint: "https://api.anthropic.com/v1/messages".to_string(),
                timeout: Duration::from_millis(10_000),
            },
        }
    }

    /// Build configuration from the environment.
    ///
    /// Environment variables:
    /// - `TELEMETRY_PORT` (default 4000)
    /// - `TELEMETRY_PROJECTS_DIR`, `TELEMETRY_TASKS_DIR`, `TELEMETRY_AGENT_SESSIONS`
    /// - `TELEMETRY_MAX_EVENTS` (1000), `TELEMETRY_SNAPSHOT_SIZE` (50), `TELEMETRY_RECENT_FILES` (20)
    /// - `TELEMETRY_IDLE_SECS` (30), `TELEMETRY_SCAN_INTERVAL_MS` (2000)
    /// - `TELEMETRY_ENRICH_TIMEOUT_MS` (10000), `TELEMETRY_ENRICH_MODEL`
    /// - `PRINCIPAL_NAME` (User), `DA` (PAI)
    /// - `ANTHROPIC_API_KEY`, falling back to `~/.claude/.env`
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        let user = env::var("USER").unwrap_or_else(|_| "user".to_string());
        let slug = format!("-Users-{}--claude", user);

        let projects_dir = env_path("TELEMETRY_PROJECTS_DIR")
            .unwrap_or_else(|| home.join(".claude").join("projects").join(&slug));
        let tasks_dir = env_path("TELEMETRY_TASKS_DIR")
            .unwrap_or_else(|| PathBuf::from("/tmp/claude").join(&slug).join("tasks"));
        let agent_sessions_file = env_path("TELEMETRY_AGENT_SESSIONS").unwrap_or_else(|| {
            home.join(".claude")
                .join("MEMORY")
                .join("STATE")
                .join("agent-sessions.json")
        });

        let mut config = Self::for_paths(projects_dir, tasks_dir, agent_sessions_file);
        config.port = env_parse("TELEMETRY_PORT", config.port);
        config.max_events = env_parse("TELEMETRY_MAX_EVENTS", config.max_events);
        config.snapshot_size = env_parse("TELEMETRY_SNAPSHOT_SIZE", config.snapshot_size);
        config.recent_files = env_parse("TELEMETRY_RECENT_FILES", config.recent_files);
        config.idle_threshold = Duration::from_secs(env_parse("TELEMETRY_IDLE_SECS", 30));
        config.scan_interval = Duration::from_millis(env_parse("TELEMETRY_SCAN_INTERVAL_MS", 2000));
        config.subscriber_buffer = env_parse("TELEMETRY_SUBSCRIBER_BUFFER", config.subscriber_buffer);
        if let Ok(name) = env::var("PRINCIPAL_NAME") {
            config.principal_name = name;
        }
        if let Ok(name) = env::var("DA") {
            config.assistant_name = name;
        }

        let enrichment = &mut config.enrichment;
        enrichment.api_key = env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| load_api_key(&home.join(".claude").join(".env")));
        if let Ok(model) = env::var("TELEMETRY_ENRICH_MODEL") {
            enrichment.model = model;
        }
        enrichment.timeout = Duration::from_millis(env_parse("TELEMETRY_ENRICH_TIMEOUT_MS", 10_000));

        config
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Read `ANTHROPIC_API_KEY=...` out of a dotenv-style file.
pub fn load_api_key(env_file: &Path) -> Option<String> {
    let content = fs::read_to_string(env_file).ok()?;
    parse_api_key(&content)
}

fn parse_api_key(content: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|line| line.trim().strip_prefix("ANTHROPIC_API_KEY="))
        .map(|v| v.trim().trim_matches('"').to_string())
        .find(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_read_from_dotenv_lines() {
        let content = "# secrets\nOTHER=1\nANTHROPIC_API_KEY=\"sk-test\"\n";
        assert_eq!(parse_api_key(content).as_deref(), Some("sk-test"));
        assert_eq!(parse_api_key("ANTHROPIC_API_KEY=\n"), None);
        assert_eq!(parse_api_key("NOTHING=here"), None);
    }

    #[test]
    fn missing_env_file_yields_no_key() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_api_key(&dir.path().join(".env")).is_none());
    }
}
