use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the ingestion counters, served by `/health`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Metrics {
    pub lines_read: u64,
    pub malformed_lines: u64,
    pub events_emitted: u64,
    pub read_errors: u64,
    pub enrichment_requests: u64,
    pub enrichment_failures: u64,
    pub subscribers_dropped: u64,
}

/// Diagnostic counters. Malformed data is routine; it is only counted.
#[derive(Debug, Default)]
pub struct IngestStats {
    lines_read: AtomicU64,
    malformed_lines: AtomicU64,
    events_emitted: AtomicU64,
    read_errors: AtomicU64,
    enrichment_requests: AtomicU64,
    enrichment_failures: AtomicU64,
    subscribers_dropped: AtomicU64,
}

impl IngestStats {
    pub fn record_line(&self, malformed: bool) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
        if malformed {
            self.malformed_lines.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_events(&self, count: usize) {
        self.events_emitted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enrichment(&self, failed: bool) {
        self.enrichment_requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.enrichment_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_subscriber_dropped(&self) {
        self.subscribers_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Metrics {
        Metrics {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            enrichment_requests: self.enrichment_requests.load(Ordering::Relaxed),
            enrichment_failures: self.enrichment_failures.load(Ordering::Relaxed),
            subscribers_dropped: self.subscribers_dropped.load(Ordering::Relaxed),
        }
    }
}
