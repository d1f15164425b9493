use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to set up watch on {path}: {source}")]
    Watch {
        path: String,
        #[source]
        source: notify::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl TelemetryError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        TelemetryError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn watch(path: impl AsRef<std::path::Path>, source: notify::Error) -> Self {
        TelemetryError::Watch {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn json(path: impl AsRef<std::path::Path>, source: serde_json::Error) -> Self {
        TelemetryError::Json {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Failures of the optional description enrichment call.
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("No API credentials configured")]
    MissingCredentials,
    #[error("Enrichment request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Enrichment service returned status {0}")]
    Status(u16),
    #[error("Enrichment timed out after {0} ms")]
    Timeout(u64),
    #[error("Enrichment reply was empty or unusable")]
    Unusable,
}
