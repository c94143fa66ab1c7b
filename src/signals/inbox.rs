use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Signal, SignalAggregator};

/// Drains `*.json` signal files from a directory. Each file holds one
/// signal or an array of them and is removed once read.
pub struct InboxAggregator {
    dir: PathBuf,
}

impl InboxAggregator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read_file(path: &PathBuf) -> Result<Vec<Signal>, String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
        if value.is_array() {
            serde_json::from_value(value).map_err(|e| e.to_string())
        } else {
            serde_json::from_value(value).map(|s| vec![s]).map_err(|e| e.to_string())
        }
    }
}

#[async_trait]
impl SignalAggregator for InboxAggregator {
    fn name(&self) -> &str {
        "inbox"
    }

    async fn gather(&self, cancel: &CancellationToken) -> Vec<Signal> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "inbox unreadable");
                return Vec::new();
            }
        };

        let mut paths = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut signals = Vec::new();
        for path in paths {
            if cancel.is_cancelled() {
                break;
            }
            match Self::read_file(&path).await {
                Ok(found) => {
                    debug!(path = %path.display(), count = found.len(), "inbox signals read");
                    signals.extend(found);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "discarding malformed signal file"),
            }
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to remove signal file");
            }
        }
        signals
    }
}
