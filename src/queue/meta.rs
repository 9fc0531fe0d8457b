use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const META_FILE: &str = "queue.meta";

/// Lightweight process-wide queue status stored in `queue.meta`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMeta {
    /// SHA-256 of the configuration file the job was started with
    #[serde(default)]
    pub config_hash: Option<String>,

    /// Host at the head of the rotation when the metadata was written
    #[serde(default)]
    pub host_cursor: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl QueueMeta {
    pub fn new(config_hash: Option<String>) -> Self {
        Self {
            config_hash,
            host_cursor: None,
            created_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Option<Self> {
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, bytes)
    }
}
