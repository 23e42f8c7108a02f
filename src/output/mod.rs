use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::Record;
use crate::traits::RecordSink;

/// Default output file name
pub const DEFAULT_OUTPUT_FILE: &str = "scraped_products.json";

/// Writes the record set as a pretty-printed JSON array, replacing the file
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonFileSink {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_FILE)
    }
}

/// Serializes `records` with four-space indentation
pub fn to_pretty_json(records: &[Record]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    records.serialize(&mut serializer)?;
    Ok(buffer)
}

#[async_trait]
impl RecordSink for JsonFileSink {
    async fn save(&self, records: &[Record]) -> Result<()> {
        let json = to_pretty_json(records)?;

        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        info!("Saved {} records to {}", records.len(), self.path.display());
        Ok(())
    }
}
