//! On-demand read of a graph file

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use ssp_core::{AccessFailure, Accessor, DataOrigin, FetchedGraph, Format, Graph, Result, SspError};
use tracing::debug;

pub struct FileAccessor {
    max_age: Duration,
    timeout: Duration,
}

impl FileAccessor {
    pub fn new(max_age: Duration, timeout: Duration) -> Self {
        FileAccessor { max_age, timeout }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

#[async_trait]
impl Accessor<PathBuf> for FileAccessor {
    async fn fetch(&self, origin: &DataOrigin<PathBuf>) -> Result<FetchedGraph> {
        let path = origin.locator();
        let identity = origin.identity();

        let format = Format::from_path(path).ok_or_else(|| {
            SspError::access(
                identity,
                AccessFailure::Malformed(format!("no graph format for {}", path.display())),
            )
        })?;
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SspError::access(identity, AccessFailure::Unreachable(e.to_string())))?;

        // An empty file is an empty graph in every format.
        let content = if text.trim().is_empty() {
            Graph::new()
        } else {
            format
                .parse(&text)
                .map_err(|e| SspError::access(identity, AccessFailure::Malformed(e.to_string())))?
        };

        debug!("Read {} triples from {}", content.len(), path.display());
        Ok(FetchedGraph::valid_for(content, self.max_age))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
