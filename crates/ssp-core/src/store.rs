//! Pluggable key/value backends behind the cache

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::SspError;
use crate::format::{Format, parse_ntriples};
use crate::graph::Graph;
use crate::model::ResourceIdentity;

/// Keyed storage of (content, expiry) pairs. No business logic.
///
/// Only the cache task touches a store, so implementations need no locking.
pub trait GraphStore: Send + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn get(&self, identity: &ResourceIdentity) -> Result<Option<Arc<Graph>>, SspError>;

    fn put(
        &mut self,
        identity: &ResourceIdentity,
        content: Arc<Graph>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SspError>;

    /// Remove an entry. Returns whether anything was removed.
    fn delete(&mut self, identity: &ResourceIdentity) -> Result<bool, SspError>;

    /// Every stored identity with its wall-clock expiry.
    fn entries(&self) -> Result<Vec<(ResourceIdentity, DateTime<Utc>)>, SspError>;
}

/// Volatile store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graphs: HashMap<ResourceIdentity, (Arc<Graph>, DateTime<Utc>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, identity: &ResourceIdentity) -> Result<Option<Arc<Graph>>, SspError> {
        Ok(self.graphs.get(identity).map(|(graph, _)| Arc::clone(graph)))
    }

    fn put(
        &mut self,
        identity: &ResourceIdentity,
        content: Arc<Graph>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SspError> {
        self.graphs.insert(identity.clone(), (content, expires_at));
        Ok(())
    }

    fn delete(&mut self, identity: &ResourceIdentity) -> Result<bool, SspError> {
        Ok(self.graphs.remove(identity).is_some())
    }

    fn entries(&self) -> Result<Vec<(ResourceIdentity, DateTime<Utc>)>, SspError> {
        Ok(self
            .graphs
            .iter()
            .map(|(identity, (_, expires_at))| (identity.clone(), *expires_at))
            .collect())
    }
}

/// On-disk record. Content is kept as N-Triples text so the record stays
/// a flat, self-describing structure.
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    identity: String,
    expires_at_millis: i64,
    content: String,
}

/// Persistent store: one bincode file per identity under a directory.
///
/// Calls are blocking file I/O made from the cache task; records are small
/// and the cache serialises every access anyway.
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
}

const RECORD_EXTENSION: &str = "graph";

impl DiskStore {
    /// Open (and create if needed) a store directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SspError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| store_error(&dir, e))?;
        debug!("Disk graph store opened at {}", dir.display());
        Ok(DiskStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record file of `identity`: the SHA-256 of the identity text, so
    /// names stay the same across builds and platforms.
    fn record_path(&self, identity: &ResourceIdentity) -> PathBuf {
        let digest = Sha256::digest(identity.as_str().as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), RECORD_EXTENSION))
    }

    fn read_record(path: &Path) -> Result<DiskRecord, SspError> {
        let bytes = std::fs::read(path).map_err(|e| store_error(path, e))?;
        bincode::deserialize(&bytes).map_err(|e| store_error(path, e))
    }
}

impl GraphStore for DiskStore {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn get(&self, identity: &ResourceIdentity) -> Result<Option<Arc<Graph>>, SspError> {
        let path = self.record_path(identity);
        if !path.exists() {
            return Ok(None);
        }
        let record = Self::read_record(&path)?;
        if record.identity != identity.as_str() {
            // Hash collision with a different identity.
            return Ok(None);
        }
        let graph = parse_ntriples(&record.content)?;
        Ok(Some(Arc::new(graph)))
    }

    fn put(
        &mut self,
        identity: &ResourceIdentity,
        content: Arc<Graph>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SspError> {
        let record = DiskRecord {
            identity: identity.to_string(),
            expires_at_millis: expires_at.timestamp_millis(),
            content: Format::NTriples.serialize(&content)?,
        };
        let bytes = bincode::serialize(&record).map_err(|e| SspError::Store(e.to_string()))?;

        let path = self.record_path(identity);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(|e| store_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| store_error(&path, e))?;
        Ok(())
    }

    fn delete(&mut self, identity: &ResourceIdentity) -> Result<bool, SspError> {
        let path = self.record_path(identity);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(store_error(&path, e)),
        }
    }

    fn entries(&self) -> Result<Vec<(ResourceIdentity, DateTime<Utc>)>, SspError> {
        let mut entries = Vec::new();
        let dir = std::fs::read_dir(&self.dir).map_err(|e| store_error(&self.dir, e))?;
        for entry in dir {
            let path = entry.map_err(|e| store_error(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let record = match Self::read_record(&path) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable graph record: {}", e);
                    continue;
                }
            };
            let (Ok(identity), Some(expires_at)) = (
                ResourceIdentity::parse(record.identity),
                DateTime::<Utc>::from_timestamp_millis(record.expires_at_millis),
            ) else {
                warn!("Skipping corrupt graph record {}", path.display());
                continue;
            };
            entries.push((identity, expires_at));
        }
        Ok(entries)
    }
}

fn store_error(path: &Path, err: impl std::fmt::Display) -> SspError {
    SspError::Store(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Term;
    use tempfile::TempDir;

    fn sample_graph() -> Arc<Graph> {
        let mut graph = Graph::new();
        graph.insert(
            Term::iri("http://example.org/s"),
            Term::iri("http://example.org/p"),
            Term::typed("7", "http://www.w3.org/2001/XMLSchema#integer"),
        );
        Arc::new(graph)
    }

    #[test]
    fn test_memory_store_put_get_delete() {
        let mut store = MemoryStore::new();
        let id = ResourceIdentity::parse("http://example.org/a").unwrap();
        assert!(store.get(&id).unwrap().is_none());

        store.put(&id, sample_graph(), Utc::now()).unwrap();
        assert_eq!(store.get(&id).unwrap(), Some(sample_graph()));
        assert_eq!(store.entries().unwrap().len(), 1);

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
    }

    #[test]
    fn test_disk_record_names_are_stable() {
        let temp_dir = TempDir::new().unwrap();
        let id = ResourceIdentity::parse("http://example.org/a").unwrap();
        let mut store = DiskStore::open(temp_dir.path()).unwrap();
        store.put(&id, sample_graph(), Utc::now()).unwrap();

        let names: Vec<String> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        // sha256("http://example.org/a")
        assert_eq!(
            names,
            vec!["6a2d6a47a2828fe021aefacd33629435a066843485eac81b46bf451f79461bdb.graph".to_string()]
        );
    }

    #[test]
    fn test_disk_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let id = ResourceIdentity::parse("coap://[::1]/temperature").unwrap();
        let expires_at = DateTime::<Utc>::from_timestamp_millis(Utc::now().timestamp_millis() + 60_000).unwrap();

        {
            let mut store = DiskStore::open(temp_dir.path()).unwrap();
            store.put(&id, sample_graph(), expires_at).unwrap();
        }

        let mut store = DiskStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.get(&id).unwrap(), Some(sample_graph()));
        assert_eq!(store.entries().unwrap(), vec![(id.clone(), expires_at)]);

        assert!(store.delete(&id).unwrap());
        assert!(store.get(&id).unwrap().is_none());
        assert!(store.entries().unwrap().is_empty());
    }
}
