//! Registry glue for graph files under one root directory

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use ssp_core::{CacheHandle, DataOrigin, IdentityClaims, Registry, ResourceIdentity, Result, Snapshot, SspError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::FilesError;
use crate::accessor::FileAccessor;
use crate::config::FilesConfig;
use crate::observer::{FileObserver, Notifiers};
use crate::watcher::{FileWatcher, WatchEvent, should_ignore_path};

pub const FAMILY: &str = "files";

/// The file-backed provider family: discovery, watching and its registry.
pub struct FilesFamily {
    registry: Registry<PathBuf>,
    root: PathBuf,
    base_uri: String,
    matcher: GlobSet,
    notifiers: Notifiers,
}

impl FilesFamily {
    pub fn new(
        config: &FilesConfig,
        base_uri: &str,
        cache: CacheHandle,
        claims: IdentityClaims,
    ) -> std::result::Result<Self, FilesError> {
        let root = config
            .root
            .canonicalize()
            .map_err(|source| FilesError::Root {
                path: config.root.clone(),
                source,
            })?;

        let mut builder = GlobSetBuilder::new();
        for pattern in &config.patterns {
            builder.add(Glob::new(pattern)?);
        }
        let matcher = builder.build()?;

        let notifiers: Notifiers = Arc::new(DashMap::new());
        let accessor = Arc::new(FileAccessor::new(config.max_age(), config.fetch_timeout()));
        let observer = Arc::new(FileObserver::new(
            Arc::clone(&accessor),
            Arc::clone(&notifiers),
            config.debounce(),
        ));
        let registry: Registry<PathBuf> = Registry::new(FAMILY, accessor, observer, cache, claims);

        Ok(FilesFamily {
            registry,
            root,
            base_uri: base_uri.trim_end_matches('/').to_string(),
            matcher,
            notifiers,
        })
    }

    pub fn registry(&self) -> &Registry<PathBuf> {
        &self.registry
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` lies under the root and matches a configured pattern.
    pub fn matches(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .is_ok_and(|relative| self.matcher.is_match(relative))
    }

    /// `<base>/files/<relative path>`, with spaces percent-encoded.
    pub fn identity_for(&self, path: &Path) -> Result<ResourceIdentity> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| SspError::InvalidIdentity(path.display().to_string()))?;
        let segments: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(segment) => Some(segment.to_string_lossy().replace(' ', "%20")),
                _ => None,
            })
            .collect();
        ResourceIdentity::under(&self.base_uri, &format!("files/{}", segments.join("/")))
    }

    pub fn origin_for(&self, path: &Path) -> Result<DataOrigin<PathBuf>> {
        Ok(DataOrigin::new(path.to_path_buf(), self.identity_for(path)?))
    }

    /// Walk the root and register every matching file.
    pub async fn discover(&self) -> Vec<(PathBuf, Result<Snapshot>)> {
        let root = self.root.clone();
        let files = tokio::task::spawn_blocking(move || {
            WalkBuilder::new(&root)
                .standard_filters(false)
                .hidden(true)
                .build()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
                .map(|entry| entry.into_path())
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_default();

        let mut outcomes = Vec::new();
        for path in files.into_iter().filter(|p| self.matches(p) && !should_ignore_path(p)) {
            let outcome = self.register_path(&path).await;
            outcomes.push((path, outcome));
        }

        let registered = outcomes.iter().filter(|(_, o)| o.is_ok()).count();
        info!(
            "Discovered {} graph files under {:?} ({} registered)",
            outcomes.len(),
            self.root,
            registered
        );
        outcomes
    }

    async fn register_path(&self, path: &Path) -> Result<Snapshot> {
        let origin = self.origin_for(path)?;
        self.registry.register(origin).await.inspect_err(|e| {
            warn!("Could not register {}: {}", path.display(), e);
        })
    }

    /// Start the recursive watcher; events are applied on a background task.
    pub fn watch(self: &Arc<Self>) -> std::result::Result<JoinHandle<()>, FilesError> {
        let mut watcher = FileWatcher::new()?;
        watcher.watch_directory(&self.root)?;

        let family = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while let Some(event) = watcher.next_event().await {
                family.handle_event(event).await;
            }
            debug!("File watcher for {:?} stopped", family.root);
        }))
    }

    /// Apply one watch event to the registry.
    pub async fn handle_event(&self, event: WatchEvent) {
        let path = event.path();
        if should_ignore_path(path) || !self.matches(path) {
            return;
        }

        let identity = match self.identity_for(path) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Ignoring {}: {}", path.display(), e);
                return;
            }
        };

        if !path.is_file() {
            if self.registry.contains(&identity) {
                info!("File removed: {:?}", path);
                if let Err(e) = self.registry.unregister(&identity).await {
                    debug!("Unregistering {} failed: {}", identity, e);
                }
            }
            return;
        }

        if !self.notify_changed(path) && !self.registry.contains(&identity) {
            info!("File created: {:?}", path);
            let _ = self.register_path(path).await;
        }
    }

    /// Wake the observer of `path`. Returns false if nobody observes it.
    pub fn notify_changed(&self, path: &Path) -> bool {
        let Some(sender) = self.notifiers.get(path).map(|s| s.clone()) else {
            return false;
        };
        match sender.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Closed(())) => false,
        }
    }
}
