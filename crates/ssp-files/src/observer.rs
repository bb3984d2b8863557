//! Per-file observation driven by the directory watcher

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use ssp_core::{DataOrigin, Observer, Result, SspError, StalenessTimer, UpdateSink, fetch_with_deadline};
use tokio::sync::mpsc;
use tracing::debug;

use crate::accessor::FileAccessor;

/// Change notifications from the watcher, one channel per observed file.
pub type Notifiers = Arc<DashMap<PathBuf, mpsc::Sender<()>>>;

pub struct FileObserver {
    accessor: Arc<FileAccessor>,
    notifiers: Notifiers,
    debounce: Duration,
}

impl FileObserver {
    pub fn new(accessor: Arc<FileAccessor>, notifiers: Notifiers, debounce: Duration) -> Self {
        FileObserver {
            accessor,
            notifiers,
            debounce,
        }
    }
}

/// Removes the file's notifier when the observation ends or is aborted.
struct NotifierGuard {
    notifiers: Notifiers,
    path: PathBuf,
    sender: mpsc::Sender<()>,
}

impl Drop for NotifierGuard {
    fn drop(&mut self) {
        self.notifiers
            .remove_if(&self.path, |_, sender| sender.same_channel(&self.sender));
    }
}

#[async_trait]
impl Observer<PathBuf> for FileObserver {
    async fn observe(&self, origin: DataOrigin<PathBuf>, sink: UpdateSink) -> Result<()> {
        let path = origin.locator().clone();
        let (sender, mut changes) = mpsc::channel(1);
        self.notifiers.insert(path.clone(), sender.clone());
        let _guard = NotifierGuard {
            notifiers: Arc::clone(&self.notifiers),
            path: path.clone(),
            sender,
        };

        let mut staleness = StalenessTimer::new(self.accessor.max_age());
        loop {
            tokio::select! {
                Some(()) = changes.recv() => {
                    tokio::time::sleep(self.debounce).await;
                    while changes.try_recv().is_ok() {}
                    debug!("Re-reading changed file {}", path.display());
                }
                _ = staleness.expired() => {
                    debug!("Refreshing {} at the end of its validity window", path.display());
                }
            }

            let fetched = fetch_with_deadline(self.accessor.as_ref(), &origin)
                .await
                .map_err(|e| SspError::observation(origin.identity(), e.to_string()))?;
            sink.publish(fetched).await?;
            staleness.reset();
        }
    }
}
