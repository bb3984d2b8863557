//! SSP Files: graph files in a watched directory as a provider family

pub mod config;
pub mod accessor;
pub mod observer;
pub mod watcher;
pub mod family;


use std::path::PathBuf;

pub use config::FilesConfig;
pub use accessor::FileAccessor;
pub use observer::FileObserver;
pub use watcher::{FileWatcher, WatchEvent};
pub use family::{FAMILY, FilesFamily};

/// Setup failures of the file family.
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    #[error("data directory {path:?} is not usable: {source}")]
    Root {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}
