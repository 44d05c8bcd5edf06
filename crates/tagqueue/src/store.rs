use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::item::QueueItem;

/// Version written into every queue document
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct DocumentOut<'a> {
    version: u32,
    items: &'a [QueueItem],
}

#[derive(Deserialize)]
struct DocumentHeader {
    version: u32,
}

#[derive(Deserialize)]
struct DocumentIn {
    #[serde(default)]
    items: Vec<QueueItem>,
}

/// Result of loading the store. A failed load still yields a usable (empty) queue.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub items: Vec<QueueItem>,
    /// Items found `working` or `editing` and put back to `ready`
    pub recovered: usize,
    pub error: Option<PersistenceError>,
    /// Where an unreadable file was moved so a later save cannot overwrite it
    pub quarantined: Option<PathBuf>,
}

/// Write `bytes` to `path` so readers see either the old or the new file, never a mix
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{}.{}.tmp", name, std::process::id()));

    let result = (|| {
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// The queue's item list on disk, as a single JSON document
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `items` in order, atomically
    pub fn save(&self, items: &[QueueItem]) -> Result<(), PersistenceError> {
        let doc = DocumentOut {
            version: FORMAT_VERSION,
            items,
        };
        let json = serde_json::to_vec_pretty(&doc).map_err(PersistenceError::Encode)?;
        write_atomically(&self.path, &json).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Load the item list, resetting interrupted items to `ready`
    pub fn load(&self) -> LoadOutcome {
        if !self.path.exists() {
            return LoadOutcome::default();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(source) => {
                return LoadOutcome {
                    error: Some(PersistenceError::Read {
                        path: self.path.clone(),
                        source,
                    }),
                    ..LoadOutcome::default()
                }
            }
        };

        let mut items = match self.parse(&content) {
            Ok(items) => items,
            Err(error) => {
                warn!("Queue file {} is unusable: {}", self.path.display(), error);
                return LoadOutcome {
                    error: Some(error),
                    quarantined: self.quarantine(),
                    ..LoadOutcome::default()
                };
            }
        };

        let mut recovered = 0;
        for item in items.iter_mut() {
            if item.recover() {
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!("Recovered {} interrupted item(s) from {}", recovered, self.path.display());
        }

        LoadOutcome {
            items,
            recovered,
            error: None,
            quarantined: None,
        }
    }

    fn parse(&self, content: &str) -> Result<Vec<QueueItem>, PersistenceError> {
        let corrupt = |source| PersistenceError::Corrupt {
            path: self.path.clone(),
            source,
        };
        let header: DocumentHeader = serde_json::from_str(content).map_err(corrupt)?;
        if header.version > FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                path: self.path.clone(),
                found: header.version,
                supported: FORMAT_VERSION,
            });
        }
        let doc: DocumentIn = serde_json::from_str(content).map_err(corrupt)?;
        Ok(doc.items)
    }

    fn quarantine(&self) -> Option<PathBuf> {
        let name = self.path.file_name()?.to_string_lossy().into_owned();
        let target = self.path.with_file_name(format!(
            "{}.corrupt-{}",
            name,
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        match fs::rename(&self.path, &target) {
            Ok(()) => {
                warn!("Moved unusable queue file to {}", target.display());
                Some(target)
            }
            Err(e) => {
                warn!("Failed to move aside {}: {}", self.path.display(), e);
                None
            }
        }
    }
}
