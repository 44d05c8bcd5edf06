use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::MediaError;
use crate::store::write_atomically;

/// Well-known metadata tag names
pub mod tags {
    pub const NAME: &str = "Name";
    pub const MEDIA_KIND: &str = "Media Kind";
    pub const TV_SHOW: &str = "TV Show";
    pub const TV_SEASON: &str = "TV Season";
    pub const TV_EPISODE: &str = "TV Episode #";
    pub const RELEASE_DATE: &str = "Release Date";

    /// Value of [`MEDIA_KIND`] for episodes
    pub const KIND_TV_SHOW: &str = "TV Show";
    /// Value of [`MEDIA_KIND`] for movies
    pub const KIND_MOVIE: &str = "Movie";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
    Chapters,
}

/// Colour description stored on a video track (ITU-T H.273 code points)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorTag {
    pub primaries: u16,
    pub transfer: u16,
    pub matrix: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: u32,
    pub kind: TrackKind,
    pub format: String,
    #[serde(default = "undetermined_language")]
    pub language: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 0 means the track belongs to no alternate group
    #[serde(default)]
    pub alternate_group: u16,
    #[serde(default)]
    pub fallback: Option<u32>,
    /// External file the track was imported from
    #[serde(default)]
    pub imported_from: Option<PathBuf>,
    #[serde(default)]
    pub color: Option<ColorTag>,
}

pub const UNDETERMINED_LANGUAGE: &str = "und";

fn undetermined_language() -> String {
    UNDETERMINED_LANGUAGE.to_string()
}

fn default_enabled() -> bool {
    true
}

impl Track {
    pub fn new(id: u32, kind: TrackKind, format: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            format: format.into(),
            language: undetermined_language(),
            name: None,
            enabled: true,
            alternate_group: 0,
            fallback: None,
            imported_from: None,
            color: None,
        }
    }

    pub fn has_undetermined_language(&self) -> bool {
        self.language.is_empty() || self.language == UNDETERMINED_LANGUAGE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    /// Start time in milliseconds
    pub timestamp: u64,
}

/// In-memory representation of an opened media container.
///
/// Owned by exactly one actor at a time: the worker while the item is
/// `working`, the controller while it is `editing`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub artwork: Vec<String>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub tracks: Vec<Track>,
    /// Duration in milliseconds, 0 when unknown
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub optimized: bool,
    /// File name (without extension) chosen by output naming, applied when written
    #[serde(skip)]
    pub output_name: Option<String>,
}

impl MediaFile {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn is_tv_show(&self) -> bool {
        self.tag(tags::MEDIA_KIND) == Some(tags::KIND_TV_SHOW)
    }

    pub fn next_track_id(&self) -> u32 {
        self.tracks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }
}

/// The media container library the actions operate through
pub trait MediaBackend: Send + Sync {
    /// Open `path` into an in-memory representation
    fn open(&self, path: &Path) -> Result<MediaFile, MediaError>;

    /// Write `file` to `destination`, muxing from `source` when they differ
    fn write(&self, file: &MediaFile, source: &Path, destination: &Path) -> Result<(), MediaError>;

    /// Optimize the file at `path` in place. Returns whether any work was done.
    fn optimize(&self, path: &Path) -> Result<bool, MediaError>;
}

/// Run a backend call on the blocking thread pool so container I/O never stalls the runtime
pub async fn run_blocking<T, F>(backend: &Arc<dyn MediaBackend>, call: F) -> Result<T, MediaError>
where
    T: Send + 'static,
    F: FnOnce(&dyn MediaBackend) -> Result<T, MediaError> + Send + 'static,
{
    let backend = Arc::clone(backend);
    tokio::task::spawn_blocking(move || call(backend.as_ref()))
        .await
        .map_err(|e| MediaError::Task(e.to_string()))?
}

/// Get the path to the tag sidecar for a given media file
pub fn sidecar_path(file_path: &Path) -> PathBuf {
    let mut name = file_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tags.json");
    file_path.with_file_name(name)
}

/// Backend that keeps container edits in a JSON sidecar next to the media file
#[derive(Debug, Clone, Default)]
pub struct SidecarBackend;

impl SidecarBackend {
    pub fn new() -> Self {
        SidecarBackend
    }

    fn read_sidecar(&self, file_path: &Path) -> Result<Option<MediaFile>, MediaError> {
        let path = sidecar_path(file_path);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|source| MediaError::Io {
            path: path.clone(),
            source,
        })?;
        let file = serde_json::from_str(&content).map_err(|e| MediaError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(file))
    }

    fn write_sidecar(&self, file_path: &Path, file: &MediaFile) -> Result<(), MediaError> {
        let path = sidecar_path(file_path);
        let json = serde_json::to_vec_pretty(file).map_err(|e| MediaError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        write_atomically(&path, &json).map_err(|source| MediaError::Io { path, source })
    }
}

impl MediaBackend for SidecarBackend {
    fn open(&self, path: &Path) -> Result<MediaFile, MediaError> {
        if !path.is_file() {
            return Err(MediaError::NotFound(path.to_path_buf()));
        }
        Ok(self.read_sidecar(path)?.unwrap_or_default())
    }

    fn write(&self, file: &MediaFile, source: &Path, destination: &Path) -> Result<(), MediaError> {
        if source != destination {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|e| MediaError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            let mut partial = destination.as_os_str().to_os_string();
            partial.push(".partial");
            let partial = PathBuf::from(partial);
            fs::copy(source, &partial).map_err(|e| MediaError::Io {
                path: source.to_path_buf(),
                source: e,
            })?;
            fs::rename(&partial, destination).map_err(|e| MediaError::Io {
                path: destination.to_path_buf(),
                source: e,
            })?;
            debug!("Copied {} -> {}", source.display(), destination.display());
        }
        self.write_sidecar(destination, file)
    }

    fn optimize(&self, path: &Path) -> Result<bool, MediaError> {
        if !path.is_file() {
            return Err(MediaError::NotFound(path.to_path_buf()));
        }
        let mut file = self.read_sidecar(path)?.unwrap_or_default();
        if file.optimized {
            return Ok(false);
        }
        file.optimized = true;
        self.write_sidecar(path, &file)?;
        Ok(true)
    }
}
