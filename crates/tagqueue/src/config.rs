use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::action::{ActionServices, ColorSpaceTag};
use crate::media::SidecarBackend;
use crate::provider::CatalogProvider;

/// Extensions accepted when files or folders are added
const DEFAULT_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "m4a", "m4b", "mov", "mkv", "mka", "avi", "webm", "ts",
];

/// A named set of tags applied to every new item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPreset {
    pub name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Which actions newly added items receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPreferences {
    pub clear_existing_metadata: bool,
    pub search_metadata: bool,
    pub movie_language: String,
    pub tv_language: String,
    pub set_output_filename: bool,
    /// Format string with `{Tag Name}` placeholders
    pub movie_format: String,
    pub tv_format: String,
    pub subtitles: bool,
    pub organize_groups: bool,
    pub fix_fallbacks: bool,
    pub clear_track_names: bool,
    /// Language given to tracks whose language is undetermined
    pub fix_track_language: Option<String>,
    pub color_space: Option<ColorSpaceTag>,
    pub metadata_preset: Option<MetadataPreset>,
    pub optimize: bool,
    /// Library import folder finished files are copied into
    pub send_to_library: Option<PathBuf>,
}

impl Default for ActionPreferences {
    fn default() -> Self {
        Self {
            clear_existing_metadata: false,
            search_metadata: true,
            movie_language: "en".to_string(),
            tv_language: "en".to_string(),
            set_output_filename: false,
            movie_format: "{Name}".to_string(),
            tv_format: "{TV Show} s{TV Season}e{TV Episode #}".to_string(),
            subtitles: true,
            organize_groups: true,
            fix_fallbacks: false,
            clear_track_names: false,
            fix_track_language: None,
            color_space: None,
            metadata_preset: None,
            optimize: true,
            send_to_library: None,
        }
    }
}

/// Configuration for the tagging queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Where the queue is persisted
    pub queue_file: PathBuf,
    /// Output directory; unset writes next to the source
    pub destination: Option<PathBuf>,
    /// Extension given to outputs that are not written in place
    pub file_type: String,
    pub supported_extensions: Vec<String>,
    /// Start processing as soon as items are added
    pub auto_start: bool,
    /// Local metadata catalog (JSON) used by metadata search
    pub catalog: Option<PathBuf>,
    pub actions: ActionPreferences,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl QueueConfig {
    pub fn default_config() -> Self {
        Self {
            queue_file: PathBuf::from("queue.json"),
            destination: None,
            file_type: "m4v".to_string(),
            supported_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            auto_start: false,
            catalog: None,
            actions: ActionPreferences::default(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Whether `path` has one of the supported extensions, ignoring case
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| {
                self.supported_extensions
                    .iter()
                    .any(|supported| supported.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Collaborators for running actions: the sidecar backend plus the configured catalog
    pub fn services(&self) -> Result<ActionServices> {
        let Some(catalog_path) = &self.catalog else {
            return Ok(ActionServices::offline());
        };
        let catalog = Arc::new(
            CatalogProvider::load(catalog_path)
                .with_context(|| format!("Failed to load metadata catalog: {}", catalog_path.display()))?,
        );
        Ok(ActionServices::new(
            Arc::new(SidecarBackend::new()),
            catalog.clone(),
            catalog,
        ))
    }
}
