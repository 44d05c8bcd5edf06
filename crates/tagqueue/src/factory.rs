//! Turns accepted files into queue items carrying the configured actions.

use std::path::{Path, PathBuf};

use crate::action::Action;
use crate::config::{ActionPreferences, QueueConfig};
use crate::item::QueueItem;

/// Containers that can be tagged in place
const MPEG4_EXTENSIONS: &[&str] = &["mp4", "m4v", "m4a"];

#[derive(Debug, Clone)]
pub struct ItemFactory {
    prefs: ActionPreferences,
    destination: Option<PathBuf>,
    file_type: String,
}

impl ItemFactory {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            prefs: config.actions.clone(),
            destination: config.destination.clone(),
            file_type: config.file_type.clone(),
        }
    }

    /// The action list every new item starts with
    pub fn actions(&self) -> Vec<Action> {
        let prefs = &self.prefs;
        let mut actions = Vec::new();

        if prefs.clear_existing_metadata {
            actions.push(Action::ClearMetadata);
        }
        if prefs.search_metadata {
            actions.push(Action::SearchMetadata {
                movie_language: prefs.movie_language.clone(),
                tv_language: prefs.tv_language.clone(),
            });
        }
        if prefs.set_output_filename {
            actions.push(Action::SetOutputFilename {
                movie_format: prefs.movie_format.clone(),
                tv_format: prefs.tv_format.clone(),
            });
        }
        if prefs.subtitles {
            actions.push(Action::AddSubtitles);
        }
        if prefs.organize_groups {
            actions.push(Action::OrganizeGroups);
        }
        if prefs.fix_fallbacks {
            actions.push(Action::FixFallbacks);
        }
        if prefs.clear_track_names {
            actions.push(Action::ClearTrackNames);
        }
        if let Some(language) = &prefs.fix_track_language {
            actions.push(Action::SetLanguage {
                language: language.clone(),
            });
        }
        if let Some(tag) = prefs.color_space {
            actions.push(Action::ColorSpace { tag });
        }
        if let Some(preset) = &prefs.metadata_preset {
            actions.push(Action::ApplyPreset {
                name: preset.name.clone(),
                tags: preset.tags.clone(),
            });
        }
        if prefs.optimize {
            actions.push(Action::Optimize);
        }
        if let Some(directory) = &prefs.send_to_library {
            actions.push(Action::SendToLibrary {
                directory: directory.clone(),
            });
        }

        actions
    }

    /// Output directory if configured, else in place for MPEG-4 files, else
    /// next to the source with the configured extension
    pub fn destination_for(&self, source: &Path) -> PathBuf {
        if let Some(dir) = &self.destination {
            let name = source.file_name().map(PathBuf::from).unwrap_or_default();
            return dir.join(name).with_extension(&self.file_type);
        }

        let is_mpeg4 = source
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| MPEG4_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if is_mpeg4 {
            source.to_path_buf()
        } else {
            source.with_extension(&self.file_type)
        }
    }

    pub fn create_item(&self, source: &Path) -> QueueItem {
        QueueItem::new(source)
            .with_destination(self.destination_for(source))
            .with_actions(self.actions())
    }

    pub fn create_items(&self, sources: &[PathBuf]) -> Vec<QueueItem> {
        sources.iter().map(|source| self.create_item(source)).collect()
    }

    /// Ready an item built elsewhere for the queue: adds optimize when configured
    pub fn prepare_external(&self, mut item: QueueItem) -> QueueItem {
        if self.prefs.optimize && !item.actions.iter().any(|a| *a == Action::Optimize) {
            // Keep anything that must see the written file last
            let at = item
                .actions
                .iter()
                .position(|a| matches!(a, Action::SendToLibrary { .. }))
                .unwrap_or(item.actions.len());
            item.actions.insert(at, Action::Optimize);
        }
        item
    }
}
