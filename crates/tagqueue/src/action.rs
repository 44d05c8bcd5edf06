use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ActionError, MediaError};
use crate::media::{
    run_blocking, tags, ColorTag, MediaBackend, MediaFile, SidecarBackend, Track, TrackKind,
};
use crate::naming::{guess_query, render_format, sanitize_file_name};
use crate::provider::{
    select_chapters, ArtworkKind, ChapterProvider, EmptyCatalog, MetadataProvider, MetadataQuery,
};

/// Subtitle file extensions picked up next to a source file
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt"];

/// Audio formats that need a compatible AAC fallback track
const FALLBACK_NEEDING_FORMATS: &[&str] = &["ac-3", "ac3", "e-ac-3", "eac3", "dts"];

/// Colour tag applied to video tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpaceTag {
    /// Remove any colour description
    None,
    Rec601Pal,
    Rec601Ntsc,
    Rec709,
    Rec2020,
    Rec2100Pq,
    Rec2100Hlg,
}

impl ColorSpaceTag {
    pub fn color_tag(self) -> Option<ColorTag> {
        let (primaries, transfer, matrix) = match self {
            ColorSpaceTag::None => return None,
            ColorSpaceTag::Rec601Pal => (5, 1, 6),
            ColorSpaceTag::Rec601Ntsc => (6, 1, 6),
            ColorSpaceTag::Rec709 => (1, 1, 1),
            ColorSpaceTag::Rec2020 => (9, 1, 9),
            ColorSpaceTag::Rec2100Pq => (9, 16, 9),
            ColorSpaceTag::Rec2100Hlg => (9, 18, 9),
        };
        Some(ColorTag {
            primaries,
            transfer,
            matrix,
        })
    }
}

/// An action kind this build does not know, kept verbatim so saving does not lose it
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownAction {
    pub kind: String,
    pub raw: serde_json::Value,
}

impl UnknownAction {
    pub fn from_value(raw: serde_json::Value) -> Self {
        let kind = raw
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or("<untagged>")
            .to_string();
        Self { kind, raw }
    }
}

/// One step of an item's pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    ClearMetadata,
    SearchMetadata {
        movie_language: String,
        tv_language: String,
    },
    SetOutputFilename {
        movie_format: String,
        tv_format: String,
    },
    AddSubtitles,
    OrganizeGroups,
    FixFallbacks,
    ClearTrackNames,
    SetLanguage {
        language: String,
    },
    ColorSpace {
        tag: ColorSpaceTag,
    },
    ApplyPreset {
        name: String,
        tags: BTreeMap<String, String>,
    },
    /// Terminal: rewrites the destination file
    Optimize,
    /// Terminal: copies the destination file into a library import folder
    SendToLibrary {
        directory: PathBuf,
    },
    #[serde(skip)]
    Unrecognized(UnknownAction),
}

/// Collaborators an action may call out to
#[derive(Clone)]
pub struct ActionServices {
    pub media: Arc<dyn MediaBackend>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub chapters: Arc<dyn ChapterProvider>,
}

impl ActionServices {
    pub fn new(
        media: Arc<dyn MediaBackend>,
        metadata: Arc<dyn MetadataProvider>,
        chapters: Arc<dyn ChapterProvider>,
    ) -> Self {
        Self {
            media,
            metadata,
            chapters,
        }
    }

    /// Sidecar media backend and no metadata sources
    pub fn offline() -> Self {
        Self::new(
            Arc::new(SidecarBackend::new()),
            Arc::new(EmptyCatalog),
            Arc::new(EmptyCatalog),
        )
    }
}

impl std::fmt::Debug for ActionServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionServices")
            .field("metadata", &self.metadata.name())
            .field("chapters", &self.chapters.name())
            .finish()
    }
}

/// What an action may see of its item
pub struct ActionContext<'a> {
    pub source: &'a Path,
    /// Output location, already renamed if output naming ran
    pub destination: &'a Path,
    pub services: &'a ActionServices,
}

impl Action {
    /// Stable tag used in the store and for display
    pub fn kind(&self) -> &str {
        match self {
            Action::ClearMetadata => "clear_metadata",
            Action::SearchMetadata { .. } => "search_metadata",
            Action::SetOutputFilename { .. } => "set_output_filename",
            Action::AddSubtitles => "add_subtitles",
            Action::OrganizeGroups => "organize_groups",
            Action::FixFallbacks => "fix_fallbacks",
            Action::ClearTrackNames => "clear_track_names",
            Action::SetLanguage { .. } => "set_language",
            Action::ColorSpace { .. } => "color_space",
            Action::ApplyPreset { .. } => "apply_preset",
            Action::Optimize => "optimize",
            Action::SendToLibrary { .. } => "send_to_library",
            Action::Unrecognized(unknown) => &unknown.kind,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Action::ClearMetadata => "Clear existing metadata".to_string(),
            Action::SearchMetadata { .. } => "Search metadata".to_string(),
            Action::SetOutputFilename { .. } => "Set output file name".to_string(),
            Action::AddSubtitles => "Load subtitles".to_string(),
            Action::OrganizeGroups => "Organize alternate groups".to_string(),
            Action::FixFallbacks => "Fix audio fallbacks".to_string(),
            Action::ClearTrackNames => "Clear track names".to_string(),
            Action::SetLanguage { language } => format!("Set undefined languages to {}", language),
            Action::ColorSpace { tag } => format!("Set color space to {:?}", tag),
            Action::ApplyPreset { name, .. } => format!("Apply preset \"{}\"", name),
            Action::Optimize => "Optimize".to_string(),
            Action::SendToLibrary { directory } => {
                format!("Send to library ({})", directory.display())
            }
            Action::Unrecognized(unknown) => format!("Unsupported action \"{}\"", unknown.kind),
        }
    }

    /// Terminal actions act on the written destination file, not the representation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Optimize | Action::SendToLibrary { .. })
    }

    /// Apply this action. Every action inspects the current state first so a
    /// re-run after a crash does not apply anything twice.
    pub async fn apply(&self, file: &mut MediaFile, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        match self {
            Action::ClearMetadata => {
                file.metadata.clear();
                file.artwork.clear();
                Ok(())
            }
            Action::SearchMetadata {
                movie_language,
                tv_language,
            } => search_metadata(file, ctx, movie_language, tv_language).await,
            Action::SetOutputFilename {
                movie_format,
                tv_format,
            } => set_output_filename(file, movie_format, tv_format),
            Action::AddSubtitles => add_subtitles(file, ctx.source),
            Action::OrganizeGroups => {
                organize_groups(file);
                Ok(())
            }
            Action::FixFallbacks => {
                fix_fallbacks(file);
                Ok(())
            }
            Action::ClearTrackNames => {
                for track in &mut file.tracks {
                    track.name = None;
                }
                Ok(())
            }
            Action::SetLanguage { language } => {
                for track in file.tracks.iter_mut().filter(|t| t.has_undetermined_language()) {
                    track.language = language.clone();
                }
                Ok(())
            }
            Action::ColorSpace { tag } => {
                let color = tag.color_tag();
                for track in file.tracks.iter_mut().filter(|t| t.kind == TrackKind::Video) {
                    track.color = color;
                }
                Ok(())
            }
            Action::ApplyPreset { tags, .. } => {
                for (key, value) in tags {
                    if value.is_empty() {
                        file.metadata.remove(key);
                    } else {
                        file.metadata.insert(key.clone(), value.clone());
                    }
                }
                Ok(())
            }
            Action::Optimize => {
                let path = ctx.destination.to_path_buf();
                let rewritten = run_blocking(&ctx.services.media, move |media| media.optimize(&path)).await?;
                if !rewritten {
                    debug!("{} already optimized", ctx.destination.display());
                }
                file.optimized = true;
                Ok(())
            }
            Action::SendToLibrary { directory } => {
                let destination = ctx.destination.to_path_buf();
                let directory = directory.clone();
                tokio::task::spawn_blocking(move || send_to_library(&destination, &directory))
                    .await
                    .map_err(|e| MediaError::Task(e.to_string()))?
            }
            Action::Unrecognized(unknown) => Err(ActionError::Unsupported(unknown.kind.clone())),
        }
    }
}

async fn search_metadata(
    file: &mut MediaFile,
    ctx: &ActionContext<'_>,
    movie_language: &str,
    tv_language: &str,
) -> Result<(), ActionError> {
    let query = guess_query(ctx.source, movie_language, tv_language);
    if query.title().is_empty() {
        return Err(ActionError::MissingMetadata(format!(
            "no title in file name {}",
            ctx.source.display()
        )));
    }

    let results = ctx.services.metadata.search(&query).await?;
    let best = results
        .into_iter()
        .next()
        .ok_or_else(|| ActionError::NoResults(query.title().to_string()))?;

    file.metadata.extend(best.tags);
    let preferred_artwork = match &query {
        MetadataQuery::Movie { .. } => {
            file.metadata
                .entry(tags::MEDIA_KIND.to_string())
                .or_insert_with(|| tags::KIND_MOVIE.to_string());
            ArtworkKind::Poster
        }
        MetadataQuery::Episode {
            show,
            season,
            episode,
            ..
        } => {
            let defaults = [
                (tags::MEDIA_KIND, tags::KIND_TV_SHOW.to_string()),
                (tags::TV_SHOW, show.clone()),
                (tags::TV_SEASON, season.to_string()),
                (tags::TV_EPISODE, episode.to_string()),
            ];
            for (key, value) in defaults {
                file.metadata.entry(key.to_string()).or_insert(value);
            }
            ArtworkKind::Season
        }
    };

    let artwork = best
        .artwork
        .iter()
        .find(|a| a.kind == preferred_artwork)
        .or_else(|| best.artwork.first());
    if let Some(artwork) = artwork {
        if !file.artwork.contains(&artwork.url) {
            file.artwork.push(artwork.url.clone());
        }
    }

    if matches!(query, MetadataQuery::Movie { .. }) && file.chapters.is_empty() {
        match ctx.services.chapters.search(query.title(), file.duration).await {
            Ok(sets) => {
                if let Some(set) = select_chapters(sets, file.duration).into_iter().next() {
                    debug!("Using {} chapters from \"{}\"", set.chapters.len(), set.title);
                    file.chapters = set.chapters;
                }
            }
            // Chapters are a bonus, tagging still succeeds without them
            Err(e) => warn!("Chapter lookup for \"{}\" failed: {}", query.title(), e),
        }
    }

    Ok(())
}

fn set_output_filename(file: &mut MediaFile, movie_format: &str, tv_format: &str) -> Result<(), ActionError> {
    let format = if file.is_tv_show() { tv_format } else { movie_format };
    let rendered = render_format(format, &file.metadata)
        .map_err(|missing| ActionError::MissingMetadata(missing.join(", ")))?;
    let name = sanitize_file_name(&rendered);
    if name.is_empty() {
        return Err(ActionError::MissingMetadata(format!(
            "format \"{}\" produced an empty name",
            format
        )));
    }
    file.output_name = Some(name);
    Ok(())
}

fn add_subtitles(file: &mut MediaFile, source: &Path) -> Result<(), ActionError> {
    let (Some(dir), Some(stem)) = (source.parent(), source.file_stem().and_then(|s| s.to_str())) else {
        return Ok(());
    };
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };

    let entries = fs::read_dir(dir).map_err(|source| ActionError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| SUBTITLE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    for path in candidates {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let Some(rest) = name.strip_prefix(stem) else {
            continue;
        };
        if !rest.starts_with('.') {
            continue;
        }
        if file.tracks.iter().any(|t| t.imported_from.as_deref() == Some(path.as_path())) {
            continue;
        }

        let middle = rest.strip_suffix(ext).unwrap_or_default().trim_matches('.');
        let mut track = Track::new(file.next_track_id(), TrackKind::Subtitle, "tx3g");
        if let Some(language) = middle.split('.').next().filter(|l| !l.is_empty()) {
            track.language = language.to_string();
        }
        track.enabled = false;
        track.imported_from = Some(path.clone());
        debug!("Adding subtitle track {} from {}", track.id, path.display());
        file.tracks.push(track);
    }
    Ok(())
}

fn organize_groups(file: &mut MediaFile) {
    let mut first_audio = true;
    for track in file.tracks.iter_mut() {
        match track.kind {
            TrackKind::Audio => {
                track.alternate_group = 1;
                track.enabled = first_audio;
                first_audio = false;
            }
            TrackKind::Subtitle => {
                track.alternate_group = 2;
                track.enabled = false;
            }
            TrackKind::Video | TrackKind::Chapters => {}
        }
    }
}

fn needs_fallback(track: &Track) -> bool {
    track.kind == TrackKind::Audio
        && track.fallback.is_none()
        && FALLBACK_NEEDING_FORMATS.contains(&track.format.to_lowercase().as_str())
}

fn fix_fallbacks(file: &mut MediaFile) {
    let assignments: Vec<(usize, u32)> = file
        .tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| needs_fallback(t))
        .filter_map(|(i, t)| {
            file.tracks
                .iter()
                .find(|aac| {
                    aac.kind == TrackKind::Audio
                        && aac.format.eq_ignore_ascii_case("aac")
                        && aac.language == t.language
                        && aac.alternate_group == t.alternate_group
                })
                .map(|aac| (i, aac.id))
        })
        .collect();

    for (index, fallback) in assignments {
        file.tracks[index].fallback = Some(fallback);
    }
}

fn send_to_library(destination: &Path, directory: &Path) -> Result<(), ActionError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ActionError::Io { path, source }
    };

    let name = destination.file_name().ok_or_else(|| {
        ActionError::MissingMetadata(format!("no file name in {}", destination.display()))
    })?;
    fs::create_dir_all(directory).map_err(io_err(directory))?;

    let target = directory.join(name);
    let size = fs::metadata(destination).map_err(io_err(destination))?.len();
    if let Ok(existing) = fs::metadata(&target) {
        if existing.len() == size {
            debug!("{} already in library", target.display());
            return Ok(());
        }
    }
    fs::copy(destination, &target).map_err(io_err(&target))?;
    debug!("Sent {} to {}", destination.display(), directory.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{Artwork, MetadataResult};
    use async_trait::async_trait;

    struct FixedProvider(Vec<MetadataResult>);

    #[async_trait]
    impl MetadataProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(&self, _query: &MetadataQuery) -> Result<Vec<MetadataResult>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    struct DownProvider;

    #[async_trait]
    impl MetadataProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn search(&self, _query: &MetadataQuery) -> Result<Vec<MetadataResult>, ProviderError> {
            Err(ProviderError::Unavailable("connection refused".to_string()))
        }
    }

    fn services_with(metadata: Arc<dyn MetadataProvider>) -> ActionServices {
        ActionServices::new(Arc::new(SidecarBackend::new()), metadata, Arc::new(EmptyCatalog))
    }

    fn sample_file() -> MediaFile {
        let mut file = MediaFile::default();
        let mut video = Track::new(1, TrackKind::Video, "h264");
        video.name = Some("Main".to_string());
        file.tracks.push(video);
        let mut ac3 = Track::new(2, TrackKind::Audio, "AC-3");
        ac3.language = "eng".to_string();
        file.tracks.push(ac3);
        let mut aac = Track::new(3, TrackKind::Audio, "AAC");
        aac.language = "eng".to_string();
        file.tracks.push(aac);
        file.tracks.push(Track::new(4, TrackKind::Subtitle, "tx3g"));
        file
    }

    async fn run(action: &Action, file: &mut MediaFile, source: &Path, services: &ActionServices) -> Result<(), ActionError> {
        let ctx = ActionContext {
            source,
            destination: source,
            services,
        };
        action.apply(file, &ctx).await
    }

    #[test]
    fn test_action_serializes_with_kind_tag() {
        let action = Action::SetLanguage {
            language: "eng".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "set_language", "language": "eng"}));
        assert_eq!(action.kind(), "set_language");

        let back: Action = serde_json::from_value(serde_json::json!({"kind": "optimize"})).unwrap();
        assert_eq!(back, Action::Optimize);
    }

    #[test]
    fn test_unknown_action_keeps_kind() {
        let unknown = UnknownAction::from_value(serde_json::json!({"kind": "burn_in", "x": 1}));
        assert_eq!(unknown.kind, "burn_in");
        assert_eq!(Action::Unrecognized(unknown).kind(), "burn_in");
    }

    #[test]
    fn test_color_space_tags() {
        assert_eq!(ColorSpaceTag::None.color_tag(), None);
        assert_eq!(
            ColorSpaceTag::Rec2100Pq.color_tag(),
            Some(ColorTag {
                primaries: 9,
                transfer: 16,
                matrix: 9
            })
        );
    }

    #[tokio::test]
    async fn test_track_actions_are_idempotent() {
        let services = ActionServices::offline();
        let source = Path::new("/nonexistent/movie.mkv");
        let actions = [
            Action::OrganizeGroups,
            Action::FixFallbacks,
            Action::ClearTrackNames,
            Action::SetLanguage {
                language: "fra".to_string(),
            },
            Action::ColorSpace {
                tag: ColorSpaceTag::Rec709,
            },
        ];

        let mut once = sample_file();
        for action in &actions {
            run(action, &mut once, source, &services).await.unwrap();
        }
        let mut twice = once.clone();
        for action in &actions {
            run(action, &mut twice, source, &services).await.unwrap();
        }
        assert_eq!(once, twice);

        assert_eq!(once.tracks[1].fallback, Some(3));
        assert_eq!(once.tracks[1].alternate_group, 1);
        assert!(once.tracks[1].enabled);
        assert!(!once.tracks[2].enabled);
        assert_eq!(once.tracks[3].alternate_group, 2);
        assert_eq!(once.tracks[3].language, "fra");
        assert_eq!(once.tracks[1].language, "eng");
        assert!(once.tracks.iter().all(|t| t.name.is_none()));
        assert_eq!(once.tracks[0].color, ColorSpaceTag::Rec709.color_tag());
    }

    #[tokio::test]
    async fn test_apply_preset_sets_and_removes() {
        let services = ActionServices::offline();
        let mut file = MediaFile::default();
        file.metadata.insert("Comments".to_string(), "old".to_string());
        let mut preset = BTreeMap::new();
        preset.insert("Genre".to_string(), "Drama".to_string());
        preset.insert("Comments".to_string(), String::new());
        let action = Action::ApplyPreset {
            name: "Drama".to_string(),
            tags: preset,
        };
        run(&action, &mut file, Path::new("a.mkv"), &services).await.unwrap();
        assert_eq!(file.tag("Genre"), Some("Drama"));
        assert_eq!(file.tag("Comments"), None);
    }

    #[tokio::test]
    async fn test_search_metadata_tags_episode() {
        let mut result = MetadataResult::default();
        result.tags.insert(tags::NAME.to_string(), "The Detail".to_string());
        result.artwork.push(Artwork {
            url: "https://example.invalid/poster.jpg".to_string(),
            kind: ArtworkKind::Poster,
        });
        let services = services_with(Arc::new(FixedProvider(vec![result])));
        let action = Action::SearchMetadata {
            movie_language: "en".to_string(),
            tv_language: "en".to_string(),
        };

        let mut file = MediaFile::default();
        run(&action, &mut file, Path::new("/tv/The.Wire.S01E02.mkv"), &services)
            .await
            .unwrap();
        run(&action, &mut file, Path::new("/tv/The.Wire.S01E02.mkv"), &services)
            .await
            .unwrap();

        assert!(file.is_tv_show());
        assert_eq!(file.tag(tags::NAME), Some("The Detail"));
        assert_eq!(file.tag(tags::TV_SHOW), Some("The Wire"));
        assert_eq!(file.tag(tags::TV_EPISODE), Some("2"));
        assert_eq!(file.artwork.len(), 1);
    }

    #[tokio::test]
    async fn test_search_metadata_reports_errors() {
        let action = Action::SearchMetadata {
            movie_language: "en".to_string(),
            tv_language: "en".to_string(),
        };
        let mut file = MediaFile::default();

        let none = services_with(Arc::new(FixedProvider(Vec::new())));
        let err = run(&action, &mut file, Path::new("Heat.mkv"), &none).await.unwrap_err();
        assert!(matches!(err, ActionError::NoResults(ref t) if t == "Heat"));

        let down = services_with(Arc::new(DownProvider));
        let err = run(&action, &mut file, Path::new("Heat.mkv"), &down).await.unwrap_err();
        assert!(matches!(err, ActionError::Provider(ProviderError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_set_output_filename() {
        let services = ActionServices::offline();
        let action = Action::SetOutputFilename {
            movie_format: "{Name}".to_string(),
            tv_format: "{TV Show} s{TV Season}e{TV Episode #}".to_string(),
        };
        let mut file = MediaFile::default();
        let err = run(&action, &mut file, Path::new("a.mkv"), &services).await.unwrap_err();
        assert!(matches!(err, ActionError::MissingMetadata(_)));

        file.metadata.insert(tags::NAME.to_string(), "Face/Off".to_string());
        run(&action, &mut file, Path::new("a.mkv"), &services).await.unwrap();
        assert_eq!(file.output_name.as_deref(), Some("Face-Off"));
    }

    #[tokio::test]
    async fn test_add_subtitles_matches_stem_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Movie (2001).mkv");
        fs::write(&source, b"x").unwrap();
        fs::write(dir.path().join("Movie (2001).srt"), b"1").unwrap();
        fs::write(dir.path().join("Movie (2001).fr.srt"), b"1").unwrap();
        fs::write(dir.path().join("Other.srt"), b"1").unwrap();
        fs::write(dir.path().join("Movie (2001) extras.srt"), b"1").unwrap();

        let services = ActionServices::offline();
        let mut file = MediaFile::default();
        run(&Action::AddSubtitles, &mut file, &source, &services).await.unwrap();
        run(&Action::AddSubtitles, &mut file, &source, &services).await.unwrap();

        let languages: Vec<&str> = file.tracks.iter().map(|t| t.language.as_str()).collect();
        assert_eq!(languages, vec!["fr", "und"]);
        assert!(file.tracks.iter().all(|t| t.kind == TrackKind::Subtitle && !t.enabled));
    }

    #[tokio::test]
    async fn test_unrecognized_action_fails() {
        let services = ActionServices::offline();
        let action = Action::Unrecognized(UnknownAction::from_value(serde_json::json!({"kind": "x"})));
        let err = run(&action, &mut MediaFile::default(), Path::new("a"), &services)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Unsupported(ref k) if k == "x"));
    }

    #[tokio::test]
    async fn test_send_to_library_copies_once() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("done.m4v");
        fs::write(&dest, b"payload").unwrap();
        let library = dir.path().join("library");

        send_to_library(&dest, &library).unwrap();
        assert_eq!(fs::read(library.join("done.m4v")).unwrap(), b"payload");
        send_to_library(&dest, &library).unwrap();
    }
}
