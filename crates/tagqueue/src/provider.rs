//! Metadata and chapter lookup collaborators.
//!
//! Network search services live behind [`MetadataProvider`] and
//! [`ChapterProvider`]. The crate ships a file-backed [`CatalogProvider`]
//! and an [`EmptyCatalog`] that never finds anything.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::media::Chapter;

/// Chapter sets whose duration is within this many milliseconds of the file are preferred
pub const CHAPTER_DURATION_DELTA: u64 = 20_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataQuery {
    Movie {
        title: String,
        year: Option<u16>,
        language: String,
    },
    Episode {
        show: String,
        season: u32,
        episode: u32,
        language: String,
    },
}

impl MetadataQuery {
    pub fn title(&self) -> &str {
        match self {
            MetadataQuery::Movie { title, .. } => title,
            MetadataQuery::Episode { show, .. } => show,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtworkKind {
    Poster,
    Season,
    Square,
    Episode,
    Backdrop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artwork {
    pub url: String,
    pub kind: ArtworkKind,
}

/// One candidate record returned by a metadata search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataResult {
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub artwork: Vec<Artwork>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterResult {
    pub title: String,
    /// Total duration in milliseconds
    pub duration: u64,
    #[serde(default)]
    pub confirmations: u32,
    pub chapters: Vec<Chapter>,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Search for candidate records, best match first
    async fn search(&self, query: &MetadataQuery) -> Result<Vec<MetadataResult>, ProviderError>;
}

#[async_trait]
pub trait ChapterProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Search chapter sets for a title of roughly `duration` milliseconds
    async fn search(&self, title: &str, duration: u64) -> Result<Vec<ChapterResult>, ProviderError>;
}

/// Narrow chapter search results to the ones plausible for a file of `duration` ms.
///
/// Sets within [`CHAPTER_DURATION_DELTA`] of the duration win, then sets
/// whose last chapter starts before the end of the file, then everything.
pub fn select_chapters(results: Vec<ChapterResult>, duration: u64) -> Vec<ChapterResult> {
    let near: Vec<ChapterResult> = results
        .iter()
        .filter(|r| r.duration.abs_diff(duration) < CHAPTER_DURATION_DELTA)
        .cloned()
        .collect();
    if duration > 0 && !near.is_empty() {
        return near;
    }

    let shorter: Vec<ChapterResult> = results
        .iter()
        .filter(|r| matches!(r.chapters.last(), Some(last) if last.timestamp < duration))
        .cloned()
        .collect();
    if !shorter.is_empty() {
        return shorter;
    }

    results
}

fn normalize(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Deserialize)]
struct MovieEntry {
    title: String,
    #[serde(default)]
    year: Option<u16>,
    #[serde(flatten)]
    result: MetadataResult,
}

#[derive(Debug, Clone, Deserialize)]
struct EpisodeEntry {
    show: String,
    season: u32,
    episode: u32,
    #[serde(flatten)]
    result: MetadataResult,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Catalog {
    #[serde(default)]
    movies: Vec<MovieEntry>,
    #[serde(default)]
    episodes: Vec<EpisodeEntry>,
    #[serde(default)]
    chapters: Vec<ChapterResult>,
}

/// Metadata and chapters served from a local JSON catalog file
#[derive(Debug, Clone)]
pub struct CatalogProvider {
    path: PathBuf,
    catalog: Catalog,
}

impl CatalogProvider {
    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let content = fs::read_to_string(path).map_err(|source| ProviderError::Catalog {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog: Catalog = serde_json::from_str(&content)
            .map_err(|e| ProviderError::Malformed(format!("{}: {}", path.display(), e)))?;
        debug!(
            "Loaded catalog {}: {} movies, {} episodes, {} chapter sets",
            path.display(),
            catalog.movies.len(),
            catalog.episodes.len(),
            catalog.chapters.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            catalog,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetadataProvider for CatalogProvider {
    fn name(&self) -> &str {
        "catalog"
    }

    async fn search(&self, query: &MetadataQuery) -> Result<Vec<MetadataResult>, ProviderError> {
        let wanted = normalize(query.title());
        let results = match query {
            MetadataQuery::Movie { year, .. } => self
                .catalog
                .movies
                .iter()
                .filter(|m| normalize(&m.title) == wanted)
                .filter(|m| match (year, m.year) {
                    (Some(a), Some(b)) => *a == b,
                    _ => true,
                })
                .map(|m| m.result.clone())
                .collect(),
            MetadataQuery::Episode {
                season, episode, ..
            } => self
                .catalog
                .episodes
                .iter()
                .filter(|e| normalize(&e.show) == wanted)
                .filter(|e| e.season == *season && e.episode == *episode)
                .map(|e| e.result.clone())
                .collect(),
        };
        Ok(results)
    }
}

#[async_trait]
impl ChapterProvider for CatalogProvider {
    fn name(&self) -> &str {
        "catalog"
    }

    async fn search(&self, title: &str, duration: u64) -> Result<Vec<ChapterResult>, ProviderError> {
        let wanted = normalize(title);
        let matches = self
            .catalog
            .chapters
            .iter()
            .filter(|c| normalize(&c.title) == wanted)
            .cloned()
            .collect();
        Ok(select_chapters(matches, duration))
    }
}

/// Provider with nothing in it, used when no catalog is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

#[async_trait]
impl MetadataProvider for EmptyCatalog {
    fn name(&self) -> &str {
        "empty"
    }

    async fn search(&self, _query: &MetadataQuery) -> Result<Vec<MetadataResult>, ProviderError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl ChapterProvider for EmptyCatalog {
    fn name(&self) -> &str {
        "empty"
    }

    async fn search(&self, _title: &str, _duration: u64) -> Result<Vec<ChapterResult>, ProviderError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chapter_set(title: &str, duration: u64, last_start: u64) -> ChapterResult {
        ChapterResult {
            title: title.to_string(),
            duration,
            confirmations: 1,
            chapters: vec![
                Chapter {
                    title: "Start".to_string(),
                    timestamp: 0,
                },
                Chapter {
                    title: "End".to_string(),
                    timestamp: last_start,
                },
            ],
        }
    }

    #[test]
    fn test_select_prefers_close_durations() {
        let results = vec![
            chapter_set("a", 7_000_000, 6_900_000),
            chapter_set("b", 6_010_000, 5_900_000),
            chapter_set("c", 5_000_000, 4_000_000),
        ];
        let picked = select_chapters(results, 6_000_000);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].title, "b");
    }

    #[test]
    fn test_select_falls_back_to_sets_ending_before_file() {
        let results = vec![
            chapter_set("long", 9_000_000, 8_500_000),
            chapter_set("short", 3_000_000, 2_500_000),
        ];
        let picked = select_chapters(results, 6_000_000);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].title, "short");
    }

    #[test]
    fn test_select_unknown_duration_keeps_everything() {
        let results = vec![chapter_set("a", 10, 5), chapter_set("b", 20_000, 15_000)];
        assert_eq!(select_chapters(results.clone(), 0), results);
    }

    #[test]
    fn test_normalize_ignores_punctuation_and_case() {
        assert_eq!(normalize("The.Matrix_Reloaded "), "the matrix reloaded");
        assert_eq!(normalize("Amélie!"), normalize("amélie"));
    }

    #[tokio::test]
    async fn test_catalog_matches_movies_and_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(
            &path,
            r#"{
                "movies": [
                    {"title": "Heat", "year": 1995, "tags": {"Name": "Heat"}},
                    {"title": "Heat", "year": 1986, "tags": {"Name": "Heat (1986)"}}
                ],
                "episodes": [
                    {"show": "The Wire", "season": 1, "episode": 2, "tags": {"Name": "The Detail"}}
                ]
            }"#,
        )
        .unwrap();
        let catalog = CatalogProvider::load(&path).unwrap();

        let movie = MetadataQuery::Movie {
            title: "heat".to_string(),
            year: Some(1995),
            language: "en".to_string(),
        };
        let found = MetadataProvider::search(&catalog, &movie).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tags["Name"], "Heat");

        let episode = MetadataQuery::Episode {
            show: "the wire".to_string(),
            season: 1,
            episode: 2,
            language: "en".to_string(),
        };
        let found = MetadataProvider::search(&catalog, &episode).await.unwrap();
        assert_eq!(found[0].tags["Name"], "The Detail");
    }

    #[test]
    fn test_catalog_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            CatalogProvider::load(&path),
            Err(ProviderError::Malformed(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Chapter selection never invents results and never returns an empty set
        /// when given candidates.
        #[test]
        fn test_select_chapters_returns_subset(
            durations in prop::collection::vec((1u64..10_000_000, 0u64..10_000_000), 1..8),
            file_duration in 0u64..10_000_000,
        ) {
            let results: Vec<ChapterResult> = durations
                .iter()
                .enumerate()
                .map(|(i, (d, last))| chapter_set(&i.to_string(), *d, *last))
                .collect();
            let picked = select_chapters(results.clone(), file_duration);

            prop_assert!(!picked.is_empty());
            for p in &picked {
                prop_assert!(results.contains(p));
            }
        }
    }
}
