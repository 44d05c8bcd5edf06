use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::QueueConfig;

/// What happened to one path offered to the queue
#[derive(Debug, Clone, PartialEq)]
pub enum ScanResult {
    /// File should become a queue item
    Candidate(PathBuf),
    /// File was left out (path, reason)
    Skipped(PathBuf, String),
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn check_file(path: &Path, config: &QueueConfig) -> ScanResult {
    if config.is_supported(path) {
        debug!("Found media file: {}", path.display());
        ScanResult::Candidate(path.to_path_buf())
    } else {
        ScanResult::Skipped(path.to_path_buf(), "unsupported file type".to_string())
    }
}

/// Expand one dropped path: a folder contributes its visible files (not
/// subfolders), a file is kept when its extension is supported
pub fn scan_path(path: &Path, config: &QueueConfig) -> Vec<ScanResult> {
    if !path.exists() {
        warn!("Path does not exist: {}", path.display());
        return vec![ScanResult::Skipped(path.to_path_buf(), "not found".to_string())];
    }
    if !path.is_dir() {
        return vec![check_file(path, config)];
    }

    info!("Scanning directory: {}", path.display());
    let walker = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    let mut results = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        results.push(check_file(entry.path(), config));
    }
    results
}

/// Expand every dropped path, keeping their order
pub fn scan_paths(paths: &[PathBuf], config: &QueueConfig) -> Vec<ScanResult> {
    let results: Vec<ScanResult> = paths.iter().flat_map(|path| scan_path(path, config)).collect();
    let candidates = results
        .iter()
        .filter(|r| matches!(r, ScanResult::Candidate(_)))
        .count();
    info!("Scan complete: {} candidate(s) from {} path(s)", candidates, paths.len());
    results
}

/// Just the accepted files
pub fn candidates(paths: &[PathBuf], config: &QueueConfig) -> Vec<PathBuf> {
    scan_paths(paths, config)
        .into_iter()
        .filter_map(|result| match result {
            ScanResult::Candidate(path) => Some(path),
            ScanResult::Skipped(..) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_directory_expands_to_visible_supported_children() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mkv", "a.M4V", ".hidden.mkv", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.mkv"), b"x").unwrap();

        let found = candidates(&[dir.path().to_path_buf()], &QueueConfig::default());
        assert_eq!(found, vec![dir.path().join("a.M4V"), dir.path().join("b.mkv")]);
    }

    #[test]
    fn test_files_are_filtered_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let movie = dir.path().join("movie.mp4");
        let text = dir.path().join("readme.txt");
        fs::write(&movie, b"x").unwrap();
        fs::write(&text, b"x").unwrap();

        let results = scan_paths(
            &[text.clone(), movie.clone(), dir.path().join("gone.mkv")],
            &QueueConfig::default(),
        );
        assert_eq!(results.len(), 3);
        assert!(matches!(&results[0], ScanResult::Skipped(p, _) if *p == text));
        assert_eq!(results[1], ScanResult::Candidate(movie));
        assert!(matches!(&results[2], ScanResult::Skipped(_, reason) if reason == "not found"));
    }
}
