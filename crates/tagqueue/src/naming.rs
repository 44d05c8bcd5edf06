use std::collections::BTreeMap;
use std::path::Path;

use crate::provider::MetadataQuery;

/// Turn a media file name into a metadata search query.
///
/// `Show.Name.S02E05.720p.mkv` and `Show Name 2x05.mkv` become episode
/// queries; anything else is a movie, with a trailing year picked up when
/// present (`Heat (1995).mkv`).
pub fn guess_query(path: &Path, movie_language: &str, tv_language: &str) -> MetadataQuery {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let words: Vec<&str> = stem
        .split(|c: char| c == '.' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty() && *w != "-")
        .collect();

    for (i, word) in words.iter().enumerate().skip(1) {
        if let Some((season, episode)) = parse_episode_marker(word) {
            return MetadataQuery::Episode {
                show: words[..i].join(" "),
                season,
                episode,
                language: tv_language.to_string(),
            };
        }
    }

    for (i, word) in words.iter().enumerate().skip(1) {
        if let Some(year) = parse_year(word) {
            return MetadataQuery::Movie {
                title: words[..i].join(" "),
                year: Some(year),
                language: movie_language.to_string(),
            };
        }
    }

    MetadataQuery::Movie {
        title: words.join(" "),
        year: None,
        language: movie_language.to_string(),
    }
}

fn leading_number(s: &str, max_digits: usize) -> Option<(u32, &str)> {
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > max_digits {
        return None;
    }
    let value = s[..digits].parse().ok()?;
    Some((value, &s[digits..]))
}

/// `S01E02` (case-insensitive, trailing text allowed) or `1x02`
fn parse_episode_marker(word: &str) -> Option<(u32, u32)> {
    let lower = word.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix('s') {
        let (season, rest) = leading_number(rest, 2)?;
        let rest = rest.strip_prefix('e')?;
        let (episode, _) = leading_number(rest, 3)?;
        return Some((season, episode));
    }
    let (season, rest) = leading_number(&lower, 2)?;
    let rest = rest.strip_prefix('x')?;
    let (episode, tail) = leading_number(rest, 3)?;
    if !tail.is_empty() {
        return None;
    }
    Some((season, episode))
}

fn parse_year(word: &str) -> Option<u16> {
    let trimmed = word.trim_matches(|c| matches!(c, '(' | ')' | '[' | ']'));
    if trimmed.len() != 4 {
        return None;
    }
    let year: u16 = trimmed.parse().ok()?;
    (1900..=2099).contains(&year).then_some(year)
}

/// Fill `{Tag Name}` placeholders from `metadata`.
///
/// Returns the names of placeholders that had no value as the error.
pub fn render_format(
    format: &str,
    metadata: &BTreeMap<String, String>,
) -> Result<String, Vec<String>> {
    let mut out = String::new();
    let mut missing = Vec::new();
    let mut rest = format;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match metadata.get(key) {
                    Some(value) => out.push_str(value),
                    None => missing.push(key.to_string()),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    if missing.is_empty() {
        Ok(out)
    } else {
        Err(missing)
    }
}

/// Make a rendered name safe to use as a single path component
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    replaced.trim().trim_start_matches('.').trim().to_string()
}
