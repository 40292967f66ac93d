//! Inventory module for resolving the ordered list of clips to join.
//!
//! Inputs may be individual files or directories. Directories are scanned one
//! level deep for video files; the combined list can then be filtered by a
//! file-name pattern and naturally sorted.

use regex::Regex;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Video file extensions picked up when scanning a directory (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".mov", ".avi", ".webm", ".m4v", ".ts", ".m2ts", ".flv", ".wmv",
];

/// Error type for clip resolution.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// An input path does not exist.
    #[error("Input not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The grep pattern is not a valid regular expression.
    #[error("Invalid grep pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// What the caller asked for: raw inputs plus optional filter and sort.
#[derive(Debug, Clone, Default)]
pub struct InventoryRequest {
    /// Files and/or directories, in the order given.
    pub inputs: Vec<PathBuf>,
    /// Regex matched against each candidate's file name.
    pub grep: Option<String>,
    /// Natural-sort the final list by file name.
    pub sort: bool,
}

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Lists video files directly inside `dir`, ordered by file name.
///
/// Hidden entries (names starting with `.`) and subdirectories are skipped.
pub fn scan_directory(dir: &Path) -> Vec<PathBuf> {
    use walkdir::WalkDir;

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // The root itself is still offered to the predicate
            entry.depth() == 0
                || entry
                    .file_name()
                    .to_str()
                    .map(|name| !name.starts_with('.'))
                    .unwrap_or(true)
        });

    walker
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file() && is_video_file(entry.path()))
        .map(|entry| entry.path().to_path_buf())
        .collect()
}

/// Resolves the ordered clip list for a request.
///
/// - Directory inputs expand to their video files, ordered by file name
/// - File inputs are taken as-is, in the order given
/// - `grep` keeps only clips whose file name matches
/// - `sort` natural-sorts the whole list by file name (`clip2` before `clip10`)
pub fn resolve_clips(req: &InventoryRequest) -> Result<Vec<PathBuf>, InventoryError> {
    let pattern = req
        .grep
        .as_deref()
        .map(|p| {
            Regex::new(p).map_err(|source| InventoryError::InvalidPattern {
                pattern: p.to_string(),
                source,
            })
        })
        .transpose()?;

    let mut clips = Vec::new();

    for input in &req.inputs {
        if input.is_dir() {
            let found = scan_directory(input);
            debug!(dir = %input.display(), count = found.len(), "scanned input directory");
            clips.extend(found);
        } else if input.exists() {
            clips.push(input.clone());
        } else {
            return Err(InventoryError::NotFound(input.clone()));
        }
    }

    if let Some(re) = &pattern {
        clips.retain(|path| re.is_match(&file_name_lossy(path)));
    }

    if req.sort {
        clips.sort_by(|a, b| natural_cmp(&file_name_lossy(a), &file_name_lossy(b)));
    }

    Ok(clips)
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compares two names treating runs of ASCII digits as numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let a_num = take_digits(&mut a_chars);
                let b_num = take_digits(&mut b_chars);
                let a_trim = a_num.trim_start_matches('0');
                let b_trim = b_num.trim_start_matches('0');
                // Longer digit run (sans leading zeros) is the bigger number
                let ord = a_trim
                    .len()
                    .cmp(&b_trim.len())
                    .then_with(|| a_trim.cmp(b_trim))
                    .then_with(|| a_num.len().cmp(&b_num.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}
