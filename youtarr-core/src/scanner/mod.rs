//! Filesystem scanner.
//!
//! Walks the download tree depth-first and builds an index of media files
//! keyed by platform video id. A file is a candidate only when its name ends
//! in `[<id>].<ext>` with a known media extension, which also rules out
//! fragment (`[id].f137.mp4`) and partial (`.part`) files.
//!
//! The scan never writes. Unreadable subdirectories are logged and skipped;
//! only an unreadable root fails the scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::path::extract_video_id_from_path;
use crate::{Error, Result};

/// Video extensions, lowercase.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "m4v", "avi"];

/// Audio extensions, lowercase.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a"];

fn candidate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]]+)\]\.([A-Za-z0-9]+)$").unwrap())
}

/// Kind of media a candidate file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Audio)
        } else {
            None
        }
    }
}

/// Parse `...[<id>].<ext>` into the id and media kind.
pub fn parse_candidate(file_name: &str) -> Option<(String, MediaKind)> {
    let caps = candidate_regex().captures(file_name)?;
    let kind = MediaKind::from_extension(&caps[2])?;
    Some((caps[1].to_string(), kind))
}

fn has_media_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(MediaKind::from_extension)
        .is_some()
}

/// A file chosen for an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Everything found on disk for one video id.
///
/// At least one of `video` or `audio` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskIndexEntry {
    pub youtube_id: String,
    pub video: Option<DiskFile>,
    pub audio: Option<DiskFile>,
}

/// Index of on-disk media keyed by platform video id.
pub type DiskIndex = HashMap<String, DiskIndexEntry>;

/// Output of [`scan`].
#[derive(Debug, Default)]
pub struct ScanResult {
    pub index: DiskIndex,
    /// Ids with more than one candidate, mapped to the paths that lost the
    /// tie-break. Nothing here is deleted.
    pub duplicates: HashMap<String, Vec<PathBuf>>,
    pub files_visited: usize,
    pub dirs_skipped: usize,
    /// Media files that carry a video id but not as the final `[<id>].<ext>`
    /// marker, such as fragments. Counted, never indexed.
    pub unmatched_media: usize,
}

impl ScanResult {
    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }
}

/// Keep the larger of two candidates; record the other as a duplicate.
///
/// Equal sizes keep the file seen first, which is stable because the walk is
/// sorted by name.
fn insert_candidate(
    chosen: &mut HashMap<String, DiskFile>,
    duplicates: &mut HashMap<String, Vec<PathBuf>>,
    id: String,
    file: DiskFile,
) {
    match chosen.get_mut(&id) {
        None => {
            chosen.insert(id, file);
        }
        Some(existing) => {
            let loser = if file.size > existing.size {
                std::mem::replace(existing, file)
            } else {
                file
            };
            debug!(
                youtube_id = %id,
                kept = %existing.path.display(),
                discarded = %loser.path.display(),
                "Duplicate media file"
            );
            duplicates.entry(id).or_default().push(loser.path);
        }
    }
}

/// Scan `root` and index every candidate media file.
pub fn scan(root: &Path) -> Result<ScanResult> {
    let mut videos: HashMap<String, DiskFile> = HashMap::new();
    let mut audio: HashMap<String, DiskFile> = HashMap::new();
    let mut result = ScanResult::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.depth() == 0 {
                    return Err(Error::io_path(
                        "scanning",
                        root,
                        std::io::Error::from(e),
                    ));
                }
                warn!(
                    path = ?e.path(),
                    error = %e,
                    "Skipping unreadable path during scan"
                );
                result.dirs_skipped += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        result.files_visited += 1;

        // The id marker is ASCII, so a lossy name still matches
        let parsed = parse_candidate(&entry.file_name().to_string_lossy());
        let Some((id, kind)) = parsed else {
            if has_media_extension(entry.path())
                && let Some(id) = extract_video_id_from_path(entry.path())
            {
                debug!(
                    youtube_id = %id,
                    path = %entry.path().display(),
                    "Media file without a final id marker, not indexed"
                );
                result.unmatched_media += 1;
            }
            continue;
        };

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Failed to stat media file"
                );
                continue;
            }
        };

        let file = DiskFile {
            path: entry.into_path(),
            size,
        };
        let target = match kind {
            MediaKind::Video => &mut videos,
            MediaKind::Audio => &mut audio,
        };
        insert_candidate(target, &mut result.duplicates, id, file);
    }

    for (id, file) in videos {
        result.index.insert(
            id.clone(),
            DiskIndexEntry {
                youtube_id: id,
                video: Some(file),
                audio: None,
            },
        );
    }
    for (id, file) in audio {
        result
            .index
            .entry(id.clone())
            .or_insert_with(|| DiskIndexEntry {
                youtube_id: id,
                video: None,
                audio: None,
            })
            .audio = Some(file);
    }

    info!(
        root = %root.display(),
        indexed = result.index.len(),
        duplicates = result.duplicate_count(),
        files = result.files_visited,
        skipped_dirs = result.dirs_skipped,
        unmatched = result.unmatched_media,
        "Filesystem scan complete"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, relative: &str, size: usize) -> PathBuf {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, vec![0u8; size]).unwrap();
        path
    }

    #[test]
    fn test_parse_candidate() {
        assert_eq!(
            parse_candidate("Chan - Title [abc123].mp4"),
            Some(("abc123".to_string(), MediaKind::Video))
        );
        assert_eq!(
            parse_candidate("Chan - Title [abc123].MKV"),
            Some(("abc123".to_string(), MediaKind::Video))
        );
        assert_eq!(
            parse_candidate("Chan - Title [abc123].mp3"),
            Some(("abc123".to_string(), MediaKind::Audio))
        );
        // The id is the token adjacent to the extension
        assert_eq!(
            parse_candidate("[Live] Chan - Title [xyz789].webm"),
            Some(("xyz789".to_string(), MediaKind::Video))
        );
    }

    #[test]
    fn test_parse_candidate_rejects_non_media() {
        assert_eq!(parse_candidate("Chan - Title [abc123].f137.mp4"), None);
        assert_eq!(parse_candidate("Chan - Title [abc123].mp4.part"), None);
        assert_eq!(parse_candidate("Chan - Title [abc123].jpg"), None);
        assert_eq!(parse_candidate("Chan - Title abc123.mp4"), None);
        assert_eq!(parse_candidate("Chan - Title [].mp4"), None);
    }

    #[test]
    fn test_scan_indexes_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "A/A - One - abc123/A - One [abc123].mp4", 2000);
        let b = write_file(dir.path(), "__Tech/B/B - Two - def456/B - Two [def456].mkv", 1000);
        write_file(dir.path(), "A/A - One - abc123/poster.jpg", 10);

        let result = scan(dir.path()).unwrap();

        assert_eq!(result.index.len(), 2);
        let entry = &result.index["abc123"];
        assert_eq!(entry.video.as_ref().unwrap().path, a);
        assert_eq!(entry.video.as_ref().unwrap().size, 2000);
        assert_eq!(result.index["def456"].video.as_ref().unwrap().path, b);
        assert_eq!(result.files_visited, 3);
        assert!(result.duplicates.is_empty());
    }

    #[test]
    fn test_duplicate_keeps_larger_file() {
        let dir = tempfile::tempdir().unwrap();
        let small = write_file(dir.path(), "A/x/A - T [abc123].mp4", 1000);
        let large = write_file(dir.path(), "B/y/A - T [abc123].webm", 2000);

        let result = scan(dir.path()).unwrap();

        let entry = &result.index["abc123"];
        assert_eq!(entry.video.as_ref().unwrap().path, large);
        assert_eq!(result.duplicate_count(), 1);
        assert_eq!(result.duplicates["abc123"], vec![small]);
    }

    #[test]
    fn test_duplicate_larger_seen_first() {
        let dir = tempfile::tempdir().unwrap();
        let large = write_file(dir.path(), "A/A - T [abc123].mp4", 2000);
        let small = write_file(dir.path(), "B/A - T [abc123].mp4", 1000);

        let result = scan(dir.path()).unwrap();

        assert_eq!(result.index["abc123"].video.as_ref().unwrap().path, large);
        assert_eq!(result.duplicates["abc123"], vec![small]);
    }

    #[test]
    fn test_equal_size_tie_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_file(dir.path(), "a/T [abc123].mp4", 500);
        write_file(dir.path(), "b/T [abc123].mp4", 500);

        for _ in 0..3 {
            let result = scan(dir.path()).unwrap();
            assert_eq!(result.index["abc123"].video.as_ref().unwrap().path, first);
        }
    }

    #[test]
    fn test_audio_attaches_to_entry() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "A/T [abc123].mp4", 100);
        let mp3 = write_file(dir.path(), "A/T [abc123].mp3", 50);
        let audio_only = write_file(dir.path(), "A/U [zzz999].mp3", 70);

        let result = scan(dir.path()).unwrap();

        let entry = &result.index["abc123"];
        assert!(entry.video.is_some());
        assert_eq!(entry.audio.as_ref().unwrap().path, mp3);
        // Video and audio of the same id are not duplicates of each other
        assert!(result.duplicates.is_empty());

        let audio_entry = &result.index["zzz999"];
        assert!(audio_entry.video.is_none());
        assert_eq!(audio_entry.audio.as_ref().unwrap().path, audio_only);
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(matches!(scan(&missing), Err(Error::IoPath { .. })));
    }

    #[test]
    fn test_fragment_is_counted_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "A/Chan - T [dQw4w9WgXcQ].f137.mp4", 10);
        write_file(dir.path(), "A/Chan - T [dQw4w9WgXcQ].mp4.part", 10);

        let result = scan(dir.path()).unwrap();

        assert!(result.index.is_empty());
        assert_eq!(result.unmatched_media, 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_file_name_is_indexed() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join(OsStr::from_bytes(b"Chan - Caf\xe9 [abc123].mp4"));
        fs::write(&path, vec![0u8; 100]).unwrap();

        let result = scan(dir.path()).unwrap();

        let entry = &result.index["abc123"];
        assert_eq!(entry.video.as_ref().unwrap().path, path);
        assert_eq!(entry.video.as_ref().unwrap().size, 100);
    }

    #[test]
    fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan(dir.path()).unwrap();
        assert!(result.index.is_empty());
        assert_eq!(result.files_visited, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "ok/T [abc123].mp4", 10);
        write_file(dir.path(), "locked/T [def456].mp4", 10);
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let readable = fs::read_dir(&locked).is_ok();
        let result = scan(dir.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let result = result.unwrap();
        assert!(result.index.contains_key("abc123"));
        if !readable {
            // Running as root can read anything; only assert the skip otherwise
            assert!(!result.index.contains_key("def456"));
            assert_eq!(result.dirs_skipped, 1);
        }
    }
}
