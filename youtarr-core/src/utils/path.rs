//! Path conventions of the download tree.
//!
//! Subfolders are stored without a prefix in the catalog but always carry
//! [`SUBFOLDER_PREFIX`] on disk. Downloaded files follow
//! `<channel> - <title> [<id>].<ext>` inside a `<channel> - <title> - <id>`
//! directory.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Prefix of every subfolder directory on disk.
pub const SUBFOLDER_PREFIX: &str = "__";

/// Stored subfolder value meaning "use the configured default subfolder".
pub const GLOBAL_DEFAULT_SENTINEL: &str = "##USE_GLOBAL_DEFAULT##";

fn bracket_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([a-zA-Z0-9_-]{11})\]").unwrap())
}

fn dash_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" - ([a-zA-Z0-9_-]{10,12})$").unwrap())
}

/// Trim a stored subfolder; empty or whitespace-only means the root bucket.
pub fn normalize_subfolder(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Resolve the subfolder a channel actually downloads into.
///
/// The global-default sentinel resolves to `global_default` (itself
/// normalized); anything else is normalized as is.
pub fn resolve_effective_subfolder(
    raw: Option<&str>,
    global_default: Option<&str>,
) -> Option<String> {
    match raw {
        Some(value) if value.trim() == GLOBAL_DEFAULT_SENTINEL => {
            normalize_subfolder(global_default)
        }
        other => normalize_subfolder(other),
    }
}

/// The on-disk directory name for a subfolder, or `None` for root.
pub fn subfolder_segment(name: Option<&str>) -> Option<String> {
    normalize_subfolder(name).map(|name| format!("{SUBFOLDER_PREFIX}{name}"))
}

/// Extract a platform video id from a downloaded file path.
///
/// Looks for `[id]` in the file name first, then for a trailing ` - id` on the
/// parent directory name.
pub fn extract_video_id_from_path(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_string_lossy();
    if let Some(caps) = bracket_id_regex().captures(&file_name) {
        return Some(caps[1].to_string());
    }

    let dir_name = path.parent()?.file_name()?.to_string_lossy();
    dash_id_regex()
        .captures(&dir_name)
        .map(|caps| caps[1].to_string())
}
