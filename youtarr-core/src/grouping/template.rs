//! Output templates handed to the download tool.
//!
//! The tool treats these strings as literal patterns, so identical inputs must
//! always produce byte-identical output. Channel and title fields are truncated
//! by bytes (`.80B`, `.76B`) rather than characters, which keeps multi-byte
//! names within filesystem component limits.

use std::path::Path;

use crate::utils::path::subfolder_segment;

/// Channel name, falling back through the fields the tool may leave empty.
pub const CHANNEL_FIELD: &str = "%(uploader,channel,uploader_id).80B";

/// Video title capped at 76 bytes.
pub const TITLE_FIELD: &str = "%(title).76B";

/// Final directory of a thumbnail template.
pub const POSTER_SEGMENT: &str = "poster";

/// `<channel> - <title> - <id>`
pub fn video_folder_field() -> String {
    format!("{CHANNEL_FIELD} - {TITLE_FIELD} - %(id)s")
}

/// `<channel> - <title> [<id>].<ext>`
pub fn video_file_field() -> String {
    format!("{CHANNEL_FIELD} - {TITLE_FIELD} [%(id)s].%(ext)s")
}

fn video_dir_template(root: &Path, subfolder: Option<&str>) -> std::path::PathBuf {
    let mut path = root.to_path_buf();
    if let Some(segment) = subfolder_segment(subfolder) {
        path.push(segment);
    }
    path.push(CHANNEL_FIELD);
    path.push(video_folder_field());
    path
}

/// Output template for video files under `root`.
pub fn build_output_template(root: &Path, subfolder: Option<&str>) -> String {
    video_dir_template(root, subfolder)
        .join(video_file_field())
        .to_string_lossy()
        .into_owned()
}

/// Thumbnail template; shares the video directory and ends in `poster`.
pub fn build_thumbnail_template(root: &Path, subfolder: Option<&str>) -> String {
    video_dir_template(root, subfolder)
        .join(POSTER_SEGMENT)
        .to_string_lossy()
        .into_owned()
}
