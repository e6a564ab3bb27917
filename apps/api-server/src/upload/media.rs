/// Extensions treated as video. Everything else is handled as an image.
pub const VIDEO_EXTENSIONS: [&str; 3] = [".mp4", ".avi", ".mov"];

/// Classify by filename suffix only, case-insensitively. File content is not
/// inspected, a mislabeled extension is classified by its label.
pub fn is_video(filename: &str) -> bool {
    let filename = filename.to_ascii_lowercase();
    VIDEO_EXTENSIONS
        .iter()
        .any(|extension| filename.ends_with(extension))
}
