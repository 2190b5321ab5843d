//! Media-kind detection by extension and by content.

use std::path::Path;

/// Extensions treated as still images.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Extensions treated as video containers.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm", "flv", "wmv", "m4v"];

/// Kind of media a job operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether the path carries a known image extension.
pub fn has_image_extension(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether the path is a processable media file (image or video).
pub fn is_media_file(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| {
        IMAGE_EXTENSIONS.contains(&ext.as_str()) || VIDEO_EXTENSIONS.contains(&ext.as_str())
    })
}

/// Classify a path by extension.
pub fn kind_for_path(path: &Path) -> Option<MediaKind> {
    let ext = extension_of(path)?;
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Classify raw payload bytes by magic number.
///
/// Payloads arrive as opaque bytes with no filename attached, so the worker
/// sniffs known image signatures and treats everything else as a video
/// container.
pub fn sniff_media_kind(bytes: &[u8]) -> MediaKind {
    match sniffed_image_extension(bytes) {
        Some(_) => MediaKind::Image,
        None => MediaKind::Video,
    }
}

/// File extension to store a sniffed payload under.
pub fn sniffed_extension(bytes: &[u8]) -> &'static str {
    sniffed_image_extension(bytes).unwrap_or("mp4")
}

fn sniffed_image_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        Some("jpg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.starts_with(b"BM") {
        Some("bmp")
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("face.png", true)]
    #[case("face.JPG", true)]
    #[case("clip.mp4", false)]
    #[case("notes.txt", false)]
    #[case("noext", false)]
    fn image_extensions(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(has_image_extension(Path::new(name)), expected);
    }

    #[test]
    fn media_files_cover_images_and_videos() {
        assert!(is_media_file(Path::new("a.webm")));
        assert!(is_media_file(Path::new("a.bmp")));
        assert!(!is_media_file(Path::new("a.srt")));
    }

    #[rstest]
    #[case(&b"\x89PNG\r\n\x1a\nrest"[..], MediaKind::Image, "png")]
    #[case(&[0xff, 0xd8, 0xff, 0xe0][..], MediaKind::Image, "jpg")]
    #[case(&b"GIF89a....."[..], MediaKind::Image, "gif")]
    #[case(&b"RIFF\x00\x00\x00\x00WEBPVP8 "[..], MediaKind::Image, "webp")]
    #[case(&b"\x00\x00\x00\x20ftypisom"[..], MediaKind::Video, "mp4")]
    fn sniffing_by_magic_number(
        #[case] bytes: &[u8],
        #[case] kind: MediaKind,
        #[case] ext: &str,
    ) {
        assert_eq!(sniff_media_kind(bytes), kind);
        assert_eq!(sniffed_extension(bytes), ext);
    }
}
