//! Image MIME detection for intake items without a declared type

use std::path::Path;

/// Known image extensions and their MIME types
const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("avif", "image/avif"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("tiff", "image/tiff"),
    ("tif", "image/tiff"),
    ("heic", "image/heic"),
];

/// Lowercased extension of a file name, if it has one
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase)
}

/// Image MIME type for a file extension
pub fn image_mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Image MIME type guessed from a file name
pub fn detect_image_mime(name: &str) -> Option<&'static str> {
    extension_of(name).and_then(|ext| image_mime_for_extension(&ext))
}

/// File extension for an image MIME type (`image/jpeg` → `jpeg`, `image/svg+xml` → `svg`)
pub fn extension_for_mime(mime: &str) -> Option<String> {
    let subtype = mime.strip_prefix("image/")?;
    let subtype = subtype.split([';', '+']).next()?.trim();
    if subtype.is_empty() || !subtype.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
        return None;
    }
    Some(subtype.to_lowercase())
}

/// Whether a MIME type is for an image
pub fn is_image(mime: &str) -> bool {
    mime.trim().to_lowercase().starts_with("image/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_by_extension() {
        assert_eq!(detect_image_mime("photo.JPG"), Some("image/jpeg"));
        assert_eq!(detect_image_mime("diagram.svg"), Some("image/svg+xml"));
        assert_eq!(detect_image_mime("notes.md"), None);
        assert_eq!(detect_image_mime("no_extension"), None);
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/png").as_deref(), Some("png"));
        assert_eq!(extension_for_mime("image/svg+xml").as_deref(), Some("svg"));
        assert_eq!(extension_for_mime("image/jpeg; q=1").as_deref(), Some("jpeg"));
        assert_eq!(extension_for_mime("text/plain"), None);
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("image/webp"));
        assert!(is_image("Image/PNG"));
        assert!(!is_image("application/pdf"));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("image 56.PNG").as_deref(), Some("png"));
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
    }
}
