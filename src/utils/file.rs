//! File helpers
//!
//! Hashing, MIME and extension guessing for uploaded content.

use std::path::Path;

/// Compute the hex MD5 digest of some content
pub fn compute_md5(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}

/// Content-addressed file name for a digest and extension
pub fn md5_filename(md5: &str, ext: &str) -> String {
    format!("{}.{}", md5, ext)
}

/// Extension of a file name, without the dot
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_string())
}

/// File name without its extension
pub fn stem_of(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

/// Usual extension of common MIME types whose registered extension
/// list does not start with it
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("text/css", "css"),
    ("text/csv", "csv"),
    ("text/xml", "xml"),
    ("text/javascript", "js"),
    ("application/javascript", "js"),
    ("application/json", "json"),
    ("application/xml", "xml"),
    ("application/msword", "doc"),
    ("application/octet-stream", "bin"),
    ("image/jpeg", "jpg"),
    ("image/svg+xml", "svg"),
    ("image/tiff", "tiff"),
    ("image/x-icon", "ico"),
    ("audio/mpeg", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/ogg", "ogg"),
    ("video/mpeg", "mpeg"),
    ("video/quicktime", "mov"),
    ("video/ogg", "ogv"),
];

/// Guess an extension from a content type, `bin` when unknown
pub fn guess_extension(content_type: Option<&str>) -> String {
    let Some(content_type) = content_type.map(|ct| {
        ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase()
    }) else {
        return "bin".to_string();
    };

    if let Some((_, ext)) = PREFERRED_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == content_type)
    {
        return ext.to_string();
    }

    mime_guess::get_mime_extensions_str(&content_type)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| "bin".to_string())
}

/// Check if a MIME type is an image
pub fn is_image(mime_type: Option<&str>) -> bool {
    mime_type.map_or(false, |m| m.starts_with("image/"))
}

/// Resolve the MIME type of an upload.
///
/// The file name wins, then the declared content type, then the content
/// itself, then `application/octet-stream`.
pub fn mime_type_of(filename: &str, content_type: Option<&str>, data: &[u8]) -> String {
    if let Some(guess) = mime_from_filename(filename) {
        return guess;
    }

    if let Some(ct) = content_type.filter(|ct| !ct.is_empty()) {
        return ct.to_string();
    }

    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    mime::APPLICATION_OCTET_STREAM.to_string()
}

/// MIME type guessed from a file name only
pub fn mime_from_filename(filename: &str) -> Option<String> {
    mime_guess::from_path(filename).first().map(|m| m.to_string())
}

/// Width and height of an encoded image, `(0, 0)` if it cannot be decoded
#[cfg(feature = "image-processing")]
pub fn extract_image_dimensions(content: &[u8]) -> (u32, u32) {
    match image::load_from_memory(content) {
        Ok(img) => (img.width(), img.height()),
        Err(e) => {
            tracing::debug!("Could not decode image: {}", e);
            (0, 0)
        }
    }
}

#[cfg(not(feature = "image-processing"))]
pub fn extract_image_dimensions(_content: &[u8]) -> (u32, u32) {
    (0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_md5() {
        assert_eq!(compute_md5(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(md5_filename("abc", "png"), "abc.png");
    }

    #[test]
    fn test_guess_extension() {
        assert_eq!(guess_extension(Some("image/png")), "png");
        assert_eq!(guess_extension(Some("text/plain")), "txt");
        assert_eq!(guess_extension(Some("text/plain; charset=utf-8")), "txt");
        assert_eq!(guess_extension(Some("image/jpeg")), "jpg");
        assert_eq!(guess_extension(Some("audio/mpeg")), "mp3");
        assert_eq!(guess_extension(Some("application/pdf")), "pdf");
        assert_eq!(guess_extension(Some("application/x-unknown-thing")), "bin");
        assert_eq!(guess_extension(None), "bin");
    }

    #[test]
    fn test_is_image() {
        assert!(is_image(Some("image/jpeg")));
        assert!(!is_image(Some("text/plain")));
        assert!(!is_image(None));
    }

    #[test]
    fn test_mime_type_of() {
        assert_eq!(mime_type_of("a.png", Some("text/csv"), b""), "image/png");
        assert_eq!(mime_type_of("upload", Some("text/csv"), b""), "text/csv");
        assert_eq!(mime_type_of("noext", None, b"plain"), "application/octet-stream");
    }

    #[test]
    fn test_name_parts() {
        assert_eq!(extension_of("photo.JPG").as_deref(), Some("JPG"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(stem_of("report.final.pdf"), "report.final");
    }

    #[cfg(feature = "image-processing")]
    #[test]
    fn test_extract_image_dimensions() {
        let img = image::RgbImage::new(7, 3);
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();

        assert_eq!(extract_image_dimensions(buf.get_ref()), (7, 3));
        assert_eq!(extract_image_dimensions(b"not an image"), (0, 0));
    }
}
