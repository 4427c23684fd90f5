//! Normalized format tags for conversion sources and destinations.

use serde::{Deserialize, Serialize};

/// A file format the engine can route conversions between.
///
/// Tags are case-insensitive on input and normalized to one canonical
/// variant (`JPEG` folds into `Jpg`, `HTM` into `Html`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    // Documents
    Pdf,
    Docx,
    Odt,
    Rtf,
    Txt,
    Html,
    Md,
    // Spreadsheets
    Xlsx,
    Ods,
    Csv,
    // Presentations
    Pptx,
    Odp,
    // Raster images
    Jpg,
    Png,
    Gif,
    Bmp,
    Tiff,
    Webp,
    // Vector images
    Svg,
    // Audio
    Mp3,
    Wav,
    Flac,
    Ogg,
    // Video
    Mp4,
    Avi,
    Mov,
    Webm,
}

impl Format {
    /// Parses a user-supplied tag. Case-insensitive, folds common aliases.
    /// Returns `None` for tags the engine does not know.
    pub fn from_tag(tag: &str) -> Option<Format> {
        let normalized = tag.trim().to_ascii_lowercase();
        let format = match normalized.as_str() {
            "pdf" => Format::Pdf,
            "docx" => Format::Docx,
            "odt" => Format::Odt,
            "rtf" => Format::Rtf,
            "txt" | "text" => Format::Txt,
            "html" | "htm" => Format::Html,
            "md" | "markdown" => Format::Md,
            "xlsx" => Format::Xlsx,
            "ods" => Format::Ods,
            "csv" => Format::Csv,
            "pptx" => Format::Pptx,
            "odp" => Format::Odp,
            "jpg" | "jpeg" => Format::Jpg,
            "png" => Format::Png,
            "gif" => Format::Gif,
            "bmp" => Format::Bmp,
            "tiff" | "tif" => Format::Tiff,
            "webp" => Format::Webp,
            "svg" => Format::Svg,
            "mp3" => Format::Mp3,
            "wav" => Format::Wav,
            "flac" => Format::Flac,
            "ogg" => Format::Ogg,
            "mp4" => Format::Mp4,
            "avi" => Format::Avi,
            "mov" => Format::Mov,
            "webm" => Format::Webm,
            _ => return None,
        };
        Some(format)
    }

    /// The canonical lowercase tag.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Docx => "docx",
            Format::Odt => "odt",
            Format::Rtf => "rtf",
            Format::Txt => "txt",
            Format::Html => "html",
            Format::Md => "md",
            Format::Xlsx => "xlsx",
            Format::Ods => "ods",
            Format::Csv => "csv",
            Format::Pptx => "pptx",
            Format::Odp => "odp",
            Format::Jpg => "jpg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::Bmp => "bmp",
            Format::Tiff => "tiff",
            Format::Webp => "webp",
            Format::Svg => "svg",
            Format::Mp3 => "mp3",
            Format::Wav => "wav",
            Format::Flac => "flac",
            Format::Ogg => "ogg",
            Format::Mp4 => "mp4",
            Format::Avi => "avi",
            Format::Mov => "mov",
            Format::Webm => "webm",
        }
    }

    /// The file extension used when materializing a file of this format.
    pub fn extension(&self) -> &'static str {
        self.as_tag()
    }

    /// MIME type for this format, via the extension.
    pub fn mime(&self) -> Option<String> {
        mime_guess::from_ext(self.extension())
            .first()
            .map(|m| m.to_string())
    }

    pub fn is_raster_image(&self) -> bool {
        matches!(
            self,
            Format::Jpg | Format::Png | Format::Gif | Format::Bmp | Format::Tiff | Format::Webp
        )
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Format::Mp3 | Format::Wav | Format::Flac | Format::Ogg)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Format::Mp4 | Format::Avi | Format::Mov | Format::Webm)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

// Required so `RoutingError::UnsupportedConversion` (a thiserror variant whose
// field is named `source`) satisfies thiserror's `AsDynError` bound. Format
// carries no underlying cause, so the default `source()` (returning `None`) is
// correct.
impl std::error::Error for Format {}
