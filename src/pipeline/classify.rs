//! Item classification: name + bytes → category and canonical extension.
//!
//! Classification is a pure table lookup and never fails. Anything the tables
//! don't know lands in the caller's fallback category; an item with no usable
//! extension gets the explicit `unknown` token and a magic-byte sniff.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Extension token for names without a usable suffix.
pub const UNKNOWN_EXTENSION: &str = "unknown";

/// Broad routing category of a source item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    /// Text-like documents routed through the paginator.
    Document,
    Pdf,
    /// Media the engine never decodes.
    Opaque(MediaKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Document => "document",
            Category::Pdf => "pdf",
            Category::Opaque(MediaKind::Audio) => "audio",
            Category::Opaque(MediaKind::Video) => "video",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "images" => Ok(Category::Image),
            "document" | "documents" => Ok(Category::Document),
            "pdf" => Ok(Category::Pdf),
            "audio" => Ok(Category::Opaque(MediaKind::Audio)),
            "video" => Ok(Category::Opaque(MediaKind::Video)),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

/// Result of [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    /// Lowercase extension, or [`UNKNOWN_EXTENSION`].
    pub extension: String,
}

// ── Format tables ────────────────────────────────────────────────────────

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "gif", "bmp", "ico", "svg", "tiff", "tif", "heic", "heif",
    "avif", "jxl", "psd", "raw", "cr2", "nef", "dng", "hdr", "exr", "tga", "pcx", "pbm", "pgm",
    "ppm", "pnm", "jfif", "jpe", "cur", "icns", "arw", "rw2", "orf", "cr3", "srf",
];

pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    "txt", "md", "html", "htm", "rtf", "csv", "tsv", "json", "xml", "docx", "odt", "epub",
];

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "oga", "opus", "aac", "alac", "m4a", "wma", "amr", "ac3", "aiff",
    "aif", "aifc", "au", "m4b", "weba", "mp2", "mpc", "voc",
];

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "avi", "mov", "mkv", "wmv", "flv", "f4v", "mpg", "mpeg", "m4v", "3gp", "3g2",
    "ogv", "ts", "mts", "m2ts", "vob", "rm", "rmvb", "divx", "mxf",
];

/// Document extensions the paginator can read as text. The rest of
/// [`DOCUMENT_EXTENSIONS`] (docx, odt, epub) are containers with no route.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "html", "htm", "rtf", "csv", "tsv", "json", "xml",
];

// ── Classification ───────────────────────────────────────────────────────

/// Lowercase suffix after the last `.`, or [`UNKNOWN_EXTENSION`] for names
/// without a dot, with a trailing dot, or dot-files such as `.bashrc`.
pub fn extension_of(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => UNKNOWN_EXTENSION.to_string(),
        Some(i) if i + 1 == base.len() => UNKNOWN_EXTENSION.to_string(),
        Some(i) => base[i + 1..].to_ascii_lowercase(),
    }
}

/// Category for a known extension, or `None` when no table lists it.
pub fn category_for_extension(extension: &str) -> Option<Category> {
    if extension == "pdf" {
        Some(Category::Pdf)
    } else if IMAGE_EXTENSIONS.contains(&extension) {
        Some(Category::Image)
    } else if DOCUMENT_EXTENSIONS.contains(&extension) {
        Some(Category::Document)
    } else if AUDIO_EXTENSIONS.contains(&extension) {
        Some(Category::Opaque(MediaKind::Audio))
    } else if VIDEO_EXTENSIONS.contains(&extension) {
        Some(Category::Opaque(MediaKind::Video))
    } else {
        None
    }
}

/// Classify an item by name, sniffing `bytes` only when the name has no
/// extension. Unlisted extensions map to `fallback`.
pub fn classify(name: &str, bytes: &[u8], fallback: Category) -> Classification {
    let extension = extension_of(name);
    if extension == UNKNOWN_EXTENSION {
        if let Some((category, sniffed)) = sniff(bytes) {
            return Classification {
                category,
                extension: sniffed.to_string(),
            };
        }
    }
    let category = category_for_extension(&extension).unwrap_or(fallback);
    Classification {
        category,
        extension,
    }
}

/// Recognise a handful of signatures by their leading bytes.
pub fn sniff(bytes: &[u8]) -> Option<(Category, &'static str)> {
    if bytes.starts_with(b"%PDF") {
        Some((Category::Pdf, "pdf"))
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some((Category::Image, "png"))
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some((Category::Image, "jpg"))
    } else if bytes.starts_with(b"GIF8") {
        Some((Category::Image, "gif"))
    } else {
        None
    }
}

/// True when the paginator has a pre-processor for this extension.
pub fn is_text_extension(extension: &str) -> bool {
    TEXT_EXTENSIONS.contains(&extension)
}
