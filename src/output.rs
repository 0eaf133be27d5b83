//! Result types returned by the assembly engine.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};

/// The complete result of one `assemble` run.
#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    /// Merge mode: exactly one PDF. Convert mode: one entry per successful item,
    /// in batch order.
    pub files: Vec<OutputFile>,

    /// One report per input item, in batch order.
    pub items: Vec<ItemReport>,

    /// Geometry of every page in the merged document, in output order.
    /// Empty in convert mode.
    pub pages: Vec<PageSummary>,

    pub stats: AssemblyStats,
}

impl AssemblyOutput {
    /// The merged PDF, if this was a merge run.
    pub fn merged(&self) -> Option<&OutputFile> {
        match self.files.as_slice() {
            [only] if only.mime_type == "application/pdf" && !self.pages.is_empty() => Some(only),
            _ => None,
        }
    }

    /// Machine-readable summary (no file bytes) for logs and `--json`.
    pub fn report(&self) -> BatchReport {
        BatchReport {
            files: self
                .files
                .iter()
                .map(|f| FileSummary {
                    name: f.name.clone(),
                    mime_type: f.mime_type.clone(),
                    size: f.bytes.len(),
                })
                .collect(),
            items: self.items.clone(),
            stats: self.stats.clone(),
        }
    }
}

/// A named output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// How one item ended up in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// The item contributed its own pages (merge) or file (convert).
    Ok,
    /// Merge mode: the item failed and a single placeholder page stands in.
    Placeholder,
    /// Convert mode: the item failed and produced no output.
    Failed,
}

/// Per-item outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    /// 0-indexed batch position.
    pub index: usize,
    pub name: String,
    /// Category label (`image`, `document`, `pdf`, `audio`, `video`).
    pub category: String,
    pub status: ItemStatus,
    /// Pages contributed to the merged document (placeholders count as 1).
    pub pages: usize,
    /// PDF ingestion attempts, in evaluation order. Empty for non-PDF items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<FallbackAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

/// One PDF ingestion attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackAttempt {
    /// Strategy name, e.g. `direct-copy` or `render:empty-password`.
    pub strategy: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FallbackAttempt {
    pub fn succeeded(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            succeeded: true,
            detail: None,
        }
    }

    pub fn failed(strategy: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            succeeded: false,
            detail: Some(detail.into()),
        }
    }
}

/// What kind of content a merged page carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageKind {
    Raster,
    Text,
    Native,
}

/// Geometry of one merged page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    /// Batch index of the item this page came from.
    pub item_index: usize,
    /// Width in PDF points.
    pub width: f32,
    /// Height in PDF points.
    pub height: f32,
    pub kind: PageKind,
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub total_items: usize,
    pub ok_items: usize,
    /// Items replaced by a placeholder (merge) or omitted (convert).
    pub failed_items: usize,
    /// Pages in the merged document; 0 in convert mode.
    pub total_pages: usize,
    pub output_bytes: usize,
    pub total_duration_ms: u64,
}

/// Byte-free view of an [`AssemblyOutput`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub files: Vec<FileSummary>,
    pub items: Vec<ItemReport>,
    pub stats: AssemblyStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub name: String,
    pub mime_type: String,
    pub size: usize,
}

/// Human-readable byte count, base 1024, at most two decimals.
///
/// `0` → `"0 Bytes"`, `1536` → `"1.5 KB"`, `1048576` → `"1 MB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut exp = 0;
    let mut scaled = bytes;
    while scaled >= 1024 && exp < UNITS.len() - 1 {
        scaled /= 1024;
        exp += 1;
    }
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    let rounded = (value * 100.0).round() / 100.0;
    let mut text = format!("{rounded:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    format!("{} {}", text, UNITS[exp])
}
