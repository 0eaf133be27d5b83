//! Error types for the unifile library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`AssemblyError`] — **Fatal**: the batch cannot produce a result at all
//!   (empty batch, cancelled run, merged document failed to serialise).
//!   Returned as `Err(AssemblyError)` from the top-level `assemble*` functions.
//!
//! * [`ItemError`] — **Non-fatal**: one source item could not be processed
//!   (corrupt bytes, zero-area image, every PDF strategy exhausted). The engine
//!   turns it into a placeholder page (merge mode) or drops the item's output
//!   (convert mode) and carries on with the rest of the batch.
//!
//! * [`RenderError`] — **Page-level**: a single page failed to rasterise
//!   inside the render fallback. Recovered by skipping that page.

use crate::output::FallbackAttempt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the unifile library.
///
/// Item-level failures use [`ItemError`] and are recorded in
/// [`crate::output::ItemReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum AssemblyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// `assemble` was called with no items.
    #[error("Nothing to assemble: the batch is empty")]
    EmptyBatch,

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Reading an input file failed for another reason.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Run control ───────────────────────────────────────────────────────
    /// The caller cancelled the batch between two items.
    #[error("Assembly cancelled after {completed}/{total} items")]
    Cancelled { completed: usize, total: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The final output could not be serialised. `stage` names the step.
    #[error("Encoding failed during {stage}: {detail}")]
    EncodeFailed { stage: String, detail: String },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is only needed for the render fallback of unparseable PDFs.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Or place libpdfium next to the executable.\n"
    )]
    RendererUnavailable(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single source item.
///
/// Stored in [`crate::output::ItemReport`]. In merge mode the engine renders
/// [`ItemError::placeholder_reason`] onto a placeholder page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The bytes could not be decoded as the declared format.
    #[error("{name}: cannot decode {format} data: {detail}")]
    Decode {
        name: String,
        format: String,
        detail: String,
    },

    /// The decoded image reports a zero width or height.
    #[error("{name}: invalid image dimensions {width}x{height}")]
    InvalidDimensions {
        name: String,
        width: u32,
        height: u32,
    },

    /// Every PDF ingestion strategy failed.
    #[error("{name}: could not ingest PDF ({} strategies failed)", attempts.len())]
    IngestionFailed {
        name: String,
        attempts: Vec<FallbackAttempt>,
    },

    /// The item's output could not be serialised.
    #[error("{name}: encoding to {format} failed: {detail}")]
    Encode {
        name: String,
        format: String,
        detail: String,
    },

    /// No route exists for this item and target format.
    #[error("{name}: cannot convert {from} to {to}")]
    Unsupported {
        name: String,
        from: String,
        to: String,
    },
}

impl ItemError {
    /// Maximum number of characters of error detail shown on a placeholder page.
    pub const PLACEHOLDER_DETAIL_CHARS: usize = 60;

    /// Name of the item this error belongs to.
    pub fn item_name(&self) -> &str {
        match self {
            ItemError::Decode { name, .. }
            | ItemError::InvalidDimensions { name, .. }
            | ItemError::IngestionFailed { name, .. }
            | ItemError::Encode { name, .. }
            | ItemError::Unsupported { name, .. } => name,
        }
    }

    /// Short, item-name-free description truncated to
    /// [`Self::PLACEHOLDER_DETAIL_CHARS`] characters.
    pub fn placeholder_reason(&self) -> String {
        let detail = match self {
            ItemError::Decode { format, detail, .. } => {
                format!("cannot decode {format} data: {detail}")
            }
            ItemError::InvalidDimensions { width, height, .. } => {
                format!("invalid image dimensions {width}x{height}")
            }
            ItemError::IngestionFailed { attempts, .. } => {
                // The structural parse error and the render error each get
                // half the budget.
                let half = (Self::PLACEHOLDER_DETAIL_CHARS - 2) / 2;
                let first = attempts.first().and_then(|a| a.detail.as_deref());
                let last = attempts.last().and_then(|a| a.detail.as_deref());
                match (first, last) {
                    (Some(f), Some(l)) if f != l => format!(
                        "{}; {}",
                        f.chars().take(half).collect::<String>(),
                        l.chars().take(half).collect::<String>()
                    ),
                    (Some(d), _) | (None, Some(d)) => d.to_string(),
                    (None, None) => "all PDF strategies failed".to_string(),
                }
            }
            ItemError::Encode { format, detail, .. } => {
                format!("encoding to {format} failed: {detail}")
            }
            ItemError::Unsupported { from, to, .. } => format!("cannot convert {from} to {to}"),
        };
        detail
            .chars()
            .take(Self::PLACEHOLDER_DETAIL_CHARS)
            .collect()
    }
}

/// A single page failed to rasterise. Recovered by skipping the page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("page {page}: rasterisation failed: {detail}")]
pub struct RenderError {
    /// 1-indexed page number.
    pub page: usize,
    pub detail: String,
}
