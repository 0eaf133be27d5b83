//! # unifile
//!
//! Merge or convert mixed batches of images, text documents, PDFs and media
//! files into one paginated PDF, or into one output file per item.
//!
//! ## Why this crate?
//!
//! Real-world batches are messy: phone photos next to scanned PDFs, a CSV
//! export, a README, a voice memo, and one PDF that no parser will open.
//! This crate turns every item into pages of a single document model and
//! writes that model once, so a broken item costs one placeholder page
//! instead of the whole batch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! (name, bytes) …
//!  │
//!  ├─ 1. Input     wrap bytes or read paths; classify by extension / magic bytes
//!  ├─ 2. Route     image → raster page        text → pre-process → paginate
//!  │               pdf   → copy / render      audio, video → info page
//!  ├─ 3. Isolate   item failure → placeholder page (merge) or omitted (convert)
//!  └─ 4. Encode    one PDF 1.7 via lopdf, or one file per item
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use unifile::{assemble, AssemblyConfig, SourceItem};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let items = vec![
//!         SourceItem::from_path("photo.jpg").await?,
//!         SourceItem::from_path("notes.md").await?,
//!         SourceItem::from_path("invoice.pdf").await?,
//!     ];
//!     let output = assemble(items, &AssemblyConfig::default()).await?;
//!     let merged = output.merged().expect("merge mode yields one PDF");
//!     std::fs::write(&merged.name, &merged.bytes)?;
//!     eprintln!("{} pages, {} failed item(s)",
//!         output.stats.total_pages,
//!         output.stats.failed_items);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `unifile` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! unifile = { version = "0.3", default-features = false }
//! ```
//!
//! ## Optional Backends
//!
//! | Backend | Needed for | Injected with |
//! |---------|------------|---------------|
//! | [`PdfiumRasterizer`] | PDFs the structural parser rejects | [`AssemblyEngine::with_rasterizer`] |
//! | [`FfmpegDecoder`]    | HEIC / HEIF images                 | [`AssemblyEngine::with_aux_decoder`] |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{
    assemble, assemble_paths, assemble_sync, write_output_file, AssemblyEngine, CancellationFlag,
};
pub use config::{AssemblyConfig, AssemblyConfigBuilder, AssemblyMode, OutputFormat, TextLayout};
pub use error::{AssemblyError, ItemError, RenderError};
pub use output::{
    AssemblyOutput, AssemblyStats, BatchReport, FallbackAttempt, ItemReport, ItemStatus,
    OutputFile, PageKind, PageSummary,
};
pub use pipeline::classify::{Category, MediaKind};
pub use pipeline::heif::{AuxiliaryDecoder, FfmpegDecoder};
pub use pipeline::input::SourceItem;
pub use pipeline::render::{OpenVariant, PdfRasterizer, PdfiumRasterizer, RenderedPage};
pub use progress::{AssemblyProgressCallback, NoopProgressCallback, ProgressCallback, ProgressEvent};
pub use stream::{progress_channel, AssemblyEvent, EventStream};
