//! Batch assembly entry points.
//!
//! [`AssemblyEngine`] walks the batch strictly in order. Each item's
//! CPU-bound work (decode, parse, render, encode) runs on the blocking pool
//! and is awaited before the next item starts, so progress events and pages
//! always come out in batch order.
//!
//! An item that fails never aborts the batch: merge mode substitutes one
//! placeholder page, convert mode leaves the item out of the file list. The
//! only fatal outcomes are an empty batch, cancellation and a merged document
//! that cannot be serialised.

use crate::config::{AssemblyConfig, AssemblyMode, OutputFormat, TextLayout};
use crate::document::{Document, Page, Rgb, TextRun};
use crate::error::{AssemblyError, ItemError};
use crate::output::{
    format_file_size, AssemblyOutput, AssemblyStats, FallbackAttempt, ItemReport, ItemStatus,
    OutputFile,
};
use crate::pipeline::classify::{self, Category};
use crate::pipeline::encode::encode_document;
use crate::pipeline::heif::AuxiliaryDecoder;
use crate::pipeline::ingest::{ingest_pdf, RenderSettings};
use crate::pipeline::input::{unique_name, SourceItem};
use crate::pipeline::preprocess::{self, TextKind};
use crate::pipeline::raster;
use crate::pipeline::render::PdfRasterizer;
use crate::pipeline::text::{lossy_win_ansi, paginate, strip_controls};
use crate::progress::ProgressEvent;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Cancellation ─────────────────────────────────────────────────────────

/// Cooperative cancellation, checked before each item starts.
///
/// Clones share one flag, so a handle can be given to another task (or a
/// Ctrl-C handler) while the engine runs.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Engine ───────────────────────────────────────────────────────────────

/// The assembly engine plus its optional backends.
///
/// Without a rasterizer, PDFs that fail the structural copy become
/// placeholders. Without an auxiliary decoder, HEIC/HEIF images do.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use unifile::{AssemblyConfig, AssemblyEngine, PdfiumRasterizer, SourceItem};
///
/// # async fn run() -> Result<(), unifile::AssemblyError> {
/// let engine = AssemblyEngine::new(AssemblyConfig::default())
///     .with_rasterizer(Arc::new(PdfiumRasterizer::bind(None)?));
/// let items = vec![SourceItem::from_path("scan.pdf").await?];
/// let output = engine.assemble(items).await?;
/// println!("{} pages", output.stats.total_pages);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AssemblyEngine {
    config: AssemblyConfig,
    rasterizer: Option<Arc<dyn PdfRasterizer>>,
    aux_decoder: Option<Arc<dyn AuxiliaryDecoder>>,
    cancel: CancellationFlag,
}

impl AssemblyEngine {
    pub fn new(config: AssemblyConfig) -> Self {
        Self {
            config,
            rasterizer: None,
            aux_decoder: None,
            cancel: CancellationFlag::default(),
        }
    }

    /// Enable the render fallback for PDFs the structural parser rejects.
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PdfRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Decoder for image formats the `image` crate cannot read (HEIC/HEIF).
    pub fn with_aux_decoder(mut self, decoder: Arc<dyn AuxiliaryDecoder>) -> Self {
        self.aux_decoder = Some(decoder);
        self
    }

    /// Share an existing cancellation flag with this engine.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// A handle that cancels this engine's runs.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Assemble `items` according to the engine's config.
    ///
    /// # Returns
    /// `Ok(AssemblyOutput)` whenever the batch finished, even if some items
    /// failed (check `output.stats.failed_items`).
    ///
    /// # Errors
    /// - [`AssemblyError::EmptyBatch`] for an empty batch
    /// - [`AssemblyError::Cancelled`] when the flag was raised
    /// - [`AssemblyError::EncodeFailed`] when the merged PDF cannot be written
    pub async fn assemble(&self, items: Vec<SourceItem>) -> Result<AssemblyOutput, AssemblyError> {
        let total_start = Instant::now();
        let config = &self.config;
        let total = items.len();
        if total == 0 {
            return Err(AssemblyError::EmptyBatch);
        }
        if config.mode == AssemblyMode::Merge && config.output_format != OutputFormat::Pdf {
            return Err(AssemblyError::InvalidConfig(format!(
                "merge mode produces a PDF, not {}",
                config.output_format
            )));
        }
        if config.max_page_dimension == 0 {
            return Err(AssemblyError::InvalidConfig(
                "max page dimension must be at least 1 point".into(),
            ));
        }
        info!(
            "Starting {:?} of {} item(s) → {}",
            config.mode, total, config.output_format
        );

        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_start(total);
        }

        let ctx = ItemContext {
            config: config.clone(),
            rasterizer: self.rasterizer.clone(),
            aux_decoder: self.aux_decoder.clone(),
        };

        let mut document = Document::new(config.text.margin);
        let mut files = Vec::new();
        let mut taken_names = HashSet::new();
        let mut reports = Vec::with_capacity(total);

        for (index, item) in items.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Assembly cancelled after {}/{} items", index, total);
                return Err(AssemblyError::Cancelled {
                    completed: index,
                    total,
                });
            }

            let item_start = Instant::now();
            let name = item.name.clone();
            let category = item.category;
            let result = run_blocking(ctx.clone(), item).await;

            let mut report = ItemReport {
                index,
                name: name.clone(),
                category: category.label().to_string(),
                status: ItemStatus::Ok,
                pages: 0,
                attempts: Vec::new(),
                error: None,
            };

            let phase = match result {
                Ok(ItemOutput::Pages { pages, attempts }) => {
                    report.pages = pages.len();
                    report.attempts = attempts;
                    document.extend(index, pages);
                    "merged"
                }
                Ok(ItemOutput::File(mut file)) => {
                    let unique = unique_name(&file.name, &mut taken_names);
                    if unique != file.name {
                        debug!("'{}' already produced, writing '{}'", file.name, unique);
                        file.name = unique;
                    }
                    files.push(file);
                    "converted"
                }
                Err(err) => {
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_item_error(index, &name, &err.to_string());
                    }
                    if let ItemError::IngestionFailed { attempts, .. } = &err {
                        report.attempts = attempts.clone();
                    }
                    let phase = match config.mode {
                        AssemblyMode::Merge => {
                            warn!("'{}' replaced by a placeholder: {}", name, err);
                            document.append_page(
                                index,
                                placeholder_page(&name, &err.placeholder_reason(), &config.text),
                            );
                            report.status = ItemStatus::Placeholder;
                            report.pages = 1;
                            "placeholder"
                        }
                        AssemblyMode::Convert => {
                            warn!("'{}' omitted from output: {}", name, err);
                            report.status = ItemStatus::Failed;
                            "failed"
                        }
                    };
                    report.error = Some(err);
                    phase
                }
            };

            info!(
                "Item {}/{} '{}' {} in {}ms",
                index + 1,
                total,
                name,
                phase,
                item_start.elapsed().as_millis()
            );
            reports.push(report);

            if let Some(ref cb) = config.progress_callback {
                cb.on_progress(&ProgressEvent::new(index, total, name, phase));
            }
        }

        let mut pages = Vec::new();
        if config.mode == AssemblyMode::Merge {
            pages = document.summaries();
            let bytes = tokio::task::spawn_blocking(move || encode_document(document))
                .await
                .map_err(|e| AssemblyError::Internal(format!("Encode task panicked: {}", e)))??;
            files.push(OutputFile {
                name: config.merged_file_name.clone(),
                mime_type: OutputFormat::Pdf.mime_type().to_string(),
                bytes,
            });
        }

        let ok_items = reports
            .iter()
            .filter(|r| r.status == ItemStatus::Ok)
            .count();
        let stats = AssemblyStats {
            total_items: total,
            ok_items,
            failed_items: total - ok_items,
            total_pages: pages.len(),
            output_bytes: files.iter().map(|f| f.bytes.len()).sum(),
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_complete(total, ok_items);
        }

        info!(
            "Assembly complete: {}/{} items ok, {} file(s), {} page(s), {}ms",
            stats.ok_items,
            stats.total_items,
            files.len(),
            stats.total_pages,
            stats.total_duration_ms
        );

        Ok(AssemblyOutput {
            files,
            items: reports,
            pages,
            stats,
        })
    }

    /// Synchronous wrapper around [`AssemblyEngine::assemble`].
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn assemble_sync(&self, items: Vec<SourceItem>) -> Result<AssemblyOutput, AssemblyError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| AssemblyError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.assemble(items))
    }
}

// ── Free-function API ────────────────────────────────────────────────────

/// Assemble `items` with no rendering or auxiliary backends.
///
/// Use [`AssemblyEngine`] to inject a [`PdfRasterizer`] or a cancellation
/// flag.
pub async fn assemble(
    items: Vec<SourceItem>,
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, AssemblyError> {
    AssemblyEngine::new(config.clone()).assemble(items).await
}

/// Synchronous wrapper around [`assemble`].
pub fn assemble_sync(
    items: Vec<SourceItem>,
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, AssemblyError> {
    AssemblyEngine::new(config.clone()).assemble_sync(items)
}

/// Read every path, then assemble. A missing or unreadable path is fatal.
pub async fn assemble_paths<P: AsRef<Path>>(
    paths: &[P],
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, AssemblyError> {
    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        items.push(SourceItem::from_path_with_fallback(path, config.fallback_category).await?);
    }
    assemble(items, config).await
}

/// Write `bytes` to `path`, creating parent directories.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn write_output_file(
    path: impl AsRef<Path>,
    bytes: &[u8],
) -> Result<(), AssemblyError> {
    let path = path.as_ref();
    let write_err = |e| AssemblyError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_extension = match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    };
    let tmp_path = path.with_extension(tmp_extension);
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

// ── Per-item processing ──────────────────────────────────────────────────

/// Everything one item needs on the blocking pool.
#[derive(Clone)]
struct ItemContext {
    config: AssemblyConfig,
    rasterizer: Option<Arc<dyn PdfRasterizer>>,
    aux_decoder: Option<Arc<dyn AuxiliaryDecoder>>,
}

impl ItemContext {
    fn render_settings(&self) -> RenderSettings<'_> {
        RenderSettings {
            rasterizer: self.rasterizer.as_deref(),
            scale: self.config.render_scale,
            quality: self.config.render_quality,
        }
    }

    fn aux(&self) -> Option<&dyn AuxiliaryDecoder> {
        self.aux_decoder.as_deref()
    }
}

/// What a successful item contributes.
enum ItemOutput {
    /// Merge mode: pages for the shared document.
    Pages {
        pages: Vec<Page>,
        attempts: Vec<FallbackAttempt>,
    },
    /// Convert mode: one output file.
    File(OutputFile),
}

async fn run_blocking(ctx: ItemContext, item: SourceItem) -> Result<ItemOutput, ItemError> {
    let name = item.name.clone();
    let format = item.extension.clone();
    tokio::task::spawn_blocking(move || process_item(&ctx, &item))
        .await
        .unwrap_or_else(|e| {
            Err(ItemError::Decode {
                name,
                format,
                detail: format!("processing task panicked: {e}"),
            })
        })
}

fn process_item(ctx: &ItemContext, item: &SourceItem) -> Result<ItemOutput, ItemError> {
    debug!(
        "Processing '{}' ({}, .{}, {} bytes)",
        item.name, item.category, item.extension, item.byte_length
    );
    match ctx.config.mode {
        AssemblyMode::Merge => merge_item(ctx, item).map(|(pages, attempts)| ItemOutput::Pages {
            pages,
            attempts,
        }),
        AssemblyMode::Convert => convert_item(ctx, item).map(ItemOutput::File),
    }
}

fn merge_item(
    ctx: &ItemContext,
    item: &SourceItem,
) -> Result<(Vec<Page>, Vec<FallbackAttempt>), ItemError> {
    let config = &ctx.config;
    match item.category {
        Category::Image => {
            let page = raster::image_page(
                &item.name,
                item.bytes(),
                &item.extension,
                config.quality,
                config.max_page_dimension,
                ctx.aux(),
            )?;
            Ok((vec![page], Vec::new()))
        }
        Category::Pdf => {
            let ingested = ingest_pdf(&item.name, item.bytes(), ctx.render_settings())?;
            Ok((ingested.pages, ingested.attempts))
        }
        Category::Document => {
            let text = document_text(item, &OutputFormat::Pdf)?;
            let header = config.text.merge_header.then_some(item.name.as_str());
            Ok((paginate(&text, &config.text, header), Vec::new()))
        }
        Category::Opaque(_) => Ok((vec![media_info_page(item, &config.text)], Vec::new())),
    }
}

fn convert_item(ctx: &ItemContext, item: &SourceItem) -> Result<OutputFile, ItemError> {
    let config = &ctx.config;
    let target = &config.output_format;
    let output = |bytes: Vec<u8>| OutputFile {
        name: item.renamed(target.extension()),
        mime_type: target.mime_type().to_string(),
        bytes,
    };

    match (item.category, target) {
        (Category::Image, t) if t.is_raster() => {
            let result = raster::normalize(
                &item.name,
                item.bytes(),
                &item.extension,
                t,
                config.quality,
                ctx.aux(),
            )?;
            Ok(output(result.bytes))
        }
        (Category::Image, OutputFormat::Pdf) => {
            let page = raster::image_page(
                &item.name,
                item.bytes(),
                &item.extension,
                config.quality,
                config.max_page_dimension,
                ctx.aux(),
            )?;
            single_pdf(item, config, vec![page]).map(output)
        }
        (Category::Document, t) if t.is_text() => {
            let kind = text_kind(item, t)?;
            let content = preprocess::decode_text(item.bytes());
            let converted = match t {
                OutputFormat::Txt => preprocess::to_txt(&content, kind),
                OutputFormat::Markdown => preprocess::to_markdown(&content, kind),
                _ => preprocess::to_html(&content, kind, &item.name),
            };
            Ok(output(converted.into_bytes()))
        }
        (Category::Document, OutputFormat::Pdf) => {
            let text = document_text(item, target)?;
            let pages = paginate(&text, &config.text, None);
            single_pdf(item, config, pages).map(output)
        }
        (Category::Pdf, OutputFormat::Pdf) => {
            let ingested = ingest_pdf(&item.name, item.bytes(), ctx.render_settings())?;
            single_pdf(item, config, ingested.pages).map(output)
        }
        (Category::Opaque(_), _) => {
            debug!("Passing '{}' through unchanged", item.name);
            Ok(output(item.bytes().to_vec()))
        }
        _ => Err(unsupported(item, target)),
    }
}

/// Plain text of a text document, or `Unsupported` for containers such as
/// docx that have no text route.
fn document_text(item: &SourceItem, target: &OutputFormat) -> Result<String, ItemError> {
    let kind = text_kind(item, target)?;
    let content = preprocess::decode_text(item.bytes());
    Ok(preprocess::to_plain_text(&content, kind))
}

fn text_kind(item: &SourceItem, target: &OutputFormat) -> Result<TextKind, ItemError> {
    if classify::is_text_extension(&item.extension) {
        Ok(TextKind::from_extension(&item.extension))
    } else {
        Err(unsupported(item, target))
    }
}

fn single_pdf(
    item: &SourceItem,
    config: &AssemblyConfig,
    pages: Vec<Page>,
) -> Result<Vec<u8>, ItemError> {
    let mut document = Document::new(config.text.margin);
    document.extend(0, pages);
    encode_document(document).map_err(|e| ItemError::Encode {
        name: item.name.clone(),
        format: OutputFormat::Pdf.to_string(),
        detail: e.to_string(),
    })
}

fn unsupported(item: &SourceItem, target: &OutputFormat) -> ItemError {
    ItemError::Unsupported {
        name: item.name.clone(),
        from: item.extension.clone(),
        to: target.to_string(),
    }
}

// ── Synthetic pages ──────────────────────────────────────────────────────

/// Baseline of the first line on placeholder and info pages, measured down
/// from the top edge.
const NOTICE_TOP_OFFSET: f32 = 92.0;
/// Distance between notice lines.
const NOTICE_LINE_STEP: f32 = 30.0;

/// The single page that stands in for a failed item in merge mode.
pub fn placeholder_page(name: &str, reason: &str, layout: &TextLayout) -> Page {
    let top = layout.page_height - NOTICE_TOP_OFFSET;
    let reason: String = reason.chars().take(ItemError::PLACEHOLDER_DETAIL_CHARS).collect();
    Page::text(
        layout.page_width,
        layout.page_height,
        vec![
            TextRun::new(
                notice_text(&format!("Could not process: {name}")),
                layout.margin,
                top,
                12.0,
                Rgb(0.7, 0.3, 0.1),
            ),
            TextRun::new(
                notice_text(&format!("Reason: {reason}")),
                layout.margin,
                top - NOTICE_LINE_STEP,
                10.0,
                Rgb::gray(0.5),
            ),
        ],
    )
}

/// Informational page for audio and video items, which cannot be embedded.
pub fn media_info_page(item: &SourceItem, layout: &TextLayout) -> Page {
    let top = layout.page_height - NOTICE_TOP_OFFSET;
    let label = item.category.label().to_ascii_uppercase();
    Page::text(
        layout.page_width,
        layout.page_height,
        vec![
            TextRun::new(
                notice_text(&format!("[{label}] {}", item.name)),
                layout.margin,
                top,
                14.0,
                Rgb::gray(0.3),
            ),
            TextRun::new(
                format!("Size: {}", format_file_size(item.byte_length as u64)),
                layout.margin,
                top - NOTICE_LINE_STEP,
                12.0,
                Rgb::gray(0.5),
            ),
            TextRun::new(
                "(Audio/Video files cannot be embedded in PDF)",
                layout.margin,
                top - 2.0 * NOTICE_LINE_STEP,
                10.0,
                Rgb::gray(0.6),
            ),
        ],
    )
}

fn notice_text(s: &str) -> String {
    lossy_win_ansi(&strip_controls(s))
}
