//! PDF ingestion: an ordered chain of strategies, first success wins.
//!
//! ```text
//! direct-copy ──fail──▶ render-fallback ──fail──▶ IngestionFailed
//!   (lopdf)               (rasterizer × open variants)
//! ```
//!
//! Strategies are evaluated lazily; the render fallback never runs when the
//! direct copy succeeds. Every attempt, successful or not, is recorded as a
//! [`FallbackAttempt`] so the batch report can explain what happened.

use crate::config::OutputFormat;
use crate::document::{NativePdf, Page, PageContent, RasterEncoding};
use crate::error::{ItemError, RenderError};
use crate::output::FallbackAttempt;
use crate::pipeline::raster;
use crate::pipeline::render::{OpenVariant, PdfRasterizer, RenderedPage};
use lopdf::{Object, ObjectId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// US Letter, used when no page in the tree declares a MediaBox.
pub const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Parameters for the render fallback.
#[derive(Clone, Copy)]
pub struct RenderSettings<'a> {
    pub rasterizer: Option<&'a dyn PdfRasterizer>,
    /// Supersampling factor.
    pub scale: f32,
    /// JPEG quality for rendered pages.
    pub quality: u8,
}

/// Pages produced by a successful strategy plus the attempt log.
#[derive(Debug)]
pub struct Ingested {
    pub pages: Vec<Page>,
    pub attempts: Vec<FallbackAttempt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    DirectCopy,
    RenderFallback,
}

impl Strategy {
    const ORDER: [Strategy; 2] = [Strategy::DirectCopy, Strategy::RenderFallback];
}

/// Run the strategy chain over one PDF.
pub fn ingest_pdf(
    name: &str,
    bytes: &[u8],
    render: RenderSettings<'_>,
) -> Result<Ingested, ItemError> {
    let mut attempts = Vec::new();

    for strategy in Strategy::ORDER {
        let result = match strategy {
            Strategy::DirectCopy => direct_copy(bytes).map_err(|detail| {
                attempts.push(FallbackAttempt::failed("direct-copy", detail.clone()));
                detail
            }),
            Strategy::RenderFallback => render_fallback(name, bytes, render, &mut attempts),
        };

        match result {
            Ok(pages) => {
                if strategy == Strategy::DirectCopy {
                    attempts.push(FallbackAttempt::succeeded("direct-copy"));
                }
                info!(
                    "Ingested '{}' via {:?}: {} page(s)",
                    name,
                    strategy,
                    pages.len()
                );
                return Ok(Ingested { pages, attempts });
            }
            Err(detail) => debug!("'{}': {:?} failed: {}", name, strategy, detail),
        }
    }

    Err(ItemError::IngestionFailed {
        name: name.to_string(),
        attempts,
    })
}

// ── Strategy 1: direct structural copy ───────────────────────────────────

/// Parse the page tree and hand out native page handles.
///
/// An encrypted file is decrypted with the empty user password first; the
/// encoder copies content streams verbatim, so a file that cannot be
/// decrypted fails this strategy and is left to the render fallback.
pub fn direct_copy(bytes: &[u8]) -> Result<Vec<Page>, String> {
    let mut document = lopdf::Document::load_mem(bytes).map_err(|e| e.to_string())?;
    if document.trailer.has(b"Encrypt") {
        document
            .decrypt("")
            .map_err(|e| format!("encrypted, cannot decrypt: {e}"))?;
        debug!("Decrypted with the empty user password");
    }

    let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Err("document has no pages".to_string());
    }

    let sizes: Vec<(f32, f32)> = page_ids
        .iter()
        .map(|&id| page_size(&document, id))
        .collect();

    let source = Arc::new(NativePdf { document, page_ids });
    Ok(sizes
        .into_iter()
        .enumerate()
        .map(|(page_index, (width, height))| Page {
            width,
            height,
            content: PageContent::CopiedNative {
                source: Arc::clone(&source),
                page_index,
            },
        })
        .collect())
}

/// Width and height of a page from its (possibly inherited) MediaBox.
pub fn page_size(document: &lopdf::Document, page_id: ObjectId) -> (f32, f32) {
    let b = inherited(document, page_id, b"MediaBox")
        .and_then(|obj| rect(document, obj))
        .unwrap_or(DEFAULT_MEDIA_BOX);
    ((b[2] - b[0]).abs(), (b[3] - b[1]).abs())
}

/// Look up `key` on the page dictionary, then up the `/Parent` chain.
pub(crate) fn inherited<'a>(
    document: &'a lopdf::Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = Some(page_id);
    // Bounded walk; malformed trees can contain parent cycles.
    for _ in 0..64 {
        let dict = document.get_dictionary(current?).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn resolve<'a>(document: &'a lopdf::Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn rect(document: &lopdf::Document, obj: &Object) -> Option<[f32; 4]> {
    let arr = resolve(document, obj)?.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let mut out = [0.0f32; 4];
    for (slot, value) in out.iter_mut().zip(arr) {
        *slot = resolve(document, value)?.as_float().ok()?;
    }
    Some(out)
}

// ── Strategy 2: render-to-raster fallback ────────────────────────────────

fn render_fallback(
    name: &str,
    bytes: &[u8],
    settings: RenderSettings<'_>,
    attempts: &mut Vec<FallbackAttempt>,
) -> Result<Vec<Page>, String> {
    let Some(rasterizer) = settings.rasterizer else {
        let detail = "no rasterizer configured".to_string();
        attempts.push(FallbackAttempt::failed("render", detail.clone()));
        return Err(detail);
    };

    let mut last_error = String::from("no open variant attempted");
    for variant in OpenVariant::ORDER {
        let label = format!("render:{variant}");
        let rendered = match rasterizer.render(bytes, variant, settings.scale) {
            Ok(pages) => pages,
            Err(e) => {
                debug!("'{}': {} could not open: {}", name, rasterizer.name(), e);
                attempts.push(FallbackAttempt::failed(label, e.clone()));
                last_error = e;
                continue;
            }
        };

        // The first variant that opens wins, whatever its pages do.
        let total = rendered.len();
        let mut pages = Vec::with_capacity(total);
        for (idx, result) in rendered.into_iter().enumerate() {
            match result.and_then(|p| encode_rendered(idx + 1, p, settings.quality)) {
                Ok(page) => pages.push(page),
                Err(e) => warn!("'{}': {}, page skipped", name, e),
            }
        }

        if pages.is_empty() {
            let detail = format!("all {total} page(s) failed to render");
            attempts.push(FallbackAttempt::failed(label, detail.clone()));
            return Err(detail);
        }
        attempts.push(FallbackAttempt::succeeded(label));
        return Ok(pages);
    }

    Err(format!("no open variant succeeded: {last_error}"))
}

/// Flatten and JPEG-encode one rendered page at its unscaled geometry.
fn encode_rendered(page_no: usize, rendered: RenderedPage, quality: u8) -> Result<Page, RenderError> {
    let flat = raster::flatten_onto_white(&rendered.image);
    let bytes = raster::encode_raster(&flat, &OutputFormat::Jpeg, quality)
        .map_err(|detail| RenderError { page: page_no, detail })?;
    Ok(Page::raster(
        rendered.width,
        rendered.height,
        bytes,
        RasterEncoding::Jpeg,
        flat.width(),
        flat.height(),
    ))
}
