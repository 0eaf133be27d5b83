//! PDF rasterisation for the render fallback.
//!
//! The engine only talks to the [`PdfRasterizer`] trait, so tests inject a
//! fake and library users can plug in another backend. [`PdfiumRasterizer`]
//! is the production implementation on top of `pdfium-render`.
//!
//! Rendering is CPU-bound and pdfium is not async-safe; the engine always
//! calls a rasterizer from inside `tokio::task::spawn_blocking`.

use crate::error::{AssemblyError, RenderError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One way of opening a document that the structural parser rejected.
///
/// Variants are tried in [`OpenVariant::ORDER`]; the first that opens wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenVariant {
    /// No options.
    Default,
    /// Open with an empty user password (owner-password-only files).
    EmptyPassword,
    /// Hand the backend an owned copy instead of a borrowed buffer, so nothing
    /// is fetched lazily from the caller's memory.
    NoAutoFetch,
    /// Open from a file on disk instead of memory.
    NoStreaming,
    /// Skip form and script content when rendering.
    NoScriptEval,
}

impl OpenVariant {
    pub const ORDER: [OpenVariant; 5] = [
        OpenVariant::Default,
        OpenVariant::EmptyPassword,
        OpenVariant::NoAutoFetch,
        OpenVariant::NoStreaming,
        OpenVariant::NoScriptEval,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            OpenVariant::Default => "default",
            OpenVariant::EmptyPassword => "empty-password",
            OpenVariant::NoAutoFetch => "no-auto-fetch",
            OpenVariant::NoStreaming => "no-streaming",
            OpenVariant::NoScriptEval => "no-script-eval",
        }
    }
}

impl fmt::Display for OpenVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A rendered page plus the page's unscaled geometry in points.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: DynamicImage,
    pub width: f32,
    pub height: f32,
}

/// Result of rendering one document: `Err` per page that failed.
pub type RenderedPages = Vec<Result<RenderedPage, RenderError>>;

/// Capability to rasterise PDF bytes.
pub trait PdfRasterizer: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Open `bytes` using `variant` and render every page at `scale` against
    /// a white background, in page order.
    ///
    /// Returns `Err` only when the document cannot be opened with this
    /// variant. Page-level failures are reported per page.
    fn render(&self, bytes: &[u8], variant: OpenVariant, scale: f32)
        -> Result<RenderedPages, String>;
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// Renders through the pdfium shared library.
///
/// Binding happens per call, as pdfium bindings are cheap to create and
/// are then dropped with the document.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Locate pdfium and verify that it binds.
    ///
    /// Search order: `library` (a file or a directory containing the
    /// platform library), then `PDFIUM_LIB_PATH`, then the current
    /// directory, then the system library path.
    pub fn bind(library: Option<&Path>) -> Result<Self, AssemblyError> {
        let library = library
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));
        let rasterizer = Self { library };
        rasterizer
            .pdfium()
            .map_err(AssemblyError::RendererUnavailable)?;
        info!("pdfium bound ({})", rasterizer.describe());
        Ok(rasterizer)
    }

    fn describe(&self) -> String {
        match &self.library {
            Some(p) => p.display().to_string(),
            None => "default search path".to_string(),
        }
    }

    fn pdfium(&self) -> Result<Pdfium, String> {
        let bindings = match &self.library {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| format!("{e:?}"))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfRasterizer for PdfiumRasterizer {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn render(
        &self,
        bytes: &[u8],
        variant: OpenVariant,
        scale: f32,
    ) -> Result<RenderedPages, String> {
        let pdfium = self.pdfium()?;

        // Kept alive until every page is rendered for the file-backed variant.
        let mut _spool: Option<tempfile::NamedTempFile> = None;

        let document = match variant {
            OpenVariant::Default | OpenVariant::NoScriptEval => {
                pdfium.load_pdf_from_byte_slice(bytes, None)
            }
            OpenVariant::EmptyPassword => pdfium.load_pdf_from_byte_slice(bytes, Some("")),
            OpenVariant::NoAutoFetch => pdfium.load_pdf_from_byte_vec(bytes.to_vec(), None),
            OpenVariant::NoStreaming => {
                let mut tmp = tempfile::NamedTempFile::new().map_err(|e| format!("tempfile: {e}"))?;
                std::io::Write::write_all(&mut tmp, bytes)
                    .map_err(|e| format!("tempfile write: {e}"))?;
                let doc = pdfium.load_pdf_from_file(tmp.path(), None);
                _spool = Some(tmp);
                doc
            }
        }
        .map_err(|e| format!("{e:?}"))?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_clear_color(PdfColor::WHITE)
            .render_form_data(variant != OpenVariant::NoScriptEval);

        let pages = document.pages();
        debug!("pdfium opened document ({}): {} pages", variant, pages.len());

        let mut out = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let width = page.width().value;
            let height = page.height().value;
            let rendered = page
                .render_with_config(&render_config)
                .map(|bitmap| RenderedPage {
                    image: bitmap.as_image(),
                    width,
                    height,
                })
                .map_err(|e| RenderError {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                });
            if let Ok(ref p) = rendered {
                debug!(
                    "Rendered page {} → {}x{} px",
                    idx + 1,
                    p.image.width(),
                    p.image.height()
                );
            }
            out.push(rendered);
        }
        Ok(out)
    }
}
