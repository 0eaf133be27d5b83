//! Page-based document model shared by every ingestion path.
//!
//! Images, paginated text and copied PDF pages all become [`Page`]s appended
//! to a single [`Document`], which is then moved into
//! [`crate::pipeline::encode::encode_document`]. Because encoding takes the
//! document by value, nothing can append to it afterwards.

use crate::output::{PageKind, PageSummary};
use std::sync::Arc;

/// Encoding of an embedded raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterEncoding {
    /// Embedded as-is with `DCTDecode`.
    Jpeg,
    /// Decoded and re-compressed as raw RGB with `FlateDecode`.
    Png,
}

/// RGB colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);

    pub fn gray(level: f32) -> Self {
        Rgb(level, level, level)
    }
}

/// One positioned line of text in the standard font.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    /// Baseline origin in points from the bottom-left corner.
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub color: Rgb,
}

impl TextRun {
    pub fn new(text: impl Into<String>, x: f32, y: f32, size: f32, color: Rgb) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            size,
            color,
        }
    }
}

/// A source PDF parsed once and shared by all pages copied from it.
#[derive(Debug)]
pub struct NativePdf {
    pub(crate) document: lopdf::Document,
    /// Page object ids in page order.
    pub(crate) page_ids: Vec<lopdf::ObjectId>,
}

impl NativePdf {
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }
}

/// What a page shows.
#[derive(Debug, Clone)]
pub enum PageContent {
    EmbeddedRaster {
        bytes: Vec<u8>,
        encoding: RasterEncoding,
        pixel_width: u32,
        pixel_height: u32,
    },
    TextLines(Vec<TextRun>),
    CopiedNative {
        source: Arc<NativePdf>,
        /// 0-indexed page within `source`.
        page_index: usize,
    },
}

impl PageContent {
    pub fn kind(&self) -> PageKind {
        match self {
            PageContent::EmbeddedRaster { .. } => PageKind::Raster,
            PageContent::TextLines(_) => PageKind::Text,
            PageContent::CopiedNative { .. } => PageKind::Native,
        }
    }
}

/// One output page. Dimensions are in PDF points.
#[derive(Debug, Clone)]
pub struct Page {
    pub width: f32,
    pub height: f32,
    pub content: PageContent,
}

impl Page {
    pub fn raster(
        width: f32,
        height: f32,
        bytes: Vec<u8>,
        encoding: RasterEncoding,
        pixel_width: u32,
        pixel_height: u32,
    ) -> Self {
        Self {
            width,
            height,
            content: PageContent::EmbeddedRaster {
                bytes,
                encoding,
                pixel_width,
                pixel_height,
            },
        }
    }

    pub fn text(width: f32, height: f32, runs: Vec<TextRun>) -> Self {
        Self {
            width,
            height,
            content: PageContent::TextLines(runs),
        }
    }

    pub fn text_runs(&self) -> Option<&[TextRun]> {
        match &self.content {
            PageContent::TextLines(runs) => Some(runs),
            _ => None,
        }
    }
}

/// Standard Type 1 font used for every text run.
pub const STANDARD_FONT: &str = "Helvetica";

/// Ordered pages plus document-wide settings.
#[derive(Debug, Clone)]
pub struct Document {
    pages: Vec<Page>,
    /// Source item index per page, parallel to `pages`.
    origins: Vec<usize>,
    pub font: &'static str,
    pub margin: f32,
}

impl Document {
    pub fn new(margin: f32) -> Self {
        Self {
            pages: Vec::new(),
            origins: Vec::new(),
            font: STANDARD_FONT,
            margin,
        }
    }

    /// Append a page produced from the item at `item_index`.
    pub fn append_page(&mut self, item_index: usize, page: Page) {
        self.pages.push(page);
        self.origins.push(item_index);
    }

    pub fn extend(&mut self, item_index: usize, pages: impl IntoIterator<Item = Page>) {
        for page in pages {
            self.append_page(item_index, page);
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Geometry of every page in order.
    pub fn summaries(&self) -> Vec<PageSummary> {
        self.pages
            .iter()
            .zip(&self.origins)
            .map(|(page, &item_index)| PageSummary {
                item_index,
                width: page.width,
                height: page.height,
                kind: page.content.kind(),
            })
            .collect()
    }

    pub(crate) fn into_pages(self) -> Vec<Page> {
        self.pages
    }
}
