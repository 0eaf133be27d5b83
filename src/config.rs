//! Configuration types for batch assembly.
//!
//! All engine behaviour is controlled through [`AssemblyConfig`], built via
//! its [`AssemblyConfigBuilder`]. Every knob lives in one cloneable struct so a
//! config can be moved onto the blocking pool for each item and logged as a
//! whole when a run needs to be reproduced.

use crate::error::AssemblyError;
use crate::pipeline::classify::Category;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configuration for one `assemble` run.
///
/// Built via [`AssemblyConfig::builder()`] or using
/// [`AssemblyConfig::default()`] (merge mode, PDF output).
///
/// # Example
/// ```rust
/// use unifile::{AssemblyConfig, AssemblyMode, OutputFormat};
///
/// let config = AssemblyConfig::builder()
///     .mode(AssemblyMode::Convert)
///     .output_format(OutputFormat::Jpeg)
///     .quality(80)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AssemblyConfig {
    /// Merge everything into one PDF, or convert each item on its own. Default: merge.
    pub mode: AssemblyMode,

    /// Target format. Merge mode only accepts [`OutputFormat::Pdf`]. Default: pdf.
    pub output_format: OutputFormat,

    /// Lossy raster quality, 0–100. Default: 90.
    ///
    /// Applies to JPEG page embedding in merge mode and to lossy image
    /// targets in convert mode. Lossless targets ignore it.
    pub quality: u8,

    /// Largest page edge in points for embedded images. Default: 3000.
    ///
    /// A 6000 × 4000 photo would otherwise produce an 83-inch page that most
    /// viewers refuse to open at a sensible zoom.
    pub max_page_dimension: u32,

    /// Text pagination parameters.
    pub text: TextLayout,

    /// Supersampling factor for the PDF render fallback. Default: 2.5.
    ///
    /// Affects raster resolution only; rendered pages keep the source page's
    /// geometry in points.
    pub render_scale: f32,

    /// JPEG quality for rendered PDF pages, 0–100. Default: 95.
    pub render_quality: u8,

    /// Category assigned to unknown extensions. Default: image.
    pub fallback_category: Category,

    /// Output file name in merge mode. Default: `merged_output.pdf`.
    pub merged_file_name: String,

    /// Receives one [`crate::progress::ProgressEvent`] per item.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            mode: AssemblyMode::default(),
            output_format: OutputFormat::Pdf,
            quality: 90,
            max_page_dimension: 3000,
            text: TextLayout::default(),
            render_scale: 2.5,
            render_quality: 95,
            fallback_category: Category::Image,
            merged_file_name: "merged_output.pdf".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AssemblyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyConfig")
            .field("mode", &self.mode)
            .field("output_format", &self.output_format)
            .field("quality", &self.quality)
            .field("max_page_dimension", &self.max_page_dimension)
            .field("text", &self.text)
            .field("render_scale", &self.render_scale)
            .field("render_quality", &self.render_quality)
            .field("fallback_category", &self.fallback_category)
            .field("merged_file_name", &self.merged_file_name)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AssemblyProgressCallback>"),
            )
            .finish()
    }
}

impl AssemblyConfig {
    /// Create a new builder for `AssemblyConfig`.
    pub fn builder() -> AssemblyConfigBuilder {
        AssemblyConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AssemblyConfig`].
#[derive(Debug)]
pub struct AssemblyConfigBuilder {
    config: AssemblyConfig,
}

impl AssemblyConfigBuilder {
    pub fn mode(mut self, mode: AssemblyMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.config.quality = quality.min(100);
        self
    }

    pub fn max_page_dimension(mut self, points: u32) -> Self {
        self.config.max_page_dimension = points.max(1);
        self
    }

    pub fn text_layout(mut self, layout: TextLayout) -> Self {
        self.config.text = layout;
        self
    }

    pub fn font_size(mut self, size: f32) -> Self {
        self.config.text.font_size = size.clamp(4.0, 72.0);
        self
    }

    pub fn margin(mut self, margin: f32) -> Self {
        self.config.text.margin = margin.max(0.0);
        self
    }

    pub fn line_height_factor(mut self, factor: f32) -> Self {
        self.config.text.line_height_factor = factor.clamp(1.0, 4.0);
        self
    }

    /// `None` derives the budget from page width, margins and font size.
    pub fn max_chars_per_line(mut self, chars: Option<usize>) -> Self {
        self.config.text.max_chars_per_line = chars.map(|c| c.max(1));
        self
    }

    pub fn merge_header(mut self, enabled: bool) -> Self {
        self.config.text.merge_header = enabled;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(0.5, 8.0);
        self
    }

    pub fn render_quality(mut self, quality: u8) -> Self {
        self.config.render_quality = quality.min(100);
        self
    }

    pub fn fallback_category(mut self, category: Category) -> Self {
        self.config.fallback_category = category;
        self
    }

    pub fn merged_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.merged_file_name = name.into();
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssemblyConfig, AssemblyError> {
        let c = &self.config;
        if c.mode == AssemblyMode::Merge && c.output_format != OutputFormat::Pdf {
            return Err(AssemblyError::InvalidConfig(format!(
                "merge mode produces a PDF, got output format '{}'",
                c.output_format
            )));
        }
        if c.max_page_dimension == 0 {
            return Err(AssemblyError::InvalidConfig(
                "max page dimension must be at least 1 point".into(),
            ));
        }
        let t = &c.text;
        if t.margin * 2.0 >= t.page_width || t.page_height - 2.0 * t.margin < t.line_height() {
            return Err(AssemblyError::InvalidConfig(format!(
                "margin {} leaves no room for text on a {}x{} page",
                t.margin, t.page_width, t.page_height
            )));
        }
        if c.merged_file_name.trim().is_empty() {
            return Err(AssemblyError::InvalidConfig(
                "merged file name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Text layout ──────────────────────────────────────────────────────────

/// Page geometry and typography for the text paginator. All values in points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLayout {
    /// Default: 612 (US Letter).
    pub page_width: f32,
    /// Default: 792 (US Letter).
    pub page_height: f32,
    /// Body font size. Default: 11.
    pub font_size: f32,
    /// Margin on every side. Default: 50.
    pub margin: f32,
    /// Line advance as a multiple of `font_size`. Default: 1.4.
    pub line_height_factor: f32,
    /// Hard-wrap budget in characters. Default: `Some(85)`.
    ///
    /// This is a character count, not a glyph-width measurement, so
    /// proportional fonts will wrap a little early or late.
    pub max_chars_per_line: Option<usize>,
    /// Assumed monospace character width as a fraction of `font_size`,
    /// used only when `max_chars_per_line` is `None`. Default: 0.5.
    pub char_width_factor: f32,
    /// Print the item name on the first page in merge mode. Default: true.
    pub merge_header: bool,
    /// Header font size. Default: 10.
    pub header_font_size: f32,
    /// Line heights consumed by the header before body text. Default: 2.
    pub header_gap_lines: f32,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            page_width: 612.0,
            page_height: 792.0,
            font_size: 11.0,
            margin: 50.0,
            line_height_factor: 1.4,
            max_chars_per_line: Some(85),
            char_width_factor: 0.5,
            merge_header: true,
            header_font_size: 10.0,
            header_gap_lines: 2.0,
        }
    }
}

impl TextLayout {
    /// Vertical advance per line.
    pub fn line_height(&self) -> f32 {
        self.font_size * self.line_height_factor
    }

    /// Effective hard-wrap budget.
    pub fn chars_per_line(&self) -> usize {
        match self.max_chars_per_line {
            Some(n) => n.max(1),
            None => {
                let usable = (self.page_width - 2.0 * self.margin).max(0.0);
                let per_char = (self.font_size * self.char_width_factor).max(0.1);
                ((usable / per_char).floor() as usize).max(1)
            }
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the batch is turned into output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyMode {
    /// One output per item; failed items are omitted.
    Convert,
    /// One PDF for the whole batch; failed items become placeholder pages. (default)
    #[default]
    Merge,
}

impl FromStr for AssemblyMode {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "convert" => Ok(AssemblyMode::Convert),
            "merge" => Ok(AssemblyMode::Merge),
            other => Err(AssemblyError::InvalidConfig(format!(
                "unknown mode '{other}' (expected convert or merge)"
            ))),
        }
    }
}

/// Target encoding of an output unit.
///
/// Anything not listed is kept as [`OutputFormat::Other`]; opaque media can
/// still be passed through under that extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
    Ico,
    Tiff,
    Pdf,
    Txt,
    Html,
    Markdown,
    Other(String),
}

impl OutputFormat {
    /// File extension written on converted outputs.
    pub fn extension(&self) -> &str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
            OutputFormat::Gif => "gif",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Ico => "ico",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Txt => "txt",
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "md",
            OutputFormat::Other(ext) => ext,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Bmp => "image/bmp",
            OutputFormat::Ico => "image/x-icon",
            OutputFormat::Tiff => "image/tiff",
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Txt => "text/plain",
            OutputFormat::Html => "text/html",
            OutputFormat::Markdown => "text/markdown",
            OutputFormat::Other(_) => "application/octet-stream",
        }
    }

    /// True for targets produced by the image normalizer.
    pub fn is_raster(&self) -> bool {
        matches!(
            self,
            OutputFormat::Png
                | OutputFormat::Jpeg
                | OutputFormat::Webp
                | OutputFormat::Gif
                | OutputFormat::Bmp
                | OutputFormat::Ico
                | OutputFormat::Tiff
        )
    }

    /// True for text targets of the document converter.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            OutputFormat::Txt | OutputFormat::Html | OutputFormat::Markdown
        )
    }
}

impl FromStr for OutputFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Ok(match lower.as_str() {
            "png" => OutputFormat::Png,
            "jpg" | "jpeg" => OutputFormat::Jpeg,
            "webp" => OutputFormat::Webp,
            "gif" => OutputFormat::Gif,
            "bmp" => OutputFormat::Bmp,
            "ico" => OutputFormat::Ico,
            "tif" | "tiff" => OutputFormat::Tiff,
            "pdf" => OutputFormat::Pdf,
            "txt" | "text" => OutputFormat::Txt,
            "html" | "htm" => OutputFormat::Html,
            "md" | "markdown" => OutputFormat::Markdown,
            _ => OutputFormat::Other(lower),
        })
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
