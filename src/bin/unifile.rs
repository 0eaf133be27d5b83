//! CLI binary for unifile.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AssemblyConfig`, writes the outputs and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use unifile::{
    write_output_file, AssemblyConfig, AssemblyEngine, AssemblyMode, AssemblyOutput,
    AssemblyProgressCallback, Category, FfmpegDecoder, ItemStatus, OutputFormat, PdfiumRasterizer,
    ProgressCallback, ProgressEvent, SourceItem,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per item.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Error text per item index, printed with that item's progress line.
    errors: Mutex<HashMap<usize, String>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} items  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Assembling");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: Mutex::new(HashMap::new()),
        })
    }
}

impl AssemblyProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        self.bar.set_length(total_items as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Assembling {total_items} item(s)…"))
        ));
    }

    fn on_item_error(&self, item_index: usize, _name: &str, error: &str) {
        self.errors
            .lock()
            .unwrap()
            .insert(item_index, error.to_string());
    }

    fn on_progress(&self, event: &ProgressEvent) {
        let error = self.errors.lock().unwrap().remove(&event.item_index);
        let mark = match event.phase_label.as_str() {
            "placeholder" => yellow("⚠"),
            "failed" => red("✗"),
            _ => green("✓"),
        };
        let detail = match error {
            Some(msg) => {
                // Truncate very long error messages to keep output tidy.
                let msg: String = if msg.chars().count() > 80 {
                    msg.chars().take(79).chain(std::iter::once('\u{2026}')).collect()
                } else {
                    msg
                };
                red(&msg)
            }
            None => dim(&event.phase_label),
        };
        self.bar.println(format!(
            "  {} {:>5.1}%  {:<32}  {}",
            mark, event.percent_complete, event.item_name, detail
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_items: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_items.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} item(s) assembled successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} items assembled  ({} failed)",
                if failed == total_items {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_items,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge everything into merged_output.pdf
  unifile photo.jpg notes.md scan.pdf

  # Merge to a chosen file, lossless image embedding
  unifile --quality 100 -o album.pdf *.png

  # Convert each image to WebP in ./out
  unifile --mode convert --to webp -o out/ *.heic *.jpg

  # Convert Markdown and CSV to standalone HTML pages
  unifile --mode convert --to html README.md data.csv

  # Machine-readable report on stdout
  unifile --json a.png b.pdf > report.json

MODES:
  merge    (default) every item becomes pages of one PDF. A failed item is
           replaced by a single placeholder page naming the error.
  convert  every item is converted on its own to --to. A failed item is left
           out of the output.

CONVERT TARGETS:
  images     png, jpg, webp, gif, bmp, ico (256×256), tiff, pdf
  documents  txt, md, html, pdf   (from txt, md, html, json, csv, tsv, xml, rtf)
  pdf        pdf
  audio/video  copied unchanged under the new extension

ENVIRONMENT VARIABLES:
  UNIFILE_MODE, UNIFILE_TO, UNIFILE_QUALITY, UNIFILE_OUTPUT, …
                          Every flag can be set through UNIFILE_<FLAG>
  PDFIUM_LIB_PATH         Path to libpdfium for the PDF render fallback
  RUST_LOG                Overrides -v / -q log filtering

SETUP:
  PDFium is optional. Without it, PDFs the structural parser cannot open
  become placeholder pages. HEIC/HEIF decoding needs ffmpeg on PATH.
"#;

/// Merge or convert images, text documents, PDFs and media files.
#[derive(Parser, Debug)]
#[command(
    name = "unifile",
    version,
    about = "Merge or convert images, text documents, PDFs and media files",
    long_about = "Assemble a batch of mixed files into one paginated PDF, or convert each file \
to a single target format. Items that cannot be processed never abort the batch.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files, in output order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// merge: one PDF; convert: one file per input.
    #[arg(long, env = "UNIFILE_MODE", value_enum, default_value = "merge")]
    mode: ModeArg,

    /// Target format: png, jpg, webp, gif, bmp, ico, tiff, pdf, txt, html, md.
    #[arg(long = "to", env = "UNIFILE_TO", default_value = "pdf")]
    to: String,

    /// Output file (merge) or directory (convert).
    #[arg(short, long, env = "UNIFILE_OUTPUT")]
    output: Option<PathBuf>,

    /// Lossy image quality (0–100). 100 embeds images losslessly when merging.
    #[arg(long, env = "UNIFILE_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    quality: u8,

    /// Largest page edge in points for embedded images.
    #[arg(long, env = "UNIFILE_MAX_PAGE_DIMENSION", default_value_t = 3000)]
    max_page_dimension: u32,

    /// Body font size for text documents.
    #[arg(long, env = "UNIFILE_FONT_SIZE", default_value_t = 11.0)]
    font_size: f32,

    /// Page margin in points.
    #[arg(long, env = "UNIFILE_MARGIN", default_value_t = 50.0)]
    margin: f32,

    /// Line height as a multiple of the font size.
    #[arg(long, env = "UNIFILE_LINE_HEIGHT", default_value_t = 1.4)]
    line_height: f32,

    /// Hard-wrap budget in characters. 0 derives it from the page width.
    #[arg(long, env = "UNIFILE_MAX_CHARS", default_value_t = 85)]
    max_chars: usize,

    /// Do not print the file name above merged text documents.
    #[arg(long, env = "UNIFILE_NO_HEADER")]
    no_header: bool,

    /// Category for unknown extensions: image, document, pdf, audio, video.
    #[arg(long, env = "UNIFILE_FALLBACK_CATEGORY", default_value = "image")]
    fallback_category: String,

    /// Path to libpdfium (file or directory) for the PDF render fallback.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// ffmpeg executable used to decode HEIC/HEIF images.
    #[arg(long, env = "UNIFILE_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "UNIFILE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "UNIFILE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "UNIFILE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "UNIFILE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ModeArg {
    Merge,
    Convert,
}

impl From<ModeArg> for AssemblyMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Merge => AssemblyMode::Merge,
            ModeArg::Convert => AssemblyMode::Convert,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AssemblyProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Read inputs ──────────────────────────────────────────────────────
    let mut items = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let item = SourceItem::from_path_with_fallback(path, config.fallback_category)
            .await
            .with_context(|| format!("Failed to read input {}", path.display()))?;
        items.push(item);
    }

    // ── Backends ─────────────────────────────────────────────────────────
    let mut engine = AssemblyEngine::new(config.clone())
        .with_aux_decoder(Arc::new(FfmpegDecoder::with_program(&cli.ffmpeg)));

    let needs_pdf_renderer = items.iter().any(|i| i.category == Category::Pdf);
    if needs_pdf_renderer {
        match PdfiumRasterizer::bind(cli.pdfium_lib.as_deref()) {
            Ok(rasterizer) => engine = engine.with_rasterizer(Arc::new(rasterizer)),
            Err(e) if cli.pdfium_lib.is_some() => {
                return Err(e).context("Failed to load the PDFium library");
            }
            Err(e) => warn!("PDF render fallback disabled: {}", e),
        }
    }

    // Ctrl-C stops the batch before the next item.
    let cancel = engine.cancellation_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    // ── Run ──────────────────────────────────────────────────────────────
    let output = engine.assemble(items).await.context("Assembly failed")?;

    // ── Write outputs ────────────────────────────────────────────────────
    let written = write_outputs(&cli, &config, &output).await?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output.report())
            .context("Failed to serialise report")?;
        println!("{json}");
    }

    if !cli.quiet {
        if !show_progress {
            eprintln!(
                "Assembled {}/{} items in {}ms",
                output.stats.ok_items, output.stats.total_items, output.stats.total_duration_ms
            );
            for item in output.items.iter().filter(|i| i.status != ItemStatus::Ok) {
                if let Some(ref e) = item.error {
                    eprintln!("  {} {}", item.name, e);
                }
            }
        }
        for path in &written {
            eprintln!("   →  {}", bold(&path.display().to_string()));
        }
    }

    Ok(())
}

/// Map CLI args to `AssemblyConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AssemblyConfig> {
    let output_format: OutputFormat = cli
        .to
        .parse()
        .unwrap_or_else(|never: std::convert::Infallible| match never {});
    let fallback_category: Category = cli
        .fallback_category
        .parse()
        .map_err(anyhow::Error::msg)
        .context("Invalid --fallback-category")?;

    let mut builder = AssemblyConfig::builder()
        .mode(cli.mode.clone().into())
        .output_format(output_format)
        .quality(cli.quality)
        .max_page_dimension(cli.max_page_dimension)
        .font_size(cli.font_size)
        .margin(cli.margin)
        .line_height_factor(cli.line_height)
        .max_chars_per_line((cli.max_chars > 0).then_some(cli.max_chars))
        .merge_header(!cli.no_header)
        .fallback_category(fallback_category);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Write every output file; returns the paths written, in order.
async fn write_outputs(
    cli: &Cli,
    config: &AssemblyConfig,
    output: &AssemblyOutput,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(output.files.len());
    match config.mode {
        AssemblyMode::Merge => {
            let Some(merged) = output.merged() else {
                anyhow::bail!("Merge produced no PDF");
            };
            let path = match &cli.output {
                Some(p) if p.is_dir() => p.join(&merged.name),
                Some(p) => p.clone(),
                None => PathBuf::from(&merged.name),
            };
            write_output_file(&path, &merged.bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }
        AssemblyMode::Convert => {
            let dir = cli.output.as_deref().unwrap_or(Path::new("."));
            for file in &output.files {
                let path = dir.join(&file.name);
                write_output_file(&path, &file.bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                written.push(path);
            }
        }
    }
    Ok(written)
}
