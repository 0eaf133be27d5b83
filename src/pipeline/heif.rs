//! Auxiliary decoders for raster formats the `image` crate cannot read.
//!
//! HEIC/HEIF is the common case: phones produce it by default but no pure
//! Rust decoder ships in `image`. The engine accepts any
//! [`AuxiliaryDecoder`] via `AssemblyEngine::with_aux_decoder`; the provided
//! [`FfmpegDecoder`] shells out to `ffmpeg`, which composes HEIF tile grids.

use image::DynamicImage;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Extensions that need an auxiliary decoder.
pub const AUXILIARY_EXTENSIONS: &[&str] = &["heic", "heif"];

pub fn needs_auxiliary(extension: &str) -> bool {
    AUXILIARY_EXTENSIONS.contains(&extension)
}

/// Transcodes an unsupported raster into a decoded image.
pub trait AuxiliaryDecoder: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Decode `bytes` whose extension is `extension`.
    fn decode(&self, bytes: &[u8], extension: &str) -> Result<DynamicImage, String>;
}

/// Decodes through an external `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    program: PathBuf,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegDecoder {
    /// Use a specific ffmpeg executable instead of the one on `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AuxiliaryDecoder for FfmpegDecoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn decode(&self, bytes: &[u8], extension: &str) -> Result<DynamicImage, String> {
        let dir = tempfile::TempDir::new().map_err(|e| format!("tempdir: {e}"))?;
        let input = dir.path().join(format!("input.{extension}"));
        let output = dir.path().join("decoded.png");
        std::fs::write(&input, bytes).map_err(|e| format!("write temp input: {e}"))?;

        let result = Command::new(&self.program)
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(&input)
            .args(["-pix_fmt", "rgb24", "-frames:v", "1", "-f", "image2"])
            .arg(&output)
            .output()
            .map_err(|e| format!("failed to run {}: {e}", self.program.display()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(format!("ffmpeg failed to decode {extension}: {}", stderr.trim()));
        }

        let img = image::open(&output).map_err(|e| format!("ffmpeg output unreadable: {e}"))?;
        debug!(
            "ffmpeg decoded {} → {}x{}",
            extension,
            img.width(),
            img.height()
        );
        Ok(img)
    }
}
