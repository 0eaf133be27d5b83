//! Input items: immutable, classified byte buffers.
//!
//! A [`SourceItem`] owns its bytes behind an `Arc<[u8]>` so every strategy
//! that looks at an item (classification, decode, structural parse, render)
//! shares one read-only buffer. Nothing in the engine writes to it.

use crate::error::AssemblyError;
use crate::pipeline::classify::{self, Category};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One user-supplied file.
#[derive(Debug, Clone)]
pub struct SourceItem {
    /// Opaque token, unique within the process.
    pub id: u64,
    pub name: String,
    pub byte_length: usize,
    pub category: Category,
    /// Lowercase extension or [`classify::UNKNOWN_EXTENSION`].
    pub extension: String,
    bytes: Arc<[u8]>,
}

impl SourceItem {
    /// Wrap an in-memory buffer. Unlisted extensions classify as images.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::with_fallback(name, bytes, Category::Image)
    }

    /// Wrap an in-memory buffer, mapping unlisted extensions to `fallback`.
    pub fn with_fallback(
        name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        fallback: Category,
    ) -> Self {
        let name = name.into();
        let bytes: Arc<[u8]> = bytes.into();
        let classification = classify::classify(&name, &bytes, fallback);
        debug!(
            "Classified '{}' as {} (.{})",
            name, classification.category, classification.extension
        );
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name,
            byte_length: bytes.len(),
            category: classification.category,
            extension: classification.extension,
            bytes,
        }
    }

    /// Read a file from disk. The item name is the file name without its
    /// directory.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AssemblyError> {
        Self::from_path_with_fallback(path, Category::Image).await
    }

    pub async fn from_path_with_fallback(
        path: impl AsRef<Path>,
        fallback: Category,
    ) -> Result<Self, AssemblyError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| map_read_error(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(Self::with_fallback(name, bytes, fallback))
    }

    /// Shared read-only view of the raw bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Another handle on the same buffer.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    /// `name` with its last extension replaced by `extension`, or with
    /// `extension` appended when there is none.
    pub fn renamed(&self, extension: &str) -> String {
        rename_extension(&self.name, extension)
    }
}

/// Replace the last extension of `name` with `extension`.
pub fn rename_extension(name: &str, extension: &str) -> String {
    let stem = match name.rfind('.') {
        Some(i) if i > 0 && !name[i..].contains(['/', '\\']) => &name[..i],
        _ => name,
    };
    format!("{stem}.{extension}")
}

/// `name`, or `stem (n).ext` with the smallest `n >= 2` not yet taken.
/// Names are compared ignoring ASCII case; the result is recorded in `taken`.
pub fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_ascii_lowercase()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if taken.insert(candidate.to_ascii_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

fn map_read_error(path: &Path, e: std::io::Error) -> AssemblyError {
    let path: PathBuf = path.to_path_buf();
    match e.kind() {
        std::io::ErrorKind::NotFound => AssemblyError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => AssemblyError::PermissionDenied { path },
        _ => AssemblyError::ReadFailed { path, source: e },
    }
}
