//! Pipeline stages of the assembly engine.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and a backend (rasterizer, auxiliary decoder) can be
//! swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//!                   ┌─▶ raster ─────────────────┐
//! input ─▶ classify ┼─▶ preprocess ─▶ text ─────┼─▶ Document ─▶ encode
//!                   └─▶ ingest ─▶ (render) ─────┘
//! ```
//!
//! 1. [`input`]      — wrap bytes or read paths into immutable `SourceItem`s
//! 2. [`classify`]   — extension tables plus a magic-byte sniff
//! 3. [`raster`]     — decode, flatten onto white, re-encode; [`heif`] supplies
//!    decoders the `image` crate lacks
//! 4. [`preprocess`] — Markdown/HTML/JSON/CSV → text for each target
//! 5. [`text`]       — hard-wrap and paginate plain text
//! 6. [`ingest`]     — PDF strategy chain; [`render`] is its raster fallback
//! 7. [`encode`]     — write the final PDF with lopdf

pub mod classify;
pub mod encode;
pub mod heif;
pub mod ingest;
pub mod input;
pub mod preprocess;
pub mod raster;
pub mod render;
pub mod text;
