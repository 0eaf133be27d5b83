//! Output encoding: [`Document`] → PDF bytes.
//!
//! Three page kinds map onto three PDF constructs:
//!
//! - embedded rasters become image XObjects drawn to fill the page box
//!   (JPEG passes through as `DCTDecode`, PNG is unpacked to raw RGB and
//!   stored with `FlateDecode`);
//! - text runs become a content stream in the standard Helvetica font;
//! - native pages are imported from their parsed source with every object
//!   renumbered past the output's current maximum id.
//!
//! Native sources are imported once per source document, however many of
//! their pages appear.

use crate::document::{Document, NativePdf, Page, PageContent, RasterEncoding, TextRun};
use crate::error::AssemblyError;
use crate::pipeline::ingest;
use crate::pipeline::text;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream, StringFormat};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

/// PDF version written on every output.
pub const PDF_VERSION: &str = "1.7";

/// Page-tree attributes a copied page may inherit from its ancestors.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"Resources", b"CropBox", b"Rotate"];

/// Serialise `document` to PDF bytes. Consumes the document.
pub fn encode_document(document: Document) -> Result<Vec<u8>, AssemblyError> {
    let font_name = document.font;
    let pages = document.into_pages();
    let page_count = pages.len();

    let mut out = lopdf::Document::with_version(PDF_VERSION);
    let pages_id = out.new_object_id();
    let font_id = out.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font_name,
        "Encoding" => "WinAnsiEncoding",
    });

    let mut imported: HashMap<*const NativePdf, Vec<ObjectId>> = HashMap::new();
    let mut kids: Vec<Object> = Vec::with_capacity(page_count);

    for (idx, page) in pages.into_iter().enumerate() {
        let page_id = match &page.content {
            PageContent::CopiedNative { source, page_index } => {
                let key = Arc::as_ptr(source);
                if !imported.contains_key(&key) {
                    let ids = import_native(&mut out, source, pages_id)
                        .map_err(|detail| encode_failed(format!("page {}", idx + 1), detail))?;
                    imported.insert(key, ids);
                }
                imported
                    .get(&key)
                    .and_then(|ids| ids.get(*page_index))
                    .copied()
                    .ok_or_else(|| {
                        encode_failed(
                            format!("page {}", idx + 1),
                            format!("source has no page {}", page_index + 1),
                        )
                    })?
            }
            _ => write_synthetic_page(&mut out, &page, pages_id, font_id)
                .map_err(|detail| encode_failed(format!("page {}", idx + 1), detail))?,
        };
        kids.push(page_id.into());
    }

    out.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = out.add_object(dictionary! {
        "Producer" => Object::string_literal(concat!("unifile ", env!("CARGO_PKG_VERSION"))),
    });
    out.trailer.set("Root", catalog_id);
    out.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    out.save_to(&mut bytes)
        .map_err(|e| encode_failed("merged PDF serialisation", e.to_string()))?;
    info!("Encoded {} page(s) → {} bytes", page_count, bytes.len());
    Ok(bytes)
}

fn encode_failed(stage: impl Into<String>, detail: impl Into<String>) -> AssemblyError {
    AssemblyError::EncodeFailed {
        stage: stage.into(),
        detail: detail.into(),
    }
}

// ── Synthetic pages ──────────────────────────────────────────────────────

fn write_synthetic_page(
    out: &mut lopdf::Document,
    page: &Page,
    pages_id: ObjectId,
    font_id: ObjectId,
) -> Result<ObjectId, String> {
    let (operations, resources) = match &page.content {
        PageContent::EmbeddedRaster {
            bytes,
            encoding,
            pixel_width,
            pixel_height,
        } => {
            let image_id = out.add_object(image_xobject(bytes, *encoding, *pixel_width, *pixel_height)?);
            let ops = vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(page.width),
                        0.into(),
                        0.into(),
                        Object::Real(page.height),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ];
            let resources = dictionary! { "XObject" => dictionary! { "Im0" => image_id } };
            (ops, resources)
        }
        PageContent::TextLines(runs) => {
            let resources = dictionary! { "Font" => dictionary! { "F1" => font_id } };
            (text_operations(runs), resources)
        }
        PageContent::CopiedNative { .. } => {
            return Err("native pages are imported, not synthesised".to_string())
        }
    };

    let content = Content { operations }
        .encode()
        .map_err(|e| format!("content stream: {e}"))?;
    let mut stream = Stream::new(dictionary! {}, content);
    // Best effort; an uncompressed stream is still valid.
    let _ = stream.compress();
    let content_id = out.add_object(stream);

    Ok(out.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), Object::Real(page.width), Object::Real(page.height)],
        "Contents" => content_id,
        "Resources" => resources,
    }))
}

fn text_operations(runs: &[TextRun]) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(runs.len() * 6);
    for run in runs {
        let bytes = text::encode_win_ansi(&run.text)
            .unwrap_or_else(|_| text::lossy_win_ansi(&run.text).bytes().collect());
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Real(run.size)],
        ));
        ops.push(Operation::new(
            "rg",
            vec![
                Object::Real(run.color.0),
                Object::Real(run.color.1),
                Object::Real(run.color.2),
            ],
        ));
        ops.push(Operation::new(
            "Td",
            vec![Object::Real(run.x), Object::Real(run.y)],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(bytes, StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
    }
    ops
}

fn image_xobject(
    bytes: &[u8],
    encoding: RasterEncoding,
    pixel_width: u32,
    pixel_height: u32,
) -> Result<Stream, String> {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => pixel_width as i64,
        "Height" => pixel_height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    let data = match encoding {
        RasterEncoding::Jpeg => {
            dict.set("Filter", "DCTDecode");
            bytes.to_vec()
        }
        RasterEncoding::Png => {
            let rgb = image::load_from_memory(bytes)
                .map_err(|e| format!("embedded PNG unreadable: {e}"))?
                .to_rgb8();
            if rgb.width() != pixel_width || rgb.height() != pixel_height {
                return Err(format!(
                    "embedded PNG is {}x{}, page declares {}x{}",
                    rgb.width(),
                    rgb.height(),
                    pixel_width,
                    pixel_height
                ));
            }
            dict.set("Filter", "FlateDecode");
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(rgb.as_raw())
                .and_then(|_| encoder.finish())
                .map_err(|e| format!("deflate: {e}"))?
        }
    };
    // Already compressed; keep lopdf from deflating it again.
    Ok(Stream::new(dict, data).with_compression(false))
}

// ── Native page import ───────────────────────────────────────────────────

/// Copy every object of `source` into `out`, renumbered, and return the new
/// page ids in page order. Pages are re-parented to `pages_id` with their
/// inherited attributes made explicit.
fn import_native(
    out: &mut lopdf::Document,
    source: &NativePdf,
    pages_id: ObjectId,
) -> Result<Vec<ObjectId>, String> {
    let mut doc = source.document.clone();
    doc.renumber_objects_with(out.max_id + 1);

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if page_ids.len() != source.page_count() {
        return Err(format!(
            "page tree changed on import: {} vs {}",
            page_ids.len(),
            source.page_count()
        ));
    }

    let mut page_dicts = Vec::with_capacity(page_ids.len());
    for &id in &page_ids {
        let mut dict: Dictionary = doc
            .get_dictionary(id)
            .map_err(|e| format!("page object {id:?}: {e}"))?
            .clone();
        for key in INHERITABLE {
            if !dict.has(key) {
                if let Some(value) = ingest::inherited(&doc, id, key) {
                    dict.set(key, value.clone());
                }
            }
        }
        if !dict.has(b"MediaBox") {
            let [x0, y0, x1, y1] = ingest::DEFAULT_MEDIA_BOX;
            dict.set(
                "MediaBox",
                vec![Object::Real(x0), Object::Real(y0), Object::Real(x1), Object::Real(y1)],
            );
        }
        dict.set("Parent", pages_id);
        page_dicts.push((id, dict));
    }

    let max_id = doc.max_id;
    for (object_id, object) in doc.objects {
        match object.type_name().unwrap_or(b"") {
            b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline" => {}
            _ => {
                out.objects.insert(object_id, object);
            }
        }
    }
    for (id, dict) in page_dicts {
        out.objects.insert(id, Object::Dictionary(dict));
    }
    out.max_id = out.max_id.max(max_id);

    debug!("Imported native source: {} page(s)", page_ids.len());
    Ok(page_ids)
}
