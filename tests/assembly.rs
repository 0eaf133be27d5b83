//! Integration tests over the public assembly API.
//!
//! Every fixture is built in memory: images with the `image` crate, PDFs with
//! `lopdf`, and a fake rasterizer standing in for pdfium. Nothing here needs
//! a native library, so these run everywhere.

use futures::StreamExt;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use lopdf::{dictionary, Document, Object};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use unifile::{
    assemble, assemble_paths, assemble_sync, progress_channel, AssemblyConfig, AssemblyEngine,
    AssemblyError, AssemblyEvent, AssemblyMode, AssemblyProgressCallback, ItemError, ItemStatus,
    OpenVariant, OutputFormat, PageKind, PdfRasterizer, ProgressEvent, RenderError, RenderedPage,
    SourceItem,
};

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn transparent_png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// A minimal, valid PDF with one empty page per `(width, height)`.
fn pdf(sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut buf = Vec::new();
    page_tree(sizes).save_to(&mut buf).unwrap();
    buf
}

/// A parseable PDF behind the standard security handler. The `/U` entry
/// matches no password, so only a real PDF engine could open it.
fn encrypted_pdf(sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut doc = page_tree(sizes);
    let encrypt = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "O" => Object::string_literal(vec![0x5Au8; 32]),
        "U" => Object::string_literal(vec![0xA5u8; 32]),
        "P" => -44,
    });
    doc.trailer.set("Encrypt", encrypt);
    doc.trailer.set(
        "ID",
        vec![
            Object::string_literal(vec![0x01u8; 16]),
            Object::string_literal(vec![0x01u8; 16]),
        ],
    );
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn page_tree(sizes: &[(i64, i64)]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = sizes
        .iter()
        .map(|&(w, h)| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => sizes.len() as i64,
        }),
    );
    let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog);
    doc
}

/// Bytes the structural parser rejects.
fn unparseable_pdf() -> Vec<u8> {
    b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 0 obj <</Filter /Standard /V 5 >> garbage".to_vec()
}

/// Opens only with the configured variant and renders two 200×100 pt pages.
struct FakeRasterizer {
    opens_on: OpenVariant,
    seen: Mutex<Vec<OpenVariant>>,
}

impl FakeRasterizer {
    fn opening_on(variant: OpenVariant) -> Arc<Self> {
        Arc::new(Self {
            opens_on: variant,
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl PdfRasterizer for FakeRasterizer {
    fn name(&self) -> &str {
        "fake"
    }

    fn render(
        &self,
        _bytes: &[u8],
        variant: OpenVariant,
        scale: f32,
    ) -> Result<Vec<Result<RenderedPage, RenderError>>, String> {
        self.seen.lock().unwrap().push(variant);
        if variant != self.opens_on {
            return Err(format!("{variant}: cannot open"));
        }
        let w = (200.0 * scale).round() as u32;
        let h = (100.0 * scale).round() as u32;
        Ok((0..2)
            .map(|_| {
                Ok(RenderedPage {
                    image: DynamicImage::ImageRgb8(RgbImage::new(w, h)),
                    width: 200.0,
                    height: 100.0,
                })
            })
            .collect())
    }
}

fn merge_config() -> AssemblyConfig {
    AssemblyConfig::default()
}

fn convert_config(format: OutputFormat) -> AssemblyConfig {
    AssemblyConfig::builder()
        .mode(AssemblyMode::Convert)
        .output_format(format)
        .build()
        .unwrap()
}

/// Page boxes of a serialised PDF, in page order.
fn media_boxes(bytes: &[u8]) -> Vec<(f32, f32)> {
    let doc = Document::load_mem(bytes).expect("merged output parses");
    doc.get_pages()
        .into_values()
        .map(|id| {
            let dict = doc.get_dictionary(id).unwrap();
            let mb = dict.get(b"MediaBox").unwrap().as_array().unwrap();
            let n = |o: &Object| o.as_float().unwrap();
            (n(&mb[2]) - n(&mb[0]), n(&mb[3]) - n(&mb[1]))
        })
        .collect()
}

/// Pixel size of the `Im0` XObject drawn on page `index` (0-based).
fn image_pixels(bytes: &[u8], index: usize) -> (i64, i64) {
    let doc = Document::load_mem(bytes).unwrap();
    let page_id = *doc.get_pages().values().nth(index).unwrap();
    let page = doc.get_dictionary(page_id).unwrap();
    let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
    let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
    let image_id = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
    let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
    (
        stream.dict.get(b"Width").unwrap().as_i64().unwrap(),
        stream.dict.get(b"Height").unwrap().as_i64().unwrap(),
    )
}

// ── Merge mode ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_preserves_item_order() {
    let items = vec![
        SourceItem::from_bytes("one.pdf", pdf(&[(300, 400), (310, 410)])),
        SourceItem::from_bytes("two.png", png(40, 30)),
        SourceItem::from_bytes("three.txt", b"third item".to_vec()),
        SourceItem::from_bytes("four.pdf", pdf(&[(500, 500)])),
    ];
    let out = assemble(items, &merge_config()).await.unwrap();

    let origins: Vec<usize> = out.pages.iter().map(|p| p.item_index).collect();
    assert_eq!(origins, vec![0, 0, 1, 2, 3]);

    let merged = out.merged().unwrap();
    assert_eq!(merged.name, "merged_output.pdf");
    assert_eq!(
        media_boxes(&merged.bytes),
        vec![
            (300.0, 400.0),
            (310.0, 410.0),
            (40.0, 30.0),
            (612.0, 792.0),
            (500.0, 500.0)
        ]
    );
    assert_eq!(out.stats.total_pages, 5);
    assert_eq!(out.stats.ok_items, 4);
}

#[tokio::test]
async fn one_broken_pdf_becomes_one_placeholder() {
    let items = vec![
        SourceItem::from_bytes("a.png", png(10, 10)),
        SourceItem::from_bytes("broken.pdf", unparseable_pdf()),
        SourceItem::from_bytes("c.pdf", pdf(&[(612, 792)])),
    ];
    let out = assemble(items, &merge_config()).await.unwrap();

    assert_eq!(out.pages.len(), 3);
    assert_eq!(out.pages[1].kind, PageKind::Text);
    assert_eq!(out.items[1].status, ItemStatus::Placeholder);
    assert_eq!(out.items[1].pages, 1);
    // direct-copy, then the render fallback with no rasterizer.
    assert_eq!(out.items[1].attempts.len(), 2);
    assert!(matches!(
        out.items[1].error,
        Some(ItemError::IngestionFailed { .. })
    ));
    assert_eq!(out.stats.failed_items, 1);
    assert_eq!(media_boxes(&out.merged().unwrap().bytes).len(), 3);
}

#[tokio::test]
async fn encrypted_pdf_renders_through_fallback() {
    let fake = FakeRasterizer::opening_on(OpenVariant::EmptyPassword);
    let engine = AssemblyEngine::new(merge_config()).with_rasterizer(fake.clone());
    let items = vec![
        SourceItem::from_bytes("a.png", png(100, 50)),
        SourceItem::from_bytes("b.pdf", encrypted_pdf(&[(200, 100), (200, 100)])),
    ];
    let out = engine.assemble(items).await.unwrap();
    let bytes = &out.merged().unwrap().bytes;
    assert!(!Document::load_mem(bytes).unwrap().is_encrypted());

    assert_eq!(
        media_boxes(bytes),
        vec![(100.0, 50.0), (200.0, 100.0), (200.0, 100.0)]
    );
    assert_eq!(image_pixels(bytes, 0), (100, 50));
    // 2.5× supersampling of a 200×100 pt page.
    assert_eq!(image_pixels(bytes, 1), (500, 250));
    assert_eq!(image_pixels(bytes, 2), (500, 250));

    assert_eq!(
        *fake.seen.lock().unwrap(),
        vec![OpenVariant::Default, OpenVariant::EmptyPassword]
    );
    let report = &out.items[1];
    assert_eq!(report.status, ItemStatus::Ok);
    assert_eq!(report.pages, 2);
    assert_eq!(report.attempts.first().unwrap().strategy, "direct-copy");
    assert!(!report.attempts.first().unwrap().succeeded);
    assert_eq!(
        report.attempts.last().unwrap().strategy,
        "render:empty-password"
    );
}

#[tokio::test]
async fn encrypted_pdf_without_rasterizer_becomes_placeholder() {
    let items = vec![SourceItem::from_bytes("locked.pdf", encrypted_pdf(&[(300, 300)]))];
    let out = assemble(items, &merge_config()).await.unwrap();
    assert_eq!(out.items[0].status, ItemStatus::Placeholder);
    assert_eq!(out.pages.len(), 1);
    assert_eq!(out.pages[0].kind, PageKind::Text);
}

#[tokio::test]
async fn large_images_are_capped_on_the_page() {
    let config = AssemblyConfig::builder()
        .max_page_dimension(300)
        .build()
        .unwrap();
    let items = vec![
        SourceItem::from_bytes("wide.png", png(1200, 500)),
        SourceItem::from_bytes("tall.png", png(333, 999)),
    ];
    let out = assemble(items, &config).await.unwrap();

    for (page, (w, h)) in out.pages.iter().zip([(1200.0f32, 500.0f32), (333.0, 999.0)]) {
        assert!(page.width <= 300.0 && page.height <= 300.0);
        let expected_h = page.width * h / w;
        assert!((page.height - expected_h).abs() <= 1.0);
    }
    // Pixels are kept at full resolution.
    assert_eq!(image_pixels(&out.merged().unwrap().bytes, 0), (1200, 500));
}

#[tokio::test]
async fn long_text_line_wraps_without_truncation() {
    let line = "abcdefghij".repeat(20);
    let items = vec![SourceItem::from_bytes("notes.txt", line.clone().into_bytes())];
    let config = AssemblyConfig::builder()
        .merge_header(false)
        .build()
        .unwrap();
    let out = assemble(items, &config).await.unwrap();
    assert_eq!(out.pages.len(), 1);

    let doc = Document::load_mem(&out.merged().unwrap().bytes).unwrap();
    let page_id = *doc.get_pages().values().next().unwrap();
    let content = doc.get_and_decode_page_content(page_id).unwrap();
    let shown: Vec<String> = content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .map(|op| String::from_utf8(op.operands[0].as_str().unwrap().to_vec()).unwrap())
        .collect();
    assert_eq!(
        shown.iter().map(String::len).collect::<Vec<_>>(),
        vec![85, 85, 30]
    );
    assert_eq!(shown.concat(), line);
}

#[tokio::test]
async fn media_items_get_an_info_page() {
    let items = vec![SourceItem::from_bytes("talk.mp3", vec![0u8; 2048])];
    let out = assemble(items, &merge_config()).await.unwrap();
    assert_eq!(out.items[0].category, "audio");
    assert_eq!(out.items[0].status, ItemStatus::Ok);
    assert_eq!(out.pages.len(), 1);
    assert_eq!(out.pages[0].kind, PageKind::Text);
}

#[tokio::test]
async fn html_markdown_and_csv_paginate() {
    let items = vec![
        SourceItem::from_bytes(
            "page.html",
            b"<html><head><title>x</title></head><body><p>Hello</p></body></html>".to_vec(),
        ),
        SourceItem::from_bytes("readme.md", b"# Title\n\n**bold** text".to_vec()),
        SourceItem::from_bytes("data.csv", b"a,b\n1,2\n".to_vec()),
        SourceItem::from_bytes("cfg.json", br#"{"k":[1,2]}"#.to_vec()),
    ];
    let out = assemble(items, &merge_config()).await.unwrap();
    assert_eq!(out.stats.ok_items, 4);
    assert_eq!(out.pages.len(), 4);
}

// ── Convert mode ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn convert_bad_jpeg_yields_no_files() {
    let items = vec![SourceItem::from_bytes("bad.jpg", b"\xFF\xD8\xFF not really".to_vec())];
    let out = assemble(items, &convert_config(OutputFormat::Png))
        .await
        .unwrap();
    assert!(out.files.is_empty());
    assert_eq!(out.items[0].status, ItemStatus::Failed);
    assert!(matches!(out.items[0].error, Some(ItemError::Decode { .. })));
}

#[tokio::test]
async fn convert_never_produces_two_files_with_one_name() {
    let mut bmp = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(4, 4))
        .write_to(&mut bmp, ImageFormat::Bmp)
        .unwrap();
    let items = vec![
        SourceItem::from_bytes("photo.png", png(4, 4)),
        SourceItem::from_bytes("photo.bmp", bmp.into_inner()),
        SourceItem::from_bytes("Photo.PNG", png(4, 4)),
    ];
    let out = assemble(items, &convert_config(OutputFormat::Jpeg))
        .await
        .unwrap();
    let names: Vec<&str> = out.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["photo.jpg", "photo (2).jpg", "Photo (3).jpg"]);

    let dir = tempfile::tempdir().unwrap();
    for file in &out.files {
        unifile::write_output_file(&dir.path().join(&file.name), &file.bytes)
            .await
            .unwrap();
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
}

#[tokio::test]
async fn convert_to_ico_is_always_256() {
    let items = vec![
        SourceItem::from_bytes("wide.png", png(640, 120)),
        SourceItem::from_bytes("tiny.png", png(3, 7)),
    ];
    let out = assemble(items, &convert_config(OutputFormat::Ico))
        .await
        .unwrap();
    assert_eq!(out.files.len(), 2);
    for file in &out.files {
        let icon = image::load_from_memory_with_format(&file.bytes, ImageFormat::Ico).unwrap();
        assert_eq!((icon.width(), icon.height()), (256, 256));
    }
    assert_eq!(out.files[0].name, "wide.ico");
}

#[tokio::test]
async fn convert_flattens_transparency_for_jpeg() {
    let items = vec![SourceItem::from_bytes("clear.png", transparent_png(8, 8))];
    let out = assemble(items, &convert_config(OutputFormat::Jpeg))
        .await
        .unwrap();
    assert_eq!(out.files[0].name, "clear.jpg");
    assert_eq!(out.files[0].mime_type, "image/jpeg");
    let decoded = image::load_from_memory(&out.files[0].bytes).unwrap().to_rgb8();
    let px = decoded.get_pixel(4, 4);
    assert!(px.0.iter().all(|&c| c > 240), "expected white, got {px:?}");
}

#[tokio::test]
async fn convert_csv_to_html_table() {
    let items = vec![SourceItem::from_bytes(
        "people.csv",
        b"name,age\n\"Smith, J\",42\n".to_vec(),
    )];
    let out = assemble(items, &convert_config(OutputFormat::Html))
        .await
        .unwrap();
    let html = String::from_utf8(out.files[0].bytes.clone()).unwrap();
    assert_eq!(out.files[0].name, "people.html");
    assert!(html.contains("<th>name</th>"));
    assert!(html.contains("<td>Smith, J</td>"));
}

#[tokio::test]
async fn convert_text_and_images_to_pdf() {
    let items = vec![
        SourceItem::from_bytes("notes.txt", b"line one\nline two".to_vec()),
        SourceItem::from_bytes("photo.png", png(60, 80)),
        SourceItem::from_bytes("doc.pdf", pdf(&[(200, 200), (300, 300)])),
    ];
    let out = assemble(items, &convert_config(OutputFormat::Pdf))
        .await
        .unwrap();
    let names: Vec<&str> = out.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["notes.pdf", "photo.pdf", "doc.pdf"]);
    assert_eq!(media_boxes(&out.files[1].bytes), vec![(60.0, 80.0)]);
    assert_eq!(media_boxes(&out.files[2].bytes).len(), 2);
    assert!(out.pages.is_empty());
}

// ── Run control ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_before_start_reports_zero_completed() {
    let engine = AssemblyEngine::new(merge_config());
    engine.cancellation_flag().cancel();
    let err = engine
        .assemble(vec![SourceItem::from_bytes("a.png", png(2, 2))])
        .await
        .unwrap_err();
    match err {
        AssemblyError::Cancelled { completed, total } => {
            assert_eq!((completed, total), (0, 1));
        }
        other => panic!("unexpected {other:?}"),
    }
}

/// Cancels the run as soon as the first item is reported.
struct CancelAfterFirst {
    flag: unifile::CancellationFlag,
}

impl AssemblyProgressCallback for CancelAfterFirst {
    fn on_progress(&self, _event: &ProgressEvent) {
        self.flag.cancel();
    }
}

#[tokio::test]
async fn cancellation_is_checked_between_items() {
    let flag = unifile::CancellationFlag::new();
    let config = AssemblyConfig::builder()
        .progress_callback(Arc::new(CancelAfterFirst { flag: flag.clone() }))
        .build()
        .unwrap();
    let engine = AssemblyEngine::new(config).with_cancellation(flag);
    let items = (0..3)
        .map(|i| SourceItem::from_bytes(format!("{i}.png"), png(4, 4)))
        .collect();
    let err = engine.assemble(items).await.unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Cancelled {
            completed: 1,
            total: 3
        }
    ));
}

#[tokio::test]
async fn progress_events_follow_batch_order() {
    let (callback, events) = progress_channel();
    let config = AssemblyConfig::builder()
        .progress_callback(callback)
        .build()
        .unwrap();
    let items = vec![
        SourceItem::from_bytes("a.png", png(4, 4)),
        SourceItem::from_bytes("b.pdf", unparseable_pdf()),
        SourceItem::from_bytes("c.txt", b"c".to_vec()),
        SourceItem::from_bytes("d.wav", vec![0u8; 4]),
    ];
    assemble(items, &config).await.unwrap();
    drop(config);

    let events: Vec<AssemblyEvent> = events.collect().await;
    let progress: Vec<ProgressEvent> = events
        .iter()
        .filter_map(|e| match e {
            AssemblyEvent::Progress(p) => Some(p.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress.iter().map(|p| p.percent_complete).collect::<Vec<_>>(),
        vec![25.0, 50.0, 75.0, 100.0]
    );
    assert_eq!(progress[1].phase_label, "placeholder");
    assert_eq!(events.first(), Some(&AssemblyEvent::BatchStart { total_items: 4 }));
    assert_eq!(
        events.last(),
        Some(&AssemblyEvent::BatchComplete {
            total_items: 4,
            success_count: 3
        })
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, AssemblyEvent::ItemError { item_index: 1, .. })));
}

#[tokio::test]
async fn empty_batch_is_an_error() {
    let err = assemble(Vec::new(), &merge_config()).await.unwrap_err();
    assert!(matches!(err, AssemblyError::EmptyBatch));
}

#[tokio::test]
async fn missing_path_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = assemble_paths(&[dir.path().join("nope.png")], &merge_config())
        .await
        .unwrap_err();
    assert!(matches!(err, AssemblyError::FileNotFound { .. }));
}

#[tokio::test]
async fn paths_are_read_and_named_by_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pic.png");
    std::fs::write(&path, png(5, 5)).unwrap();
    let out = assemble_paths(&[&path], &merge_config()).await.unwrap();
    assert_eq!(out.items[0].name, "pic.png");
}

#[test]
fn sync_wrapper_runs_without_a_runtime() {
    let out = assemble_sync(
        vec![SourceItem::from_bytes("a.png", png(3, 3))],
        &merge_config(),
    )
    .unwrap();
    assert_eq!(out.stats.total_pages, 1);
}

#[test]
fn report_serialises_to_json() {
    let out = tokio_test::block_on(assemble(
        vec![
            SourceItem::from_bytes("a.png", png(3, 3)),
            SourceItem::from_bytes("bad.pdf", unparseable_pdf()),
        ],
        &merge_config(),
    ))
    .unwrap();
    let json = serde_json::to_value(out.report()).unwrap();
    assert_eq!(json["items"][0]["status"], "ok");
    assert_eq!(json["items"][1]["status"], "placeholder");
    assert_eq!(json["files"][0]["name"], "merged_output.pdf");
    assert!(json["items"][0].get("error").is_none());
}
