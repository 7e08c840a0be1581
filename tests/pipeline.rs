//! Integration tests for the conversion pipeline.
//!
//! External tools are stood in for by `/bin/sh` scripts configured through
//! [`ToolSpec`], so these run without ImageMagick or ffmpeg installed. The
//! PDF → image tests need a PDFium library and print `SKIP` without one.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::{Document, Object};
use mediaconv::pipeline::assemble::{images_to_pdf, PageSource};
use mediaconv::pipeline::pdfium;
use mediaconv::{
    convert, CancellationToken, ConversionObserver, ConversionRequest, ConvertError, Endpoint,
    ErrorKind, Format, OutputOptions, Payload, Pipeline, PipelineConfig, RequestContext, Stage,
    ToolSpec, Uuid,
};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 128]));
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(w, h, Rgb([200, 40, 40]));
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// A scratch dir for the pipeline plus a PNG the fake tools copy as output.
struct Fixture {
    scratch: TempDir,
    png: PathBuf,
    assets: TempDir,
}

impl Fixture {
    fn new(w: u32, h: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("decoded.png");
        std::fs::write(&png, png_bytes(w, h)).unwrap();
        Self {
            scratch: tempfile::tempdir().unwrap(),
            png,
            assets: dir,
        }
    }

    /// `magick <in> <out>`: copy the fixture to the last argument.
    fn imagemagick(&self) -> ToolSpec {
        ToolSpec::new("/bin/sh").with_args([
            OsString::from("-c"),
            OsString::from(r#"cp "$0" "$2""#),
            self.png.clone().into_os_string(),
        ])
    }

    /// `ffmpeg ... -i <in> <out>`: copy the fixture to the last argument.
    fn ffmpeg(&self) -> ToolSpec {
        ToolSpec::new("/bin/sh").with_args([
            OsString::from("-c"),
            OsString::from(r#"for a; do last=$a; done; cp "$0" "$last""#),
            self.png.clone().into_os_string(),
        ])
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig::builder()
            .temp_dir(self.scratch.path())
            .imagemagick(self.imagemagick())
            .ffmpeg(self.ffmpeg())
            .build()
            .unwrap()
    }

    fn scratch_is_empty(&self) -> bool {
        dir_is_empty(self.scratch.path())
    }
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

/// `kill -0` succeeds only while the process exists.
fn process_alive(pid: &str) -> bool {
    std::process::Command::new("/bin/sh")
        .args(["-c", &format!("kill -0 {pid} 2>/dev/null")])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn script(body: &str) -> ToolSpec {
    ToolSpec::new("/bin/sh").with_args(["-c", body])
}

fn number(obj: &Object) -> f64 {
    match obj {
        Object::Integer(i) => *i as f64,
        Object::Real(r) => *r as f64,
        other => panic!("not a number: {other:?}"),
    }
}

/// Page sizes in points, in page order.
fn page_sizes(pdf: &[u8]) -> Vec<(f64, f64)> {
    let doc = Document::load_mem(pdf).expect("valid PDF");
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            let media = page.get(b"MediaBox").unwrap().as_array().unwrap();
            (
                number(&media[2]) - number(&media[0]),
                number(&media[3]) - number(&media[1]),
            )
        })
        .collect()
}

fn assert_close(actual: (f64, f64), expected: (f64, f64)) {
    assert!(
        (actual.0 - expected.0).abs() < 1.0 && (actual.1 - expected.1).abs() < 1.0,
        "page size {actual:?} != {expected:?}"
    );
}

#[derive(Default)]
struct Recorder {
    stages: Mutex<Vec<Stage>>,
    tools: Mutex<Vec<String>>,
}

impl ConversionObserver for Recorder {
    fn on_stage(&self, _id: Uuid, stage: Stage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_tool_start(&self, _id: Uuid, tool: &str) {
        self.tools.lock().unwrap().push(tool.to_string());
    }
}

// ── External tools ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_heic_to_png_through_imagemagick() {
    let fx = Fixture::new(12, 9);
    let recorder = Arc::new(Recorder::default());
    let ctx = RequestContext::new().with_observer(recorder.clone());
    let request = ConversionRequest::single(
        Endpoint::HeicToImage,
        Payload::new("IMG_0001.heic", b"not really heic".to_vec()),
    )
    .with_target_str("png");

    let result = Pipeline::new(fx.config()).run(request, &ctx).await.unwrap();

    assert_eq!(result.mime_type(), "image/png");
    assert_eq!(result.filename(), "converted.png");
    let img = image::load_from_memory(result.bytes()).unwrap();
    assert_eq!((img.width(), img.height()), (12, 9));
    assert_eq!(*recorder.tools.lock().unwrap(), vec!["imagemagick"]);
    assert!(fx.scratch_is_empty(), "scratch files left behind");
}

#[tokio::test]
async fn test_avif_to_jpeg_through_ffmpeg() {
    let fx = Fixture::new(20, 10);
    let request = ConversionRequest::single(
        Endpoint::AvifToImage,
        Payload::new("clip.avif", b"avif".to_vec()),
    );

    let result = convert(request, &fx.config()).await.unwrap();

    assert_eq!(result.mime_type(), "image/jpeg");
    assert_eq!(result.filename(), "converted.jpg");
    assert_eq!(
        image::guess_format(result.bytes()).unwrap(),
        ImageFormat::Jpeg
    );
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn test_tool_failure_carries_stderr() {
    let fx = Fixture::new(4, 4);
    let config = PipelineConfig::builder()
        .temp_dir(fx.scratch.path())
        .imagemagick(script("echo corrupt heic >&2; exit 1"))
        .build()
        .unwrap();
    let request = ConversionRequest::single(
        Endpoint::HeicToImage,
        Payload::new("broken.heic", b"xx".to_vec()),
    );

    let err = convert(request, &config).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
    assert_eq!(err.http_status(), 500);
    assert!(err.to_string().contains("corrupt heic"), "got: {err}");
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn test_tool_that_writes_nothing_fails() {
    let fx = Fixture::new(4, 4);
    let config = PipelineConfig::builder()
        .temp_dir(fx.scratch.path())
        .ffmpeg(script("exit 0"))
        .build()
        .unwrap();
    let request = ConversionRequest::single(
        Endpoint::AvifToImage,
        Payload::new("empty.avif", b"xx".to_vec()),
    );

    let err = convert(request, &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn test_hung_tool_is_killed_at_timeout() {
    let fx = Fixture::new(4, 4);
    let pid_file = fx.assets.path().join("tool.pid");
    let config = PipelineConfig::builder()
        .temp_dir(fx.scratch.path())
        .imagemagick(ToolSpec::new("/bin/sh").with_args([
            OsString::from("-c"),
            OsString::from(r#"echo $$ > "$0"; exec sleep 30"#),
            pid_file.clone().into_os_string(),
        ]))
        .tool_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let request = ConversionRequest::single(
        Endpoint::HeicToImage,
        Payload::new("slow.heic", b"xx".to_vec()),
    );

    let started = std::time::Instant::now();
    let err = convert(request, &config).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(fx.scratch_is_empty());

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(!process_alive(pid.trim()), "tool process {} still running", pid.trim());
}

#[tokio::test]
async fn test_tool_exit_with_orphan_holding_stderr_times_out() {
    let fx = Fixture::new(4, 4);
    let config = PipelineConfig::builder()
        .temp_dir(fx.scratch.path())
        .imagemagick(script("sleep 30 & exit 1"))
        .tool_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let request = ConversionRequest::single(
        Endpoint::HeicToImage,
        Payload::new("slow.heic", b"xx".to_vec()),
    );

    let started = std::time::Instant::now();
    let err = convert(request, &config).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "waited {:?} with a 500ms timeout",
        started.elapsed()
    );
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn test_cancel_mid_tool_run() {
    let fx = Fixture::new(4, 4);
    let config = PipelineConfig::builder()
        .temp_dir(fx.scratch.path())
        .imagemagick(script("exec sleep 30"))
        .build()
        .unwrap();
    let token = CancellationToken::new();
    let ctx = RequestContext::new().with_cancel_token(token.clone());
    let request = ConversionRequest::single(
        Endpoint::HeicToImage,
        Payload::new("slow.heic", b"xx".to_vec()),
    );

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });
    let err = Pipeline::new(config).run(request, &ctx).await.unwrap_err();
    canceller.await.unwrap();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.http_status(), 499);
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn test_missing_tool_is_reported() {
    let fx = Fixture::new(4, 4);
    let config = PipelineConfig::builder()
        .temp_dir(fx.scratch.path())
        .ffmpeg(ToolSpec::new("/nonexistent/bin/ffmpeg"))
        .build()
        .unwrap();
    let request = ConversionRequest::single(
        Endpoint::AvifToImage,
        Payload::new("a.avif", b"xx".to_vec()),
    );

    let err = convert(request, &config).await.unwrap_err();
    assert!(matches!(err, ConvertError::MissingDependency { .. }), "{err:?}");
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn test_concurrent_conversions_do_not_collide() {
    let fx = Fixture::new(8, 8);
    let pipeline = Pipeline::new(fx.config());

    let jobs = (0..50).map(|i| {
        let pipeline = pipeline.clone();
        async move {
            // Every request uses the same client filename.
            let request = ConversionRequest::single(
                Endpoint::HeicToImage,
                Payload::new("photo.heic", vec![i as u8; 16]),
            )
            .with_target_str("webp");
            pipeline.run(request, &RequestContext::new()).await
        }
    });
    let results = futures::future::join_all(jobs).await;

    for r in &results {
        let r = r.as_ref().expect("conversion failed");
        assert_eq!(r.mime_type(), "image/webp");
    }
    assert!(fx.scratch_is_empty());
}

// ── Images → PDF ─────────────────────────────────────────────────────────────

#[test]
fn test_images_to_pdf_pages_in_order() {
    let sources = vec![
        PageSource {
            payload: Payload::new("a.png", png_bytes(100, 50)),
            format: Format::Png,
        },
        PageSource {
            payload: Payload::new("b.jpg", jpeg_bytes(40, 80)),
            format: Format::Jpeg,
        },
        PageSource {
            payload: Payload::new("c.png", png_bytes(60, 60)),
            format: Format::Png,
        },
    ];

    let pdf = images_to_pdf(&sources, [255, 255, 255]).unwrap();

    assert!(pdf.starts_with(b"%PDF-"));
    let sizes = page_sizes(&pdf);
    assert_eq!(sizes.len(), 3);
    assert_close(sizes[0], (100.0, 50.0));
    assert_close(sizes[1], (40.0, 80.0));
    assert_close(sizes[2], (60.0, 60.0));
}

#[test]
fn test_transparent_page_is_accepted() {
    let img = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
    let sources = vec![PageSource {
        payload: Payload::new("t.png", encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)),
        format: Format::Png,
    }];
    let pdf = images_to_pdf(&sources, [255, 255, 255]).unwrap();
    assert_eq!(page_sizes(&pdf).len(), 1);
}

#[test]
fn test_one_bad_page_fails_the_document() {
    let sources = vec![
        PageSource {
            payload: Payload::new("ok.png", png_bytes(10, 10)),
            format: Format::Png,
        },
        PageSource {
            payload: Payload::new("bad.jpg", b"garbage".to_vec()),
            format: Format::Jpeg,
        },
    ];
    let err = images_to_pdf(&sources, [255, 255, 255]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecodeFailure);
}

#[tokio::test]
async fn test_mixed_batch_with_heic_page() {
    let fx = Fixture::new(30, 20);
    let request = ConversionRequest::new(
        Endpoint::ImageToPdf,
        vec![
            Payload::new("one.png", png_bytes(10, 10)),
            Payload::new("two.heic", b"heic".to_vec()),
            Payload::new("three.jpg", jpeg_bytes(16, 32)),
        ],
    )
    // The endpoint fixes its target.
    .with_target_str("png");

    let result = convert(request, &fx.config()).await.unwrap();

    assert_eq!(result.mime_type(), "application/pdf");
    assert_eq!(result.filename(), "converted.pdf");
    let sizes = page_sizes(result.bytes());
    assert_eq!(sizes.len(), 3);
    assert_close(sizes[1], (30.0, 20.0));
    assert!(fx.scratch_is_empty());
}

// ── PDF → image ──────────────────────────────────────────────────────────────

/// Skip unless a PDFium library can be bound.
macro_rules! pdfium_skip_unless_ready {
    ($config:expr) => {{
        if !pdfium::probe($config).available {
            println!("SKIP — PDFium library not found (set PDFIUM_LIB_PATH)");
            return;
        }
    }};
}

#[tokio::test]
async fn test_pdf_first_page_to_png() {
    let fx = Fixture::new(4, 4);
    let config = PipelineConfig::builder()
        .temp_dir(fx.scratch.path())
        .render_dpi(72)
        .build()
        .unwrap();
    pdfium_skip_unless_ready!(&config);

    let pdf = images_to_pdf(
        &[
            PageSource {
                payload: Payload::new("p1.png", png_bytes(100, 50)),
                format: Format::Png,
            },
            PageSource {
                payload: Payload::new("p2.png", png_bytes(30, 90)),
                format: Format::Png,
            },
        ],
        [255, 255, 255],
    )
    .unwrap();

    let request = ConversionRequest::single(Endpoint::PdfToImage, Payload::new("doc.pdf", pdf.clone()))
        .with_target_str("png");
    let result = convert(request, &config).await.unwrap();
    let img = image::load_from_memory(result.bytes()).unwrap();
    assert_eq!(result.mime_type(), "image/png");
    assert!(img.width() > img.height(), "first page is landscape");

    let request = ConversionRequest::single(Endpoint::PdfToImage, Payload::new("doc.pdf", pdf))
        .with_target_str("png")
        .with_options(OutputOptions {
            page: Some(2),
            ..Default::default()
        });
    let result = convert(request, &config).await.unwrap();
    let img = image::load_from_memory(result.bytes()).unwrap();
    assert!(img.height() > img.width(), "second page is portrait");
}

#[tokio::test]
async fn test_pdf_webp_target_falls_back_to_jpeg() {
    let fx = Fixture::new(4, 4);
    let config = PipelineConfig::builder()
        .temp_dir(fx.scratch.path())
        .build()
        .unwrap();
    pdfium_skip_unless_ready!(&config);

    let pdf = images_to_pdf(
        &[PageSource {
            payload: Payload::new("p.png", png_bytes(20, 20)),
            format: Format::Png,
        }],
        [255, 255, 255],
    )
    .unwrap();
    let request = ConversionRequest::single(Endpoint::PdfToImage, Payload::new("doc.pdf", pdf))
        .with_target_str("webp");
    let result = convert(request, &config).await.unwrap();
    assert_eq!(result.mime_type(), "image/jpeg");
    assert_eq!(result.filename(), "converted.jpg");
}

#[tokio::test]
async fn test_corrupt_pdf_is_a_decode_failure() {
    let fx = Fixture::new(4, 4);
    let config = PipelineConfig::builder()
        .temp_dir(fx.scratch.path())
        .build()
        .unwrap();
    pdfium_skip_unless_ready!(&config);

    let request = ConversionRequest::single(
        Endpoint::PdfToImage,
        Payload::new("doc.pdf", b"%PDF-1.4 truncated".to_vec()),
    );
    let err = convert(request, &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecodeFailure);
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_text_file_is_rejected_before_any_work() {
    let fx = Fixture::new(4, 4);
    let recorder = Arc::new(Recorder::default());
    let ctx = RequestContext::new().with_observer(recorder.clone());
    let request = ConversionRequest::single(
        Endpoint::Image,
        Payload::new("notes.txt", b"hello".to_vec()),
    );

    let err = Pipeline::new(fx.config()).run(request, &ctx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    assert_eq!(err.http_status(), 400);
    assert!(recorder.tools.lock().unwrap().is_empty());
    assert_eq!(
        *recorder.stages.lock().unwrap(),
        vec![Stage::Received, Stage::Failed]
    );
}

#[tokio::test]
async fn test_pdf_on_image_endpoint_is_rejected() {
    let fx = Fixture::new(4, 4);
    let request = ConversionRequest::single(
        Endpoint::WebpToImage,
        Payload::new("doc.pdf", b"%PDF-1.4".to_vec()),
    );
    let err = convert(request, &fx.config()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFormat);
}
