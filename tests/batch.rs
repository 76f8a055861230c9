//! Batch-level integration tests for url2pdf.
//!
//! A local `httpmock` server stands in for the web, and stub [`Renderer`]s
//! stand in for wkhtmltopdf: they record the HTML they were handed and write
//! a placeholder PDF, so no external binary or network access is needed.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use httpmock::prelude::*;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url2pdf::pipeline::assemble::MATHJAX_URL;
use url2pdf::{
    build_jobs, run_batch, BatchProgressCallback, ConversionJob, ConversionOutcome, RenderConfig,
    RenderError, RenderOptions, RenderStatus, Renderer,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn encoded(format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([200, 40, 40, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

/// Lossless WebP of pixel noise, so the encoded size tracks `side * side * 4`.
fn noisy_webp(side: u32) -> Vec<u8> {
    let mut state: u32 = 0x1234_5678;
    let img = RgbaImage::from_fn(side, side, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let [a, b, c, _] = state.to_le_bytes();
        Rgba([a, b, c, 255])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)
        .unwrap();
    buf
}

/// Writes a placeholder PDF and remembers the HTML it was given, keyed by
/// output path. Fails for outputs whose file name contains `fail_marker`.
#[derive(Default)]
struct CapturingRenderer {
    pages: Mutex<HashMap<PathBuf, Vec<u8>>>,
    fail_marker: Option<String>,
    delay: Option<Duration>,
}

impl CapturingRenderer {
    fn bytes_for(&self, output: &Path) -> Vec<u8> {
        self.pages
            .lock()
            .unwrap()
            .get(output)
            .cloned()
            .unwrap_or_else(|| panic!("renderer never saw {}", output.display()))
    }

    fn html_for(&self, output: &Path) -> String {
        String::from_utf8(self.bytes_for(output)).expect("page should be UTF-8")
    }
}

#[async_trait]
impl Renderer for CapturingRenderer {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &RenderOptions,
    ) -> Result<RenderStatus, RenderError> {
        assert_eq!(options.javascript_delay_ms, 250);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let html = std::fs::read(input).unwrap();
        self.pages.lock().unwrap().insert(output.to_path_buf(), html);

        let name = output.file_name().unwrap().to_string_lossy().into_owned();
        if let Some(ref marker) = self.fail_marker {
            if name.contains(marker.as_str()) {
                return Ok(RenderStatus {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "Exit with code 1 due to network error: ContentNotFoundError".into(),
                });
            }
        }
        std::fs::write(output, b"%PDF-1.4 stub").unwrap();
        Ok(RenderStatus::success())
    }
}

fn config_with(renderer: Arc<dyn Renderer>) -> url2pdf::RenderConfigBuilder {
    RenderConfig::builder()
        .renderer(renderer)
        .javascript_delay_ms(250)
        .timeout_secs(5)
}

/// Tracks how many jobs sit between `on_job_start` and their completion event.
#[derive(Default)]
struct ConcurrencyProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
    errors: AtomicUsize,
}

impl BatchProgressCallback for ConcurrencyProbe {
    fn on_job_start(&self, _job: &ConversionJob) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn on_job_complete(&self, _outcome: &ConversionOutcome) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn on_job_error(&self, _outcome: &ConversionOutcome) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Image transcoding through the whole pipeline ─────────────────────────────

#[tokio::test]
async fn webp_images_are_inlined_and_others_left_alone() {
    init_tracing();
    let server = MockServer::start_async().await;

    let page = r#"<!DOCTYPE html><html><head><title>Post</title></head><body>
        <img src="/img/photo.jpg">
        <img src="/img/logo.webp">
        <img src="/img/huge.webp">
        <img alt="no source">
        <img src="data:image/gif;base64,R0lGODlhAQABAAAAACw=">
        <p>$$e^{i\pi} + 1 = 0$$</p>
    </body></html>"#;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/post");
            then.status(200)
                .header("content-type", "text/html")
                .body(page);
        })
        .await;
    // WebP mislabelled as JPEG: must be converted.
    let photo = server
        .mock_async(|when, then| {
            when.method(GET).path("/img/photo.jpg").header_exists("referer");
            then.status(200)
                .header("content-type", "image/jpeg")
                .body(encoded(ImageFormat::WebP));
        })
        .await;
    // PNG mislabelled as WebP: must not be converted.
    server
        .mock_async(|when, then| {
            when.method(GET).path("/img/logo.webp");
            then.status(200)
                .header("content-type", "image/webp")
                .body(encoded(ImageFormat::Png));
        })
        .await;
    // A real WebP over the byte cap: skipped, job still succeeds.
    let huge_body = noisy_webp(128);
    assert!(huge_body.len() > 16 * 1024, "fixture must exceed the cap");
    assert_eq!(image::guess_format(&huge_body).unwrap(), ImageFormat::WebP);
    let huge = server
        .mock_async(|when, then| {
            when.method(GET).path("/img/huge.webp");
            then.status(200)
                .header("content-type", "image/webp")
                .body(huge_body);
        })
        .await;

    let out_dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(CapturingRenderer::default());
    let config = config_with(renderer.clone())
        .max_image_bytes(16 * 1024)
        .build()
        .unwrap();

    let jobs = build_jobs(&[server.url("/post")], out_dir.path());
    let output_path = jobs[0].output_path.clone();
    let summary = run_batch(jobs, &config).await.unwrap();

    assert_eq!(summary.success_count, 1, "failures: {:?}", summary.failures);
    photo.assert_async().await;
    huge.assert_async().await;
    assert!(output_path.exists());

    let html = renderer.html_for(&output_path);
    let converted = html
        .split(r#"src="data:image/jpeg;base64,"#)
        .nth(1)
        .expect("WebP photo should be inlined as JPEG");
    let payload: String = converted.chars().take_while(|c| *c != '"').collect();
    let jpeg = STANDARD.decode(payload).unwrap();
    assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);

    assert!(!html.contains(r#"src="/img/photo.jpg""#));
    assert!(html.contains(r#"src="/img/logo.webp""#), "PNG must stay untouched");
    assert!(html.contains(r#"src="/img/huge.webp""#), "oversized image must stay untouched");
    assert_eq!(html.matches("data:image/jpeg;base64,").count(), 1, "only the photo is inlined");
    assert!(html.contains(r#"<img alt="no source">"#));
    assert!(html.contains("data:image/gif;base64,R0lGODlhAQABAAAAACw="));

    let base = format!(r#"<head><base href="{}">"#, server.url("/post"));
    assert!(html.contains(&base), "base must open <head>: {html}");
    let script = html.find(MATHJAX_URL).expect("MathJax script injected");
    assert!(html.find("<base ").unwrap() < script);
    assert!(script < html.find("</head>").unwrap());
}

#[tokio::test]
async fn disabled_conversion_downloads_no_images() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/post");
            then.status(200)
                .body(r#"<html><head></head><body><img src="/a.webp"></body></html>"#);
        })
        .await;
    let image = server
        .mock_async(|when, then| {
            when.method(GET).path("/a.webp");
            then.status(200).body(encoded(ImageFormat::WebP));
        })
        .await;

    let out_dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(CapturingRenderer::default());
    let config = config_with(renderer.clone())
        .convert_source_image_format(false)
        .build()
        .unwrap();

    let jobs = build_jobs(&[server.url("/post")], out_dir.path());
    let output_path = jobs[0].output_path.clone();
    let summary = run_batch(jobs, &config).await.unwrap();

    assert_eq!(summary.success_count, 1);
    image.assert_calls_async(0).await;
    let html = renderer.html_for(&output_path);
    assert!(html.contains(r#"<img src="/a.webp">"#));
    assert!(html.contains("<base "));
}

#[tokio::test]
async fn latin1_page_keeps_its_bytes_and_escaped_image_urls_resolve() {
    let server = MockServer::start_async().await;
    let mut page = b"<html><head><title>Caf\xe9</title></head><body><p>na\xefve</p>".to_vec();
    page.extend_from_slice(br#"<img src="/img/resized.webp?w=640&amp;h=480"></body></html>"#);

    server
        .mock_async(|when, then| {
            when.method(GET).path("/menu");
            then.status(200)
                .header("content-type", "text/html; charset=ISO-8859-1")
                .body(page);
        })
        .await;
    let image = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/img/resized.webp")
                .query_param("w", "640")
                .query_param("h", "480");
            then.status(200).body(encoded(ImageFormat::WebP));
        })
        .await;

    let out_dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(CapturingRenderer::default());
    let config = config_with(renderer.clone()).build().unwrap();

    let jobs = build_jobs(&[server.url("/menu")], out_dir.path());
    let output_path = jobs[0].output_path.clone();
    let summary = run_batch(jobs, &config).await.unwrap();

    assert_eq!(summary.success_count, 1, "failures: {:?}", summary.failures);
    image.assert_calls_async(1).await;

    let bytes = renderer.bytes_for(&output_path);
    let contains = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);
    assert!(contains(b"<title>Caf\xe9</title>"), "title bytes changed");
    assert!(contains(b"<p>na\xefve</p>"), "body bytes changed");
    assert!(contains(br#"<img src="data:image/jpeg;base64,"#), "image not inlined");
    assert!(!contains("\u{fffd}".as_bytes()));
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn every_job_yields_exactly_one_outcome() {
    init_tracing();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ok");
            then.status(200).body("<html><head></head><body>ok</body></html>");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/render-fails");
            then.status(200).body("<html><head></head><body>x</body></html>");
        })
        .await;
    let missing = server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        })
        .await;

    let urls = vec![
        server.url("/ok"),
        server.url("/missing"),
        "definitely not a url".to_string(),
        server.url("/render-fails"),
        server.url("/ok"),
    ];

    let out_dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(CapturingRenderer {
        fail_marker: Some("render-fails".into()),
        ..Default::default()
    });
    let probe = Arc::new(ConcurrencyProbe::default());
    let config = config_with(renderer)
        .retry_attempts(1)
        .max_workers(2)
        .progress_callback(probe.clone())
        .build()
        .unwrap();

    let jobs = build_jobs(&urls, out_dir.path());
    let summary = run_batch(jobs, &config).await.unwrap();

    assert_eq!(summary.outcomes.len(), urls.len());
    assert_eq!(summary.success_count + summary.failure_count, urls.len());
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 3);
    assert_eq!(probe.started.load(Ordering::SeqCst), urls.len());
    assert_eq!(probe.errors.load(Ordering::SeqCst), 3);

    // retry_attempts = 1 → two requests for the 404 page
    missing.assert_calls_async(2).await;

    let failed: Vec<&str> = summary.failures.iter().map(|f| f.url.as_str()).collect();
    assert_eq!(
        failed,
        vec![
            server.url("/missing").as_str(),
            "definitely not a url",
            server.url("/render-fails").as_str(),
        ],
        "failures are listed in input order"
    );
    assert!(summary.failures[0].error.contains("404"));
    assert!(summary.failures[0].error.contains(&server.url("/missing")));
    assert!(summary.failures[2].error.contains("ContentNotFoundError"));

    let indices: Vec<usize> = summary
        .outcomes_in_input_order()
        .iter()
        .map(|o| o.sequence_index)
        .collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn panicking_renderer_fails_only_its_job() {
    struct PanicsOnSecond;

    #[async_trait]
    impl Renderer for PanicsOnSecond {
        async fn run(
            &self,
            _input: &Path,
            output: &Path,
            _options: &RenderOptions,
        ) -> Result<RenderStatus, RenderError> {
            if output.ends_with("2.pdf") {
                panic!("renderer crashed");
            }
            Ok(RenderStatus::success())
        }
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/page");
            then.status(200).body("<html><head></head></html>");
        })
        .await;

    let out_dir = tempfile::tempdir().unwrap();
    let jobs: Vec<ConversionJob> = (1..=3)
        .map(|i| ConversionJob {
            url: server.url("/page"),
            sequence_index: i,
            output_path: out_dir.path().join(format!("{i}.pdf")),
        })
        .collect();

    let config = RenderConfig::builder()
        .renderer(Arc::new(PanicsOnSecond))
        .build()
        .unwrap();
    let summary = run_batch(jobs, &config).await.unwrap();

    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    let failed = summary.outcomes.iter().find(|o| !o.succeeded).unwrap();
    assert_eq!(failed.sequence_index, 2);
    assert!(failed.error.as_deref().unwrap().contains("worker task failed"));
}

// ── Worker pool bound ────────────────────────────────────────────────────────

#[tokio::test]
async fn active_jobs_never_exceed_max_workers() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).body("<html><head></head><body>slow</body></html>");
        })
        .await;

    let out_dir = tempfile::tempdir().unwrap();
    let jobs: Vec<ConversionJob> = (1..=12)
        .map(|i| ConversionJob {
            url: server.url("/slow"),
            sequence_index: i,
            output_path: out_dir.path().join(format!("slow_{i}.pdf")),
        })
        .collect();

    let renderer = Arc::new(CapturingRenderer {
        delay: Some(Duration::from_millis(40)),
        ..Default::default()
    });
    let probe = Arc::new(ConcurrencyProbe::default());
    let config = config_with(renderer)
        .max_workers(3)
        .progress_callback(probe.clone())
        .build()
        .unwrap();

    let summary = run_batch(jobs, &config).await.unwrap();

    assert_eq!(summary.success_count, 12);
    let peak = probe.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded max_workers");
    assert!(peak >= 1);
    assert_eq!(probe.active.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_job_list_yields_empty_summary() {
    let config = RenderConfig::builder()
        .renderer(Arc::new(CapturingRenderer::default()))
        .build()
        .unwrap();
    let summary = run_batch(Vec::new(), &config).await.unwrap();
    assert_eq!(summary.total(), 0);
    assert!(summary.failures.is_empty());
}
