//! Pipeline integration tests against a scripted in-process model.
//!
//! Image inputs need nothing but the `image` crate. Multi-page tests build a
//! tiny PDF in memory and are skipped when libpdfium cannot be bound:
//!   PDFIUM_LIB_PATH=/path/to/lib cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use pdf2markdown::pipeline::render;
use pdf2markdown::{
    convert_bytes, convert_to_file, convert_with_model, CallOptions, ConversionConfig,
    ConversionConfigBuilder, ConversionProgressCallback, ConvertError, EncodedImage,
    PageSelection, PageSeparator, Prompt, ProviderError, Transcription, VisionModel,
};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

type Script = dyn Fn(usize, usize) -> Result<String, ProviderError> + Send + Sync;

/// Answers each call from a script keyed by (page number, call index).
struct ScriptedModel {
    calls: AtomicUsize,
    script: Box<Script>,
    delay_ms: fn(usize) -> u64,
}

impl ScriptedModel {
    fn new(
        script: impl Fn(usize, usize) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Box::new(script),
            delay_ms: |_| 0,
        })
    }

    fn with_delay(
        delay_ms: fn(usize) -> u64,
        script: impl Fn(usize, usize) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Box::new(script),
            delay_ms,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Page number from "This image is page N of M."
fn page_from_prompt(prompt: &Prompt) -> usize {
    prompt
        .user
        .split_whitespace()
        .skip_while(|w| *w != "page")
        .nth(1)
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl VisionModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-vision"
    }

    async fn transcribe(
        &self,
        image: &EncodedImage,
        prompt: &Prompt,
        _options: &CallOptions,
    ) -> Result<Transcription, ProviderError> {
        assert_eq!(image.mime_type, "image/png");
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let page = page_from_prompt(prompt);
        let delay = (self.delay_ms)(page);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        (self.script)(page, call).map(|text| Transcription {
            text,
            input_tokens: 100,
            output_tokens: 10,
            truncated: false,
        })
    }
}

#[derive(Default)]
struct CountingCallback {
    started: AtomicUsize,
    pages_started: AtomicUsize,
    pages_completed: AtomicUsize,
    retries: AtomicU32,
    errors: AtomicUsize,
    finished: AtomicUsize,
}

impl ConversionProgressCallback for CountingCallback {
    fn on_conversion_start(&self, _total_pages: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
        self.pages_started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_retry(&self, _page_num: usize, _attempt: u32, _error: &str) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _markdown_len: usize) {
        self.pages_completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_conversion_complete(&self, _total_pages: usize) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 48, Rgba([255, 255, 255, 255])));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// A valid PDF with `pages` blank 200x200pt pages and a correct xref table.
fn blank_pdf(pages: usize) -> Vec<u8> {
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", i + 3)).collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages),
    ];
    for _ in 0..pages {
        objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] >>".to_string());
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for off in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}

/// Skip this test if libpdfium is not available.
macro_rules! skip_without_pdfium {
    () => {
        if let Err(e) = tokio::task::spawn_blocking(|| render::bind_pdfium().map(drop)).await.unwrap() {
            println!("SKIP — pdfium not available: {e}");
            return;
        }
    };
}

fn fast_config() -> ConversionConfigBuilder {
    ConversionConfig::builder().retry_backoff_ms(1).max_retries(2)
}

const WELL_FORMED: &str = "# Quarterly Report\n\n\
Revenue grew by **12%** over the period.\n\n\
## Highlights\n\n\
- New region opened\n\
- Costs held flat\n\n\
$$E = mc^2$$";

// ── Image input ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn well_formed_markdown_passes_through_unchanged() {
    let model = ScriptedModel::new(|_, _| Ok(WELL_FORMED.to_string()));
    let config = fast_config().build().unwrap();

    let output = convert_with_model(png_bytes(), model.clone(), &config)
        .await
        .unwrap();

    assert_eq!(output.markdown, WELL_FORMED);
    assert_eq!(model.calls(), 1);
    assert_eq!(output.pages.len(), 1);
    assert_eq!(output.stats.total_pages, 1);
    assert_eq!(output.stats.processed_pages, 1);
    assert_eq!(output.stats.total_input_tokens, 100);
    assert_eq!(output.stats.total_output_tokens, 10);
}

#[tokio::test]
async fn fenced_reply_is_unwrapped() {
    let model = ScriptedModel::new(|_, _| Ok("```markdown\n# Heading\n\nBody\n```".to_string()));
    let config = fast_config().build().unwrap();

    let output = convert_with_model(png_bytes(), model, &config).await.unwrap();
    assert_eq!(output.markdown, "# Heading\n\nBody");
}

#[tokio::test]
async fn hard_breaks_and_code_blocks_survive_cleanup() {
    let reply = "First line  \nsecond line\n\n```text\n| a |\n| b |\n\n\n\nend\n```";
    let model = ScriptedModel::new(move |_, _| Ok(reply.to_string()));
    let config = fast_config().build().unwrap();

    let output = convert_with_model(png_bytes(), model, &config).await.unwrap();
    assert_eq!(output.markdown, reply);
}

#[tokio::test]
async fn raw_mode_skips_cleanup() {
    let reply = "```markdown\n# Heading\n```";
    let model = ScriptedModel::new(move |_, _| Ok(reply.to_string()));
    let config = fast_config().postprocess(false).build().unwrap();

    let output = convert_with_model(png_bytes(), model, &config).await.unwrap();
    assert_eq!(output.markdown, reply);
}

#[tokio::test]
async fn unsupported_input_never_reaches_the_model() {
    let model = ScriptedModel::new(|_, _| Ok("unused".to_string()));
    let config = fast_config().build().unwrap();

    let err = convert_with_model(b"PK\x03\x04zip bytes".to_vec(), model.clone(), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, ConvertError::UnsupportedFormat { .. }));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn empty_input_is_rejected() {
    let model = ScriptedModel::new(|_, _| Ok("unused".to_string()));
    let config = fast_config().build().unwrap();

    let err = convert_with_model(Vec::new(), model.clone(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::EmptyInput));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn range_beyond_page_count_makes_no_calls() {
    let model = ScriptedModel::new(|_, _| Ok("unused".to_string()));
    let config = fast_config()
        .pages(PageSelection::Range(1, 2))
        .build()
        .unwrap();

    let err = convert_with_model(png_bytes(), model.clone(), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, ConvertError::InvalidRange { page_count: Some(1), .. }));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn auth_failure_halts_without_retry() {
    let model = ScriptedModel::new(|_, _| {
        Err(ProviderError::Auth {
            provider: "scripted".into(),
            status: 401,
            message: "bad key".into(),
        })
    });
    let cb = Arc::new(CountingCallback::default());
    let config = fast_config()
        .progress_callback(cb.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();

    let err = convert_with_model(png_bytes(), model.clone(), &config)
        .await
        .unwrap_err();

    match err {
        ConvertError::Provider { page, source } => {
            assert_eq!(page, 1);
            assert!(matches!(source, ProviderError::Auth { status: 401, .. }));
        }
        other => panic!("expected a provider error, got {other:?}"),
    }
    assert_eq!(model.calls(), 1);
    assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
    assert_eq!(cb.finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let model = ScriptedModel::new(|_, call| {
        if call < 2 {
            Err(ProviderError::Status {
                provider: "scripted".into(),
                status: 503,
                message: "overloaded".into(),
            })
        } else {
            Ok("# Recovered".to_string())
        }
    });
    let cb = Arc::new(CountingCallback::default());
    let config = fast_config()
        .progress_callback(cb.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();

    let output = convert_with_model(png_bytes(), model.clone(), &config)
        .await
        .unwrap();

    assert_eq!(output.markdown, "# Recovered");
    assert_eq!(output.stats.total_retries, 2);
    assert_eq!(output.pages[0].retries, 2);
    assert_eq!(model.calls(), 3);
    assert_eq!(cb.retries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retries_run_out() {
    let model = ScriptedModel::new(|_, _| {
        Err(ProviderError::Transport {
            provider: "scripted".into(),
            detail: "connection reset".into(),
        })
    });
    let config = fast_config().max_retries(1).build().unwrap();

    let err = convert_with_model(png_bytes(), model.clone(), &config)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConvertError::Provider {
            source: ProviderError::Transport { .. },
            ..
        }
    ));
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn empty_reply_fails_the_page() {
    let model = ScriptedModel::new(|_, _| {
        Err(ProviderError::EmptyResponse {
            provider: "scripted".into(),
        })
    });
    let config = fast_config().max_retries(1).build().unwrap();

    let err = convert_with_model(png_bytes(), model.clone(), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, ConvertError::EmptyPage { page: 1, attempts: 2 }));
}

#[tokio::test]
async fn empty_reply_allowed_yields_empty_page() {
    let model = ScriptedModel::new(|_, _| {
        Err(ProviderError::EmptyResponse {
            provider: "scripted".into(),
        })
    });
    let config = fast_config()
        .max_retries(0)
        .allow_empty_pages(true)
        .build()
        .unwrap();

    let output = convert_with_model(png_bytes(), model, &config).await.unwrap();
    assert_eq!(output.markdown, "");
    assert_eq!(output.stats.empty_pages, 1);
}

#[tokio::test]
async fn progress_events_for_single_image() {
    let model = ScriptedModel::new(|_, _| Ok("text".to_string()));
    let cb = Arc::new(CountingCallback::default());
    let config = fast_config()
        .progress_callback(cb.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();

    convert_with_model(png_bytes(), model, &config).await.unwrap();

    assert_eq!(cb.started.load(Ordering::SeqCst), 1);
    assert_eq!(cb.pages_started.load(Ordering::SeqCst), 1);
    assert_eq!(cb.pages_completed.load(Ordering::SeqCst), 1);
    assert_eq!(cb.errors.load(Ordering::SeqCst), 0);
    assert_eq!(cb.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn front_matter_for_image_input() {
    let model = ScriptedModel::new(|_, _| Ok("body".to_string()));
    let config = fast_config().include_metadata(true).build().unwrap();

    let output = convert_with_model(png_bytes(), model, &config).await.unwrap();
    assert_eq!(output.markdown, "---\nformat: PNG\npages: 1\n---\n\nbody");
}

#[tokio::test]
async fn configured_model_wins_over_provider() {
    // The default provider has no key, so building it would fail.
    let model = ScriptedModel::new(|_, _| Ok("from stub".to_string()));
    let config = fast_config()
        .vision_model(model.clone() as Arc<dyn VisionModel>)
        .build()
        .unwrap();

    let output = convert_bytes(png_bytes(), &config).await.unwrap();
    assert_eq!(output.markdown, "from stub");
}

#[tokio::test]
async fn missing_key_is_reported_before_any_call() {
    let config = ConversionConfig::builder()
        .provider(pdf2markdown::ProviderConfig::default())
        .build()
        .unwrap();

    let err = convert_bytes(png_bytes(), &config).await.unwrap_err();
    assert!(matches!(err, ConvertError::ProviderNotConfigured { .. }));
}

#[tokio::test]
async fn convert_to_file_writes_markdown() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");
    let output = dir.path().join("out/scan.md");
    std::fs::write(&input, png_bytes()).unwrap();

    let model = ScriptedModel::new(|_, _| Ok("# Scan".to_string()));
    let config = fast_config()
        .vision_model(model as Arc<dyn VisionModel>)
        .build()
        .unwrap();

    let stats = convert_to_file(&input, &output, &config).await.unwrap();
    assert_eq!(stats.processed_pages, 1);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "# Scan");
}

#[tokio::test]
async fn failed_conversion_leaves_no_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");
    let output = dir.path().join("scan.md");
    std::fs::write(&input, png_bytes()).unwrap();

    let model = ScriptedModel::new(|_, _| {
        Err(ProviderError::Auth {
            provider: "scripted".into(),
            status: 403,
            message: "forbidden".into(),
        })
    });
    let config = fast_config()
        .vision_model(model as Arc<dyn VisionModel>)
        .build()
        .unwrap();

    assert!(convert_to_file(&input, &output, &config).await.is_err());
    assert!(!output.exists());
}

// ── PDF input (needs libpdfium) ─────────────────────────────────────────────

#[tokio::test]
async fn pdf_pages_keep_document_order_under_concurrency() {
    skip_without_pdfium!();

    // Later pages answer first.
    let model = ScriptedModel::with_delay(
        |page| (5 - page as u64) * 30,
        |page, _| Ok(format!("# Page {page}")),
    );
    let config = fast_config()
        .concurrency(4)
        .page_separator(PageSeparator::HorizontalRule)
        .build()
        .unwrap();

    let output = convert_with_model(blank_pdf(4), model.clone(), &config)
        .await
        .unwrap();

    assert_eq!(
        output.markdown,
        "# Page 1\n\n---\n\n# Page 2\n\n---\n\n# Page 3\n\n---\n\n# Page 4"
    );
    let order: Vec<usize> = output.pages.iter().map(|p| p.page_num).collect();
    assert_eq!(order, vec![1, 2, 3, 4]);
    assert_eq!(model.calls(), 4);
}

#[tokio::test]
async fn pdf_range_selects_pages() {
    skip_without_pdfium!();

    let model = ScriptedModel::new(|page, _| Ok(format!("p{page}")));
    let config = fast_config()
        .pages(PageSelection::Range(2, 3))
        .page_separator(PageSeparator::Comment)
        .build()
        .unwrap();

    let output = convert_with_model(blank_pdf(4), model.clone(), &config)
        .await
        .unwrap();

    assert_eq!(output.markdown, "p2\n\n<!-- page 3 -->\n\np3");
    assert_eq!(output.stats.total_pages, 4);
    assert_eq!(output.stats.processed_pages, 2);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn pdf_failure_on_one_page_fails_the_run() {
    skip_without_pdfium!();

    let model = ScriptedModel::new(|page, _| {
        if page == 2 {
            Err(ProviderError::Status {
                provider: "scripted".into(),
                status: 400,
                message: "image too large".into(),
            })
        } else {
            Ok(format!("p{page}"))
        }
    });
    let config = fast_config().build().unwrap();

    let err = convert_with_model(blank_pdf(3), model.clone(), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, ConvertError::Provider { page: 2, .. }));
    // Sequential run stops at the failing page.
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn pdf_inspect_reports_page_count() {
    skip_without_pdfium!();

    let meta = pdf2markdown::inspect_bytes(blank_pdf(3), None).await.unwrap();
    assert_eq!(meta.page_count, 3);
    assert_eq!(meta.format.to_string(), "PDF");
}
