//! Offline integration tests for the two-pass extractor.
//!
//! Rendering is replaced by a blank sheet whose size follows the DPI, and the
//! model by a client that answers per pass from fixed text. No pdfium
//! library or API key is needed.

use edgequake_drawing2json::{
    extract_batch, prompt_for, CropRegion, ErrorKind, ExtractError, ExtractionConfig,
    ExtractionProgressCallback, ExtractionResult, Extractor, ModelClient, ModelReply,
    ModelRequest, Pass, PassState, Rasterizer, RenderRequest, RenderedPage,
};
use futures::future::BoxFuture;
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

/// A white sheet of `4 × dpi` by `3 × dpi` pixels.
struct BlankSheet;

impl Rasterizer for BlankSheet {
    fn rasterize(&self, _pdf_path: &Path, request: RenderRequest) -> Result<RenderedPage, ExtractError> {
        let dpi = request.dpi;
        Ok(RenderedPage {
            image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                dpi * 4,
                dpi * 3,
                Rgba([255, 255, 255, 255]),
            )),
            dpi: dpi as f32,
        })
    }
}

/// What the fake model answers for one pass.
#[derive(Clone)]
enum Answer {
    Text(&'static str),
    Fail(fn() -> ExtractError),
}

/// Answers by pass, recognised from the instruction text.
struct ByPass {
    full: Answer,
    technical: Answer,
    full_calls: AtomicUsize,
    technical_calls: AtomicUsize,
}

impl ByPass {
    fn new(full: Answer, technical: Answer) -> Arc<Self> {
        Arc::new(Self {
            full,
            technical,
            full_calls: AtomicUsize::new(0),
            technical_calls: AtomicUsize::new(0),
        })
    }
}

impl ModelClient for ByPass {
    fn complete<'a>(&'a self, request: ModelRequest<'a>) -> BoxFuture<'a, Result<ModelReply, ExtractError>> {
        let answer = if request.prompt == prompt_for(Pass::TechnicalParams) {
            self.technical_calls.fetch_add(1, Ordering::SeqCst);
            self.technical.clone()
        } else {
            self.full_calls.fetch_add(1, Ordering::SeqCst);
            self.full.clone()
        };
        Box::pin(async move {
            match answer {
                Answer::Text(text) => Ok(ModelReply {
                    text: text.to_string(),
                    input_tokens: 1500,
                    output_tokens: 200,
                }),
                Answer::Fail(make) => Err(make()),
            }
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

const BASE_REPLY: &str = r#"{
  "table1": [
    {"field": "SIZE", "value": "12\""},
    {"field": "Ã˜d", "value": "305"},
    {"field": "DESIGN_TEMP", "value": ""},
    {"field": "DESIGN_PRESSURE", "value": "10 bar"},
    {"field": "PRESSURE_TEST_BODY", "value": "15 bar"}
  ],
  "table2": [
    {"pos": 1, "description": "Body", "material": "ASTM A350 LF2 CL1", "note": null},
    {"pos": "2", "description": "Ball", "material": "ASTM A182 F316", "note": "ENP"}
  ],
  "table3": [
    {"CUSTOMER": "ACME Gas"},
    {"DRAWING N°": "GA-1042"}
  ]
}"#;

const TECHNICAL_REPLY: &str = r#"{
  "DESIGN_TEMP": "-40°C..+100°C",
  "DESIGN_PRESSURE": "",
  "PRESSURE_TEST_BODY": "153 bar",
  "PRESSURE_TEST_SEAT": "112 bar"
}"#;

fn service_error() -> ExtractError {
    ExtractError::ServiceError {
        message: "HTTP 503 overloaded".into(),
    }
}

fn auth_error() -> ExtractError {
    ExtractError::AuthError {
        detail: "401 invalid x-api-key".into(),
    }
}

fn fake_pdf(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n").unwrap();
    path
}

fn config() -> edgequake_drawing2json::ExtractionConfigBuilder {
    ExtractionConfig::builder()
        .full_pass_dpi(100)
        .refinement_dpi(200)
        .retry_backoff_ms(1)
}

fn extractor(cfg: ExtractionConfig, client: Arc<ByPass>) -> Extractor {
    Extractor::with_components(cfg, Arc::new(BlankSheet), client).unwrap()
}

fn base_result() -> ExtractionResult {
    let mut r = edgequake_drawing2json::pipeline::normalize::normalize_extraction(BASE_REPLY).unwrap();
    r.table1.sort_by(|a, b| a.field.cmp(&b.field));
    r
}

// ── Two-pass behaviour ───────────────────────────────────────────────────────

#[tokio::test]
async fn refinement_overwrites_technical_fields() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "valve.pdf");
    let client = ByPass::new(Answer::Text(BASE_REPLY), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(config().build().unwrap(), client.clone());

    let out = ex.extract(pdf.to_str().unwrap()).await.unwrap();
    let r = &out.result;

    assert_eq!(out.final_state, PassState::Merged);
    assert!(out.warning.is_none());
    assert_eq!(r.field("DESIGN_TEMP"), Some("-40°C..+100°C"));
    // empty refined value keeps the full-pass reading
    assert_eq!(r.field("DESIGN_PRESSURE"), Some("10 bar"));
    assert_eq!(r.field("PRESSURE_TEST_BODY"), Some("153 bar"));
    // never appended when the full pass did not list it
    assert_eq!(r.field("PRESSURE_TEST_SEAT"), None);
    assert_eq!(r.table1.len(), 5);
    assert_eq!(out.stats.fields_refined, 2);

    // untouched parts
    assert_eq!(r.field("SIZE"), Some("12\""));
    assert_eq!(r.field("Ød"), Some("305"));
    assert_eq!(r.table2.len(), 2);
    assert_eq!(r.table2[0].pos, "1");
    assert_eq!(r.table2[0].note, "");
    assert_eq!(r.info("DRAWING N°"), Some("GA-1042"));

    assert_eq!(client.full_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.technical_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fenced_base_reply_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "fenced.pdf");
    let fenced: &'static str = Box::leak(format!("```json\n{BASE_REPLY}\n```").into_boxed_str());
    let client = ByPass::new(Answer::Text(fenced), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(config().refine(false).build().unwrap(), client);

    let out = ex.extract(pdf.to_str().unwrap()).await.unwrap();
    let mut got = out.result.clone();
    got.table1.sort_by(|a, b| a.field.cmp(&b.field));
    assert_eq!(got, base_result());
}

#[tokio::test]
async fn refine_disabled_stops_after_full_pass() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "a.pdf");
    let client = ByPass::new(Answer::Text(BASE_REPLY), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(config().refine(false).build().unwrap(), client.clone());

    let out = ex.extract(pdf.to_str().unwrap()).await.unwrap();
    assert_eq!(out.final_state, PassState::FullPassDone);
    assert_eq!(out.result.field("DESIGN_TEMP"), Some(""));
    assert!(out.stats.refinement_pass.is_none());
    assert_eq!(client.technical_calls.load(Ordering::SeqCst), 0);
}

// ── Refinement failures are contained ────────────────────────────────────────

async fn assert_refinement_contained(cfg: ExtractionConfig, technical: Answer) {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "a.pdf");
    let client = ByPass::new(Answer::Text(BASE_REPLY), technical);
    let ex = extractor(cfg, client);

    let out = ex.extract(pdf.to_str().unwrap()).await.unwrap();
    assert_eq!(out.final_state, PassState::MergedWithWarning);
    assert!(out.warning.is_some());
    assert_eq!(out.stats.fields_refined, 0);

    let mut got = out.result;
    got.table1.sort_by(|a, b| a.field.cmp(&b.field));
    assert_eq!(got, base_result());
}

#[tokio::test]
async fn malformed_refinement_keeps_base() {
    assert_refinement_contained(
        config().build().unwrap(),
        Answer::Text("The remarks block is unreadable."),
    )
    .await;
}

#[tokio::test]
async fn failing_refinement_service_keeps_base() {
    assert_refinement_contained(config().max_retries(1).build().unwrap(), Answer::Fail(service_error))
        .await;
}

#[tokio::test]
async fn empty_crop_keeps_base() {
    // 0.001 of an 800 px wide render truncates to zero columns.
    let cfg = config()
        .crop(CropRegion::new(0.0, 0.65, 0.001, 1.0))
        .build()
        .unwrap();
    assert_refinement_contained(cfg, Answer::Text(TECHNICAL_REPLY)).await;
}

#[tokio::test]
async fn refinement_retries_transient_errors() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "a.pdf");
    let client = ByPass::new(Answer::Text(BASE_REPLY), Answer::Fail(service_error));
    let ex = extractor(config().max_retries(2).build().unwrap(), client.clone());

    let out = ex.extract(pdf.to_str().unwrap()).await.unwrap();
    assert_eq!(out.final_state, PassState::MergedWithWarning);
    assert_eq!(client.technical_calls.load(Ordering::SeqCst), 3);
}

// ── Full-pass failures are fatal ─────────────────────────────────────────────

#[tokio::test]
async fn malformed_base_reply_fails_without_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "a.pdf");
    let out_path = dir.path().join("parsed_result.json");
    let raw = "Sorry, I cannot read this drawing.";
    let client = ByPass::new(Answer::Text(raw), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(config().build().unwrap(), client.clone());

    let err = ex
        .extract_to_file(pdf.to_str().unwrap(), &out_path)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    assert_eq!(err.raw_response(), Some(raw));
    assert!(!out_path.exists());
    assert_eq!(client.technical_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn auth_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "a.pdf");
    let client = ByPass::new(Answer::Fail(auth_error), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(config().max_retries(3).build().unwrap(), client.clone());

    let err = ex.extract(pdf.to_str().unwrap()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExtractionService);
    assert_eq!(client.full_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn document_errors_come_before_any_model_call() {
    let dir = tempfile::tempdir().unwrap();
    let not_pdf = dir.path().join("notes.txt");
    std::fs::write(&not_pdf, "just text").unwrap();
    let client = ByPass::new(Answer::Text(BASE_REPLY), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(config().build().unwrap(), client.clone());

    let err = ex.extract(not_pdf.to_str().unwrap()).await.unwrap_err();
    assert!(matches!(err, ExtractError::NotAPdf { .. }), "got {err:?}");

    let missing = dir.path().join("missing.pdf");
    let err = ex.extract(missing.to_str().unwrap()).await.unwrap_err();
    assert!(matches!(err, ExtractError::FileNotFound { .. }), "got {err:?}");

    assert_eq!(client.full_calls.load(Ordering::SeqCst), 0);
}

// ── Output, stats, progress ──────────────────────────────────────────────────

#[tokio::test]
async fn extract_to_file_writes_result_only() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "a.pdf");
    let out_path = dir.path().join("out/result.json");
    let client = ByPass::new(Answer::Text(BASE_REPLY), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(config().build().unwrap(), client);

    let out = ex.extract_to_file(pdf.to_str().unwrap(), &out_path).await.unwrap();

    let text = std::fs::read_to_string(&out_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 3);
    for k in ["table1", "table2", "table3"] {
        assert!(keys.contains(&k), "missing {k}");
    }
    assert!(text.contains("-40°C..+100°C"));
    assert_eq!(value["table3"][0]["CUSTOMER"], "ACME Gas");

    let written: ExtractionResult = serde_json::from_str(&text).unwrap();
    assert_eq!(written, out.result);
}

#[tokio::test]
async fn stats_describe_both_passes() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "a.pdf");
    let client = ByPass::new(Answer::Text(BASE_REPLY), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(config().build().unwrap(), client);

    let out = ex.extract(pdf.to_str().unwrap()).await.unwrap();
    let full = &out.stats.full_pass;
    assert_eq!((full.requested_dpi, full.dpi), (100, 100));
    assert_eq!((full.image_width, full.image_height), (400, 300));
    assert_eq!((full.input_tokens, full.output_tokens, full.attempts), (1500, 200, 1));

    let refine = out.stats.refinement_pass.as_ref().unwrap();
    // default zone of an 800×600 render: x 0..280, y 390..600
    assert_eq!((refine.requested_dpi, refine.dpi), (200, 200));
    assert_eq!((refine.image_width, refine.image_height), (280, 210));
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl ExtractionProgressCallback for Recorder {
    fn on_extraction_start(&self, _input: &str) {
        self.0.lock().unwrap().push("start".into());
    }
    fn on_pass_start(&self, _input: &str, pass: Pass) {
        self.0.lock().unwrap().push(format!("begin {pass}"));
    }
    fn on_pass_complete(&self, _input: &str, pass: Pass, _duration_ms: u64) {
        self.0.lock().unwrap().push(format!("end {pass}"));
    }
    fn on_refinement_skipped(&self, _input: &str, _reason: &str) {
        self.0.lock().unwrap().push("skipped".into());
    }
    fn on_extraction_complete(&self, _input: &str, state: PassState) {
        self.0.lock().unwrap().push(format!("done {state:?}"));
    }
    fn on_extraction_failed(&self, _input: &str, error: &ExtractError) {
        self.0.lock().unwrap().push(format!("failed {:?}", error.kind()));
    }
}

#[tokio::test]
async fn progress_events_follow_the_passes() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "a.pdf");
    let recorder = Arc::new(Recorder::default());
    let cfg = config().progress_callback(recorder.clone()).build().unwrap();
    let client = ByPass::new(Answer::Text(BASE_REPLY), Answer::Text("not json"));
    let ex = extractor(cfg, client);

    ex.extract(pdf.to_str().unwrap()).await.unwrap();

    let events = recorder.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start",
            "begin full",
            "end full",
            "begin technical-params",
            "skipped",
            "done MergedWithWarning",
        ]
    );
}

#[tokio::test]
async fn fatal_error_is_reported_to_the_callback() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "a.pdf");
    let recorder = Arc::new(Recorder::default());
    let cfg = config().progress_callback(recorder.clone()).build().unwrap();
    let client = ByPass::new(Answer::Text("no tables here"), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(cfg, client);

    ex.extract(pdf.to_str().unwrap()).await.unwrap_err();

    let events = recorder.0.lock().unwrap().clone();
    assert_eq!(events, vec!["start", "begin full", "failed MalformedResponse"]);
}

#[tokio::test]
async fn custom_prompt_replaces_builtin() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fake_pdf(dir.path(), "a.pdf");
    // A custom technical prompt no longer matches the built-in one, so the
    // fake answers it as a full-pass request.
    let cfg = config().technical_prompt("only the temperatures please").build().unwrap();
    let client = ByPass::new(Answer::Text(BASE_REPLY), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(cfg, client.clone());

    let out = ex.extract(pdf.to_str().unwrap()).await.unwrap();
    assert_eq!(client.full_calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.technical_calls.load(Ordering::SeqCst), 0);
    // the base reply carries none of the four keys
    assert_eq!(out.final_state, PassState::Merged);
    assert_eq!(out.stats.fields_refined, 0);
}

// ── Bytes and batches ────────────────────────────────────────────────────────

#[tokio::test]
async fn extract_from_bytes_uses_temp_file() {
    let client = ByPass::new(Answer::Text(BASE_REPLY), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(config().build().unwrap(), client);

    let out = ex.extract_from_bytes(b"%PDF-1.4\n").await.unwrap();
    assert_eq!(out.final_state, PassState::Merged);

    let err = ex.extract_from_bytes(b"PK\x03\x04").await.unwrap_err();
    assert!(matches!(err, ExtractError::NotAPdf { .. }));
}

#[tokio::test]
async fn batch_keeps_input_order_and_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let a = fake_pdf(dir.path(), "a.pdf");
    let b = dir.path().join("b.pdf");
    let c = fake_pdf(dir.path(), "c.pdf");
    let client = ByPass::new(Answer::Text(BASE_REPLY), Answer::Text(TECHNICAL_REPLY));
    let ex = extractor(config().concurrency(2).build().unwrap(), client);

    let inputs: Vec<String> = [&a, &b, &c]
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    let results = extract_batch(inputs.clone(), &ex).await;

    assert_eq!(results.len(), 3);
    for ((input, _), expected) in results.iter().zip(&inputs) {
        assert_eq!(input, expected);
    }
    assert!(results[0].1.is_ok());
    assert!(matches!(results[1].1, Err(ExtractError::FileNotFound { .. })));
    assert_eq!(results[2].1.as_ref().unwrap().final_state, PassState::Merged);
}
