//! Two-pass extraction entry points.
//!
//! ## Passes
//!
//! ```text
//! Start ─▶ FullPassPending ─▶ FullPassDone ─▶ RefinementPending ─┬─▶ Merged
//!                                                                └─▶ MergedWithWarning
//! ```
//!
//! The full pass reads the whole drawing at `full_pass_dpi` and produces the
//! base [`ExtractionResult`]. The refinement pass re-renders at
//! `refinement_dpi`, crops the technical-remarks zone and asks only for the
//! four technical parameters, which are merged into table1.
//!
//! A failed full pass aborts: there is nothing to merge into. A failed
//! refinement pass (service error, malformed reply, crop geometry, render
//! failure) is logged and the base result is returned as is.
//!
//! The passes run one after the other; documents are independent, see
//! [`crate::stream`] for running several at once.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::output::{ExtractionOutput, ExtractionResult, ExtractionStats, PassState, PassStats, TechnicalParams};
use crate::pipeline::llm::{self, CallPolicy, ModelClient, ModelRequest, ProviderClient};
use crate::pipeline::render::{self, PdfiumRasterizer, PreparedImage, Rasterizer};
use crate::pipeline::{input, merge, normalize};
use crate::prompts::{prompt_for, Pass};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default model when a provider is named without one.
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1";

/// Runs the two-pass pipeline with one fixed configuration.
///
/// Build it once per run; it holds the resolved provider and never reads the
/// environment again.
pub struct Extractor {
    config: ExtractionConfig,
    rasterizer: Arc<dyn Rasterizer>,
    client: Arc<dyn ModelClient>,
}

impl Extractor {
    /// Validate `config`, resolve the LLM provider and bind pdfium rendering.
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        config.validate()?;
        let provider = resolve_provider(&config)?;
        let client = Arc::new(ProviderClient::new(provider, config.temperature));
        let rasterizer = Arc::new(PdfiumRasterizer::new(
            config.max_rendered_pixels,
            config.password.clone(),
        ));
        Ok(Self {
            config,
            rasterizer,
            client,
        })
    }

    /// Assemble an extractor from explicit components.
    pub fn with_components(
        config: ExtractionConfig,
        rasterizer: Arc<dyn Rasterizer>,
        client: Arc<dyn ModelClient>,
    ) -> Result<Self, ExtractError> {
        config.validate()?;
        Ok(Self {
            config,
            rasterizer,
            client,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract the tables from page 1 of a PDF file or URL.
    ///
    /// # Errors
    /// Document errors and every full-pass failure. Refinement failures are
    /// reported through [`ExtractionOutput::warning`] instead.
    pub async fn extract(&self, input_str: &str) -> Result<ExtractionOutput, ExtractError> {
        info!("Starting extraction: {}", input_str);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_start(input_str);
        }

        let outcome = self.run(input_str).await;
        if let Some(ref cb) = self.config.progress_callback {
            match outcome {
                Ok(ref output) => cb.on_extraction_complete(input_str, output.final_state),
                Err(ref e) => cb.on_extraction_failed(input_str, e),
            }
        }
        outcome
    }

    async fn run(&self, input_str: &str) -> Result<ExtractionOutput, ExtractError> {
        let total_start = Instant::now();

        let resolved = input::resolve_input(input_str, self.config.download_timeout_secs).await?;
        let pdf_path = resolved.path();

        let mut state = PassState::Start;

        // ── Full pass ────────────────────────────────────────────────────
        advance(&mut state, PassState::FullPassPending);
        let (mut result, full_stats) = self.run_full_pass(input_str, pdf_path).await?;
        advance(&mut state, PassState::FullPassDone);
        info!(
            "Full pass: {} fields, {} BOM rows, {} info entries",
            result.table1.len(),
            result.table2.len(),
            result.table3.len()
        );

        // ── Refinement pass ──────────────────────────────────────────────
        let mut warning = None;
        let mut refinement_stats = None;
        let mut fields_refined = 0;

        if self.config.refine {
            advance(&mut state, PassState::RefinementPending);
            match self.run_refinement(input_str, pdf_path).await {
                Ok((params, stats)) => {
                    fields_refined = merge::apply_refinement(&mut result, &params);
                    refinement_stats = Some(stats);
                    info!("Refinement pass: {} technical fields updated", fields_refined);
                    advance(&mut state, PassState::Merged);
                }
                Err(e) => {
                    warn!(error = %e, "Refinement pass failed; keeping full-pass values");
                    if let Some(raw) = e.raw_response() {
                        debug!("Refinement reply was: {}", raw);
                    }
                    if let Some(ref cb) = self.config.progress_callback {
                        cb.on_refinement_skipped(input_str, &e.to_string());
                    }
                    warning = Some(e.to_string());
                    advance(&mut state, PassState::MergedWithWarning);
                }
            }
        } else {
            debug!("Refinement disabled");
        }

        let stats = ExtractionStats {
            full_pass: full_stats,
            refinement_pass: refinement_stats,
            fields_refined,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Extraction complete: {:?} in {}ms",
            state, stats.total_duration_ms
        );

        Ok(ExtractionOutput {
            result,
            final_state: state,
            warning,
            stats,
        })
    }

    /// Extract and write the result JSON to `output_path`.
    ///
    /// Nothing is written unless extraction succeeds; the write itself is
    /// atomic (temp file + rename).
    pub async fn extract_to_file(
        &self,
        input_str: &str,
        output_path: impl AsRef<Path>,
    ) -> Result<ExtractionOutput, ExtractError> {
        let output = self.extract(input_str).await?;
        write_result(output_path.as_ref(), &output.result).await?;
        Ok(output)
    }

    /// Extract from PDF bytes held in memory.
    ///
    /// The bytes go to a managed temp file that is removed on return.
    pub async fn extract_from_bytes(&self, bytes: &[u8]) -> Result<ExtractionOutput, ExtractError> {
        let mut tmp = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
        let path = tmp.path().to_string_lossy().to_string();
        self.extract(&path).await
    }

    async fn run_full_pass(
        &self,
        input_str: &str,
        pdf_path: &Path,
    ) -> Result<(ExtractionResult, PassStats), ExtractError> {
        let dpi = self.config.full_pass_dpi;
        let prompt = self
            .config
            .full_prompt
            .as_deref()
            .unwrap_or(prompt_for(Pass::Full));

        let (raw, stats) = self
            .run_pass(input_str, Pass::Full, pdf_path, dpi, None, prompt, self.config.full_pass_max_tokens)
            .await?;
        let result = normalize::normalize_extraction(&raw)?;
        self.pass_complete(input_str, Pass::Full, &stats);
        Ok((result, stats))
    }

    async fn run_refinement(
        &self,
        input_str: &str,
        pdf_path: &Path,
    ) -> Result<(TechnicalParams, PassStats), ExtractError> {
        let dpi = self.config.refinement_dpi;
        let prompt = self
            .config
            .technical_prompt
            .as_deref()
            .unwrap_or(prompt_for(Pass::TechnicalParams));

        let (raw, stats) = self
            .run_pass(
                input_str,
                Pass::TechnicalParams,
                pdf_path,
                dpi,
                Some(self.config.crop),
                prompt,
                self.config.refinement_max_tokens,
            )
            .await?;
        let params = normalize::normalize_technical(&raw)?;
        self.pass_complete(input_str, Pass::TechnicalParams, &stats);
        Ok((params, stats))
    }

    /// Render, encode and send one image; returns the raw reply text.
    #[allow(clippy::too_many_arguments)]
    async fn run_pass(
        &self,
        input_str: &str,
        pass: Pass,
        pdf_path: &Path,
        dpi: u32,
        crop: Option<crate::pipeline::crop::CropRegion>,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<(String, PassStats), ExtractError> {
        info!(pass = %pass, dpi, "Pass started");
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_pass_start(input_str, pass);
        }

        let PreparedImage {
            data,
            width,
            height,
            dpi: effective_dpi,
        } = render::prepare_image(Arc::clone(&self.rasterizer), pdf_path, dpi, crop).await?;

        let outcome = llm::call_model(
            self.client.as_ref(),
            ModelRequest {
                image: &data,
                prompt,
                max_tokens,
            },
            self.call_policy(),
        )
        .await?;

        let stats = PassStats {
            requested_dpi: dpi,
            dpi: effective_dpi.round() as u32,
            image_width: width,
            image_height: height,
            input_tokens: outcome.reply.input_tokens,
            output_tokens: outcome.reply.output_tokens,
            duration_ms: outcome.duration_ms,
            attempts: outcome.attempts,
        };
        Ok((outcome.reply.text, stats))
    }

    fn pass_complete(&self, input_str: &str, pass: Pass, stats: &PassStats) {
        info!(
            pass = %pass,
            duration_ms = stats.duration_ms,
            input_tokens = stats.input_tokens,
            output_tokens = stats.output_tokens,
            "Pass finished"
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_pass_complete(input_str, pass, stats.duration_ms);
        }
    }

    fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout_secs: self.config.api_timeout_secs,
            max_retries: self.config.max_retries,
            retry_backoff_ms: self.config.retry_backoff_ms,
        }
    }
}

fn advance(state: &mut PassState, next: PassState) {
    debug!(from = ?*state, to = ?next, "State transition");
    *state = next;
}

// ── Convenience functions ────────────────────────────────────────────────

/// Build an [`Extractor`] from `config` and run it once.
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    Extractor::new(config.clone())?
        .extract(input_str.as_ref())
        .await
}

/// Extract and write the result JSON to `output_path`.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    Extractor::new(config.clone())?
        .extract_to_file(input_str.as_ref(), output_path)
        .await
}

/// Synchronous wrapper around [`extract`].
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(extract(input_str, config))
}

/// Write `result` as pretty JSON, atomically.
pub async fn write_result(path: &Path, result: &ExtractionResult) -> Result<(), ExtractError> {
    let write_err = |source| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut json = serde_json::to_string_pretty(result)
        .map_err(|e| ExtractError::Internal(format!("serialise result: {e}")))?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let written = async {
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", tmp_path.display(), cleanup);
            }
        }
        return Err(write_err(e));
    }
    debug!("Wrote {}", path.display());
    Ok(())
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn default_model_for(provider_name: &str) -> &'static str {
    match provider_name {
        "anthropic" | "claude" => DEFAULT_ANTHROPIC_MODEL,
        _ => DEFAULT_OPENAI_MODEL,
    }
}

/// Resolve the LLM provider, most specific first:
///
/// 1. `config.provider` — used as is
/// 2. `config.provider_name` (+ `config.model`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, both set
/// 4. `ANTHROPIC_API_KEY` → Anthropic
/// 5. `ProviderFactory::from_env()` auto-detection
fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config
            .model
            .as_deref()
            .unwrap_or_else(|| default_model_for(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if std::env::var("ANTHROPIC_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_ANTHROPIC_MODEL);
        return create_vision_provider("anthropic", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}
