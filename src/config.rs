//! Configuration for drawing extraction.
//!
//! Every knob lives in [`ExtractionConfig`], built through
//! [`ExtractionConfigBuilder`]. The config is created once per run and passed
//! into [`crate::extract::Extractor::new`]; nothing in the pipeline reads
//! process-wide state after that point.

use crate::error::ExtractError;
use crate::pipeline::crop::CropRegion;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Lowest and highest accepted rendering DPI.
pub const DPI_RANGE: std::ops::RangeInclusive<u32> = 72..=1200;

/// Configuration for a drawing extraction.
///
/// # Example
/// ```rust
/// use edgequake_drawing2json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .full_pass_dpi(300)
///     .refinement_dpi(600)
///     .model("claude-sonnet-4-20250514")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// DPI for the full-drawing pass. Default: 300.
    pub full_pass_dpi: u32,

    /// DPI for the refinement pass, before cropping. Default: 600.
    ///
    /// The technical-remarks block is printed in small type; doubling the
    /// resolution is what makes the second pass worth running.
    pub refinement_dpi: u32,

    /// Cap on either dimension of the image sent to the model, in pixels.
    /// Applies to the cropped zone in the refinement pass. Default: 8000.
    ///
    /// Applied after DPI scaling. The page bitmap behind a cropped zone is
    /// larger than the cap: an A1 sheet refined at 600 DPI renders about
    /// 19900 × 14000 px before the zone is cut.
    pub max_rendered_pixels: u32,

    /// Zone re-read by the refinement pass. Default: bottom-left 35 % × 35 %.
    pub crop: CropRegion,

    /// Run the refinement pass at all. Default: true.
    pub refine: bool,

    /// Model identifier, e.g. "claude-sonnet-4-20250514".
    pub model: Option<String>,

    /// Provider name (e.g. "anthropic", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Output token limit for the full pass. Default: 4000.
    ///
    /// A 50-row bill of materials needs roughly 2 500 tokens of JSON.
    pub full_pass_max_tokens: usize,

    /// Output token limit for the refinement pass. Default: 1000.
    pub refinement_max_tokens: usize,

    /// Retries on transient service errors. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call model timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Replacement for the built-in full-pass prompt.
    pub full_prompt: Option<String>,

    /// Replacement for the built-in technical-parameters prompt.
    pub technical_prompt: Option<String>,

    /// Documents processed at once by [`crate::stream::extract_batch`]. Default: 4.
    pub concurrency: usize,

    /// Optional observer for pass-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            full_pass_dpi: 300,
            refinement_dpi: 600,
            max_rendered_pixels: 8000,
            crop: CropRegion::default(),
            refine: true,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            full_pass_max_tokens: 4000,
            refinement_max_tokens: 1000,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            password: None,
            full_prompt: None,
            technical_prompt: None,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("full_pass_dpi", &self.full_pass_dpi)
            .field("refinement_dpi", &self.refinement_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("crop", &self.crop)
            .field("refine", &self.refine)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("full_pass_max_tokens", &self.full_pass_max_tokens)
            .field("refinement_max_tokens", &self.refinement_max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("full_prompt", &self.full_prompt.is_some())
            .field("technical_prompt", &self.technical_prompt.is_some())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check the invariants `build()` enforces.
    ///
    /// Also called by the extractor, since fields are public and may have
    /// been edited after building.
    pub fn validate(&self) -> Result<(), ExtractError> {
        for (name, dpi) in [
            ("full-pass DPI", self.full_pass_dpi),
            ("refinement DPI", self.refinement_dpi),
        ] {
            if !DPI_RANGE.contains(&dpi) {
                return Err(ExtractError::InvalidConfig(format!(
                    "{name} must be {}–{}, got {dpi}",
                    DPI_RANGE.start(),
                    DPI_RANGE.end()
                )));
            }
        }
        if self.max_rendered_pixels < 100 {
            return Err(ExtractError::InvalidConfig(format!(
                "max rendered pixels must be ≥ 100, got {}",
                self.max_rendered_pixels
            )));
        }
        if self.full_pass_max_tokens == 0 || self.refinement_max_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max tokens must be ≥ 1".into(),
            ));
        }
        if self.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ExtractError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if self.refine {
            self.crop.validate()?;
        }
        Ok(())
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn full_pass_dpi(mut self, dpi: u32) -> Self {
        self.config.full_pass_dpi = dpi;
        self
    }

    pub fn refinement_dpi(mut self, dpi: u32) -> Self {
        self.config.refinement_dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px;
        self
    }

    pub fn crop(mut self, region: CropRegion) -> Self {
        self.config.crop = region;
        self
    }

    pub fn refine(mut self, v: bool) -> Self {
        self.config.refine = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn full_pass_max_tokens(mut self, n: usize) -> Self {
        self.config.full_pass_max_tokens = n;
        self
    }

    pub fn refinement_max_tokens(mut self, n: usize) -> Self {
        self.config.refinement_max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn full_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.full_prompt = Some(prompt.into());
        self
    }

    pub fn technical_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.technical_prompt = Some(prompt.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
