//! # edgequake-drawing2json
//!
//! Extract the title-block tables of an engineering drawing PDF into JSON
//! using a Vision Language Model (VLM).
//!
//! ## Why two passes?
//!
//! A whole A1 sheet rendered at a resolution a VLM accepts leaves the small
//! technical-remarks text barely legible. The first pass reads the whole
//! drawing; the second re-renders page 1 at higher DPI, crops the
//! bottom-left remarks zone and asks only for four technical parameters,
//! which then overwrite their table1 entries.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Render     rasterise page 1 via pdfium (spawn_blocking)
//!  ├─ 3. Full pass  300 DPI image → VLM → table1 / table2 / table3
//!  ├─ 4. Refine     600 DPI crop   → VLM → DESIGN_TEMP, DESIGN_PRESSURE, …
//!  ├─ 5. Merge      non-empty refined values overwrite table1 entries
//!  └─ 6. Output     ExtractionResult + state, warning and per-pass stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_drawing2json::{ExtractionConfig, Extractor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider resolved from ANTHROPIC_API_KEY / EDGEQUAKE_LLM_PROVIDER / …
//!     let extractor = Extractor::new(ExtractionConfig::default())?;
//!     let output = extractor.extract("drawing.pdf").await?;
//!     println!("{}", serde_json::to_string_pretty(&output.result)?);
//!     if let Some(w) = output.warning {
//!         eprintln!("refinement skipped: {w}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `drawing2json` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-drawing2json = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{ErrorKind, ExtractError};
pub use extract::{extract, extract_sync, extract_to_file, write_result, Extractor};
pub use output::{
    BomRow, ExtractionOutput, ExtractionResult, ExtractionStats, FieldValue, KeyValue, PassState,
    PassStats, TechnicalField, TechnicalParams,
};
pub use pipeline::crop::CropRegion;
pub use pipeline::llm::{ModelClient, ModelReply, ModelRequest};
pub use pipeline::render::{Rasterizer, RenderRequest, RenderedPage};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{prompt_for, Pass};
pub use stream::{extract_batch, extract_stream, DocumentResult, ExtractionStream};
