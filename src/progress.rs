//! Progress-callback trait for pass-level extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to observe
//! each document move through the two passes. The CLI uses it to drive a
//! spinner; a server could forward the same events to a job record.
//!
//! Events complement, and do not replace, the `tracing` logs emitted by the
//! pipeline.
//!
//! # Example
//!
//! ```rust
//! use edgequake_drawing2json::{ExtractionConfig, ExtractionProgressCallback, Pass};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExtractionProgressCallback for Printer {
//!     fn on_pass_complete(&self, input: &str, pass: Pass, duration_ms: u64) {
//!         eprintln!("{input}: {pass} pass done in {duration_ms}ms");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ExtractError;
use crate::output::PassState;
use crate::prompts::Pass;
use std::sync::Arc;

/// Called by the extractor as a document moves through its passes.
///
/// All methods default to no-ops. Implementations must be `Send + Sync`:
/// [`crate::stream::extract_batch`] runs several documents at once and shares
/// one callback between them, so every event carries the `input` it belongs
/// to.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the full pass starts rendering.
    fn on_extraction_start(&self, input: &str) {
        let _ = input;
    }

    /// Called before a pass renders its image.
    fn on_pass_start(&self, input: &str, pass: Pass) {
        let _ = (input, pass);
    }

    /// Called after a pass produced a parsed reply.
    fn on_pass_complete(&self, input: &str, pass: Pass, duration_ms: u64) {
        let _ = (input, pass, duration_ms);
    }

    /// Called when the refinement pass failed and the base result is kept.
    fn on_refinement_skipped(&self, input: &str, reason: &str) {
        let _ = (input, reason);
    }

    /// Called once after a successful extraction with its final state.
    fn on_extraction_complete(&self, input: &str, state: PassState) {
        let _ = (input, state);
    }

    /// Called once when the extraction aborts; no result follows.
    fn on_extraction_failed(&self, input: &str, error: &ExtractError) {
        let _ = (input, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
