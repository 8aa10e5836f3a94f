//! Error types for the edgequake-drawing2json library.
//!
//! A single [`ExtractError`] enum carries every failure, grouped by
//! [`ErrorKind`] so callers can apply the pipeline's propagation policy
//! without matching on every variant:
//!
//! * [`ErrorKind::DocumentRead`] — the PDF is missing, corrupt or unreadable.
//!   Always fatal.
//! * [`ErrorKind::ExtractionService`] — network / auth / rate-limit failures
//!   talking to the model. Fatal in the full pass, downgraded to a warning in
//!   the refinement pass.
//! * [`ErrorKind::MalformedResponse`] — the model reply is not the expected
//!   JSON shape. Same rule as above; the raw reply is kept for diagnosis.
//! * [`ErrorKind::CropGeometry`] — invalid region bounds. Skips refinement.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// A standalone 4xx/5xx status token. Digits inside ids such as
/// `req_0140133` are not tokens.
static RE_HTTP_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([45]\d\d)\b").unwrap());

/// All errors returned by the edgequake-drawing2json library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Document errors ───────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// pdfium could not parse the document.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none (or the wrong one) was provided.
    #[error("PDF '{path}' is encrypted; provide the correct password with --password")]
    PasswordRequired { path: PathBuf },

    /// The document has no page to render.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// pdfium (or the PNG encoder) failed on the first page.
    #[error("Rasterisation failed at {dpi} DPI: {detail}")]
    RasterisationFailed { dpi: u32, detail: String },

    /// HTTP input could not be fetched.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    // ── Model service errors ──────────────────────────────────────────────
    /// No provider could be built (missing API key, unknown provider name).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The provider rejected our credentials.
    #[error("Authentication error from the model service: {detail}")]
    AuthError { detail: String },

    /// HTTP 429 from the provider.
    #[error("Rate limit exceeded by the model service: {detail}")]
    RateLimited { detail: String },

    /// Any other 4xx: the request itself was refused and resending it is
    /// pointless.
    #[error("Model service rejected the request (HTTP {status}): {detail}")]
    RequestRejected { status: u16, detail: String },

    /// The model call exceeded `api_timeout_secs`.
    #[error("Model call timed out after {secs}s")]
    ServiceTimeout { secs: u64 },

    /// Any other provider failure.
    #[error("Model service error: {message}")]
    ServiceError { message: String },

    // ── Response errors ───────────────────────────────────────────────────
    /// The reply could not be parsed into the expected JSON shape.
    ///
    /// `raw` holds the model text exactly as received.
    #[error("Malformed model response: {detail}")]
    MalformedResponse { detail: String, raw: String },

    // ── Geometry errors ───────────────────────────────────────────────────
    /// The crop region is unusable for the given image.
    #[error("Invalid crop region: {0}")]
    CropGeometry(String),

    // ── Config / output errors ────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error (task panic, temp file failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`ExtractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DocumentRead,
    ExtractionService,
    MalformedResponse,
    CropGeometry,
    Configuration,
    Output,
    Internal,
}

impl ExtractError {
    /// Which part of the taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use ExtractError::*;
        match self {
            FileNotFound { .. }
            | PermissionDenied { .. }
            | NotAPdf { .. }
            | CorruptPdf { .. }
            | PasswordRequired { .. }
            | EmptyDocument { .. }
            | RasterisationFailed { .. }
            | DownloadFailed { .. } => ErrorKind::DocumentRead,
            ProviderNotConfigured { .. }
            | AuthError { .. }
            | RateLimited { .. }
            | RequestRejected { .. }
            | ServiceTimeout { .. }
            | ServiceError { .. } => ErrorKind::ExtractionService,
            MalformedResponse { .. } => ErrorKind::MalformedResponse,
            CropGeometry(_) => ErrorKind::CropGeometry,
            InvalidConfig(_) => ErrorKind::Configuration,
            OutputWriteFailed { .. } => ErrorKind::Output,
            Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether resending the same image and prompt could succeed.
    ///
    /// Only transient service failures qualify. A malformed reply is schema
    /// drift, not a transient fault, and is never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractError::RateLimited { .. }
                | ExtractError::ServiceTimeout { .. }
                | ExtractError::ServiceError { .. }
        )
    }

    /// The raw model text for [`ExtractError::MalformedResponse`].
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ExtractError::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// Classify a provider error message.
    ///
    /// `edgequake-llm` surfaces HTTP failures as formatted strings, so the
    /// status code is recovered from the text. A status token wins over any
    /// wording; keywords are only consulted when no status is present.
    ///
    /// | status | variant | retried |
    /// |---|---|---|
    /// | 401, 403 | `AuthError` | no |
    /// | 429 | `RateLimited` | yes |
    /// | 408, 5xx | `ServiceError` | yes |
    /// | other 4xx | `RequestRejected` | no |
    pub(crate) fn from_provider_message(message: String) -> Self {
        let status = RE_HTTP_STATUS
            .captures(&message)
            .and_then(|c| c[1].parse::<u16>().ok());

        match status {
            Some(401 | 403) => ExtractError::AuthError { detail: message },
            Some(429) => ExtractError::RateLimited { detail: message },
            Some(408) | Some(500..=599) => ExtractError::ServiceError { message },
            Some(status) => ExtractError::RequestRejected {
                status,
                detail: message,
            },
            None => Self::classify_by_wording(message),
        }
    }

    fn classify_by_wording(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("too many requests") {
            ExtractError::RateLimited { detail: message }
        } else if lower.contains("overloaded") {
            ExtractError::ServiceError { message }
        } else if lower.contains("unauthorized")
            || lower.contains("authentication")
            || lower.contains("invalid api key")
            || lower.contains("invalid x-api-key")
        {
            ExtractError::AuthError { detail: message }
        } else {
            ExtractError::ServiceError { message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let e = ExtractError::NotAPdf {
            path: "x.pdf".into(),
            magic: *b"GIF8",
        };
        assert_eq!(e.kind(), ErrorKind::DocumentRead);
        assert_eq!(
            ExtractError::ServiceTimeout { secs: 5 }.kind(),
            ErrorKind::ExtractionService
        );
        assert_eq!(
            ExtractError::CropGeometry("left >= right".into()).kind(),
            ErrorKind::CropGeometry
        );
    }

    #[test]
    fn malformed_response_is_not_retryable() {
        let e = ExtractError::MalformedResponse {
            detail: "expected value at line 1 column 1".into(),
            raw: "Sorry, I cannot read this drawing.".into(),
        };
        assert!(!e.is_retryable());
        assert_eq!(e.raw_response(), Some("Sorry, I cannot read this drawing."));
    }

    #[test]
    fn provider_messages_are_classified() {
        let auth = ExtractError::from_provider_message("HTTP 401: invalid x-api-key".into());
        assert!(matches!(auth, ExtractError::AuthError { .. }));
        assert!(!auth.is_retryable());

        let rate = ExtractError::from_provider_message("429 Too Many Requests".into());
        assert!(matches!(rate, ExtractError::RateLimited { .. }));
        assert!(rate.is_retryable());

        let other = ExtractError::from_provider_message("overloaded_error".into());
        assert!(matches!(other, ExtractError::ServiceError { .. }));
        assert!(other.is_retryable());
    }

    #[test]
    fn request_ids_are_not_status_codes() {
        let e = ExtractError::from_provider_message(
            "529 overloaded_error request_id=req_0140133".into(),
        );
        assert!(matches!(e, ExtractError::ServiceError { .. }), "got {e:?}");
        assert!(e.is_retryable());

        let e = ExtractError::from_provider_message("upstream failure, id req_0429abc".into());
        assert!(matches!(e, ExtractError::ServiceError { .. }), "got {e:?}");
    }

    #[test]
    fn status_wins_over_wording() {
        let e = ExtractError::from_provider_message(
            "HTTP 503: authentication backend unavailable".into(),
        );
        assert!(matches!(e, ExtractError::ServiceError { .. }), "got {e:?}");

        let e = ExtractError::from_provider_message("HTTP 408 Request Timeout".into());
        assert!(e.is_retryable());
    }

    #[test]
    fn client_errors_are_rejected_without_retry() {
        for (msg, code) in [
            ("HTTP 400: image exceeds 5 MB maximum", 400),
            ("404 Not Found: model 'gpt-4.1-mini-x' does not exist", 404),
            ("413 Payload Too Large", 413),
            ("API error (422): invalid_request_error", 422),
        ] {
            let e = ExtractError::from_provider_message(msg.into());
            match e {
                ExtractError::RequestRejected { status, .. } => assert_eq!(status, code, "{msg}"),
                ref other => panic!("{msg} → {other:?}"),
            }
            assert!(!e.is_retryable(), "{msg}");
            assert_eq!(e.kind(), ErrorKind::ExtractionService);
        }
    }

    #[test]
    fn timeout_display() {
        let e = ExtractError::ServiceTimeout { secs: 120 };
        assert!(e.to_string().contains("120s"));
    }
}
