//! Response normalisation: raw model text → typed tables.
//!
//! Models are told to answer with bare JSON but still wrap it in
//! ```` ```json ```` fences now and then, and some providers round-trip UTF-8
//! through Latin-1 so `Ø` arrives as `Ã˜`. The steps below undo exactly those
//! quirks and nothing else:
//!
//! 1. [`strip_code_fences`] — drop a leading fence opener (optionally with a
//!    language tag) and a trailing fence closer, each only if present
//! 2. trim surrounding whitespace
//! 3. [`parse_json`] — typed `serde_json` parse; failure keeps the raw text
//! 4. [`repair_key`] — rewrite mis-encoded table1 field identifiers
//!
//! The repair is a heuristic tied to one corruption pattern. Values are never
//! touched, only identifiers.

use crate::error::ExtractError;
use crate::output::{ExtractionResult, TechnicalParams};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use tracing::debug;

/// Parse a full-pass reply into an [`ExtractionResult`], repairing field keys.
pub fn normalize_extraction(raw: &str) -> Result<ExtractionResult, ExtractError> {
    let mut result: ExtractionResult = parse_json(raw)?;
    let repaired = repair_field_keys(&mut result);
    if repaired > 0 {
        debug!("Repaired {} mis-encoded table1 keys", repaired);
    }
    Ok(result)
}

/// Parse a refinement reply into [`TechnicalParams`].
pub fn normalize_technical(raw: &str) -> Result<TechnicalParams, ExtractError> {
    parse_json(raw)
}

/// Strip fences, trim, and deserialize `raw` as `T`.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, ExtractError> {
    let cleaned = clean_response(raw);
    serde_json::from_str(&cleaned).map_err(|e| ExtractError::MalformedResponse {
        detail: e.to_string(),
        raw: raw.to_string(),
    })
}

/// Steps 1–2: the text that is handed to the JSON parser.
pub fn clean_response(raw: &str) -> String {
    strip_code_fences(raw).trim().to_string()
}

// ── Step 1: code fences ─────────────────────────────────────────────────────

static RE_FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```[A-Za-z0-9_+-]*[ \t]*(?:\r?\n)?").unwrap());

static RE_FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\r?\n)?[ \t]*```\s*$").unwrap());

/// Remove one leading fence opener and one trailing fence closer.
///
/// Either marker may be missing; text without fences is returned unchanged.
pub fn strip_code_fences(input: &str) -> Cow<'_, str> {
    let opened = RE_FENCE_OPEN.replace(input, "");
    if !RE_FENCE_CLOSE.is_match(&opened) {
        return opened;
    }
    Cow::Owned(RE_FENCE_CLOSE.replace(&opened, "").into_owned())
}

// ── Step 4: key repair ──────────────────────────────────────────────────────

/// `Ø` (U+00D8, UTF-8 `C3 98`) decoded as Windows-1252.
const MOJIBAKE_DIAMETER: &str = "Ã˜";
/// The same bytes decoded as ISO-8859-1, where `0x98` is a C1 control.
const MOJIBAKE_DIAMETER_LATIN1: &str = "Ã\u{0098}";
/// Lead byte `C3` left behind when the continuation byte was dropped.
const MOJIBAKE_LEAD: char = 'Ã';

/// Rewrite known mis-encoded fragments of a key.
///
/// Keys without a corruption marker come back borrowed and unchanged.
pub fn repair_key(key: &str) -> Cow<'_, str> {
    if !key.contains(MOJIBAKE_LEAD) {
        return Cow::Borrowed(key);
    }
    let fixed = key
        .replace(MOJIBAKE_DIAMETER, "Ø")
        .replace(MOJIBAKE_DIAMETER_LATIN1, "Ø")
        .replace(MOJIBAKE_LEAD, "");
    Cow::Owned(fixed)
}

/// Rename every corrupted table1 identifier in place, keeping its value.
///
/// Returns the number of entries renamed.
pub fn repair_field_keys(result: &mut ExtractionResult) -> usize {
    let mut renamed = 0;
    for entry in &mut result.table1 {
        if let Cow::Owned(fixed) = repair_key(&entry.field) {
            debug!("Renaming table1 key {:?} → {:?}", entry.field, fixed);
            entry.field = fixed;
            renamed += 1;
        }
    }
    renamed
}
