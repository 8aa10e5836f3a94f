//! Pipeline stages for drawing extraction.
//!
//! Each submodule implements one step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//!                  ┌─ 300 DPI ───────────────▶ encode ─▶ llm ─▶ normalize ─┐
//! input ─▶ render ─┤                                                        ├─▶ merge
//!                  └─ 600 DPI ─▶ crop ───────▶ encode ─▶ llm ─▶ normalize ─┘
//! ```
//!
//! 1. [`input`]     — canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]    — rasterise page 1 via pdfium on the blocking pool
//! 3. [`crop`]      — cut the technical-parameters zone by bounding fractions
//! 4. [`encode`]    — PNG-encode and base64-wrap the image
//! 5. [`llm`]       — the model call, with timeout and bounded retry
//! 6. [`normalize`] — fences, typed JSON parse, key repair
//! 7. [`merge`]     — fold refinement values into table1

pub mod crop;
pub mod encode;
pub mod input;
pub mod llm;
pub mod merge;
pub mod normalize;
pub mod render;
