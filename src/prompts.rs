//! Instructions sent to the VLM for each extraction pass.
//!
//! Every prompt lives here so extraction quality can be tuned without
//! touching rendering, retry or merge code. Callers can still override a pass
//! through [`crate::config::ExtractionConfig::full_prompt`] and
//! [`crate::config::ExtractionConfig::technical_prompt`].
//!
//! The JSON layouts embedded below are the contract the normaliser parses:
//! renaming a key here without updating [`crate::output`] breaks extraction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One request/response cycle against the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pass {
    /// Whole drawing: all three tables.
    Full,
    /// Cropped bottom-left zone: the four technical parameters only.
    TechnicalParams,
}

impl Pass {
    pub fn as_str(self) -> &'static str {
        match self {
            Pass::Full => "full",
            Pass::TechnicalParams => "technical-params",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Pass::Full),
            "technical-params" | "technical" | "tech" => Ok(Pass::TechnicalParams),
            other => Err(format!(
                "unknown pass '{other}' (expected 'full' or 'technical-params')"
            )),
        }
    }
}

/// Built-in instruction for `pass`.
pub fn prompt_for(pass: Pass) -> &'static str {
    match pass {
        Pass::Full => FULL_DRAWING_PROMPT,
        Pass::TechnicalParams => TECHNICAL_PARAMS_PROMPT,
    }
}

/// Full-drawing pass: dimension table, bill of materials and title block.
pub const FULL_DRAWING_PROMPT: &str = r#"Extract data from this engineering drawing and return ONLY a valid JSON object.

CRITICAL: Your ENTIRE response must be ONLY valid JSON. No explanations, no markdown, no text before or after.

Extract these three tables:

**Table 1** (top-right dimensions table + technical parameters from bottom-left):

Part A - Dimensions table (top-right corner):
- Headers: SIZE(inch), ASME, ENDS, L, Ød, ØF, H, WEIGHT
- Extract the VALUES from the row below these headers

Part B - Technical specifications (BOTTOM-LEFT corner, inside text block):
Look for the section labeled "TECHNICAL REMARKS AND CONSTRUCTION DETAIL" or similar.
Inside this text block, extract:
- DESIGN_TEMP: Look for "DESIGN TEMPERATURE" followed by temperature range (e.g., "-40°C/0°C..+100°C/+200°C" or "-40°F..+200°F")
- DESIGN_PRESSURE: Look for "DESIGN PRESSURE" followed by pressure value
- PRESSURE_TEST_BODY: Look for "PRESSURE TEST" then "BODY" or "SHELL" followed by "HYDROSTATIC" and a number with bar/psi (e.g., "153.06 bar")
- PRESSURE_TEST_SEAT: Look for "PRESSURE TEST" then "SEAT" followed by "HYDROSTATIC" and a number with bar/psi (e.g., "112.3 bar")

If any of these fields are not found in the drawing, return empty string "".

**Table 2** (right-side Bill of Materials):
- Headers: Pos, Description, Material, Note
- Extract ALL rows from this table (usually 30-50 rows), top to bottom
- If "Note" column is empty, use empty string ""

**Table 3** (bottom-right information block):
- Extract: CUSTOMER, PROJECT/LOCATION, EPC/END USER, P.O. No, TAG No, ECV JOB No, ITEM, VALVE D.S., DOC No

Return JSON in this EXACT structure:

{
  "table1": [
    {"field": "SIZE", "value": "12\""},
    {"field": "ASME", "value": "600"},
    {"field": "ENDS", "value": "RTJ"},
    {"field": "L", "value": "841"},
    {"field": "Ød", "value": "305"},
    {"field": "ØF", "value": "559"},
    {"field": "H", "value": "385~"},
    {"field": "WEIGHT", "value": "1200~"},
    {"field": "DESIGN_TEMP", "value": "-40°C/0°C..+100°C/+200°C"},
    {"field": "DESIGN_PRESSURE", "value": "...or empty string"},
    {"field": "PRESSURE_TEST_BODY", "value": "153.06 bar"},
    {"field": "PRESSURE_TEST_SEAT", "value": "112.3 bar"}
  ],
  "table2": [
    {"pos": "1", "description": "Body", "material": "ASTM A350 LF2 CL1", "note": ""},
    {"pos": "2", "description": "Body End", "material": "...", "note": "..."}
  ],
  "table3": [
    {"CUSTOMER": "value"},
    {"PROJECT/LOCATION": "value"},
    {"EPC/END USER": "value"},
    {"P.O. No": "value"},
    {"TAG No": "value"},
    {"ECV JOB No": "value"},
    {"ITEM": "value"},
    {"VALVE D.S.": "value"},
    {"DOC No": "value"}
  ]
}

IMPORTANT:
- Keep exact values including special characters (~, ", etc.)
- Preserve all text exactly as shown including units (bar, psi, °C, °F)
- If a field is not found in the drawing, use empty string ""
- For pressure test values, include both value AND unit (e.g., "153.06 bar" not just "153.06")
- Every table3 entry is an object with exactly ONE key
- DO NOT add any text outside the JSON object"#;

/// Refinement pass over the cropped technical-remarks zone.
pub const TECHNICAL_PARAMS_PROMPT: &str = r#"Extract ONLY the technical parameters from this section of an engineering drawing.

Look for these specific fields in the text block labeled "TECHNICAL REMARKS AND CONSTRUCTION DETAIL":

1. DESIGN TEMPERATURE - Look for line starting with "DESIGN TEMPERATURE:" followed by temperature range
2. DESIGN PRESSURE - Look for line starting with "DESIGN PRESSURE:" followed by pressure values
3. PRESSURE TEST BODY - Look for "PRESSURE TEST:" then "-BODY - HYDROSTATIC" followed by value
4. PRESSURE TEST SEAT - Look for "PRESSURE TEST:" then "-SEAT - HYDROSTATIC" followed by value

Return ONLY a valid JSON object with these exact fields:

{
  "DESIGN_TEMP": "value from drawing or empty string",
  "DESIGN_PRESSURE": "value from drawing or empty string",
  "PRESSURE_TEST_BODY": "value from drawing or empty string",
  "PRESSURE_TEST_SEAT": "value from drawing or empty string"
}

IMPORTANT:
- Include units (°C, °F, bar, psi, etc.) in the values
- If a field is not found, use empty string ""
- Return ONLY the JSON object, no markdown, no explanations"#;
