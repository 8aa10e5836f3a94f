//! Output types: the extracted tables and per-run statistics.
//!
//! The JSON shape of [`ExtractionResult`] (`table1` / `table2` / `table3`
//! and their entry keys) is consumed by downstream tools and must not drift.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured data extracted from one drawing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Dimension table plus the four technical parameters.
    pub table1: Vec<FieldValue>,
    /// Bill of materials, in drawing order.
    pub table2: Vec<BomRow>,
    /// Title-block information (CUSTOMER, PROJECT/LOCATION, …).
    pub table3: Vec<KeyValue>,
}

impl ExtractionResult {
    /// First table1 value for `field`, if present.
    pub fn field(&self, field: &str) -> Option<&str> {
        self.table1
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.value.as_str())
    }

    /// First table3 value for `label`, if present.
    pub fn info(&self, label: &str) -> Option<&str> {
        self.table3
            .iter()
            .find(|kv| kv.label == label)
            .map(|kv| kv.value.as_str())
    }
}

/// One `{"field": …, "value": …}` entry of table1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    #[serde(deserialize_with = "lenient_string")]
    pub field: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
}

impl FieldValue {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// One bill-of-materials row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomRow {
    #[serde(deserialize_with = "lenient_string")]
    pub pos: String,
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(deserialize_with = "lenient_string")]
    pub material: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub note: String,
}

/// A single-entry object such as `{"CUSTOMER": "ACME"}`.
///
/// Serialised as a one-key JSON map; any other key count is rejected on input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub label: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.label, &self.value)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for KeyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyValueVisitor;

        impl<'de> Visitor<'de> for KeyValueVisitor {
            type Value = KeyValue;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object with exactly one key")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<KeyValue, A::Error> {
                let Some(label) = map.next_key::<String>()? else {
                    return Err(de::Error::invalid_length(0, &self));
                };
                let value = map.next_value::<LenientString>()?.0;
                if map.next_key::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::custom(format!(
                        "entry '{label}' must be an object with exactly one key"
                    )));
                }
                Ok(KeyValue { label, value })
            }
        }

        deserializer.deserialize_map(KeyValueVisitor)
    }
}

/// Refinement-pass reply: the four technical parameters.
///
/// Missing keys default to empty strings; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicalParams {
    #[serde(rename = "DESIGN_TEMP", default, deserialize_with = "lenient_string")]
    pub design_temp: String,
    #[serde(rename = "DESIGN_PRESSURE", default, deserialize_with = "lenient_string")]
    pub design_pressure: String,
    #[serde(rename = "PRESSURE_TEST_BODY", default, deserialize_with = "lenient_string")]
    pub pressure_test_body: String,
    #[serde(rename = "PRESSURE_TEST_SEAT", default, deserialize_with = "lenient_string")]
    pub pressure_test_seat: String,
}

/// Identifiers of the technical parameters re-read by the refinement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TechnicalField {
    DesignTemp,
    DesignPressure,
    PressureTestBody,
    PressureTestSeat,
}

impl TechnicalField {
    pub const ALL: [TechnicalField; 4] = [
        TechnicalField::DesignTemp,
        TechnicalField::DesignPressure,
        TechnicalField::PressureTestBody,
        TechnicalField::PressureTestSeat,
    ];

    /// The table1 `field` identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            TechnicalField::DesignTemp => "DESIGN_TEMP",
            TechnicalField::DesignPressure => "DESIGN_PRESSURE",
            TechnicalField::PressureTestBody => "PRESSURE_TEST_BODY",
            TechnicalField::PressureTestSeat => "PRESSURE_TEST_SEAT",
        }
    }

    pub fn from_field(field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == field)
    }
}

impl fmt::Display for TechnicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TechnicalParams {
    pub fn get(&self, field: TechnicalField) -> &str {
        match field {
            TechnicalField::DesignTemp => &self.design_temp,
            TechnicalField::DesignPressure => &self.design_pressure,
            TechnicalField::PressureTestBody => &self.pressure_test_body,
            TechnicalField::PressureTestSeat => &self.pressure_test_seat,
        }
    }

    pub fn set(&mut self, field: TechnicalField, value: impl Into<String>) {
        let slot = match field {
            TechnicalField::DesignTemp => &mut self.design_temp,
            TechnicalField::DesignPressure => &mut self.design_pressure,
            TechnicalField::PressureTestBody => &mut self.pressure_test_body,
            TechnicalField::PressureTestSeat => &mut self.pressure_test_seat,
        };
        *slot = value.into();
    }

    /// True when no parameter was found.
    pub fn is_empty(&self) -> bool {
        TechnicalField::ALL.iter().all(|f| self.get(*f).is_empty())
    }
}

// ── Pipeline state & stats ──────────────────────────────────────────────────

/// States of the two-pass extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassState {
    Start,
    FullPassPending,
    FullPassDone,
    RefinementPending,
    Merged,
    MergedWithWarning,
}

/// Figures for one model pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    /// DPI the pass asked for.
    pub requested_dpi: u32,
    /// DPI actually rendered, after the pixel cap.
    pub dpi: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Model calls made, including retries.
    pub attempts: u32,
}

/// Figures for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub full_pass: PassStats,
    /// `None` when refinement was disabled or failed.
    pub refinement_pass: Option<PassStats>,
    /// table1 entries overwritten by the refinement pass.
    pub fields_refined: usize,
    pub total_duration_ms: u64,
}

/// Everything returned by a successful extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub result: ExtractionResult,
    /// `Merged`, `MergedWithWarning`, or `FullPassDone` when refinement is off.
    pub final_state: PassState,
    /// Why the refinement pass was skipped, when it was.
    pub warning: Option<String>,
    pub stats: ExtractionStats,
}

// ── Lenient scalar strings ──────────────────────────────────────────────────

/// Accept a JSON string, number, bool or `null` where a string is expected.
///
/// Models regularly answer `"pos": 1` or `"note": null`; both are
/// unambiguous, so they are taken as `"1"` and `""`.
pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    LenientString::deserialize(d).map(|s| s.0)
}

struct LenientString(String);

impl<'de> Deserialize<'de> for LenientString {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct LenientVisitor;

        impl<'de> Visitor<'de> for LenientVisitor {
            type Value = LenientString;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string, number, boolean or null")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LenientString, E> {
                Ok(LenientString(v.to_string()))
            }
            fn visit_string<E: de::Error>(self, v: String) -> Result<LenientString, E> {
                Ok(LenientString(v))
            }
            fn visit_i64<E: de::Error>(self, v: i64) -> Result<LenientString, E> {
                Ok(LenientString(v.to_string()))
            }
            fn visit_u64<E: de::Error>(self, v: u64) -> Result<LenientString, E> {
                Ok(LenientString(v.to_string()))
            }
            fn visit_f64<E: de::Error>(self, v: f64) -> Result<LenientString, E> {
                Ok(LenientString(v.to_string()))
            }
            fn visit_bool<E: de::Error>(self, v: bool) -> Result<LenientString, E> {
                Ok(LenientString(v.to_string()))
            }
            fn visit_unit<E: de::Error>(self) -> Result<LenientString, E> {
                Ok(LenientString(String::new()))
            }
            fn visit_none<E: de::Error>(self) -> Result<LenientString, E> {
                Ok(LenientString(String::new()))
            }
        }

        d.deserialize_any(LenientVisitor)
    }
}
