//! Data model: extracted items, batch results, customer detection.
//!
//! Field names follow the JSON schema the model is asked to fill
//! (`partNumber`, `toleratedLengths`, `bomPartNumbers`, ...), so the
//! response body deserialises straight into [`ExtractedItem`].

use crate::error::FileError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A hole callout read from the drawing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hole {
    #[serde(default, deserialize_with = "lenient_count")]
    pub count: Option<u32>,
    /// `normal`, `tapped`, `reamed`, or whatever the model chose.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub diameter: Option<String>,
    #[serde(default)]
    pub thread_size: Option<String>,
    #[serde(default)]
    pub tolerance: Option<String>,
    #[serde(default)]
    pub depth: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A length dimension carrying an explicit tolerance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToleratedLength {
    #[serde(default)]
    pub dimension: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tolerance_type: Option<String>,
    #[serde(default)]
    pub upper_tolerance: Option<String>,
    #[serde(default)]
    pub lower_tolerance: Option<String>,
    #[serde(default)]
    pub related_feature: Option<String>,
}

/// The per-document extraction result.
///
/// `part_number` is the item identifier; the extractor sets it to the source
/// file stem regardless of what the model read from the title block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub part_number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub holes: Vec<Hole>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tolerated_lengths: Vec<ToleratedLength>,
    #[serde(default)]
    pub surface_treatment: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Part numbers listed in this drawing's bill of materials.
    #[serde(default, deserialize_with = "null_as_default")]
    pub bom_part_numbers: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub quantity: Option<u32>,
}

impl ExtractedItem {
    /// An empty item carrying only its identifier.
    pub fn new(part_number: impl Into<String>) -> Self {
        Self {
            part_number: part_number.into(),
            ..Default::default()
        }
    }
}

/// Models answer `null` for "nothing found" as often as they omit the key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Counts arrive as JSON numbers (`4`, `4.0`) or occasionally as strings.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().trim_end_matches(['x', 'X']).parse().ok(),
        _ => None,
    })
}

/// How sure the customer detector is about its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        })
    }
}

/// Customer label chosen for the batch, with the detector's reasoning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetection {
    pub customer_id: String,
    pub confidence: Confidence,
    pub reason: String,
}

impl CustomerDetection {
    /// Low-confidence fallback to the `base` configuration.
    pub fn base_fallback(reason: impl Into<String>) -> Self {
        Self {
            customer_id: crate::customer::BASE_CUSTOMER.to_string(),
            confidence: Confidence::Low,
            reason: reason.into(),
        }
    }

    /// A customer supplied by the caller rather than detected.
    pub fn provided(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            confidence: Confidence::High,
            reason: "Provided by caller".to_string(),
        }
    }
}

/// Aggregated result of one batch run.
///
/// `items` keeps input file-name order. `succeeded + failed` equals the
/// number of input files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub items: Vec<ExtractedItem>,
    pub succeeded: usize,
    pub failed: usize,
    /// One entry per failed file, in processing order.
    pub failures: Vec<FileError>,
    /// Part number of the detected assembly drawing.
    pub assembly: Option<String>,
    /// Customer the batch was extracted for.
    pub customer: Option<CustomerDetection>,
}

impl BatchResult {
    /// Look up an item by identifier.
    pub fn item(&self, part_number: &str) -> Option<&ExtractedItem> {
        self.items.iter().find(|i| i.part_number == part_number)
    }
}

/// A finished batch together with the XML file written for it.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutput {
    pub result: BatchResult,
    pub xml_path: PathBuf,
}
