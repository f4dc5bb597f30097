//! Post-processing: turn the model's reply into finished items.
//!
//! The reply is supposed to be bare JSON, but models still wrap it in
//! Markdown fences now and then, prepend a BOM, or answer with the items
//! array instead of the `{"items": [...]}` object. After parsing, every
//! item gets the file stem as part number and its surface treatment is
//! normalised, including the per-customer corrections.

use crate::error::BackendError;
use crate::output::ExtractedItem;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// Rademaker finish codes that mean "no treatment".
const RADEMAKER_NO_FINISH: [&str; 3] = ["CR_FINISH_2B", "CR_FINISH_2D", "BA_FINISH"];

const RADEMAKER_SEE_REMARKS: [&str; 2] = ["see remark(s) on drawing", "see remarks on drawing"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reply {
    Object {
        #[serde(default)]
        items: Option<Vec<ExtractedItem>>,
    },
    Array(Vec<ExtractedItem>),
}

static RE_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Remove a wrapping ```` ```json ```` fence, a BOM and surrounding space.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim_start_matches('\u{feff}').trim();
    match RE_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => trimmed,
    }
}

/// Parse the reply body into items.
pub fn parse_items(body: &str) -> Result<Vec<ExtractedItem>, BackendError> {
    let json = strip_code_fences(body);
    if json.is_empty() {
        return Err(BackendError::EmptyResponse);
    }
    let reply: Reply =
        serde_json::from_str(json).map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
    Ok(match reply {
        Reply::Object { items } => items.unwrap_or_default(),
        Reply::Array(items) => items,
    })
}

/// Trim; blank becomes absent.
pub fn normalize_surface_treatment(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Customer-specific surface-treatment corrections.
pub fn apply_customer_fixes(customer_id: &str, value: Option<String>, restricted: bool) -> Option<String> {
    let value = value?;
    if !customer_id.eq_ignore_ascii_case("rademaker") {
        return Some(value);
    }

    let lower = value.to_lowercase();
    if restricted && RADEMAKER_SEE_REMARKS.contains(&lower.as_str()) {
        return Some("Finish (see remarks on drawing)".to_string());
    }
    if RADEMAKER_NO_FINISH
        .iter()
        .any(|code| value.eq_ignore_ascii_case(code))
    {
        return Some("None".to_string());
    }
    Some(value)
}

/// Stamp the part number and clean up surface treatments in place.
pub fn finish_items(items: &mut [ExtractedItem], part_number: &str, customer_id: &str, restricted: bool) {
    for item in items.iter_mut() {
        item.part_number = part_number.to_string();
        let normalized = normalize_surface_treatment(item.surface_treatment.as_deref());
        item.surface_treatment = apply_customer_fixes(customer_id, normalized, restricted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let body = "```json\n{\"items\": []}\n```";
        assert_eq!(strip_code_fences(body), "{\"items\": []}");
    }

    #[test]
    fn strips_bare_fence_and_bom() {
        let body = "\u{feff}```\n[1]\n```\n";
        assert_eq!(strip_code_fences(body), "[1]");
    }

    #[test]
    fn leaves_plain_json_alone() {
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn parses_items_object() {
        let body = r#"{"items": [{"partNumber": "X", "material": "S235",
                     "holes": [{"count": 4, "type": "tapped", "threadSize": "M6"}],
                     "bomPartNumbers": ["A", "B"]}]}"#;
        let items = parse_items(body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].material.as_deref(), Some("S235"));
        assert_eq!(items[0].holes[0].count, Some(4));
        assert_eq!(items[0].bom_part_numbers.len(), 2);
    }

    #[test]
    fn parses_bare_array_and_missing_items() {
        assert_eq!(parse_items(r#"[{"material": "RVS"}]"#).unwrap().len(), 1);
        assert!(parse_items(r#"{"items": null}"#).unwrap().is_empty());
        assert!(parse_items("{}").unwrap().is_empty());
    }

    #[test]
    fn empty_and_garbage_bodies_fail() {
        assert_eq!(parse_items("  ").unwrap_err(), BackendError::EmptyResponse);
        assert!(matches!(
            parse_items("Sorry, I cannot read this drawing."),
            Err(BackendError::InvalidResponse(_))
        ));
    }

    #[test]
    fn surface_treatment_normalisation() {
        assert_eq!(normalize_surface_treatment(Some("  Verzinkt ")).as_deref(), Some("Verzinkt"));
        assert_eq!(normalize_surface_treatment(Some("   ")), None);
        assert_eq!(normalize_surface_treatment(None), None);
    }

    #[test]
    fn rademaker_finish_codes_mean_none() {
        for code in ["CR_FINISH_2B", "cr_finish_2d", "BA_FINISH"] {
            assert_eq!(
                apply_customer_fixes("rademaker", Some(code.into()), false).as_deref(),
                Some("None")
            );
        }
        assert_eq!(
            apply_customer_fixes("elten", Some("BA_FINISH".into()), false).as_deref(),
            Some("BA_FINISH")
        );
    }

    #[test]
    fn rademaker_remarks_only_rewritten_for_assembly() {
        let v = Some("See remarks on drawing".to_string());
        assert_eq!(
            apply_customer_fixes("rademaker", v.clone(), true).as_deref(),
            Some("Finish (see remarks on drawing)")
        );
        assert_eq!(
            apply_customer_fixes("rademaker", v, false).as_deref(),
            Some("See remarks on drawing")
        );
    }

    #[test]
    fn finish_items_overrides_part_number() {
        let mut items = vec![ExtractedItem {
            surface_treatment: Some(" CR_FINISH_2B ".into()),
            ..ExtractedItem::new("whatever-the-model-read")
        }];
        finish_items(&mut items, "10009081", "rademaker", false);
        assert_eq!(items[0].part_number, "10009081");
        assert_eq!(items[0].surface_treatment.as_deref(), Some("None"));
    }
}
