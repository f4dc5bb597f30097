//! Assembly detection and the corrective merge of its restricted
//! re-extraction.
//!
//! An order usually ships one assembly drawing whose bill of materials lists
//! the part numbers of the other drawings in the folder. BOM cells rarely
//! match file names exactly (`B_Rev2` vs `B`, `10009081-01` vs `10009081`),
//! so matching is deliberately loose: drop the `_Rev` marker, drop trailing
//! digits, then test containment in either direction.
//!
//! The tie-break is part of the observable output: the first item (in file
//! order) with any matching BOM entry wins, and with no evidence at all the
//! first item is treated as primary.

use crate::output::ExtractedItem;
use tracing::{debug, info};

/// Revision marker removed before comparing identifiers.
pub const REVISION_MARKER: &str = "_Rev";

/// Pick the assembly drawing of a batch.
///
/// Returns `None` only for an empty batch.
pub fn detect_assembly(items: &[ExtractedItem]) -> Option<String> {
    let first = items.first()?;
    if items.len() == 1 {
        return Some(first.part_number.clone());
    }

    for item in items {
        let matched = item
            .bom_part_numbers
            .iter()
            .find(|bom_ref| references_other_item(bom_ref, item, items));
        if let Some(bom_ref) = matched {
            debug!(
                "Assembly candidate {}: BOM entry '{}' matches another drawing",
                item.part_number, bom_ref
            );
            return Some(item.part_number.clone());
        }
    }

    info!(
        "No BOM entry matches another drawing; using {} as primary (low confidence)",
        first.part_number
    );
    Some(first.part_number.clone())
}

/// Does `bom_ref`, listed on `owner`, name any other item of the batch?
fn references_other_item(bom_ref: &str, owner: &ExtractedItem, items: &[ExtractedItem]) -> bool {
    items.iter().any(|other| {
        !other.part_number.is_empty()
            && other.part_number != owner.part_number
            && identifiers_match(bom_ref, &other.part_number)
    })
}

/// Loose identifier comparison used for BOM matching.
///
/// An identifier that trims down to nothing (all digits) contains-matches
/// everything; that is accepted as a known false positive of the heuristic.
pub fn identifiers_match(bom_ref: &str, part_number: &str) -> bool {
    part_number.contains(trim_identifier(bom_ref).as_str())
        || bom_ref.contains(trim_identifier(part_number).as_str())
}

/// `B_Rev2` → `B`, `MD-21-04683` → `MD-21-`.
fn trim_identifier(id: &str) -> String {
    id.replace(REVISION_MARKER, "")
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .to_string()
}

/// `true` for values that carry no surface treatment.
fn is_blank_treatment(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => v.is_empty() || v.eq_ignore_ascii_case("none"),
    }
}

/// Fold a restricted re-extraction into the assembly item(s) of a batch.
///
/// Only two fields change, and only towards more information:
/// * surface treatment is filled in when the original was empty or `None`
///   and the re-extraction found a real value;
/// * the BOM reference list is replaced when the re-extraction found one.
///
/// Returns the number of items updated.
pub fn apply_restricted_extraction(
    items: &mut [ExtractedItem],
    assembly_id: &str,
    restricted: &ExtractedItem,
) -> usize {
    let mut updated = 0;
    for item in items.iter_mut().filter(|i| i.part_number == assembly_id) {
        let new_surface = restricted.surface_treatment.as_deref();
        if !is_blank_treatment(new_surface) && is_blank_treatment(item.surface_treatment.as_deref())
        {
            item.surface_treatment = restricted.surface_treatment.clone();
        }
        if !restricted.bom_part_numbers.is_empty() {
            item.bom_part_numbers = restricted.bom_part_numbers.clone();
        }
        updated += 1;
    }
    updated
}
