//! XML serialization of a batch result.
//!
//! The output is consumed by the order-entry system, so the layout is fixed:
//! two-space indentation, `\n` line endings, elements omitted when empty
//! (except `Description`, which is always present). Serialization is a pure
//! function of the items, so an unchanged result always yields the same
//! bytes.

use crate::error::ExtractError;
use crate::output::{BatchResult, ExtractedItem};
use crate::warnings::operator_warning;
use quick_xml::escape::escape;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// `PDF_XML_<folder>.xml`
pub fn output_file_name(batch_folder: &Path) -> String {
    let name = batch_folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "batch".to_string());
    format!("PDF_XML_{name}.xml")
}

fn text_element(out: &mut String, indent: &str, tag: &str, value: &str) {
    let _ = writeln!(out, "{indent}<{tag}>{}</{tag}>", escape(value));
}

fn optional_element(out: &mut String, indent: &str, tag: &str, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        text_element(out, indent, tag, v);
    }
}

fn write_item(out: &mut String, item: &ExtractedItem) {
    out.push_str("    <Item>\n");

    optional_element(out, "      ", "PartNumber", Some(&item.part_number));
    text_element(out, "      ", "Description", item.description.as_deref().unwrap_or(""));
    if let Some(q) = item.quantity {
        let _ = writeln!(out, "      <Quantity>{q}</Quantity>");
    }
    optional_element(out, "      ", "Material", item.material.as_deref());
    optional_element(out, "      ", "SurfaceTreatment", item.surface_treatment.as_deref());

    if !item.holes.is_empty() {
        out.push_str("      <Holes>\n");
        for hole in &item.holes {
            let mut attrs = Vec::new();
            if let Some(c) = hole.count {
                attrs.push(format!("count=\"{c}\""));
            }
            let text_attrs = [
                ("type", hole.kind.as_deref()),
                ("diameter", hole.diameter.as_deref()),
                ("threadSize", hole.thread_size.as_deref()),
                ("tolerance", hole.tolerance.as_deref()),
            ];
            for (name, value) in text_attrs {
                if let Some(v) = value.filter(|v| !v.is_empty()) {
                    attrs.push(format!("{name}=\"{}\"", escape(v)));
                }
            }
            let _ = writeln!(out, "        <Hole {}/>", attrs.join(" "));
        }
        out.push_str("      </Holes>\n");
    }

    if !item.tolerated_lengths.is_empty() {
        out.push_str("      <ToleratedLengths>\n");
        for t in &item.tolerated_lengths {
            out.push_str("        <ToleratedLength>\n");
            optional_element(out, "          ", "Dimension", t.dimension.as_deref());
            optional_element(out, "          ", "Type", t.tolerance_type.as_deref());
            optional_element(out, "          ", "Upper", t.upper_tolerance.as_deref());
            optional_element(out, "          ", "Lower", t.lower_tolerance.as_deref());
            optional_element(out, "          ", "Notes", t.notes.as_deref());
            out.push_str("        </ToleratedLength>\n");
        }
        out.push_str("      </ToleratedLengths>\n");
    }

    if let Some(message) = operator_warning(item) {
        out.push_str("      <PDF_Warnings>\n");
        text_element(out, "        ", "Message", &message);
        out.push_str("      </PDF_Warnings>\n");
    }

    out.push_str("    </Item>\n");
}

/// Render the whole batch.
pub fn serialize(result: &BatchResult) -> String {
    let mut out = String::with_capacity(256 + result.items.len() * 512);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<Order>\n");
    out.push_str("  <Items>\n");
    for item in &result.items {
        write_item(&mut out, item);
    }
    out.push_str("  </Items>\n");
    out.push_str("</Order>\n");
    out
}

/// Write `xml` to `dir/file_name` atomically: a temp file in the same
/// directory is persisted over the target.
pub fn write_atomic(dir: &Path, file_name: &str, xml: &str) -> Result<PathBuf, ExtractError> {
    let target = dir.join(file_name);
    let write_err = |source: std::io::Error| ExtractError::OutputWriteFailed {
        path: target.clone(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(write_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(xml.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(&target).map_err(|e| write_err(e.error))?;

    info!("Wrote {} ({} bytes)", target.display(), xml.len());
    Ok(target)
}
