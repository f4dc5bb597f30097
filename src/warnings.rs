//! Operator warnings for the shop floor.
//!
//! Each item gets at most one combined message listing the features that
//! need extra machining care:
//!
//! ```text
//! Nabewerking: 4x M6, M8 (6H) tapgat, 2x O20 H9, 40 tol
//! ```
//!
//! Tapped holes are grouped by thread size (plus tolerance) and ordered by
//! M-size; toleranced holes and toleranced lengths keep first-seen order.

use crate::output::{ExtractedItem, Hole, ToleratedLength};
use once_cell::sync::Lazy;
use regex::Regex;

pub const WARNING_PREFIX: &str = "Nabewerking: ";

static RE_M_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"M(\d+)").unwrap());
static RE_ANY_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Ordered multiset: keys keep their first-seen position.
#[derive(Default)]
struct Tally {
    entries: Vec<(String, u32)>,
}

impl Tally {
    fn add(&mut self, key: String, count: u32) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += count,
            None => self.entries.push((key, count)),
        }
    }

    fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(key, count)| {
                if *count > 1 {
                    format!("{count}x {key}")
                } else {
                    key.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn is_tapped(hole: &Hole) -> bool {
    hole.kind.as_deref() == Some("tapped")
}

fn hole_count(hole: &Hole) -> u32 {
    hole.count.filter(|c| *c > 0).unwrap_or(1)
}

fn thread_sort_key(key: &str) -> u64 {
    RE_M_SIZE
        .captures(key)
        .and_then(|c| c.get(1))
        .or_else(|| RE_ANY_NUMBER.find(key))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// `4x M6, 2x M8 (6H)`
fn group_tapped_holes(holes: &[&Hole]) -> String {
    let mut tally = Tally::default();
    for hole in holes {
        let size = hole
            .thread_size
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown");
        let key = match hole.tolerance.as_deref() {
            Some(tol) if !tol.is_empty() && tol != "None" => format!("{size} ({tol})"),
            _ => size.to_string(),
        };
        tally.add(key, hole_count(hole));
    }
    // Stable sort: equal M-sizes keep first-seen order.
    tally.entries.sort_by_key(|(key, _)| thread_sort_key(key));
    tally.render()
}

/// `2x O20 H9, O40 +0.6/+0.1`
fn group_hole_tolerances(holes: &[&Hole]) -> String {
    let mut tally = Tally::default();
    for hole in holes {
        let dia = hole.diameter.as_deref().unwrap_or("?");
        let key = match hole.tolerance.as_deref() {
            Some(tol) if !tol.is_empty() => format!("O{dia} {tol}"),
            _ => format!("O{dia}"),
        };
        tally.add(key, hole_count(hole));
    }
    tally.render()
}

/// `2x 40, 25.5`
fn group_lengths(lengths: &[&ToleratedLength]) -> String {
    let mut tally = Tally::default();
    for length in lengths {
        tally.add(length.dimension.clone().unwrap_or_else(|| "?".into()), 1);
    }
    tally.render()
}

/// The combined warning for one item, if any feature needs one.
pub fn operator_warning(item: &ExtractedItem) -> Option<String> {
    let mut parts = Vec::new();

    let tapped: Vec<&Hole> = item.holes.iter().filter(|h| is_tapped(h)).collect();
    if !tapped.is_empty() {
        parts.push(format!("{} tapgat", group_tapped_holes(&tapped)));
    }

    let toleranced: Vec<&Hole> = item
        .holes
        .iter()
        .filter(|h| !is_tapped(h))
        .filter(|h| h.tolerance.as_deref() != Some("None") && has_text(&h.tolerance))
        .collect();
    if !toleranced.is_empty() {
        parts.push(group_hole_tolerances(&toleranced));
    }

    let lengths: Vec<&ToleratedLength> = item
        .tolerated_lengths
        .iter()
        .filter(|t| t.tolerance_type.as_deref() != Some("parenthesized"))
        .filter(|t| has_text(&t.upper_tolerance) || has_text(&t.lower_tolerance))
        .collect();
    if !lengths.is_empty() {
        parts.push(format!("{} tol", group_lengths(&lengths)));
    }

    if parts.is_empty() {
        None
    } else {
        Some(format!("{WARNING_PREFIX}{}", parts.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tapped(count: u32, size: &str, tol: Option<&str>) -> Hole {
        Hole {
            count: Some(count),
            kind: Some("tapped".into()),
            thread_size: Some(size.into()),
            tolerance: tol.map(String::from),
            ..Default::default()
        }
    }

    fn normal(count: u32, dia: &str, tol: Option<&str>) -> Hole {
        Hole {
            count: Some(count),
            kind: Some("normal".into()),
            diameter: Some(dia.into()),
            tolerance: tol.map(String::from),
            ..Default::default()
        }
    }

    fn length(dim: &str, upper: Option<&str>, kind: Option<&str>) -> ToleratedLength {
        ToleratedLength {
            dimension: Some(dim.into()),
            upper_tolerance: upper.map(String::from),
            tolerance_type: kind.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn nothing_to_warn_about() {
        let item = ExtractedItem {
            holes: vec![normal(2, "8", None), normal(1, "10", Some("None"))],
            ..ExtractedItem::new("P")
        };
        assert_eq!(operator_warning(&item), None);
    }

    #[test]
    fn tapped_holes_grouped_and_sorted_by_m_size() {
        let item = ExtractedItem {
            holes: vec![
                tapped(2, "M10", None),
                tapped(2, "M6", None),
                tapped(2, "M6", Some("None")),
                tapped(1, "M8", Some("6H")),
            ],
            ..ExtractedItem::new("P")
        };
        assert_eq!(
            operator_warning(&item).as_deref(),
            Some("Nabewerking: 4x M6, M8 (6H), 2x M10 tapgat")
        );
    }

    #[test]
    fn combined_message_order() {
        let item = ExtractedItem {
            holes: vec![
                normal(1, "20", Some("H9")),
                tapped(4, "M6", None),
                normal(1, "20", Some("H9")),
            ],
            tolerated_lengths: vec![
                length("40", Some("+0.2"), None),
                length("(12)", Some("+1"), Some("parenthesized")),
                length("40", Some("+0.1"), Some("symmetric")),
                length("25.5", None, None),
            ],
            ..ExtractedItem::new("P")
        };
        assert_eq!(
            operator_warning(&item).as_deref(),
            Some("Nabewerking: 4x M6 tapgat, 2x O20 H9, 2x 40 tol")
        );
    }

    #[test]
    fn missing_counts_default_to_one() {
        let hole = Hole {
            kind: Some("tapped".into()),
            thread_size: None,
            ..Default::default()
        };
        let item = ExtractedItem {
            holes: vec![hole.clone(), hole],
            ..ExtractedItem::new("P")
        };
        assert_eq!(
            operator_warning(&item).as_deref(),
            Some("Nabewerking: 2x Unknown tapgat")
        );
    }

    #[test]
    fn missing_diameter_and_dimension_render_as_question_mark() {
        let hole = Hole {
            diameter: None,
            ..normal(2, "", Some("H7"))
        };
        let dim = ToleratedLength {
            dimension: None,
            ..length("", Some("+0.1"), None)
        };
        let item = ExtractedItem {
            holes: vec![hole],
            tolerated_lengths: vec![dim],
            ..ExtractedItem::new("P")
        };
        assert_eq!(
            operator_warning(&item).as_deref(),
            Some("Nabewerking: 2x O? H7, ? tol")
        );
    }
}
