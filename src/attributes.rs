//! Flattening of a parsed header into rows for an attribute view.

use std::fmt::Write as _;

use dicom::core::VR;
use dicom::object::InMemDicomObject;
use dicom_dictionary_std::tags;
use regex::Regex;

use crate::dictionary::{display_name_for_tag, format_tag};
use crate::extractor::element_to_string;

/// Values longer than this many characters are shortened for display.
pub const MAX_VALUE_SIZE: usize = 256;

/// One attribute, or one item of a sequence attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub name: String,
    /// `(gggg, eeee)`, empty for sequence items
    pub tag: String,
    /// Display value, `None` for sequences and their items
    pub value: Option<String>,
    /// The untruncated value, kept for copying
    pub full_value: Option<String>,
    pub children: Vec<AttributeRow>,
}

/// Build the rows for every element of `object`.
///
/// Pixel data is left out. With a `filter`, only value rows whose name, tag
/// and value together match are kept, and sequences left without matching
/// items disappear.
pub fn attribute_rows(object: &InMemDicomObject, filter: Option<&Regex>) -> Vec<AttributeRow> {
    let mut rows = Vec::new();

    for element in object {
        let header = element.header();
        if header.tag == tags::PIXEL_DATA {
            continue;
        }

        let name = display_name_for_tag(header.tag);
        let tag = format_tag(header.tag);

        if header.vr == VR::SQ {
            let items: Vec<AttributeRow> = element
                .items()
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(i, item)| AttributeRow {
                    name: format!("{name} {i}"),
                    tag: String::new(),
                    value: None,
                    full_value: None,
                    children: attribute_rows(item, filter),
                })
                .filter(|item| filter.is_none() || !item.children.is_empty())
                .collect();

            if !items.is_empty() {
                rows.push(AttributeRow {
                    name,
                    tag,
                    value: None,
                    full_value: None,
                    children: items,
                });
            }
            continue;
        }

        let full = element_to_string(element).unwrap_or_default();
        let value = display_value(&full);

        let matches = filter.is_none_or(|regex| regex.is_match(&format!("{name}{tag}{value}")));
        if matches {
            rows.push(AttributeRow {
                name,
                tag,
                value: Some(value),
                full_value: Some(full),
                children: Vec::new(),
            });
        }
    }

    rows
}

fn display_value(full: &str) -> String {
    let value = match full.char_indices().nth(MAX_VALUE_SIZE) {
        Some((cut, _)) => format!("{}...", &full[..cut]),
        None => full.to_string(),
    };

    if value.contains(['\n', '\r']) {
        value.escape_debug().to_string()
    } else {
        value
    }
}

/// Render rows as indented text, one row per line.
pub fn render_rows(rows: &[AttributeRow]) -> String {
    let mut out = String::new();
    render_into(&mut out, rows, 0);
    out
}

fn render_into(out: &mut String, rows: &[AttributeRow], level: usize) {
    for row in rows {
        let indent = "  ".repeat(level);
        let _ = match &row.value {
            Some(value) => writeln!(out, "{indent}{} {} {}", row.name, row.tag, value),
            None if row.tag.is_empty() => writeln!(out, "{indent}{}", row.name),
            None => writeln!(out, "{indent}{} {}", row.name, row.tag),
        };
        render_into(out, &row.children, level + 1);
    }
}
