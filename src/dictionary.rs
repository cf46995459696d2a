//! Keyword lookups for column headers and attribute access.
//!
//! Standard keywords resolve through the DICOM standard data dictionary.
//! The derived keywords of [`ExtraKeyword`] are layered on top so that a
//! series summary row can mix real attributes and computed values.

use dicom::core::Tag;
use dicom::core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom_dictionary_std::StandardDataDictionary;

use crate::enums::ExtraKeyword;

/// Keywords of the default columns in the series list.
pub const SERIES_LIST_COLUMNS: [&str; 6] = [
    "SeriesInstanceUID",
    "SeriesNumber",
    "NumImages",
    "PatientName",
    "SeriesDescription",
    "StudyDescription",
];

/// Column names of the attribute view.
pub const ATTR_TREE_COLUMNS: [&str; 3] = ["Name", "Tag", "Value"];

/// Resolve a standard keyword to its tag.
pub fn tag_for_keyword(keyword: &str) -> Option<Tag> {
    if ExtraKeyword::from_keyword(keyword).is_some() {
        return None;
    }
    StandardDataDictionary.by_name(keyword).map(|entry| entry.tag())
}

/// Standard keyword of `tag`, if the dictionary knows it.
pub fn keyword_for_tag(tag: Tag) -> Option<String> {
    StandardDataDictionary
        .by_tag(tag)
        .map(|entry| entry.alias().to_string())
}

/// Whether `keyword` names either a standard attribute or a derived value.
pub fn is_known_keyword(keyword: &str) -> bool {
    ExtraKeyword::from_keyword(keyword).is_some() || tag_for_keyword(keyword).is_some()
}

/// Human readable name for a keyword, used for column headers.
///
/// Derived keywords have fixed names; standard keywords are split into
/// words (`PatientName` becomes `Patient Name`).
pub fn display_name(keyword: &str) -> Option<String> {
    if let Some(extra) = ExtraKeyword::from_keyword(keyword) {
        return Some(extra.display_name().to_string());
    }
    tag_for_keyword(keyword).map(|_| split_keyword(keyword))
}

/// Display name for an element tag, falling back to the formatted tag.
pub fn display_name_for_tag(tag: Tag) -> String {
    keyword_for_tag(tag)
        .map(|keyword| split_keyword(&keyword))
        .unwrap_or_else(|| format_tag(tag))
}

/// Format a tag as `(gggg, eeee)`.
pub fn format_tag(tag: Tag) -> String {
    format!("({:04x}, {:04x})", tag.group(), tag.element())
}

fn split_keyword(keyword: &str) -> String {
    let chars: Vec<char> = keyword.chars().collect();
    let mut out = String::with_capacity(keyword.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            // "SeriesInstanceUID" keeps the acronym together, "UIDValue" splits before "Value"
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                out.push(' ');
            }
        }
        out.push(c);
    }

    out
}
