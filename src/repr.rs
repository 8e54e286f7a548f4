//! Text and HTML summaries of group tables
//!
//! The layout follows the familiar labelled-array summary: a dimensions line,
//! then coordinates (marked `*`), data variables and a collapsed attribute
//! count. Long sections are cut after a configurable number of rows.

use crate::data_source::{ArrayEntry, GroupTable};
use crate::types::AttributeValue;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Row caps applied per section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReprLimits {
    pub text_max_rows: usize,
    pub markup_max_rows: usize,
}

impl Default for ReprLimits {
    fn default() -> Self {
        Self {
            text_max_rows: 1000,
            markup_max_rows: 12,
        }
    }
}

/// Human-readable byte count (`96B`, `1.2kB`, `3.4MB`).
pub fn format_size(bytes: usize) -> String {
    const UNITS: [&str; 5] = ["kB", "MB", "GB", "TB", "PB"];
    if bytes < 1000 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for candidate in UNITS {
        if value < 1000.0 {
            break;
        }
        value /= 1000.0;
        unit = candidate;
    }
    format!("{:.1}{}", value, unit)
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn dims_tuple(entry: &ArrayEntry) -> String {
    format!("({})", entry.dimensions.join(", "))
}

fn total_size(table: &GroupTable) -> usize {
    table
        .coordinates()
        .iter()
        .chain(table.data_vars())
        .fold(0usize, |acc, e| acc.saturating_add(e.size_bytes()))
}

fn dimensions_line(dimensions: &BTreeMap<String, usize>) -> String {
    let dims: Vec<String> = dimensions
        .iter()
        .map(|(name, len)| format!("{}: {}", name, len))
        .collect();
    format!("({})", dims.join(", "))
}

/// Plain-text summary of one table.
pub fn text_repr(table: &GroupTable, max_rows: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<GroupTable> Size: {}", format_size(total_size(table)));
    let _ = writeln!(out, "Dimensions:  {}", dimensions_line(table.dimensions()));

    let width = table
        .coordinates()
        .iter()
        .chain(table.data_vars())
        .map(|e| e.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(6);

    let sections: [(&str, &[ArrayEntry], &str); 2] = [
        ("Coordinates:", table.coordinates(), "  * "),
        ("Data variables:", table.data_vars(), "    "),
    ];
    for (title, entries, marker) in sections {
        if entries.is_empty() {
            let _ = writeln!(out, "{}\n    *empty*", title);
            continue;
        }
        let _ = writeln!(out, "{}", title);
        for entry in entries.iter().take(max_rows) {
            let marker = if marker == "  * " && !entry.is_dimension_coordinate() {
                "    "
            } else {
                marker
            };
            let _ = writeln!(
                out,
                "{}{:<width$} {} {} {}",
                marker,
                entry.name,
                dims_tuple(entry),
                entry.element_type,
                format_size(entry.size_bytes()),
                width = width
            );
        }
        if entries.len() > max_rows {
            let _ = writeln!(out, "    ... ({} more)", entries.len() - max_rows);
        }
    }

    let attrs = table.attributes();
    if !attrs.is_empty() {
        let _ = write!(out, "Attributes: ({})", attrs.len());
    } else {
        out.truncate(out.trim_end().len());
    }
    out
}

fn markup_rows(entries: &[ArrayEntry], max_rows: usize, coordinates: bool) -> String {
    let mut rows = String::new();
    for entry in entries.iter().take(max_rows) {
        let marker = if coordinates && entry.is_dimension_coordinate() {
            "*"
        } else {
            ""
        };
        let _ = write!(
            rows,
            "<tr><td class=\"sdv-marker\">{}</td><td class=\"sdv-name\">{}</td><td class=\"sdv-dims\">{}</td><td class=\"sdv-dtype\">{}</td><td class=\"sdv-size\">{}</td></tr>",
            marker,
            escape_html(&entry.name),
            escape_html(&dims_tuple(entry)),
            escape_html(&entry.element_type.tag()),
            format_size(entry.size_bytes())
        );
    }
    if entries.len() > max_rows {
        let _ = write!(
            rows,
            "<tr><td colspan=\"5\" class=\"sdv-more\">... ({} more)</td></tr>",
            entries.len() - max_rows
        );
    }
    rows
}

fn markup_attributes(attrs: &BTreeMap<String, AttributeValue>, max_rows: usize) -> String {
    let mut rows = String::new();
    for (key, value) in attrs.iter().take(max_rows) {
        let _ = write!(
            rows,
            "<dt>{}:</dt><dd>{}</dd>",
            escape_html(key),
            escape_html(&value.to_string())
        );
    }
    if attrs.len() > max_rows {
        let _ = write!(rows, "<dt>...</dt><dd>({} more)</dd>", attrs.len() - max_rows);
    }
    rows
}

/// HTML summary of one table, with collapsible sections.
pub fn markup_repr(table: &GroupTable, max_rows: usize) -> String {
    let dims: Vec<String> = table
        .dimensions()
        .iter()
        .map(|(name, len)| format!("<b>{}</b>: {}", escape_html(name), len))
        .collect();

    let mut out = String::from("<div class=\"sdv-wrap\">");
    let _ = write!(
        out,
        "<div class=\"sdv-header\">GroupTable <span class=\"sdv-size\">Size: {}</span></div>",
        format_size(total_size(table))
    );
    out.push_str("<ul class=\"sdv-sections\">");
    let _ = write!(
        out,
        "<li class=\"sdv-section\"><span>Dimensions:</span> ({})</li>",
        dims.join(", ")
    );
    let _ = write!(
        out,
        "<li class=\"sdv-section\"><details open><summary>Coordinates: ({})</summary><table>{}</table></details></li>",
        table.coordinates().len(),
        markup_rows(table.coordinates(), max_rows, true)
    );
    let _ = write!(
        out,
        "<li class=\"sdv-section\"><details open><summary>Data variables: ({})</summary><table>{}</table></details></li>",
        table.data_vars().len(),
        markup_rows(table.data_vars(), max_rows, false)
    );
    let _ = write!(
        out,
        "<li class=\"sdv-section\"><details><summary>Attributes: ({})</summary><dl>{}</dl></details></li>",
        table.attributes().len(),
        markup_attributes(table.attributes(), max_rows)
    );
    out.push_str("</ul></div>");
    out
}

/// Join per-group text summaries, each under a `Group: <path>` header.
pub fn join_text_groups<'a>(groups: impl Iterator<Item = (&'a str, String)>) -> String {
    let parts: Vec<String> = groups
        .map(|(path, repr)| format!("Group: {}\n\n{}\n\n", path, repr))
        .collect();
    parts.join(&format!("{}\n\n", "-".repeat(80)))
}

/// Join per-group HTML summaries, each after a `<p>Group: <path></p>` header.
pub fn join_markup_groups<'a>(groups: impl Iterator<Item = (&'a str, String)>) -> String {
    let parts: Vec<String> = groups
        .map(|(path, repr)| format!("<p>Group: {}</p><br><br>{}", escape_html(path), repr))
        .collect();
    parts.join("<br><br>")
}
