use scraper::{ElementRef, Html};

use crate::config::SessionLabels;
use crate::error::{Extracted, ExtractionError};
use crate::html;

/// Header cells as found on the page, each with its own outcome.
#[derive(Debug)]
pub struct HeaderFields {
    pub date: Extracted<String>,
    pub start_time: Extracted<String>,
    pub end_time: Extracted<String>,
    pub starting_quorum: Extracted<String>,
    pub next_session_date: Extracted<String>,
    pub presiding_officer: Extracted<String>,
}

pub fn extract(doc: &Html, labels: &SessionLabels) -> HeaderFields {
    HeaderFields {
        date: labeled_cell(doc, &labels.date),
        start_time: labeled_cell(doc, &labels.start_time),
        end_time: labeled_cell(doc, &labels.end_time),
        starting_quorum: labeled_cell(doc, &labels.starting_quorum),
        next_session_date: labeled_cell(doc, &labels.next_session),
        presiding_officer: labeled_cell(doc, &labels.presiding_officer),
    }
}

/// Text of the cell right of the first table cell that starts with `label`.
pub fn labeled_cell(doc: &Html, label: &str) -> Extracted<String> {
    let Some(rows) = html::selector("table tr") else {
        return Err(ExtractionError::LabelNotFound(label.to_string()));
    };
    for row in doc.select(&rows) {
        let mut cells = html::children_named(row, "td");
        let Some(first) = cells.next() else {
            continue;
        };
        if holds_table(first) || !label_matches(&html::inner_text(first), label) {
            continue;
        }
        let value = cells
            .next()
            .map(html::inner_text)
            .unwrap_or_default();
        return if value.is_empty() {
            Err(ExtractionError::Empty(label.to_string()))
        } else {
            Ok(value)
        };
    }
    Err(ExtractionError::LabelNotFound(label.to_string()))
}

fn holds_table(cell: ElementRef<'_>) -> bool {
    html::descendants_named(cell, "table").next().is_some()
}

/// `text` starts with `label` and the label is not the prefix of a longer word.
fn label_matches(text: &str, label: &str) -> bool {
    match text.trim().strip_prefix(label) {
        Some(rest) => !rest.chars().next().is_some_and(char::is_alphanumeric),
        None => false,
    }
}
