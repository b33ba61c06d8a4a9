use scraper::{ElementRef, Html};
use url::Url;

use crate::config::SessionLabels;
use crate::error::{Extracted, ExtractionError};
use crate::html;

/// One affair block's fields, each found (or not) on its own.
#[derive(Debug)]
pub struct AffairFields {
    pub title: Extracted<String>,
    pub text: Extracted<String>,
    pub highlighted_remarks: Extracted<String>,
    pub last_action: Extracted<String>,
    pub result: Extracted<String>,
    pub document_link: Extracted<String>,
    pub publication_note: Extracted<String>,
}

/// Blocks of the affairs section in page order, navigation tables excluded.
pub fn blocks<'a>(doc: &'a Html, labels: &SessionLabels) -> Extracted<Vec<ElementRef<'a>>> {
    let heading = &labels.affairs_heading;
    let missing = || ExtractionError::SectionNotFound(heading.to_string());
    let cells = html::selector("td").ok_or_else(missing)?;

    let heading_cell = doc
        .select(&cells)
        .find(|td| html::own_text(*td) == *heading)
        .ok_or_else(missing)?;
    let body = html::nearest_ancestor(heading_cell, "tbody")
        .or_else(|| html::nearest_ancestor(heading_cell, "table"))
        .ok_or_else(missing)?;
    let content = html::children_named(body, "tr").last().ok_or_else(missing)?;

    Ok(html::children_named(content, "td")
        .flat_map(|td| html::children_named(td, "table"))
        .filter(|table| !is_navigation(*table, &labels.nav_image))
        .collect())
}

fn is_navigation(table: ElementRef<'_>, marker: &str) -> bool {
    html::descendants_named(table, "img")
        .any(|img| img.value().attr("src").is_some_and(|src| src.contains(marker)))
}

pub fn extract(block: ElementRef<'_>, labels: &SessionLabels, base: Option<&Url>) -> AffairFields {
    let title = first_cell(block, &labels.title_classes);
    let text = first_cell(block, std::slice::from_ref(&labels.text_class));
    let highlighted_remarks = labeled_value(block, &labels.remarks_label, &labels.value_class);
    let publication_note = labeled_value(block, &labels.publication_label, &labels.value_class);

    let (last_action, result) =
        match labeled_value(block, &labels.last_action_label, &labels.value_class) {
            Ok(value) => split_last_action(&value, &labels.result_label),
            Err(e) => (Err(e.clone()), Err(e)),
        };

    AffairFields {
        title,
        text,
        highlighted_remarks,
        last_action,
        result,
        document_link: document_link(block, labels, base),
        publication_note,
    }
}

/// First cell whose class attribute is one of `classes`.
fn first_cell(block: ElementRef<'_>, classes: &[String]) -> Extracted<String> {
    let cell = html::descendants_named(block, "td")
        .find(|td| classes.iter().any(|c| html::class_is(*td, c)))
        .ok_or_else(|| ExtractionError::NoMatch(format!("td.{}", classes.join("|td."))))?;
    non_empty(html::inner_text(cell), &classes.join("|"))
}

/// The value-class `font` that follows the `font` carrying `label`.
fn labeled_value(block: ElementRef<'_>, label: &str, value_class: &str) -> Extracted<String> {
    let label_font = html::descendants_named(block, "font")
        .find(|f| html::own_text(*f).contains(label))
        .ok_or_else(|| ExtractionError::LabelNotFound(label.to_string()))?;
    let value = label_font
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|s| s.value().name() == "font" && html::class_is(*s, value_class))
        .ok_or_else(|| ExtractionError::Empty(label.to_string()))?;
    non_empty(html::inner_text(value), label)
}

/// First line is the action; the first line holding the result label gives the result.
fn split_last_action(value: &str, result_label: &str) -> (Extracted<String>, Extracted<String>) {
    let mut lines = value.lines().map(str::trim).filter(|l| !l.is_empty());
    let action = lines
        .next()
        .map(str::to_string)
        .ok_or_else(|| ExtractionError::Empty("last action".into()));
    let result = value
        .lines()
        .find(|l| l.contains(result_label))
        .and_then(|l| l.rsplit(result_label).next())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ExtractionError::NoMatch(result_label.to_string()));
    (action, result)
}

/// The anchor labelled as the document, else the first anchor pointing at a
/// document file.
fn document_link(block: ElementRef<'_>, labels: &SessionLabels, base: Option<&Url>) -> Extracted<String> {
    let anchors: Vec<(ElementRef<'_>, &str)> = html::descendants_named(block, "a")
        .filter_map(|a| a.value().attr("href").map(|h| (a, h.trim())))
        .filter(|(_, h)| !h.is_empty())
        .collect();

    let labelled = anchors
        .iter()
        .find(|(a, _)| html::inner_text(*a).contains(&labels.document_label));
    let by_extension = || {
        anchors
            .iter()
            .find(|(_, href)| has_document_extension(href, &labels.document_extensions))
    };

    labelled
        .or_else(by_extension)
        .map(|(_, href)| html::absolute(base, href))
        .ok_or_else(|| ExtractionError::NoMatch("document link".into()))
}

fn has_document_extension(href: &str, extensions: &[String]) -> bool {
    let path = href
        .split(['?', '#'])
        .next()
        .unwrap_or(href)
        .to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| path.ends_with(&ext.to_ascii_lowercase()))
}

fn non_empty(text: String, what: &str) -> Extracted<String> {
    if text.is_empty() {
        Err(ExtractionError::Empty(what.to_string()))
    } else {
        Ok(text)
    }
}
