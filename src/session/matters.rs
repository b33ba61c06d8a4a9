use scraper::{ElementRef, Html};

use crate::config::SessionLabels;
use crate::error::{Extracted, ExtractionError};
use crate::html;
use crate::model::MatterEntry;

/// One row of the matters table, classified by the class of its first cell.
#[derive(Debug, Clone, PartialEq)]
pub enum MatterRow {
    Group(String),
    Matter { name: String, count: String },
    Other,
}

pub fn extract(doc: &Html, labels: &SessionLabels) -> Extracted<Vec<MatterEntry>> {
    let table = matters_table(doc, &labels.matters_heading)?;
    let rows = html::descendants_named(table, "tr").map(|row| classify_row(row, labels));
    Ok(inherit_groups(rows))
}

/// Every matter takes the group of the closest group row above it.
pub fn inherit_groups<I>(rows: I) -> Vec<MatterEntry>
where
    I: IntoIterator<Item = MatterRow>,
{
    let (_, entries) = rows.into_iter().fold(
        (None::<String>, Vec::new()),
        |(group, mut entries), row| match row {
            MatterRow::Group(name) => (Some(name), entries),
            MatterRow::Matter { name, count } => {
                entries.push(MatterEntry {
                    group: group.clone(),
                    matter_name: name,
                    count,
                });
                (group, entries)
            }
            MatterRow::Other => (group, entries),
        },
    );
    entries
}

pub fn classify_row(row: ElementRef<'_>, labels: &SessionLabels) -> MatterRow {
    let cells: Vec<ElementRef<'_>> = html::children_named(row, "td").collect();
    let Some(&first) = cells.first() else {
        return MatterRow::Other;
    };

    let grouped = html::has_class(first, &labels.group_class) || first.value().attr("colspan") == Some("2");
    if grouped && cells.len() <= 2 {
        return MatterRow::Group(html::inner_text(first));
    }
    if html::has_class(first, &labels.item_class) && cells.len() >= 2 {
        return MatterRow::Matter {
            name: html::inner_text(first),
            count: html::inner_text(cells[1]),
        };
    }
    MatterRow::Other
}

/// The table that follows the one holding the section heading.
fn matters_table<'a>(doc: &'a Html, heading: &str) -> Extracted<ElementRef<'a>> {
    let missing = || ExtractionError::SectionNotFound(heading.to_string());
    let cells = html::selector("td").ok_or_else(missing)?;

    let mut cell = doc
        .select(&cells)
        .find(|td| html::inner_text(*td).contains(heading))
        .ok_or_else(missing)?;
    // Narrow down to the innermost cell carrying the heading.
    while let Some(inner) =
        html::descendants_named(cell, "td").find(|td| html::inner_text(*td).contains(heading))
    {
        cell = inner;
    }

    cell.ancestors()
        .filter_map(ElementRef::wrap)
        .filter(|a| a.value().name() == "table")
        .find_map(|table| html::next_sibling_named(table, "table"))
        .ok_or_else(missing)
}
