use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::model::SessionRecord;

pub const HEADERS_SHEET: &str = "Session_Headers";
pub const MATTERS_SHEET: &str = "Matters_Attended";
pub const AFFAIRS_SHEET: &str = "Affairs";

/// A sheet's worth of rows; `None` cells are left blank.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub sheet: &'static str,
    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<Option<String>>>,
}

/// The three tables of a session workbook. Every row is tagged with the
/// session id and source URL.
pub fn session_tables(record: &SessionRecord) -> Vec<Table> {
    let tag = || {
        vec![
            Some(record.session_id.clone()),
            Some(record.url.clone()),
        ]
    };
    let h = &record.header;

    let mut header_row = tag();
    header_row.extend([
        h.date.clone(),
        h.start_time.clone(),
        h.end_time.clone(),
        h.starting_quorum.clone(),
        h.next_session_date.clone(),
        h.presiding_officer.clone(),
        Some(record.scraped_at.to_rfc3339()),
    ]);

    let matter_rows = record
        .matters_attended
        .iter()
        .map(|m| {
            let mut row = tag();
            row.extend([m.group.clone(), Some(m.matter_name.clone()), Some(m.count.clone())]);
            row
        })
        .collect();

    let affair_rows = record
        .affairs
        .iter()
        .map(|a| {
            let mut row = tag();
            row.extend([
                Some(a.affair_id.clone()),
                a.title.clone(),
                a.text.clone(),
                a.highlighted_remarks.clone(),
                a.last_action.clone(),
                a.result.clone(),
                a.document_link.clone(),
                a.publication_note.clone(),
            ]);
            row
        })
        .collect();

    vec![
        Table {
            sheet: HEADERS_SHEET,
            columns: &[
                "session_id",
                "url",
                "date",
                "start_time",
                "end_time",
                "starting_quorum",
                "next_session",
                "presiding_officer",
                "scraped_at",
            ],
            rows: vec![header_row],
        },
        Table {
            sheet: MATTERS_SHEET,
            columns: &["session_id", "url", "group", "matter_name", "count"],
            rows: matter_rows,
        },
        Table {
            sheet: AFFAIRS_SHEET,
            columns: &[
                "session_id",
                "url",
                "affair_id",
                "title",
                "text",
                "highlighted_remarks",
                "last_action",
                "result",
                "document_link",
                "publication_note",
            ],
            rows: affair_rows,
        },
    ]
}

/// Write each table to its own sheet, header row in bold.
pub fn write_workbook(path: &Path, tables: &[Table]) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    for table in tables {
        let sheet = workbook.add_worksheet();
        sheet.set_name(table.sheet)?;
        for (c, name) in table.columns.iter().enumerate() {
            sheet.write_string_with_format(0, c as u16, *name, &bold)?;
        }
        for (r, row) in table.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if let Some(value) = cell {
                    sheet.write_string(r as u32 + 1, c as u16, value)?;
                }
            }
        }
        sheet.autofit();
    }

    workbook.save(path)
}
