pub mod affairs;
pub mod header;
pub mod id;
pub mod matters;

use chrono::{DateTime, Local};
use scraper::Html;
use url::Url;

use crate::config::SessionLabels;
use crate::error::{Extracted, ExtractionError};
use crate::model::{Affair, SessionHeader, SessionRecord};

/// A field that could not be read, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    pub error: ExtractionError,
}

#[derive(Debug)]
pub struct ParsedSession {
    pub record: SessionRecord,
    pub issues: Vec<FieldIssue>,
}

/// Turn a session detail page into a record. Nothing on the page is
/// mandatory: every section and field that is missing becomes an issue.
pub fn parse_session(
    source: &str,
    url: &str,
    labels: &SessionLabels,
    scraped_at: DateTime<Local>,
) -> ParsedSession {
    let doc = Html::parse_document(source);
    let base = Url::parse(url).ok();
    let mut issues = Vec::new();

    let h = header::extract(&doc, labels);
    let header = SessionHeader {
        date: settle("header.date", h.date, &mut issues),
        start_time: settle("header.startTime", h.start_time, &mut issues),
        end_time: settle("header.endTime", h.end_time, &mut issues),
        starting_quorum: settle("header.startingQuorum", h.starting_quorum, &mut issues),
        next_session_date: settle("header.nextSessionDate", h.next_session_date, &mut issues),
        presiding_officer: settle("header.presidingOfficer", h.presiding_officer, &mut issues),
    };

    let matters_attended =
        settle("mattersAttended", matters::extract(&doc, labels), &mut issues).unwrap_or_default();

    let blocks = settle("affairs", affairs::blocks(&doc, labels), &mut issues).unwrap_or_default();
    let affairs = blocks
        .into_iter()
        .enumerate()
        .map(|(i, block)| {
            let affair_id = Affair::id_for(i + 1);
            let f = affairs::extract(block, labels, base.as_ref());
            let mut field = |name: &str, value| settle(&format!("{}.{}", affair_id, name), value, &mut issues);
            Affair {
                title: field("title", f.title),
                text: field("text", f.text),
                highlighted_remarks: field("highlightedRemarks", f.highlighted_remarks),
                last_action: field("lastAction", f.last_action),
                result: field("result", f.result),
                document_link: field("documentLink", f.document_link),
                publication_note: field("publicationNote", f.publication_note),
                affair_id,
            }
        })
        .collect();

    let session_id = id::derive_session_id(
        header.date.as_deref(),
        &labels.date_formats,
        scraped_at.date_naive(),
    );

    ParsedSession {
        record: SessionRecord {
            url: url.to_string(),
            session_id,
            scraped_at,
            header,
            matters_attended,
            affairs,
        },
        issues,
    }
}

fn settle<T>(field: &str, value: Extracted<T>, issues: &mut Vec<FieldIssue>) -> Option<T> {
    match value {
        Ok(v) => Some(v),
        Err(error) => {
            issues.push(FieldIssue {
                field: field.to_string(),
                error,
            });
            None
        }
    }
}
