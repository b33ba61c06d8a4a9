use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// A legislative period as listed by the portal's selection widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub name: String,
    pub value: i64,
    pub start_date: String,
    pub end_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResolutionOutcome>,
}

impl Period {
    pub fn new(name: &str, value: i64, start_date: &str, end_date: &str) -> Self {
        Period {
            name: name.to_string(),
            value,
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
            data: None,
        }
    }

    pub fn links(&self) -> &[String] {
        match &self.data {
            Some(ResolutionOutcome::Resolved { links, .. }) => links,
            _ => &[],
        }
    }
}

/// What the link resolver recorded for a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ResolutionOutcome {
    #[serde(rename_all = "camelCase")]
    Resolved {
        legislatura: String,
        link_count: usize,
        expected_count: Option<usize>,
        all_links_present: bool,
        links: Vec<String>,
    },
    Skipped { reason: String },
    Error { kind: ErrorKind, message: String },
}

impl ResolutionOutcome {
    pub fn resolved(legislatura: &str, links: Vec<String>, expected_count: Option<usize>) -> Self {
        ResolutionOutcome::Resolved {
            legislatura: legislatura.to_string(),
            link_count: links.len(),
            expected_count,
            all_links_present: expected_count == Some(links.len()),
            links,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResolutionOutcome::Error { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHeader {
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub starting_quorum: Option<String>,
    pub next_session_date: Option<String>,
    pub presiding_officer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatterEntry {
    pub group: Option<String>,
    pub matter_name: String,
    pub count: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affair {
    pub affair_id: String,
    pub title: Option<String>,
    pub text: Option<String>,
    pub highlighted_remarks: Option<String>,
    pub last_action: Option<String>,
    pub result: Option<String>,
    pub document_link: Option<String>,
    pub publication_note: Option<String>,
}

impl Affair {
    /// `AFF` followed by the 1-based position zero-padded to three digits.
    pub fn id_for(position: usize) -> String {
        format!("AFF{:03}", position)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub url: String,
    pub session_id: String,
    pub scraped_at: DateTime<Local>,
    pub header: SessionHeader,
    pub matters_attended: Vec<MatterEntry>,
    pub affairs: Vec<Affair>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_flags_count_mismatch() {
        let links = vec!["a".to_string(), "b".to_string()];
        match ResolutionOutcome::resolved("LXIV", links.clone(), Some(2)) {
            ResolutionOutcome::Resolved { link_count, all_links_present, .. } => {
                assert_eq!(link_count, 2);
                assert!(all_links_present);
            }
            other => panic!("unexpected {:?}", other),
        }
        match ResolutionOutcome::resolved("LXIV", links.clone(), Some(3)) {
            ResolutionOutcome::Resolved { all_links_present, .. } => assert!(!all_links_present),
            other => panic!("unexpected {:?}", other),
        }
        match ResolutionOutcome::resolved("LXIV", links, None) {
            ResolutionOutcome::Resolved { all_links_present, .. } => assert!(!all_links_present),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn period_json_shape() {
        let mut p = Period::new("LXIV", 64, "01/09/2018", "31/08/2021");
        let plain = serde_json::to_value(&p).unwrap();
        assert_eq!(plain["startDate"], "01/09/2018");
        assert!(plain.get("data").is_none());

        p.data = Some(ResolutionOutcome::Skipped {
            reason: "not found in selector".into(),
        });
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["data"]["status"], "skipped");
        assert_eq!(v["data"]["reason"], "not found in selector");

        p.data = Some(ResolutionOutcome::resolved("LXIV", vec!["u".into()], Some(1)));
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["data"]["linkCount"], 1);
        assert_eq!(v["data"]["allLinksPresent"], true);
        let back: Period = serde_json::from_value(v).unwrap();
        assert_eq!(back.links(), ["u".to_string()]);
    }

    #[test]
    fn affair_ids_are_padded() {
        assert_eq!(Affair::id_for(1), "AFF001");
        assert_eq!(Affair::id_for(42), "AFF042");
        assert_eq!(Affair::id_for(1000), "AFF1000");
    }
}
