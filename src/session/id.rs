use chrono::NaiveDate;

/// `YYYYMMDD` of the session date, trying `formats` in order on the whole
/// value and then on each word of it. Falls back to `today` when nothing parses.
/// Two sessions on the same day share an id.
pub fn derive_session_id(date: Option<&str>, formats: &[String], today: NaiveDate) -> String {
    date.map(str::trim)
        .filter(|d| !d.is_empty())
        .and_then(|d| parse_date(d, formats))
        .unwrap_or(today)
        .format("%Y%m%d")
        .to_string()
}

fn parse_date(value: &str, formats: &[String]) -> Option<NaiveDate> {
    let try_all = |s: &str| {
        formats
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
    };
    try_all(value).or_else(|| {
        value
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|w| !w.is_empty())
            .find_map(try_all)
    })
}
