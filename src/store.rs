use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StageError;
use crate::export;
use crate::model::{Period, SessionRecord};

const ARTIFACT_PREFIX: &str = "session_";

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StageError + '_ {
    move |source| StageError::Io {
        path: path.display().to_string(),
        source,
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StageError> {
    let raw = fs::read_to_string(path).map_err(io_err(path))?;
    serde_json::from_str(&raw).map_err(|source| StageError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Write to a temp file next to `path`, then rename over it, so readers
/// never see a half-written file.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StageError> {
    let tmp = temp_beside(path)?;
    {
        let mut out = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut out, value).map_err(|source| StageError::Json {
            path: path.display().to_string(),
            source,
        })?;
        out.flush().map_err(io_err(path))?;
    }
    tmp.persist(path).map_err(|e| io_err(path)(e.error))?;
    Ok(())
}

fn temp_beside(path: &Path) -> Result<NamedTempFile, StageError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err(&dir))?;
    NamedTempFile::new_in(&dir).map_err(io_err(path))
}

pub fn read_periods(path: &Path) -> Result<Vec<Period>, StageError> {
    read_json(path)
}

pub fn write_periods(path: &Path, periods: &[Period]) -> Result<(), StageError> {
    write_json(path, periods)
}

/// One directory of per-session artifacts: `session_<id>.xlsx` with the
/// three tables and `session_<id>.json` with the record. The JSON file is
/// written last and marks the session as done.
pub struct SessionStore {
    dir: PathBuf,
}

#[derive(Deserialize)]
struct Marker {
    url: String,
}

impl SessionStore {
    pub fn open(dir: &Path) -> Result<Self, StageError> {
        fs::create_dir_all(dir).map_err(io_err(dir))?;
        Ok(SessionStore {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn workbook_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}.xlsx", ARTIFACT_PREFIX, sanitize(session_id)))
    }

    pub fn record_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}.json", ARTIFACT_PREFIX, sanitize(session_id)))
    }

    /// Persist one session. Returns the workbook path.
    pub fn save(&self, record: &SessionRecord) -> Result<PathBuf, StageError> {
        let workbook = self.workbook_path(&record.session_id);
        let marker = self.record_path(&record.session_id);

        if let Ok(previous) = read_json::<Marker>(&marker) {
            if previous.url != record.url {
                warn!(
                    session_id = %record.session_id,
                    previous = %previous.url,
                    url = %record.url,
                    "Session id collision, overwriting earlier artifact"
                );
            }
        }

        let tmp = temp_beside(&workbook)?;
        export::write_workbook(tmp.path(), &export::session_tables(record)).map_err(|source| {
            StageError::Workbook {
                path: workbook.display().to_string(),
                source,
            }
        })?;
        tmp.persist(&workbook).map_err(|e| io_err(&workbook)(e.error))?;

        write_json(&marker, record)?;
        debug!(path = %workbook.display(), "Session saved");
        Ok(workbook)
    }

    /// URLs that already have a finished artifact in this directory.
    pub fn completed_urls(&self) -> Result<HashSet<String>, StageError> {
        let mut done = HashSet::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let path = entry.map_err(io_err(&self.dir))?.path();
            let is_marker = path.extension().is_some_and(|e| e == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(ARTIFACT_PREFIX));
            if !is_marker {
                continue;
            }
            match read_json::<Marker>(&path) {
                Ok(m) => {
                    done.insert(m.url);
                }
                Err(e) => warn!("Ignoring unreadable artifact: {}", e),
            }
        }
        Ok(done)
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResolutionOutcome, SessionHeader};
    use chrono::Local;

    fn record(url: &str, id: &str) -> SessionRecord {
        SessionRecord {
            url: url.into(),
            session_id: id.into(),
            scraped_at: Local::now(),
            header: SessionHeader::default(),
            matters_attended: vec![],
            affairs: vec![],
        }
    }

    #[test]
    fn periods_round_trip_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/senadores.json");
        let mut periods = vec![Period::new("LXV", 65, "a", "b")];
        write_periods(&path, &periods).unwrap();

        periods[0].data = Some(ResolutionOutcome::resolved("LXV", vec!["u1".into()], Some(1)));
        write_periods(&path, &periods).unwrap();

        let back = read_periods(&path).unwrap();
        assert_eq!(back, periods);
        // No temp files left behind.
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn bad_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        fs::write(&path, "[{").unwrap();
        let err = read_periods(&path).unwrap_err();
        assert!(err.to_string().contains("p.json"));
    }

    #[test]
    fn saved_sessions_are_completed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(&dir.path().join("out")).unwrap();
        assert!(store.completed_urls().unwrap().is_empty());

        let path = store.save(&record("https://s/1", "20230315")).unwrap();
        store.save(&record("https://s/2", "20230316")).unwrap();
        assert!(path.ends_with("session_20230315.xlsx"));
        assert!(store.record_path("20230315").exists());

        fs::write(store.dir().join("notes.json"), "{}").unwrap();
        fs::write(store.dir().join("session_broken.json"), "nope").unwrap();

        let done = store.completed_urls().unwrap();
        assert_eq!(done.len(), 2);
        assert!(done.contains("https://s/1"));
        assert!(done.contains("https://s/2"));
    }

    #[test]
    fn colliding_ids_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        store.save(&record("https://s/1", "20230315")).unwrap();
        store.save(&record("https://s/2", "20230315")).unwrap();

        let done = store.completed_urls().unwrap();
        assert_eq!(done.len(), 1);
        assert!(done.contains("https://s/2"));
    }

    #[test]
    fn ids_are_safe_file_names() {
        assert_eq!(sanitize("15/03/2023"), "15-03-2023");
        assert_eq!(sanitize("20230315"), "20230315");
    }
}
