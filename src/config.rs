use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::browser::Locator;
use crate::retry::RetryPolicy;

const DEFAULT_CONFIG_FILE: &str = "sil_scraper.toml";
const PORTAL_BASE: &str = "https://sil.gobernacion.gob.mx/portal/ReporteSesion";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub headless: bool,
    pub data_dir: PathBuf,
    pub targets: Vec<Target>,
    pub timeouts: Timeouts,
    pub request_delay_ms: u64,
    pub retry: RetryPolicy,
    pub portal: PortalSelectors,
    pub session: SessionLabels,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            headless: true,
            data_dir: PathBuf::from("data"),
            targets: vec![Target::chamber("senadores"), Target::chamber("diputados")],
            timeouts: Timeouts::default(),
            request_delay_ms: 2000,
            retry: RetryPolicy::default(),
            portal: PortalSelectors::default(),
            session: SessionLabels::default(),
        }
    }
}

impl Settings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn periods_path(&self, target: &Target) -> PathBuf {
        self.data_dir.join(&target.periods_file)
    }

    pub fn output_dir(&self, target: &Target) -> PathBuf {
        self.data_dir.join(&target.output_dir)
    }

    /// Targets matching `name`, or all of them when no name is given.
    pub fn select_targets(&self, name: Option<&str>) -> Result<Vec<Target>> {
        let Some(name) = name else {
            return Ok(self.targets.clone());
        };
        let found: Vec<Target> = self
            .targets
            .iter()
            .filter(|t| t.name == name)
            .cloned()
            .collect();
        if found.is_empty() {
            let known: Vec<&str> = self.targets.iter().map(|t| t.name.as_str()).collect();
            anyhow::bail!("unknown target {:?} (configured: {})", name, known.join(", "));
        }
        Ok(found)
    }
}

/// One portal to harvest, e.g. a chamber of congress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub url: String,
    pub periods_file: String,
    pub output_dir: String,
}

impl Target {
    fn chamber(name: &str) -> Self {
        Target {
            name: name.to_string(),
            url: format!("{}/{}", PORTAL_BASE, name),
            periods_file: format!("{}.json", name),
            output_dir: format!("{}/sessions", name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub frame_ms: u64,
    pub reveal_ms: u64,
    pub form_ms: u64,
    pub results_ms: u64,
    pub settle_ms: u64,
    pub page_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            frame_ms: 10_000,
            reveal_ms: 10_000,
            form_ms: 10_000,
            results_ms: 15_000,
            settle_ms: 2_000,
            page_ms: 10_000,
        }
    }
}

impl Timeouts {
    pub fn frame(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }
    pub fn reveal(&self) -> Duration {
        Duration::from_millis(self.reveal_ms)
    }
    pub fn form(&self) -> Duration {
        Duration::from_millis(self.form_ms)
    }
    pub fn results(&self) -> Duration {
        Duration::from_millis(self.results_ms)
    }
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
    pub fn page(&self) -> Duration {
        Duration::from_millis(self.page_ms)
    }
}

/// Where things live on the search portal. Locators drive the browser;
/// plain strings are CSS selectors applied to a page snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSelectors {
    pub frame: Locator,
    pub reveal_button: Locator,
    pub period_select: Locator,
    pub start_date_input: Locator,
    pub end_date_input: Locator,
    pub submit_button: Locator,
    pub results_ready: Locator,
    pub result_count_cell: String,
    pub result_links: String,
    pub period_pattern: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        PortalSelectors {
            frame: Locator::css("iframe"),
            reveal_button: Locator::xpath(
                "/html/body/p/table/tbody/tr/td[2]/table[3]/tbody/tr[1]/td/button",
            ),
            period_select: Locator::css("select[name='LEGISLATURA']"),
            start_date_input: Locator::xpath(
                "/html/body/form/table/tbody/tr[8]/td/table[2]/tbody/tr/td[1]/input",
            ),
            end_date_input: Locator::xpath(
                "/html/body/form/table/tbody/tr[8]/td/table[2]/tbody/tr/td[5]/input",
            ),
            submit_button: Locator::xpath("/html/body/form/table/tbody/tr[10]/td/button[1]"),
            results_ready: Locator::xpath("/html/body/table[2]/tbody/tr[1]/td[2]"),
            result_count_cell:
                "body > table:nth-of-type(2) > tbody > tr:nth-of-type(1) > td:nth-of-type(2)"
                    .to_string(),
            result_links: "a[href]".to_string(),
            period_pattern:
                r"Legislaturas\[\d+\]=new Legislatura\('([^']+)','([^']+)','(\d+)','([^']+)'\);"
                    .to_string(),
        }
    }
}

/// Labels, headings and classes of the session detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLabels {
    pub ready: Locator,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub starting_quorum: String,
    pub next_session: String,
    pub presiding_officer: String,
    pub matters_heading: String,
    pub group_class: String,
    pub item_class: String,
    pub affairs_heading: String,
    pub nav_image: String,
    pub title_classes: Vec<String>,
    pub text_class: String,
    pub value_class: String,
    pub remarks_label: String,
    pub last_action_label: String,
    pub result_label: String,
    pub publication_label: String,
    pub document_label: String,
    pub document_extensions: Vec<String>,
    pub date_formats: Vec<String>,
}

impl Default for SessionLabels {
    fn default() -> Self {
        SessionLabels {
            ready: Locator::css("table"),
            date: "Fecha".into(),
            start_time: "Inicia".into(),
            end_time: "Termina".into(),
            starting_quorum: "Quórum de inicio".into(),
            next_session: "Próxima sesión".into(),
            presiding_officer: "Presidió".into(),
            matters_heading: "ASUNTOS ATENDIDOS".into(),
            group_class: "tdcriterio".into(),
            item_class: "simpletextli".into(),
            affairs_heading: "ASUNTOS".into(),
            nav_image: "principio.jpg".into(),
            title_classes: vec!["simpletextmayor".into(), "simpletextmayor2".into()],
            text_class: "simpletextmayor2".into(),
            value_class: "simpletextmayor2".into(),
            remarks_label: "Aspectos Relevantes".into(),
            last_action_label: "Último Trámite:".into(),
            result_label: "Resultado:".into(),
            publication_label: "Publicación en la Gaceta Parlamentaria".into(),
            document_label: "Ver archivo".into(),
            document_extensions: vec![".pdf".into(), ".doc".into(), ".docx".into()],
            date_formats: vec!["%d/%m/%Y".into(), "%m/%d/%Y".into(), "%Y-%m-%d".into()],
        }
    }
}

/// Defaults, then the TOML file, then `SIL_*` environment variables.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let file = match path {
        Some(p) => File::from(p).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let settings: Settings = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("SIL")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .context("failed to read configuration")?
        .try_deserialize()
        .context("invalid configuration")?;

    if settings.targets.is_empty() {
        anyhow::bail!("configuration lists no targets");
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_both_chambers() {
        let s = Settings::default();
        let names: Vec<&str> = s.targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["senadores", "diputados"]);
        assert_eq!(
            s.targets[0].url,
            "https://sil.gobernacion.gob.mx/portal/ReporteSesion/senadores"
        );
        assert_eq!(s.periods_path(&s.targets[1]), PathBuf::from("data/diputados.json"));
        assert_eq!(s.retry.max_attempts, 1);
    }

    #[test]
    fn results_wait_targets_the_count_cell() {
        // The search form is laid out with tables too, so a bare `table`
        // would match before the results arrive.
        let portal = PortalSelectors::default();
        assert_eq!(
            portal.results_ready,
            Locator::xpath("/html/body/table[2]/tbody/tr[1]/td[2]")
        );
        assert_ne!(portal.results_ready, Locator::css("table"));
    }

    #[test]
    fn toml_overrides_are_partial() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            f,
            "headless = false\nrequest_delay_ms = 500\n\n[timeouts]\npage_ms = 3000\n\n[session]\ndate = \"Date\""
        )
        .unwrap();

        let s = load(Some(f.path())).unwrap();
        assert!(!s.headless);
        assert_eq!(s.request_delay(), Duration::from_millis(500));
        assert_eq!(s.timeouts.page(), Duration::from_secs(3));
        assert_eq!(s.timeouts.results_ms, 15_000);
        assert_eq!(s.session.date, "Date");
        assert_eq!(s.session.affairs_heading, "ASUNTOS");
        assert_eq!(s.targets.len(), 2);
    }

    #[test]
    fn unknown_target_is_rejected() {
        let s = Settings::default();
        assert_eq!(s.select_targets(None).unwrap().len(), 2);
        assert_eq!(s.select_targets(Some("diputados")).unwrap()[0].name, "diputados");
        assert!(s.select_targets(Some("camara")).is_err());
    }
}
