pub mod chrome;
#[cfg(test)]
pub mod fake;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::DriverError;

pub use chrome::ChromeDriver;

/// How to find an element. Config strings prefixed `xpath:` (or starting with `/`)
/// are XPath, everything else is CSS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(s: &str) -> Self {
        Locator::Css(s.to_string())
    }

    pub fn xpath(s: &str) -> Self {
        Locator::XPath(s.to_string())
    }
}

impl FromStr for Locator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty locator".to_string());
        }
        if let Some(x) = s.strip_prefix("xpath:") {
            Ok(Locator::XPath(x.trim().to_string()))
        } else if let Some(c) = s.strip_prefix("css:") {
            Ok(Locator::Css(c.trim().to_string()))
        } else if s.starts_with('/') || s.starts_with("(/") {
            Ok(Locator::XPath(s.to_string()))
        } else {
            Ok(Locator::Css(s.to_string()))
        }
    }
}

impl TryFrom<String> for Locator {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Locator> for String {
    fn from(l: Locator) -> Self {
        l.to_string()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css:{}", s),
            Locator::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

/// The browser-automation capabilities the stages rely on. Reading text,
/// attributes and element lists happens on `page_source` snapshots.
pub trait Driver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Wait for the frame element and continue inside the document it embeds.
    fn enter_frame(&mut self, frame: &Locator, timeout: Duration) -> Result<(), DriverError>;

    fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Result<(), DriverError>;

    /// Wait until the element is present and clickable, then click it.
    fn click(&mut self, locator: &Locator, timeout: Duration) -> Result<(), DriverError>;

    fn options_text(&mut self, select: &Locator) -> Result<Vec<String>, DriverError>;

    fn choose_by_text(&mut self, select: &Locator, text: &str) -> Result<(), DriverError>;

    /// Clear an input and type `value` into it.
    fn fill(&mut self, input: &Locator, value: &str) -> Result<(), DriverError>;

    fn page_source(&mut self) -> Result<String, DriverError>;

    fn current_url(&self) -> String;
}

/// Everything a stage needs: one browser session, the settings and the
/// run's cancellation token.
pub struct ScrapeContext<D> {
    pub driver: D,
    pub settings: Arc<Settings>,
    cancel: CancellationToken,
}

impl<D: Driver> ScrapeContext<D> {
    pub fn new(driver: D, settings: Arc<Settings>, cancel: CancellationToken) -> Self {
        ScrapeContext {
            driver,
            settings,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<(), DriverError> {
        if self.is_cancelled() {
            Err(DriverError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep in short slices so an interrupt is noticed promptly.
    /// Returns `false` when the wait was cut short by cancellation.
    pub fn pause(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(100)));
        }
    }
}
