//! Scripted in-memory portal used by the stage tests.

use std::collections::HashMap;
use std::time::Duration;

use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;

use super::{Driver, Locator};
use crate::error::DriverError;

/// Serves canned pages by URL. Clicking a registered locator navigates to
/// its route; `{choice}` in a route is replaced by the chosen option.
#[derive(Default)]
pub struct FakeDriver {
    pub pages: HashMap<String, String>,
    pub routes: HashMap<Locator, String>,
    /// URLs that fail this many more times before loading.
    pub flaky: HashMap<String, usize>,
    pub current: String,
    pub chosen: Option<String>,
    pub filled: Vec<(Locator, String)>,
    pub visits: Vec<String>,
    /// Loading this URL fires the token and then fails, the way an
    /// interrupt that also reaches the browser process does.
    pub crash: Option<(String, CancellationToken)>,
}

impl FakeDriver {
    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn route(mut self, locator: Locator, url: &str) -> Self {
        self.routes.insert(locator, url.to_string());
        self
    }

    pub fn crash_on(mut self, url: &str, token: &CancellationToken) -> Self {
        self.crash = Some((url.to_string(), token.clone()));
        self
    }

    fn html(&self) -> Html {
        Html::parse_document(self.pages.get(&self.current).map_or("", |s| s.as_str()))
    }

    fn exists(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Css(css) => Selector::parse(css)
                .map(|sel| self.html().select(&sel).next().is_some())
                .unwrap_or(false),
            Locator::XPath(_) => self.routes.contains_key(locator),
        }
    }

    fn select_options(&self, locator: &Locator) -> Vec<String> {
        let Locator::Css(css) = locator else {
            return Vec::new();
        };
        let html = self.html();
        let Ok(sel) = Selector::parse(&format!("{} option", css)) else {
            return Vec::new();
        };
        html.select(&sel)
            .map(|o| o.text().collect::<String>())
            .collect()
    }
}

impl Driver for FakeDriver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.visits.push(url.to_string());
        if let Some((at, token)) = &self.crash {
            if at == url {
                token.cancel();
                return Err(DriverError::Browser("connection closed".into()));
            }
        }
        if let Some(left) = self.flaky.get_mut(url) {
            if *left > 0 {
                *left -= 1;
                return Err(DriverError::Timeout {
                    what: format!("page {}", url),
                    after: Duration::from_millis(1),
                });
            }
        }
        if !self.pages.contains_key(url) {
            return Err(DriverError::Timeout {
                what: format!("page {}", url),
                after: Duration::from_millis(1),
            });
        }
        self.current = url.to_string();
        Ok(())
    }

    fn enter_frame(&mut self, frame: &Locator, _timeout: Duration) -> Result<(), DriverError> {
        let src = {
            let Locator::Css(css) = frame else {
                return Err(DriverError::NotFound(frame.to_string()));
            };
            let sel = Selector::parse(css).map_err(|_| DriverError::NotFound(frame.to_string()))?;
            self.html()
                .select(&sel)
                .next()
                .and_then(|e| e.value().attr("src").map(str::to_string))
                .ok_or_else(|| DriverError::Timeout {
                    what: frame.to_string(),
                    after: Duration::from_millis(1),
                })?
        };
        self.navigate(&src)
    }

    fn wait_for(&mut self, locator: &Locator, _timeout: Duration) -> Result<(), DriverError> {
        if self.exists(locator) {
            Ok(())
        } else {
            Err(DriverError::Timeout {
                what: locator.to_string(),
                after: Duration::from_millis(1),
            })
        }
    }

    fn click(&mut self, locator: &Locator, timeout: Duration) -> Result<(), DriverError> {
        self.wait_for(locator, timeout)?;
        if let Some(route) = self.routes.get(locator).cloned() {
            let target = route.replace("{choice}", self.chosen.as_deref().unwrap_or(""));
            self.navigate(&target)?;
        }
        Ok(())
    }

    fn options_text(&mut self, select: &Locator) -> Result<Vec<String>, DriverError> {
        if !self.exists(select) {
            return Err(DriverError::NotFound(select.to_string()));
        }
        Ok(self.select_options(select))
    }

    fn choose_by_text(&mut self, select: &Locator, text: &str) -> Result<(), DriverError> {
        if self
            .select_options(select)
            .iter()
            .any(|o| o.trim() == text)
        {
            self.chosen = Some(text.to_string());
            Ok(())
        } else {
            Err(DriverError::NotFound(format!("option {:?}", text)))
        }
    }

    fn fill(&mut self, input: &Locator, value: &str) -> Result<(), DriverError> {
        if !self.exists(input) {
            return Err(DriverError::NotFound(input.to_string()));
        }
        self.filled.push((input.clone(), value.to_string()));
        Ok(())
    }

    fn page_source(&mut self) -> Result<String, DriverError> {
        self.pages
            .get(&self.current)
            .cloned()
            .ok_or_else(|| DriverError::Browser("no page loaded".into()))
    }

    fn current_url(&self) -> String {
        self.current.clone()
    }
}
