use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::json;
use tracing::{debug, info};

use super::{Driver, Locator};
use crate::error::DriverError;

const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(300);

const OPTIONS_JS: &str =
    "function() { return JSON.stringify(Array.from(this.options).map(o => o.text)); }";
const CHOOSE_JS: &str = "function(t) {
    for (const o of this.options) {
        if (o.text.trim() === t) {
            this.value = o.value;
            this.dispatchEvent(new Event('change', { bubbles: true }));
            return true;
        }
    }
    return false;
}";
const FILL_JS: &str = "function(v) {
    this.value = '';
    this.value = v;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
}";
const FRAME_SRC_JS: &str = "function() { return this.src; }";

/// A Chrome tab driven over the DevTools protocol.
pub struct ChromeDriver {
    // Dropping the browser closes the Chrome process.
    _browser: Browser,
    tab: Arc<Tab>,
    page_timeout: Duration,
}

impl ChromeDriver {
    pub fn launch(headless: bool, page_timeout: Duration) -> Result<Self, DriverError> {
        let options = LaunchOptions::default_builder()
            .headless(headless)
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(vec![OsStr::new("--log-level=3"), OsStr::new("--disable-gpu")])
            .build()
            .map_err(|e| DriverError::Browser(e.to_string()))?;

        let browser = Browser::new(options).map_err(|e| DriverError::Browser(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| DriverError::Browser(e.to_string()))?;
        tab.set_default_timeout(page_timeout);

        info!(headless, "Browser session started");
        Ok(ChromeDriver {
            _browser: browser,
            tab,
            page_timeout,
        })
    }

    fn find(&self, locator: &Locator) -> Result<Element<'_>, DriverError> {
        let found = match locator {
            Locator::Css(s) => self.tab.find_element(s),
            Locator::XPath(s) => self.tab.find_element_by_xpath(s),
        };
        found.map_err(|_| DriverError::NotFound(locator.to_string()))
    }

    fn wait(&self, locator: &Locator, timeout: Duration) -> Result<Element<'_>, DriverError> {
        let found = match locator {
            Locator::Css(s) => self.tab.wait_for_element_with_custom_timeout(s, timeout),
            Locator::XPath(s) => self.tab.wait_for_xpath_with_custom_timeout(s, timeout),
        };
        found.map_err(|_| DriverError::Timeout {
            what: locator.to_string(),
            after: timeout,
        })
    }

    fn call(
        element: &Element<'_>,
        function: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<Option<serde_json::Value>, DriverError> {
        element
            .call_js_fn(function, args, false)
            .map(|obj| obj.value)
            .map_err(|e| DriverError::Script(e.to_string()))
    }
}

impl Driver for ChromeDriver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        debug!(url, "navigate");
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| classify(e, url, self.page_timeout))
    }

    fn enter_frame(&mut self, frame: &Locator, timeout: Duration) -> Result<(), DriverError> {
        let src = {
            let element = self.wait(frame, timeout)?;
            Self::call(&element, FRAME_SRC_JS, vec![])?
                .and_then(|v| v.as_str().map(str::to_string))
                .filter(|s| !s.is_empty())
                .ok_or_else(|| DriverError::NotFound(format!("src of {}", frame)))?
        };
        self.navigate(&src)
    }

    fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Result<(), DriverError> {
        self.wait(locator, timeout).map(|_| ())
    }

    fn click(&mut self, locator: &Locator, timeout: Duration) -> Result<(), DriverError> {
        let element = self.wait(locator, timeout)?;
        element
            .click()
            .map(|_| ())
            .map_err(|e| DriverError::Browser(e.to_string()))
    }

    fn options_text(&mut self, select: &Locator) -> Result<Vec<String>, DriverError> {
        let element = self.find(select)?;
        let raw = Self::call(&element, OPTIONS_JS, vec![])?
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| DriverError::Script("select returned no options".into()))?;
        serde_json::from_str(&raw).map_err(|e| DriverError::Script(e.to_string()))
    }

    fn choose_by_text(&mut self, select: &Locator, text: &str) -> Result<(), DriverError> {
        let element = self.find(select)?;
        let chosen = Self::call(&element, CHOOSE_JS, vec![json!(text)])?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if chosen {
            Ok(())
        } else {
            Err(DriverError::NotFound(format!("option {:?} in {}", text, select)))
        }
    }

    fn fill(&mut self, input: &Locator, value: &str) -> Result<(), DriverError> {
        let element = self.find(input)?;
        Self::call(&element, FILL_JS, vec![json!(value)]).map(|_| ())
    }

    fn page_source(&mut self) -> Result<String, DriverError> {
        self.tab
            .get_content()
            .map_err(|e| DriverError::Browser(e.to_string()))
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }
}

fn classify(err: anyhow::Error, url: &str, after: Duration) -> DriverError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        DriverError::Timeout {
            what: format!("page {}", url),
            after,
        }
    } else {
        DriverError::Browser(msg)
    }
}
