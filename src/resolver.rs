use std::fmt;
use std::sync::Arc;

use scraper::Html;
use tracing::{info, warn};
use url::Url;

use crate::browser::{Driver, ScrapeContext};
use crate::config::{PortalSelectors, Target};
use crate::error::{DriverError, StageError};
use crate::html;
use crate::model::{Period, ResolutionOutcome};

pub const NOT_IN_SELECTOR: &str = "not found in selector";

/// Progress of one period through the search form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStage {
    NotStarted,
    FrameEntered,
    SelectorLocated,
    Matched,
    FormFilled,
    Submitted,
    ResultsLoaded,
    Resolved,
    Skipped,
}

impl fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveOptions {
    /// Re-attempt periods whose recorded outcome is an error.
    pub redo_failed: bool,
}

#[derive(Debug, Default)]
pub struct ResolveReport {
    pub attempted: usize,
    pub resolved: usize,
    pub skipped: usize,
    pub errors: usize,
    pub mismatched: usize,
    pub links: usize,
    pub interrupted: bool,
}

impl ResolveReport {
    pub fn print(&self, target: &str) {
        println!(
            "{}: {} periods attempted ({} resolved, {} skipped, {} errors), {} links, {} with incomplete link lists{}",
            target,
            self.attempted,
            self.resolved,
            self.skipped,
            self.errors,
            self.links,
            self.mismatched,
            if self.interrupted { " [interrupted]" } else { "" },
        );
    }

    fn record(&mut self, outcome: &ResolutionOutcome) {
        self.attempted += 1;
        match outcome {
            ResolutionOutcome::Resolved {
                link_count,
                all_links_present,
                ..
            } => {
                self.resolved += 1;
                self.links += link_count;
                if !all_links_present {
                    self.mismatched += 1;
                }
            }
            ResolutionOutcome::Skipped { .. } => self.skipped += 1,
            ResolutionOutcome::Error { .. } => self.errors += 1,
        }
    }
}

/// What a results page reports and links to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsPage {
    pub expected: Option<usize>,
    pub links: Vec<String>,
}

/// Resolve every pending period in place, calling `persist` with the whole
/// list after each one so an interrupted run keeps what it finished.
pub fn resolve_all<D, F>(
    ctx: &mut ScrapeContext<D>,
    target: &Target,
    periods: &mut [Period],
    options: ResolveOptions,
    mut persist: F,
) -> Result<ResolveReport, StageError>
where
    D: Driver,
    F: FnMut(&[Period]) -> Result<(), StageError>,
{
    let mut report = ResolveReport::default();
    let pending = periods
        .iter()
        .filter(|p| needs_resolution(p, options))
        .count();
    info!(target = %target.name, pending, total = periods.len(), "Resolving period links");

    for i in 0..periods.len() {
        if !needs_resolution(&periods[i], options) {
            continue;
        }
        if ctx.is_cancelled() {
            report.interrupted = true;
            break;
        }

        let Some(outcome) = resolve_period(ctx, target, &periods[i]) else {
            report.interrupted = true;
            break;
        };
        log_outcome(&periods[i].name, &outcome);
        report.record(&outcome);
        periods[i].data = Some(outcome);
        persist(&*periods)?;
    }

    Ok(report)
}

fn needs_resolution(period: &Period, options: ResolveOptions) -> bool {
    match &period.data {
        None => true,
        Some(outcome) => options.redo_failed && outcome.is_error(),
    }
}

/// Run one period through the form. `None` means the run was interrupted
/// and nothing should be recorded. Any failure seen once the token has
/// fired counts as the interruption, since the browser may have been
/// killed by the same signal.
pub fn resolve_period<D: Driver>(
    ctx: &mut ScrapeContext<D>,
    target: &Target,
    period: &Period,
) -> Option<ResolutionOutcome> {
    let mut stage = ResolveStage::NotStarted;
    match drive_form(ctx, target, period, &mut stage) {
        Ok(outcome) => Some(outcome),
        Err(DriverError::Cancelled) => None,
        Err(_) if ctx.is_cancelled() => None,
        Err(e) => Some(ResolutionOutcome::Error {
            kind: e.kind(),
            message: format!("{} (last step: {})", e, stage),
        }),
    }
}

fn drive_form<D: Driver>(
    ctx: &mut ScrapeContext<D>,
    target: &Target,
    period: &Period,
    stage: &mut ResolveStage,
) -> Result<ResolutionOutcome, DriverError> {
    let settings = Arc::clone(&ctx.settings);
    let portal = &settings.portal;
    let timeouts = &settings.timeouts;

    // The form is gone after a submission, so always start from the portal root.
    ctx.driver.navigate(&target.url)?;
    ctx.driver.enter_frame(&portal.frame, timeouts.frame())?;
    *stage = ResolveStage::FrameEntered;

    ctx.driver.click(&portal.reveal_button, timeouts.reveal())?;
    ctx.driver.wait_for(&portal.period_select, timeouts.form())?;
    let options = ctx.driver.options_text(&portal.period_select)?;
    *stage = ResolveStage::SelectorLocated;

    let wanted = period.name.trim();
    if !options.iter().any(|o| o.trim() == wanted) {
        *stage = ResolveStage::Skipped;
        return Ok(ResolutionOutcome::Skipped {
            reason: NOT_IN_SELECTOR.to_string(),
        });
    }
    *stage = ResolveStage::Matched;
    ctx.check_cancelled()?;

    ctx.driver.choose_by_text(&portal.period_select, wanted)?;
    ctx.driver.fill(&portal.start_date_input, &period.start_date)?;
    ctx.driver.fill(&portal.end_date_input, &period.end_date)?;
    *stage = ResolveStage::FormFilled;

    ctx.driver.click(&portal.submit_button, timeouts.form())?;
    *stage = ResolveStage::Submitted;

    ctx.driver.wait_for(&portal.results_ready, timeouts.results())?;
    if !ctx.pause(timeouts.settle()) {
        return Err(DriverError::Cancelled);
    }
    let source = ctx.driver.page_source()?;
    *stage = ResolveStage::ResultsLoaded;

    let page = parse_results(&source, &ctx.driver.current_url(), portal);
    *stage = ResolveStage::Resolved;
    Ok(ResolutionOutcome::resolved(&period.name, page.links, page.expected))
}

/// Read the portal-reported result count and every result link.
pub fn parse_results(source: &str, page_url: &str, portal: &PortalSelectors) -> ResultsPage {
    let doc = Html::parse_document(source);
    let base = Url::parse(page_url).ok();

    let expected = html::selector(&portal.result_count_cell).and_then(|sel| {
        doc.select(&sel)
            .next()
            .and_then(|cell| html::inner_text(cell).trim().parse::<usize>().ok())
    });

    let links = html::selector(&portal.result_links)
        .map(|sel| {
            doc.select(&sel)
                .filter_map(|a| a.value().attr("href"))
                .map(str::trim)
                .filter(|href| !href.is_empty() && !href.starts_with('#'))
                .filter(|href| !href.to_ascii_lowercase().starts_with("javascript:"))
                .map(|href| html::absolute(base.as_ref(), href))
                .collect()
        })
        .unwrap_or_default();

    ResultsPage { expected, links }
}

fn log_outcome(name: &str, outcome: &ResolutionOutcome) {
    match outcome {
        ResolutionOutcome::Resolved {
            link_count,
            expected_count,
            all_links_present,
            ..
        } => {
            if *all_links_present {
                info!(period = name, links = link_count, "Period resolved");
            } else {
                warn!(
                    period = name,
                    links = link_count,
                    expected = ?expected_count,
                    "Period resolved with a link count that disagrees with the portal"
                );
            }
        }
        ResolutionOutcome::Skipped { reason } => {
            warn!(period = name, reason = %reason, "Period skipped")
        }
        ResolutionOutcome::Error { kind, message } => {
            warn!(period = name, kind = %kind, "Period failed: {}", message)
        }
    }
}
