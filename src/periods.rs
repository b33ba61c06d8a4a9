use regex::Regex;
use tracing::{info, warn};

use crate::browser::{Driver, ScrapeContext};
use crate::config::Target;
use crate::error::{DriverError, StageError};
use crate::model::Period;

/// Load the portal, reveal the period widget and read the period list
/// embedded in its script. Failing to reach the widget aborts the stage.
pub fn enumerate<D: Driver>(
    ctx: &mut ScrapeContext<D>,
    target: &Target,
) -> Result<Vec<Period>, StageError> {
    let portal = ctx.settings.portal.clone();
    let timeouts = ctx.settings.timeouts.clone();
    let pattern = Regex::new(&portal.period_pattern)?;

    info!(target = %target.name, url = %target.url, "Enumerating periods");

    ctx.driver
        .navigate(&target.url)
        .map_err(|e| escalate(ctx, &target.url, e))?;
    ctx.driver
        .enter_frame(&portal.frame, timeouts.frame())
        .map_err(|e| escalate(ctx, "results frame", e))?;
    ctx.driver
        .click(&portal.reveal_button, timeouts.reveal())
        .map_err(|e| escalate(ctx, "period selector", e))?;

    let html = ctx
        .driver
        .page_source()
        .map_err(|e| escalate(ctx, "period selector", e))?;
    let periods = parse_periods(&html, &pattern);

    if periods.is_empty() {
        warn!(target = %target.name, "No periods found in page script");
    } else {
        info!(target = %target.name, count = periods.len(), "Periods found");
    }
    Ok(periods)
}

/// A failure after the token fired is the interruption, not an unreachable portal.
fn escalate<D: Driver>(ctx: &ScrapeContext<D>, surface: &str, source: DriverError) -> StageError {
    if ctx.is_cancelled() || matches!(source, DriverError::Cancelled) {
        StageError::Cancelled
    } else {
        StageError::Fatal {
            surface: surface.to_string(),
            source,
        }
    }
}

/// Every `(startDate, endDate, value, name)` tuple the pattern captures, in page order.
pub fn parse_periods(html: &str, pattern: &Regex) -> Vec<Period> {
    pattern
        .captures_iter(html)
        .filter_map(|caps| {
            let value = caps.get(3)?.as_str().parse().ok()?;
            Some(Period::new(
                caps.get(4)?.as_str().trim(),
                value,
                caps.get(1)?.as_str(),
                caps.get(2)?.as_str(),
            ))
        })
        .collect()
}

/// Carry resolution outcomes over from a previous period file so a fresh
/// enumeration does not discard finished work.
pub fn keep_outcomes(fresh: &mut [Period], previous: &[Period]) -> usize {
    let mut kept = 0;
    for period in fresh.iter_mut() {
        let old = previous
            .iter()
            .find(|p| p.name == period.name && p.data.is_some());
        if let Some(old) = old {
            period.data = old.data.clone();
            kept += 1;
        }
    }
    kept
}
