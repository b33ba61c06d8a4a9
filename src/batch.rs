use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::{Driver, ScrapeContext};
use crate::config::Target;
use crate::error::{DriverError, StageError};
use crate::model::Period;
use crate::progress::{BatchProgress, RunSummary};
use crate::session::parse_session;
use crate::store::SessionStore;

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Only sessions of the period with this name.
    pub period: Option<String>,
    pub limit: Option<usize>,
    /// Scrape URLs again even when an artifact exists.
    pub no_resume: bool,
}

#[derive(Debug, Error)]
enum SessionFailure {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Store(#[from] StageError),
}

/// Links of every resolved period, flattened in period order, duplicates dropped.
pub fn session_urls(periods: &[Period], period: Option<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    periods
        .iter()
        .filter(|p| period.map_or(true, |name| p.name.trim() == name.trim()))
        .flat_map(|p| p.links())
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}

/// URLs still to do and how many were skipped as already done.
pub fn pending(
    urls: Vec<String>,
    completed: &HashSet<String>,
    options: &BatchOptions,
) -> (Vec<String>, usize) {
    let (todo, done): (Vec<String>, Vec<String>) = if options.no_resume {
        (urls, Vec::new())
    } else {
        urls.into_iter().partition(|u| !completed.contains(u))
    };
    let todo = match options.limit {
        Some(n) => todo.into_iter().take(n).collect(),
        None => todo,
    };
    (todo, done.len())
}

/// Scrape every pending session of `periods` into `store`, one artifact per
/// session as soon as it is parsed. A failed URL is logged and counted; the
/// batch goes on.
pub fn scrape_sessions<D: Driver>(
    ctx: &mut ScrapeContext<D>,
    target: &Target,
    periods: &[Period],
    store: &SessionStore,
    options: &BatchOptions,
    mut progress: impl FnMut(usize) -> BatchProgress,
) -> Result<RunSummary, StageError> {
    let started = Instant::now();
    let urls = session_urls(periods, options.period.as_deref());
    if urls.is_empty() {
        warn!(target = %target.name, period = ?options.period, "No session links to scrape");
    }
    let completed = store.completed_urls()?;
    let (todo, already_done) = pending(urls, &completed, options);

    let mut summary = RunSummary {
        already_done,
        ..RunSummary::default()
    };
    info!(
        target = %target.name,
        pending = todo.len(),
        already_done,
        dir = %store.dir().display(),
        "Scraping sessions"
    );

    let delay = ctx.settings.request_delay();
    let mut bar = progress(todo.len());
    for (i, url) in todo.iter().enumerate() {
        if i > 0 && !ctx.pause(delay) {
            summary.interrupted = true;
            break;
        }
        let t = Instant::now();

        match scrape_with_retry(ctx, url, store, &bar) {
            Ok(path) => {
                summary.ok += 1;
                debug!(url = %url, path = %path.display(), "Session stored");
            }
            Err(SessionFailure::Driver(DriverError::Cancelled)) => {
                summary.interrupted = true;
                break;
            }
            Err(e) => {
                summary.failed += 1;
                bar.suspend(|| warn!(url = %url, "Session failed: {}", e));
            }
        }
        summary.attempted += 1;
        bar.tick(t.elapsed());
    }
    bar.finish();

    if ctx.is_cancelled() {
        summary.interrupted = true;
    }
    summary.elapsed = started.elapsed();
    Ok(summary)
}

/// A failure seen after the token fired is reported as `Cancelled`: the
/// interrupt may have taken the browser down with it.
fn scrape_with_retry<D: Driver>(
    ctx: &mut ScrapeContext<D>,
    url: &str,
    store: &SessionStore,
    bar: &BatchProgress,
) -> Result<PathBuf, SessionFailure> {
    let policy = ctx.settings.retry.clone();
    let mut attempt = 1;
    loop {
        let err = match scrape_one(ctx, url, store) {
            Ok(path) => return Ok(path),
            Err(_) if ctx.is_cancelled() => return Err(DriverError::Cancelled.into()),
            Err(e) => e,
        };
        let Some(backoff) = policy.delay_after(attempt) else {
            return Err(err);
        };
        bar.suspend(|| {
            warn!(
                "Session {} failed (attempt {}/{}), retrying in {:.1}s: {}",
                url,
                attempt,
                policy.attempts(),
                backoff.as_secs_f64(),
                err
            )
        });
        if !ctx.pause(backoff) {
            return Err(DriverError::Cancelled.into());
        }
        attempt += 1;
    }
}

fn scrape_one<D: Driver>(
    ctx: &mut ScrapeContext<D>,
    url: &str,
    store: &SessionStore,
) -> Result<PathBuf, SessionFailure> {
    let settings = Arc::clone(&ctx.settings);
    ctx.check_cancelled()?;
    ctx.driver.navigate(url)?;
    ctx.driver
        .wait_for(&settings.session.ready, settings.timeouts.page())?;
    let source = ctx.driver.page_source()?;

    let parsed = parse_session(&source, url, &settings.session, Local::now());
    for issue in &parsed.issues {
        debug!(url = %url, field = %issue.field, "Field missing: {}", issue.error);
    }
    Ok(store.save(&parsed.record)?)
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::browser::fake::FakeDriver;
    use crate::config::Settings;
    use crate::model::ResolutionOutcome;
    use crate::retry::RetryPolicy;

    const S1: &str = "https://sil.test/sesion?1";
    const S2: &str = "https://sil.test/sesion?2";
    const S3: &str = "https://sil.test/sesion?3";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.request_delay_ms = 0;
        s.retry = RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        };
        s
    }

    fn periods() -> Vec<Period> {
        let mut lxv = Period::new("LXV", 65, "a", "b");
        lxv.data = Some(ResolutionOutcome::resolved("LXV", vec![S1.into(), S2.into()], Some(2)));
        let mut lxiv = Period::new("LXIV", 64, "c", "d");
        lxiv.data = Some(ResolutionOutcome::resolved("LXIV", vec![S3.into(), S1.into()], Some(2)));
        let lxiii = Period::new("LXIII", 63, "e", "f");
        vec![lxv, lxiv, lxiii]
    }

    fn driver() -> FakeDriver {
        FakeDriver::default()
            .page(S1, &fixture("session_full"))
            .page(S2, &fixture("session_minimal"))
    }

    fn run(
        driver: FakeDriver,
        settings: Settings,
        store: &SessionStore,
        options: &BatchOptions,
    ) -> (RunSummary, FakeDriver) {
        let mut ctx = ScrapeContext::new(driver, Arc::new(settings), CancellationToken::new());
        let target = ctx.settings.targets[0].clone();
        let summary =
            scrape_sessions(&mut ctx, &target, &periods(), store, options, BatchProgress::hidden)
                .unwrap();
        (summary, ctx.driver)
    }

    #[test]
    fn urls_are_flattened_and_filtered() {
        assert_eq!(session_urls(&periods(), None), [S1, S2, S3]);
        assert_eq!(session_urls(&periods(), Some("LXIV")), [S3, S1]);
        assert!(session_urls(&periods(), Some("LXIII")).is_empty());
    }

    #[test]
    fn a_failed_url_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();

        let (summary, _) = run(driver(), settings(), &store, &BatchOptions::default());
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.ok, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.interrupted);

        assert!(store.workbook_path("20230315").exists());
        assert!(store.workbook_path("20191002").exists());
        let done = store.completed_urls().unwrap();
        assert!(done.contains(S1) && done.contains(S2) && !done.contains(S3));
    }

    #[test]
    fn rerun_skips_completed_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        run(driver(), settings(), &store, &BatchOptions::default());

        let (summary, used) = run(driver(), settings(), &store, &BatchOptions::default());
        assert_eq!(summary.already_done, 2);
        assert_eq!(summary.attempted, 1);
        assert_eq!(used.visits, [S3]);

        let no_resume = BatchOptions {
            no_resume: true,
            limit: Some(2),
            ..BatchOptions::default()
        };
        let (summary, used) = run(driver(), settings(), &store, &no_resume);
        assert_eq!(summary.already_done, 0);
        assert_eq!(used.visits, [S1, S2]);
    }

    #[test]
    fn flaky_url_is_retried_when_policy_allows() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let mut flaky = driver();
        flaky.flaky.insert(S1.to_string(), 1);
        let only_lxv = BatchOptions {
            period: Some("LXV".into()),
            ..BatchOptions::default()
        };

        let (summary, _) = run(flaky, settings(), &store, &only_lxv);
        assert_eq!((summary.ok, summary.failed), (1, 1));

        let mut flaky = driver();
        flaky.flaky.insert(S1.to_string(), 1);
        let mut retrying = settings();
        retrying.retry.max_attempts = 2;
        let again = BatchOptions {
            no_resume: true,
            ..only_lxv
        };
        let (summary, used) = run(flaky, retrying, &store, &again);
        assert_eq!((summary.ok, summary.failed), (2, 0));
        assert_eq!(used.visits.iter().filter(|u| *u == S1).count(), 2);
    }

    #[test]
    fn browser_dying_on_interrupt_is_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let token = CancellationToken::new();
        let mut retrying = settings();
        retrying.retry.max_attempts = 3;
        let mut ctx = ScrapeContext::new(
            driver().crash_on(S2, &token),
            Arc::new(retrying),
            token.clone(),
        );
        let target = ctx.settings.targets[0].clone();

        let summary = scrape_sessions(
            &mut ctx,
            &target,
            &periods(),
            &store,
            &BatchOptions::default(),
            BatchProgress::hidden,
        )
        .unwrap();
        assert!(summary.interrupted);
        assert_eq!((summary.attempted, summary.ok, summary.failed), (1, 1, 0));
        // Neither retried nor followed by the next URL.
        assert_eq!(ctx.driver.visits, [S1, S2]);
        let done = store.completed_urls().unwrap();
        assert!(done.contains(S1) && !done.contains(S2));
    }

    #[test]
    fn cancelled_batch_reports_interruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        let token = CancellationToken::new();
        let mut ctx = ScrapeContext::new(driver(), Arc::new(settings()), token.clone());
        let target = ctx.settings.targets[0].clone();
        token.cancel();

        let summary = scrape_sessions(
            &mut ctx,
            &target,
            &periods(),
            &store,
            &BatchOptions::default(),
            BatchProgress::hidden,
        )
        .unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.attempted, 0);
        assert!(ctx.driver.visits.is_empty());
        assert!(store.completed_urls().unwrap().is_empty());
    }
}
