use std::collections::VecDeque;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const WINDOW: usize = 20;

/// Progress bar for a batch of pages, with an ETA from the recent average
/// latency rather than indicatif's whole-run rate (pages are slow and uneven).
pub struct BatchProgress {
    pb: ProgressBar,
    recent: VecDeque<Duration>,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        Self::with_bar(pb)
    }

    #[cfg(test)]
    pub fn hidden(total: usize) -> Self {
        let pb = ProgressBar::hidden();
        pb.set_length(total as u64);
        Self::with_bar(pb)
    }

    fn with_bar(pb: ProgressBar) -> Self {
        BatchProgress {
            pb,
            recent: VecDeque::with_capacity(WINDOW),
        }
    }

    /// Record one finished item and how long it took.
    pub fn tick(&mut self, took: Duration) {
        if self.recent.len() == WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(took);
        self.pb.inc(1);

        if let Some(avg) = self.average() {
            let eta = avg * self.remaining() as u32;
            self.pb.set_message(format!(
                "avg {:.1}s, eta {}",
                avg.as_secs_f64(),
                crate::format_duration(eta)
            ));
        }
    }

    pub fn average(&self) -> Option<Duration> {
        if self.recent.is_empty() {
            return None;
        }
        let sum: Duration = self.recent.iter().sum();
        Some(sum / self.recent.len() as u32)
    }

    fn remaining(&self) -> u64 {
        self.pb
            .length()
            .unwrap_or(0)
            .saturating_sub(self.pb.position())
    }

    /// Run `f` with the bar hidden so log lines don't tear it.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.pb.suspend(f)
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub attempted: usize,
    pub ok: usize,
    pub failed: usize,
    pub already_done: usize,
    pub elapsed: Duration,
    pub interrupted: bool,
}

impl RunSummary {
    /// Percentage of attempted URLs that produced an artifact.
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.ok as f64 * 100.0 / self.attempted as f64
        }
    }

    pub fn print(&self, target: &str) {
        if self.interrupted {
            println!("{}: interrupted, partial results:", target);
        }
        println!(
            "{}: {} sessions attempted ({} ok, {} failed, {:.1}% success), {} already done, {}",
            target,
            self.attempted,
            self.ok,
            self.failed,
            self.success_rate(),
            self.already_done,
            crate::format_duration(self.elapsed),
        );
    }
}
