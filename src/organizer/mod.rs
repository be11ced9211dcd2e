//! Auto-Organize Poller
//!
//! Fires the long-running organize request and, alongside it, polls the
//! progress endpoint on a fixed interval. Polling stops as soon as either
//! the progress endpoint reports completion or the organize request itself
//! resolves.

use crate::api::WatchlistApi;
use crate::config::ImporterConfig;
use crate::error::{ImportError, Result};
use crate::events::{EventSink, WizardEvent};
use crate::models::{OrganizeProgress, OrganizeStats, Watchlists};
use crate::submitter::{group_options, GroupOption};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Percent shown before the first progress poll answers
pub const INITIAL_PERCENT: f64 = 5.0;

const VERIFY_MESSAGES: [&str; 5] = [
    "Checking that the stock codes are valid...",
    "Looking up stock details and latest prices...",
    "Translating stock names...",
    "Repairing invalid stock codes...",
    "Handling stock codes with special formats...",
];

/// Status line and secondary hint for a progress percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageMessage {
    pub status: &'static str,
    pub hint: &'static str,
}

/// Round and cap a raw percentage the way the progress bar shows it
pub fn display_percent(percent: f64) -> u8 {
    if !percent.is_finite() {
        return 0;
    }
    percent.round().clamp(0.0, 100.0) as u8
}

pub fn stage_message(percent: u8) -> StageMessage {
    match percent {
        100.. => StageMessage {
            status: "Organizing complete! All stocks have been classified and saved.",
            hint: "",
        },
        85.. => StageMessage {
            status: "Verification complete, writing the watchlist and updating settings...",
            hint: "Almost done, saving results...",
        },
        65.. => StageMessage {
            status: "Sorting stocks into groups...",
            hint: "Classifying the stocks, this takes a moment...",
        },
        40.. => StageMessage {
            status: VERIFY_MESSAGES[(usize::from(percent) - 20) / 5 % VERIFY_MESSAGES.len()],
            hint: "Processing data, please keep the window open...",
        },
        20.. => StageMessage {
            status: "Validating stock codes in batches, this may take a while...",
            hint: "Every stock code is being checked, please wait...",
        },
        10.. => StageMessage {
            status: "Reading and parsing stock data...",
            hint: "Reading data, please wait...",
        },
        _ => StageMessage {
            status: "Initialising the organize run...",
            hint: "Getting ready...",
        },
    }
}

/// Result of a successful organize run
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizeReport {
    pub message: String,
    pub stats: OrganizeStats,
    pub groups: Vec<GroupOption>,
    pub watchlists: Watchlists,
}

#[derive(Clone)]
pub struct AutoOrganizePoller {
    api: Arc<dyn WatchlistApi>,
    poll_interval: Duration,
}

impl AutoOrganizePoller {
    pub fn new(api: Arc<dyn WatchlistApi>, config: &ImporterConfig) -> Self {
        Self {
            api,
            poll_interval: config.poll_interval(),
        }
    }

    pub async fn run(&self, sink: &dyn EventSink) -> Result<OrganizeReport> {
        log::info!("Starting auto-organize of the watchlist");
        sink.emit(WizardEvent::OrganizeProgress {
            percent: display_percent(INITIAL_PERCENT),
            status: "Reading the watchlist...".to_string(),
            hint: stage_message(display_percent(INITIAL_PERCENT)).hint.to_string(),
        });

        let organize = self.api.auto_organize();
        tokio::pin!(organize);

        let period = self.poll_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polling = true;
        let mut in_flight: Option<ProgressPoll<'_>> = None;

        // The organize branch comes first so its response always wins; a poll
        // still in flight at that point is dropped.
        let response = loop {
            tokio::select! {
                biased;
                response = &mut organize => break response,
                progress = next_progress(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    match progress {
                        Ok(progress) if progress.in_progress => {
                            log::debug!("Organize progress {:.1}%: {}", progress.percent, progress.status);
                            emit_stage(sink, display_percent(progress.percent));
                        }
                        Ok(progress) if progress.completed => {
                            log::debug!("Progress endpoint reports organize completed");
                            emit_stage(sink, 100);
                            polling = false;
                        }
                        Ok(_) => {}
                        Err(e) => log::warn!("Failed to fetch organize progress: {}", e),
                    }
                }
                _ = ticker.tick(), if polling && in_flight.is_none() => {
                    in_flight = Some(self.api.organize_progress());
                }
            }
        };

        let data = response.inspect_err(|e| log::error!("Auto-organize request failed: {}", e))?;
        if !data.success {
            let message = data.error.unwrap_or_else(|| "Unknown error".to_string());
            log::error!("Auto-organize rejected: {}", message);
            return Err(ImportError::Rejected(message));
        }

        let stats = data.stats.unwrap_or_default();
        let watchlists = data.watchlists.unwrap_or_default();
        let groups = group_options(&watchlists);
        let message = data
            .message
            .unwrap_or_else(|| "Watchlist organized".to_string());

        log::info!(
            "Auto-organize done: {} groups, {} stocks, {} translated, {} fixed",
            stats.groups,
            stats.stocks,
            stats.translated,
            stats.fixed
        );
        emit_stage(sink, 100);
        sink.emit(WizardEvent::GroupsRefreshed { groups: groups.clone() });

        Ok(OrganizeReport {
            message,
            stats,
            groups,
            watchlists,
        })
    }
}

type ProgressPoll<'a> = Pin<Box<dyn Future<Output = Result<OrganizeProgress>> + Send + 'a>>;

async fn next_progress(poll: &mut Option<ProgressPoll<'_>>) -> Result<OrganizeProgress> {
    match poll {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

fn emit_stage(sink: &dyn EventSink, percent: u8) {
    let stage = stage_message(percent);
    sink.emit(WizardEvent::OrganizeProgress {
        percent,
        status: stage.status.to_string(),
        hint: stage.hint.to_string(),
    });
}
