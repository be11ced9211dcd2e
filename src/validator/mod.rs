//! Batch validation of stock codes.
//!
//! Codes are split into fixed-size chunks that are submitted strictly one
//! after another: chunk N+1 is only sent once chunk N's response has been
//! processed. Cancellation is cooperative. The flag is checked before each
//! chunk is issued, and the response of a chunk that was already in flight
//! is discarded instead of aborted.

use crate::api::WatchlistApi;
use crate::config::ImporterConfig;
use crate::error::{ImportError, Result};
use crate::events::{EventSink, WizardEvent};
use crate::models::ValidationResult;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shared cancel flag for one validation run
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Number of requests needed for `total` codes
pub fn chunk_count(total: usize, batch_size: usize) -> usize {
    total.div_ceil(batch_size.max(1))
}

/// Percentage of processed codes, rounded and capped at 100
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (processed as f64 / total as f64 * 100.0).round();
    percent.min(100.0) as u8
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    pub translate: bool,
    pub market: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Everything accumulated during one run, in submission order
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub results: Vec<ValidationResult>,
    pub total: usize,
    pub processed: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub outcome: ValidationOutcome,
}

impl ValidationReport {
    fn new(total: usize) -> Self {
        Self {
            results: Vec::new(),
            total,
            processed: 0,
            valid_count: 0,
            invalid_count: 0,
            outcome: ValidationOutcome::Completed,
        }
    }

    pub fn percent(&self) -> u8 {
        progress_percent(self.processed, self.total)
    }

    /// The confirm step is reachable only after a completed run with at
    /// least one valid code.
    pub fn can_proceed(&self) -> bool {
        self.outcome == ValidationOutcome::Completed && self.valid_count > 0
    }

    pub fn valid_results(&self) -> Vec<ValidationResult> {
        self.results.iter().filter(|r| r.valid).cloned().collect()
    }

    fn push(&mut self, result: ValidationResult) {
        if result.valid {
            self.valid_count += 1;
        } else {
            self.invalid_count += 1;
        }
        self.results.push(result);
    }
}

/// Validation running on the tokio runtime
pub struct ValidationTask {
    cancel: CancelHandle,
    handle: JoinHandle<Result<ValidationReport>>,
}

impl ValidationTask {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) -> Result<ValidationReport> {
        self.handle
            .await
            .map_err(|e| ImportError::Task(e.to_string()))?
    }
}

#[derive(Clone)]
pub struct BatchValidator {
    api: Arc<dyn WatchlistApi>,
    batch_size: usize,
    batch_delay: Duration,
}

impl BatchValidator {
    pub fn new(api: Arc<dyn WatchlistApi>, config: &ImporterConfig) -> Self {
        Self {
            api,
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Validate `codes` chunk by chunk.
    ///
    /// Only an empty code list is an `Err`. Request failures and
    /// cancellation end the run early and are reported through
    /// `ValidationReport::outcome`, with everything received so far kept.
    pub async fn run(
        &self,
        codes: &[String],
        options: &ValidationOptions,
        cancel: &CancelHandle,
        sink: &dyn EventSink,
    ) -> Result<ValidationReport> {
        if codes.is_empty() {
            return Err(ImportError::EmptyCodeList);
        }

        let total = codes.len();
        let batches = chunk_count(total, self.batch_size);
        let mut report = ValidationReport::new(total);

        log::info!(
            "Validating {} stock codes in {} batches (translate: {})",
            total,
            batches,
            options.translate
        );
        sink.emit(WizardEvent::ValidationStarted { total, batches });
        sink.emit(WizardEvent::ProgressUpdated { processed: 0, total, percent: 0 });
        sink.emit(WizardEvent::CountsUpdated { valid: 0, invalid: 0 });

        for (index, chunk) in codes.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            if cancel.is_cancelled() {
                return Ok(self.cancelled(report, sink));
            }

            let start = index * self.batch_size;
            let end = start + chunk.len();
            log::debug!("Validating batch {}/{}: codes {}..{}", index + 1, batches, start + 1, end);
            sink.emit(WizardEvent::ChunkStarted { start: start + 1, end, total });

            let response = match self
                .api
                .validate_stocks(chunk, options.translate, options.market.as_deref())
                .await
            {
                Ok(data) if data.results.is_empty() && data.error.is_some() => {
                    Err(ImportError::Rejected(data.error.unwrap_or_default()))
                }
                other => other,
            };

            let data = match response {
                Ok(data) => data,
                Err(e) => {
                    log::error!("Validation request for batch {} failed: {}", index + 1, e);
                    let message = e.to_string();
                    sink.emit(WizardEvent::ValidationFailed { message: message.clone() });
                    report.outcome = ValidationOutcome::Failed(message);
                    return Ok(report);
                }
            };

            // Response of a chunk that was in flight when the user cancelled
            if cancel.is_cancelled() {
                return Ok(self.cancelled(report, sink));
            }

            report.processed += chunk.len();
            sink.emit(WizardEvent::ProgressUpdated {
                processed: report.processed,
                total,
                percent: report.percent(),
            });

            for result in data.results {
                report.push(result.clone());
                sink.emit(WizardEvent::ResultReceived { result });
            }
            sink.emit(WizardEvent::CountsUpdated {
                valid: report.valid_count,
                invalid: report.invalid_count,
            });
        }

        log::info!(
            "Validation complete: {} codes, {} valid, {} invalid",
            total,
            report.valid_count,
            report.invalid_count
        );
        sink.emit(WizardEvent::ValidationFinished {
            total,
            valid: report.valid_count,
            invalid: report.invalid_count,
            can_proceed: report.can_proceed(),
        });
        Ok(report)
    }

    /// Run in the background and return immediately with a handle.
    pub fn spawn(
        &self,
        codes: Vec<String>,
        options: ValidationOptions,
        sink: Arc<dyn EventSink>,
    ) -> ValidationTask {
        let cancel = CancelHandle::new();
        let validator = self.clone();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            validator
                .run(&codes, &options, &task_cancel, sink.as_ref())
                .await
        });

        ValidationTask { cancel, handle }
    }

    /// Tell the backend to stop; nobody waits for the answer.
    pub fn notify_backend_cancel(&self) {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            match api.cancel_validation().await {
                Ok(()) => log::info!("Backend acknowledged validation cancel"),
                Err(e) => log::warn!("Failed to notify backend of cancel: {}", e),
            }
        });
    }

    fn cancelled(&self, mut report: ValidationReport, sink: &dyn EventSink) -> ValidationReport {
        log::info!(
            "Validation cancelled after {}/{} codes",
            report.processed,
            report.total
        );
        sink.emit(WizardEvent::ValidationCancelled {
            processed: report.processed,
            total: report.total,
        });
        report.outcome = ValidationOutcome::Cancelled;
        report
    }
}
