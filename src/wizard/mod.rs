//! Wizard Controller
//!
//! Three linear steps (Input, Validate, Confirm) plus a terminal Done state.
//! The controller owns the transient session, starts validation runs on the
//! runtime and hands the valid results to the submitter.

use crate::api::WatchlistApi;
use crate::config::ImporterConfig;
use crate::error::{ImportError, Result};
use crate::events::{EventSink, WizardEvent};
use crate::file_parser::{self, ParseOptions};
use crate::models::{GroupSelection, ValidationResult};
use crate::submitter::{ConfirmDialog, ImportOutcome, ImportSubmitter};
use crate::validator::{
    BatchValidator, CancelHandle, ValidationOptions, ValidationOutcome, ValidationReport,
    ValidationTask,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardStep {
    Input,
    Validate,
    Confirm,
    Done,
}

impl WizardStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Validate => "validate",
            Self::Confirm => "confirm",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the "start validation" button is enabled.
///
/// Pure: the same inputs always give the same answer.
pub fn can_validate(has_codes: bool, auto_categories: bool, group_name: &str) -> bool {
    has_codes && (auto_categories || !group_name.trim().is_empty())
}

/// In-memory state of one wizard run. Never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub step: WizardStep,
    pub input_text: String,
    pub group_name: String,
    pub auto_categories: bool,
    pub translate_names: bool,
    pub clear_existing: bool,
    pub results: Vec<ValidationResult>,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub status_text: String,
    pub progress: u8,
}

impl WizardSession {
    pub fn new(translate_names: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            step: WizardStep::Input,
            input_text: String::new(),
            group_name: String::new(),
            auto_categories: false,
            translate_names,
            clear_existing: true,
            results: Vec::new(),
            valid_count: 0,
            invalid_count: 0,
            status_text: String::new(),
            progress: 0,
        }
    }

    pub fn codes(&self) -> Vec<String> {
        file_parser::split_input_codes(&self.input_text)
    }

    pub fn validate_enabled(&self) -> bool {
        can_validate(
            !self.codes().is_empty(),
            self.auto_categories,
            &self.group_name,
        )
    }

    pub fn selection(&self) -> Option<GroupSelection> {
        GroupSelection::from_inputs(self.auto_categories, &self.group_name)
    }

    /// Group line on the confirm step
    pub fn confirm_group_label(&self) -> String {
        if self.auto_categories {
            "auto categories".to_string()
        } else if !self.group_name.trim().is_empty() {
            self.group_name.trim().to_string()
        } else {
            "unspecified".to_string()
        }
    }

    pub fn valid_results(&self) -> Vec<ValidationResult> {
        self.results.iter().filter(|r| r.valid).cloned().collect()
    }

    fn clear_results(&mut self) {
        self.results.clear();
        self.valid_count = 0;
        self.invalid_count = 0;
        self.progress = 0;
        self.status_text.clear();
    }
}

pub struct WizardController {
    session: WizardSession,
    validator: BatchValidator,
    submitter: ImportSubmitter,
    sink: Arc<dyn EventSink>,
    task: Option<ValidationTask>,
    report: Option<ValidationReport>,
    market: Option<String>,
    max_file_size: u64,
    translate_default: bool,
}

impl WizardController {
    pub fn new(api: Arc<dyn WatchlistApi>, config: &ImporterConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            session: WizardSession::new(config.translate_names),
            validator: BatchValidator::new(Arc::clone(&api), config),
            submitter: ImportSubmitter::new(api),
            sink,
            task: None,
            report: None,
            market: config.market.clone(),
            max_file_size: config.max_file_size,
            translate_default: config.translate_names,
        }
    }

    pub fn session(&self) -> &WizardSession {
        &self.session
    }

    pub fn step(&self) -> WizardStep {
        self.session.step
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        self.report.as_ref()
    }

    pub fn set_input_text(&mut self, text: &str) {
        self.session.input_text = text.to_string();
    }

    /// Ignored while auto categories is selected
    pub fn set_group_name(&mut self, name: &str) {
        if self.session.auto_categories {
            log::debug!("Group name ignored while auto categories is selected");
            return;
        }
        self.session.group_name = name.to_string();
    }

    pub fn set_auto_categories(&mut self, auto: bool) {
        self.session.auto_categories = auto;
        if auto {
            self.session.group_name.clear();
        }
    }

    pub fn set_translate_names(&mut self, translate: bool) {
        self.session.translate_names = translate;
    }

    pub fn set_clear_existing(&mut self, clear: bool) {
        self.session.clear_existing = clear;
    }

    pub fn can_validate(&self) -> bool {
        self.session.validate_enabled()
    }

    /// Replace the input text with the codes found in `path`.
    ///
    /// On error the session is left untouched.
    pub fn load_file(&mut self, path: &Path, options: &ParseOptions) -> Result<usize> {
        let codes = file_parser::parse_file(path, options, self.max_file_size)?;
        self.session.input_text = codes.join("\n");
        Ok(codes.len())
    }

    pub fn load_bytes(&mut self, file_name: &str, bytes: &[u8], options: &ParseOptions) -> Result<usize> {
        let codes = file_parser::parse_bytes(file_name, bytes, options, self.max_file_size)?;
        self.session.input_text = codes.join("\n");
        Ok(codes.len())
    }

    /// Input → Validate. Starts a background validation run.
    pub fn start_validation(&mut self) -> Result<()> {
        self.require_step(WizardStep::Input, WizardStep::Validate)?;

        let codes = self.session.codes();
        if codes.is_empty() {
            return Err(ImportError::EmptyCodeList);
        }
        if self.session.selection().is_none() {
            return Err(ImportError::MissingGroup);
        }

        self.session.clear_results();
        self.report = None;

        let options = ValidationOptions {
            translate: self.session.translate_names,
            market: self.market.clone(),
        };
        self.session.status_text = format!("Validating {} stock codes...", codes.len());
        self.task = Some(self.validator.spawn(codes, options, Arc::clone(&self.sink)));
        self.transition(WizardStep::Validate);
        Ok(())
    }

    pub fn is_validating(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.task.as_ref().map(ValidationTask::cancel_handle)
    }

    /// Wait for the running validation and copy its results into the session.
    pub async fn wait_for_validation(&mut self) -> Result<&ValidationReport> {
        let task = self.task.take().ok_or_else(|| ImportError::InvalidStep {
            from: self.session.step.to_string(),
            to: WizardStep::Validate.to_string(),
        })?;
        let report = task.join().await?;

        self.session.results = report.results.clone();
        self.session.valid_count = report.valid_count;
        self.session.invalid_count = report.invalid_count;
        self.session.progress = report.percent();
        self.session.status_text = match &report.outcome {
            ValidationOutcome::Completed => {
                format!("Validation complete, {} stock codes", report.total)
            }
            ValidationOutcome::Cancelled => "Validation cancelled".to_string(),
            ValidationOutcome::Failed(message) => format!("Validation failed: {}", message),
        };

        Ok(self.report.insert(report))
    }

    /// Validate → Confirm. Needs a completed run with at least one valid code.
    pub fn proceed_to_confirm(&mut self) -> Result<()> {
        self.require_step(WizardStep::Validate, WizardStep::Confirm)?;
        let Some(report) = self.report.as_ref() else {
            return Err(self.invalid_step(WizardStep::Confirm));
        };
        if report.outcome != ValidationOutcome::Completed {
            return Err(self.invalid_step(WizardStep::Confirm));
        }
        if report.valid_count == 0 {
            return Err(ImportError::NoValidStocks);
        }
        self.transition(WizardStep::Confirm);
        Ok(())
    }

    /// Any step → Input. An in-flight validation is cancelled.
    pub fn back_to_input(&mut self) {
        self.cancel_running();
        self.report = None;
        self.session.clear_results();
        if self.session.step != WizardStep::Input {
            self.transition(WizardStep::Input);
        }
    }

    /// Confirm → Validate, keeping the results
    pub fn back_to_validate(&mut self) -> Result<()> {
        self.require_step(WizardStep::Confirm, WizardStep::Validate)?;
        self.transition(WizardStep::Validate);
        Ok(())
    }

    /// Confirm → Done. A successful import resets the session; a declined
    /// confirmation or a failure leaves it as it was so the user can retry.
    pub async fn confirm_import(&mut self, confirm: &dyn ConfirmDialog) -> Result<ImportOutcome> {
        self.require_step(WizardStep::Confirm, WizardStep::Done)?;
        let selection = self.session.selection().ok_or(ImportError::MissingGroup)?;
        let stocks = self.session.valid_results();

        let outcome = self
            .submitter
            .submit(
                &stocks,
                &selection,
                self.session.clear_existing,
                confirm,
                self.sink.as_ref(),
            )
            .await;

        match outcome {
            Ok(ImportOutcome::Imported(summary)) => {
                self.transition(WizardStep::Done);
                self.reset();
                Ok(ImportOutcome::Imported(summary))
            }
            Ok(ImportOutcome::Declined) => Ok(ImportOutcome::Declined),
            Err(e) => {
                self.session.status_text = e.user_message();
                Err(e)
            }
        }
    }

    /// Close the wizard: cancel anything running and reset to defaults.
    pub fn close(&mut self) {
        self.cancel_running();
        self.reset();
    }

    fn reset(&mut self) {
        let from = self.session.step;
        self.task = None;
        self.report = None;
        self.session = WizardSession::new(self.translate_default);
        log::debug!("Wizard session reset ({})", self.session.id);
        if from != WizardStep::Input {
            self.sink.emit(WizardEvent::StepChanged { from, to: WizardStep::Input });
        }
    }

    fn cancel_running(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                log::info!("Cancelling in-flight validation");
                task.cancel();
                self.validator.notify_backend_cancel();
            }
        }
    }

    fn require_step(&self, expected: WizardStep, to: WizardStep) -> Result<()> {
        if self.session.step == expected {
            Ok(())
        } else {
            Err(self.invalid_step(to))
        }
    }

    fn invalid_step(&self, to: WizardStep) -> ImportError {
        ImportError::InvalidStep {
            from: self.session.step.to_string(),
            to: to.to_string(),
        }
    }

    fn transition(&mut self, to: WizardStep) {
        let from = self.session.step;
        log::debug!("Wizard step {} -> {}", from, to);
        self.session.step = to;
        self.sink.emit(WizardEvent::StepChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::models::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Codes starting with `X` are invalid
    #[derive(Default)]
    struct FakeApi {
        chunks: Mutex<Vec<Vec<String>>>,
        imports: Mutex<Vec<(usize, String, bool, bool)>>,
        cancels: AtomicUsize,
        chunk_delay: Option<Duration>,
        reject_import: Option<String>,
    }

    #[async_trait]
    impl WatchlistApi for FakeApi {
        async fn validate_stocks(
            &self,
            codes: &[String],
            _translate: bool,
            _market: Option<&str>,
        ) -> Result<ValidateStocksResponse> {
            self.chunks.lock().unwrap().push(codes.to_vec());
            if let Some(delay) = self.chunk_delay {
                tokio::time::sleep(delay).await;
            }
            let results = codes
                .iter()
                .map(|c| {
                    if c.starts_with('X') {
                        ValidationResult::invalid(c, "404 not found")
                    } else {
                        ValidationResult::valid(c, &format!("{} Corp", c))
                    }
                })
                .collect();
            Ok(ValidateStocksResponse { results, ..Default::default() })
        }

        async fn validate_stock(&self, code: &str, _translate: bool) -> Result<ValidationResult> {
            Ok(ValidationResult::valid(code, code))
        }

        async fn cancel_validation(&self) -> Result<()> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn import_watchlist(
            &self,
            stocks: &[ValidationResult],
            selection: &GroupSelection,
            clear_existing: bool,
        ) -> Result<ImportWatchlistResponse> {
            self.imports.lock().unwrap().push((
                stocks.len(),
                selection.group_name().to_string(),
                selection.is_auto(),
                clear_existing,
            ));
            if let Some(error) = &self.reject_import {
                return Ok(ImportWatchlistResponse {
                    success: false,
                    error: Some(error.clone()),
                    ..Default::default()
                });
            }
            Ok(ImportWatchlistResponse {
                success: true,
                message: Some(format!("Imported {} stocks", stocks.len())),
                ..Default::default()
            })
        }

        async fn auto_organize(&self) -> Result<AutoOrganizeResponse> {
            Ok(AutoOrganizeResponse { success: true, ..Default::default() })
        }

        async fn organize_progress(&self) -> Result<OrganizeProgress> {
            Ok(OrganizeProgress::default())
        }

        async fn watchlist_groups(&self) -> Result<WatchlistGroupsResponse> {
            Ok(WatchlistGroupsResponse::default())
        }
    }

    fn config() -> ImporterConfig {
        ImporterConfig { batch_delay_ms: 0, ..ImporterConfig::default() }
    }

    fn controller(api: Arc<FakeApi>) -> WizardController {
        WizardController::new(api, &config(), Arc::new(NullSink))
    }

    #[test]
    fn test_button_predicate_both_directions() {
        assert!(can_validate(true, true, ""));
        assert!(can_validate(true, false, "Tech"));
        assert!(!can_validate(true, false, ""));
        assert!(!can_validate(true, false, "   "));
        assert!(!can_validate(false, true, "Tech"));
        assert!(!can_validate(false, false, ""));
    }

    #[test]
    fn test_button_predicate_is_idempotent() {
        let mut session = WizardSession::new(true);
        session.input_text = "AAPL\nMSFT".into();
        session.group_name = "Tech".into();
        let first = session.validate_enabled();
        assert_eq!(first, session.validate_enabled());
        assert!(first);
    }

    #[test]
    fn test_auto_categories_clears_group_name() {
        let mut wizard = controller(Arc::new(FakeApi::default()));
        wizard.set_group_name("Tech");
        wizard.set_auto_categories(true);
        assert_eq!(wizard.session().group_name, "");
        wizard.set_group_name("Banks");
        assert_eq!(wizard.session().group_name, "");
        assert_eq!(wizard.session().confirm_group_label(), "auto categories");

        wizard.set_auto_categories(false);
        assert_eq!(wizard.session().confirm_group_label(), "unspecified");
        wizard.set_group_name("Banks");
        assert_eq!(wizard.session().confirm_group_label(), "Banks");
    }

    #[tokio::test]
    async fn test_input_errors_keep_step() {
        let mut wizard = controller(Arc::new(FakeApi::default()));
        assert!(matches!(wizard.start_validation(), Err(ImportError::EmptyCodeList)));

        wizard.set_input_text("AAPL");
        assert!(matches!(wizard.start_validation(), Err(ImportError::MissingGroup)));
        assert_eq!(wizard.step(), WizardStep::Input);
    }

    #[tokio::test]
    async fn test_full_run_imports_and_resets() {
        let api = Arc::new(FakeApi::default());
        let mut wizard = controller(Arc::clone(&api));
        wizard.set_input_text("AAPL, MSFT; XBAD\nNVDA");
        wizard.set_group_name("Tech");

        wizard.start_validation().unwrap();
        assert_eq!(wizard.step(), WizardStep::Validate);

        let report = wizard.wait_for_validation().await.unwrap();
        assert_eq!(report.valid_count, 3);
        assert_eq!(report.invalid_count, 1);
        assert_eq!(wizard.session().progress, 100);

        wizard.proceed_to_confirm().unwrap();
        assert_eq!(wizard.step(), WizardStep::Confirm);

        let outcome = wizard.confirm_import(&|_: &str| true).await.unwrap();
        assert!(matches!(outcome, ImportOutcome::Imported(ref s) if s.imported == 3));

        let imports = api.imports.lock().unwrap().clone();
        assert_eq!(imports, vec![(3, "Tech".to_string(), false, true)]);

        assert_eq!(wizard.step(), WizardStep::Input);
        assert!(wizard.session().input_text.is_empty());
        assert!(wizard.session().results.is_empty());
        assert!(wizard.session().clear_existing);
    }

    #[tokio::test]
    async fn test_reset_after_import_reports_step_back_to_input() {
        let steps = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&steps);
        let sink = move |event: WizardEvent| {
            if let WizardEvent::StepChanged { from, to } = event {
                recorded.lock().unwrap().push((from, to));
            }
        };
        let mut wizard = WizardController::new(Arc::new(FakeApi::default()), &config(), Arc::new(sink));
        wizard.set_input_text("AAPL");
        wizard.set_group_name("Tech");

        wizard.start_validation().unwrap();
        wizard.wait_for_validation().await.unwrap();
        wizard.proceed_to_confirm().unwrap();
        wizard.confirm_import(&|_: &str| true).await.unwrap();

        assert_eq!(
            *steps.lock().unwrap(),
            vec![
                (WizardStep::Input, WizardStep::Validate),
                (WizardStep::Validate, WizardStep::Confirm),
                (WizardStep::Confirm, WizardStep::Done),
                (WizardStep::Done, WizardStep::Input),
            ]
        );

        // Closing an idle wizard has nothing to report
        wizard.close();
        assert_eq!(steps.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_all_invalid_blocks_confirm() {
        let mut wizard = controller(Arc::new(FakeApi::default()));
        wizard.set_input_text("XONE\nXTWO");
        wizard.set_auto_categories(true);
        wizard.start_validation().unwrap();
        wizard.wait_for_validation().await.unwrap();

        assert!(matches!(wizard.proceed_to_confirm(), Err(ImportError::NoValidStocks)));
        assert_eq!(wizard.step(), WizardStep::Validate);
    }

    #[tokio::test]
    async fn test_confirm_requires_finished_validation() {
        let api = Arc::new(FakeApi { chunk_delay: Some(Duration::from_millis(200)), ..Default::default() });
        let mut wizard = controller(api);
        wizard.set_input_text("AAPL");
        wizard.set_auto_categories(true);
        wizard.start_validation().unwrap();

        assert!(matches!(wizard.proceed_to_confirm(), Err(ImportError::InvalidStep { .. })));
        wizard.close();
    }

    #[tokio::test]
    async fn test_back_navigation_cancels_in_flight_validation() {
        let api = Arc::new(FakeApi { chunk_delay: Some(Duration::from_millis(50)), ..Default::default() });
        let mut wizard = controller(Arc::clone(&api));
        let codes: Vec<String> = (0..30).map(|i| format!("C{:02}", i)).collect();
        wizard.set_input_text(&codes.join("\n"));
        wizard.set_auto_categories(true);

        wizard.start_validation().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(wizard.is_validating());

        wizard.back_to_input();
        assert_eq!(wizard.step(), WizardStep::Input);
        assert!(!wizard.is_validating());
        assert_eq!(wizard.session().input_text, codes.join("\n"));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(api.chunks.lock().unwrap().len(), 1, "no chunk after cancel");
        assert_eq!(api.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_back_from_confirm_keeps_results() {
        let mut wizard = controller(Arc::new(FakeApi::default()));
        wizard.set_input_text("AAPL\nMSFT");
        wizard.set_auto_categories(true);
        wizard.start_validation().unwrap();
        wizard.wait_for_validation().await.unwrap();
        wizard.proceed_to_confirm().unwrap();

        wizard.back_to_validate().unwrap();
        assert_eq!(wizard.step(), WizardStep::Validate);
        assert_eq!(wizard.session().results.len(), 2);
        wizard.proceed_to_confirm().unwrap();
    }

    #[tokio::test]
    async fn test_declined_and_failed_import_keep_session() {
        let api = Arc::new(FakeApi { reject_import: Some("user not logged in".into()), ..Default::default() });
        let mut wizard = controller(Arc::clone(&api));
        wizard.set_input_text("AAPL");
        wizard.set_group_name("Tech");
        wizard.start_validation().unwrap();
        wizard.wait_for_validation().await.unwrap();
        wizard.proceed_to_confirm().unwrap();

        let outcome = wizard.confirm_import(&|_: &str| false).await.unwrap();
        assert_eq!(outcome, ImportOutcome::Declined);
        assert!(api.imports.lock().unwrap().is_empty());
        assert_eq!(wizard.step(), WizardStep::Confirm);

        let err = wizard.confirm_import(&|_: &str| true).await.unwrap_err();
        assert_eq!(err.user_message(), "user not logged in");
        assert_eq!(wizard.step(), WizardStep::Confirm);
        assert_eq!(wizard.session().results.len(), 1);
        assert_eq!(wizard.session().status_text, "user not logged in");
    }

    #[tokio::test]
    async fn test_keep_existing_skips_confirmation() {
        let api = Arc::new(FakeApi::default());
        let mut wizard = controller(Arc::clone(&api));
        wizard.set_input_text("AAPL");
        wizard.set_auto_categories(true);
        wizard.set_clear_existing(false);
        wizard.start_validation().unwrap();
        wizard.wait_for_validation().await.unwrap();
        wizard.proceed_to_confirm().unwrap();

        let never = |_: &str| -> bool { panic!("no confirmation without clearing") };
        wizard.confirm_import(&never).await.unwrap();
        assert_eq!(api.imports.lock().unwrap()[0], (1, String::new(), true, false));
    }

    #[tokio::test]
    async fn test_load_bytes_replaces_input() {
        let mut wizard = controller(Arc::new(FakeApi::default()));
        wizard.set_input_text("OLD");
        let count = wizard
            .load_bytes("list.csv", b"AAPL,Apple\nMSFT,Microsoft", &ParseOptions::default())
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(wizard.session().input_text, "AAPL\nMSFT");

        assert!(wizard.load_bytes("list.pdf", b"AAPL", &ParseOptions::default()).is_err());
        assert_eq!(wizard.session().input_text, "AAPL\nMSFT");
    }

    #[tokio::test]
    async fn test_steps_out_of_order_are_rejected() {
        let mut wizard = controller(Arc::new(FakeApi::default()));
        assert!(matches!(
            wizard.proceed_to_confirm(),
            Err(ImportError::InvalidStep { ref from, ref to }) if from == "input" && to == "confirm"
        ));
        assert!(wizard.back_to_validate().is_err());
        assert!(wizard.wait_for_validation().await.is_err());
    }
}
