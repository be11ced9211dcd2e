//! Import Submitter
//!
//! Commits the valid results of a wizard session into the watchlist and
//! derives the refreshed group selector from the backend's answer.

use crate::api::WatchlistApi;
use crate::error::{ImportError, Result};
use crate::events::{EventSink, WizardEvent};
use crate::models::{GroupSelection, ValidationResult, Watchlists};
use serde::Serialize;
use std::sync::Arc;

pub const CLEAR_EXISTING_PROMPT: &str = "About to clear the existing watchlist and import the new list (recommended). \
This removes all existing groups and stocks. Continue?";

/// Asks the user before destructive imports
pub trait ConfirmDialog: Send + Sync {
    fn confirm_clear_existing(&self, prompt: &str) -> bool;
}

impl<F> ConfirmDialog for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm_clear_existing(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// One entry of the group selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOption {
    pub name: String,
    pub label: String,
    pub count: usize,
}

impl GroupOption {
    pub fn new(name: &str, count: usize) -> Self {
        Self {
            name: name.to_string(),
            label: format!("{} ({} stocks)", name, count),
            count,
        }
    }
}

/// Selector entries for every group, ordered by name
pub fn group_options(watchlists: &Watchlists) -> Vec<GroupOption> {
    watchlists
        .iter()
        .map(|(name, stocks)| GroupOption::new(name, stocks.len()))
        .collect()
}

/// Keep the previous selection only if that group still exists
pub fn refresh_selection(previous: Option<&str>, options: &[GroupOption]) -> Option<String> {
    previous
        .filter(|name| options.iter().any(|o| o.name == *name))
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub message: String,
    pub imported: usize,
    pub groups: Vec<GroupOption>,
    pub watchlists: Watchlists,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported(ImportSummary),
    /// The user declined to clear the existing list; nothing was sent
    Declined,
}

#[derive(Clone)]
pub struct ImportSubmitter {
    api: Arc<dyn WatchlistApi>,
}

impl ImportSubmitter {
    pub fn new(api: Arc<dyn WatchlistApi>) -> Self {
        Self { api }
    }

    /// Send the valid entries of `stocks` in one request.
    ///
    /// With `clear_existing`, `confirm` is asked first and a refusal returns
    /// `ImportOutcome::Declined` without any request. A `success: false`
    /// answer becomes `ImportError::Rejected` with the server's message.
    pub async fn submit(
        &self,
        stocks: &[ValidationResult],
        selection: &GroupSelection,
        clear_existing: bool,
        confirm: &dyn ConfirmDialog,
        sink: &dyn EventSink,
    ) -> Result<ImportOutcome> {
        let valid: Vec<ValidationResult> = stocks.iter().filter(|s| s.valid).cloned().collect();
        if valid.is_empty() {
            return Err(ImportError::NoValidStocks);
        }

        if clear_existing && !confirm.confirm_clear_existing(CLEAR_EXISTING_PROMPT) {
            log::info!("Import declined at clear-existing confirmation");
            return Ok(ImportOutcome::Declined);
        }

        log::info!(
            "Importing {} stocks (group: '{}', auto categories: {}, clear existing: {})",
            valid.len(),
            selection.group_name(),
            selection.is_auto(),
            clear_existing
        );

        let response = self
            .api
            .import_watchlist(&valid, selection, clear_existing)
            .await
            .inspect_err(|e| log::error!("Import request failed: {}", e))?;

        if !response.success {
            let message = response.error.unwrap_or_else(|| "Unknown error".to_string());
            log::error!("Import rejected: {}", message);
            return Err(ImportError::Rejected(message));
        }

        let watchlists = response.watchlists.unwrap_or_default();
        let groups = group_options(&watchlists);
        let message = response
            .message
            .unwrap_or_else(|| format!("Imported {} stocks into the watchlist", valid.len()));

        sink.emit(WizardEvent::ImportCompleted { message: message.clone() });
        sink.emit(WizardEvent::GroupsRefreshed { groups: groups.clone() });

        Ok(ImportOutcome::Imported(ImportSummary {
            message,
            imported: valid.len(),
            groups,
            watchlists,
        }))
    }
}
