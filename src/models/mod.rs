//! Wire types exchanged with the watchlist backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Group name → (stock code → backend-specific stock entry)
pub type Watchlists = BTreeMap<String, BTreeMap<String, Value>>;

/// Market classification reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MarketType {
    Equity,
    Etf,
    Index,
    Other(String),
}

impl MarketType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Equity => "equity",
            Self::Etf => "etf",
            Self::Index => "index",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for MarketType {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "equity" => Self::Equity,
            "etf" => Self::Etf,
            "index" => Self::Index,
            _ => Self::Other(s),
        }
    }
}

impl From<MarketType> for String {
    fn from(m: MarketType) -> Self {
        m.as_str().to_string()
    }
}

/// Outcome of validating one code. Produced by the backend and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub code: String,
    #[serde(default)]
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_type: Option<MarketType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yf_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Any further fields are sent back untouched on import
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ValidationResult {
    pub fn valid(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            valid: true,
            name: Some(name.to_string()),
            price: None,
            currency: None,
            market_type: None,
            yf_code: None,
            error: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn invalid(code: &str, error: &str) -> Self {
        Self {
            code: code.to_string(),
            valid: false,
            name: None,
            price: None,
            currency: None,
            market_type: None,
            yf_code: None,
            error: Some(error.to_string()),
            extra: serde_json::Map::new(),
        }
    }
}

/// Where imported stocks end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSelection {
    /// Let the backend categorise every stock
    AutoCategories,
    /// Put every stock into the named group
    Named(String),
}

impl GroupSelection {
    /// Builds a selection from the two wizard inputs; `None` when neither is set.
    pub fn from_inputs(auto_categories: bool, group_name: &str) -> Option<Self> {
        if auto_categories {
            Some(Self::AutoCategories)
        } else if !group_name.trim().is_empty() {
            Some(Self::Named(group_name.trim().to_string()))
        } else {
            None
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::AutoCategories)
    }

    /// Value of the `groupName` request field
    pub fn group_name(&self) -> &str {
        match self {
            Self::AutoCategories => "",
            Self::Named(name) => name,
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ValidateStocksRequest<'a> {
    pub codes: &'a [String],
    pub translate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateStockRequest<'a> {
    pub code: &'a str,
    pub translate: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportWatchlistRequest<'a> {
    pub stocks: &'a [ValidationResult],
    pub group_name: &'a str,
    pub auto_categories: bool,
    pub clear_existing: bool,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub valid: usize,
    #[serde(default)]
    pub invalid: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidateStocksResponse {
    #[serde(default)]
    pub results: Vec<ValidationResult>,
    #[serde(default)]
    pub summary: Option<ValidationSummary>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportWatchlistResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub watchlists: Option<Watchlists>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizeStats {
    #[serde(default)]
    pub groups: u64,
    #[serde(default)]
    pub stocks: u64,
    #[serde(default)]
    pub translated: u64,
    #[serde(default)]
    pub fixed: u64,
    #[serde(default)]
    pub duplicates: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutoOrganizeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stats: Option<OrganizeStats>,
    #[serde(default)]
    pub watchlists: Option<Watchlists>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizeProgress {
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub percent: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchlistGroupsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub groups: BTreeMap<String, usize>,
    #[serde(default)]
    pub error: Option<String>,
}
