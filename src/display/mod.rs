//! Presentation of validation results.
//!
//! Turns a `ValidationResult` into the four cells of a result row (code,
//! name, price, status) and picks friendlier text for common failures.

use crate::models::{MarketType, ValidationResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Two capital letters followed by four digits, e.g. `IF2406`
static FUTURES_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]{2}\d{4}").expect("valid regex"));

/// Server error fragments (the backend answers in English or Chinese)
const FUTURES_MARKERS: &[&str] = &["futures", "期货"];
const NOT_FOUND_MARKERS: &[&str] = &["404", "not recognised", "not recognized", "无法识别"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub code: String,
    pub yf_code: Option<String>,
    pub name: String,
    pub price: String,
    pub status: String,
    pub market: Option<String>,
    pub severity: Severity,
}

pub fn market_label(market: &MarketType) -> &str {
    match market {
        MarketType::Equity => "Stock",
        MarketType::Etf => "ETF",
        MarketType::Index => "Index",
        MarketType::Other(raw) => raw,
    }
}

/// `"{price} {currency}"` for a valid, priced result, `-` otherwise
pub fn price_display(result: &ValidationResult) -> String {
    match result.price {
        Some(price) if result.valid && price != 0.0 => {
            format!("{} {}", price, result.currency.as_deref().unwrap_or("USD"))
        }
        _ => "-".to_string(),
    }
}

pub fn is_futures_contract(code: &str) -> bool {
    FUTURES_CODE.is_match(code)
}

/// Message and severity for an invalid result
pub fn invalid_message(result: &ValidationResult) -> (String, Severity) {
    let server = result
        .error
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or("Unknown error");
    let lower = server.to_lowercase();

    if is_futures_contract(&result.code) {
        let message = format!(
            "Futures contract codes such as {} are not supported, use a regular stock code",
            result.code
        );
        return (message, Severity::Danger);
    }
    if FUTURES_MARKERS.iter().any(|m| lower.contains(m)) {
        return (server.to_string(), Severity::Danger);
    }
    if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        return (server.to_string(), Severity::Danger);
    }
    (server.to_string(), Severity::Warning)
}

pub fn result_row(result: &ValidationResult) -> ResultRow {
    if result.valid {
        ResultRow {
            code: result.code.clone(),
            yf_code: result.yf_code.clone(),
            name: result.name.clone().unwrap_or_default(),
            price: price_display(result),
            status: "Valid".to_string(),
            market: result.market_type.as_ref().map(|m| market_label(m).to_string()),
            severity: Severity::Success,
        }
    } else {
        let (message, severity) = invalid_message(result);
        ResultRow {
            code: result.code.clone(),
            yf_code: result.yf_code.clone(),
            name: "Invalid".to_string(),
            price: "-".to_string(),
            status: message,
            market: None,
            severity,
        }
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match &self.yf_code {
            Some(yf) => format!("{} [YF: {}]", self.code, yf),
            None => self.code.clone(),
        };
        let status = match &self.market {
            Some(market) => format!("{} ({})", self.status, market),
            None => self.status.clone(),
        };
        write!(f, "{:<24} {:<32} {:<16} {}", code, self.name, self.price, status)
    }
}
