//! Stock watchlist import.
//!
//! Client-side core of the watchlist import wizard: parse codes from text
//! or files, validate them against the backend in sequential chunks, commit
//! the valid ones into a watchlist group and trigger the backend's
//! auto-organize job.

pub mod api;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod file_parser;
pub mod models;
pub mod organizer;
pub mod submitter;
pub mod validator;
pub mod wizard;

pub use error::{ImportError, Result};
