//! Print the stock codes extracted from a file, one per line
//!
//! Run with: cargo run --bin parse_codes -- <file> [column] [--header]

use anyhow::{bail, Result};
use std::path::PathBuf;
use watchlist_import::config::DEFAULT_MAX_FILE_SIZE;
use watchlist_import::file_parser::{parse_column_index, parse_file, ParseOptions};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let has_header = args.iter().any(|a| a == "--header");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let Some(path) = positional.first().map(|p| PathBuf::from(p.as_str())) else {
        bail!("usage: parse_codes <file> [column] [--header]");
    };
    let code_column = positional.get(1).map(|c| parse_column_index(c)).unwrap_or(0);

    let options = ParseOptions { has_header, code_column };
    let codes = parse_file(&path, &options, DEFAULT_MAX_FILE_SIZE)?;

    for code in &codes {
        println!("{}", code);
    }
    eprintln!("{} codes from {}", codes.len(), path.display());

    Ok(())
}
