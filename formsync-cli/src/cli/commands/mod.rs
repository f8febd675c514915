//! Command handlers

pub mod order;
pub mod submit;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

/// Read and parse a JSON file
pub fn read_json(path: &Path) -> Result<Value> {
    if !path.exists() {
        anyhow::bail!("File does not exist: {}", path.display());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON in: {}", path.display()))
}
