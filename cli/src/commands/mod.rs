// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Cadence CLI

pub mod calibrate;
pub mod config;
pub mod notes;

pub use self::calibrate::CalibrateArgs;
pub use self::config::ConfigCommand;
pub use self::notes::{AggregateArgs, WindowArgs};

use anyhow::{Context, Result};
use std::path::Path;

/// Read a JSON file holding an array of values
pub(crate) fn read_json_array(path: &Path) -> Result<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON in {:?}", path))?;
    match value {
        serde_json::Value::Array(items) => Ok(items),
        _ => anyhow::bail!("Expected a JSON array in {:?}", path),
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn format_optional(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| "-".to_string())
}
