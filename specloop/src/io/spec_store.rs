//! Parsed-spec load/save with schema + invariant validation.
//!
//! `spec.json` is produced by the external markdown parser. Loading
//! validates it against the embedded JSON Schema first, then against the
//! semantic invariants the schema cannot express, and only then hands back
//! a typed [`ParsedSpec`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::Draft;
use serde_json::Value;

use crate::core::invariants::validate_spec;
use crate::io::file_store::{WriteOptions, WriteOutcome, atomic_write};
use crate::spec::ParsedSpec;

const PARSED_SPEC_SCHEMA: &str = include_str!("../../schemas/parsed_spec.schema.json");

/// Load and validate a parsed spec from disk.
pub fn load_spec(path: &Path) -> Result<ParsedSpec> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read spec {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse spec {}", path.display()))?;
    validate_schema(&value)?;
    let spec: ParsedSpec = serde_json::from_value(value)
        .with_context(|| format!("deserialize spec {}", path.display()))?;
    let errors = validate_spec(&spec);
    if !errors.is_empty() {
        return Err(anyhow!("spec invariants failed: {}", errors.join("; ")));
    }
    Ok(spec)
}

/// Write a parsed spec with stable formatting.
pub fn write_spec(path: &Path, spec: &ParsedSpec) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(spec)?;
    buf.push('\n');
    match atomic_write(path, &buf, &WriteOptions::default())? {
        WriteOutcome::Written { .. } => Ok(()),
        WriteOutcome::Rejected { reason } => {
            Err(anyhow!("spec write rejected unexpectedly: {reason}"))
        }
    }
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(PARSED_SPEC_SCHEMA).context("parse embedded spec schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile spec schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "spec schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
