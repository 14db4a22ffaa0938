use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use renderer::reflect::{EntryPoints, FRAGMENT_REQUIRED};
use renderer::{
    classify, collect_diagnostics, compose, needs_textures, normalize, ShaderKind,
    StructuredError,
};
use serde::Serialize;

use crate::cli::{CheckArgs, OutputFormat};

/// Headless result of classifying and validating one shader file.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub path: PathBuf,
    pub kind: ShaderKind,
    pub entry_points: EntryPoints,
    pub warnings: Vec<String>,
    pub errors: Vec<StructuredError>,
}

impl CheckReport {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(StructuredError::is_error)
    }
}

pub fn check_source(path: &Path, source: &str) -> CheckReport {
    let classification = classify(source);
    let errors = if classification.is_renderable() {
        collect_diagnostics(&compose(source, needs_textures(source)))
    } else {
        let message = classification
            .diagnostic_message
            .as_deref()
            .unwrap_or(FRAGMENT_REQUIRED);
        normalize(message, 0)
    };

    CheckReport {
        path: path.to_path_buf(),
        kind: classification.kind,
        entry_points: classification.entry_points,
        warnings: classification.warnings,
        errors,
    }
}

pub fn run_check(args: &CheckArgs) -> Result<ExitCode> {
    let source = fs::read_to_string(&args.shader)
        .with_context(|| format!("failed to read shader {}", args.shader.display()))?;
    let report = check_source(&args.shader, &source);
    tracing::debug!(
        path = %report.path.display(),
        kind = %report.kind,
        errors = report.errors.len(),
        "checked shader"
    );

    match args.format {
        OutputFormat::Text => print!("{}", render_text(&report)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialise check report")?
        ),
    }

    Ok(if report.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// `path:line[:column]: severity: message`.
pub fn format_diagnostic(path: &Path, error: &StructuredError) -> String {
    match error.column {
        Some(column) => format!(
            "{}:{}:{}: {}: {}",
            path.display(),
            error.line,
            column,
            error.severity,
            error.message
        ),
        None => format!(
            "{}:{}: {}: {}",
            path.display(),
            error.line,
            error.severity,
            error.message
        ),
    }
}

fn render_text(report: &CheckReport) -> String {
    let mut out = format!("{}: {}\n", report.path.display(), report.kind);
    for warning in &report.warnings {
        out.push_str(&format!("{}: note: {warning}\n", report.path.display()));
    }
    for error in &report.errors {
        out.push_str(&format_diagnostic(&report.path, error));
        out.push('\n');
    }
    out
}
