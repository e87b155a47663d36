use crate::contrast::contrast_finding;
use crate::rules::SourceLinter;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;
use vislab_core::{
    atomic_write_json_pretty, resolve_trial_dir, Finding, HarnessConfig, TrialPaths, VislabError,
};

pub fn lint_sources(code: &str, image: &Path, config: &HarnessConfig) -> Result<Vec<Finding>> {
    let mut findings = SourceLinter::new()?.lint(code);
    findings.push(contrast_finding(image, &config.contrast));
    Ok(findings)
}

pub fn lint_trial(trial_dir: &Path, config: &HarnessConfig) -> Result<Vec<Finding>> {
    let trial_dir = resolve_trial_dir(trial_dir)?;
    let paths = TrialPaths::new(&trial_dir, &config.files);
    for required in [&paths.code, &paths.image] {
        if !required.is_file() {
            return Err(VislabError::missing_input(required.clone()).into());
        }
    }

    let bytes = fs::read(&paths.code).with_context(|| format!("read {}", paths.code.display()))?;
    let code = String::from_utf8_lossy(&bytes);
    let findings = lint_sources(&code, &paths.image, config)?;

    atomic_write_json_pretty(&paths.lint, &findings)?;
    info!(
        trial_dir = %trial_dir.display(),
        findings = findings.len(),
        violations = findings.iter().filter(|f| f.status.is_violation()).count(),
        "trial linted"
    );
    Ok(findings)
}
