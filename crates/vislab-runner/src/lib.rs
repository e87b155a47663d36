mod process;

pub use process::{run_isolated, timeout_marker, ProcessOutcome, ProcessSpec};

use anyhow::{Context, Result};
use chrono::Local;
use std::path::Path;
use tracing::{debug, info, warn};
use vislab_core::trial::record_trial_id;
use vislab_core::{
    atomic_write_json_pretty, remove_if_exists, resolve_trial_dir, sha256_file_if_exists,
    ExecutionRecord, HarnessConfig, ImageSize, TrialPaths, VislabError,
};

pub fn check_run_inputs(paths: &TrialPaths) -> Result<()> {
    for required in [&paths.code, &paths.data] {
        if !required.is_file() {
            return Err(VislabError::missing_input(required.clone()).into());
        }
    }
    Ok(())
}

pub fn clear_run_outputs(paths: &TrialPaths) -> Result<()> {
    for stale in paths.run_outputs() {
        if remove_if_exists(stale)? {
            debug!(path = %stale.display(), "removed stale artifact");
        }
    }
    Ok(())
}

pub fn run_trial(trial_dir: &Path, config: &HarnessConfig) -> Result<ExecutionRecord> {
    let trial_dir = resolve_trial_dir(trial_dir)?;
    let paths = TrialPaths::new(&trial_dir, &config.files);
    check_run_inputs(&paths)?;
    clear_run_outputs(&paths)?;

    let timeout = config.timeout();
    let outcome = run_isolated(&ProcessSpec {
        interpreter: &config.interpreter,
        script: &paths.code,
        cwd: &trial_dir,
        env: &config.env,
        stdout_path: &paths.stdout,
        stderr_path: &paths.stderr,
        timeout,
    })
    .with_context(|| format!("trial {}", trial_dir.display()))?;
    if outcome.timed_out {
        warn!(
            trial_dir = %trial_dir.display(),
            timeout_secs = timeout.as_secs(),
            "candidate exceeded wall-clock limit"
        );
    }

    let record = build_record(&paths, &outcome)?;
    atomic_write_json_pretty(&paths.record, &record)?;
    info!(
        trial_dir = %trial_dir.display(),
        returncode = record.returncode,
        duration_sec = record.duration_sec,
        image_exists = record.image_exists,
        "trial executed"
    );
    Ok(record)
}

fn build_record(paths: &TrialPaths, outcome: &ProcessOutcome) -> Result<ExecutionRecord> {
    let code_sha256 = digest_or_warn(&paths.code);
    let image_exists = paths.image.exists();
    let image_sha256 = digest_or_warn(&paths.image);
    let image_size_px = if image_sha256.is_some() {
        read_image_size(&paths.image)
    } else {
        None
    };
    Ok(ExecutionRecord {
        trial_id: record_trial_id(&paths.trial_dir),
        trial_dir: paths.trial_dir.to_string_lossy().to_string(),
        timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        duration_sec: round_millis(outcome.elapsed.as_secs_f64()),
        returncode: outcome.returncode,
        code_sha256,
        image_exists,
        image_sha256,
        image_size_px,
    })
}

// The candidate has already run; an unreadable artifact must not cost the record.
fn digest_or_warn(path: &Path) -> Option<String> {
    match sha256_file_if_exists(path) {
        Ok(digest) => digest,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "artifact digest unavailable");
            None
        }
    }
}

fn read_image_size(path: &Path) -> Option<ImageSize> {
    match image::image_dimensions(path) {
        Ok((width, height)) => Some(ImageSize { width, height }),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "image dimensions unavailable");
            None
        }
    }
}

fn round_millis(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}
