use crate::config::TrialFileNames;
use crate::error::VislabError;
use anyhow::Result;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

pub const FACET_ARITY: usize = 4;
pub const RECORD_ID_ARITY: usize = 5;

#[derive(Debug, Clone)]
pub struct TrialPaths {
    pub trial_dir: PathBuf,
    pub code: PathBuf,
    pub data: PathBuf,
    pub image: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub record: PathBuf,
    pub lint: PathBuf,
}

impl TrialPaths {
    pub fn new(trial_dir: &Path, files: &TrialFileNames) -> Self {
        Self {
            trial_dir: trial_dir.to_path_buf(),
            code: trial_dir.join(&files.code),
            data: trial_dir.join(&files.data),
            image: trial_dir.join(&files.image),
            stdout: trial_dir.join(&files.stdout),
            stderr: trial_dir.join(&files.stderr),
            record: trial_dir.join(&files.record),
            lint: trial_dir.join(&files.lint),
        }
    }

    pub fn run_outputs(&self) -> [&Path; 4] {
        [&self.image, &self.stdout, &self.stderr, &self.record]
    }
}

pub fn resolve_trial_dir(trial_dir: &Path) -> Result<PathBuf> {
    match trial_dir.canonicalize() {
        Ok(resolved) if resolved.is_dir() => Ok(resolved),
        _ => Err(VislabError::TrialDirNotFound {
            path: trial_dir.to_path_buf(),
        }
        .into()),
    }
}

fn normal_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect()
}

// task__instance__model__condition__sample taken from the trailing path segments.
pub fn record_trial_id(trial_dir: &Path) -> Option<String> {
    let parts = normal_components(trial_dir);
    if parts.len() < RECORD_ID_ARITY {
        return None;
    }
    Some(parts[parts.len() - RECORD_ID_ARITY..].join("__"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TrialFacets {
    pub task: String,
    pub model: String,
    pub condition: String,
    pub sample: String,
}

impl TrialFacets {
    // Right-aligned on the last four segments; missing leading facets stay empty.
    pub fn from_path(path: &Path) -> Self {
        let parts = normal_components(path);
        let mut slots: [String; FACET_ARITY] = Default::default();
        let take = parts.len().min(FACET_ARITY);
        for (i, part) in parts[parts.len() - take..].iter().enumerate() {
            slots[FACET_ARITY - take + i] = part.clone();
        }
        let [task, model, condition, sample] = slots;
        Self {
            task,
            model,
            condition,
            sample,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.task.is_empty()
            && !self.model.is_empty()
            && !self.condition.is_empty()
            && !self.sample.is_empty()
    }

    pub fn trial_id(&self) -> String {
        format!(
            "{}__{}__{}__{}",
            self.task, self.model, self.condition, self.sample
        )
    }
}
