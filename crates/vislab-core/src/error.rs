use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VislabError {
    #[error("missing input: {}", path.display())]
    MissingInput { path: PathBuf },
    #[error("trial folder not found: {}", path.display())]
    TrialDirNotFound { path: PathBuf },
    #[error("invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl VislabError {
    pub fn missing_input(path: impl Into<PathBuf>) -> Self {
        Self::MissingInput { path: path.into() }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInput { .. } => "missing_input",
            Self::TrialDirNotFound { .. } => "trial_dir_not_found",
            Self::Config { .. } => "invalid_config",
        }
    }
}
