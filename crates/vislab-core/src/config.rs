use crate::error::VislabError;
use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const INTERPRETER_ENV: &str = "VISLAB_PYTHON";
const BACKEND_ENV: &str = "MPLBACKEND";
const HEADLESS_BACKEND: &str = "Agg";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub interpreter: String,
    pub timeout_secs: u64,
    pub env: BTreeMap<String, String>,
    pub files: TrialFileNames,
    pub contrast: ContrastThresholds,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert(BACKEND_ENV.to_string(), HEADLESS_BACKEND.to_string());
        Self {
            interpreter: "python3".to_string(),
            timeout_secs: 60,
            env,
            files: TrialFileNames::default(),
            contrast: ContrastThresholds::default(),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        if let Ok(interpreter) = std::env::var(INTERPRETER_ENV) {
            if !interpreter.trim().is_empty() {
                debug!(
                    interpreter = %interpreter,
                    "interpreter overridden from {}", INTERPRETER_ENV
                );
                config.interpreter = interpreter;
            }
        }
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| VislabError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut config: Self = serde_yaml::from_str(&raw).map_err(|e| VislabError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        // A custom env table still renders headless unless it names a backend itself.
        config
            .env
            .entry(BACKEND_ENV.to_string())
            .or_insert_with(|| HEADLESS_BACKEND.to_string());
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: String| VislabError::Config {
            path: path.to_path_buf(),
            message,
        };
        if self.interpreter.trim().is_empty() {
            return Err(invalid("interpreter must not be empty".to_string()).into());
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be at least 1".to_string()).into());
        }
        if self.contrast.warn_ratio > self.contrast.pass_ratio {
            return Err(invalid(format!(
                "contrast.warn_ratio ({}) exceeds contrast.pass_ratio ({})",
                self.contrast.warn_ratio, self.contrast.pass_ratio
            ))
            .into());
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrialFileNames {
    pub code: String,
    pub data: String,
    pub image: String,
    pub stdout: String,
    pub stderr: String,
    pub record: String,
    pub lint: String,
}

impl Default for TrialFileNames {
    fn default() -> Self {
        Self {
            code: "code.py".to_string(),
            data: "data.csv".to_string(),
            image: "chart.png".to_string(),
            stdout: "stdout.txt".to_string(),
            stderr: "stderr.txt".to_string(),
            record: "run.json".to_string(),
            lint: "lint.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContrastThresholds {
    pub pass_ratio: f64,
    pub warn_ratio: f64,
}

impl Default for ContrastThresholds {
    fn default() -> Self {
        Self {
            pass_ratio: 4.5,
            warn_ratio: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn write_config(tag: &str, body: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "vislab_config_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("vislab.yaml");
        fs::write(&path, body).expect("write config");
        (dir, path)
    }

    #[test]
    fn defaults_force_headless_backend_and_sixty_second_timeout() {
        let config = HarnessConfig::default();
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.env.get("MPLBACKEND").map(String::as_str), Some("Agg"));
        assert_eq!(config.files.code, "code.py");
        assert_eq!(config.files.record, "run.json");
        assert_eq!(config.contrast.pass_ratio, 4.5);
        assert_eq!(config.contrast.warn_ratio, 3.0);
    }

    #[test]
    fn partial_yaml_keeps_unspecified_defaults() {
        let (dir, path) = write_config(
            "partial",
            "interpreter: sh\ntimeout_secs: 5\nfiles:\n  image: out.png\n",
        );
        let config = HarnessConfig::from_yaml_file(&path).expect("parse");
        assert_eq!(config.interpreter, "sh");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.files.image, "out.png");
        assert_eq!(config.files.code, "code.py");
        assert_eq!(config.contrast.pass_ratio, 4.5);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let (dir, path) = write_config("unknown", "timeout: 5\n");
        let err = HarnessConfig::from_yaml_file(&path).expect_err("must reject");
        assert!(matches!(
            err.downcast_ref::<VislabError>(),
            Some(VislabError::Config { .. })
        ));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let (dir, path) = write_config("zero", "timeout_secs: 0\n");
        let err = HarnessConfig::from_yaml_file(&path).expect_err("must reject");
        assert!(err.to_string().contains("timeout_secs"), "{}", err);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn inverted_contrast_thresholds_are_rejected() {
        let (dir, path) = write_config(
            "contrast",
            "contrast:\n  pass_ratio: 3.0\n  warn_ratio: 4.5\n",
        );
        assert!(HarnessConfig::from_yaml_file(&path).is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn custom_env_table_keeps_headless_backend() {
        let (dir, path) = write_config("env", "env:\n  PYTHONHASHSEED: \"0\"\n");
        let config = HarnessConfig::from_yaml_file(&path).expect("parse");
        assert_eq!(config.env.get("PYTHONHASHSEED").map(String::as_str), Some("0"));
        assert_eq!(config.env.get("MPLBACKEND").map(String::as_str), Some("Agg"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let err = HarnessConfig::from_yaml_file(Path::new("/nonexistent/vislab.yaml"))
            .expect_err("missing file");
        assert_eq!(
            err.downcast_ref::<VislabError>().map(|e| e.code()),
            Some("invalid_config")
        );
    }
}
