use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Real exit codes are non-negative (signals are reported as 128 + signo).
pub const TIMEOUT_RETURNCODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(default)]
    pub trial_id: Option<String>,
    #[serde(default)]
    pub trial_dir: String,
    #[serde(default)]
    pub timestamp: String,
    pub duration_sec: f64,
    pub returncode: i32,
    #[serde(default)]
    pub code_sha256: Option<String>,
    #[serde(default)]
    pub image_exists: bool,
    #[serde(default)]
    pub image_sha256: Option<String>,
    #[serde(default)]
    pub image_size_px: Option<ImageSize>,
}

impl ExecutionRecord {
    pub fn timed_out(&self) -> bool {
        self.returncode == TIMEOUT_RETURNCODE
    }

    pub fn image_fields_consistent(&self) -> bool {
        self.image_exists || (self.image_sha256.is_none() && self.image_size_px.is_none())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    ChartType,
    LabelsPresent,
    LegendCall,
    ColorbarPresent,
    ColorbarLabel,
    DualAxes,
    DeterminismSeed,
    SeabornUsage,
    BaselineZeroBar,
    ContrastText,
}

impl Rule {
    pub const ALL: [Rule; 10] = [
        Rule::ChartType,
        Rule::LabelsPresent,
        Rule::LegendCall,
        Rule::ColorbarPresent,
        Rule::ColorbarLabel,
        Rule::DualAxes,
        Rule::DeterminismSeed,
        Rule::SeabornUsage,
        Rule::BaselineZeroBar,
        Rule::ContrastText,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Rule::ChartType => "chart_type",
            Rule::LabelsPresent => "labels_present",
            Rule::LegendCall => "legend_call",
            Rule::ColorbarPresent => "colorbar_present",
            Rule::ColorbarLabel => "colorbar_label",
            Rule::DualAxes => "dual_axes",
            Rule::DeterminismSeed => "determinism_seed",
            Rule::SeabornUsage => "seaborn_usage",
            Rule::BaselineZeroBar => "baseline_zero_bar",
            Rule::ContrastText => "contrast_text",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    Warn,
    Info,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Warn => "warn",
            Status::Info => "info",
            Status::Error => "error",
        }
    }

    pub fn is_violation(self) -> bool {
        matches!(self, Status::Fail | Status::Warn)
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Status::Pass),
            "fail" => Ok(Status::Fail),
            "warn" => Ok(Status::Warn),
            "info" => Ok(Status::Info),
            "error" => Ok(Status::Error),
            other => Err(format!("unknown finding status: {}", other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: Rule,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_text: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_graphics: Option<f64>,
}

impl Finding {
    pub fn new(rule: Rule, status: Status) -> Self {
        Self {
            rule,
            status,
            value: None,
            detail: None,
            ratio: None,
            threshold_text: None,
            threshold_graphics: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
