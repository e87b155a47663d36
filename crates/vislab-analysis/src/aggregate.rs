use crate::table::render_table;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vislab_core::{
    atomic_write_bytes, ensure_dir, resolve_trial_dir, ExecutionRecord, Status, TrialFacets,
    TrialFileNames,
};
use walkdir::WalkDir;

pub const RUNS_CSV: &str = "runs.csv";
pub const FINDINGS_CSV: &str = "lint_summary.csv";
pub const VIOLATIONS_CSV: &str = "violations.csv";

pub const RUNS_HEADER: [&str; 13] = [
    "trial_id",
    "task",
    "model",
    "condition",
    "sample",
    "timestamp",
    "duration_sec",
    "returncode",
    "code_sha256",
    "image_exists",
    "image_sha256",
    "image_w",
    "image_h",
];

pub const FINDINGS_HEADER: [&str; 10] = [
    "trial_id",
    "task",
    "model",
    "condition",
    "sample",
    "rule",
    "status",
    "value",
    "detail",
    "ratio",
];

pub const VIOLATIONS_HEADER: [&str; 5] = ["task", "model", "condition", "rule", "violations"];

// Lenient view of one lint.json entry; older files may lack `status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FindingRecord {
    #[serde(default)]
    pub rule: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub ratio: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct TrialArtifacts {
    pub trial_dir: PathBuf,
    pub facets: TrialFacets,
    pub record: Option<ExecutionRecord>,
    pub findings: Vec<FindingRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub trial_id: String,
    pub facets: TrialFacets,
    pub record: Option<ExecutionRecord>,
}

impl RunRow {
    pub fn cells(&self) -> Vec<String> {
        let mut cells = facet_cells(&self.trial_id, &self.facets);
        match &self.record {
            Some(r) => {
                let size = r.image_size_px;
                cells.extend([
                    r.timestamp.clone(),
                    format!("{:.3}", r.duration_sec),
                    r.returncode.to_string(),
                    r.code_sha256.clone().unwrap_or_default(),
                    r.image_exists.to_string(),
                    r.image_sha256.clone().unwrap_or_default(),
                    size.map(|s| s.width.to_string()).unwrap_or_default(),
                    size.map(|s| s.height.to_string()).unwrap_or_default(),
                ]);
            }
            None => cells.extend(std::iter::repeat(String::new()).take(8)),
        }
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingRow {
    pub trial_id: String,
    pub facets: TrialFacets,
    pub rule: String,
    pub status: String,
    pub value: String,
    pub detail: String,
    pub ratio: String,
}

impl FindingRow {
    pub fn cells(&self) -> Vec<String> {
        let mut cells = facet_cells(&self.trial_id, &self.facets);
        cells.extend([
            self.rule.clone(),
            self.status.clone(),
            self.value.clone(),
            self.detail.clone(),
            self.ratio.clone(),
        ]);
        cells
    }

    pub fn is_violation(&self) -> bool {
        self.status
            .parse::<Status>()
            .map(Status::is_violation)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationCount {
    pub task: String,
    pub model: String,
    pub condition: String,
    pub rule: String,
    pub count: usize,
}

impl ViolationCount {
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.task.clone(),
            self.model.clone(),
            self.condition.clone(),
            self.rule.clone(),
            self.count.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateTables {
    pub runs: Vec<RunRow>,
    pub findings: Vec<FindingRow>,
    pub violations: Vec<ViolationCount>,
}

#[derive(Debug, Clone)]
pub struct TableOutputs {
    pub runs: PathBuf,
    pub findings: PathBuf,
    pub violations: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AggregateSummary {
    pub outputs: TableOutputs,
    pub run_rows: usize,
    pub finding_rows: usize,
    pub violation_rows: usize,
}

fn facet_cells(trial_id: &str, facets: &TrialFacets) -> Vec<String> {
    vec![
        trial_id.to_string(),
        facets.task.clone(),
        facets.model.clone(),
        facets.condition.clone(),
        facets.sample.clone(),
    ]
}

fn value_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn aggregate(trials: &[TrialArtifacts]) -> AggregateTables {
    let mut runs: Vec<RunRow> = trials
        .iter()
        .map(|t| RunRow {
            trial_id: t.facets.trial_id(),
            facets: t.facets.clone(),
            record: t.record.clone(),
        })
        .collect();
    runs.sort_by(|a, b| a.trial_id.cmp(&b.trial_id));

    let mut findings: Vec<FindingRow> = trials
        .iter()
        .flat_map(|t| {
            let trial_id = t.facets.trial_id();
            t.findings.iter().map(move |f| FindingRow {
                trial_id: trial_id.clone(),
                facets: t.facets.clone(),
                rule: value_cell(f.rule.as_ref()),
                status: value_cell(f.status.as_ref()),
                value: value_cell(f.value.as_ref()),
                detail: value_cell(f.detail.as_ref()),
                ratio: value_cell(f.ratio.as_ref()),
            })
        })
        .collect();
    findings.sort_by(|a, b| (&a.rule, &a.trial_id).cmp(&(&b.rule, &b.trial_id)));

    let counts = findings
        .iter()
        .filter(|row| row.is_violation())
        .fold(BTreeMap::new(), |mut acc, row| {
            let key = (
                row.facets.task.clone(),
                row.facets.model.clone(),
                row.facets.condition.clone(),
                row.rule.clone(),
            );
            *acc.entry(key).or_insert(0usize) += 1;
            acc
        });
    let violations = counts
        .into_iter()
        .map(|((task, model, condition, rule), count)| ViolationCount {
            task,
            model,
            condition,
            rule,
            count,
        })
        .collect();

    AggregateTables {
        runs,
        findings,
        violations,
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable file");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt file");
            None
        }
    }
}

// Facets come from the full storage path, so any sub-root of the runs tree
// yields the same task/model/condition/sample.
pub fn collect_trials(runs_root: &Path, files: &TrialFileNames) -> Result<Vec<TrialArtifacts>> {
    let runs_root = resolve_trial_dir(runs_root)?;
    let mut trials = Vec::new();
    for entry in WalkDir::new(&runs_root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || entry.file_name().to_str() != Some(files.record.as_str())
        {
            continue;
        }
        let trial_dir = entry.path().parent().unwrap_or(&runs_root).to_path_buf();
        let facets = TrialFacets::from_path(&trial_dir);
        if !facets.is_complete() {
            warn!(
                trial_dir = %trial_dir.display(),
                "trial path shallower than task/model/condition/sample; facets left blank"
            );
        }

        let record = read_json::<ExecutionRecord>(entry.path());
        let lint_path = trial_dir.join(&files.lint);
        let findings = if lint_path.is_file() {
            read_json::<Vec<FindingRecord>>(&lint_path).unwrap_or_default()
        } else {
            debug!(trial_dir = %trial_dir.display(), "no findings file");
            Vec::new()
        };
        trials.push(TrialArtifacts {
            trial_dir,
            facets,
            record,
            findings,
        });
    }
    Ok(trials)
}

pub fn write_tables(tables: &AggregateTables, out_dir: &Path) -> Result<TableOutputs> {
    ensure_dir(out_dir)?;
    let outputs = TableOutputs {
        runs: out_dir.join(RUNS_CSV),
        findings: out_dir.join(FINDINGS_CSV),
        violations: out_dir.join(VIOLATIONS_CSV),
    };
    atomic_write_bytes(
        &outputs.runs,
        render_table(&RUNS_HEADER, tables.runs.iter().map(RunRow::cells)).as_bytes(),
    )?;
    atomic_write_bytes(
        &outputs.findings,
        render_table(&FINDINGS_HEADER, tables.findings.iter().map(FindingRow::cells)).as_bytes(),
    )?;
    atomic_write_bytes(
        &outputs.violations,
        render_table(
            &VIOLATIONS_HEADER,
            tables.violations.iter().map(ViolationCount::cells),
        )
        .as_bytes(),
    )?;
    Ok(outputs)
}

pub fn run_aggregation(
    runs_root: &Path,
    out_dir: &Path,
    files: &TrialFileNames,
) -> Result<AggregateSummary> {
    let trials = collect_trials(runs_root, files)?;
    let tables = aggregate(&trials);
    let outputs = write_tables(&tables, out_dir)?;
    info!(
        runs_root = %runs_root.display(),
        trials = tables.runs.len(),
        findings = tables.findings.len(),
        violation_keys = tables.violations.len(),
        "aggregation written"
    );
    Ok(AggregateSummary {
        outputs,
        run_rows: tables.runs.len(),
        finding_rows: tables.findings.len(),
        violation_rows: tables.violations.len(),
    })
}
