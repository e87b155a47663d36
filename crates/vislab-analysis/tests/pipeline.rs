#![cfg(unix)]

use chrono::Utc;
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use vislab_analysis::{lint_trial, run_aggregation};
use vislab_core::{ensure_dir, HarnessConfig, Rule, Status};
use vislab_runner::run_trial;

const CANDIDATE: &str = "\
# plt.bar(df[\"k\"], df[\"v\"])
# plt.title(\"totals\"); plt.xlabel(\"k\"); plt.ylabel(\"v\")
cp fixture.png chart.png
";

struct Workspace {
    root: PathBuf,
}

impl Workspace {
    fn new(tag: &str) -> Self {
        let root = std::env::temp_dir().join(format!(
            "vislab_pipeline_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        ensure_dir(&root).expect("root");
        Self { root }
    }

    fn runs(&self) -> PathBuf {
        self.root.join("runs")
    }

    fn reports(&self) -> PathBuf {
        self.root.join("reports")
    }

    fn trial(&self, sample: &str, ink: u8) -> PathBuf {
        let dir = self.runs().join("t01_bars").join("grok").join("baseline").join(sample);
        ensure_dir(&dir).expect("trial");
        fs::write(dir.join("code.py"), CANDIDATE).expect("code");
        fs::write(dir.join("data.csv"), "k,v\na,1\nb,3\n").expect("data");
        page_with_block(ink).save(dir.join("fixture.png")).expect("fixture");
        dir
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn page_with_block(ink: u8) -> RgbImage {
    let mut img = RgbImage::from_pixel(80, 60, Rgb([255, 255, 255]));
    for y in 20..40 {
        for x in 20..60 {
            img.put_pixel(x, y, Rgb([ink, ink, ink]));
        }
    }
    img
}

fn sh_config() -> HarnessConfig {
    HarnessConfig {
        interpreter: "sh".to_string(),
        timeout_secs: 10,
        ..HarnessConfig::default()
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("csv")
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn identical_code_different_images_share_only_the_code_digest() {
    let ws = Workspace::new("digests");
    let config = sh_config();
    let dark = run_trial(&ws.trial("s1", 0), &config).expect("run s1");
    let grey = run_trial(&ws.trial("s2", 180), &config).expect("run s2");

    assert_eq!(dark.returncode, 0);
    assert!(dark.image_exists && grey.image_exists);
    assert_eq!(dark.code_sha256, grey.code_sha256);
    assert_ne!(dark.image_sha256, grey.image_sha256);
    assert_eq!(dark.image_size_px.map(|s| (s.width, s.height)), Some((80, 60)));
}

#[test]
fn run_lint_aggregate_end_to_end() {
    let ws = Workspace::new("e2e");
    let config = sh_config();

    let s1 = ws.trial("s1", 0);
    let s2 = ws.trial("s2", 180);
    let s3 = ws.trial("s3", 0);
    for trial in [&s1, &s2, &s3] {
        run_trial(trial, &config).expect("run");
    }
    let passing = lint_trial(&s1, &config).expect("lint s1");
    let failing = lint_trial(&s2, &config).expect("lint s2");
    // s3 is executed but never linted.

    let chart = passing.iter().find(|f| f.rule == Rule::ChartType).expect("chart");
    assert_eq!(chart.value.as_deref(), Some("bar"));
    let contrast_of = |findings: &[vislab_core::Finding]| {
        findings
            .iter()
            .find(|f| f.rule == Rule::ContrastText)
            .map(|f| f.status)
    };
    assert_eq!(contrast_of(&passing), Some(Status::Pass));
    assert_eq!(contrast_of(&failing), Some(Status::Fail));

    let corrupt = ws.runs().join("t01_bars").join("grok").join("baseline").join("s4");
    ensure_dir(&corrupt).expect("s4");
    fs::write(corrupt.join("run.json"), "{ not json").expect("corrupt record");

    let summary = run_aggregation(&ws.runs(), &ws.reports(), &config.files).expect("aggregate");
    assert_eq!(summary.run_rows, 4);
    assert_eq!(summary.finding_rows, passing.len() + failing.len());

    let runs = read_lines(&summary.outputs.runs);
    assert_eq!(runs.len(), 5);
    assert!(runs[0].starts_with("trial_id,task,model,condition,sample,timestamp"));
    assert!(runs[1].starts_with("t01_bars__grok__baseline__s1,t01_bars,grok,baseline,s1,"));
    assert!(runs[1].ends_with(",80,60"));
    assert_eq!(runs[4], "t01_bars__grok__baseline__s4,t01_bars,grok,baseline,s4,,,,,,,,");

    let violations = read_lines(&summary.outputs.violations);
    assert_eq!(
        violations,
        vec![
            "task,model,condition,rule,violations",
            "t01_bars,grok,baseline,baseline_zero_bar,2",
            "t01_bars,grok,baseline,contrast_text,1",
            "t01_bars,grok,baseline,legend_call,2",
        ]
    );

    let findings = read_lines(&summary.outputs.findings);
    assert_eq!(findings[0], "trial_id,task,model,condition,sample,rule,status,value,detail,ratio");
    let rules: Vec<&str> = findings[1..]
        .iter()
        .map(|line| line.split(',').nth(5).unwrap_or_default())
        .collect();
    let mut sorted = rules.clone();
    sorted.sort();
    assert_eq!(rules, sorted);

    // A second aggregation replaces the tables rather than appending.
    let again = run_aggregation(&ws.runs(), &ws.reports(), &config.files).expect("again");
    assert_eq!(read_lines(&again.outputs.runs).len(), 5);
}

#[test]
fn missing_runs_root_is_fatal() {
    let ws = Workspace::new("no_root");
    let err = run_aggregation(&ws.runs(), &ws.reports(), &sh_config().files)
        .expect_err("must fail");
    assert_eq!(
        err.downcast_ref::<vislab_core::VislabError>().map(|e| e.code()),
        Some("trial_dir_not_found")
    );
    assert!(!ws.reports().exists());
}
