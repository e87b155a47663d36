use anyhow::Result;
use regex::Regex;
use std::ops::Range;
use tracing::debug;
use vislab_core::{Finding, Rule, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartType {
    Histogram,
    Barh,
    Bar,
    Scatter,
    Line,
    Heatmap,
    Unknown,
}

impl ChartType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Histogram => "histogram",
            ChartType::Barh => "barh",
            ChartType::Bar => "bar",
            ChartType::Scatter => "scatter",
            ChartType::Line => "line",
            ChartType::Heatmap => "heatmap",
            ChartType::Unknown => "unknown",
        }
    }

    pub fn is_bar_like(self) -> bool {
        matches!(self, ChartType::Histogram | ChartType::Barh | ChartType::Bar)
    }
}

// Priority order: the first matching row decides the chart type.
const CHART_PATTERNS: &[(ChartType, &str)] = &[
    (ChartType::Histogram, r"\.(?:hist|histplot)\s*\(|kind\s*=\s*['\x22]hist['\x22]"),
    (ChartType::Barh, r"\.barh\s*\(|kind\s*=\s*['\x22]barh['\x22]"),
    (ChartType::Bar, r"\.(?:bar|barplot|countplot)\s*\(|kind\s*=\s*['\x22]bar['\x22]"),
    (ChartType::Scatter, r"\.(?:scatter|scatterplot)\s*\(|kind\s*=\s*['\x22]scatter['\x22]"),
    (ChartType::Line, r"\.(?:plot|lineplot)\s*\("),
    (ChartType::Heatmap, r"\b(?:imshow|pcolormesh|matshow|heatmap)\s*\("),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Title,
    XLabel,
    YLabel,
    Legend,
    Colorbar,
    ColorbarLabel,
    DualAxes,
    Seaborn,
}

const SIGNAL_PATTERNS: &[(Signal, &str)] = &[
    (
        Signal::Title,
        r"set_title\s*\(|\bplt\.title\s*\(|suptitle\s*\(|\.set\s*\([^)]*\btitle\s*=",
    ),
    (
        Signal::XLabel,
        r"set_xlabel\s*\(|\bplt\.xlabel\s*\(|\.set\s*\([^)]*\bxlabel\s*=",
    ),
    (
        Signal::YLabel,
        r"set_ylabel\s*\(|\bplt\.ylabel\s*\(|\.set\s*\([^)]*\bylabel\s*=",
    ),
    (Signal::Legend, r"\blegend\s*\("),
    (Signal::Colorbar, r"\bcolorbar\s*\("),
    (
        Signal::ColorbarLabel,
        r"\.set_label\s*\(|\bcolorbar\s*\([^)]*\blabel\s*=",
    ),
    (
        Signal::DualAxes,
        r"\btwin[xy]\s*\(|secondary_y\s*=\s*true|\bsecondary_[xy]axis\s*\(",
    ),
    (Signal::Seaborn, r"\bimport\s+seaborn|\bfrom\s+seaborn\b|\bsns\."),
];

const RNG_USE_PATTERN: &str = r"\b(?:np|numpy)\.random\.|\brandom\.";
const RNG_SEED_PATTERN: &str = concat!(
    r"(?:\b(?:np|numpy)\.)?\brandom\.seed\s*\(",
    r"|(?:\b(?:np|numpy)\.random\.)?\bdefault_rng\s*\(\s*(?:seed\s*=\s*)?\d+",
    r"|(?:\b(?:np|numpy)\.random\.)?\brandomstate\s*\(\s*(?:seed\s*=\s*)?\d+",
);

// Matched against source with all whitespace removed.
const BASELINE_Y_PATTERN: &str = concat!(
    r"(?:set_ylim|plt\.ylim)\(\[?(?:bottom=|ymin=)?0(?:\.0*)?[,)\]]",
    r"|\.set\([^)]*ylim=[(\[]0(?:\.0*)?,",
    r"|set_ybound\((?:lower=)?0(?:\.0*)?[,)]",
);
const BASELINE_X_PATTERN: &str = concat!(
    r"(?:set_xlim|plt\.xlim)\(\[?(?:left=|xmin=)?0(?:\.0*)?[,)\]]",
    r"|\.set\([^)]*xlim=[(\[]0(?:\.0*)?,",
    r"|set_xbound\((?:lower=)?0(?:\.0*)?[,)]",
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RngUsage {
    pub used: bool,
    pub seeded_before_use: bool,
}

impl RngUsage {
    pub fn unseeded(&self) -> bool {
        self.used && !self.seeded_before_use
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSignals {
    pub chart_type: ChartType,
    pub title: bool,
    pub xlabel: bool,
    pub ylabel: bool,
    pub legend: bool,
    pub colorbar: bool,
    pub colorbar_label: bool,
    pub dual_axes: bool,
    pub seaborn: bool,
    pub rng: RngUsage,
    pub baseline_zero: Option<bool>,
}

pub struct SourceLinter {
    charts: Vec<(ChartType, Regex)>,
    signals: Vec<(Signal, Regex)>,
    rng_use: Regex,
    rng_seed: Regex,
    baseline_y: Regex,
    baseline_x: Regex,
}

impl SourceLinter {
    pub fn new() -> Result<Self> {
        let charts = CHART_PATTERNS
            .iter()
            .map(|(kind, pattern)| Ok((*kind, Regex::new(pattern)?)))
            .collect::<Result<Vec<_>>>()?;
        let signals = SIGNAL_PATTERNS
            .iter()
            .map(|(signal, pattern)| Ok((*signal, Regex::new(pattern)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            charts,
            signals,
            rng_use: Regex::new(RNG_USE_PATTERN)?,
            rng_seed: Regex::new(RNG_SEED_PATTERN)?,
            baseline_y: Regex::new(BASELINE_Y_PATTERN)?,
            baseline_x: Regex::new(BASELINE_X_PATTERN)?,
        })
    }

    pub fn chart_type(&self, code: &str) -> ChartType {
        let lower = code.to_lowercase();
        self.charts
            .iter()
            .find(|(_, re)| re.is_match(&lower))
            .map(|(kind, _)| *kind)
            .unwrap_or(ChartType::Unknown)
    }

    fn has(&self, signal: Signal, lower: &str) -> bool {
        self.signals
            .iter()
            .any(|(s, re)| *s == signal && re.is_match(lower))
    }

    // A seeding call also matches the usage pattern; those hits are not usages.
    pub fn rng_usage(&self, code: &str) -> RngUsage {
        let lower = code.to_lowercase();
        let seeds: Vec<Range<usize>> = self.rng_seed.find_iter(&lower).map(|m| m.range()).collect();
        let first_use = self
            .rng_use
            .find_iter(&lower)
            .map(|m| m.range())
            .find(|u| !seeds.iter().any(|s| u.start < s.end && s.start < u.end));
        let first_seed = seeds.iter().map(|s| s.start).min();
        match (first_use, first_seed) {
            (None, _) => RngUsage {
                used: false,
                seeded_before_use: first_seed.is_some(),
            },
            (Some(u), Some(seed)) => RngUsage {
                used: true,
                seeded_before_use: seed < u.start,
            },
            (Some(_), None) => RngUsage {
                used: true,
                seeded_before_use: false,
            },
        }
    }

    pub fn baseline_zero(&self, code: &str, chart_type: ChartType) -> Option<bool> {
        if !chart_type.is_bar_like() {
            return None;
        }
        let compact: String = code
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let pinned_y = self.baseline_y.is_match(&compact);
        // Horizontal bars carry their values on x; a pinned y still counts.
        Some(match chart_type {
            ChartType::Barh => pinned_y || self.baseline_x.is_match(&compact),
            _ => pinned_y,
        })
    }

    pub fn inspect(&self, code: &str) -> SourceSignals {
        let lower = code.to_lowercase();
        let chart_type = self.chart_type(code);
        SourceSignals {
            chart_type,
            title: self.has(Signal::Title, &lower),
            xlabel: self.has(Signal::XLabel, &lower),
            ylabel: self.has(Signal::YLabel, &lower),
            legend: self.has(Signal::Legend, &lower),
            colorbar: self.has(Signal::Colorbar, &lower),
            colorbar_label: self.has(Signal::ColorbarLabel, &lower),
            dual_axes: self.has(Signal::DualAxes, &lower),
            seaborn: self.has(Signal::Seaborn, &lower),
            rng: self.rng_usage(code),
            baseline_zero: self.baseline_zero(code, chart_type),
        }
    }

    pub fn lint(&self, code: &str) -> Vec<Finding> {
        let signals = self.inspect(code);
        debug!(?signals, "source signals");
        findings_for(&signals)
    }
}

pub fn findings_for(signals: &SourceSignals) -> Vec<Finding> {
    let mut out = Vec::with_capacity(9);
    out.push(Finding::new(Rule::ChartType, Status::Info).with_value(signals.chart_type.as_str()));

    let present: Vec<&str> = [
        (signals.title, "title"),
        (signals.xlabel, "xlabel"),
        (signals.ylabel, "ylabel"),
    ]
    .iter()
    .filter(|(ok, _)| *ok)
    .map(|(_, name)| *name)
    .collect();
    let labels_ok = signals.title && signals.xlabel && signals.ylabel;
    out.push(
        Finding::new(
            Rule::LabelsPresent,
            if labels_ok { Status::Pass } else { Status::Fail },
        )
        .with_detail(present.join(",")),
    );

    if signals.chart_type == ChartType::Heatmap {
        out.push(
            Finding::new(Rule::LegendCall, Status::Info)
                .with_detail("legend() not required for heatmap"),
        );
        out.push(if signals.colorbar {
            Finding::new(Rule::ColorbarPresent, Status::Pass).with_detail("colorbar() detected")
        } else {
            Finding::new(Rule::ColorbarPresent, Status::Warn).with_detail("no colorbar() call")
        });
        let label_status = match (signals.colorbar_label, signals.colorbar) {
            (true, _) => Status::Pass,
            (false, true) => Status::Warn,
            (false, false) => Status::Info,
        };
        out.push(Finding::new(Rule::ColorbarLabel, label_status).with_detail(
            if signals.colorbar_label {
                "colorbar label set"
            } else {
                "no explicit colorbar label"
            },
        ));
    } else if signals.legend {
        out.push(Finding::new(Rule::LegendCall, Status::Pass).with_detail("legend() detected"));
    } else {
        out.push(Finding::new(Rule::LegendCall, Status::Warn).with_detail("no legend() call"));
    }

    out.push(if signals.dual_axes {
        Finding::new(Rule::DualAxes, Status::Fail).with_detail("twinx/twiny/secondary_y detected")
    } else {
        Finding::new(Rule::DualAxes, Status::Pass).with_detail("not detected")
    });

    out.push(if signals.rng.unseeded() {
        Finding::new(Rule::DeterminismSeed, Status::Fail).with_detail("rng without seed")
    } else {
        Finding::new(Rule::DeterminismSeed, Status::Pass).with_detail("no unseeded rng")
    });

    out.push(Finding::new(Rule::SeabornUsage, Status::Info).with_detail(if signals.seaborn {
        "seaborn used"
    } else {
        "not used"
    }));

    match signals.baseline_zero {
        Some(true) => out.push(
            Finding::new(Rule::BaselineZeroBar, Status::Pass).with_detail("baseline at 0 hinted"),
        ),
        Some(false) => out.push(
            Finding::new(Rule::BaselineZeroBar, Status::Warn)
                .with_detail("no explicit baseline enforcement"),
        ),
        None => {}
    }
    out
}
