pub mod aggregate;
pub mod contrast;
pub mod lint;
pub mod rules;
pub mod table;

pub use aggregate::{
    aggregate, collect_trials, run_aggregation, write_tables, AggregateSummary, AggregateTables,
    FindingRecord, TableOutputs, TrialArtifacts,
};
pub use contrast::{contrast_finding, estimate_image_contrast, ContrastEstimate};
pub use lint::{lint_sources, lint_trial};
pub use rules::{findings_for, ChartType, SourceLinter, SourceSignals};
