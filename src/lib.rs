// src/lib.rs
pub mod types;
pub mod error;
pub mod config;
pub mod kmer;
pub mod stats;
pub mod reads;
pub mod chunk_reader;
pub mod graph;
pub mod workspace;
pub mod panel;
pub mod oracle;
pub mod report;
pub mod pipeline;

use std::io::Write;

pub use crate::config::{PanelThresholds, RunConfiguration};
pub use crate::error::{PredictorError, Result};
pub use crate::pipeline::{Orchestrator, PipelineState, RunOutcome};
pub use crate::report::{BuildInfo, SusceptibilityReport};
pub use crate::types::{Antibiotic, Verdict};

use crate::graph::GenomeGraph;
use crate::oracle::PanelOracle;
use crate::panel::ResistancePanel;

/// Unified entry point: build the graph from `config.read_files`, clean it,
/// query the panel in `config.panel_dir` for every antibiotic and write the
/// report to `out`.
pub fn predict_susceptibility<W: Write + ?Sized>(
    config: &RunConfiguration,
    out: &mut W,
) -> Result<RunOutcome> {
    let panel = ResistancePanel::open(&config.panel_dir)?;
    let mut oracle = PanelOracle::new(panel, config.thresholds);

    Orchestrator::new(config, BuildInfo::current()).run(GenomeGraph::try_new, &mut oracle, out)
}
