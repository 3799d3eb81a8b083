//src/pipeline.rs

//! The fixed `build -> estimate -> clean -> query x N` sequence.
//!
//! Resources are scoped: the graph and the workspace are owned by
//! [`Orchestrator::run`] and dropped on every exit path, so an early failure
//! releases whatever was already acquired. The depth line and the verdict
//! lines are written only after the last query succeeds; a failed run prints
//! nothing past the banner.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use crate::chunk_reader::KmerContinuationReader;
use crate::config::RunConfiguration;
use crate::error::{PredictorError, Result};
use crate::graph::{CleanSummary, GraphEngine};
use crate::oracle::SusceptibilityOracle;
use crate::report::{depth_line, BuildInfo, SusceptibilityReport};
use crate::stats::LoadStatistics;
use crate::types::Antibiotic;
use crate::workspace::ScratchWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    GraphBuilt,
    StatsComputed,
    GraphCleaned,
    /// 1-based index into [`Antibiotic::ALL`].
    Querying(usize),
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Init => f.write_str("INIT"),
            PipelineState::GraphBuilt => f.write_str("GRAPH_BUILT"),
            PipelineState::StatsComputed => f.write_str("STATS_COMPUTED"),
            PipelineState::GraphCleaned => f.write_str("GRAPH_CLEANED"),
            PipelineState::Querying(i) => write!(f, "QUERYING({i}/{})", Antibiotic::ALL.len()),
            PipelineState::Done => f.write_str("DONE"),
            PipelineState::Failed => f.write_str("FAILED"),
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: LoadStatistics,
    pub reads_loaded: u64,
    pub clean: CleanSummary,
    pub report: SusceptibilityReport,
}

pub struct Orchestrator<'a> {
    config: &'a RunConfiguration,
    build_info: BuildInfo,
    state: PipelineState,
}

fn stdout_error(e: std::io::Error) -> PredictorError {
    PredictorError::io(PathBuf::from("<output>"), e)
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a RunConfiguration, build_info: BuildInfo) -> Self {
        Self {
            config,
            build_info,
            state: PipelineState::Init,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn advance(&mut self, next: PipelineState) {
        log::debug!("pipeline {} -> {}", self.state, next);
        self.state = next;
    }

    /// Run the pipeline once. `acquire_engine` allocates the graph engine;
    /// any error moves the orchestrator to `Failed` and is returned as is.
    pub fn run<E, A, O, W>(
        &mut self,
        acquire_engine: A,
        oracle: &mut O,
        out: &mut W,
    ) -> Result<RunOutcome>
    where
        E: GraphEngine,
        A: FnOnce(&RunConfiguration) -> Result<E>,
        O: SusceptibilityOracle + ?Sized,
        W: Write + ?Sized,
    {
        self.run_with_workspace(acquire_engine, ScratchWorkspace::try_new, oracle, out)
    }

    /// Like [`Orchestrator::run`], with the scratch workspace allocated by
    /// `acquire_workspace` from the engine's k-mer size.
    pub fn run_with_workspace<E, A, S, O, W>(
        &mut self,
        acquire_engine: A,
        acquire_workspace: S,
        oracle: &mut O,
        out: &mut W,
    ) -> Result<RunOutcome>
    where
        E: GraphEngine,
        A: FnOnce(&RunConfiguration) -> Result<E>,
        S: FnOnce(usize) -> Result<ScratchWorkspace>,
        O: SusceptibilityOracle + ?Sized,
        W: Write + ?Sized,
    {
        if self.state != PipelineState::Init {
            return Err(PredictorError::InvalidConfig(format!(
                "pipeline cannot be restarted from state {}",
                self.state
            )));
        }
        match self.execute(acquire_engine, acquire_workspace, oracle, out) {
            Ok(outcome) => {
                self.advance(PipelineState::Done);
                Ok(outcome)
            }
            Err(e) => {
                log::error!("pipeline failed in state {}: {}", self.state, e);
                self.advance(PipelineState::Failed);
                Err(e)
            }
        }
    }

    fn execute<E, A, S, O, W>(
        &mut self,
        acquire_engine: A,
        acquire_workspace: S,
        oracle: &mut O,
        out: &mut W,
    ) -> Result<RunOutcome>
    where
        E: GraphEngine,
        A: FnOnce(&RunConfiguration) -> Result<E>,
        S: FnOnce(usize) -> Result<ScratchWorkspace>,
        O: SusceptibilityOracle + ?Sized,
        W: Write + ?Sized,
    {
        let config = self.config;
        writeln!(out, "{}", self.build_info.banner()).map_err(stdout_error)?;
        config.validate()?;

        let mut graph = acquire_engine(config)?;
        let mut workspace = acquire_workspace(graph.kmer_size())?;

        let built = graph.build(&config.read_files)?;
        self.advance(PipelineState::GraphBuilt);

        let stats = LoadStatistics::compute(
            &built.read_lengths,
            built.bases_loaded,
            config.kmer_size,
            config.genome_size,
        )?;
        self.advance(PipelineState::StatsComputed);
        log::info!(
            "Mean read length {}, {} bp loaded, genome size {}, expected depth {}",
            stats.mean_read_length,
            stats.bp_loaded,
            config.genome_size,
            stats.expected_depth
        );

        let clean = graph.clean(
            &built.coverage,
            stats.expected_depth,
            config.max_expected_sup_len,
        )?;
        self.advance(PipelineState::GraphCleaned);

        let reader = KmerContinuationReader::new(graph.kmer_size());
        let mut report = SusceptibilityReport::with_capacity(Antibiotic::ALL.len());
        for (i, &antibiotic) in Antibiotic::ALL.iter().enumerate() {
            self.advance(PipelineState::Querying(i + 1));
            let verdict = oracle.is_susceptible(antibiotic, &graph, &reader, &mut workspace)?;
            report.push(antibiotic, verdict);
        }

        writeln!(out, "{}", depth_line(stats.expected_depth)).map_err(stdout_error)?;
        report.write_to(out).map_err(stdout_error)?;
        out.flush().map_err(stdout_error)?;

        workspace.release();
        drop(graph);

        Ok(RunOutcome {
            stats,
            reads_loaded: built.reads_loaded,
            clean,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(PipelineState::Init.to_string(), "INIT");
        assert_eq!(PipelineState::Querying(3).to_string(), "QUERYING(3/7)");
        assert_eq!(PipelineState::Failed.to_string(), "FAILED");
    }
}
