use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use staph_predictor::config::{
    DEFAULT_COVG_HIST_LEN, DEFAULT_KMER_SIZE, DEFAULT_MAX_EXPECTED_SUP_LEN,
    DEFAULT_MAX_READ_LENGTH, DEFAULT_MEM_HEIGHT, DEFAULT_MEM_WIDTH,
};
use staph_predictor::graph::{BuildSummary, CleanSummary, GenomeGraph, GraphEngine, KmerLookup};
use staph_predictor::chunk_reader::SequenceReader;
use staph_predictor::oracle::{PanelOracle, SusceptibilityOracle};
use staph_predictor::panel::ResistancePanel;
use staph_predictor::reads::read_list_file;
use staph_predictor::stats::CoverageHistogram;
use staph_predictor::workspace::ScratchWorkspace;
use staph_predictor::{
    Antibiotic, BuildInfo, Orchestrator, PanelThresholds, RunConfiguration, Verdict,
};

/// Parse a number that may have a metric suffix (k/K=1e3, m/M=1e6, g/G=1e9)
fn parse_metric_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Empty string".to_string());
    }

    let (num_part, multiplier) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1e3),
        Some('m') | Some('M') => (&s[..s.len() - 1], 1e6),
        Some('g') | Some('G') => (&s[..s.len() - 1], 1e9),
        Some(c) if c.is_ascii_alphabetic() => {
            return Err(format!(
                "Unknown suffix '{c}'. Use k/K (1000), m/M (1e6), or g/G (1e9)"
            ))
        }
        _ => (s, 1.0),
    };

    let base: f64 = num_part
        .parse()
        .map_err(|e| format!("Invalid number: {e}"))?;
    let result = base * multiplier;
    if !(0.0..=u64::MAX as f64).contains(&result) {
        return Err(format!("Value {result} out of range"));
    }
    Ok(result as u64)
}

/// Predict antibiotic susceptibility of a Staphylococcus sample from raw reads
///
/// Reads are assembled into a k-mer graph, sequencing errors are cleaned out
/// using the expected depth, and the graph is searched for resistance genes
/// and mutations from the probe panel.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Read files (FASTA or FASTQ, optionally gzipped)
    #[clap(value_name = "READS")]
    reads: Vec<PathBuf>,

    /// File listing read files, one per line
    #[clap(short = '1', long = "list")]
    list: Option<PathBuf>,

    /// Probe panel directory (genes/ and variants/)
    #[clap(short = 'p', long = "panel")]
    panel: PathBuf,

    /// k-mer size (at most 31)
    #[clap(short = 'k', long = "kmer", default_value_t = DEFAULT_KMER_SIZE)]
    kmer_size: usize,

    /// log2 of the number of hash table buckets
    #[clap(short = 'm', long = "mem-height", default_value_t = DEFAULT_MEM_HEIGHT)]
    mem_height: u32,

    /// k-mers per hash table bucket
    #[clap(short = 'n', long = "mem-width", default_value_t = DEFAULT_MEM_WIDTH)]
    mem_width: usize,

    /// Expected genome size
    #[clap(short = 'g', long = "genome-size", default_value = "2.8m", value_parser = parse_metric_number)]
    genome_size: u64,

    /// Longest supernode considered for error cleaning
    #[clap(long = "max-expected-sup-len", default_value_t = DEFAULT_MAX_EXPECTED_SUP_LEN)]
    max_expected_sup_len: usize,

    /// Reads longer than this share one bin of the length distribution
    #[clap(long = "max-read-length", default_value_t = DEFAULT_MAX_READ_LENGTH)]
    max_read_length: usize,

    /// Size of the k-mer coverage histogram
    #[clap(long = "covg-hist-len", default_value_t = DEFAULT_COVG_HIST_LEN)]
    covg_hist_len: usize,

    /// Percentage of a gene's k-mers required to call it present
    #[clap(long = "min-gene-percent", default_value = "80")]
    min_gene_percent: u32,

    /// Percentage of a resistant allele's k-mers required to call the variant
    #[clap(long = "min-variant-percent", default_value = "100")]
    min_variant_percent: u32,

    /// Minimum median k-mer coverage for an allele to count
    #[clap(long = "min-coverage", default_value = "1")]
    min_coverage: u32,

    /// Quiet mode (no progress output)
    #[clap(short = 'q', long = "quiet")]
    quiet: bool,
}

impl Args {
    fn into_config(self) -> Result<RunConfiguration> {
        let mut read_files = self.reads;
        if let Some(list) = &self.list {
            let listed = read_list_file(list)
                .with_context(|| format!("Could not read list {}", list.display()))?;
            read_files.extend(listed);
        }

        Ok(RunConfiguration {
            kmer_size: self.kmer_size,
            mem_height: self.mem_height,
            mem_width: self.mem_width,
            read_files,
            max_expected_sup_len: self.max_expected_sup_len,
            genome_size: self.genome_size,
            max_read_length: self.max_read_length,
            covg_hist_len: self.covg_hist_len,
            panel_dir: self.panel,
            thresholds: PanelThresholds {
                min_gene_percent: self.min_gene_percent,
                min_variant_percent: self.min_variant_percent,
                min_coverage: self.min_coverage,
            },
        })
    }
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Graph engine that reports each phase on the spinner.
struct ProgressEngine {
    inner: GenomeGraph,
    spinner: ProgressBar,
}

impl KmerLookup for ProgressEngine {
    fn kmer_size(&self) -> usize {
        self.inner.kmer_size()
    }

    fn coverage(&self, kmer: u64) -> Option<u32> {
        self.inner.coverage(kmer)
    }
}

impl GraphEngine for ProgressEngine {
    fn build(&mut self, read_files: &[PathBuf]) -> staph_predictor::Result<BuildSummary> {
        self.spinner
            .set_message(format!("Building graph from {} read file(s)...", read_files.len()));
        self.inner.build(read_files)
    }

    fn clean(
        &mut self,
        coverage: &CoverageHistogram,
        expected_depth: u64,
        max_path_length: usize,
    ) -> staph_predictor::Result<CleanSummary> {
        self.spinner.set_message("Cleaning graph...");
        self.inner.clean(coverage, expected_depth, max_path_length)
    }
}

struct ProgressOracle {
    inner: PanelOracle,
    spinner: ProgressBar,
}

impl SusceptibilityOracle for ProgressOracle {
    fn is_susceptible(
        &mut self,
        antibiotic: Antibiotic,
        graph: &dyn KmerLookup,
        reader: &dyn SequenceReader,
        workspace: &mut ScratchWorkspace,
    ) -> staph_predictor::Result<Verdict> {
        self.spinner.set_message(format!("Testing {antibiotic}..."));
        self.inner.is_susceptible(antibiotic, graph, reader, workspace)
    }
}

fn run(args: Args) -> Result<()> {
    let quiet = args.quiet;
    let config = args.into_config()?;
    let panel = ResistancePanel::open(&config.panel_dir).context("Could not open probe panel")?;

    let spinner = spinner(quiet);
    let mut oracle = ProgressOracle {
        inner: PanelOracle::new(panel, config.thresholds),
        spinner: spinner.clone(),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let engine_spinner = spinner.clone();
    let result = Orchestrator::new(&config, BuildInfo::current()).run(
        move |cfg| {
            GenomeGraph::try_new(cfg).map(|inner| ProgressEngine {
                inner,
                spinner: engine_spinner,
            })
        },
        &mut oracle,
        &mut out,
    );

    match result {
        Ok(outcome) => {
            spinner.finish_with_message(format!(
                "All done! {} reads, expected depth {}, {} k-mers cleaned.",
                outcome.reads_loaded, outcome.stats.expected_depth, outcome.clean.kmers_removed
            ));
            Ok(())
        }
        Err(e) => {
            spinner.abandon_with_message("Prediction failed.");
            Err(e).context("Susceptibility prediction failed")
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{e:#}");
        std::process::exit(-1);
    }
}
