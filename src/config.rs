//src/config.rs

use std::path::PathBuf;

use crate::error::{PredictorError, Result};
use crate::kmer::MAX_KMER_SIZE;

/// Calling thresholds used when scoring panel probes against the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelThresholds {
    /// Percentage of a gene allele's k-mers that must be present.
    pub min_gene_percent: u32,
    /// Percentage of a resistant variant allele's k-mers that must be present.
    pub min_variant_percent: u32,
    /// Minimum median coverage for an allele to count as present.
    pub min_coverage: u32,
}

impl Default for PanelThresholds {
    fn default() -> Self {
        Self {
            min_gene_percent: 80,
            min_variant_percent: 100,
            min_coverage: 1,
        }
    }
}

/// Everything a run needs, fixed before the pipeline starts.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub kmer_size: usize,
    /// log2 of the number of hash buckets.
    pub mem_height: u32,
    /// k-mers per bucket.
    pub mem_width: usize,
    pub read_files: Vec<PathBuf>,
    /// Longest supernode considered for error removal.
    pub max_expected_sup_len: usize,
    pub genome_size: u64,
    /// Size of the read-length distribution; longer reads share the last bin.
    pub max_read_length: usize,
    /// Size of the k-mer coverage histogram.
    pub covg_hist_len: usize,
    pub panel_dir: PathBuf,
    pub thresholds: PanelThresholds,
}

pub const DEFAULT_KMER_SIZE: usize = 15;
pub const DEFAULT_MEM_HEIGHT: u32 = 16;
pub const DEFAULT_MEM_WIDTH: usize = 100;
pub const DEFAULT_GENOME_SIZE: u64 = 2_800_000;
pub const DEFAULT_MAX_EXPECTED_SUP_LEN: usize = 10_000;
pub const DEFAULT_MAX_READ_LENGTH: usize = 20_000;
pub const DEFAULT_COVG_HIST_LEN: usize = 10_000;

/// k must fit the 2-bit `u64` encoding.
pub fn check_kmer_size(kmer_size: usize) -> Result<()> {
    if kmer_size == 0 || kmer_size > MAX_KMER_SIZE {
        return Err(PredictorError::InvalidConfig(format!(
            "k-mer size must be between 1 and {MAX_KMER_SIZE}, got {kmer_size}"
        )));
    }
    Ok(())
}

impl RunConfiguration {
    /// Defaults for a Staphylococcus run over `read_files`.
    pub fn for_reads(read_files: Vec<PathBuf>, panel_dir: impl Into<PathBuf>) -> Self {
        Self {
            kmer_size: DEFAULT_KMER_SIZE,
            mem_height: DEFAULT_MEM_HEIGHT,
            mem_width: DEFAULT_MEM_WIDTH,
            read_files,
            max_expected_sup_len: DEFAULT_MAX_EXPECTED_SUP_LEN,
            genome_size: DEFAULT_GENOME_SIZE,
            max_read_length: DEFAULT_MAX_READ_LENGTH,
            covg_hist_len: DEFAULT_COVG_HIST_LEN,
            panel_dir: panel_dir.into(),
            thresholds: PanelThresholds::default(),
        }
    }

    /// Reject configurations that can never produce a run. A zero genome size
    /// passes here; the depth estimate rejects it.
    pub fn validate(&self) -> Result<()> {
        check_kmer_size(self.kmer_size)?;
        if self.read_files.is_empty() {
            return Err(PredictorError::InvalidConfig(
                "no read files given".to_string(),
            ));
        }
        if self.max_expected_sup_len == 0 {
            return Err(PredictorError::InvalidConfig(
                "maximum supernode length must be positive".to_string(),
            ));
        }
        if self.max_read_length == 0 || self.covg_hist_len == 0 {
            return Err(PredictorError::InvalidConfig(
                "read-length distribution and coverage histogram sizes must be positive".to_string(),
            ));
        }
        for (name, pct) in [
            ("gene", self.thresholds.min_gene_percent),
            ("variant", self.thresholds.min_variant_percent),
        ] {
            if pct > 100 {
                return Err(PredictorError::InvalidConfig(format!(
                    "minimum {name} percentage must be at most 100, got {pct}"
                )));
            }
        }
        self.table_capacity().map(|_| ())
    }

    /// Number of k-mers the graph can hold: `2^mem_height * mem_width`.
    pub fn table_capacity(&self) -> Result<usize> {
        if self.mem_width == 0 {
            return Err(PredictorError::InvalidConfig(
                "hash table width must be positive".to_string(),
            ));
        }
        1usize
            .checked_shl(self.mem_height)
            .and_then(|buckets| buckets.checked_mul(self.mem_width))
            .ok_or_else(|| {
                PredictorError::InvalidConfig(format!(
                    "hash table of height {} and width {} is too large",
                    self.mem_height, self.mem_width
                ))
            })
    }
}
