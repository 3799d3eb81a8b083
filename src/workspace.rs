//src/workspace.rs

//! Scratch records shared by every susceptibility query.
//!
//! All four records are allocated once, reset at the start of each query and
//! released when the workspace is dropped. Queries run one at a time; the
//! `&mut` borrow each query takes enforces that.

use crate::chunk_reader::SequenceChunk;
use crate::error::{PredictorError, Result};
use crate::types::Antibiotic;

/// Longest probe chunk read in one go.
pub const MAX_LEN_GENE: usize = 10_000;

/// k-mer presence and coverage of one allele probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlleleScore {
    pub kmers_total: usize,
    pub kmers_present: usize,
    pub median_coverage: u32,
}

impl AlleleScore {
    pub fn percent_present(&self) -> u32 {
        if self.kmers_total == 0 {
            0
        } else {
            (100 * self.kmers_present / self.kmers_total) as u32
        }
    }

    /// Better of two scores: more k-mers present, then higher coverage.
    pub fn beats(&self, other: &AlleleScore) -> bool {
        (self.percent_present(), self.median_coverage)
            > (other.percent_present(), other.median_coverage)
    }
}

/// Probe chunk plus per-k-mer coverage scratch.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    pub chunk: SequenceChunk,
    /// Coverages of one allele's k-mers; reserved for one chunk.
    pub coverages: Vec<u32>,
    max_chunk_len: usize,
}

impl ReadBuffer {
    fn try_new(max_len: usize, kmer_size: usize) -> Result<Self> {
        let len = max_len.checked_add(kmer_size).ok_or_else(|| {
            PredictorError::InvalidConfig(format!(
                "read buffer of {max_len} + {kmer_size} bases is too large"
            ))
        })?;
        let mut seq = Vec::new();
        seq.try_reserve_exact(len)
            .map_err(|e| PredictorError::allocation("read buffer", e))?;
        let mut coverages = Vec::new();
        coverages
            .try_reserve_exact(len)
            .map_err(|e| PredictorError::allocation("read buffer", e))?;
        Ok(Self {
            chunk: SequenceChunk {
                name: String::new(),
                seq,
            },
            coverages,
            max_chunk_len: max_len,
        })
    }

    /// Largest chunk to request from the sequence reader.
    pub fn max_chunk_len(&self) -> usize {
        self.max_chunk_len
    }

    pub fn reset(&mut self) {
        self.chunk.clear();
        self.coverages.clear();
    }
}

/// Result of typing one variant (susceptible allele versus best resistant allele).
#[derive(Debug, Clone, Default)]
pub struct VariantInfo {
    pub name: String,
    pub susceptible: AlleleScore,
    pub resistant: AlleleScore,
    pub resistant_allele: String,
    pub called_resistant: bool,
}

impl VariantInfo {
    fn try_new() -> Result<Self> {
        let mut info = Self::default();
        reserve_name(&mut info.name, "variant info")?;
        reserve_name(&mut info.resistant_allele, "variant info")?;
        Ok(info)
    }

    pub fn reset(&mut self) {
        self.name.clear();
        self.resistant_allele.clear();
        self.susceptible = AlleleScore::default();
        self.resistant = AlleleScore::default();
        self.called_resistant = false;
    }
}

/// Best-scoring allele of one gene.
#[derive(Debug, Clone, Default)]
pub struct GeneInfo {
    pub name: String,
    pub best: AlleleScore,
    pub alleles_scored: usize,
    pub present: bool,
}

impl GeneInfo {
    fn try_new() -> Result<Self> {
        let mut info = Self::default();
        reserve_name(&mut info.name, "gene info")?;
        Ok(info)
    }

    pub fn reset(&mut self) {
        self.name.clear();
        self.best = AlleleScore::default();
        self.alleles_scored = 0;
        self.present = false;
    }
}

/// Markers looked at for the antibiotic currently being queried.
#[derive(Debug, Clone, Default)]
pub struct AntibioticInfo {
    pub antibiotic: Option<Antibiotic>,
    pub markers_tested: usize,
    pub detected: Vec<String>,
}

impl AntibioticInfo {
    fn try_new() -> Result<Self> {
        let mut info = Self::default();
        info.detected
            .try_reserve(32)
            .map_err(|e| PredictorError::allocation("antibiotic info", e))?;
        Ok(info)
    }

    pub fn reset(&mut self, antibiotic: Antibiotic) {
        self.antibiotic = Some(antibiotic);
        self.markers_tested = 0;
        self.detected.clear();
    }
}

fn reserve_name(s: &mut String, resource: &'static str) -> Result<()> {
    s.try_reserve(64)
        .map_err(|e| PredictorError::allocation(resource, e))
}

pub struct ScratchWorkspace {
    pub read_buffer: ReadBuffer,
    pub variant: VariantInfo,
    pub gene: GeneInfo,
    pub antibiotic: AntibioticInfo,
}

impl ScratchWorkspace {
    /// Allocate all four records; the first failure aborts and frees the rest.
    pub fn try_new(kmer_size: usize) -> Result<Self> {
        Self::with_chunk_len(MAX_LEN_GENE, kmer_size)
    }

    pub fn with_chunk_len(max_len: usize, kmer_size: usize) -> Result<Self> {
        let workspace = Self {
            read_buffer: ReadBuffer::try_new(max_len, kmer_size)?,
            variant: VariantInfo::try_new()?,
            gene: GeneInfo::try_new()?,
            antibiotic: AntibioticInfo::try_new()?,
        };
        log::debug!("Allocated scratch workspace (chunk length {max_len}, k={kmer_size})");
        Ok(workspace)
    }

    /// Clear everything a previous query left behind.
    pub fn reset(&mut self, antibiotic: Antibiotic) {
        self.read_buffer.reset();
        self.variant.reset();
        self.gene.reset();
        self.antibiotic.reset(antibiotic);
    }

    /// Release the workspace. Consuming `self` makes a second release impossible.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        log::debug!("Releasing scratch workspace");
    }
}
