//src/graph.rs

use std::path::PathBuf;

use ahash::{AHashMap, AHashSet};

use crate::config::{check_kmer_size, RunConfiguration};
use crate::error::{PredictorError, Result};
use crate::kmer::{canonical, kmer_mask, reverse_complement, KmerIter, Orientation};
use crate::reads::SequenceFile;
use crate::stats::{median, CoverageHistogram, ReadLengthDistribution};

/// Read-only k-mer queries used by the susceptibility predicates.
pub trait KmerLookup {
    fn kmer_size(&self) -> usize;

    /// Coverage of `kmer` (either strand), `None` if it is not in the graph.
    fn coverage(&self, kmer: u64) -> Option<u32>;
}

/// What loading the reads produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub bases_loaded: u64,
    pub reads_loaded: u64,
    pub read_lengths: ReadLengthDistribution,
    pub coverage: CoverageHistogram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanSummary {
    pub threshold: u32,
    pub supernodes_removed: usize,
    pub kmers_removed: usize,
}

/// Build/clean contract the pipeline drives.
pub trait GraphEngine: KmerLookup {
    fn build(&mut self, read_files: &[PathBuf]) -> Result<BuildSummary>;

    /// Remove paths attributed to sequencing error. `expected_depth` separates
    /// error coverage from true coverage; paths longer than `max_path_length`
    /// are never removed.
    fn clean(
        &mut self,
        coverage: &CoverageHistogram,
        expected_depth: u64,
        max_path_length: usize,
    ) -> Result<CleanSummary>;
}

/// Coverage below which a short supernode counts as sequencing error.
///
/// Zero depth gives zero (nothing is removed). Otherwise the first trough of
/// the coverage histogram below the expected depth, falling back to a tenth
/// of the expected depth.
pub fn cleaning_threshold(coverage: &CoverageHistogram, expected_depth: u64) -> u32 {
    if expected_depth == 0 {
        return 0;
    }
    let limit = usize::try_from(expected_depth).unwrap_or(usize::MAX);
    coverage
        .first_valley(limit)
        .unwrap_or_else(|| u32::try_from(expected_depth / 10).unwrap_or(u32::MAX))
}

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    coverage: u32,
    /// Low nibble: successor bases on the forward strand; high nibble: on the reverse strand.
    edges: u8,
}

#[inline]
fn edge_bit(base: u64, orientation: Orientation) -> u8 {
    match orientation {
        Orientation::Forward => 1u8 << base,
        Orientation::Reverse => 1u8 << (base + 4),
    }
}

/// De Bruijn graph over canonical k-mers with per-node coverage.
pub struct GenomeGraph {
    k: usize,
    mask: u64,
    capacity: usize,
    nodes: AHashMap<u64, Node>,
    /// Scratch for supernode median coverage, sized to the longest cleanable path.
    covg_buf: Vec<u32>,
    max_read_length: usize,
    covg_hist_len: usize,
}

impl GenomeGraph {
    /// Reserve the whole table (`2^mem_height * mem_width` k-mers) and the
    /// median buffer up front.
    pub fn try_new(config: &RunConfiguration) -> Result<Self> {
        check_kmer_size(config.kmer_size)?;
        let capacity = config.table_capacity()?;

        let mut nodes = AHashMap::new();
        nodes
            .try_reserve(capacity)
            .map_err(|e| PredictorError::allocation("genome graph", e))?;

        let mut covg_buf = Vec::new();
        covg_buf
            .try_reserve_exact(config.max_expected_sup_len)
            .map_err(|e| PredictorError::allocation("coverage array", e))?;

        log::info!(
            "Allocated genome graph: k={}, capacity {} k-mers ({} x {})",
            config.kmer_size,
            capacity,
            1u64 << config.mem_height,
            config.mem_width
        );

        Ok(Self {
            k: config.kmer_size,
            mask: kmer_mask(config.kmer_size),
            capacity,
            nodes,
            covg_buf,
            max_read_length: config.max_read_length,
            covg_hist_len: config.covg_hist_len,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add every k-mer of `seq` and the edges between consecutive ones.
    pub fn load_sequence(&mut self, seq: &[u8]) -> Result<()> {
        let mut prev: Option<u64> = None;
        for item in KmerIter::new(seq, self.k) {
            match item {
                Some(kmer) => {
                    self.increment(kmer)?;
                    if let Some(p) = prev {
                        self.add_edge(p, kmer);
                    }
                    prev = Some(kmer);
                }
                None => prev = None,
            }
        }
        Ok(())
    }

    fn increment(&mut self, kmer: u64) -> Result<()> {
        let key = canonical(kmer, self.k);
        if let Some(node) = self.nodes.get_mut(&key) {
            node.coverage = node.coverage.saturating_add(1);
            return Ok(());
        }
        if self.nodes.len() >= self.capacity {
            return Err(PredictorError::HashTableFull {
                capacity: self.capacity,
            });
        }
        self.nodes.insert(key, Node { coverage: 1, edges: 0 });
        Ok(())
    }

    fn first_base(&self, kmer: u64) -> u64 {
        (kmer >> (2 * (self.k - 1))) & 3
    }

    /// Record `from -> to` and the mirrored `rc(to) -> rc(from)`.
    fn add_edge(&mut self, from: u64, to: u64) {
        let (from_key, from_orient) = Orientation::of(from, self.k);
        if let Some(node) = self.nodes.get_mut(&from_key) {
            node.edges |= edge_bit(to & 3, from_orient);
        }

        let rc_to = reverse_complement(to, self.k);
        let (to_key, rc_orient) = Orientation::of(rc_to, self.k);
        let complement_first = 3 - self.first_base(from);
        if let Some(node) = self.nodes.get_mut(&to_key) {
            node.edges |= edge_bit(complement_first, rc_orient);
        }
    }

    /// Oriented successors of an oriented k-mer that are still in the graph.
    fn successors(&self, kmer: u64) -> impl Iterator<Item = u64> + '_ {
        let (key, orient) = Orientation::of(kmer, self.k);
        let edges = self.nodes.get(&key).map(|n| n.edges).unwrap_or(0);
        let nibble = match orient {
            Orientation::Forward => edges & 0x0F,
            Orientation::Reverse => edges >> 4,
        };
        (0..4u64)
            .filter(move |&b| nibble & (1u8 << b) != 0)
            .map(move |b| ((kmer << 2) | b) & self.mask)
            .filter(move |next| self.nodes.contains_key(&canonical(*next, self.k)))
    }

    fn single_successor(&self, kmer: u64) -> Option<u64> {
        let mut it = self.successors(kmer);
        let first = it.next()?;
        match it.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    fn predecessor_count(&self, kmer: u64) -> usize {
        self.successors(reverse_complement(kmer, self.k)).count()
    }

    /// Collect the canonical keys of the unbranched path through `start`.
    fn supernode(&self, start: u64, visited: &mut AHashSet<u64>, path: &mut Vec<u64>) {
        path.clear();
        path.push(start);
        visited.insert(start);

        for first in [start, reverse_complement(start, self.k)] {
            let mut cur = first;
            while let Some(next) = self.single_successor(cur) {
                if self.predecessor_count(next) != 1 {
                    break;
                }
                let key = canonical(next, self.k);
                if !visited.insert(key) {
                    break;
                }
                path.push(key);
                cur = next;
            }
        }
    }

    /// Drop edge bits pointing at k-mers that are no longer present.
    fn prune_dangling_edges(&mut self) {
        let updates: Vec<(u64, u8)> = self
            .nodes
            .iter()
            .filter_map(|(&key, node)| {
                let mut edges = node.edges;
                for (orient, kmer) in [
                    (Orientation::Forward, key),
                    (Orientation::Reverse, reverse_complement(key, self.k)),
                ] {
                    for b in 0..4u64 {
                        let bit = edge_bit(b, orient);
                        if edges & bit == 0 {
                            continue;
                        }
                        let next = ((kmer << 2) | b) & self.mask;
                        if !self.nodes.contains_key(&canonical(next, self.k)) {
                            edges &= !bit;
                        }
                    }
                }
                (edges != node.edges).then_some((key, edges))
            })
            .collect();

        for (key, edges) in updates {
            if let Some(node) = self.nodes.get_mut(&key) {
                node.edges = edges;
            }
        }
    }
}

impl KmerLookup for GenomeGraph {
    fn kmer_size(&self) -> usize {
        self.k
    }

    fn coverage(&self, kmer: u64) -> Option<u32> {
        self.nodes
            .get(&canonical(kmer & self.mask, self.k))
            .map(|n| n.coverage)
    }
}

impl GraphEngine for GenomeGraph {
    fn build(&mut self, read_files: &[PathBuf]) -> Result<BuildSummary> {
        let mut read_lengths = ReadLengthDistribution::try_new(self.max_read_length)?;
        let mut coverage = CoverageHistogram::try_new(self.covg_hist_len)?;
        let mut bases_loaded = 0u64;
        let mut reads_loaded = 0u64;

        for path in read_files {
            log::info!("Loading reads from {}", path.display());
            let mut file = SequenceFile::open(path)?;
            while let Some(read) = file.read_next()? {
                read_lengths.record(read.seq.len());
                bases_loaded += read.seq.len() as u64;
                reads_loaded += 1;
                self.load_sequence(&read.seq)?;
            }
        }

        for node in self.nodes.values() {
            coverage.record(node.coverage);
        }

        log::info!(
            "Loaded {} reads ({} bp) into {} distinct k-mers",
            reads_loaded,
            bases_loaded,
            self.nodes.len()
        );

        Ok(BuildSummary {
            bases_loaded,
            reads_loaded,
            read_lengths,
            coverage,
        })
    }

    fn clean(
        &mut self,
        coverage: &CoverageHistogram,
        expected_depth: u64,
        max_path_length: usize,
    ) -> Result<CleanSummary> {
        let threshold = cleaning_threshold(coverage, expected_depth);
        let mut summary = CleanSummary {
            threshold,
            ..CleanSummary::default()
        };
        if threshold == 0 {
            log::warn!("Cleaning threshold is 0 (expected depth {expected_depth}); graph left as is");
            return Ok(summary);
        }
        let max_path_length = max_path_length.min(self.covg_buf.capacity());

        let mut covg = std::mem::take(&mut self.covg_buf);
        let mut visited = AHashSet::with_capacity(self.nodes.len());
        let mut path = Vec::new();
        let mut doomed = Vec::new();

        for &key in self.nodes.keys() {
            if visited.contains(&key) {
                continue;
            }
            self.supernode(key, &mut visited, &mut path);
            if path.len() > max_path_length {
                continue;
            }
            covg.clear();
            covg.extend(path.iter().filter_map(|k| self.nodes.get(k).map(|n| n.coverage)));
            if median(&mut covg) <= threshold {
                summary.supernodes_removed += 1;
                doomed.extend_from_slice(&path);
            }
        }
        self.covg_buf = covg;

        for key in &doomed {
            self.nodes.remove(key);
        }
        summary.kmers_removed = doomed.len();
        self.prune_dangling_edges();

        log::info!(
            "Cleaned graph at coverage threshold {}: removed {} supernodes ({} k-mers), {} k-mers remain",
            threshold,
            summary.supernodes_removed,
            summary.kmers_removed,
            self.nodes.len()
        );
        Ok(summary)
    }
}

impl Drop for GenomeGraph {
    fn drop(&mut self) {
        log::debug!("Releasing genome graph ({} k-mers)", self.nodes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::encode_kmer;
    use std::fmt::Write as _;
    use tempfile::TempDir;

    fn config(k: usize, height: u32, width: usize) -> RunConfiguration {
        let mut cfg = RunConfiguration::for_reads(vec![PathBuf::from("unused.fq")], "panel");
        cfg.kmer_size = k;
        cfg.mem_height = height;
        cfg.mem_width = width;
        cfg.max_read_length = 500;
        cfg.covg_hist_len = 100;
        cfg.max_expected_sup_len = 1000;
        cfg
    }

    /// Deterministic pseudo-random DNA.
    fn genome(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                b"ACGT"[(state >> 33) as usize % 4]
            })
            .collect()
    }

    fn write_fasta(dir: &TempDir, name: &str, reads: &[Vec<u8>]) -> PathBuf {
        let mut text = String::new();
        for (i, r) in reads.iter().enumerate() {
            let _ = writeln!(text, ">read{i}\n{}", String::from_utf8_lossy(r));
        }
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn revcomp(seq: &[u8]) -> Vec<u8> {
        seq.iter()
            .rev()
            .map(|b| match b {
                b'A' => b'T',
                b'C' => b'G',
                b'G' => b'C',
                _ => b'A',
            })
            .collect()
    }

    #[test]
    fn test_build_counts_both_strands() {
        let dir = TempDir::new().unwrap();
        let seq = genome(40, 7);
        let reads = write_fasta(&dir, "reads.fa", &[seq.clone(), revcomp(&seq)]);

        let mut graph = GenomeGraph::try_new(&config(11, 8, 10)).unwrap();
        let summary = graph.build(&[reads]).unwrap();

        assert_eq!(summary.reads_loaded, 2);
        assert_eq!(summary.bases_loaded, 80);
        assert_eq!(summary.read_lengths.counts()[40], 2);
        assert_eq!(graph.len(), 30);
        for start in 0..30 {
            let kmer = encode_kmer(&seq[start..start + 11]).unwrap();
            assert_eq!(graph.coverage(kmer), Some(2));
            assert_eq!(graph.coverage(reverse_complement(kmer, 11)), Some(2));
        }
        assert_eq!(summary.coverage.counts()[2], 30);
    }

    #[test]
    fn test_edges_follow_read() {
        let mut graph = GenomeGraph::try_new(&config(5, 4, 4)).unwrap();
        graph.load_sequence(b"ACGTTGCA").unwrap();

        let first = encode_kmer(b"ACGTT").unwrap();
        let second = encode_kmer(b"CGTTG").unwrap();
        assert_eq!(graph.single_successor(first), Some(second));
        assert_eq!(graph.predecessor_count(second), 1);
        // walking the reverse strand goes the other way
        let rc_second = reverse_complement(second, 5);
        assert_eq!(graph.single_successor(rc_second), Some(reverse_complement(first, 5)));
    }

    #[test]
    fn test_ambiguous_base_breaks_edges() {
        let mut graph = GenomeGraph::try_new(&config(3, 4, 4)).unwrap();
        graph.load_sequence(b"ACGNTTG").unwrap();
        let acg = encode_kmer(b"ACG").unwrap();
        assert_eq!(graph.single_successor(acg), None);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_hash_table_full() {
        let mut graph = GenomeGraph::try_new(&config(5, 0, 3)).unwrap();
        assert_eq!(graph.capacity(), 3);
        let err = graph.load_sequence(b"ACGTTGCATT").unwrap_err();
        assert!(matches!(err, PredictorError::HashTableFull { capacity: 3 }));
    }

    #[test]
    fn test_allocation_failures_name_the_resource() {
        let err = GenomeGraph::try_new(&config(15, 50, 1)).err().unwrap();
        assert!(matches!(
            err,
            PredictorError::Allocation { resource: "genome graph", .. }
        ));

        let mut cfg = config(15, 2, 1);
        cfg.max_expected_sup_len = usize::MAX / 2;
        let err = GenomeGraph::try_new(&cfg).err().unwrap();
        assert!(matches!(
            err,
            PredictorError::Allocation { resource: "coverage array", .. }
        ));
    }

    #[test]
    fn test_rejects_zero_kmer_size() {
        let err = GenomeGraph::try_new(&config(0, 4, 4)).err().unwrap();
        assert!(matches!(err, PredictorError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_read_file_fails() {
        let mut graph = GenomeGraph::try_new(&config(5, 4, 4)).unwrap();
        let err = graph.build(&[PathBuf::from("/no/such/reads.fq")]).unwrap_err();
        assert!(matches!(err, PredictorError::Io { .. }));
    }

    #[test]
    fn test_cleaning_threshold() {
        let hist = CoverageHistogram::from_counts(vec![0, 500, 10, 2, 30, 80, 40]);
        assert_eq!(cleaning_threshold(&hist, 0), 0);
        assert_eq!(cleaning_threshold(&hist, 5), 3);
        // valley lies beyond the expected depth
        assert_eq!(cleaning_threshold(&hist, 3), 0);
        assert_eq!(cleaning_threshold(&CoverageHistogram::from_counts(vec![0; 4]), 40), 4);
    }

    #[test]
    fn test_clean_removes_error_bubble() {
        let dir = TempDir::new().unwrap();
        let k = 11;
        let truth = genome(80, 42);
        let mut erroneous = truth.clone();
        erroneous[40] = if truth[40] == b'A' { b'C' } else { b'A' };

        let mut reads = vec![truth.clone(); 10];
        reads.push(erroneous.clone());
        let path = write_fasta(&dir, "reads.fa", &reads);

        let mut graph = GenomeGraph::try_new(&config(k, 10, 10)).unwrap();
        let built = graph.build(&[path]).unwrap();
        let before = graph.len();

        let cleaned = graph.clean(&built.coverage, 10, 100).unwrap();
        assert!(cleaned.threshold >= 1 && cleaned.threshold < 10);
        assert_eq!(cleaned.kmers_removed, k);
        assert_eq!(graph.len(), before - k);

        for start in 0..=truth.len() - k {
            let kmer = encode_kmer(&truth[start..start + k]).unwrap();
            assert!(graph.coverage(kmer).unwrap() >= 10);
        }
        for start in 30..=40 {
            let kmer = encode_kmer(&erroneous[start..start + k]).unwrap();
            assert_eq!(graph.coverage(kmer), None);
        }
        // the branch point no longer branches
        let before_bubble = encode_kmer(&truth[29..29 + k]).unwrap();
        let next = encode_kmer(&truth[30..30 + k]).unwrap();
        assert_eq!(graph.single_successor(before_bubble), Some(next));
    }

    #[test]
    fn test_clean_with_zero_depth_keeps_everything() {
        let mut graph = GenomeGraph::try_new(&config(11, 6, 8)).unwrap();
        graph.load_sequence(&genome(30, 5)).unwrap();
        let n = graph.len();
        let hist = CoverageHistogram::from_counts(vec![0, n as u64, 0]);
        let summary = graph.clean(&hist, 0, 100).unwrap();
        assert_eq!(summary, CleanSummary::default());
        assert_eq!(graph.len(), n);
    }

    #[test]
    fn test_clean_spares_long_paths() {
        let mut graph = GenomeGraph::try_new(&config(11, 6, 8)).unwrap();
        graph.load_sequence(&genome(30, 3)).unwrap();
        let n = graph.len();
        let hist = CoverageHistogram::from_counts(vec![0, n as u64, 0]);
        // everything has coverage 1, but the single supernode is longer than 5
        let summary = graph.clean(&hist, 20, 5).unwrap();
        assert_eq!(summary.kmers_removed, 0);
        assert_eq!(graph.len(), n);
    }
}
