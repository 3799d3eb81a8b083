//src/stats.rs

use crate::error::{PredictorError, Result};

/// Count of reads per read length. Lengths past the end land in the last bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadLengthDistribution {
    counts: Vec<u64>,
}

impl ReadLengthDistribution {
    pub fn try_new(size: usize) -> Result<Self> {
        Ok(Self {
            counts: zeroed(size, "read length distribution")?,
        })
    }

    /// Build directly from per-length counts; index is the read length.
    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    pub fn record(&mut self, read_len: usize) {
        if let Some(last) = self.counts.len().checked_sub(1) {
            self.counts[read_len.min(last)] += 1;
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total_reads(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_reads() == 0
    }
}

/// Number of distinct k-mers seen at each coverage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageHistogram {
    counts: Vec<u64>,
}

impl CoverageHistogram {
    pub fn try_new(size: usize) -> Result<Self> {
        Ok(Self {
            counts: zeroed(size, "k-mer coverage histogram")?,
        })
    }

    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    pub fn record(&mut self, coverage: u32) {
        if let Some(last) = self.counts.len().checked_sub(1) {
            self.counts[(coverage as usize).min(last)] += 1;
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// First coverage `c >= 1` where the histogram starts rising again,
    /// i.e. the trough between the error peak and the true-coverage peak.
    /// Only coverages below `limit` are considered.
    pub fn first_valley(&self, limit: usize) -> Option<u32> {
        let end = limit.min(self.counts.len().saturating_sub(1));
        (1..end)
            .find(|&c| self.counts[c] < self.counts[c + 1])
            .map(|c| c as u32)
    }
}

fn zeroed(size: usize, resource: &'static str) -> Result<Vec<u64>> {
    let mut v = Vec::new();
    v.try_reserve_exact(size)
        .map_err(|e| PredictorError::allocation(resource, e))?;
    v.resize(size, 0);
    Ok(v)
}

/// Weighted mean of the distribution, truncated.
pub fn mean_read_length(distribution: &ReadLengthDistribution) -> Result<u64> {
    let mut sum = 0u64;
    let mut num = 0u64;
    for (len, &count) in distribution.counts().iter().enumerate() {
        sum += len as u64 * count;
        num += count;
    }
    if num == 0 {
        return Err(PredictorError::UndefinedDepth(
            "no reads were loaded, mean read length is undefined".to_string(),
        ));
    }
    Ok(sum / num)
}

/// Median coverage; sorts `values` in place. Empty input gives 0.
pub fn median(values: &mut [u32]) -> u32 {
    if values.is_empty() {
        return 0;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        ((values[mid - 1] as u64 + values[mid] as u64) / 2) as u32
    }
}

/// Values derived once the graph has been built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStatistics {
    pub bp_loaded: u64,
    pub mean_read_length: u64,
    pub expected_depth: u64,
}

impl LoadStatistics {
    /// `(mean_read_length - k + 1) * (bp_loaded / genome_size) / mean_read_length`,
    /// evaluated left to right in integer arithmetic. The order matters at low
    /// depth: `bp_loaded / genome_size` truncates before anything else.
    pub fn compute(
        distribution: &ReadLengthDistribution,
        bp_loaded: u64,
        kmer_size: usize,
        genome_size: u64,
    ) -> Result<Self> {
        if genome_size == 0 {
            return Err(PredictorError::UndefinedDepth(
                "genome size is zero".to_string(),
            ));
        }
        let mean_read_length = mean_read_length(distribution)?;
        if mean_read_length == 0 {
            return Err(PredictorError::UndefinedDepth(
                "mean read length is zero".to_string(),
            ));
        }
        let kmers_per_read = (mean_read_length + 1).saturating_sub(kmer_size as u64);
        let expected_depth = kmers_per_read * (bp_loaded / genome_size) / mean_read_length;

        Ok(Self {
            bp_loaded,
            mean_read_length,
            expected_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn single_length(len: usize, reads: u64) -> ReadLengthDistribution {
        let mut counts = vec![0; len + 1];
        counts[len] = reads;
        ReadLengthDistribution::from_counts(counts)
    }

    #[test]
    fn test_mean_read_length_weighted() {
        let mut dist = ReadLengthDistribution::try_new(200).unwrap();
        dist.record(100);
        dist.record(100);
        dist.record(150);
        // (100 + 100 + 150) / 3 = 116.67 -> 116
        assert_eq!(mean_read_length(&dist).unwrap(), 116);
    }

    #[test]
    fn test_distribution_clamps_long_reads() {
        let mut dist = ReadLengthDistribution::try_new(10).unwrap();
        dist.record(1000);
        assert_eq!(dist.counts()[9], 1);
        assert_eq!(dist.total_reads(), 1);
    }

    #[test]
    fn test_empty_distribution_is_undefined() {
        let dist = ReadLengthDistribution::try_new(10).unwrap();
        assert!(dist.is_empty());
        let err = LoadStatistics::compute(&dist, 1000, 21, 1000).unwrap_err();
        assert!(matches!(err, PredictorError::UndefinedDepth(_)));
    }

    #[test]
    fn test_zero_genome_size_is_undefined() {
        let dist = single_length(100, 10);
        let err = LoadStatistics::compute(&dist, 1000, 21, 0).unwrap_err();
        assert!(matches!(err, PredictorError::UndefinedDepth(_)));
    }

    #[test]
    fn test_only_zero_length_reads_is_undefined() {
        let dist = ReadLengthDistribution::from_counts(vec![5, 0, 0]);
        let err = LoadStatistics::compute(&dist, 0, 3, 100).unwrap_err();
        assert!(matches!(err, PredictorError::UndefinedDepth(_)));
    }

    #[test]
    fn test_expected_depth_truncates_to_zero_at_1x() {
        let dist = single_length(100, 30_000);
        let stats = LoadStatistics::compute(&dist, 3_000_000, 21, 3_000_000).unwrap();
        assert_eq!(stats.mean_read_length, 100);
        // 80 * 1 / 100
        assert_eq!(stats.expected_depth, 0);
    }

    #[test]
    fn test_expected_depth_divides_bp_by_genome_first() {
        let dist = single_length(100, 1);
        // 80 * (5_999_999 / 3_000_000 = 1) / 100 = 0, not 80 * 1.99 / 100 = 1
        let stats = LoadStatistics::compute(&dist, 5_999_999, 21, 3_000_000).unwrap();
        assert_eq!(stats.expected_depth, 0);

        let stats = LoadStatistics::compute(&dist, 150_000_000, 21, 3_000_000).unwrap();
        // 80 * 50 / 100
        assert_eq!(stats.expected_depth, 40);
    }

    #[test]
    fn test_short_reads_saturate_to_zero_depth() {
        let dist = single_length(10, 100);
        let stats = LoadStatistics::compute(&dist, 1_000_000, 21, 1000).unwrap();
        assert_eq!(stats.expected_depth, 0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), 0);
        assert_eq!(median(&mut [5, 1, 3]), 3);
        assert_eq!(median(&mut [4, 1, 3, 2]), 2);
    }

    #[test]
    fn test_first_valley() {
        let hist = CoverageHistogram::from_counts(vec![0, 900, 300, 40, 20, 60, 200, 500, 300]);
        assert_eq!(hist.first_valley(100), Some(4));
        assert_eq!(hist.first_valley(4), None);
        let flat = CoverageHistogram::from_counts(vec![0, 10, 5, 1]);
        assert_eq!(flat.first_valley(100), None);
    }

    proptest! {
        #[test]
        fn prop_expected_depth_is_reproducible(
            len in 1usize..400,
            reads in 1u64..10_000,
            k in 1usize..32,
            bp in 0u64..1_000_000_000,
            genome in 1u64..10_000_000,
        ) {
            let dist = single_length(len, reads);
            let a = LoadStatistics::compute(&dist, bp, k, genome).unwrap();
            let b = LoadStatistics::compute(&dist, bp, k, genome).unwrap();
            prop_assert_eq!(a, b);
            let expected = ((len as u64 + 1).saturating_sub(k as u64)) * (bp / genome) / len as u64;
            prop_assert_eq!(a.expected_depth, expected);
        }
    }
}
