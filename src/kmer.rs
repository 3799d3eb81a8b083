//src/kmer.rs

/// Longest k-mer that fits the 2-bit `u64` encoding.
pub const MAX_KMER_SIZE: usize = 31;

/// 2-bit code of a nucleotide, `None` for anything ambiguous.
#[inline]
pub fn encode_base(b: u8) -> Option<u64> {
    match b {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Mask covering the `2 * k` low bits.
#[inline]
pub fn kmer_mask(k: usize) -> u64 {
    if k >= 32 {
        u64::MAX
    } else {
        (1u64 << (2 * k)) - 1
    }
}

/// Encode `seq` as a k-mer of length `seq.len()`. Returns `None` on an ambiguous base.
pub fn encode_kmer(seq: &[u8]) -> Option<u64> {
    let mut val = 0u64;
    for &b in seq {
        val = (val << 2) | encode_base(b)?;
    }
    Some(val)
}

/// Reverse complement of a 2-bit encoded k-mer of `k` nucleotides.
/// Same bit-reversal trick Jellyfish uses: reverse the 2-bit groups, then complement.
pub fn reverse_complement(mut kmer: u64, k: usize) -> u64 {
    kmer = ((kmer >> 2) & 0x3333333333333333) | ((kmer & 0x3333333333333333) << 2);
    kmer = ((kmer >> 4) & 0x0F0F0F0F0F0F0F0F) | ((kmer & 0x0F0F0F0F0F0F0F0F) << 4);
    kmer = ((kmer >> 8) & 0x00FF00FF00FF00FF) | ((kmer & 0x00FF00FF00FF00FF) << 8);
    kmer = ((kmer >> 16) & 0x0000FFFF0000FFFF) | ((kmer & 0x0000FFFF0000FFFF) << 16);
    kmer = (kmer >> 32) | (kmer << 32);
    (u64::MAX - kmer) >> (64 - 2 * k)
}

/// Lexicographically smaller of `(kmer, revcom(kmer))`.
#[inline]
pub fn canonical(kmer: u64, k: usize) -> u64 {
    let rc = reverse_complement(kmer, k);
    if kmer < rc {
        kmer
    } else {
        rc
    }
}

/// Strand a k-mer was observed on, relative to its canonical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Forward,
    Reverse,
}

impl Orientation {
    pub fn of(kmer: u64, k: usize) -> (u64, Orientation) {
        let rc = reverse_complement(kmer, k);
        if kmer <= rc {
            (kmer, Orientation::Forward)
        } else {
            (rc, Orientation::Reverse)
        }
    }
}

/// Rolling iterator over the k-mers of a sequence.
///
/// Yields `Some(kmer)` for every window made only of ACGT, and `None` for each
/// window touching an ambiguous base, so callers can tell where the chain breaks.
/// The number of items is always `seq.len() - k + 1` (or zero for short input).
pub struct KmerIter<'a> {
    seq: &'a [u8],
    k: usize,
    mask: u64,
    pos: usize,
    current: u64,
    valid_run: usize,
}

impl<'a> KmerIter<'a> {
    pub fn new(seq: &'a [u8], k: usize) -> Self {
        let mut iter = Self {
            seq,
            k,
            mask: kmer_mask(k),
            pos: 0,
            current: 0,
            valid_run: 0,
        };
        // prime with the first k - 1 bases
        let prime = k.saturating_sub(1).min(seq.len());
        for _ in 0..prime {
            iter.push_base();
        }
        iter
    }

    fn push_base(&mut self) {
        match encode_base(self.seq[self.pos]) {
            Some(code) => {
                self.current = ((self.current << 2) | code) & self.mask;
                self.valid_run += 1;
            }
            None => {
                self.current = 0;
                self.valid_run = 0;
            }
        }
        self.pos += 1;
    }
}

impl Iterator for KmerIter<'_> {
    type Item = Option<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.k == 0 || self.pos >= self.seq.len() {
            return None;
        }
        self.push_base();
        if self.valid_run >= self.k {
            Some(Some(self.current))
        } else {
            Some(None)
        }
    }
}
