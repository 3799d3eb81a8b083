//src/chunk_reader.rs

//! Chunked FASTA reading for probe sequences.
//!
//! Probes can be longer than the read buffer, so an entry may be read in
//! several chunks. When a chunk continues an entry, it starts with the last
//! `k - 1` bases of the previous chunk, which makes the k-mers of all chunks
//! together identical to the k-mers of the whole entry.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::{PredictorError, Result};
use crate::reads::open_source;

/// FASTA source that can hand out an entry a few bases at a time.
pub struct FastaSource {
    path: PathBuf,
    reader: Box<dyn BufRead>,
    line: String,
    pending: Vec<u8>,
    pending_pos: usize,
    next_header: Option<String>,
    in_entry: bool,
}

impl FastaSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Ok(Self::from_reader(path, open_source(path)?))
    }

    pub fn from_reader(path: &Path, reader: Box<dyn BufRead>) -> Self {
        Self {
            path: path.to_path_buf(),
            reader,
            line: String::with_capacity(256),
            pending: Vec::with_capacity(256),
            pending_pos: 0,
            next_header: None,
            in_entry: false,
        }
    }

    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self
            .reader
            .read_line(&mut self.line)
            .map_err(|e| PredictorError::io(&self.path, e))?;
        Ok(n > 0)
    }

    /// Skip to the next header. Whatever is left of an unfinished entry is dropped.
    fn start_entry(&mut self) -> Result<Option<String>> {
        self.pending.clear();
        self.pending_pos = 0;
        self.in_entry = false;

        let header = match self.next_header.take() {
            Some(h) => h,
            None => loop {
                if !self.read_line()? {
                    return Ok(None);
                }
                if let Some(h) = self.line.trim_end().strip_prefix('>') {
                    break h.to_string();
                }
            },
        };
        self.in_entry = true;
        Ok(Some(
            header.split_whitespace().next().unwrap_or("").to_string(),
        ))
    }

    /// Load the next sequence line of the current entry into `pending`.
    /// Returns `false` once the entry is exhausted.
    fn refill(&mut self) -> Result<bool> {
        if !self.in_entry {
            return Ok(false);
        }
        if !self.read_line()? {
            self.in_entry = false;
            return Ok(false);
        }
        let trimmed = self.line.trim_end();
        if let Some(h) = trimmed.strip_prefix('>') {
            self.next_header = Some(h.to_string());
            self.in_entry = false;
            return Ok(false);
        }
        self.pending.clear();
        self.pending.extend_from_slice(trimmed.as_bytes());
        self.pending_pos = 0;
        Ok(true)
    }

    /// Append bases of the current entry to `seq` until it holds `limit` bases.
    /// Returns `true` when the entry has been read to its end.
    fn fill(&mut self, seq: &mut Vec<u8>, limit: usize) -> Result<bool> {
        while seq.len() < limit {
            if self.pending_pos >= self.pending.len() {
                if !self.refill()? {
                    return Ok(true);
                }
                continue;
            }
            let take = (limit - seq.len()).min(self.pending.len() - self.pending_pos);
            seq.extend_from_slice(&self.pending[self.pending_pos..self.pending_pos + take]);
            self.pending_pos += take;
        }
        // buffer is full; the entry is complete only if nothing but a header or EOF follows
        loop {
            if self.pending_pos < self.pending.len() {
                return Ok(false);
            }
            if !self.refill()? {
                return Ok(true);
            }
        }
    }
}

/// One chunk of a FASTA entry.
#[derive(Debug, Default, Clone)]
pub struct SequenceChunk {
    pub name: String,
    pub seq: Vec<u8>,
}

impl SequenceChunk {
    pub fn clear(&mut self) {
        self.name.clear();
        self.seq.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Bases now held in the chunk, carried-over bases included.
    pub bases: usize,
    /// The entry ended inside this chunk.
    pub full_entry: bool,
}

/// Reads one chunk of a FASTA entry into a caller-owned buffer.
pub trait SequenceReader {
    fn kmer_size(&self) -> usize;

    /// With `new_entry` the next entry is started (`Ok(None)` at end of file);
    /// otherwise the chunk continues the entry already held in `chunk`.
    fn read_chunk(
        &self,
        source: &mut FastaSource,
        chunk: &mut SequenceChunk,
        max_len: usize,
        new_entry: bool,
    ) -> Result<Option<ChunkOutcome>>;
}

/// The reader every query uses: continuation chunks keep `k - 1` bases of overlap.
#[derive(Debug, Clone, Copy)]
pub struct KmerContinuationReader {
    kmer_size: usize,
}

impl KmerContinuationReader {
    pub fn new(kmer_size: usize) -> Self {
        Self { kmer_size }
    }

    /// Bases carried over from the previous chunk of the same entry.
    pub fn continuation_offset(&self) -> usize {
        self.kmer_size.saturating_sub(1)
    }
}

impl SequenceReader for KmerContinuationReader {
    fn kmer_size(&self) -> usize {
        self.kmer_size
    }

    fn read_chunk(
        &self,
        source: &mut FastaSource,
        chunk: &mut SequenceChunk,
        max_len: usize,
        new_entry: bool,
    ) -> Result<Option<ChunkOutcome>> {
        if max_len <= self.continuation_offset() {
            return Err(PredictorError::InvalidConfig(format!(
                "chunk length {max_len} must exceed k - 1 = {}",
                self.continuation_offset()
            )));
        }

        if new_entry {
            chunk.clear();
            match source.start_entry()? {
                Some(name) => chunk.name = name,
                None => return Ok(None),
            }
        } else {
            let keep = self.continuation_offset().min(chunk.seq.len());
            let drop = chunk.seq.len() - keep;
            chunk.seq.drain(..drop);
        }

        let full_entry = source.fill(&mut chunk.seq, max_len)?;
        Ok(Some(ChunkOutcome {
            bases: chunk.seq.len(),
            full_entry,
        }))
    }
}
