//src/reads.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::{PredictorError, Result};
use crate::types::SequenceRecord;

/// Open `path` for buffered reading, transparently decompressing `.gz`.
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead>> {
    let f = File::open(path).map_err(|e| PredictorError::io(path, e))?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::with_capacity(1 << 20, MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::with_capacity(1 << 20, f))
    };
    Ok(reader)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Fasta,
    Fastq,
}

/// Streaming reader over a FASTA or FASTQ file (optionally gzipped).
/// The format is sniffed from the first header character.
pub struct SequenceFile {
    path: PathBuf,
    reader: Box<dyn BufRead>,
    line: String,
    format: Option<Format>,
    /// FASTA header already consumed while reading the previous record.
    pending_header: Option<String>,
    done: bool,
}

impl SequenceFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Ok(Self::from_reader(path, open_source(path)?))
    }

    /// Wrap an already open reader; `path` is only used in error messages.
    pub fn from_reader(path: &Path, reader: Box<dyn BufRead>) -> Self {
        Self {
            path: path.to_path_buf(),
            reader,
            line: String::with_capacity(512),
            format: None,
            pending_header: None,
            done: false,
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

    fn malformed(&self, reason: impl Into<String>) -> PredictorError {
        PredictorError::MalformedSequence {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Reads the next record, `Ok(None)` at end of file.
    pub fn read_next(&mut self) -> Result<Option<SequenceRecord>> {
        if self.done {
            return Ok(None);
        }
        if self.format.is_none() {
            // skip leading blank lines and sniff the format
            loop {
                if !self.read_line()? {
                    self.done = true;
                    return Ok(None);
                }
                let trimmed = self.line.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                let format = match trimmed.as_bytes()[0] {
                    b'>' => Format::Fasta,
                    b'@' => Format::Fastq,
                    other => {
                        return Err(self.malformed(format!(
                            "expected '>' or '@' at start of file, found '{}'",
                            other as char
                        )))
                    }
                };
                self.format = Some(format);
                self.pending_header = Some(trimmed[1..].to_string());
                break;
            }
        }

        match self.format {
            Some(Format::Fasta) => self.next_fasta(),
            Some(Format::Fastq) => self.next_fastq(),
            None => Ok(None),
        }
    }

    fn next_fasta(&mut self) -> Result<Option<SequenceRecord>> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => {
                self.done = true;
                return Ok(None);
            }
        };
        let mut seq = Vec::with_capacity(1024);
        while self.read_line()? {
            let trimmed = self.line.trim_end();
            if let Some(next) = trimmed.strip_prefix('>') {
                self.pending_header = Some(next.to_string());
                break;
            }
            seq.extend_from_slice(trimmed.as_bytes());
        }
        Ok(Some(SequenceRecord {
            id: record_id(&header),
            seq,
        }))
    }

    fn next_fastq(&mut self) -> Result<Option<SequenceRecord>> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => loop {
                if !self.read_line()? {
                    self.done = true;
                    return Ok(None);
                }
                let trimmed = self.line.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                match trimmed.strip_prefix('@') {
                    Some(h) => break h.to_string(),
                    None => return Err(self.malformed(format!("bad FASTQ header '{trimmed}'"))),
                }
            },
        };

        if !self.read_line()? {
            return Err(self.malformed(format!("record '{header}' has no sequence line")));
        }
        let seq = self.line.trim_end().as_bytes().to_vec();

        if !self.read_line()? || !self.line.starts_with('+') {
            return Err(self.malformed(format!("record '{header}' has no '+' line")));
        }
        if !self.read_line()? {
            return Err(self.malformed(format!("record '{header}' has no quality line")));
        }
        if self.line.trim_end().len() != seq.len() {
            return Err(self.malformed(format!(
                "record '{header}' quality length differs from sequence length"
            )));
        }

        Ok(Some(SequenceRecord {
            id: record_id(&header),
            seq,
        }))
    }
}

fn record_id(header: &str) -> String {
    header.split_whitespace().next().unwrap_or("").to_string()
}

/// Parse a read-list file: one path per line, `#` comments and blank lines
/// skipped, relative paths resolved against the list's own directory.
pub fn read_list_file<P: AsRef<Path>>(list: P) -> Result<Vec<PathBuf>> {
    let list = list.as_ref();
    let f = File::open(list).map_err(|e| PredictorError::io(list, e))?;
    let base = list.parent().unwrap_or_else(|| Path::new(""));

    let mut paths = Vec::new();
    for line in BufReader::new(f).lines() {
        let line = line.map_err(|e| PredictorError::io(list, e))?;
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        let p = PathBuf::from(entry);
        paths.push(if p.is_absolute() { p } else { base.join(p) });
    }
    Ok(paths)
}
