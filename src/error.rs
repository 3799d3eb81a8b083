//src/error.rs

use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Antibiotic;

/// Every way a prediction run can fail. All variants are fatal to the run.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("could not allocate {resource}")]
    Allocation {
        resource: &'static str,
        #[source]
        source: TryReserveError,
    },

    #[error("hash table is full ({capacity} k-mers); increase --mem-height or --mem-width")]
    HashTableFull { capacity: usize },

    #[error("cannot read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("expected depth is undefined: {0}")]
    UndefinedDepth(String),

    #[error("malformed sequence file {}: {reason}", path.display())]
    MalformedSequence { path: PathBuf, reason: String },

    #[error("{antibiotic} query failed: {reason}")]
    Oracle {
        antibiotic: Antibiotic,
        reason: String,
    },
}

impl PredictorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PredictorError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn allocation(resource: &'static str, source: TryReserveError) -> Self {
        PredictorError::Allocation { resource, source }
    }
}

pub type Result<T> = std::result::Result<T, PredictorError>;
