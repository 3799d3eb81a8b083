//src/panel.rs

//! Resistance markers per antibiotic and where their probes live on disk.
//!
//! ```text
//! <panel>/genes/<gene>.fa                 one record per allele
//! <panel>/variants/<gene>_<mutation>.fa   susceptible allele first, then resistant alleles
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PredictorError, Result};
use crate::types::Antibiotic;

/// A gene whose presence confers resistance, or a point mutation in a gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Gene(&'static str),
    Variant {
        gene: &'static str,
        mutation: &'static str,
    },
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Gene(name) => f.write_str(name),
            Marker::Variant { gene, mutation } => write!(f, "{gene}_{mutation}"),
        }
    }
}

/// Genes and mutations that make one antibiotic ineffective.
#[derive(Debug, Clone, Copy)]
pub struct MarkerSet {
    pub genes: &'static [&'static str],
    pub variants: &'static [(&'static str, &'static [&'static str])],
}

impl MarkerSet {
    pub fn markers(&self) -> impl Iterator<Item = Marker> + '_ {
        let genes = self.genes.iter().map(|&g| Marker::Gene(g));
        let variants = self.variants.iter().flat_map(|&(gene, mutations)| {
            mutations
                .iter()
                .map(move |&mutation| Marker::Variant { gene, mutation })
        });
        genes.chain(variants)
    }

    pub fn len(&self) -> usize {
        self.genes.len() + self.variants.iter().map(|(_, m)| m.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Staphylococcal resistance catalogue.
pub fn marker_set(antibiotic: Antibiotic) -> MarkerSet {
    match antibiotic {
        Antibiotic::Gentamycin => MarkerSet {
            genes: &["aacAaphD"],
            variants: &[],
        },
        Antibiotic::Penicillin => MarkerSet {
            genes: &["blaZ"],
            variants: &[],
        },
        Antibiotic::Trimethoprim => MarkerSet {
            genes: &["dfrA", "dfrG", "dfrK"],
            variants: &[(
                "dfrB",
                &["F99Y", "F99S", "F99I", "H31N", "L41F", "H150R", "L21V", "N60I"],
            )],
        },
        Antibiotic::Erythromycin => MarkerSet {
            genes: &["ermA", "ermB", "ermC", "ermT", "ermY", "msrA"],
            variants: &[],
        },
        Antibiotic::Methicillin => MarkerSet {
            genes: &["mecA", "mecC"],
            variants: &[],
        },
        Antibiotic::Ciprofloxacin => MarkerSet {
            genes: &[],
            variants: &[
                (
                    "gyrA",
                    &["S84L", "S85P", "E88K", "G106D", "S84A", "S84V", "E88G", "E88L"],
                ),
                (
                    "grlA",
                    &["S80F", "S80Y", "E84K", "E84G", "E84V", "D432G", "V41G", "S108N"],
                ),
            ],
        },
        Antibiotic::Rifampicin => MarkerSet {
            genes: &[],
            variants: &[(
                "rpoB",
                &[
                    "S463P", "S464P", "Q468K", "Q468L", "D471Y", "D471G", "A473T", "A477T",
                    "A477V", "H481Y", "H481D", "H481N", "R484H", "S486L", "I527F", "I527L",
                    "I527M", "S529L", "Q565R",
                ],
            )],
        },
    }
}

/// Directory of probe FASTA files.
#[derive(Debug, Clone)]
pub struct ResistancePanel {
    dir: PathBuf,
}

impl ResistancePanel {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(PredictorError::InvalidConfig(format!(
                "panel directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn probe_path(&self, marker: &Marker) -> PathBuf {
        match marker {
            Marker::Gene(name) => self.dir.join("genes").join(format!("{name}.fa")),
            Marker::Variant { .. } => self.dir.join("variants").join(format!("{marker}.fa")),
        }
    }

    /// Probe file for `marker`, `None` if the panel does not carry it.
    pub fn probe(&self, marker: &Marker) -> Option<PathBuf> {
        let path = self.probe_path(marker);
        path.is_file().then_some(path)
    }
}
