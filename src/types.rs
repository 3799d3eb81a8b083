//src/types.rs

use std::fmt;

/// Antibiotics the predictor reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Antibiotic {
    Gentamycin,
    Penicillin,
    Trimethoprim,
    Erythromycin,
    Methicillin,
    Ciprofloxacin,
    Rifampicin,
}

impl Antibiotic {
    /// Report order. Queries are independent; this only fixes presentation.
    pub const ALL: [Antibiotic; 7] = [
        Antibiotic::Gentamycin,
        Antibiotic::Penicillin,
        Antibiotic::Trimethoprim,
        Antibiotic::Erythromycin,
        Antibiotic::Methicillin,
        Antibiotic::Ciprofloxacin,
        Antibiotic::Rifampicin,
    ];

    /// Upper-case name as printed in the report.
    pub fn report_name(&self) -> &'static str {
        match self {
            Antibiotic::Gentamycin => "GENTAMYCIN",
            Antibiotic::Penicillin => "PENICILLIN",
            Antibiotic::Trimethoprim => "TRIMETHOPRIM",
            Antibiotic::Erythromycin => "ERYTHROMYCIN",
            Antibiotic::Methicillin => "METHICILLIN",
            Antibiotic::Ciprofloxacin => "CIPROFLOXACIN",
            Antibiotic::Rifampicin => "RIFAMPICIN",
        }
    }
}

impl fmt::Display for Antibiotic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.report_name())
    }
}

/// Outcome of one susceptibility query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Susceptible,
    Resistant,
}

impl Verdict {
    pub fn from_susceptible(susceptible: bool) -> Self {
        if susceptible {
            Verdict::Susceptible
        } else {
            Verdict::Resistant
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Susceptible => f.write_str("SUSCEPTIBLE"),
            Verdict::Resistant => f.write_str("RESISTANT"),
        }
    }
}

/// A minimal representation of a sequencing read or probe record.
#[derive(Debug, Clone, Default)]
pub struct SequenceRecord {
    pub id: String,
    pub seq: Vec<u8>,
}
