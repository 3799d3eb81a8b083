//src/report.rs

use std::fmt;
use std::io::{self, Write};

use crate::types::{Antibiotic, Verdict};

pub const TOOL_NAME: &str = "staph-predictor";

/// Version stamped into the startup banner, fixed at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
    /// Appended verbatim after the version, usually a commit hash.
    pub suffix: String,
}

impl BuildInfo {
    /// Cargo package version, plus `PREDICTOR_BUILD` and `PREDICTOR_COMMIT`
    /// from the build environment when set.
    pub fn current() -> Self {
        Self {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
            build: option_env!("PREDICTOR_BUILD")
                .and_then(|b| b.parse().ok())
                .unwrap_or(0),
            suffix: option_env!("PREDICTOR_COMMIT").unwrap_or("").to_string(),
        }
    }

    pub fn version(&self) -> String {
        format!(
            "{}.{}.{}.{}{}",
            self.major, self.minor, self.patch, self.build, self.suffix
        )
    }

    pub fn banner(&self) -> String {
        format!(
            "Starting {TOOL_NAME} for Staphylococcus, version {}",
            self.version()
        )
    }
}

pub fn depth_line(expected_depth: u64) -> String {
    format!("Get expected depth of {expected_depth}")
}

/// Verdicts in the order they were queried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SusceptibilityReport {
    entries: Vec<(Antibiotic, Verdict)>,
}

impl SusceptibilityReport {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, antibiotic: Antibiotic, verdict: Verdict) {
        self.entries.push((antibiotic, verdict));
    }

    pub fn verdict(&self, antibiotic: Antibiotic) -> Option<Verdict> {
        self.entries
            .iter()
            .find(|(a, _)| *a == antibiotic)
            .map(|&(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{self}")
    }
}

impl fmt::Display for SusceptibilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (antibiotic, verdict) in &self.entries {
            writeln!(f, "{antibiotic} {verdict}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_has_four_part_version() {
        let info = BuildInfo {
            major: 0,
            minor: 1,
            patch: 0,
            build: 7,
            suffix: "-abc123".to_string(),
        };
        assert_eq!(
            info.banner(),
            "Starting staph-predictor for Staphylococcus, version 0.1.0.7-abc123"
        );
        let current = BuildInfo::current();
        assert_eq!(current.version().split('.').count(), 4);
    }

    #[test]
    fn test_report_lines() {
        let mut report = SusceptibilityReport::default();
        report.push(Antibiotic::Gentamycin, Verdict::Susceptible);
        report.push(Antibiotic::Penicillin, Verdict::Resistant);

        let mut out = Vec::new();
        report.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "GENTAMYCIN SUSCEPTIBLE\nPENICILLIN RESISTANT\n"
        );
        assert_eq!(report.verdict(Antibiotic::Penicillin), Some(Verdict::Resistant));
        assert_eq!(report.verdict(Antibiotic::Rifampicin), None);
        assert_eq!(depth_line(42), "Get expected depth of 42");
    }
}
