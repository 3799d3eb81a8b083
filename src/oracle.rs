//src/oracle.rs

use std::path::Path;

use crate::chunk_reader::{FastaSource, SequenceReader};
use crate::config::PanelThresholds;
use crate::error::{PredictorError, Result};
use crate::graph::KmerLookup;
use crate::kmer::KmerIter;
use crate::panel::{marker_set, Marker, ResistancePanel};
use crate::stats::median;
use crate::types::{Antibiotic, Verdict};
use crate::workspace::{AlleleScore, ReadBuffer, ScratchWorkspace};

/// One susceptibility predicate per antibiotic.
///
/// Implementations must leave `workspace` reusable by the next query; a
/// returned error aborts the whole run.
pub trait SusceptibilityOracle {
    fn is_susceptible(
        &mut self,
        antibiotic: Antibiotic,
        graph: &dyn KmerLookup,
        reader: &dyn SequenceReader,
        workspace: &mut ScratchWorkspace,
    ) -> Result<Verdict>;
}

/// Oracle backed by a directory of gene and variant probes.
pub struct PanelOracle {
    panel: ResistancePanel,
    thresholds: PanelThresholds,
}

impl PanelOracle {
    pub fn new(panel: ResistancePanel, thresholds: PanelThresholds) -> Self {
        Self { panel, thresholds }
    }

    fn allele_present(&self, score: &AlleleScore, min_percent: u32) -> bool {
        score.percent_present() >= min_percent
            && score.median_coverage >= self.thresholds.min_coverage
    }

    /// Score every allele of `gene`; present if any allele passes.
    fn type_gene(
        &self,
        name: &str,
        probe: &Path,
        graph: &dyn KmerLookup,
        reader: &dyn SequenceReader,
        workspace: &mut ScratchWorkspace,
    ) -> Result<bool> {
        let gene = &mut workspace.gene;
        gene.reset();
        gene.name.push_str(name);

        score_alleles(probe, graph, reader, &mut workspace.read_buffer, |_, _, score| {
            gene.alleles_scored += 1;
            if score.beats(&gene.best) || gene.alleles_scored == 1 {
                gene.best = score;
            }
        })?;

        gene.present = self.allele_present(&gene.best, self.thresholds.min_gene_percent);
        log::debug!(
            "gene {}: {} alleles, best {}% k-mers present at median coverage {}",
            gene.name,
            gene.alleles_scored,
            gene.best.percent_present(),
            gene.best.median_coverage
        );
        Ok(gene.present)
    }

    /// First allele is susceptible, the rest resistant; resistant is called
    /// when the best resistant allele is fully supported and at least as
    /// covered as the susceptible one.
    fn type_variant(
        &self,
        antibiotic: Antibiotic,
        marker: &Marker,
        probe: &Path,
        graph: &dyn KmerLookup,
        reader: &dyn SequenceReader,
        workspace: &mut ScratchWorkspace,
    ) -> Result<bool> {
        let variant = &mut workspace.variant;
        variant.reset();
        variant.name.push_str(&marker.to_string());

        let mut resistant_seen = false;
        let alleles = score_alleles(
            probe,
            graph,
            reader,
            &mut workspace.read_buffer,
            |idx, allele, score| {
                if idx == 0 {
                    variant.susceptible = score;
                } else if !resistant_seen || score.beats(&variant.resistant) {
                    resistant_seen = true;
                    variant.resistant = score;
                    variant.resistant_allele.clear();
                    variant.resistant_allele.push_str(allele);
                }
            },
        )?;

        if alleles < 2 {
            return Err(PredictorError::Oracle {
                antibiotic,
                reason: format!(
                    "variant probe {} needs a susceptible and at least one resistant allele, found {alleles}",
                    probe.display()
                ),
            });
        }

        variant.called_resistant = self
            .allele_present(&variant.resistant, self.thresholds.min_variant_percent)
            && variant.resistant.median_coverage >= variant.susceptible.median_coverage;
        log::debug!(
            "variant {}: susceptible {}%/{}x, resistant {} {}%/{}x -> {}",
            variant.name,
            variant.susceptible.percent_present(),
            variant.susceptible.median_coverage,
            variant.resistant_allele,
            variant.resistant.percent_present(),
            variant.resistant.median_coverage,
            if variant.called_resistant { "resistant" } else { "susceptible" }
        );
        Ok(variant.called_resistant)
    }
}

impl SusceptibilityOracle for PanelOracle {
    fn is_susceptible(
        &mut self,
        antibiotic: Antibiotic,
        graph: &dyn KmerLookup,
        reader: &dyn SequenceReader,
        workspace: &mut ScratchWorkspace,
    ) -> Result<Verdict> {
        workspace.reset(antibiotic);

        for marker in marker_set(antibiotic).markers() {
            let Some(probe) = self.panel.probe(&marker) else {
                log::warn!(
                    "{antibiotic}: no probe for {marker} in {}, treating it as absent",
                    self.panel.dir().display()
                );
                continue;
            };
            workspace.antibiotic.markers_tested += 1;

            let detected = match marker {
                Marker::Gene(name) => self.type_gene(name, &probe, graph, reader, workspace)?,
                Marker::Variant { .. } => {
                    self.type_variant(antibiotic, &marker, &probe, graph, reader, workspace)?
                }
            };
            if detected {
                workspace.antibiotic.detected.push(marker.to_string());
            }
        }

        let info = &workspace.antibiotic;
        if info.markers_tested == 0 {
            log::warn!("{antibiotic}: panel has no probes for any marker");
        }
        log::info!(
            "{antibiotic}: tested {} markers, detected [{}]",
            info.markers_tested,
            info.detected.join(", ")
        );
        Ok(Verdict::from_susceptible(info.detected.is_empty()))
    }
}

/// Read each allele of a probe file in chunks and score its k-mers against
/// the graph. Returns the number of alleles.
fn score_alleles<F>(
    probe: &Path,
    graph: &dyn KmerLookup,
    reader: &dyn SequenceReader,
    buffer: &mut ReadBuffer,
    mut on_allele: F,
) -> Result<usize>
where
    F: FnMut(usize, &str, AlleleScore),
{
    let k = reader.kmer_size();
    let max_len = buffer.max_chunk_len();
    let mut source = FastaSource::open(probe)?;
    let mut alleles = 0;

    while let Some(mut outcome) = reader.read_chunk(&mut source, &mut buffer.chunk, max_len, true)? {
        buffer.coverages.clear();
        let mut total = count_kmers(&buffer.chunk.seq, k, graph, &mut buffer.coverages)?;
        while !outcome.full_entry {
            outcome = reader
                .read_chunk(&mut source, &mut buffer.chunk, max_len, false)?
                .ok_or_else(|| PredictorError::MalformedSequence {
                    path: probe.to_path_buf(),
                    reason: format!("entry {} ended unexpectedly", buffer.chunk.name),
                })?;
            total += count_kmers(&buffer.chunk.seq, k, graph, &mut buffer.coverages)?;
        }

        let score = AlleleScore {
            kmers_total: total,
            kmers_present: buffer.coverages.len(),
            median_coverage: median(&mut buffer.coverages),
        };
        on_allele(alleles, &buffer.chunk.name, score);
        alleles += 1;
    }
    Ok(alleles)
}

/// Count the valid k-mers of `seq`, pushing the coverage of those in the graph.
///
/// `coverages` accumulates over every chunk of an allele, so alleles longer
/// than one chunk grow it past its initial reservation; that growth goes
/// through `try_reserve` like the initial allocation.
fn count_kmers(
    seq: &[u8],
    k: usize,
    graph: &dyn KmerLookup,
    coverages: &mut Vec<u32>,
) -> Result<usize> {
    coverages
        .try_reserve(seq.len())
        .map_err(|e| PredictorError::allocation("read buffer", e))?;
    let mut total = 0;
    for kmer in KmerIter::new(seq, k).flatten() {
        total += 1;
        if let Some(c) = graph.coverage(kmer).filter(|&c| c > 0) {
            coverages.push(c);
        }
    }
    Ok(total)
}
