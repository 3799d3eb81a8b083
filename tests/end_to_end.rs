use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use staph_predictor::reads::read_list_file;
use staph_predictor::{predict_susceptibility, Antibiotic, PredictorError, RunConfiguration, Verdict};

const READ_LEN: usize = 100;
const STEP: usize = 10;

fn random_seq(len: usize, seed: u64) -> String {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            b"ACGT"[(state >> 33) as usize % 4] as char
        })
        .collect()
}

struct Sample {
    genome: String,
    bla_z: String,
}

impl Sample {
    /// 2300 bp chromosome carrying blaZ at 1000..1300.
    fn new() -> Self {
        let bla_z = random_seq(300, 2);
        let genome = format!("{}{}{}", random_seq(1000, 1), bla_z, random_seq(1000, 3));
        Self { genome, bla_z }
    }

    /// Error-free reads tiling the genome every `STEP` bases.
    fn reads(&self) -> Vec<&str> {
        (0..=self.genome.len() - READ_LEN)
            .step_by(STEP)
            .map(|start| &self.genome[start..start + READ_LEN])
            .collect()
    }
}

fn write_fastq(path: &Path, reads: &[&str]) {
    let mut f = File::create(path).unwrap();
    for (i, r) in reads.iter().enumerate() {
        writeln!(f, "@read{i}\n{r}\n+\n{}", "I".repeat(r.len())).unwrap();
    }
}

fn write_fasta_gz(path: &Path, reads: &[&str]) {
    let mut gz = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    for (i, r) in reads.iter().enumerate() {
        writeln!(gz, ">read{i}\n{r}").unwrap();
    }
    gz.finish().unwrap();
}

fn write_panel(dir: &Path, sample: &Sample) {
    std::fs::create_dir_all(dir.join("genes")).unwrap();
    std::fs::create_dir_all(dir.join("variants")).unwrap();
    std::fs::write(dir.join("genes/blaZ.fa"), format!(">blaZ_1\n{}\n", sample.bla_z)).unwrap();
    std::fs::write(dir.join("genes/mecA.fa"), format!(">mecA_1\n{}\n", random_seq(300, 4))).unwrap();

    let wild = &sample.genome[1500..1561];
    let mut mutant = wild.as_bytes().to_vec();
    mutant[30] = if mutant[30] == b'C' { b'T' } else { b'C' };
    let mutant = String::from_utf8(mutant).unwrap();
    std::fs::write(
        dir.join("variants/gyrA_S84L.fa"),
        format!(">gyrA_wt\n{wild}\n>gyrA_S84L\n{mutant}\n"),
    )
    .unwrap();
}

fn config(read_files: Vec<PathBuf>, panel: &Path, genome_size: u64) -> RunConfiguration {
    let mut cfg = RunConfiguration::for_reads(read_files, panel);
    cfg.mem_height = 10;
    cfg.mem_width = 16;
    cfg.genome_size = genome_size;
    cfg.max_expected_sup_len = 100;
    cfg.max_read_length = 1000;
    cfg.covg_hist_len = 100;
    cfg
}

#[test]
fn test_predicts_from_fastq_and_gzipped_fasta() {
    let dir = TempDir::new().unwrap();
    let sample = Sample::new();
    let reads = sample.reads();
    let (first, second) = reads.split_at(reads.len() / 2);
    let fastq = dir.path().join("reads_1.fq");
    let fasta = dir.path().join("reads_2.fa.gz");
    write_fastq(&fastq, first);
    write_fasta_gz(&fasta, second);
    let panel = dir.path().join("panel");
    write_panel(&panel, &sample);

    let cfg = config(vec![fastq, fasta], &panel, sample.genome.len() as u64);
    let mut out = Vec::new();
    let outcome = predict_susceptibility(&cfg, &mut out).unwrap();

    // 221 reads of 100 bp over 2300 bp: (100 - 15 + 1) * 9 / 100 = 7
    assert_eq!(outcome.reads_loaded, 221);
    assert_eq!(outcome.stats.bp_loaded, 22_100);
    assert_eq!(outcome.stats.expected_depth, 7);
    assert_eq!(outcome.clean.kmers_removed, 0);

    let report = &outcome.report;
    assert_eq!(report.verdict(Antibiotic::Penicillin), Some(Verdict::Resistant));
    assert_eq!(report.verdict(Antibiotic::Methicillin), Some(Verdict::Susceptible));
    assert_eq!(report.verdict(Antibiotic::Ciprofloxacin), Some(Verdict::Susceptible));

    let output = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert!(lines[0].starts_with("Starting staph-predictor for Staphylococcus, version "));
    assert_eq!(
        &lines[1..],
        &[
            "Get expected depth of 7",
            "GENTAMYCIN SUSCEPTIBLE",
            "PENICILLIN RESISTANT",
            "TRIMETHOPRIM SUSCEPTIBLE",
            "ERYTHROMYCIN SUSCEPTIBLE",
            "METHICILLIN SUSCEPTIBLE",
            "CIPROFLOXACIN SUSCEPTIBLE",
            "RIFAMPICIN SUSCEPTIBLE",
        ]
    );
}

#[test]
fn test_read_list_drives_the_run() {
    let dir = TempDir::new().unwrap();
    let sample = Sample::new();
    write_fastq(&dir.path().join("all.fq"), &sample.reads());
    std::fs::write(dir.path().join("reads.txt"), "# sample 1\nall.fq\n").unwrap();
    let panel = dir.path().join("panel");
    write_panel(&panel, &sample);

    let files = read_list_file(dir.path().join("reads.txt")).unwrap();
    assert_eq!(files, vec![dir.path().join("all.fq")]);

    let cfg = config(files, &panel, sample.genome.len() as u64);
    let outcome = predict_susceptibility(&cfg, &mut Vec::new()).unwrap();
    assert_eq!(outcome.report.len(), Antibiotic::ALL.len());
}

#[test]
fn test_missing_read_file_prints_only_banner() {
    let dir = TempDir::new().unwrap();
    let panel = dir.path().join("panel");
    write_panel(&panel, &Sample::new());

    let cfg = config(vec![dir.path().join("absent.fq")], &panel, 2300);
    let mut out = Vec::new();
    let err = predict_susceptibility(&cfg, &mut out).unwrap_err();

    assert!(matches!(err, PredictorError::Io { .. }));
    let output = String::from_utf8(out).unwrap();
    assert_eq!(output.lines().count(), 1);
    assert!(output.starts_with("Starting staph-predictor"));
}

#[test]
fn test_missing_panel_fails_before_output() {
    let dir = TempDir::new().unwrap();
    let cfg = config(vec![dir.path().join("r.fq")], &dir.path().join("no_panel"), 2300);
    let mut out = Vec::new();

    let err = predict_susceptibility(&cfg, &mut out).unwrap_err();
    assert!(matches!(err, PredictorError::InvalidConfig(_)));
    assert!(out.is_empty());
}

#[test]
fn test_table_too_small_is_fatal() {
    let dir = TempDir::new().unwrap();
    let sample = Sample::new();
    let fastq = dir.path().join("reads.fq");
    write_fastq(&fastq, &sample.reads());
    let panel = dir.path().join("panel");
    write_panel(&panel, &sample);

    let mut cfg = config(vec![fastq], &panel, 2300);
    cfg.mem_height = 4;
    cfg.mem_width = 8;
    let err = predict_susceptibility(&cfg, &mut Vec::new()).unwrap_err();
    assert!(matches!(err, PredictorError::HashTableFull { capacity: 128 }));
}
