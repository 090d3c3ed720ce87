// ========================================================================================
//
//                    The frequency table: antigen -> population frequency
//
// ========================================================================================
//
// Scores are a direct function of these constants. The built-in table carries the
// NMDP 2023 antigen frequencies; alternative populations can be loaded from CSV. Either
// way a table is immutable once built and every key is in canonical (normalized) form,
// so a lookup is a single exact match.

use crate::normalize::{NormalizedAntigen, normalize};
use crate::types::{AntigenCode, Locus};
use ahash::AHashMap;
use log::debug;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Frequency assumed for any antigen that is named but not tabulated.
///
/// Rare, not absent: a zero would make the antigen inert in the product.
pub const RARE_ALLELE_FREQUENCY: f64 = 0.001;

/// One row of a frequency table.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyEntry {
    pub locus: Locus,
    pub antigen: AntigenCode,
    pub frequency: f64,
}

/// Errors raised while building a frequency table from external data.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to read frequency table: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse frequency table CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Line {line}: {message}")]
    UnknownLocus { line: u64, message: String },
    #[error("Line {line}: antigen '{antigen}' could not be normalized to a canonical key.")]
    UnparsedAntigen { line: u64, antigen: String },
    #[error(
        "Antigen '{antigen}' is declared under locus {declared}, but its canonical key belongs to {canonical}."
    )]
    LocusMismatch {
        antigen: String,
        declared: Locus,
        canonical: Locus,
    },
    #[error("Antigen '{antigen}' has frequency {frequency}, which is not a probability in [0, 1].")]
    InvalidFrequency { antigen: String, frequency: f64 },
    #[error("Antigen '{0}' appears more than once in the frequency table.")]
    DuplicateAntigen(String),
    #[error("Table key '{0}' is not in canonical form; it would never match a normalized lookup.")]
    NonCanonicalKey(String),
}

/// An immutable mapping from canonical antigen code to population frequency.
///
/// Entries keep their insertion order; the optimizer relies on it to break
/// frequency ties the same way every run.
#[derive(Debug, Clone)]
pub struct FrequencyTable {
    entries: Vec<FrequencyEntry>,
    index: AHashMap<AntigenCode, usize>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    locus: String,
    antigen: String,
    frequency: f64,
}

/// The locus a canonical key belongs to, read back from its prefix.
fn locus_of_key(key: &str) -> Option<Locus> {
    if let Some((locus, _)) = key.split_once('*') {
        return locus.parse().ok();
    }
    // Concatenated keys: the longest alphabetic prefix names the locus.
    let prefix_len = key.bytes().take_while(u8::is_ascii_alphabetic).count();
    key[..prefix_len].parse().ok()
}

impl FrequencyTable {
    /// Builds a table from already-canonical entries, validating every invariant.
    pub fn from_entries(
        entries: impl IntoIterator<Item = FrequencyEntry>,
    ) -> Result<Self, TableError> {
        let mut table = Self {
            entries: Vec::new(),
            index: AHashMap::new(),
        };

        for entry in entries {
            if !entry.frequency.is_finite() || !(0.0..=1.0).contains(&entry.frequency) {
                return Err(TableError::InvalidFrequency {
                    antigen: entry.antigen.to_string(),
                    frequency: entry.frequency,
                });
            }
            match normalize(entry.antigen.as_str()) {
                NormalizedAntigen::Parsed(code) if code == entry.antigen => {}
                _ => return Err(TableError::NonCanonicalKey(entry.antigen.to_string())),
            }
            if let Some(canonical) = locus_of_key(entry.antigen.as_str()) {
                if canonical != entry.locus {
                    return Err(TableError::LocusMismatch {
                        antigen: entry.antigen.to_string(),
                        declared: entry.locus,
                        canonical,
                    });
                }
            }
            if table.index.contains_key(&entry.antigen) {
                return Err(TableError::DuplicateAntigen(entry.antigen.to_string()));
            }
            table.index.insert(entry.antigen.clone(), table.entries.len());
            table.entries.push(entry);
        }

        Ok(table)
    }

    /// Reads a `locus,antigen,frequency` CSV. Antigen spellings are normalized on load,
    /// so `DQB1*04:01` in the file becomes the `DQB1*04` key.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let mut entries = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |position| position.line());
            let row: CsvRow = record.deserialize(Some(&headers))?;
            let locus: Locus = row
                .locus
                .parse()
                .map_err(|message| TableError::UnknownLocus { line, message })?;
            let antigen = match normalize(&row.antigen) {
                NormalizedAntigen::Parsed(code) => code,
                NormalizedAntigen::Unparsed(raw) => {
                    return Err(TableError::UnparsedAntigen { line, antigen: raw });
                }
            };
            entries.push(FrequencyEntry {
                locus,
                antigen,
                frequency: row.frequency,
            });
        }

        let table = Self::from_entries(entries)?;
        debug!("loaded frequency table with {} entries", table.len());
        Ok(table)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, TableError> {
        let file = File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// The built-in NMDP 2023 table, built once per process.
    pub fn nmdp_2023() -> &'static FrequencyTable {
        static TABLE: OnceLock<FrequencyTable> = OnceLock::new();
        TABLE.get_or_init(|| {
            let entries = NMDP_2023.iter().map(|&(locus, antigen, frequency)| FrequencyEntry {
                locus,
                antigen: AntigenCode::new(antigen),
                frequency,
            });
            Self::from_entries(entries).expect("built-in frequency table is valid")
        })
    }

    /// Exact-match lookup of a canonical code.
    pub fn get(&self, code: &AntigenCode) -> Option<f64> {
        self.index.get(code).map(|&i| self.entries[i].frequency)
    }

    /// The frequency used for scoring: the tabulated value, or the rare-allele default
    /// when the code is missing or tabulated as exactly zero.
    pub fn frequency_or_rare(&self, code: &AntigenCode) -> f64 {
        match self.get(code) {
            Some(frequency) if frequency > 0.0 => frequency,
            _ => RARE_ALLELE_FREQUENCY,
        }
    }

    pub fn contains(&self, code: &AntigenCode) -> bool {
        self.index.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in table order.
    pub fn entries(&self) -> &[FrequencyEntry] {
        &self.entries
    }

    pub fn entries_for(&self, locus: Locus) -> impl Iterator<Item = &FrequencyEntry> {
        self.entries.iter().filter(move |entry| entry.locus == locus)
    }
}

// --- NMDP 2023 antigen frequencies ---
// Serologic DQ2..DQ9 are folded into the DQB1 family; where the source listed both a
// serologic and a molecular spelling the frequencies were identical.
#[rustfmt::skip]
const NMDP_2023: [(Locus, &str, f64); 121] = [
    // --- HLA-A ---
    (Locus::A, "A1", 0.240), (Locus::A, "A2", 0.479), (Locus::A, "A3", 0.220),
    (Locus::A, "A11", 0.100), (Locus::A, "A23", 0.070), (Locus::A, "A24", 0.174),
    (Locus::A, "A25", 0.040), (Locus::A, "A26", 0.080), (Locus::A, "A29", 0.070),
    (Locus::A, "A30", 0.080), (Locus::A, "A31", 0.050), (Locus::A, "A32", 0.050),
    (Locus::A, "A33", 0.053), (Locus::A, "A34", 0.010), (Locus::A, "A36", 0.020),
    (Locus::A, "A43", 0.001), (Locus::A, "A66", 0.030), (Locus::A, "A68", 0.110),
    (Locus::A, "A69", 0.005), (Locus::A, "A74", 0.020), (Locus::A, "A80", 0.001),
    // --- HLA-B ---
    (Locus::B, "B7", 0.214), (Locus::B, "B8", 0.170), (Locus::B, "B13", 0.040),
    (Locus::B, "B18", 0.090), (Locus::B, "B27", 0.070), (Locus::B, "B35", 0.180),
    (Locus::B, "B37", 0.020), (Locus::B, "B38", 0.030), (Locus::B, "B39", 0.050),
    (Locus::B, "B41", 0.020), (Locus::B, "B42", 0.020), (Locus::B, "B44", 0.240),
    (Locus::B, "B45", 0.030), (Locus::B, "B46", 0.001), (Locus::B, "B47", 0.010),
    (Locus::B, "B48", 0.010), (Locus::B, "B49", 0.030), (Locus::B, "B50", 0.030),
    (Locus::B, "B51", 0.120), (Locus::B, "B52", 0.040), (Locus::B, "B53", 0.060),
    (Locus::B, "B54", 0.010), (Locus::B, "B55", 0.040), (Locus::B, "B56", 0.020),
    (Locus::B, "B57", 0.060), (Locus::B, "B58", 0.040), (Locus::B, "B59", 0.002),
    (Locus::B, "B60", 0.050), (Locus::B, "B61", 0.040), (Locus::B, "B62", 0.090),
    (Locus::B, "B63", 0.010), (Locus::B, "B64", 0.010), (Locus::B, "B65", 0.010),
    (Locus::B, "B67", 0.001), (Locus::B, "B70", 0.001), (Locus::B, "B71", 0.002),
    (Locus::B, "B72", 0.001), (Locus::B, "B73", 0.001), (Locus::B, "B75", 0.005),
    (Locus::B, "B76", 0.002), (Locus::B, "B77", 0.001), (Locus::B, "B81", 0.010),
    (Locus::B, "B82", 0.001),
    // --- HLA-C ---
    (Locus::C, "C1", 0.080), (Locus::C, "C2", 0.040), (Locus::C, "C3", 0.150),
    (Locus::C, "C4", 0.250), (Locus::C, "C5", 0.160), (Locus::C, "C6", 0.190),
    (Locus::C, "C7", 0.490), (Locus::C, "C8", 0.080), (Locus::C, "C9", 0.060),
    (Locus::C, "C10", 0.100), (Locus::C, "C12", 0.070), (Locus::C, "C14", 0.020),
    (Locus::C, "C15", 0.050), (Locus::C, "C16", 0.070), (Locus::C, "C17", 0.030),
    (Locus::C, "C18", 0.010),
    // --- HLA-DRB1 ---
    (Locus::Dr, "DR1", 0.180), (Locus::Dr, "DR3", 0.230), (Locus::Dr, "DR4", 0.320),
    (Locus::Dr, "DR7", 0.260), (Locus::Dr, "DR8", 0.060), (Locus::Dr, "DR9", 0.020),
    (Locus::Dr, "DR10", 0.010), (Locus::Dr, "DR11", 0.180), (Locus::Dr, "DR12", 0.040),
    (Locus::Dr, "DR13", 0.220), (Locus::Dr, "DR14", 0.050), (Locus::Dr, "DR15", 0.250),
    (Locus::Dr, "DR16", 0.020), (Locus::Dr, "DR17", 0.150), (Locus::Dr, "DR18", 0.010),
    // --- HLA-DR associations ---
    (Locus::Dr, "DR51", 0.270), (Locus::Dr, "DR52", 0.450), (Locus::Dr, "DR53", 0.350),
    // --- HLA-DQB1 ---
    (Locus::Dqb1, "DQB1*02", 0.350), (Locus::Dqb1, "DQB1*03", 0.500),
    (Locus::Dqb1, "DQB1*04", 0.050), (Locus::Dqb1, "DQB1*05", 0.150),
    (Locus::Dqb1, "DQB1*06", 0.400), (Locus::Dqb1, "DQB1*07", 0.300),
    (Locus::Dqb1, "DQB1*08", 0.200), (Locus::Dqb1, "DQB1*09", 0.100),
    // --- HLA-DQA1 ---
    (Locus::Dqa1, "DQA1*01", 0.350), (Locus::Dqa1, "DQA1*02", 0.080),
    (Locus::Dqa1, "DQA1*03", 0.300), (Locus::Dqa1, "DQA1*04", 0.150),
    (Locus::Dqa1, "DQA1*05", 0.400), (Locus::Dqa1, "DQA1*06", 0.020),
    // --- HLA-DPB1 ---
    (Locus::Dpb1, "DPB1*01", 0.050), (Locus::Dpb1, "DPB1*02", 0.150),
    (Locus::Dpb1, "DPB1*03", 0.080), (Locus::Dpb1, "DPB1*04", 0.450),
    (Locus::Dpb1, "DPB1*05", 0.050), (Locus::Dpb1, "DPB1*06", 0.020),
    // --- HLA-DPA1 ---
    (Locus::Dpa1, "DPA1*01", 0.850), (Locus::Dpa1, "DPA1*02", 0.140),
    (Locus::Dpa1, "DPA1*03", 0.010),
];
