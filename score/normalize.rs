// ========================================================================================
//
//                      Antigen normalization: one key per antigen
//
// ========================================================================================
//
// Lab reports spell the same antigen many ways: serologic (`B44`, `DQ4`), molecular
// (`DQB1*04:01`), bare concatenated (`DQB104`), with or without an `HLA-` prefix. This
// module folds every spelling onto the single canonical key the frequency table is
// indexed by, so a table lookup is always one exact match.
//
// Key families are fixed per locus:
//   - A, B, C and DR (including the DR51/52/53 associations) glue locus and value: `B44`.
//   - DQB1, DQA1, DPB1 and DPA1 use `*` and a two-digit value: `DQB1*04`.

use crate::types::{AntigenCode, Locus};
use log::trace;

/// The outcome of normalizing one raw antigen string.
///
/// Normalization never fails. A string it cannot read is carried through as
/// `Unparsed` so callers can still score it (it falls back to the rare-allele
/// frequency) and can report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedAntigen {
    Parsed(AntigenCode),
    /// The trimmed, uppercased input.
    Unparsed(String),
}

impl NormalizedAntigen {
    pub fn is_parsed(&self) -> bool {
        matches!(self, NormalizedAntigen::Parsed(_))
    }

    /// The code to score, whichever branch was taken.
    pub fn into_code(self) -> AntigenCode {
        match self {
            NormalizedAntigen::Parsed(code) => code,
            NormalizedAntigen::Unparsed(raw) => AntigenCode::new(raw),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NormalizedAntigen::Parsed(code) => code.as_str(),
            NormalizedAntigen::Unparsed(raw) => raw,
        }
    }
}

/// A locus spelling accepted on input, and where it lands.
#[derive(Debug, Clone, Copy)]
enum Spelling {
    /// Maps onto a canonical locus and keeps the numeric value.
    Locus(Locus),
    /// A DR-association gene. The gene alone decides the antigen (`DRB5` is always `DR51`).
    Association(u32),
}

// Longest spellings first so `DQB1` wins over `DQ` and `CW` over `C`.
const SPELLINGS: [(&str, Spelling); 15] = [
    ("DQB1", Spelling::Locus(Locus::Dqb1)),
    ("DQA1", Spelling::Locus(Locus::Dqa1)),
    ("DPB1", Spelling::Locus(Locus::Dpb1)),
    ("DPA1", Spelling::Locus(Locus::Dpa1)),
    ("DRB1", Spelling::Locus(Locus::Dr)),
    ("DRB3", Spelling::Association(52)),
    ("DRB4", Spelling::Association(53)),
    ("DRB5", Spelling::Association(51)),
    ("CW", Spelling::Locus(Locus::C)),
    ("DQ", Spelling::Locus(Locus::Dqb1)),
    ("DP", Spelling::Locus(Locus::Dpb1)),
    ("DR", Spelling::Locus(Locus::Dr)),
    ("A", Spelling::Locus(Locus::A)),
    ("B", Spelling::Locus(Locus::B)),
    ("C", Spelling::Locus(Locus::C)),
];

fn lookup_spelling(locus: &str) -> Option<Spelling> {
    SPELLINGS
        .iter()
        .find(|(spelling, _)| *spelling == locus)
        .map(|&(_, spelling)| spelling)
}

/// Splits bare concatenated input (`DQB104`, `B44`) at the longest known locus prefix.
fn split_concatenated(code: &str) -> Option<(&str, &str)> {
    SPELLINGS
        .iter()
        .find(|(spelling, _)| code.starts_with(spelling))
        .map(|(spelling, _)| code.split_at(spelling.len()))
}

/// Reads the numeric allele group: text before the first `:`, digits only.
fn parse_value(value: &str) -> Option<u32> {
    let group = value.split(':').next().unwrap_or_default();
    if group.is_empty() || !group.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    group.parse::<u32>().ok()
}

fn canonicalize(cleaned: &str) -> Option<AntigenCode> {
    let (locus, value) = match cleaned.split_once('*') {
        Some((locus, value)) => (locus, value),
        None => split_concatenated(cleaned)?,
    };

    let spelling = lookup_spelling(locus)?;
    let number = parse_value(value)?;

    let key = match spelling {
        Spelling::Locus(locus) => locus.canonical_key(number),
        Spelling::Association(association) => Locus::Dr.canonical_key(association),
    };
    Some(AntigenCode::new(key))
}

/// Normalizes a raw antigen string to its canonical frequency-table key.
///
/// Idempotent: normalizing the text of any result yields the same result.
pub fn normalize(raw: &str) -> NormalizedAntigen {
    let cleaned = raw.trim().to_ascii_uppercase();
    let unprefixed = cleaned.strip_prefix("HLA-").unwrap_or(cleaned.as_str());

    match canonicalize(unprefixed) {
        Some(code) => {
            trace!("normalized '{}' to '{}'", raw.trim(), code);
            NormalizedAntigen::Parsed(code)
        }
        None => {
            trace!("could not normalize '{}'; passing it through", raw.trim());
            NormalizedAntigen::Unparsed(cleaned)
        }
    }
}
