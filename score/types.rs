// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use natord::compare;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// An HLA locus as it appears in the canonical frequency-table keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Locus {
    A,
    B,
    C,
    #[serde(rename = "DR")]
    Dr,
    #[serde(rename = "DQB1")]
    Dqb1,
    #[serde(rename = "DQA1")]
    Dqa1,
    #[serde(rename = "DPB1")]
    Dpb1,
    #[serde(rename = "DPA1")]
    Dpa1,
}

/// How a locus renders its canonical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// Locus and value are glued together: `B44`, `DR15`, `DR51`.
    Concatenated,
    /// Locus, `*`, and a two-digit value: `DQB1*04`.
    Asterisk,
}

impl Locus {
    pub const ALL: [Locus; 8] = [
        Locus::A,
        Locus::B,
        Locus::C,
        Locus::Dr,
        Locus::Dqb1,
        Locus::Dqa1,
        Locus::Dpb1,
        Locus::Dpa1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Locus::A => "A",
            Locus::B => "B",
            Locus::C => "C",
            Locus::Dr => "DR",
            Locus::Dqb1 => "DQB1",
            Locus::Dqa1 => "DQA1",
            Locus::Dpb1 => "DPB1",
            Locus::Dpa1 => "DPA1",
        }
    }

    /// The label shown to people, e.g. `HLA-DQB1`.
    pub fn label(self) -> String {
        format!("HLA-{}", self.as_str())
    }

    pub fn family(self) -> KeyFamily {
        match self {
            Locus::A | Locus::B | Locus::C | Locus::Dr => KeyFamily::Concatenated,
            Locus::Dqb1 | Locus::Dqa1 | Locus::Dpb1 | Locus::Dpa1 => KeyFamily::Asterisk,
        }
    }

    /// Renders the canonical key for a numeric antigen value at this locus.
    pub fn canonical_key(self, value: u32) -> String {
        match self.family() {
            KeyFamily::Concatenated => format!("{}{value}", self.as_str()),
            KeyFamily::Asterisk => format!("{}*{value:02}", self.as_str()),
        }
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_prefix("HLA-")
            .or_else(|| trimmed.strip_prefix("hla-"))
            .unwrap_or(trimmed);
        Locus::ALL
            .into_iter()
            .find(|locus| locus.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                format!(
                    "Invalid locus '{}'. Expected one of A, B, C, DR, DQB1, DQA1, DPB1, DPA1.",
                    s.trim()
                )
            })
    }
}

/// A normalized antigen code, the key used against the frequency table.
///
/// Codes order naturally (`A2 < A11 < B7`) so every listing and every pair the
/// optimizer builds comes out the same way on every run. Byte order breaks ties
/// that natural comparison would call equal, keeping `Ord` consistent with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AntigenCode(String);

impl AntigenCode {
    /// Wraps a string that is already in canonical form. Use `normalize` for raw input.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for AntigenCode {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for AntigenCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AntigenCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AntigenCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The candidate's unacceptable antigens.
///
/// Lives entirely with the caller and is handed to the pure scoring calls by
/// reference. It changes only through the explicit mutators below.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AntigenSet {
    codes: BTreeSet<AntigenCode>,
}

impl AntigenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the code was not already present.
    pub fn insert(&mut self, code: AntigenCode) -> bool {
        self.codes.insert(code)
    }

    /// Returns `true` if the code was present.
    pub fn remove(&mut self, code: &AntigenCode) -> bool {
        self.codes.remove(code)
    }

    /// Adds the code if absent, removes it if present. Returns whether it is now present.
    pub fn toggle(&mut self, code: AntigenCode) -> bool {
        if self.codes.remove(&code) {
            false
        } else {
            self.codes.insert(code);
            true
        }
    }

    pub fn clear(&mut self) {
        self.codes.clear();
    }

    pub fn contains(&self, code: &AntigenCode) -> bool {
        self.codes.contains(code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Iterates in natural order.
    pub fn iter(&self) -> impl Iterator<Item = &AntigenCode> {
        self.codes.iter()
    }
}

impl Extend<AntigenCode> for AntigenSet {
    fn extend<I: IntoIterator<Item = AntigenCode>>(&mut self, iter: I) {
        self.codes.extend(iter);
    }
}

impl FromIterator<AntigenCode> for AntigenSet {
    fn from_iter<I: IntoIterator<Item = AntigenCode>>(iter: I) -> Self {
        Self {
            codes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AntigenSet {
    type Item = &'a AntigenCode;
    type IntoIter = std::collections::btree_set::Iter<'a, AntigenCode>;

    fn into_iter(self) -> Self::IntoIter {
        self.codes.iter()
    }
}

impl fmt::Display for AntigenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, code) in self.codes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{code}")?;
        }
        Ok(())
    }
}

/// Whether a strategy adds one antigen or a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Single,
    Combination,
}

/// One way to reach the priority threshold: the antigens to add and what they achieve.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    /// One or two codes, in candidate order.
    pub antigens: Vec<AntigenCode>,
    pub resulting_score: f64,
    /// `resulting_score` minus the score the search started from.
    pub gain: f64,
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        if self.antigens.len() == 1 {
            StrategyKind::Single
        } else {
            StrategyKind::Combination
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, code) in self.antigens.iter().enumerate() {
            if i > 0 {
                f.write_str(" + ")?;
            }
            write!(f, "{code}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> AntigenCode {
        AntigenCode::new(s)
    }

    #[test]
    fn antigen_codes_sort_naturally() {
        let mut codes = vec![code("B7"), code("A11"), code("DQB1*04"), code("A2"), code("DR51")];
        codes.sort();
        let rendered: Vec<&str> = codes.iter().map(AntigenCode::as_str).collect();
        assert_eq!(rendered, ["A2", "A11", "B7", "DQB1*04", "DR51"]);
    }

    #[test]
    fn antigen_code_order_is_total_for_leading_zeros() {
        let padded = code("A02");
        let bare = code("A2");
        assert_ne!(padded.cmp(&bare), Ordering::Equal);
        assert_eq!(padded.cmp(&bare), bare.cmp(&padded).reverse());
    }

    #[test]
    fn antigen_set_collapses_duplicates_and_toggles() {
        let mut set: AntigenSet = [code("A2"), code("B7"), code("A2")].into_iter().collect();
        assert_eq!(set.len(), 2);

        assert!(set.toggle(code("DR51")));
        assert!(set.contains(&code("DR51")));
        assert!(!set.toggle(code("DR51")));
        assert!(!set.contains(&code("DR51")));

        assert!(set.remove(&code("A2")));
        assert!(!set.remove(&code("A2")));
        assert_eq!(set.to_string(), "B7");

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn locus_renders_keys_per_family() {
        assert_eq!(Locus::B.canonical_key(44), "B44");
        assert_eq!(Locus::Dr.canonical_key(51), "DR51");
        assert_eq!(Locus::Dqb1.canonical_key(4), "DQB1*04");
        assert_eq!(Locus::Dpa1.canonical_key(12), "DPA1*12");
    }

    #[test]
    fn locus_parses_with_or_without_prefix() {
        assert_eq!("dqb1".parse::<Locus>().unwrap(), Locus::Dqb1);
        assert_eq!("HLA-DR".parse::<Locus>().unwrap(), Locus::Dr);
        assert!("DRB9".parse::<Locus>().is_err());
    }

    #[test]
    fn strategy_reports_kind_and_renders_pairs() {
        let single = Strategy {
            antigens: vec![code("DPA1*01")],
            resulting_score: 99.6,
            gain: 1.0,
        };
        let pair = Strategy {
            antigens: vec![code("DPA1*01"), code("DR53")],
            resulting_score: 99.8,
            gain: 1.2,
        };
        assert_eq!(single.kind(), StrategyKind::Single);
        assert_eq!(pair.kind(), StrategyKind::Combination);
        assert_eq!(pair.to_string(), "DPA1*01 + DR53");
    }
}
