// ========================================================================================
//
//                      The kernel: the independent-probability cPRA
//
// ========================================================================================
//
// A donor is compatible only if they carry none of the unacceptable antigens. Treating
// antigens as independent, the compatible fraction is the product of `1 - f` over the
// candidate's antigens, and the cPRA is the incompatible fraction as a percentage.
//
// This ignores haplotype structure and linkage disequilibrium entirely. It approximates
// the regulatory calculator and must not be presented as a substitute for it.

use crate::frequency::FrequencyTable;
use crate::types::AntigenCode;
use ahash::AHashSet;
use log::trace;

/// Converts a compatible-donor probability into a cPRA percentage, clamped to [0, 100].
#[inline]
pub fn score_from_compatible_probability(prob_compatible: f64) -> f64 {
    ((1.0 - prob_compatible) * 100.0).clamp(0.0, 100.0)
}

/// Computes the cPRA for a collection of normalized codes.
///
/// Each distinct code counts once, so `[A2, B7, A2]` scores exactly like `{A2, B7}`,
/// and order never matters. Codes missing from the table use the rare-allele default.
/// An empty collection scores exactly 0.
pub fn calculate_cpra<'a, I>(table: &FrequencyTable, antigens: I) -> f64
where
    I: IntoIterator<Item = &'a AntigenCode>,
{
    let mut seen = AHashSet::new();
    let mut prob_compatible = 1.0_f64;

    for code in antigens {
        if !seen.insert(code) {
            continue;
        }
        if !table.contains(code) {
            trace!("'{code}' is not tabulated; using the rare-allele frequency");
        }
        prob_compatible *= 1.0 - table.frequency_or_rare(code);
    }

    score_from_compatible_probability(prob_compatible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::{FrequencyEntry, RARE_ALLELE_FREQUENCY};
    use crate::types::{AntigenSet, Locus};
    use approx::assert_abs_diff_eq;

    fn codes(raw: &[&str]) -> Vec<AntigenCode> {
        raw.iter().map(|s| AntigenCode::new(*s)).collect()
    }

    #[test]
    fn empty_set_scores_exactly_zero() {
        let empty: Vec<AntigenCode> = Vec::new();
        assert_eq!(calculate_cpra(FrequencyTable::nmdp_2023(), &empty), 0.0);

        let tiny = FrequencyTable::from_entries([FrequencyEntry {
            locus: Locus::A,
            antigen: AntigenCode::new("A2"),
            frequency: 0.5,
        }])
        .unwrap();
        assert_eq!(calculate_cpra(&tiny, &AntigenSet::new()), 0.0);
    }

    #[test]
    fn a2_b7_matches_hand_computation() {
        let score = calculate_cpra(FrequencyTable::nmdp_2023(), &codes(&["A2", "B7"]));
        let expected = (1.0 - (1.0 - 0.479) * (1.0 - 0.214)) * 100.0;
        assert_abs_diff_eq!(score, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(score, 59.0494, epsilon = 1e-3);
    }

    #[test]
    fn duplicates_and_order_do_not_change_the_score() {
        let table = FrequencyTable::nmdp_2023();
        let with_duplicates = calculate_cpra(table, &codes(&["A2", "B7", "A2"]));
        let reversed = calculate_cpra(table, &codes(&["B7", "A2"]));
        let plain = calculate_cpra(table, &codes(&["A2", "B7"]));
        assert_eq!(with_duplicates, plain);
        assert_abs_diff_eq!(reversed, plain, epsilon = 1e-12);
    }

    #[test]
    fn untabulated_codes_use_the_rare_default() {
        let score = calculate_cpra(FrequencyTable::nmdp_2023(), &codes(&["B999"]));
        assert_abs_diff_eq!(score, RARE_ALLELE_FREQUENCY * 100.0, epsilon = 1e-12);
    }

    #[test]
    fn score_stays_within_bounds_for_many_rare_antigens() {
        let rare: Vec<AntigenCode> = (0..60).map(|i| AntigenCode::new(format!("RARE{i}"))).collect();
        let score = calculate_cpra(FrequencyTable::nmdp_2023(), &rare);
        assert!((0.0..=100.0).contains(&score));
        let expected = (1.0 - (1.0 - RARE_ALLELE_FREQUENCY).powi(60)) * 100.0;
        assert_abs_diff_eq!(score, expected, epsilon = 1e-9);
    }

    #[test]
    fn full_table_saturates_without_leaving_bounds() {
        let table = FrequencyTable::nmdp_2023();
        let everything: Vec<&AntigenCode> = table.entries().iter().map(|e| &e.antigen).collect();
        let score = calculate_cpra(table, everything);
        assert!(score <= 100.0);
        assert!(score > 99.99);
    }

    #[test]
    fn clamping_absorbs_drift() {
        assert_eq!(score_from_compatible_probability(-1e-17), 100.0);
        assert_eq!(score_from_compatible_probability(1.0 + 1e-15), 0.0);
    }
}
