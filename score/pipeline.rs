// ========================================================================================
//
//                 The evaluation pipeline: raw tokens to score and strategies
//
// ========================================================================================
//
// Normalizer -> calculator -> band check -> optimizer, as one pure call. The caller owns
// the antigen state; this module only reads what it is handed.

use crate::config::{HIGHLY_SENSITIZED_THRESHOLD, OptimizerConfig};
use crate::frequency::FrequencyTable;
use crate::kernel::calculate_cpra;
use crate::normalize::{NormalizedAntigen, normalize};
use crate::optimize::{ScoreBand, find_strategies};
use crate::types::{AntigenCode, AntigenSet, Strategy};
use log::{debug, warn};
use natord::compare;

/// Everything a front end needs to present one state of the antigen set.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub antigens: AntigenSet,
    /// Inputs that hit the unparsed branch of normalization, deduplicated, natural order.
    /// They are still part of `antigens` and are scored with the rare-allele default.
    pub unparsed: Vec<String>,
    pub score: f64,
    pub band: ScoreBand,
    /// Empty unless `band` is `Optimizable`.
    pub strategies: Vec<Strategy>,
}

impl Evaluation {
    pub fn is_highly_sensitized(&self) -> bool {
        is_highly_sensitized(self.score)
    }

    pub fn is_national_priority(&self) -> bool {
        self.band == ScoreBand::TargetMet
    }
}

pub fn is_highly_sensitized(score: f64) -> bool {
    score > HIGHLY_SENSITIZED_THRESHOLD
}

/// Normalizes raw tokens into an antigen set, collecting the ones that did not parse.
pub fn normalize_all<I, S>(raw_tokens: I) -> (AntigenSet, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut antigens = AntigenSet::new();
    let mut unparsed = Vec::new();

    for raw in raw_tokens {
        match normalize(raw.as_ref()) {
            NormalizedAntigen::Parsed(code) => {
                antigens.insert(code);
            }
            NormalizedAntigen::Unparsed(text) => {
                warn!("antigen '{text}' is not in a recognized format; scoring it as a rare allele");
                antigens.insert(AntigenCode::new(text.clone()));
                unparsed.push(text);
            }
        }
    }

    unparsed.sort_by(|a, b| compare(a, b).then_with(|| a.cmp(b)));
    unparsed.dedup();
    (antigens, unparsed)
}

/// Scores and classifies an antigen set without searching for strategies.
pub fn assess_set(
    table: &FrequencyTable,
    config: &OptimizerConfig,
    antigens: AntigenSet,
) -> Evaluation {
    let score = calculate_cpra(table, &antigens);
    Evaluation {
        band: ScoreBand::classify(score, config),
        antigens,
        unparsed: Vec::new(),
        score,
        strategies: Vec::new(),
    }
}

/// Scores an antigen set and, inside the operating band, searches for strategies.
pub fn evaluate_set(
    table: &FrequencyTable,
    config: &OptimizerConfig,
    antigens: AntigenSet,
) -> Evaluation {
    let mut evaluation = assess_set(table, config, antigens);
    if evaluation.band == ScoreBand::Optimizable {
        evaluation.strategies =
            find_strategies(table, config, evaluation.score, &evaluation.antigens);
    }
    debug!(
        "{} antigens score {:.4} ({}); {} strategies",
        evaluation.antigens.len(),
        evaluation.score,
        evaluation.band,
        evaluation.strategies.len()
    );
    evaluation
}

/// The full pipeline over raw, not-yet-normalized tokens.
pub fn evaluate<I, S>(table: &FrequencyTable, config: &OptimizerConfig, raw_tokens: I) -> Evaluation
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let (antigens, unparsed) = normalize_all(raw_tokens);
    Evaluation {
        unparsed,
        ..evaluate_set(table, config, antigens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StrategyKind;

    #[test]
    fn raw_spellings_collapse_before_scoring() {
        let table = FrequencyTable::nmdp_2023();
        let config = OptimizerConfig::default();
        let evaluation = evaluate(table, &config, ["A*02:01", "a2", "B7", "HLA-B*07:02"]);

        assert_eq!(evaluation.antigens.to_string(), "A2, B7");
        assert!(evaluation.unparsed.is_empty());
        assert!((evaluation.score - 59.0494).abs() < 1e-3);
        assert_eq!(evaluation.band, ScoreBand::BelowBand);
        assert!(evaluation.strategies.is_empty());
        assert!(!evaluation.is_highly_sensitized());
    }

    #[test]
    fn unparsed_tokens_are_reported_and_scored_as_rare() {
        let table = FrequencyTable::nmdp_2023();
        let config = OptimizerConfig::default();
        let evaluation = evaluate(table, &config, ["zz9", "q1", "zz9"]);

        assert_eq!(evaluation.unparsed, ["Q1", "ZZ9"]);
        assert_eq!(evaluation.antigens.len(), 2);
        let expected = (1.0 - 0.999_f64 * 0.999) * 100.0;
        assert!((evaluation.score - expected).abs() < 1e-9);
    }

    #[test]
    fn assessment_classifies_without_searching() {
        let table = FrequencyTable::nmdp_2023();
        let config = OptimizerConfig::default();
        let (antigens, unparsed) = normalize_all([
            "A2", "C7", "DR52", "DQB1*03:01", "DPB1*04:01", "DQA1*05", "DQ6",
        ]);
        assert!(unparsed.is_empty());

        let assessed = assess_set(table, &config, antigens.clone());
        let evaluated = evaluate_set(table, &config, antigens);
        assert_eq!(assessed.band, ScoreBand::Optimizable);
        assert!(assessed.strategies.is_empty());
        assert_eq!(assessed.score, evaluated.score);
        assert_eq!(assessed.band, evaluated.band);
        assert!(!evaluated.strategies.is_empty());
    }

    #[test]
    fn band_decides_whether_strategies_are_searched() {
        let table = FrequencyTable::nmdp_2023();
        let config = OptimizerConfig::default();
        let evaluation = evaluate(
            table,
            &config,
            ["A2", "C7", "DR52", "DQB1*03:01", "DPB1*04:01", "DQA1*05", "DQ6"],
        );

        assert_eq!(evaluation.band, ScoreBand::Optimizable);
        assert!(evaluation.is_highly_sensitized());
        assert!(!evaluation.is_national_priority());
        assert_eq!(evaluation.strategies.len(), config.max_strategies);
        assert_eq!(evaluation.strategies[0].kind(), StrategyKind::Single);
        assert_eq!(evaluation.strategies[0].to_string(), "DPA1*01");
        assert!(
            evaluation.strategies[1..]
                .iter()
                .all(|s| s.antigens[0].as_str() == "DPA1*01")
        );

        let met = evaluate_set(
            table,
            &config,
            evaluation.strategies[0]
                .antigens
                .iter()
                .cloned()
                .chain(evaluation.antigens.iter().cloned())
                .collect(),
        );
        assert_eq!(met.band, ScoreBand::TargetMet);
        assert!(met.is_national_priority());
        assert!(met.strategies.is_empty());
    }
}
