// ========================================================================================
//
//                 The strategy optimizer: shortest paths to National Priority
//
// ========================================================================================
//
// Given a score inside the operating band, the optimizer looks for the smallest
// additions to the unacceptable-antigen set that lift the score to the target: every
// table antigen the candidate does not already list, then every pair drawn from the
// most frequent of them. Results rank by antigen count, then by resulting score.
//
// The search works from the score, not from the antigen set: the compatible
// probability is re-derived as `1 - score / 100`. That keeps the optimizer a pure
// function of its numeric input; precision is that of the score handed in.

use crate::config::OptimizerConfig;
use crate::frequency::FrequencyTable;
use crate::types::{AntigenCode, AntigenSet, Strategy};
use itertools::Itertools;
use log::debug;
use rayon::prelude::*;
use std::fmt;

/// Where a score sits relative to the optimizer's operating band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    /// Below the band floor; the search space is too loose to be useful.
    BelowBand,
    /// `band_floor <= score < target_score`.
    Optimizable,
    /// Already at or above the target.
    TargetMet,
}

impl ScoreBand {
    pub fn classify(score: f64, config: &OptimizerConfig) -> Self {
        if score >= config.target_score {
            ScoreBand::TargetMet
        } else if score >= config.band_floor {
            ScoreBand::Optimizable
        } else {
            ScoreBand::BelowBand
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ScoreBand::BelowBand => "optimizer inactive",
            ScoreBand::Optimizable => "optimizer active",
            ScoreBand::TargetMet => "target already met",
        }
    }
}

impl fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A table antigen the candidate does not already list.
#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    code: &'a AntigenCode,
    frequency: f64,
}

/// Scores the addition of antigens whose `1 - f` factors multiply to `survival`.
#[inline]
fn score_after(current_prob: f64, survival: f64) -> f64 {
    (1.0 - current_prob * survival) * 100.0
}

fn strategy_for(
    antigens: Vec<AntigenCode>,
    resulting_score: f64,
    current_score: f64,
) -> Strategy {
    Strategy {
        antigens,
        resulting_score,
        gain: resulting_score - current_score,
    }
}

fn evaluate_pair(
    a: &Candidate,
    b: &Candidate,
    current_prob: f64,
    current_score: f64,
    target: f64,
) -> Option<Strategy> {
    let new_score = score_after(current_prob, (1.0 - a.frequency) * (1.0 - b.frequency));
    (new_score >= target).then(|| {
        strategy_for(
            vec![a.code.clone(), b.code.clone()],
            new_score,
            current_score,
        )
    })
}

/// Finds single antigens and pairs whose addition raises `current_score` to the target.
///
/// Returns an empty list outside the operating band, or when nothing reaches the
/// target. Never returns a strategy below the target. Output is sorted by antigen
/// count ascending, then resulting score descending, and truncated to
/// `config.max_strategies`. Ties keep table order, so output is reproducible.
pub fn find_strategies(
    table: &FrequencyTable,
    config: &OptimizerConfig,
    current_score: f64,
    current_antigens: &AntigenSet,
) -> Vec<Strategy> {
    if ScoreBand::classify(current_score, config) != ScoreBand::Optimizable {
        return Vec::new();
    }

    let target = config.target_score;
    let current_prob = 1.0 - current_score / 100.0;

    let candidates: Vec<Candidate> = table
        .entries()
        .iter()
        .filter(|entry| !current_antigens.contains(&entry.antigen))
        .map(|entry| Candidate {
            code: &entry.antigen,
            frequency: table.frequency_or_rare(&entry.antigen),
        })
        .collect();

    // --- Single-antigen pass ---
    let mut strategies: Vec<Strategy> = candidates
        .iter()
        .filter_map(|candidate| {
            let new_score = score_after(current_prob, 1.0 - candidate.frequency);
            (new_score >= target)
                .then(|| strategy_for(vec![candidate.code.clone()], new_score, current_score))
        })
        .collect();
    let single_count = strategies.len();

    // --- Pair pass over the most frequent candidates ---
    // The sort is stable, so equal frequencies keep table order.
    let mut pool = candidates;
    pool.sort_by(|a, b| b.frequency.total_cmp(&a.frequency));
    pool.truncate(config.pair_pool_size);

    let pair_total = pool.len() * pool.len().saturating_sub(1) / 2;
    let pairs: Vec<Strategy> = if pair_total > config.parallel_pair_threshold {
        let pool = &pool;
        (0..pool.len())
            .into_par_iter()
            .flat_map_iter(move |i| {
                ((i + 1)..pool.len()).filter_map(move |j| {
                    evaluate_pair(&pool[i], &pool[j], current_prob, current_score, target)
                })
            })
            .collect()
    } else {
        pool.iter()
            .tuple_combinations()
            .filter_map(|(a, b)| evaluate_pair(a, b, current_prob, current_score, target))
            .collect()
    };
    debug!(
        "score {current_score:.4}: {} candidates, {single_count} single and {} of {pair_total} pair strategies reach {target}",
        pool.len(),
        pairs.len()
    );
    strategies.extend(pairs);

    // --- Ranking ---
    strategies.sort_by(|a, b| {
        a.antigens
            .len()
            .cmp(&b.antigens.len())
            .then_with(|| b.resulting_score.total_cmp(&a.resulting_score))
    });
    strategies.truncate(config.max_strategies);
    strategies
}
