use approx::assert_abs_diff_eq;
use cpra::config::OptimizerConfig;
use cpra::frequency::FrequencyTable;
use cpra::kernel::calculate_cpra;
use cpra::normalize::normalize;
use cpra::optimize::{ScoreBand, find_strategies};
use cpra::pipeline::evaluate;
use cpra::types::{AntigenCode, AntigenSet};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn table_codes(table: &FrequencyTable) -> Vec<AntigenCode> {
    table.entries().iter().map(|e| e.antigen.clone()).collect()
}

#[test]
fn score_is_monotonic_under_addition() {
    let table = FrequencyTable::nmdp_2023();
    let mut pool = table_codes(table);
    pool.extend((0..20).map(|i| AntigenCode::new(format!("X{i}"))));
    let mut rng = StdRng::seed_from_u64(1042);

    for _ in 0..50 {
        pool.shuffle(&mut rng);
        let take = rng.gen_range(1..=40);
        let mut set = AntigenSet::new();
        let mut previous = calculate_cpra(table, &set);
        assert_eq!(previous, 0.0);

        for code in pool.iter().take(take) {
            set.insert(code.clone());
            let score = calculate_cpra(table, &set);
            assert!(score >= previous, "{score} < {previous} after adding {code}");
            assert!((0.0..=100.0).contains(&score));
            previous = score;
        }
    }
}

#[test]
fn score_ignores_order_and_duplicates() {
    let table = FrequencyTable::nmdp_2023();
    let mut codes = table_codes(table);
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..20 {
        codes.shuffle(&mut rng);
        let subset: Vec<AntigenCode> = codes.iter().take(12).cloned().collect();
        let baseline = calculate_cpra(table, &subset);

        let mut shuffled = subset.clone();
        shuffled.shuffle(&mut rng);
        shuffled.extend(subset.iter().take(4).cloned());
        assert_abs_diff_eq!(calculate_cpra(table, &shuffled), baseline, epsilon = 1e-9);
    }
}

#[test]
fn equivalent_spellings_share_a_key() {
    let keys: Vec<String> = ["DQB1*04:01", "DQB1*4", "DQB104", "DQ4", "hla-dqb1*04"]
        .iter()
        .map(|raw| normalize(raw).as_str().to_string())
        .collect();
    assert!(keys.iter().all(|k| k == "DQB1*04"), "{keys:?}");

    for raw in ["A*02:01", "B44", "Cw7", "DRB1*15:01", "DRB4", "DPB1*04:01", "??"] {
        let once = normalize(raw);
        assert_eq!(normalize(once.as_str()), once, "normalizing '{raw}' twice");
    }
}

#[test]
fn every_table_key_is_canonical() {
    let table = FrequencyTable::nmdp_2023();
    for entry in table.entries() {
        let normalized = normalize(entry.antigen.as_str());
        assert!(normalized.is_parsed());
        assert_eq!(normalized.as_str(), entry.antigen.as_str());
        assert!((0.0..=1.0).contains(&entry.frequency));
    }
}

#[test]
fn optimizer_results_always_meet_the_target_and_stay_sorted() {
    let table = FrequencyTable::nmdp_2023();
    let config = OptimizerConfig::default();
    let codes = table_codes(table);
    let mut rng = StdRng::seed_from_u64(2023);
    let mut optimizable_cases = 0;

    for _ in 0..200 {
        let size = rng.gen_range(8..=25);
        let set: AntigenSet = codes.choose_multiple(&mut rng, size).cloned().collect();
        let score = calculate_cpra(table, &set);
        let strategies = find_strategies(table, &config, score, &set);

        if ScoreBand::classify(score, &config) != ScoreBand::Optimizable {
            assert!(strategies.is_empty());
            continue;
        }
        optimizable_cases += 1;
        assert!(strategies.len() <= config.max_strategies);
        for strategy in &strategies {
            assert!(strategy.resulting_score >= config.target_score);
            assert!(strategy.antigens.iter().all(|code| !set.contains(code)));
        }
        for pair in strategies.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.antigens.len() < b.antigens.len()
                    || (a.antigens.len() == b.antigens.len()
                        && a.resulting_score >= b.resulting_score)
            );
        }
    }
    assert!(optimizable_cases > 0, "no sampled set landed in the band");
}

#[test]
fn pipeline_reports_the_documented_examples() {
    let table = FrequencyTable::nmdp_2023();
    let config = OptimizerConfig::default();

    let empty = evaluate(table, &config, Vec::<String>::new());
    assert_eq!(empty.score, 0.0);
    assert_eq!(empty.band, ScoreBand::BelowBand);

    let a2_b7 = evaluate(table, &config, ["A2", "B7"]);
    assert_abs_diff_eq!(a2_b7.score, 59.0494, epsilon = 1e-3);
    assert!(a2_b7.strategies.is_empty());

    assert!(find_strategies(table, &config, 50.0, &AntigenSet::new()).is_empty());
    assert!(find_strategies(table, &config, 99.7, &AntigenSet::new()).is_empty());
}
