#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::error::Error;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use cpra::config::EngineConfig;
use cpra::frequency::FrequencyTable;
use cpra::normalize::{NormalizedAntigen, normalize};
use cpra::optimize::ScoreBand;
use cpra::pipeline::{Evaluation, assess_set, evaluate_set, normalize_all};
use cpra::report::parse_report_text;
use cpra::types::{Locus, StrategyKind};

const DISCLAIMER: &str = "Educational approximation only. This estimate multiplies antigen \
frequencies as if they were independent and ignores haplotypes and linkage disequilibrium. \
It is not the regulatory cPRA calculator and must not be used for clinical decisions.";

#[derive(Parser)]
#[command(
    name = "cpra",
    about = "Calculated Panel Reactive Antibody estimator and National Priority optimizer",
    long_about = "Estimates the cPRA of a transplant candidate from their unacceptable HLA \
                 antigens and searches for the smallest additions that reach the 99.5% \
                 National Priority threshold."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct CalculateArgs {
    /// Unacceptable antigens in any common spelling (A2, A*02:01, DQ4, HLA-DQB1*04:01)
    #[arg(value_name = "ANTIGEN")]
    antigens: Vec<String>,

    /// Lab report with `Locus: values` lines; `-` reads standard input
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// TOML engine configuration (see `cpra config`)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Frequency table CSV (locus,antigen,frequency) replacing the configured one
    #[arg(long, value_name = "CSV")]
    table: Option<PathBuf>,

    /// Report the score only and skip the strategy search
    #[arg(long)]
    no_optimize: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a set of unacceptable antigens
    #[command(about = "Calculate cPRA and National Priority strategies")]
    Calculate(CalculateArgs),

    /// Show how raw antigen spellings normalize
    #[command(about = "Normalize antigen spellings to table keys")]
    Normalize {
        #[arg(value_name = "ANTIGEN", required = true)]
        antigens: Vec<String>,

        /// Frequency table CSV to look keys up in (default: built-in NMDP 2023)
        #[arg(long, value_name = "CSV")]
        table: Option<PathBuf>,
    },

    /// Print a frequency table as TSV
    #[command(about = "Print the frequency table (TSV), NMDP 2023 unless --table is given")]
    Table {
        /// Restrict output to one locus (A, B, C, DR, DQB1, DQA1, DPB1, DPA1)
        #[arg(long)]
        locus: Option<Locus>,

        /// Frequency table CSV to print instead of the built-in one
        #[arg(long, value_name = "CSV")]
        table: Option<PathBuf>,
    },

    /// Print or write the default engine configuration
    #[command(about = "Print the default configuration (TOML)")]
    Config {
        /// Write the configuration to this file instead of standard output
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Calculate(args)) => run_calculate(args),
        Some(Commands::Normalize { antigens, table }) => run_normalize(&antigens, table),
        Some(Commands::Table { locus, table }) => run_table(locus, table),
        Some(Commands::Config { output }) => run_config(output.as_deref()),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Splits positional arguments on commas so `A2,B7` and `A2 B7` mean the same thing.
fn split_tokens(raw: &[String]) -> impl Iterator<Item = &str> {
    raw.iter()
        .flat_map(|arg| arg.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn read_report(path: &Path) -> Result<String, io::Error> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(path)
    }
}

fn run_calculate(args: CalculateArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(table) = args.table {
        config.frequency_table = Some(table);
    }
    let table = config.resolve_table()?;

    let mut tokens: Vec<String> = split_tokens(&args.antigens).map(String::from).collect();
    if let Some(path) = &args.report {
        let text = read_report(path)?;
        let parsed = parse_report_text(&text);
        if parsed.is_empty() {
            log::warn!("no antigen lines recognized in report {}", path.display());
        }
        tokens.extend(parsed);
    }

    let (antigens, unparsed) = normalize_all(&tokens);
    let evaluation = if args.no_optimize {
        assess_set(&table, &config.optimizer, antigens)
    } else {
        evaluate_set(&table, &config.optimizer, antigens)
    };
    let evaluation = Evaluation {
        unparsed,
        ..evaluation
    };

    print_evaluation(&evaluation, &config, args.no_optimize);
    Ok(())
}

fn print_evaluation(evaluation: &Evaluation, config: &EngineConfig, no_optimize: bool) {
    let optimizer = &config.optimizer;

    if evaluation.antigens.is_empty() {
        println!("Unacceptable antigens: none");
    } else {
        println!(
            "Unacceptable antigens ({}): {}",
            evaluation.antigens.len(),
            evaluation.antigens
        );
    }
    if !evaluation.unparsed.is_empty() {
        println!(
            "Unrecognized format, scored as rare alleles: {}",
            evaluation.unparsed.join(", ")
        );
    }

    println!("cPRA: {:.2}%", evaluation.score);
    if evaluation.is_national_priority() {
        println!("Status: National Priority (>= {}%)", optimizer.target_score);
    } else if evaluation.is_highly_sensitized() {
        println!("Status: highly sensitized");
    } else {
        println!("Status: standard allocation");
    }

    if no_optimize {
        println!();
        println!("{DISCLAIMER}");
        return;
    }

    match evaluation.band {
        ScoreBand::BelowBand => println!(
            "Optimizer: {} (score below {}%)",
            evaluation.band, optimizer.band_floor
        ),
        ScoreBand::TargetMet => println!("Optimizer: {}", evaluation.band),
        ScoreBand::Optimizable if evaluation.strategies.is_empty() => println!(
            "Optimizer: no single antigen or pair reaches {}%",
            optimizer.target_score
        ),
        ScoreBand::Optimizable => {
            println!("Strategies reaching {}%:", optimizer.target_score);
            for (rank, strategy) in evaluation.strategies.iter().enumerate() {
                let kind = match strategy.kind() {
                    StrategyKind::Single => "single",
                    StrategyKind::Combination => "pair",
                };
                println!(
                    "  {:>2}. {:<24} {:>7.3}%  (+{:.3}, {kind})",
                    rank + 1,
                    strategy.to_string(),
                    strategy.resulting_score,
                    strategy.gain
                );
            }
        }
    }

    println!();
    println!("{DISCLAIMER}");
}

/// The CSV table at `path`, or the built-in one.
fn load_table(path: Option<PathBuf>) -> Result<FrequencyTable, Box<dyn Error>> {
    let config = EngineConfig {
        frequency_table: path,
        ..EngineConfig::default()
    };
    Ok(config.resolve_table()?)
}

fn run_normalize(antigens: &[String], table: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let table = load_table(table)?;
    for raw in split_tokens(antigens) {
        match normalize(raw) {
            NormalizedAntigen::Parsed(code) => match table.get(&code) {
                Some(frequency) => println!("{raw}\t{code}\t{frequency}"),
                None => println!("{raw}\t{code}\tnot tabulated"),
            },
            NormalizedAntigen::Unparsed(text) => println!("{raw}\t{text}\tunrecognized"),
        }
    }
    Ok(())
}

fn run_table(locus: Option<Locus>, table: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let table = load_table(table)?;
    println!("locus\tantigen\tfrequency");
    let entries: Vec<_> = match locus {
        Some(locus) => table.entries_for(locus).collect(),
        None => table.entries().iter().collect(),
    };
    for entry in entries {
        println!("{}\t{}\t{}", entry.locus, entry.antigen, entry.frequency);
    }
    Ok(())
}

fn run_config(output: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::default();
    match output {
        Some(path) => {
            config.save(path)?;
            println!("Configuration written to {}", path.display());
        }
        None => print!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{} seconds ago", seconds)
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("CPRA_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("cpra {}", version);
    println!(
        "Frequency table: NMDP 2023 ({} antigens)",
        FrequencyTable::nmdp_2023().len()
    );

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
