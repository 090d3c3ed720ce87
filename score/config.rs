use crate::frequency::{FrequencyTable, TableError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The National Priority cutoff the optimizer aims for.
pub const NATIONAL_PRIORITY_THRESHOLD: f64 = 99.5;

/// Scores above this are reported as highly sensitized.
pub const HIGHLY_SENSITIZED_THRESHOLD: f64 = 98.0;

/// Bounds and thresholds for the strategy search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Score a strategy must reach. Also the upper, exclusive edge of the operating band.
    pub target_score: f64,
    /// Lowest score at which the optimizer runs.
    pub band_floor: f64,
    /// How many of the most frequent candidates enter the pair search.
    pub pair_pool_size: usize,
    /// Strategies kept after ranking.
    pub max_strategies: usize,
    /// Pair counts above this are evaluated on the rayon pool.
    pub parallel_pair_threshold: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            target_score: NATIONAL_PRIORITY_THRESHOLD,
            band_floor: 95.0,
            pair_pool_size: 30,
            max_strategies: 20,
            parallel_pair_threshold: 4096,
        }
    }
}

/// Everything a run of the engine can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A `locus,antigen,frequency` CSV replacing the built-in NMDP 2023 table.
    pub frequency_table: Option<PathBuf>,
    pub optimizer: OptimizerConfig,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error(
        "Optimizer band is empty: band_floor ({floor}) must be below target_score ({target}), and both must lie in [0, 100]."
    )]
    InvalidBand { floor: f64, target: f64 },
    #[error("pair_pool_size must be at least 2 for the pair search to consider anything.")]
    EmptyPairPool,
    #[error("max_strategies must be at least 1.")]
    NoResults,
    #[error("Failed to load the configured frequency table: {0}")]
    Table(#[from] TableError),
}

impl EngineConfig {
    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let optimizer = &self.optimizer;
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if !in_range(optimizer.band_floor)
            || !in_range(optimizer.target_score)
            || optimizer.band_floor >= optimizer.target_score
        {
            return Err(ConfigError::InvalidBand {
                floor: optimizer.band_floor,
                target: optimizer.target_score,
            });
        }
        if optimizer.pair_pool_size < 2 {
            return Err(ConfigError::EmptyPairPool);
        }
        if optimizer.max_strategies == 0 {
            return Err(ConfigError::NoResults);
        }
        Ok(())
    }

    /// Saves the configuration to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads and validates a configuration from a TOML file. Missing keys take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    /// The configured table, or the built-in one.
    pub fn resolve_table(&self) -> Result<FrequencyTable, ConfigError> {
        match &self.frequency_table {
            Some(path) => Ok(FrequencyTable::from_csv_path(path)?),
            None => Ok(FrequencyTable::nmdp_2023().clone()),
        }
    }
}
