//! # pp-cli
//!
//! Argument handling and the load → search → write pipeline behind the
//! `pool-probes` binary.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pp_data::{read_dataset_weights, read_probe_counts, write_param_values};
use pp_types::{internal_error, PoolingResult, RoundSpec, SearchConfig, SearchMode};

/// Workspace crates whose logs follow `--verbose` / `--debug`.
const CRATES: &[&str] = &["pp_types", "pp_data", "pp_optimizer", "pp_cli", "pool_probes"];

/// Determine parameters for a probe set so that, when pooled across
/// datasets, the total number of probes fits a target.
#[derive(Parser, Debug)]
#[command(name = "pool-probes", version, about)]
pub struct Cli {
    /// TSV with a `dataset` column, one column per parameter, and a final
    /// probe count column
    pub probe_count_tsv: PathBuf,

    /// Constraint on the total number of probes in the design
    pub target_probe_count: u64,

    /// Output TSV with the selected parameter values per dataset
    pub param_vals_tsv: PathBuf,

    /// Round mismatches to a multiple of M and cover extension to a multiple
    /// of E
    #[arg(long, num_args = 2, value_names = ["M", "E"])]
    pub round_params: Option<Vec<u32>>,

    /// Search continuously over any number of parameters instead of the
    /// standard (mismatches, cover_extension) search
    #[arg(long)]
    pub use_nd: bool,

    /// One loss coefficient per parameter, in table column order
    #[arg(long, num_args = 1.., allow_negative_numbers = true)]
    pub loss_coeffs: Option<Vec<f64>>,

    /// TSV with `dataset` and `weight` columns giving each dataset's weight in
    /// the loss
    #[arg(long)]
    pub dataset_weights: Option<PathBuf>,

    /// JSON search configuration; command-line flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(long)]
    pub debug: bool,

    /// Log progress
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }

    /// Install a stderr subscriber. `RUST_LOG` takes precedence when set.
    pub fn init_tracing(&self) {
        let level = self.log_level();
        let allowlist: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("warn,{}", allowlist.join(","))));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Configuration file values with command-line flags applied on top.
    pub fn search_config(&self) -> Result<SearchConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SearchConfig::new(self.target_probe_count),
        };
        config.target_cost = self.target_probe_count;

        if self.use_nd {
            config = config.with_mode(SearchMode::HigherDimensional);
        }
        if let Some(round) = &self.round_params {
            let [m, e] = round.as_slice() else {
                return Err(internal_error!("expected two rounding multiples, got {}", round.len()).into());
            };
            config = config.with_rounding(RoundSpec::new(*m, *e));
        }
        if let Some(coeffs) = &self.loss_coeffs {
            config = config.with_loss_coeffs(coeffs.clone());
        }
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<SearchConfig> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing search configuration {}", path.display()))
}

/// Load the inputs, run the search, and write the selected values.
///
/// Nothing is written when any step fails.
pub fn run(cli: &Cli) -> Result<PoolingResult> {
    let table = read_probe_counts(&cli.probe_count_tsv)
        .with_context(|| format!("reading {}", cli.probe_count_tsv.display()))?;
    let weights = match &cli.dataset_weights {
        Some(path) => Some(
            read_dataset_weights(path, &table)
                .with_context(|| format!("reading {}", path.display()))?,
        ),
        None => None,
    };
    let config = cli.search_config()?;
    tracing::info!(
        datasets = table.len(),
        target = config.target_cost,
        mode = ?config.mode,
        weighted = weights.is_some(),
        "loaded inputs"
    );

    let result = pp_optimizer::pool(&table, weights.as_ref(), &config)?;
    tracing::info!(
        output = %cli.param_vals_tsv.display(),
        total_cost = result.total_cost(),
        "writing selected parameter values"
    );
    write_param_values(&cli.param_vals_tsv, &result)?;
    Ok(result)
}

/// The two summary lines printed on success.
pub fn summary(result: &PoolingResult) -> String {
    let probes = match result {
        PoolingResult::Standard(s) => s.total_cost.to_string(),
        PoolingResult::HigherDimensional(s) => format!("{:.2}", s.total_cost),
    };
    format!(
        "Number of probes: {}\nLoss: {:.6}",
        probes,
        result.total_loss()
    )
}
