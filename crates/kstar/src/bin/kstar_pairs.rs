use std::path::PathBuf;

use clap::Parser;
use indexmap::IndexMap;
use kstar::{
    read_parquet, write_pairs_parquet, Analysis, AnalysisConfig, AnalysisTally,
    CandidateReadOptions, CollisionSummary, CollisionSystem, ConfigValue, KstarResult,
};

/// Select K0S and photon candidates from a V0 table and pair them into K*(892) candidates.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Parquet file of V0 candidates
    input: String,

    /// Nested JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override a single setting by its flat key, e.g. `v0Selections.v0cospa=0.99`
    #[arg(short, long = "set", value_name = "KEY=VALUE", value_parser = parse_setting)]
    settings: Vec<(String, ConfigValue)>,

    /// Read generated-level columns and apply the truth requirements (overrides `doMCAssociation`
    /// from `--config`)
    #[arg(long)]
    mc: bool,

    /// Treat the input as Pb-Pb collisions (FT0C centrality and gap sides)
    #[arg(long)]
    pbpb: bool,

    /// Write the reported pairs to this Parquet file
    #[arg(short, long)]
    pairs_out: Option<String>,

    /// Number of worker threads
    #[arg(short, long)]
    threads: Option<usize>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

fn parse_setting(s: &str) -> Result<(String, ConfigValue), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got \"{s}\""))?;
    let value = value.parse::<ConfigValue>().map_err(|e| e.to_string())?;
    Ok((key.trim().to_string(), value))
}

fn resolve_config(args: &Args) -> KstarResult<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };
    if args.pbpb {
        config.system = CollisionSystem::PbPb;
    }
    config.mc_association = args.mc;
    let settings: IndexMap<String, ConfigValue> = args.settings.iter().cloned().collect();
    config.apply_flat(&settings)?;
    Ok(config)
}

/// Logging is configured by `filter_var`, falling back to `info` when it is unset.
fn log_env(filter_var: &str) -> env_logger::Env<'_> {
    env_logger::Env::default().filter_or(filter_var, "info")
}

fn main() -> KstarResult<()> {
    env_logger::Builder::from_env(log_env("RUST_LOG")).init();
    let args = Args::parse();
    let config = resolve_config(&args)?;
    if args.print_config {
        println!("{}", config.to_json_string()?);
        return Ok(());
    }
    #[cfg(feature = "rayon")]
    if let Some(threads) = args.threads {
        kstar::set_num_threads(threads)?;
    }
    #[cfg(not(feature = "rayon"))]
    if args.threads.is_some() {
        log::warn!("Built without the \"rayon\" feature, ignoring --threads");
    }

    let truth = config.mc_association;
    let analysis = Analysis::new(config);
    let batches = read_parquet(&args.input, &CandidateReadOptions::new().truth(truth))?;
    let outcomes = analysis.process_all(&batches)?;
    let tally = AnalysisTally::from_outcomes(&outcomes);
    println!("{tally}");

    if let Some(path) = &args.pairs_out {
        let summaries: Vec<CollisionSummary> = outcomes
            .iter()
            .filter_map(|outcome| outcome.summary().cloned())
            .collect();
        write_pairs_parquet(&summaries, path)?;
        log::info!("Wrote {} pairs to {}", tally.pairs, path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_follows_environment() {
        let filter = |var: &str| env_logger::Builder::from_env(log_env(var)).build().filter();
        assert_eq!(filter("KSTAR_PAIRS_TEST_LOG_UNSET"), log::LevelFilter::Info);
        std::env::set_var("KSTAR_PAIRS_TEST_LOG_DEBUG", "debug");
        assert_eq!(filter("KSTAR_PAIRS_TEST_LOG_DEBUG"), log::LevelFilter::Debug);
        std::env::set_var("KSTAR_PAIRS_TEST_LOG_WARN", "warn");
        assert_eq!(filter("KSTAR_PAIRS_TEST_LOG_WARN"), log::LevelFilter::Warn);
    }

    #[test]
    fn test_parse_setting() {
        let (key, value) = parse_setting("v0Selections.v0cospa=0.99").unwrap();
        assert_eq!(key, "v0Selections.v0cospa");
        assert_eq!(value, ConfigValue::Float(0.99));
        assert!(parse_setting("v0Selections.v0cospa").is_err());
        assert!(parse_setting("requireSel8=maybe").is_err());
    }

    #[test]
    fn test_flags_and_settings_are_applied_in_order() {
        let args = Args::parse_from([
            "kstar-pairs",
            "input.parquet",
            "--pbpb",
            "--set",
            "rapidityCut=0.8",
            "-s",
            "photonSelections.v0cospa=0.9",
            "--set",
            "doMCAssociation=true",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.system, CollisionSystem::PbPb);
        assert!(config.mc_association);
        assert_eq!(config.rapidity.max, 0.8);
        assert_eq!(config.photon.topology.cos_pa_min, 0.9);

        let args = Args::parse_from(["kstar-pairs", "input.parquet", "--set", "bogus=1"]);
        assert!(resolve_config(&args).is_err());
    }
}
