//! previsim: drive a retirement-plan simulation from the command line
//!
//! Loads a scenario file, advances the engine by N months, and prints the
//! structured per-month event log as text lines or JSON.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre::WrapErr;
use tracing_subscriber::EnvFilter;

mod scenario;

use scenario::Scenario;

#[derive(Debug, Parser)]
#[command(name = "previsim", version, about = "Retirement-plan account simulator")]
struct Cli {
    /// Scenario file (JSON) describing funds, users, certificates, and
    /// pending requests
    #[arg(long, short)]
    scenario: PathBuf,

    /// Months to advance
    #[arg(long, short, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=600))]
    months: u32,

    /// Emit the month log as JSON instead of text lines
    #[arg(long)]
    json: bool,

    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let scenario = load_scenario(&cli.scenario)?;
    let mut store = scenario.build()?;

    tracing::info!(months = cli.months, scenario = %cli.scenario.display(), "advancing simulation");
    let log = previsim_core::evolve(&mut store, cli.months);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        for month in &log {
            println!("=== Month {} ({}) ===", month.month, month.date);
            for event in &month.events {
                println!("  {event}");
            }
        }
    }

    Ok(())
}

fn load_scenario(path: &Path) -> color_eyre::Result<Scenario> {
    let raw = fs::read_to_string(path)
        .wrap_err_with(|| format!("reading scenario {}", path.display()))?;
    serde_json::from_str(&raw)
        .wrap_err_with(|| format!("parsing scenario {}", path.display()))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("previsim={level},previsim_core=warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_scenario_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"funds": [{{"id": 1, "name": "Flat", "initial_nav": 1.0}}]}}"#
        )
        .unwrap();
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.funds.len(), 1);
        assert!(scenario.requests.is_empty());
    }

    #[test]
    fn test_load_scenario_missing_file_errors() {
        assert!(load_scenario(Path::new("/nonexistent/scenario.json")).is_err());
    }
}
