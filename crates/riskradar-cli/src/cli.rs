//! CLI argument definitions for riskradar.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `state` | Current composite stress score and regime |
//! | `history` | Composite score and regime for every date in a lookback |
//! | `stats` | Composite statistics and regime distribution |
//! | `alerts` | Regime changes, extreme components and flags |
//! | `spreads` | Yield spreads against FX: correlations, lead/lag, alerts |
//! | `fetch` | Resolve a single series through the provider chain |
//! | `sources` | Provider priority, registration and symbol mappings |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | TOML configuration file |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--timeout-ms` | from config | Budget for one symbol's provider chain |
//! | `--no-cache` | `false` | Bypass the in-process series cache |
//! | `--as-of` | today (UTC) | Reference date, `YYYY-MM-DD` |
//!
//! # Examples
//!
//! ```bash
//! riskradar state --pretty
//! riskradar spreads --period 6mo
//! riskradar fetch EURUSD --period 3mo --source yahoo --source twelvedata
//! riskradar --config riskradar.toml --as-of 2024-06-28 history --period 1y
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use riskradar_core::{parse_date, LookbackPeriod, ProviderId};
use time::Date;

/// Multi-source credit and rates stress radar.
#[derive(Debug, Parser)]
#[command(
    name = "riskradar",
    author,
    version,
    about = "Multi-source credit and rates stress radar",
    long_about = "riskradar fetches credit spreads, volatility, yields and FX from several \
data providers with ordered fallback, scores them with rolling Z-scores and classifies \
the composite into CALM, WATCH, WARNING or ALERT.\n\
\n\
Output is a JSON envelope on stdout. Logs go to stderr (RUST_LOG)."
)]
pub struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Budget in milliseconds for one symbol's whole provider chain.
    #[arg(long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Bypass the in-process series cache.
    #[arg(long, global = true, default_value_t = false)]
    pub no_cache: bool,

    /// Reference date (YYYY-MM-DD) instead of today.
    #[arg(long, global = true, value_name = "DATE", value_parser = parse_date)]
    pub as_of: Option<Date>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Current composite stress score, regime and component readings.
    State,

    /// Composite score and regime for every date of the lookback.
    ///
    /// # Examples
    ///
    ///   riskradar history --period 6mo
    History(PeriodArgs),

    /// Composite statistics and regime distribution over the lookback.
    Stats(PeriodArgs),

    /// Alerts over the lookback, most recent first.
    Alerts(PeriodArgs),

    /// Yield spread and FX cross analysis.
    ///
    /// Computes US_10Y_2Y, US_EU_10Y, US_UK_10Y and US_JP_10Y against
    /// DXY, EURUSD, USDJPY and GBPUSD.
    Spreads(PeriodArgs),

    /// Resolve one canonical symbol through the provider chain.
    ///
    /// # Examples
    ///
    ///   riskradar fetch HY_OAS
    ///   riskradar fetch EURUSD --period 3mo --source yahoo --source twelvedata
    Fetch(FetchArgs),

    /// Provider priority, registration status and mapped symbols.
    Sources(SourcesArgs),
}

/// Lookback argument shared by the analysis commands.
#[derive(Debug, Args)]
pub struct PeriodArgs {
    /// Lookback period: 1mo, 3mo, 6mo, 1y, 2y or 5y.
    #[arg(long, default_value = "1y")]
    pub period: LookbackPeriod,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Canonical symbol (e.g. HY_OAS, VIX, EURUSD).
    pub symbol: String,

    /// Lookback period: 1mo, 3mo, 6mo, 1y, 2y or 5y.
    #[arg(long, default_value = "3mo")]
    pub period: LookbackPeriod,

    /// Provider order for this fetch; repeat to build a chain.
    #[arg(long = "source", value_name = "PROVIDER")]
    pub sources: Vec<ProviderId>,
}

#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// List the provider-side symbols for every canonical instrument.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use time::macros::date;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_options_apply_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "riskradar",
            "history",
            "--period",
            "6mo",
            "--as-of",
            "2024-06-28",
            "--no-cache",
        ])
        .expect("valid arguments");

        assert_eq!(cli.as_of, Some(date!(2024 - 06 - 28)));
        assert!(cli.no_cache);
        match cli.command {
            Command::History(args) => assert_eq!(args.period, LookbackPeriod::SixMonths),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn fetch_collects_an_explicit_chain() {
        let cli = Cli::try_parse_from([
            "riskradar", "fetch", "eurusd", "--source", "yahoo", "--source", "twelvedata",
        ])
        .expect("valid arguments");

        match cli.command {
            Command::Fetch(args) => {
                assert_eq!(args.period, LookbackPeriod::ThreeMonths);
                assert_eq!(args.sources, vec![ProviderId::Yahoo, ProviderId::TwelveData]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_period_and_source() {
        assert!(Cli::try_parse_from(["riskradar", "stats", "--period", "7y"]).is_err());
        assert!(Cli::try_parse_from(["riskradar", "fetch", "VIX", "--source", "bloomberg"]).is_err());
        assert!(Cli::try_parse_from(["riskradar", "--as-of", "06/28/2024", "state"]).is_err());
    }
}
