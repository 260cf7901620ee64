use std::time::Instant;

use riskradar_analytics::{RiskRadar, SpreadPairSpec};

use crate::cli::PeriodArgs;
use crate::error::CliError;

use super::{analysis_result, CommandResult};

pub async fn run(args: &PeriodArgs, radar: &RiskRadar) -> Result<CommandResult, CliError> {
    let started = Instant::now();
    let outcome = radar
        .spread_analysis(&SpreadPairSpec::default(), args.period)
        .await;
    analysis_result(outcome, started)
}
