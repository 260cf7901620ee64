use std::time::Instant;

use riskradar_analytics::{CompositeState, InstrumentSet, RiskRadar};
use riskradar_core::LookbackPeriod;
use serde::Serialize;

use crate::cli::PeriodArgs;
use crate::error::CliError;

use super::{analysis_result, CommandResult};

#[derive(Debug, Serialize)]
struct HistoryResponseData {
    period: LookbackPeriod,
    states: Vec<CompositeState>,
}

pub async fn run(args: &PeriodArgs, radar: &RiskRadar) -> Result<CommandResult, CliError> {
    let started = Instant::now();
    let outcome = radar
        .history(&InstrumentSet::stress_components(), args.period)
        .await
        .map(|analysis| analysis.map(|states| HistoryResponseData {
            period: args.period,
            states,
        }));
    analysis_result(outcome, started)
}
