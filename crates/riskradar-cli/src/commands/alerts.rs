use std::time::Instant;

use riskradar_analytics::{Alert, InstrumentSet, RiskRadar};
use riskradar_core::LookbackPeriod;
use serde::Serialize;

use crate::cli::PeriodArgs;
use crate::error::CliError;

use super::{analysis_result, CommandResult};

#[derive(Debug, Serialize)]
struct AlertsResponseData {
    period: LookbackPeriod,
    count: usize,
    alerts: Vec<Alert>,
}

pub async fn run(args: &PeriodArgs, radar: &RiskRadar) -> Result<CommandResult, CliError> {
    let started = Instant::now();
    let outcome = radar
        .alerts(&InstrumentSet::stress_components(), args.period)
        .await
        .map(|analysis| analysis.map(|alerts| AlertsResponseData {
            period: args.period,
            count: alerts.len(),
            alerts,
        }));
    analysis_result(outcome, started)
}
