use std::time::Instant;

use riskradar_analytics::{InstrumentSet, RiskRadar};

use crate::error::CliError;

use super::{analysis_result, CommandResult};

pub async fn run(radar: &RiskRadar) -> Result<CommandResult, CliError> {
    let started = Instant::now();
    let outcome = radar.current_state(&InstrumentSet::stress_components()).await;
    analysis_result(outcome, started)
}
