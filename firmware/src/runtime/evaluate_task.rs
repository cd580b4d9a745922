use embassy_time::{Duration, Ticker};

use crate::stations::Stations;
use crate::telemetry::FirmwareInstant;

/// Evaluation runs ten times per statistics period so retry-step and trial
/// transitions are picked up between periods.
const EVALUATION_TICK: Duration = Duration::from_millis(10);

#[embassy_executor::task]
pub async fn run(stations: &'static Stations) -> ! {
    let mut ticker = Ticker::every(EVALUATION_TICK);
    loop {
        ticker.next().await;
        stations.evaluate_all(FirmwareInstant::now());
    }
}
