use crate::stations::{MacEventReceiver, Stations};
use crate::telemetry::FirmwareInstant;

/// Drains MAC events in arrival order.
#[embassy_executor::task]
pub async fn run(stations: &'static Stations, events: MacEventReceiver<'static>) -> ! {
    loop {
        let event = events.receive().await;
        stations.handle_mac_event(event, FirmwareInstant::now());
    }
}
