use super::{CONSOLE_RX_QUEUE, CONSOLE_TX_QUEUE};
use crate::console::{self, ConsoleSession};
use crate::stations::Stations;
use crate::status;
use crate::telemetry::FirmwareInstant;

#[embassy_executor::task]
pub async fn run(stations: &'static Stations) -> ! {
    let rx = CONSOLE_RX_QUEUE.receiver();
    let tx = CONSOLE_TX_QUEUE.sender();
    let mut session = ConsoleSession::new();
    let mut attach_count = status::console_attach_count();

    loop {
        let frame = rx.receive().await;

        // A new host must not inherit the previous host's partial line.
        let current = status::console_attach_count();
        if current != attach_count {
            attach_count = current;
            session.reset();
        }

        let reply = session.feed(stations, &frame, FirmwareInstant::now());
        for chunk in console::frames(reply) {
            tx.send(chunk).await;
        }
    }
}
