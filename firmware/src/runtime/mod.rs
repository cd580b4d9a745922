use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use rate_control_core::capability::LocalCapabilities;
use rate_control_core::descriptor::LegacyRate;
use static_cell::StaticCell;

use crate::console::ConsoleQueue;
use crate::stations::{MacEventQueue, Stations};
use crate::usb;

mod confirm_task;
mod console_task;
mod evaluate_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Seed for the per-station exploration generators.
const STATION_SEED: u64 = 0x5EED_0F_2A7E;

/// Transmit confirmations and association changes posted by the MAC.
pub static MAC_EVENTS: MacEventQueue = MacEventQueue::new();
pub(super) static CONSOLE_RX_QUEUE: ConsoleQueue = ConsoleQueue::new();
pub(super) static CONSOLE_TX_QUEUE: ConsoleQueue = ConsoleQueue::new();
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();
static STATIONS: StaticCell<Stations> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals { USB, PA11, PA12, .. } = hal::init(config);

    let stations: &'static Stations = STATIONS.init(Stations::new(
        STATION_SEED,
        LocalCapabilities::default(),
        LegacyRate::Mbps1,
    ));
    defmt::info!("rate control: station arena ready");

    spawner
        .spawn(evaluate_task::run(stations))
        .expect("failed to spawn evaluation task");

    spawner
        .spawn(confirm_task::run(stations, MAC_EVENTS.receiver()))
        .expect("failed to spawn confirmation task");

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    spawner
        .spawn(console_task::run(stations))
        .expect("failed to spawn console task");

    core::future::pending::<()>().await;
}
