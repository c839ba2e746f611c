#![no_std]
#![no_main]

mod apps;
mod drivers;
mod peripherals;
mod session;

use apps::BlockApp;
use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::gpio::Output;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Timer;
use startblock_core::identity::BlockId;
use startblock_core::trace::{TraceBuffer, TRACE_CAPACITY};
use static_cell::{ConstStaticCell, StaticCell};
use {defmt_rtt as _, panic_probe as _};

use drivers::imu::{self, Icm42688};
use peripherals::{init_system, BlockIo, BusUart, DipSwitch, ImuSpi};

/// Trace region for one run; lives in DMA-reachable AXI SRAM so the
/// FIFO burst reads land in it directly.
static TRACE_REGION: ConstStaticCell<[u8; TRACE_CAPACITY]> =
    ConstStaticCell::new([0; TRACE_CAPACITY]);

/// The IMU is shared between the capture path and the gun watch task.
static IMU: StaticCell<Mutex<NoopRawMutex, Icm42688<'static>>> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting block firmware");

    let p = init_system();

    let mut io = BlockIo::new(claim_block_io!(p));
    io.status_led.set_high();

    // Read the identity straps once; an illegal strap value means the
    // block never comes up and the host sees no PING reply.
    let dip = DipSwitch::new(claim_dip!(p));
    let block_id = match BlockId::from_nibble(dip.read_nibble()) {
        Ok(id) => id,
        Err(e) => {
            error!("Illegal block id straps: {}", e.0);
            fault(io.status_led).await;
        }
    };
    info!("Block identity {}", block_id.get());

    let spi = ImuSpi::new(claim_imu_spi!(p));
    let imu = IMU.init(Mutex::new(Icm42688::new(spi)));
    if let Err(e) = imu.lock().await.probe().await {
        error!("IMU probe failed: {:?}", e);
        fault(io.status_led).await;
    }

    spawner.spawn(imu::threshold_task(claim_imu!(p))).unwrap();
    spawner.spawn(apps::gun_watch::task(imu, claim_gun!(p))).unwrap();

    let bus = BusUart::new(claim_bus_uart!(p));
    let trace = TraceBuffer::new(TRACE_REGION.take());

    let mut app = BlockApp::new(block_id, imu, bus, trace, io);
    app.run().await
}

/// Park with a fast status blink so the fault is visible trackside.
async fn fault(mut led: Output<'static>) -> ! {
    loop {
        led.toggle();
        Timer::after_millis(100).await;
    }
}
