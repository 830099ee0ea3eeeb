//! Bus transport the driver issues its transactions through.
//!
//! The controller only ever sees full-duplex transfers: a chain of control
//! bytes goes out on MOSI while the conversion results come back on MISO.
//! Timeouts are the bus implementation's business and surface as its error.

use crate::error::BusError;
use core::fmt::Debug;
use embedded_hal::{
    digital::OutputPin,
    spi::{SpiBus, SpiDevice},
};

/// Full-duplex transaction capability. `read` and `write` have the same length.
pub trait Transport {
    type Error: Debug;

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error>;
}

/// Raw SPI bus plus a dedicated chip-select pin
#[derive(Debug)]
pub struct SpiTransport<BUS, CS> {
    bus: BUS,
    cs: CS,
}

impl<BUS, CS> SpiTransport<BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
{
    /// Takes the bus and parks chip-select high
    pub fn new(bus: BUS, mut cs: CS) -> Result<Self, BusError<BUS::Error, CS::Error>> {
        cs.set_high().map_err(BusError::Pin)?;
        Ok(Self { bus, cs })
    }

    pub fn release(self) -> (BUS, CS) {
        (self.bus, self.cs)
    }
}

impl<BUS, CS> Transport for SpiTransport<BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
{
    type Error = BusError<BUS::Error, CS::Error>;

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.cs.set_low().map_err(BusError::Pin)?;
        let res = self
            .bus
            .transfer(read, write)
            .and_then(|_| self.bus.flush())
            .map_err(BusError::Spi);
        // Chip-select goes back high even when the transfer failed, so the
        // next transaction starts from a clean frame.
        self.cs.set_high().map_err(BusError::Pin)?;
        res
    }
}

/// An `embedded-hal` [`SpiDevice`], which manages chip-select itself
#[derive(Debug)]
pub struct DeviceTransport<D> {
    device: D,
}

impl<D: SpiDevice<u8>> DeviceTransport<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }

    pub fn release(self) -> D {
        self.device
    }
}

impl<D: SpiDevice<u8>> Transport for DeviceTransport<D> {
    type Error = D::Error;

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.device.transfer(read, write)
    }
}
