//! Byte-addressed I2C transport reached through a serial adaptor.
//!
//! All register traffic goes through the [`I2cBus`] trait so the chip
//! drivers and the worker are independent of the physical backend: the
//! serial bridge ([`I2CComms`]) in production, the software-defined
//! instrument ([`mockup::MockBus`]) on the bench.

pub mod mockup;
pub mod serial;

pub use mockup::MockBus;
pub use serial::I2CComms;

use crate::error::Result;

/// Single-master request/response access to the instrument's I2C bus.
///
/// Every operation addresses a 7-bit device address and an 8-bit register
/// address; reads and writes are byte-oriented with an explicit count.
/// Operations other than `open` fail with
/// [`NotConnected`](crate::BertError::NotConnected) while the port is closed.
pub trait I2cBus: Send {
    /// Check whether the transport is already open.
    fn is_open(&self) -> bool;

    /// Open the transport on the named serial port.
    ///
    /// Fails with [`Busy`](crate::BertError::Busy) if already open.
    fn open(&mut self, port: &str) -> Result<()>;

    /// Release the port. Idempotent.
    fn close(&mut self);

    /// Probe an address for an acknowledging device.
    ///
    /// `Ok(false)` is the normal "nothing there" result; errors are reserved
    /// for a broken or closed transport.
    fn ping_address(&mut self, address: u8) -> Result<bool>;

    /// Read `count` bytes starting at `register`.
    fn read8(&mut self, address: u8, register: u8, count: usize) -> Result<Vec<u8>>;

    /// Write bytes starting at `register`.
    fn write8(&mut self, address: u8, register: u8, data: &[u8]) -> Result<()>;
}
