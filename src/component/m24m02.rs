//! M24M02 EEPROM driver.
//!
//! The M24M02 is a 2-Mbit EEPROM that folds the upper two bits of its
//! memory address into the I2C device address, so one part answers on four
//! consecutive addresses (one per 64-KiB block). The configured candidate
//! address is the block-0 base address. Clock profiles for the LMX2594 are
//! stored here; write protection is controlled externally via the I/O
//! expander's write-control pin.

use tracing::debug;

use crate::comms::I2cBus;
use crate::error::Result;

use super::{ChipFamily, Component, OptionList};

/// Memory blocks, each on its own I2C address.
pub const BLOCK_COUNT: u8 = 4;

/// Driver for one M24M02, identified by its block-0 base address.
#[derive(Debug)]
pub struct M24m02 {
    address: u8,
    device_id: u8,
}

impl M24m02 {
    pub fn new(address: u8, device_id: u8) -> Self {
        Self { address, device_id }
    }

    /// Check an address for an M24M02.
    ///
    /// Read-only probe: an acknowledged byte read from block 0. Never
    /// writes, since a test-pattern write would clobber stored data.
    pub fn ping(bus: &mut dyn I2cBus, address: u8) -> bool {
        debug!("M24M02: searching on address 0x{address:02X}");
        debug_assert!(bus.is_open());
        if !bus.is_open() {
            return false;
        }
        match bus.ping_address(address) {
            Ok(true) => {}
            _ => return false,
        }
        bus.read8(address, 0x00, 1).is_ok()
    }

    /// Read bytes from a memory block.
    pub fn read(&self, bus: &mut dyn I2cBus, block: u8, offset: u8, count: usize) -> Result<Vec<u8>> {
        debug_assert!(block < BLOCK_COUNT);
        bus.read8(self.address + block, offset, count)
    }

    /// Write bytes to a memory block.
    ///
    /// Succeeds only while the I/O expander's write-control pin has writes
    /// enabled; otherwise the part NAKs the transfer.
    pub fn write(&self, bus: &mut dyn I2cBus, block: u8, offset: u8, data: &[u8]) -> Result<()> {
        debug_assert!(block < BLOCK_COUNT);
        bus.write8(self.address + block, offset, data)
    }
}

impl Component for M24m02 {
    fn family(&self) -> ChipFamily {
        ChipFamily::M24m02
    }

    fn device_id(&self) -> u8 {
        self.device_id
    }

    fn address(&self) -> u8 {
        self.address
    }

    /// Confirm the part is readable. An erased device (all 0xFF) is a valid
    /// state; content validation belongs to whoever stored the data.
    fn init(&mut self, bus: &mut dyn I2cBus) -> Result<()> {
        debug!(
            "M24M02: init for device {} on address 0x{:02X}",
            self.device_id, self.address
        );
        debug_assert!(bus.is_open());
        let _ = bus.read8(self.address, 0x00, 1)?;
        Ok(())
    }

    /// The EEPROM contributes no user-selectable options.
    fn options(&self) -> Vec<OptionList> {
        Vec::new()
    }
}
