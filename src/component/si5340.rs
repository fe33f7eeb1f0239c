//! SI5340 low-jitter reference clock driver.
//!
//! Fitted on selected models only; it feeds the LMX2594's reference input,
//! so when present it must be brought up before the synthesizer. Registers
//! are paged: a write to the page register selects the bank for following
//! accesses.

use tracing::debug;

use crate::comms::I2cBus;
use crate::error::Result;

use super::{ChipFamily, Component, OptionList, ALL_LANES};

const REG_PAGE: u8 = 0x01;
/// DEVICE_READY on page 0; reads 0x0F once internal init is complete.
const REG_DEVICE_READY: u8 = 0xFE;
const DEVICE_READY: u8 = 0x0F;

/// Output plan preamble: (page, register, value), applied in order.
/// Values are opaque chip configuration from the clock-tree plan.
const INIT_PREAMBLE: [(u8, u8, u8); 6] = [
    (0x0B, 0x24, 0xC0),
    (0x0B, 0x25, 0x01),
    (0x05, 0x40, 0x01),
    (0x00, 0x06, 0x00),
    (0x00, 0x17, 0xD0),
    (0x00, 0x1E, 0xB0),
];

const OUTPUT_FREQUENCIES: [&str; 3] = ["100 MHz", "125 MHz", "156.25 MHz"];

/// Driver for one SI5340.
#[derive(Debug)]
pub struct Si5340 {
    address: u8,
    device_id: u8,
}

impl Si5340 {
    pub fn new(address: u8, device_id: u8) -> Self {
        Self { address, device_id }
    }

    /// Check an address for an SI5340: the part must acknowledge and report
    /// DEVICE_READY.
    pub fn ping(bus: &mut dyn I2cBus, address: u8) -> bool {
        debug!("SI5340: searching on address 0x{address:02X}");
        debug_assert!(bus.is_open());
        if !bus.is_open() {
            return false;
        }
        match bus.ping_address(address) {
            Ok(true) => {}
            _ => return false,
        }
        matches!(bus.read8(address, REG_DEVICE_READY, 1), Ok(v) if v[0] == DEVICE_READY)
    }
}

impl Component for Si5340 {
    fn family(&self) -> ChipFamily {
        ChipFamily::Si5340
    }

    fn device_id(&self) -> u8 {
        self.device_id
    }

    fn address(&self) -> u8 {
        self.address
    }

    /// Apply the output-plan preamble, selecting register pages as needed.
    fn init(&mut self, bus: &mut dyn I2cBus) -> Result<()> {
        debug!(
            "SI5340: init for device {} on address 0x{:02X}",
            self.device_id, self.address
        );
        debug_assert!(bus.is_open());

        let mut page = None;
        for &(p, reg, value) in &INIT_PREAMBLE {
            if page != Some(p) {
                bus.write8(self.address, REG_PAGE, &[p])?;
                page = Some(p);
            }
            bus.write8(self.address, reg, &[value])?;
        }
        // Leave the part on page 0.
        if page != Some(0x00) {
            bus.write8(self.address, REG_PAGE, &[0x00])?;
        }
        Ok(())
    }

    fn options(&self) -> Vec<OptionList> {
        vec![OptionList {
            name: "listRefClockFreq".to_owned(),
            lane: ALL_LANES,
            items: OUTPUT_FREQUENCIES.iter().map(|s| s.to_string()).collect(),
            default_index: 0,
        }]
    }
}
