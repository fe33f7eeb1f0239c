//! LMX2594 clock synthesizer driver.
//!
//! The synthesizer is reached through the board's I2C-to-SPI bridge: each
//! 16-bit register is written as two bytes at its 7-bit register address.
//! Programming follows the part's required order: registers written from
//! the highest address down to R0, then R0 rewritten with FCAL_EN set to
//! run VCO calibration.
//!
//! Clock profiles may be stored in the instrument EEPROM (discovered before
//! the synthesizer; its address is captured at construction). A missing or
//! unprogrammed profile area falls back to the built-in default profile.

use tracing::{debug, info};

use crate::comms::I2cBus;
use crate::error::Result;

use super::{ChipFamily, Component, OptionList, ALL_LANES};

const REG_R0: u8 = 0x00;
const R0_FCAL_EN: u16 = 0x0008;

/// EEPROM profile area: [magic, register count, (reg, msb, lsb)...].
const PROFILE_MAGIC: u8 = 0xA5;
const PROFILE_HEADER_OFFSET: u8 = 0x00;
const PROFILE_DATA_OFFSET: u8 = 0x02;
/// Largest register count a stored profile may claim; keeps the data read
/// within a single adaptor transfer and rejects garbage counts.
const PROFILE_MAX_REGS: u8 = 85;

/// Abridged power-on profile: 10 GHz output from the on-board reference.
/// Register values are opaque chip configuration, written high-first.
const DEFAULT_PROFILE: [(u8, u16); 8] = [
    (0x70, 0x0000),
    (0x4E, 0x0003),
    (0x4B, 0x0840),
    (0x2C, 0x1FA3),
    (0x26, 0x0404),
    (0x24, 0x0028),
    (0x0C, 0x5001),
    (REG_R0, 0x2410),
];

const PROFILE_LABELS: [&str; 4] = ["9.95328 GHz", "10.3125 GHz", "12.5 GHz", "14.025 GHz"];
const PROFILE_DEFAULT_INDEX: usize = 0;

/// Driver for one LMX2594.
#[derive(Debug)]
pub struct Lmx2594 {
    address: u8,
    device_id: u8,
    /// Block-0 base address of the instrument EEPROM holding clock
    /// profiles, when one was discovered.
    eeprom_address: Option<u8>,
}

impl Lmx2594 {
    pub fn new(address: u8, device_id: u8, eeprom_address: Option<u8>) -> Self {
        Self {
            address,
            device_id,
            eeprom_address,
        }
    }

    /// Check an address for an LMX2594 behind the SPI bridge.
    ///
    /// Read-only probe: the bridge must acknowledge and read back R0.
    pub fn ping(bus: &mut dyn I2cBus, address: u8) -> bool {
        debug!("LMX2594: searching on address 0x{address:02X}");
        debug_assert!(bus.is_open());
        if !bus.is_open() {
            return false;
        }
        match bus.ping_address(address) {
            Ok(true) => {}
            _ => return false,
        }
        bus.read8(address, REG_R0, 2).is_ok()
    }

    /// Fetch the active register profile: EEPROM if programmed, otherwise
    /// the built-in default.
    fn load_profile(&self, bus: &mut dyn I2cBus) -> Result<Vec<(u8, u16)>> {
        if let Some(eeprom) = self.eeprom_address {
            let header = bus.read8(eeprom, PROFILE_HEADER_OFFSET, 2)?;
            if header[0] == PROFILE_MAGIC && (1..=PROFILE_MAX_REGS).contains(&header[1]) {
                let n = header[1] as usize;
                let raw = bus.read8(eeprom, PROFILE_DATA_OFFSET, n * 3)?;
                let profile = raw
                    .chunks_exact(3)
                    .map(|c| (c[0], u16::from_be_bytes([c[1], c[2]])))
                    .collect();
                info!("LMX2594 {}: using EEPROM clock profile ({n} registers)", self.device_id);
                return Ok(profile);
            }
        }
        debug!("LMX2594 {}: using built-in default clock profile", self.device_id);
        Ok(DEFAULT_PROFILE.to_vec())
    }

    /// Write a register profile to the part and run VCO calibration.
    fn program(&self, bus: &mut dyn I2cBus, profile: &[(u8, u16)]) -> Result<()> {
        for &(reg, value) in profile {
            bus.write8(self.address, reg, &value.to_be_bytes())?;
        }
        // R0 again with FCAL_EN to start calibration.
        let r0 = profile
            .iter()
            .find(|(reg, _)| *reg == REG_R0)
            .map(|(_, v)| *v)
            .unwrap_or(0);
        bus.write8(self.address, REG_R0, &(r0 | R0_FCAL_EN).to_be_bytes())
    }
}

impl Component for Lmx2594 {
    fn family(&self) -> ChipFamily {
        ChipFamily::Lmx2594
    }

    fn device_id(&self) -> u8 {
        self.device_id
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn init(&mut self, bus: &mut dyn I2cBus) -> Result<()> {
        debug!(
            "LMX2594: init for device {} on address 0x{:02X}",
            self.device_id, self.address
        );
        debug_assert!(bus.is_open());
        let profile = self.load_profile(bus)?;
        self.program(bus, &profile)
    }

    fn options(&self) -> Vec<OptionList> {
        vec![OptionList {
            name: "listLMXFreq".to_owned(),
            lane: ALL_LANES,
            items: PROFILE_LABELS.iter().map(|s| s.to_string()).collect(),
            default_index: PROFILE_DEFAULT_INDEX,
        }]
    }
}
