//! GT1724 BERT core driver.
//!
//! Each GT1724 provides four signal lanes of pattern generation and error
//! detection plus one core-temperature sensor. Chips are assigned a lane
//! offset at discovery (0, 4, 8, ...) which maps chip-local lanes onto the
//! instrument-wide lane numbering.
//!
//! Runtime behavior on the chip is implemented by a downloadable macro; the
//! version table below identifies the macro builds this software knows.

use tracing::{debug, info, warn};

use crate::comms::I2cBus;
use crate::error::Result;

use super::{ChipFamily, Component, DeviceInfo, OptionList};

/// Four bytes of macro version, readable once a macro is resident.
const REG_MACRO_VERSION: u8 = 0x00;
/// Core temperature in degrees C, two's complement.
const REG_CORE_TEMP: u8 = 0x08;
/// Per-lane control blocks: 4 registers per lane starting here.
const REG_LANE_BASE: u8 = 0x10;
const LANE_STRIDE: u8 = 0x04;
/// Lane control register offsets within a lane block.
const LANE_PG_CTRL: u8 = 0x00;
const LANE_PG_PATTERN: u8 = 0x01;
const LANE_PG_AMPLITUDE: u8 = 0x02;
const LANE_ED_CTRL: u8 = 0x03;

const PG_ENABLE_BIT: u8 = 0x01;
const PG_INVERT_BIT: u8 = 0x02;

pub const LANES_PER_CHIP: u8 = 4;

const PG_PATTERNS: [&str; 5] = ["PRBS7", "PRBS9", "PRBS15", "PRBS23", "PRBS31"];
const PG_AMPLITUDES: [&str; 6] = [
    "100 mV", "200 mV", "300 mV", "400 mV", "600 mV", "800 mV",
];
const ED_EQ_BOOST: [&str; 4] = ["Off", "Low", "Mid", "High"];

/// Known macro builds for the GT1724.
#[derive(Debug, PartialEq, Eq)]
pub struct MacroFileInfo {
    /// Version bytes as read back from the chip.
    pub version: [u8; 4],
    /// Human-readable version, e.g. `"1E0C"`.
    pub version_string: &'static str,
}

const MACRO_FILES: [MacroFileInfo; 2] = [
    MacroFileInfo {
        version: [0x01, 0x45, 0x00, 0x43],
        version_string: "1E0C",
    },
    MacroFileInfo {
        version: [0x01, 0x45, 0x01, 0x43],
        version_string: "1E1C",
    },
];

/// Driver for one GT1724 BERT core.
#[derive(Debug)]
pub struct Gt1724 {
    address: u8,
    device_id: u8,
    lane_offset: u8,
    /// Cached per-lane PG control bytes for masked updates.
    lane_pg_ctrl: [u8; LANES_PER_CHIP as usize],
}

impl Gt1724 {
    pub fn new(address: u8, device_id: u8, lane_offset: u8) -> Self {
        Self {
            address,
            device_id,
            lane_offset,
            lane_pg_ctrl: [0; LANES_PER_CHIP as usize],
        }
    }

    /// First instrument-wide lane this chip controls.
    pub fn lane_offset(&self) -> u8 {
        self.lane_offset
    }

    /// Check an address for a GT1724.
    ///
    /// Read-only probe: the chip must acknowledge and serve its macro
    /// version registers.
    pub fn ping(bus: &mut dyn I2cBus, address: u8) -> bool {
        debug!("GT1724: searching on address 0x{address:02X}");
        debug_assert!(bus.is_open());
        if !bus.is_open() {
            return false;
        }
        match bus.ping_address(address) {
            Ok(true) => {}
            _ => return false,
        }
        bus.read8(address, REG_MACRO_VERSION, 4).is_ok()
    }

    /// Identify the resident macro build, if it is one we know.
    fn macro_version(&self, bus: &mut dyn I2cBus) -> Result<Option<&'static MacroFileInfo>> {
        let version = bus.read8(self.address, REG_MACRO_VERSION, 4)?;
        Ok(MACRO_FILES.iter().find(|m| m.version[..] == version[..]))
    }

    fn lane_reg(lane: u8, offset: u8) -> u8 {
        REG_LANE_BASE + lane * LANE_STRIDE + offset
    }

    /// Enable or disable a pattern generator lane (chip-local lane 0-3).
    pub fn set_pg_enabled(&mut self, bus: &mut dyn I2cBus, lane: u8, enabled: bool) -> Result<()> {
        self.update_pg_ctrl(bus, lane, PG_ENABLE_BIT, if enabled { PG_ENABLE_BIT } else { 0 })
    }

    /// Set output inversion on a pattern generator lane.
    pub fn set_pg_inverted(&mut self, bus: &mut dyn I2cBus, lane: u8, inverted: bool) -> Result<()> {
        self.update_pg_ctrl(bus, lane, PG_INVERT_BIT, if inverted { PG_INVERT_BIT } else { 0 })
    }

    /// Masked update of a lane's PG control register from the cache.
    fn update_pg_ctrl(&mut self, bus: &mut dyn I2cBus, lane: u8, mask: u8, value: u8) -> Result<()> {
        debug_assert!(lane < LANES_PER_CHIP);
        let cached = &mut self.lane_pg_ctrl[lane as usize];
        *cached = (*cached & !mask) | value;
        bus.write8(self.address, Self::lane_reg(lane, LANE_PG_CTRL), &[*cached])
    }

    /// Read the core temperature sensor in degrees C.
    pub fn read_core_temperature(&self, bus: &mut dyn I2cBus) -> Result<i8> {
        let v = bus.read8(self.address, REG_CORE_TEMP, 1)?;
        Ok(v[0] as i8)
    }
}

impl Component for Gt1724 {
    fn family(&self) -> ChipFamily {
        ChipFamily::Gt1724
    }

    fn device_id(&self) -> u8 {
        self.device_id
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            family: self.family(),
            device_id: self.device_id,
            address: self.address,
            lane_offset: Some(self.lane_offset),
        }
    }

    /// Verify the resident macro and drive every lane to safe defaults:
    /// pattern generators off and non-inverted, first pattern and lowest
    /// amplitude selected, error detectors disabled.
    fn init(&mut self, bus: &mut dyn I2cBus) -> Result<()> {
        debug!(
            "GT1724: init for device {} on address 0x{:02X}, lane offset {}",
            self.device_id, self.address, self.lane_offset
        );
        debug_assert!(bus.is_open());

        match self.macro_version(bus)? {
            Some(m) => info!("GT1724 {}: macro version {}", self.device_id, m.version_string),
            None => warn!(
                "GT1724 {}: unrecognized macro version; continuing with defaults",
                self.device_id
            ),
        }

        for lane in 0..LANES_PER_CHIP {
            self.lane_pg_ctrl[lane as usize] = 0;
            bus.write8(self.address, Self::lane_reg(lane, LANE_PG_CTRL), &[0x00])?;
            bus.write8(self.address, Self::lane_reg(lane, LANE_PG_PATTERN), &[0x00])?;
            bus.write8(self.address, Self::lane_reg(lane, LANE_PG_AMPLITUDE), &[0x00])?;
            bus.write8(self.address, Self::lane_reg(lane, LANE_ED_CTRL), &[0x00])?;
        }
        Ok(())
    }

    fn options(&self) -> Vec<OptionList> {
        let lane = self.lane_offset as i32;
        vec![
            OptionList {
                name: "listPGPattern".to_owned(),
                lane,
                items: PG_PATTERNS.iter().map(|s| s.to_string()).collect(),
                default_index: 0,
            },
            OptionList {
                name: "listPGAmplitude".to_owned(),
                lane,
                items: PG_AMPLITUDES.iter().map(|s| s.to_string()).collect(),
                default_index: 0,
            },
            OptionList {
                name: "listEDEQBoost".to_owned(),
                lane,
                items: ED_EQ_BOOST.iter().map(|s| s.to_string()).collect(),
                default_index: 0,
            },
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comms::mockup::{MockBus, MockDevice};

    const ADDR: u8 = 0x12;

    fn chip_with_macro() -> MockDevice {
        MockDevice::new()
            .with_register(0x00, 0x01)
            .with_register(0x01, 0x45)
            .with_register(0x02, 0x00)
            .with_register(0x03, 0x43)
    }

    #[test]
    fn test_ping_requires_readable_version_registers() {
        let mut bus = MockBus::new();
        bus.add_device(ADDR, chip_with_macro());
        bus.open("mock").unwrap();

        assert!(Gt1724::ping(&mut bus, ADDR));
        assert!(!Gt1724::ping(&mut bus, 0x14));
    }

    #[test]
    fn test_init_clears_all_lane_controls() {
        let mut bus = MockBus::new();
        bus.add_device(ADDR, chip_with_macro());
        bus.open("mock").unwrap();

        let mut gt = Gt1724::new(ADDR, 0, 0);
        gt.init(&mut bus).unwrap();

        for lane in 0..LANES_PER_CHIP {
            for offset in 0..LANE_STRIDE {
                let reg = REG_LANE_BASE + lane * LANE_STRIDE + offset;
                assert_eq!(bus.register(ADDR, reg), Some(0x00));
            }
        }
    }

    #[test]
    fn test_pg_control_updates_compose_through_cache() {
        let mut bus = MockBus::new();
        bus.add_device(ADDR, chip_with_macro());
        bus.open("mock").unwrap();

        let mut gt = Gt1724::new(ADDR, 0, 4);
        gt.init(&mut bus).unwrap();

        gt.set_pg_enabled(&mut bus, 1, true).unwrap();
        gt.set_pg_inverted(&mut bus, 1, true).unwrap();
        assert_eq!(bus.register(ADDR, 0x14), Some(PG_ENABLE_BIT | PG_INVERT_BIT));

        gt.set_pg_enabled(&mut bus, 1, false).unwrap();
        assert_eq!(bus.register(ADDR, 0x14), Some(PG_INVERT_BIT));
    }

    #[test]
    fn test_core_temperature_is_twos_complement() {
        let mut bus = MockBus::new();
        bus.add_device(ADDR, chip_with_macro().with_register(REG_CORE_TEMP, 0xF6));
        bus.open("mock").unwrap();

        let gt = Gt1724::new(ADDR, 0, 0);
        assert_eq!(gt.read_core_temperature(&mut bus).unwrap(), -10);
    }

    #[test]
    fn test_options_are_scoped_to_lane_offset() {
        let gt = Gt1724::new(ADDR, 1, 4);
        assert_eq!(gt.lane_offset(), 4);

        let options = gt.options();
        assert!(options.iter().all(|o| o.lane == gt.lane_offset() as i32));
        assert!(options.iter().any(|o| o.name == "listPGPattern"));
    }
}
