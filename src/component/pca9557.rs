//! PCA9557 I/O expander driver.
//!
//! The expander carries the instrument's miscellaneous GPIO: trigger-divide
//! ratio select, EEPROM write control, and the clock synthesizer's VCO
//! lock-detect input. Output state is cached in the driver so masked updates
//! compose without a hardware read; inputs are always read from hardware
//! since they may be externally driven.

use tracing::{debug, warn};

use crate::comms::I2cBus;
use crate::error::{BertError, Result};

use super::{ChipFamily, Component, OptionList, ALL_LANES};

const REG_INPUT: u8 = 0x00;
const REG_OUTPUT: u8 = 0x01;
const REG_POLARITY: u8 = 0x02;
const REG_CONFIG: u8 = 0x03;

/// Mask with bits 6 and 7 set: trigger divide ratio select pins.
pub const TRIGGER_DIVIDE_MASK: u8 = 0xC0;
const TRIGGER_DIVIDE_LOOKUP: [u8; 3] = [0xC0, 0x80, 0x40];
const TRIGGER_DIVIDE_LABELS: [&str; 3] = ["1/2", "1/4", "1/8"];
pub const TRIGGER_DIVIDE_DEFAULT_INDEX: usize = 0;

/// Mask with bit 2 set: EEPROM write-control pin.
pub const EEPROM_WC_MASK: u8 = 0x04;
const EEPROM_WRITE_ENABLE: u8 = 0x00; // Bit CLEAR = write enable
const EEPROM_WRITE_DISABLE: u8 = 0x04; // Bit SET = write disable

/// Lock-detect input bit (pin 3, wired to the LMX clock's MISO/LCKD line).
const LOCK_DETECT_BIT: u8 = 3;

/// Direction assignment for one expander pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PinDirection {
    Output,
    NormalInput,
    InvertedInput,
}

use PinDirection::*;

/// Pin directions required by the board wiring, pins 0 through 7.
const PIN_DIRECTIONS: [PinDirection; 8] = [
    NormalInput, // IO0: !CRST_A  GT1724 A reset, pulled high externally; unused
    NormalInput, // IO1: !CRST_B  GT1724 B reset, pulled high externally; unused
    Output,      // IO2: !WC      EEPROM write control; drive high to disable writes
    NormalInput, // IO3: MISO/LCKD  LMX clock VCO lock input
    NormalInput, // IO4: LOS_A    GT1724 A loss-of-signal indicator
    NormalInput, // IO5: LOS_B    GT1724 B loss-of-signal indicator
    Output,      // IO6: DIV_F_A  clock divider select A
    Output,      // IO7: DIV_F_B  clock divider select B
];

/// Driver for one PCA9557, identified by I2C address and family device ID.
#[derive(Debug)]
pub struct Pca9557 {
    address: u8,
    device_id: u8,
    reg_output: u8,
    reg_config: u8,
    reg_polarity: u8,
    /// Masked updates compose against the cached output register, which is
    /// only meaningful once `init` has seeded it.
    initialized: bool,
}

impl Pca9557 {
    pub fn new(address: u8, device_id: u8) -> Self {
        Self {
            address,
            device_id,
            reg_output: 0,
            reg_config: 0,
            reg_polarity: 0,
            initialized: false,
        }
    }

    /// Check an address for a PCA9557.
    ///
    /// Writes a test pattern to the polarity inversion register, reads it
    /// back, and restores the original value regardless of outcome. A probe
    /// that fails at any step reports `false` and never claims a device is
    /// present; a restore failure also reports `false` since the device did
    /// not behave as expected.
    ///
    /// Note: if some other part sits on this address, the test write may
    /// disturb it or produce a response that looks like a PCA9557.
    pub fn ping(bus: &mut dyn I2cBus, address: u8) -> bool {
        debug!("PCA9557: searching on address 0x{address:02X}");
        debug_assert!(bus.is_open());
        if !bus.is_open() {
            return false;
        }

        match bus.ping_address(address) {
            Ok(true) => {}
            _ => return false,
        }

        let original = match bus.read8(address, REG_POLARITY, 1) {
            Ok(v) => v[0],
            Err(_) => return false,
        };
        if bus.write8(address, REG_POLARITY, &[0x55]).is_err() {
            return false;
        }
        let readback = bus.read8(address, REG_POLARITY, 1);

        // Restore the original value no matter how the probe went.
        let restored = bus.write8(address, REG_POLARITY, &[original]).is_ok();

        match readback {
            Ok(v) => restored && v[0] == 0x55,
            Err(_) => false,
        }
    }

    /// Current trigger-divide ratio choices.
    fn trigger_divide_options() -> OptionList {
        OptionList {
            name: "listLMXTrigOutDivRatio".to_owned(),
            lane: ALL_LANES,
            items: TRIGGER_DIVIDE_LABELS.iter().map(|s| s.to_string()).collect(),
            default_index: TRIGGER_DIVIDE_DEFAULT_INDEX,
        }
    }

    /// Select a trigger-divide ratio by option index.
    pub fn select_trigger_divide(&mut self, bus: &mut dyn I2cBus, index: usize) -> Result<()> {
        debug!(
            "PCA9557 {}: select trigger divide index {index}",
            self.device_id
        );
        let Some(&value) = TRIGGER_DIVIDE_LOOKUP.get(index) else {
            warn!("PCA9557: trigger divide index {index} out of range; ignored");
            return Ok(());
        };
        self.update_pins(bus, TRIGGER_DIVIDE_MASK, value)
    }

    /// Enable or disable EEPROM writes via the write-control pin.
    pub fn set_eeprom_write_enable(&mut self, bus: &mut dyn I2cBus, enable: bool) -> Result<()> {
        let value = if enable {
            EEPROM_WRITE_ENABLE
        } else {
            EEPROM_WRITE_DISABLE
        };
        self.update_pins(bus, EEPROM_WC_MASK, value)
    }

    /// Sample the LMX lock-detect input (pin 3).
    ///
    /// Designed for background polling; a transport failure propagates so
    /// the caller can decide whether to keep polling.
    pub fn read_lock_detect(&mut self, bus: &mut dyn I2cBus) -> Result<bool> {
        let pins = self.get_pins(bus)?;
        Ok((pins >> LOCK_DETECT_BIT) & 0x01 != 0)
    }

    /// Update output pins under a mask, preserving every other pin.
    ///
    /// Computes `(cached_output & !mask) | value` and writes the full output
    /// register; the hardware never sees a partial pin write. Fails with
    /// [`BertError::NotInitialized`] until `init` has seeded the cache.
    pub fn update_pins(&mut self, bus: &mut dyn I2cBus, mask: u8, value: u8) -> Result<()> {
        if !self.initialized {
            return Err(BertError::NotInitialized);
        }
        let updated = (self.reg_output & !mask) | value;
        self.set_pins(bus, updated)
    }

    /// Read all pins from the input register (a real hardware read; inputs
    /// may be externally driven).
    pub fn get_pins(&mut self, bus: &mut dyn I2cBus) -> Result<u8> {
        let v = bus.read8(self.address, REG_INPUT, 1)?;
        Ok(v[0])
    }

    /// Set all output pins and refresh the cache.
    fn set_pins(&mut self, bus: &mut dyn I2cBus, value: u8) -> Result<()> {
        self.reg_output = value;
        bus.write8(self.address, REG_OUTPUT, &[self.reg_output])
    }

    /// Write direction and polarity registers from the wiring table.
    fn configure_pins(&mut self, bus: &mut dyn I2cBus, directions: [PinDirection; 8]) -> Result<()> {
        // Configuration register: 0 = output, 1 = input.
        self.reg_config = 0;
        // Polarity register: 1 = inverted input.
        self.reg_polarity = 0;
        for (pin, dir) in directions.iter().enumerate() {
            if *dir != Output {
                self.reg_config |= 1 << pin;
            }
            if *dir == InvertedInput {
                self.reg_polarity |= 1 << pin;
            }
        }

        bus.write8(self.address, REG_CONFIG, &[self.reg_config])?;
        bus.write8(self.address, REG_POLARITY, &[self.reg_polarity])?;
        Ok(())
    }
}

impl Component for Pca9557 {
    fn family(&self) -> ChipFamily {
        ChipFamily::Pca9557
    }

    fn device_id(&self) -> u8 {
        self.device_id
    }

    fn address(&self) -> u8 {
        self.address
    }

    /// Configure pin directions per the board wiring and drive safe output
    /// defaults: the default trigger-divide ratio with EEPROM writes
    /// disabled.
    fn init(&mut self, bus: &mut dyn I2cBus) -> Result<()> {
        debug!(
            "PCA9557: init for device {} on address 0x{:02X}",
            self.device_id, self.address
        );
        debug_assert!(bus.is_open());

        self.configure_pins(bus, PIN_DIRECTIONS)?;
        self.set_pins(
            bus,
            TRIGGER_DIVIDE_LOOKUP[TRIGGER_DIVIDE_DEFAULT_INDEX] | EEPROM_WRITE_DISABLE,
        )?;
        self.initialized = true;
        Ok(())
    }

    fn options(&self) -> Vec<OptionList> {
        vec![Self::trigger_divide_options()]
    }
}
