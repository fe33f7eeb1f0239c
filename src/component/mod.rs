//! Chip-family register drivers.
//!
//! One module per chip family. Each driver is plain data (address, family
//! device ID, register caches) plus operations that borrow the bus for the
//! duration of a transaction; the worker owns both the drivers and the bus.
//! The shared lifecycle surface is the [`Component`] trait; discovery pings
//! are associated functions on each driver type since no instance exists yet
//! when a probe runs.

pub mod gt1724;
pub mod lmx2594;
pub mod m24m02;
pub mod pca9557;
pub mod si5340;

pub use gt1724::Gt1724;
pub use lmx2594::Lmx2594;
pub use m24m02::M24m02;
pub use pca9557::Pca9557;
pub use si5340::Si5340;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::comms::I2cBus;
use crate::error::Result;

/// Option lists that apply to the whole instrument rather than one lane.
pub const ALL_LANES: i32 = -1;

/// The chip families making up the instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChipFamily {
    /// BERT core IC: pattern generator / error detector lanes.
    Gt1724,
    /// 2-Mbit data EEPROM.
    M24m02,
    /// Wideband clock synthesizer.
    Lmx2594,
    /// I/O expander: trigger divide, EEPROM write control, lock detect.
    Pca9557,
    /// Low-jitter reference clock (selected models only).
    Si5340,
}

impl ChipFamily {
    /// Whether total absence of this family makes the instrument
    /// non-functional and aborts connect.
    pub fn is_mandatory(self) -> bool {
        !matches!(self, ChipFamily::Si5340)
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChipFamily::Gt1724 => "GT1724 BERT core",
            ChipFamily::M24m02 => "M24M02 EEPROM",
            ChipFamily::Lmx2594 => "LMX2594 clock synthesizer",
            ChipFamily::Pca9557 => "PCA9557 I/O expander",
            ChipFamily::Si5340 => "SI5340 reference clock",
        };
        f.write_str(name)
    }
}

/// Plain-data description of a discovered device.
///
/// This is what crosses the worker's event channel; it never carries a
/// live hardware handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub family: ChipFamily,
    /// Dense 0-based ID within the family, assigned in probe order.
    pub device_id: u8,
    /// 7-bit I2C address the device answered on.
    pub address: u8,
    /// First of the 4 signal lanes this chip controls (BERT cores only).
    pub lane_offset: Option<u8>,
}

/// A user-selectable option list contributed by a chip.
///
/// Purely descriptive; emitting options has no hardware side effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionList {
    /// Control surface this list populates, e.g. `"listLMXTrigOutDivRatio"`.
    pub name: String,
    /// Lane the list applies to, or [`ALL_LANES`].
    pub lane: i32,
    pub items: Vec<String>,
    pub default_index: usize,
}

/// Lifecycle capability shared by every chip driver.
pub trait Component {
    fn family(&self) -> ChipFamily;

    fn device_id(&self) -> u8;

    fn address(&self) -> u8;

    /// Apply the chip's safe default configuration.
    ///
    /// Transport failures abort and propagate; register writes already
    /// issued are not rolled back.
    fn init(&mut self, bus: &mut dyn I2cBus) -> Result<()>;

    /// Option lists this chip contributes to the UI.
    fn options(&self) -> Vec<OptionList>;

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            family: self.family(),
            device_id: self.device_id(),
            address: self.address(),
            lane_offset: None,
        }
    }
}
