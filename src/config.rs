//! Immutable instrument configuration.
//!
//! Candidate I2C address tables and comms timing are loaded once at startup
//! and passed by value to the worker; nothing in the crate reads ambient
//! global state. Address tables list master-board addresses first, followed
//! by slave-board addresses when a second board is fitted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Build-time configuration for one instrument variant.
///
/// Discovery probes each family's candidate addresses strictly in list
/// order, so the ordering here fixes device-ID and lane-offset assignment.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InstrumentConfig {
    /// GT1724 BERT core candidate addresses (2 per board).
    pub gt1724_addresses: Vec<u8>,

    /// M24M02 EEPROM candidate addresses (base address per board; the part
    /// also answers on the three following addresses for its upper blocks).
    pub m24m02_addresses: Vec<u8>,

    /// LMX2594 clock synthesizer candidate addresses (via the on-board
    /// I2C-to-SPI bridge).
    pub lmx2594_addresses: Vec<u8>,

    /// PCA9557 I/O expander candidate addresses.
    pub pca9557_addresses: Vec<u8>,

    /// SI5340 low-jitter reference clock candidate addresses. This family is
    /// optional; fitted on selected models only.
    pub si5340_addresses: Vec<u8>,

    /// Serial baud rate for the adaptor link.
    pub baud_rate: u32,

    /// Bounded timeout for a single adaptor request/response exchange.
    pub comms_timeout: Duration,

    /// Worker status-poll period (lock detect etc.).
    pub tick_interval: Duration,
}

impl Default for InstrumentConfig {
    /// Dual GT1724 board, with slave-board addresses appended.
    fn default() -> Self {
        Self {
            gt1724_addresses: vec![0x12, 0x14, 0x16, 0x10],
            m24m02_addresses: vec![0x50, 0x54],
            lmx2594_addresses: vec![0x28, 0x2C],
            pca9557_addresses: vec![0x1C, 0x18],
            si5340_addresses: vec![0x76, 0x72],
            baud_rate: 115_200,
            comms_timeout: Duration::from_millis(500),
            tick_interval: Duration::from_millis(250),
        }
    }
}

impl InstrumentConfig {
    /// Single GT1724 "pixie" board variant.
    pub fn pixie() -> Self {
        Self {
            gt1724_addresses: vec![0x12],
            m24m02_addresses: vec![0x50],
            lmx2594_addresses: vec![0x28],
            pca9557_addresses: vec![0x1C],
            si5340_addresses: vec![0x76],
            ..Self::default()
        }
    }

    /// Bench configuration: a dual board with the master addresses repeated
    /// so a single board presents as master + fake slave.
    pub fn bench_test() -> Self {
        Self {
            gt1724_addresses: vec![0x12, 0x14, 0x12, 0x14],
            m24m02_addresses: vec![0x50, 0x50],
            lmx2594_addresses: vec![0x28, 0x28],
            pca9557_addresses: vec![0x1C, 0x1C],
            si5340_addresses: vec![0x76, 0x76],
            ..Self::default()
        }
    }
}
