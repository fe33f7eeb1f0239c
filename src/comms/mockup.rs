//! Software-defined instrument bus for hardware-out-of-the-loop testing.
//!
//! [`MockBus`] emulates the serial adaptor and a set of register-banked I2C
//! devices. It is a cloneable handle over shared state, so a test can keep
//! one clone for inspection while the worker owns another. Every operation
//! is recorded in an op log, and per-register failures can be scripted to
//! exercise partial-failure paths.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::config::InstrumentConfig;
use crate::error::{BertError, Result};

use super::I2cBus;

/// One recorded bus operation, in issue order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusOp {
    Ping { address: u8 },
    Read { address: u8, register: u8 },
    Write { address: u8, register: u8, data: Vec<u8> },
}

impl BusOp {
    /// Device address the operation touched.
    pub fn address(&self) -> u8 {
        match self {
            BusOp::Ping { address }
            | BusOp::Read { address, .. }
            | BusOp::Write { address, .. } => *address,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OpKind {
    Read,
    Write,
}

/// Scripted failure: the `nth` operation of `kind` on `register` NAKs.
#[derive(Clone, Debug)]
struct FailRule {
    kind: OpKind,
    register: u8,
    nth: usize,
    seen: usize,
}

/// Register bank emulating one I2C device.
#[derive(Clone, Debug, Default)]
pub struct MockDevice {
    regs: BTreeMap<u8, u8>,
    /// Value returned for registers never written (0xFF for EEPROM-like
    /// parts, 0x00 otherwise).
    fill: u8,
    fail_rules: Vec<FailRule>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device whose unwritten registers read back as `fill`.
    pub fn with_fill(fill: u8) -> Self {
        Self {
            fill,
            ..Self::default()
        }
    }

    /// Preload a register value.
    pub fn with_register(mut self, register: u8, value: u8) -> Self {
        self.regs.insert(register, value);
        self
    }

    /// Script the `nth` write to `register` to NAK (1-based).
    pub fn fail_write(mut self, register: u8, nth: usize) -> Self {
        self.fail_rules.push(FailRule {
            kind: OpKind::Write,
            register,
            nth,
            seen: 0,
        });
        self
    }

    /// Script the `nth` read of `register` to NAK (1-based).
    pub fn fail_read(mut self, register: u8, nth: usize) -> Self {
        self.fail_rules.push(FailRule {
            kind: OpKind::Read,
            register,
            nth,
            seen: 0,
        });
        self
    }

    /// Whether a scripted rule fires for this access.
    fn check_fail(&mut self, kind: OpKind, register: u8) -> bool {
        for rule in &mut self.fail_rules {
            if rule.kind == kind && rule.register == register {
                rule.seen += 1;
                if rule.seen == rule.nth {
                    return true;
                }
            }
        }
        false
    }
}

#[derive(Debug, Default)]
struct MockBusInner {
    open: bool,
    open_count: usize,
    devices: BTreeMap<u8, MockDevice>,
    log: Vec<BusOp>,
}

/// Cloneable handle to a software-defined instrument.
#[derive(Clone, Debug, Default)]
pub struct MockBus {
    inner: Arc<Mutex<MockBusInner>>,
}

impl MockBus {
    /// Bus with no devices attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fully populated instrument matching the config's master and slave
    /// address tables, with power-on register contents.
    pub fn standard_instrument(config: &InstrumentConfig) -> Self {
        let bus = Self::new();
        for &addr in &config.gt1724_addresses {
            // Macro version "1E0C" preloaded.
            bus.add_device(
                addr,
                MockDevice::new()
                    .with_register(0x00, 0x01)
                    .with_register(0x01, 0x45)
                    .with_register(0x02, 0x00)
                    .with_register(0x03, 0x43),
            );
        }
        for &addr in &config.m24m02_addresses {
            bus.add_device(addr, MockDevice::with_fill(0xFF));
        }
        for &addr in &config.lmx2594_addresses {
            bus.add_device(addr, MockDevice::new());
        }
        for &addr in &config.pca9557_addresses {
            // Lock-detect input (pin 3) reads high.
            bus.add_device(addr, MockDevice::new().with_register(0x00, 0x08));
        }
        for &addr in &config.si5340_addresses {
            // DEVICE_READY
            bus.add_device(addr, MockDevice::new().with_register(0xFE, 0x0F));
        }
        bus
    }

    /// Attach (or replace) a device at an address.
    pub fn add_device(&self, address: u8, device: MockDevice) {
        self.lock().devices.insert(address, device);
    }

    /// Detach a device, leaving its address unacknowledged.
    pub fn remove_device(&self, address: u8) {
        self.lock().devices.remove(&address);
    }

    /// Snapshot of every operation issued so far.
    pub fn ops(&self) -> Vec<BusOp> {
        self.lock().log.clone()
    }

    /// Forget recorded operations (e.g. between discovery and init phases).
    pub fn clear_ops(&self) {
        self.lock().log.clear();
    }

    /// Number of successful `open` calls over the bus lifetime.
    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    /// Inspect a device register without going through the bus.
    pub fn register(&self, address: u8, register: u8) -> Option<u8> {
        let inner = self.lock();
        let dev = inner.devices.get(&address)?;
        Some(dev.regs.get(&register).copied().unwrap_or(dev.fill))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockBusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl I2cBus for MockBus {
    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn open(&mut self, _port: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.open {
            return Err(BertError::Busy);
        }
        inner.open = true;
        inner.open_count += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.lock().open = false;
    }

    fn ping_address(&mut self, address: u8) -> Result<bool> {
        let mut inner = self.lock();
        if !inner.open {
            return Err(BertError::NotConnected);
        }
        inner.log.push(BusOp::Ping { address });
        Ok(inner.devices.contains_key(&address))
    }

    fn read8(&mut self, address: u8, register: u8, count: usize) -> Result<Vec<u8>> {
        let mut inner = self.lock();
        if !inner.open {
            return Err(BertError::NotConnected);
        }
        inner.log.push(BusOp::Read { address, register });
        let dev = inner.devices.get_mut(&address).ok_or(BertError::Nak {
            address,
            op: "read",
        })?;
        if dev.check_fail(OpKind::Read, register) {
            return Err(BertError::Nak {
                address,
                op: "read",
            });
        }
        let fill = dev.fill;
        Ok((0..count)
            .map(|i| {
                let reg = register.wrapping_add(i as u8);
                dev.regs.get(&reg).copied().unwrap_or(fill)
            })
            .collect())
    }

    fn write8(&mut self, address: u8, register: u8, data: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        if !inner.open {
            return Err(BertError::NotConnected);
        }
        inner.log.push(BusOp::Write {
            address,
            register,
            data: data.to_vec(),
        });
        let dev = inner.devices.get_mut(&address).ok_or(BertError::Nak {
            address,
            op: "write",
        })?;
        if dev.check_fail(OpKind::Write, register) {
            return Err(BertError::Nak {
                address,
                op: "write",
            });
        }
        for (i, &byte) in data.iter().enumerate() {
            dev.regs.insert(register.wrapping_add(i as u8), byte);
        }
        Ok(())
    }
}
