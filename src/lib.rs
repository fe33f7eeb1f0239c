//! Control core for a multi-chip BERT (bit-error-rate test) instrument.
//!
//! The instrument is reached over an I2C bus behind a serial adaptor. This
//! crate covers the hardware-facing layers only: the transport ([`comms`]),
//! the per-chip register drivers ([`component`]), the worker thread that owns
//! all hardware state and drives discovery/initialization/teardown
//! ([`worker`]), and the pure channel-number mapper ([`channel`]).
//!
//! UI layers talk to the instrument exclusively through the worker's
//! asynchronous command/event channels; no hardware object ever crosses the
//! thread boundary.

pub mod channel;
pub mod comms;
pub mod component;
pub mod config;
pub mod error;
pub mod logging;
pub mod worker;

pub use channel::BertChannel;
pub use comms::{I2cBus, I2CComms};
pub use config::InstrumentConfig;
pub use error::BertError;
pub use worker::{BertWorkerHandle, WorkerCommand, WorkerEvent};
