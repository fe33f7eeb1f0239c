//! Error taxonomy for transport, driver, and orchestrator operations.

use crate::component::ChipFamily;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BertError>;

/// Errors surfaced by the transport, the chip drivers, and the worker.
///
/// Driver operations report the specific kind to their caller; the worker
/// decides which kinds are fatal for a connect attempt (see
/// [`crate::worker`]). Nothing in this layer retries automatically.
#[derive(Debug, thiserror::Error)]
pub enum BertError {
    /// Operation attempted without an open transport.
    #[error("no connection to the instrument")]
    NotConnected,

    /// The transport was asked to open while already open.
    #[error("comms busy: port is already open")]
    Busy,

    /// Initialization has not been carried out, or it failed.
    #[error("instrument components have not been initialized")]
    NotInitialized,

    /// Bounded I/O timeout elapsed waiting on the serial adaptor.
    #[error("timed out waiting for the serial adaptor")]
    Timeout,

    /// The serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Read/write on the underlying port failed.
    #[error("serial I/O error: {0}")]
    Io(std::io::Error),

    /// The adaptor answered with an unexpected status byte.
    #[error("adaptor protocol error (status 0x{0:02X})")]
    Adaptor(u8),

    /// A device acknowledged discovery but NAK'd a register operation.
    #[error("device 0x{address:02X} rejected a register {op}")]
    Nak { address: u8, op: &'static str },

    /// A mandatory chip family answered on none of its candidate addresses.
    #[error("{0} not detected")]
    Missing(ChipFamily),
}

impl From<std::io::Error> for BertError {
    fn from(e: std::io::Error) -> Self {
        // The adaptor's bounded I/O timeout is its own error kind; everything
        // else stays a plain I/O error.
        if e.kind() == std::io::ErrorKind::TimedOut {
            BertError::Timeout
        } else {
            BertError::Io(e)
        }
    }
}
