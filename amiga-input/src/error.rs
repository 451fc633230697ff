//! Error types for the input bridge.

use thiserror::Error;

use crate::bus::Width;
use crate::Device;

/// Failure of a primitive register operation on the remote channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("{width} read at 0x{address:06X} failed: {reason}")]
    Read {
        address: u32,
        width: Width,
        reason: String,
    },

    #[error("{width} write of 0x{value:04X} at 0x{address:06X} failed: {reason}")]
    Write {
        address: u32,
        width: Width,
        value: u16,
        reason: String,
    },

    #[error("register channel unavailable: {0}")]
    Connect(String),
}

/// Failure to hand an event to the host sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("event sink closed")]
    Closed,

    #[error("event sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("input poller is already running")]
    AlreadyRunning,

    #[error("no input device could be initialized")]
    NoDevices,

    #[error("input session was lost to an earlier worker failure")]
    SessionLost,

    #[error("register bus error: {0}")]
    Bus(#[from] BusError),

    #[error("{device} initialization failed: {source}")]
    DeviceInit {
        device: Device,
        #[source]
        source: BusError,
    },

    #[error("failed to spawn poller thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("poller thread panicked")]
    WorkerPanicked,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type InputResult<T> = Result<T, InputError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_errors_name_the_register() {
        let err = BusError::Read {
            address: 0xBFE101,
            width: Width::Byte,
            reason: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "8-bit read at 0xBFE101 failed: timeout");

        let err = BusError::Write {
            address: 0xBFE001,
            width: Width::Word,
            value: 0xFFFE,
            reason: "nak".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "16-bit write of 0xFFFE at 0xBFE001 failed: nak"
        );
    }

    #[test]
    fn device_init_error_mentions_device() {
        let err = InputError::DeviceInit {
            device: Device::Mouse,
            source: BusError::Connect("down".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "mouse initialization failed: register channel unavailable: down"
        );
    }
}
