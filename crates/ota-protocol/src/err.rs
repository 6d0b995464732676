use derive_more::IsVariant;
use thiserror::Error as TError;

use crate::packet::Kind;

#[derive(Debug, TError, IsVariant)]
pub enum Error {
    /// Transport failure while reading or writing a frame
    #[error("Port error: {0}")]
    Port(#[from] ota_port::err::Error),

    #[error("Invalid start marker {0:#04x}")]
    StartMarker(u8),
    #[error("Invalid end marker {0:#04x}")]
    EndMarker(u8),
    #[error("Unknown packet kind {0}")]
    UnknownKind(u8),
    #[error("Unknown command {0}")]
    UnknownCommand(u8),
    #[error("Unknown response status {0}")]
    UnknownStatus(u8),
    #[error("Invalid {kind} payload length {len}")]
    PayloadLength { kind: Kind, len: usize },
    /// Declared payload doesn't fit in the working buffer
    #[error("Payload of {0} bytes is too large")]
    Oversized(usize),
    #[error("Frame length {actual} doesn't match the declared {expected}")]
    FrameLength { expected: usize, actual: usize },
    #[error("Output buffer too small, {0} bytes required")]
    BufferTooSmall(usize),

    /// Payload doesn't match the transmitted checksum
    #[error("Checksum mismatch: frame carries {expected:#010x}, payload gives {computed:#010x}")]
    Checksum { expected: u32, computed: u32 },
}
