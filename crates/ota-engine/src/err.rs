use derive_more::IsVariant;
use ota_port::err::FlashError;
use ota_protocol::Kind;
use thiserror::Error as TError;

use crate::update::State;

#[derive(Debug, TError, IsVariant)]
pub enum Error {
    /// Transport, framing or packet checksum failure
    #[error("Protocol error: {0}")]
    Protocol(#[from] ota_protocol::err::Error),

    /// Unlock, erase, program or lock failure
    #[error("Flash error: {0}")]
    Flash(#[from] FlashError),

    #[error("Config record encode error: {0}")]
    RecordEncode(bincode::error::EncodeError),
    /// Erased or torn config record
    #[error("Config record decode error: {0}")]
    RecordDecode(bincode::error::DecodeError),
    #[error("Config record read back differs from what was written")]
    RecordReadback,

    #[error("Update aborted by the peer")]
    Aborted,
    #[error("Unexpected {kind} packet in {state} state")]
    UnexpectedPacket { state: State, kind: Kind },
    #[error("No firmware slot is available")]
    NoSlotAvailable,
    #[error("Slot {0} doesn't exist")]
    InvalidSlot(usize),
    #[error("Invalid header: image size is zero")]
    EmptyImage,
    #[error("Image of {size} bytes doesn't fit in a {capacity} bytes slot")]
    ImageTooLarge { size: usize, capacity: u32 },
    #[error("Chunk of {0} bytes would leave the write offset unaligned")]
    UnalignedChunk(usize),

    /// Written image doesn't match the checksum it was announced with
    #[error("Image checksum mismatch: expected {expected:#010x}, got {computed:#010x}")]
    ImageMismatch { expected: u32, computed: u32 },
    /// The running image no longer matches its recorded checksum
    #[error("Active slot {slot} is corrupted: expected {expected:#010x}, got {computed:#010x}")]
    ActiveImageCorrupted {
        slot: usize,
        expected: u32,
        computed: u32,
    },
}

impl Error {
    /// Packet or image checksum mismatch.
    pub fn is_integrity(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_checksum(),
            Self::ImageMismatch { .. } | Self::ActiveImageCorrupted { .. } => true,
            _ => false,
        }
    }

    /// Failure of the non-volatile storage, including an unreadable record.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Flash(_) | Self::RecordEncode(_) | Self::RecordDecode(_) | Self::RecordReadback
        )
    }
}
